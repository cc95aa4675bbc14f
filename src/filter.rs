use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::models::ResponseRecord;

#[derive(Debug, Error, PartialEq)]
pub enum FilterError {
    #[error("date window is empty: {start} is not before {end}")]
    EmptyWindow {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    #[error("{0} has no midnight in the reporting time zone")]
    InvalidDay(NaiveDate),
    #[error("date window reaches outside the supported calendar range")]
    OutOfRange,
}

/// Half-open time range; a missing bound is unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DateWindow {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl DateWindow {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start.map_or(true, |start| at >= start) && self.end.map_or(true, |end| at < end)
    }

    /// Everything from midnight `days` calendar days ago onward.
    pub fn since_days(
        now: DateTime<Utc>,
        days: i64,
        zone: FixedOffset,
    ) -> Result<Self, FilterError> {
        let today = now.with_timezone(&zone).date_naive();
        let first_day = Duration::try_days(days.max(1))
            .and_then(|back| today.checked_sub_signed(back))
            .ok_or(FilterError::OutOfRange)?;
        Ok(Self {
            start: Some(start_of_day(first_day, zone)?),
            end: None,
        })
    }

    /// Calendar days `from..=to` in the reporting zone.
    pub fn between_days(
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
        zone: FixedOffset,
    ) -> Result<Self, FilterError> {
        let start = from.map(|day| start_of_day(day, zone)).transpose()?;
        let end = to
            .map(|day| day.succ_opt().ok_or(FilterError::OutOfRange))
            .transpose()?
            .map(|day| start_of_day(day, zone))
            .transpose()?;
        Ok(Self { start, end })
    }
}

fn start_of_day(day: NaiveDate, zone: FixedOffset) -> Result<DateTime<Utc>, FilterError> {
    let offset = Duration::seconds(i64::from(zone.local_minus_utc()));
    day.and_time(NaiveTime::MIN)
        .checked_sub_signed(offset)
        .map(|utc| DateTime::<Utc>::from_naive_utc_and_offset(utc, Utc))
        .ok_or(FilterError::InvalidDay(day))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Filter {
    pub shop_id: Option<i64>,
    pub employee_id: Option<i64>,
    pub window: Option<DateWindow>,
}

/// Bind value for a pushed-down predicate, in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlBind {
    Id(i64),
    Time(DateTime<Utc>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SqlPredicate {
    pub clause: String,
    pub binds: Vec<SqlBind>,
}

impl Filter {
    pub fn by_shop_and_employee(shop_id: Option<i64>, employee_id: Option<i64>) -> Self {
        Self {
            shop_id,
            employee_id,
            window: None,
        }
    }

    /// Shop constraint; zero means "all shops".
    pub fn shop(&self) -> Option<i64> {
        self.shop_id.filter(|id| *id != 0)
    }

    /// Employee constraint; zero means "all employees".
    pub fn employee(&self) -> Option<i64> {
        self.employee_id.filter(|id| *id != 0)
    }

    pub fn validate(&self) -> Result<(), FilterError> {
        if let Some(DateWindow {
            start: Some(start),
            end: Some(end),
        }) = self.window
        {
            if start >= end {
                return Err(FilterError::EmptyWindow { start, end });
            }
        }
        Ok(())
    }

    pub fn matches(&self, record: &ResponseRecord) -> bool {
        if let Some(shop_id) = self.shop() {
            if record.shop_id != shop_id {
                return false;
            }
        }
        if let Some(employee_id) = self.employee() {
            if record.employee_id != employee_id {
                return false;
            }
        }
        self.window
            .map_or(true, |window| window.contains(record.created_at))
    }

    /// Translates the filter into a WHERE clause over `survey.responses r`.
    /// Placeholders are numbered from `first_param`.
    pub fn sql_predicate(&self, first_param: usize) -> SqlPredicate {
        let mut conditions = Vec::new();
        let mut binds = Vec::new();

        let mut push = |condition: &str, bind: SqlBind| {
            let index = first_param + binds.len();
            conditions.push(format!("{condition} ${index}"));
            binds.push(bind);
        };

        if let Some(shop_id) = self.shop() {
            push("r.shop_id =", SqlBind::Id(shop_id));
        }
        if let Some(employee_id) = self.employee() {
            push("r.employee_id =", SqlBind::Id(employee_id));
        }
        if let Some(window) = self.window {
            if let Some(start) = window.start {
                push("r.created_at >=", SqlBind::Time(start));
            }
            if let Some(end) = window.end {
                push("r.created_at <", SqlBind::Time(end));
            }
        }

        let clause = if conditions.is_empty() {
            "TRUE".to_string()
        } else {
            conditions.join(" AND ")
        };
        SqlPredicate { clause, binds }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AnswerMap;
    use chrono::TimeZone;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, day, hour, 0, 0).unwrap()
    }

    fn record(shop_id: i64, employee_id: i64, created_at: DateTime<Utc>) -> ResponseRecord {
        ResponseRecord {
            id: 1,
            shop_id,
            shop_name: Some("Sucursal Centro".to_string()),
            employee_id,
            employee_name: Some("María".to_string()),
            created_at,
            answers: AnswerMap::new(),
        }
    }

    #[test]
    fn empty_filter_matches_everything() {
        let filter = Filter::default();
        assert!(filter.matches(&record(1, 2, at(1, 10))));
        assert!(filter.matches(&record(0, 0, at(30, 23))));
    }

    #[test]
    fn zero_ids_impose_no_constraint() {
        let filter = Filter::by_shop_and_employee(Some(0), Some(0));
        assert!(filter.matches(&record(4, 9, at(1, 10))));
        assert_eq!(filter.sql_predicate(1).clause, "TRUE");
    }

    #[test]
    fn shop_and_employee_are_conjunctive() {
        let filter = Filter::by_shop_and_employee(Some(1), Some(2));
        assert!(filter.matches(&record(1, 2, at(1, 10))));
        assert!(!filter.matches(&record(1, 3, at(1, 10))));
        assert!(!filter.matches(&record(2, 2, at(1, 10))));
    }

    #[test]
    fn window_is_inclusive_start_exclusive_end() {
        let filter = Filter {
            window: Some(DateWindow {
                start: Some(at(2, 0)),
                end: Some(at(3, 0)),
            }),
            ..Filter::default()
        };
        assert!(filter.matches(&record(1, 1, at(2, 0))));
        assert!(filter.matches(&record(1, 1, at(2, 23))));
        assert!(!filter.matches(&record(1, 1, at(3, 0))));
        assert!(!filter.matches(&record(1, 1, at(1, 23))));
    }

    #[test]
    fn inverted_window_is_rejected() {
        let filter = Filter {
            window: Some(DateWindow {
                start: Some(at(3, 0)),
                end: Some(at(3, 0)),
            }),
            ..Filter::default()
        };
        assert!(matches!(
            filter.validate(),
            Err(FilterError::EmptyWindow { .. })
        ));
        assert!(Filter::default().validate().is_ok());
    }

    #[test]
    fn predicate_numbers_placeholders_in_bind_order() {
        let filter = Filter {
            shop_id: Some(3),
            employee_id: Some(7),
            window: Some(DateWindow {
                start: Some(at(1, 0)),
                end: Some(at(5, 0)),
            }),
        };
        let predicate = filter.sql_predicate(1);
        assert_eq!(
            predicate.clause,
            "r.shop_id = $1 AND r.employee_id = $2 AND r.created_at >= $3 AND r.created_at < $4"
        );
        assert_eq!(
            predicate.binds,
            vec![
                SqlBind::Id(3),
                SqlBind::Id(7),
                SqlBind::Time(at(1, 0)),
                SqlBind::Time(at(5, 0)),
            ]
        );
    }

    #[test]
    fn predicate_skips_unset_bounds() {
        let filter = Filter {
            employee_id: Some(7),
            window: Some(DateWindow {
                start: None,
                end: Some(at(5, 0)),
            }),
            ..Filter::default()
        };
        let predicate = filter.sql_predicate(2);
        assert_eq!(predicate.clause, "r.employee_id = $2 AND r.created_at < $3");
        assert_eq!(predicate.binds.len(), 2);
    }

    #[test]
    fn since_days_starts_at_local_midnight() {
        let zone = FixedOffset::west_opt(7 * 3600).unwrap();
        let now = at(10, 3);
        let window = DateWindow::since_days(now, 2, zone).unwrap();
        // 03:00 UTC on the 10th is still the 9th at UTC-7.
        assert_eq!(window.start, Some(at(7, 7)));
        assert_eq!(window.end, None);
    }

    #[test]
    fn since_days_uses_at_least_one_day() {
        let window = DateWindow::since_days(at(10, 12), 0, FixedOffset::east_opt(0).unwrap()).unwrap();
        assert_eq!(window.start, Some(at(9, 0)));
    }

    #[test]
    fn between_days_includes_the_last_day() {
        let zone = FixedOffset::east_opt(0).unwrap();
        let from = NaiveDate::from_ymd_opt(2026, 3, 2);
        let to = NaiveDate::from_ymd_opt(2026, 3, 4);
        let window = DateWindow::between_days(from, to, zone).unwrap();
        assert_eq!(window.start, Some(at(2, 0)));
        assert_eq!(window.end, Some(at(5, 0)));
        assert!(window.contains(at(4, 23)));
    }

    #[test]
    fn day_arithmetic_past_the_calendar_is_rejected() {
        let utc = FixedOffset::east_opt(0).unwrap();
        assert_eq!(
            DateWindow::since_days(at(10, 12), i64::MAX, utc),
            Err(FilterError::OutOfRange)
        );
        assert_eq!(
            DateWindow::since_days(at(10, 12), 10_000_000_000, utc),
            Err(FilterError::OutOfRange)
        );
        assert_eq!(
            DateWindow::between_days(None, Some(NaiveDate::MAX), utc),
            Err(FilterError::OutOfRange)
        );
        let east = FixedOffset::east_opt(3600).unwrap();
        assert_eq!(
            DateWindow::between_days(Some(NaiveDate::MIN), None, east),
            Err(FilterError::InvalidDay(NaiveDate::MIN))
        );
    }

    /// Evaluates a pushed-down predicate the way Postgres would for one row.
    fn predicate_accepts(predicate: &SqlPredicate, first_param: usize, record: &ResponseRecord) -> bool {
        if predicate.clause == "TRUE" {
            return true;
        }
        predicate.clause.split(" AND ").all(|condition| {
            let parts: Vec<&str> = condition.split_whitespace().collect();
            let index: usize = parts[2].trim_start_matches('$').parse().unwrap();
            match (parts[0], parts[1], &predicate.binds[index - first_param]) {
                ("r.shop_id", "=", SqlBind::Id(id)) => record.shop_id == *id,
                ("r.employee_id", "=", SqlBind::Id(id)) => record.employee_id == *id,
                ("r.created_at", ">=", SqlBind::Time(t)) => record.created_at >= *t,
                ("r.created_at", "<", SqlBind::Time(t)) => record.created_at < *t,
                _ => panic!("unexpected condition {condition}"),
            }
        })
    }

    #[test]
    fn pushed_down_predicate_agrees_with_matches() {
        let start = at(2, 0);
        let end = at(3, 0);
        let window = |start, end| Some(DateWindow { start, end });
        let filters = vec![
            Filter::default(),
            Filter::by_shop_and_employee(Some(1), None),
            Filter::by_shop_and_employee(Some(0), Some(2)),
            Filter { window: window(Some(start), Some(end)), ..Filter::default() },
            Filter { window: window(Some(start), None), ..Filter::default() },
            Filter { window: window(None, Some(end)), ..Filter::default() },
            Filter {
                shop_id: Some(1),
                employee_id: Some(2),
                window: window(Some(start), Some(end)),
            },
        ];
        let one_second = Duration::seconds(1);
        let records = vec![
            record(1, 2, start),
            record(1, 2, start - one_second),
            record(1, 2, end - one_second),
            record(1, 2, end),
            record(2, 2, start),
            record(1, 3, start),
            record(0, 0, at(2, 12)),
        ];

        for (first_param, filter) in filters.iter().enumerate() {
            let first_param = first_param + 1;
            let predicate = filter.sql_predicate(first_param);
            for record in &records {
                assert_eq!(
                    predicate_accepts(&predicate, first_param, record),
                    filter.matches(record),
                    "filter {filter:?} on shop {} employee {} at {}",
                    record.shop_id,
                    record.employee_id,
                    record.created_at
                );
            }
        }
    }
}
