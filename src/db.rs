use std::collections::HashMap;

use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::filter::{Filter, SqlBind};
use crate::models::{AnswerMap, Choice, Employee, QuestionDef, QuestionKind, ResponseRecord, Shop};
use crate::store::{StoreError, SurveyStore};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let shops = vec![
        ("Sucursal Hermosillo", "hermosillo", "Hermosillo"),
        ("Sucursal Navojoa", "navojoa", "Navojoa"),
        ("Sucursal Jilotepec", "don-nico", "Jilotepec"),
        ("Sucursal presidencia", "presidencia", "Jilotepec"),
    ];

    let mut shop_ids = HashMap::new();
    for (name, slug, city) in shops {
        let id: i64 = sqlx::query(
            r#"
            INSERT INTO survey.shops (name, slug, city)
            VALUES ($1, $2, $3)
            ON CONFLICT (slug) DO UPDATE
            SET name = EXCLUDED.name, city = EXCLUDED.city
            RETURNING id
            "#,
        )
        .bind(name)
        .bind(slug)
        .bind(city)
        .fetch_one(pool)
        .await?
        .get("id");
        shop_ids.insert(slug, id);
    }

    let employees = vec![
        ("María", "hermosillo"),
        ("Luis", "navojoa"),
        ("Karla", "don-nico"),
    ];

    let mut employee_ids = HashMap::new();
    for (name, slug) in employees {
        let employee_id: i64 = sqlx::query(
            r#"
            INSERT INTO survey.employees (name, active)
            VALUES ($1, TRUE)
            ON CONFLICT (name) DO UPDATE SET active = TRUE
            RETURNING id
            "#,
        )
        .bind(name)
        .fetch_one(pool)
        .await?
        .get("id");

        let shop_id = *shop_ids.get(slug).context("seed employee references unknown shop")?;
        sqlx::query(
            "INSERT INTO survey.employee_shops (employee_id, shop_id) VALUES ($1, $2) \
             ON CONFLICT DO NOTHING",
        )
        .bind(employee_id)
        .bind(shop_id)
        .execute(pool)
        .await?;
        employee_ids.insert(name, (employee_id, shop_id));
    }

    let question_count: i64 = sqlx::query("SELECT COUNT(*) AS count FROM survey.questions")
        .fetch_one(pool)
        .await?
        .get("count");

    if question_count == 0 {
        let questions = vec![
            ("¿Cómo calificarías tu nivel de satisfacción con tu visita reciente?", "radio", 1),
            ("¿Qué probabilidades hay de que nos recomiendes a un amigo o familiar?", "scale", 2),
            ("¿Cómo describirías nuestros productos?", "radio", 3),
            ("Comentarios adicionales", "text", 4),
            ("¿Cómo calificarías la amabilidad de nuestro representante?", "scale", 5),
        ];

        let mut question_ids = Vec::new();
        for (prompt, kind, order_num) in questions {
            let id: i64 = sqlx::query(
                "INSERT INTO survey.questions (prompt, kind, order_num) VALUES ($1, $2, $3) RETURNING id",
            )
            .bind(prompt)
            .bind(kind)
            .bind(order_num)
            .fetch_one(pool)
            .await?
            .get("id");
            question_ids.push(id);
        }

        let choices = vec![
            (0, "Malo", "malo", 1),
            (0, "Regular", "regular", 2),
            (0, "Bueno", "bueno", 3),
            (2, "Ni buenos ni malos", "ni_buenos_ni_malos", 1),
            (2, "Están bien", "estan_bien", 2),
            (2, "Son buenísimos", "son_buenisimos", 3),
            (2, "Malos", "malos", 4),
        ];

        for (question_index, label, value, order_num) in choices {
            sqlx::query(
                "INSERT INTO survey.choices (question_id, label, value, order_num) VALUES ($1, $2, $3, $4)",
            )
            .bind(question_ids[question_index])
            .bind(label)
            .bind(value)
            .bind(order_num)
            .execute(pool)
            .await?;
        }

        // Both key spellings appear in stored answers.
        let now = Utc::now();
        let (q1, q2, q3, q5) = (question_ids[0], question_ids[1], question_ids[2], question_ids[4]);
        let responses = vec![
            ("seed-001", "María", json!({format!("q{q1}"): "bueno", format!("q{q2}"): "9", format!("q{q5}"): "5"}), 1),
            ("seed-002", "María", json!({q1.to_string(): "regular", q2.to_string(): 7, q5.to_string(): "4"}), 2),
            ("seed-003", "Luis", json!({format!("q{q1}"): "bueno", format!("q{q3}"): "son_buenisimos", format!("q{q5}"): 5}), 2),
            ("seed-004", "Karla", json!({format!("q{q2}"): "10", format!("q{q3}"): "estan_bien"}), 5),
        ];

        for (source_key, employee, answers, days_ago) in responses {
            let (employee_id, shop_id) = *employee_ids
                .get(employee)
                .context("seed response references unknown employee")?;
            sqlx::query(
                r#"
                INSERT INTO survey.responses
                (shop_id, employee_id, answers, user_agent, source_key, created_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (source_key) DO NOTHING
                "#,
            )
            .bind(shop_id)
            .bind(employee_id)
            .bind(answers)
            .bind("seed")
            .bind(source_key)
            .bind(now - Duration::days(days_ago))
            .execute(pool)
            .await?;
        }
    }

    tracing::info!(shops = shop_ids.len(), employees = employee_ids.len(), "seed complete");
    Ok(())
}

/// One validated CSV line, ready to insert.
#[derive(Debug)]
struct ImportRow {
    line: usize,
    shop_slug: String,
    employee_name: String,
    created_at: DateTime<Utc>,
    answers: AnswerMap,
    source_key: String,
    user_agent: String,
}

/// Parses every line up front so a malformed file writes nothing.
/// Rows without a `source_key` get one derived from their content, so
/// re-importing the same file does not duplicate them.
fn read_import_rows<R: std::io::Read>(mut reader: csv::Reader<R>) -> anyhow::Result<Vec<ImportRow>> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        shop_slug: String,
        employee_name: String,
        created_at: DateTime<Utc>,
        answers: String,
        source_key: Option<String>,
        user_agent: Option<String>,
    }

    let mut rows = Vec::new();
    for (index, result) in reader.deserialize::<CsvRow>().enumerate() {
        let line = index + 2;
        let row = result.with_context(|| format!("line {line}: malformed row"))?;
        let answers: AnswerMap = serde_json::from_str(&row.answers)
            .with_context(|| format!("line {line}: answers must be a JSON object"))?;

        let source_key = match row.source_key.filter(|key| !key.is_empty()) {
            Some(key) => key,
            None => {
                let content = format!(
                    "{}\n{}\n{}\n{}",
                    row.shop_slug,
                    row.employee_name,
                    row.created_at.to_rfc3339(),
                    Value::Object(answers.clone())
                );
                format!("import-{}", Uuid::new_v5(&Uuid::NAMESPACE_OID, content.as_bytes()))
            }
        };

        rows.push(ImportRow {
            line,
            shop_slug: row.shop_slug,
            employee_name: row.employee_name,
            created_at: row.created_at,
            answers,
            source_key,
            user_agent: row.user_agent.unwrap_or_default(),
        });
    }
    Ok(rows)
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    let reader = csv::Reader::from_path(csv_path)?;
    let rows = read_import_rows(reader)?;

    let mut tx = pool.begin().await?;
    let mut inserted = 0usize;

    for row in rows {
        let assignment = sqlx::query(
            r#"
            SELECT e.id AS employee_id, s.id AS shop_id
            FROM survey.employees e
            JOIN survey.employee_shops es ON es.employee_id = e.id
            JOIN survey.shops s ON s.id = es.shop_id
            WHERE s.slug = $1 AND e.name = $2 AND e.active
            "#,
        )
        .bind(&row.shop_slug)
        .bind(&row.employee_name)
        .fetch_optional(&mut *tx)
        .await?;

        // Returning early drops `tx`, which rolls back earlier inserts.
        let Some(assignment) = assignment else {
            anyhow::bail!(
                "line {}: no active employee {:?} at shop {:?}",
                row.line,
                row.employee_name,
                row.shop_slug
            );
        };
        let employee_id: i64 = assignment.get("employee_id");
        let shop_id: i64 = assignment.get("shop_id");

        let result = sqlx::query(
            r#"
            INSERT INTO survey.responses
            (shop_id, employee_id, answers, user_agent, source_key, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(shop_id)
        .bind(employee_id)
        .bind(Value::Object(row.answers))
        .bind(row.user_agent)
        .bind(row.source_key)
        .bind(row.created_at)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() > 0 {
            inserted += 1;
        }
    }

    tx.commit().await?;
    tracing::info!(inserted, path = %csv_path.display(), "imported responses");
    Ok(inserted)
}

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const EMPLOYEE_SELECT: &str = "SELECT e.id, e.name, e.active, \
     COALESCE(array_agg(es.shop_id ORDER BY es.shop_id) FILTER (WHERE es.shop_id IS NOT NULL), '{}') AS shop_ids \
     FROM survey.employees e \
     LEFT JOIN survey.employee_shops es ON es.employee_id = e.id";

fn employee_from_row(row: &sqlx::postgres::PgRow) -> Result<Employee, sqlx::Error> {
    Ok(Employee {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        active: row.try_get("active")?,
        shop_ids: row.try_get("shop_ids")?,
    })
}

impl SurveyStore for PgStore {
    async fn list_responses(&self, filter: &Filter) -> Result<Vec<ResponseRecord>, StoreError> {
        let predicate = filter.sql_predicate(1);
        let query = format!(
            "SELECT r.id, r.shop_id, s.name AS shop_name, r.employee_id, e.name AS employee_name, \
             r.answers, r.created_at \
             FROM survey.responses r \
             LEFT JOIN survey.shops s ON s.id = r.shop_id \
             LEFT JOIN survey.employees e ON e.id = r.employee_id \
             WHERE {} \
             ORDER BY r.created_at DESC, r.id DESC",
            predicate.clause
        );

        let mut rows = sqlx::query(&query);
        for bind in predicate.binds {
            rows = match bind {
                SqlBind::Id(id) => rows.bind(id),
                SqlBind::Time(at) => rows.bind(at),
            };
        }

        let records = rows.fetch_all(&self.pool).await?;
        let mut responses = Vec::with_capacity(records.len());

        for row in records {
            let id: i64 = row.try_get("id")?;
            let answers = match row.try_get::<Value, _>("answers")? {
                Value::Object(map) => map,
                other => {
                    tracing::warn!(response = id, kind = ?other, "answers payload is not an object");
                    AnswerMap::new()
                }
            };
            responses.push(ResponseRecord {
                id,
                shop_id: row.try_get("shop_id")?,
                shop_name: row.try_get("shop_name")?,
                employee_id: row.try_get("employee_id")?,
                employee_name: row.try_get("employee_name")?,
                created_at: row.try_get("created_at")?,
                answers,
            });
        }

        tracing::debug!(count = responses.len(), "loaded responses");
        Ok(responses)
    }

    async fn list_questions(&self) -> Result<Vec<QuestionDef>, StoreError> {
        let choice_rows = sqlx::query(
            "SELECT question_id, label, value, order_num FROM survey.choices ORDER BY order_num, id",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut choices: HashMap<i64, Vec<Choice>> = HashMap::new();
        for row in choice_rows {
            choices
                .entry(row.try_get("question_id")?)
                .or_default()
                .push(Choice {
                    value: row.try_get("value")?,
                    label: row.try_get("label")?,
                    display_order: row.try_get("order_num")?,
                });
        }

        let rows = sqlx::query(
            "SELECT id, prompt, kind, order_num FROM survey.questions ORDER BY order_num, id",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut questions = Vec::with_capacity(rows.len());
        for row in rows {
            let id: i64 = row.try_get("id")?;
            let raw_kind: String = row.try_get("kind")?;
            let kind = QuestionKind::parse(&raw_kind).unwrap_or_else(|| {
                tracing::warn!(question = id, kind = %raw_kind, "unknown question kind, treating as text");
                QuestionKind::Text
            });
            questions.push(QuestionDef {
                id,
                prompt: row.try_get("prompt")?,
                kind,
                display_order: row.try_get("order_num")?,
                choices: choices.remove(&id).unwrap_or_default(),
            });
        }

        Ok(questions)
    }

    async fn list_shops(&self) -> Result<Vec<Shop>, StoreError> {
        let rows = sqlx::query("SELECT id, name, slug, city FROM survey.shops ORDER BY name, id")
            .fetch_all(&self.pool)
            .await?;

        let mut shops = Vec::with_capacity(rows.len());
        for row in rows {
            shops.push(Shop {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
                slug: row.try_get("slug")?,
                city: row.try_get("city")?,
            });
        }
        Ok(shops)
    }

    async fn list_employees(&self, shop_id: Option<i64>) -> Result<Vec<Employee>, StoreError> {
        let query = format!(
            "{EMPLOYEE_SELECT} \
             WHERE e.active AND ($1::BIGINT IS NULL OR EXISTS ( \
                 SELECT 1 FROM survey.employee_shops f WHERE f.employee_id = e.id AND f.shop_id = $1)) \
             GROUP BY e.id ORDER BY e.name, e.id"
        );
        let rows = sqlx::query(&query).bind(shop_id).fetch_all(&self.pool).await?;

        let mut employees = Vec::with_capacity(rows.len());
        for row in &rows {
            employees.push(employee_from_row(row)?);
        }
        Ok(employees)
    }

    async fn find_employee(&self, id: i64) -> Result<Option<Employee>, StoreError> {
        let query = format!("{EMPLOYEE_SELECT} WHERE e.id = $1 GROUP BY e.id");
        let row = sqlx::query(&query).bind(id).fetch_optional(&self.pool).await?;
        Ok(row.as_ref().map(employee_from_row).transpose()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(data: &str) -> anyhow::Result<Vec<ImportRow>> {
        read_import_rows(csv::Reader::from_reader(data.as_bytes()))
    }

    const HEADER: &str = "shop_slug,employee_name,created_at,answers,source_key,user_agent\n";

    #[test]
    fn a_bad_line_rejects_the_whole_file() {
        let data = format!(
            "{HEADER}navojoa,Luis,2026-02-01T10:00:00Z,\"{{\"\"q1\"\":\"\"4\"\"}}\",,\n\
             navojoa,Luis,2026-02-01T11:00:00Z,not json,,\n"
        );
        let error = rows(&data).unwrap_err();
        assert!(error.to_string().contains("line 3"), "{error}");
    }

    #[test]
    fn missing_source_keys_are_stable_across_reads() {
        let data = format!(
            "{HEADER}navojoa,Luis,2026-02-01T10:00:00Z,\"{{\"\"q1\"\":\"\"4\"\",\"\"2\"\":5}}\",,\n\
             navojoa,Luis,2026-02-01T10:00:00Z,\"{{\"\"2\"\":5,\"\"q1\"\":\"\"4\"\"}}\",,\n\
             navojoa,Luis,2026-02-01T10:05:00Z,\"{{\"\"q1\"\":\"\"4\"\"}}\",row-7,firefox\n"
        );
        let first = rows(&data).unwrap();
        let second = rows(&data).unwrap();

        assert_eq!(first.len(), 3);
        assert!(first[0].source_key.starts_with("import-"));
        assert_eq!(first[0].source_key, second[0].source_key);
        // Same content with a different key order is the same response.
        assert_eq!(first[0].source_key, first[1].source_key);
        assert_eq!(first[2].source_key, "row-7");
        assert_eq!(first[2].user_agent, "firefox");
        assert_eq!(first[2].line, 4);
    }
}
