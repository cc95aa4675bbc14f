use std::time::Duration;

use thiserror::Error;

use crate::filter::Filter;
use crate::models::{Employee, QuestionDef, ResponseRecord, Shop};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("data retrieval exceeded {0:?}")]
    Timeout(Duration),
}

/// Read side of survey storage.
#[allow(async_fn_in_trait)]
pub trait SurveyStore {
    /// Responses matching `filter`, newest first. Pushdown may be partial.
    async fn list_responses(&self, filter: &Filter) -> Result<Vec<ResponseRecord>, StoreError>;
    async fn list_questions(&self) -> Result<Vec<QuestionDef>, StoreError>;
    async fn list_shops(&self) -> Result<Vec<Shop>, StoreError>;
    /// Active employees, optionally only those assigned to `shop_id`.
    async fn list_employees(&self, shop_id: Option<i64>) -> Result<Vec<Employee>, StoreError>;
    async fn find_employee(&self, id: i64) -> Result<Option<Employee>, StoreError>;
}

/// Everything one report needs, fetched up front.
#[derive(Debug, Clone, Default)]
pub struct ReportInputs {
    pub responses: Vec<ResponseRecord>,
    pub questions: Vec<QuestionDef>,
    pub shops: Vec<Shop>,
    pub employees: Vec<Employee>,
    pub selected_employee: Option<Employee>,
}

pub async fn fetch_report_inputs<S: SurveyStore>(
    store: &S,
    filter: &Filter,
    deadline: Duration,
) -> Result<ReportInputs, StoreError> {
    let fetch = async {
        let responses = store.list_responses(filter).await?;
        let questions = store.list_questions().await?;
        let shops = store.list_shops().await?;
        let employees = store.list_employees(filter.shop()).await?;
        let selected_employee = match filter.employee() {
            Some(id) => store.find_employee(id).await?,
            None => None,
        };
        Ok::<_, StoreError>(ReportInputs {
            responses,
            questions,
            shops,
            employees,
            selected_employee,
        })
    };

    let inputs = tokio::time::timeout(deadline, fetch)
        .await
        .map_err(|_| StoreError::Timeout(deadline))??;

    tracing::info!(
        responses = inputs.responses.len(),
        questions = inputs.questions.len(),
        shops = inputs.shops.len(),
        "fetched report inputs"
    );
    Ok(inputs)
}

#[cfg(test)]
pub(crate) mod memory {
    use super::*;

    /// In-memory store that ignores the filter, leaving filtering to the engine.
    #[derive(Default)]
    pub struct MemoryStore {
        pub responses: Vec<ResponseRecord>,
        pub questions: Vec<QuestionDef>,
        pub shops: Vec<Shop>,
        pub employees: Vec<Employee>,
        pub delay: Option<Duration>,
    }

    impl SurveyStore for MemoryStore {
        async fn list_responses(&self, _filter: &Filter) -> Result<Vec<ResponseRecord>, StoreError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            Ok(self.responses.clone())
        }

        async fn list_questions(&self) -> Result<Vec<QuestionDef>, StoreError> {
            Ok(self.questions.clone())
        }

        async fn list_shops(&self) -> Result<Vec<Shop>, StoreError> {
            Ok(self.shops.clone())
        }

        async fn list_employees(&self, shop_id: Option<i64>) -> Result<Vec<Employee>, StoreError> {
            Ok(self
                .employees
                .iter()
                .filter(|employee| employee.active)
                .filter(|employee| shop_id.map_or(true, |id| employee.shop_ids.contains(&id)))
                .cloned()
                .collect())
        }

        async fn find_employee(&self, id: i64) -> Result<Option<Employee>, StoreError> {
            Ok(self.employees.iter().find(|employee| employee.id == id).cloned())
        }
    }
}
