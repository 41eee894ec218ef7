//! Operations invoked by name with JSON parameters

use crate::core::error::{RepositoryError, Result};
use crate::core::field::FieldValue;
use crate::core::record::{Attributes, Record};
use crate::query::search::SearchColumns;
use crate::repository::{Condition, GridRequest, Repository};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

/// Operation names [`call`] understands
pub const OPERATIONS: &[&str] = &[
    "all",
    "find",
    "find_by",
    "find_where",
    "find_many",
    "where",
    "create",
    "update",
    "delete",
    "count",
    "paginate",
    "fetch",
    "simple_fetch",
    "search",
];

#[derive(Deserialize, Default)]
#[serde(default)]
struct Columns {
    columns: Vec<String>,
}

#[derive(Deserialize)]
struct FindParams {
    #[serde(alias = "id")]
    identifier: FieldValue,
    #[serde(default)]
    columns: Vec<String>,
}

#[derive(Deserialize)]
struct FindByParams {
    column: String,
    value: FieldValue,
    #[serde(default)]
    columns: Vec<String>,
}

#[derive(Deserialize)]
struct FindWhereParams {
    conditions: Attributes,
    #[serde(default)]
    columns: Vec<String>,
}

#[derive(Deserialize)]
struct FindManyParams {
    #[serde(alias = "ids")]
    identifiers: Vec<FieldValue>,
    #[serde(default)]
    columns: Vec<String>,
}

#[derive(Deserialize)]
struct WhereParams {
    #[serde(flatten)]
    condition: Condition,
    #[serde(default)]
    columns: Vec<String>,
}

#[derive(Deserialize)]
struct CreateParams {
    attributes: Attributes,
}

#[derive(Deserialize)]
struct UpdateParams {
    #[serde(alias = "id")]
    identifier: FieldValue,
    attributes: Attributes,
}

#[derive(Deserialize)]
struct DeleteParams {
    #[serde(alias = "id")]
    identifier: FieldValue,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct PaginateParams {
    page: Option<usize>,
    #[serde(alias = "perPage")]
    per_page: Option<usize>,
    columns: Vec<String>,
}

#[derive(Deserialize)]
struct SearchParams {
    phrase: String,
    #[serde(default)]
    columns: SearchColumns,
    #[serde(default)]
    threshold: Option<f64>,
}

fn params<T: DeserializeOwned>(operation: &str, parameters: Value) -> Result<T> {
    let parameters = if parameters.is_null() { json!({}) } else { parameters };
    serde_json::from_value(parameters)
        .map_err(|e| RepositoryError::invalid_parameters(operation, e))
}

fn refs(columns: &[String]) -> Vec<&str> {
    columns.iter().map(String::as_str).collect()
}

fn to_value<T: serde::Serialize>(operation: &str, value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| RepositoryError::invalid_parameters(operation, e))
}

fn records(operation: &str, records: &[Record]) -> Result<Value> {
    to_value(operation, &records)
}

/// Route `operation` to the matching repository method.
///
/// camelCase aliases (`findBy`, `simpleFetch`, ...) are accepted. Anything
/// else is [`RepositoryError::UnknownOperation`].
pub async fn call<R>(repository: &R, operation: &str, parameters: Value) -> Result<Value>
where
    R: Repository + ?Sized,
{
    tracing::debug!(table = %repository.table(), operation = %operation, "dynamic call");

    match operation {
        "all" => {
            let p: Columns = params(operation, parameters)?;
            records(operation, &repository.all(&refs(&p.columns)).await?)
        }
        "find" => {
            let p: FindParams = params(operation, parameters)?;
            let found = repository.find(&p.identifier, &refs(&p.columns)).await?;
            to_value(operation, &found)
        }
        "find_by" | "findBy" => {
            let p: FindByParams = params(operation, parameters)?;
            let found = repository
                .find_by(&p.column, &p.value, &refs(&p.columns))
                .await?;
            to_value(operation, &found)
        }
        "find_where" | "findWhere" => {
            let p: FindWhereParams = params(operation, parameters)?;
            records(operation, &repository.find_where(&p.conditions, &refs(&p.columns)).await?)
        }
        "find_many" | "findMany" => {
            let p: FindManyParams = params(operation, parameters)?;
            records(operation, &repository.find_many(&p.identifiers, &refs(&p.columns)).await?)
        }
        "where" => {
            let p: WhereParams = params(operation, parameters)?;
            records(operation, &repository.where_(&p.condition, &refs(&p.columns)).await?)
        }
        "create" => {
            let p: CreateParams = params(operation, parameters)?;
            to_value(operation, &repository.create(p.attributes).await?)
        }
        "update" => {
            let p: UpdateParams = params(operation, parameters)?;
            to_value(operation, &repository.update(&p.identifier, p.attributes).await?)
        }
        "delete" => {
            let p: DeleteParams = params(operation, parameters)?;
            Ok(Value::Bool(repository.delete(&p.identifier).await?))
        }
        "count" => Ok(json!(repository.count().await?)),
        "paginate" => {
            let p: PaginateParams = params(operation, parameters)?;
            let page = repository
                .paginate_page(p.page.unwrap_or(1), p.per_page, &refs(&p.columns))
                .await?;
            to_value(operation, &page)
        }
        "fetch" => {
            let request: GridRequest = params(operation, parameters)?;
            to_value(operation, &repository.fetch(&request).await?)
        }
        "simple_fetch" | "simpleFetch" => {
            let request: GridRequest = params(operation, parameters)?;
            records(operation, &repository.simple_fetch(&request).await?)
        }
        "search" => {
            let p: SearchParams = params(operation, parameters)?;
            records(operation, &repository.search(&p.phrase, &p.columns, p.threshold).await?)
        }
        _ => {
            tracing::warn!(table = %repository.table(), operation = %operation, "unknown operation");
            Err(RepositoryError::unknown_operation(operation))
        }
    }
}
