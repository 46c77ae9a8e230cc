use serde::{Deserialize, Serialize};

/// Request body for `POST /api/v2/query`.
///
/// `cached` is always sent as `false`; the query node otherwise tries to
/// reuse the result state of an identical earlier query.
#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateQueryRequest<'a> {
    pub query: &'a str,
    pub cached: bool,
    /// Seconds of inactivity after which the server drops the query state.
    pub time_to_live: u64,
}

/// Successful response to a query submission: the server-assigned query
/// identifier plus the fixed column schema for the result stream.
#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct QueryMetadata {
    pub query_id: String,
    #[serde(default)]
    pub columns: Vec<Column>,
}

/// One column of the result schema: a name and a declared semantic type.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
}

/// Semantic column types reported by the query node.
///
/// Wire names are matched case-insensitively; anything unrecognized is kept
/// verbatim in `Other` rather than failing the whole submission.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(from = "String")]
pub enum ColumnType {
    String,
    Timestamp,
    Int,
    Long,
    Double,
    Boolean,
    InetAddr,
    Other(String),
}

impl From<String> for ColumnType {
    fn from(name: String) -> Self {
        match name.to_ascii_uppercase().as_str() {
            "STRING" => ColumnType::String,
            "TIMESTAMP" => ColumnType::Timestamp,
            "INT" => ColumnType::Int,
            "LONG" => ColumnType::Long,
            "DOUBLE" => ColumnType::Double,
            "BOOLEAN" => ColumnType::Boolean,
            "INET_ADDR" => ColumnType::InetAddr,
            _ => ColumnType::Other(name),
        }
    }
}

/// Error body returned by the server for a rejected query (HTTP 400).
#[derive(Debug, Deserialize, Clone)]
pub(crate) struct QueryErrorBody {
    #[serde(default)]
    #[allow(dead_code)]
    pub id: Option<String>,
    pub message: String,
    #[serde(default)]
    pub details: Option<String>,
}

/// One row of results: string-encoded field values positionally aligned to
/// the schema. `None` is a server-side null, distinct from an empty string.
pub type Row = Vec<Option<String>>;

/// Response body for `GET /api/v2/query/{queryId}/results`.
#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ResultsPage {
    #[serde(default)]
    #[allow(dead_code)]
    pub offset: u64,
    #[serde(default)]
    pub rows: Vec<Row>,
    #[serde(default)]
    #[allow(dead_code)]
    pub progress: i64,
    #[serde(default)]
    #[allow(dead_code)]
    pub time_spent: i64,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub errors_or_warnings: Vec<Diagnostic>,
}

/// Diagnostic entry attached to a results page.
#[derive(Debug, Deserialize, Clone)]
pub(crate) struct Diagnostic {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub severity: String,
}

/// Server build information from `GET /api/v1/configuration`.
#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub build_version: String,
}
