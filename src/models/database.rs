use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct ListDatabasesRequest {
    #[serde(rename = "mongodbUri", default)]
    pub mongodb_uri: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseInfo {
    pub database: String,
    pub collections: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct DatabasesResponse {
    pub databases: Vec<DatabaseInfo>,
}
