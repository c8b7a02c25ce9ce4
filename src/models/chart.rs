/// Chart inference models

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Store-assigned record identifier; never a chart axis
pub const IDENTITY_FIELD: &str = "_id";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ChartType {
    #[serde(rename = "linechart")]
    Line,
    #[default]
    #[serde(rename = "barchart")]
    Bar,
    #[serde(rename = "piechart")]
    Pie,
}

impl ChartType {
    /// Case-insensitive match on the model's tag; also accepts "line", "bar chart", etc.
    pub fn parse(tag: &str) -> Option<Self> {
        let normalized: String = tag
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();

        match normalized.as_str() {
            "linechart" | "line" => Some(ChartType::Line),
            "barchart" | "bar" => Some(ChartType::Bar),
            "piechart" | "pie" => Some(ChartType::Pie),
            _ => None,
        }
    }
}

/// Resolved chart description returned to the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartSpec {
    pub x_axis: String,
    pub y_axis: String,
    pub x_axis_options: Vec<String>,
    pub y_axis_options: Vec<String>,
    pub chart_type: ChartType,
}

#[derive(Debug, Deserialize)]
pub struct ChartRequest {
    #[serde(rename = "sampleData")]
    pub sample_data: Option<Value>,
}
