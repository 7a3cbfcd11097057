use geo::Point;
use serde::{Deserialize, Serialize};

/// One row of the transaction CSV.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TransactionRecord {
    pub price_category: String,
    pub prefecture: String,
    pub municipality: String,
    pub period: String,
    pub district_name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub age: u32, // years since construction at transaction time
    pub unit_price: f64, // yen per 坪
}

/// One map marker: the average unit price of a district in a period.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatePoint {
    pub period: String,
    pub municipality: String,
    pub district_name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub man_yen: i64,
    pub price_label: String,
    pub transactions: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Centroid {
    pub latitude: f64,
    pub longitude: f64,
}

impl From<Point<f64>> for Centroid {
    fn from(point: Point<f64>) -> Self {
        Centroid {
            latitude: point.y(),
            longitude: point.x(),
        }
    }
}

/// Result of one pipeline run. `Empty` is a normal outcome, not an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PipelineOutcome {
    Empty,
    Points {
        points: Vec<AggregatePoint>,
        centroid: Centroid,
    },
}

impl PipelineOutcome {
    pub fn is_empty(&self) -> bool {
        matches!(self, PipelineOutcome::Empty)
    }
}
