//! Aggregation queries and their results.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use stixgraph_types::{EntityId, EntityType};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatsOperation {
    #[default]
    Count,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interval {
    Day,
    Month,
    Year,
}

/// Timestamp an aggregation buckets on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeField {
    Created,
    Modified,
    #[default]
    CreatedAt,
    UpdatedAt,
}

impl TimeField {
    pub fn column(self) -> &'static str {
        match self {
            TimeField::Created => "created",
            TimeField::Modified => "modified",
            TimeField::CreatedAt => "created_at",
            TimeField::UpdatedAt => "updated_at",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesQuery {
    #[serde(default)]
    pub types: Vec<EntityType>,
    pub field: TimeField,
    pub operation: StatsOperation,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub interval: Interval,
}

/// Largest number of buckets a time series may span. Every bucket is
/// returned, empty ones included, so wider ranges must use a coarser interval.
pub const MAX_TIME_SERIES_BUCKETS: u64 = 10_000;

impl TimeSeriesQuery {
    /// Buckets between the start and end dates, both ends included; zero when
    /// the range is reversed.
    pub fn bucket_count(&self) -> u64 {
        if self.start_date > self.end_date {
            return 0;
        }
        let (start, end) = (self.start_date, self.end_date);
        let span = match self.interval {
            Interval::Day => (end.date_naive() - start.date_naive()).num_days(),
            Interval::Month => {
                i64::from(end.year() - start.year()) * 12 + i64::from(end.month())
                    - i64::from(start.month())
            }
            Interval::Year => i64::from(end.year() - start.year()),
        };
        u64::try_from(span).map_or(0, |span| span + 1)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesEntry {
    /// Start of the bucket.
    pub date: DateTime<Utc>,
    pub value: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CountQuery {
    #[serde(default)]
    pub types: Vec<EntityType>,
    /// When set, `count` only includes entities created up to this instant.
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountResult {
    pub total: u64,
    pub count: u64,
}

/// Relation counts around one entity, grouped by a field of the entity on the
/// other end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionQuery {
    #[serde(default)]
    pub from_id: Option<EntityId>,
    /// Only count relations whose other end has one of these types.
    #[serde(default)]
    pub to_types: Vec<EntityType>,
    #[serde(default)]
    pub relation_type: Option<String>,
    /// Include inferred relations and, with `resolve_relation_type`, second-hop
    /// relations.
    #[serde(default)]
    pub resolve_inferences: bool,
    /// Relation type followed first when resolving second-hop relations.
    #[serde(default)]
    pub resolve_relation_type: Option<String>,
    pub field: String,
    pub operation: StatsOperation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionEntry {
    pub label: String,
    pub value: f64,
}
