use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

/// A stored data item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataItem {
    pub id: Uuid,
    pub name: String,
    pub value: f64,
    pub category: String,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DataItem {
    /// Build a fresh item with a new id and both timestamps set to now.
    pub fn new(input: NewDataItem) -> Self {
        // ---
        let NewDataItem {
            name,
            value,
            category,
            metadata,
        } = input;
        let now = Utc::now();

        Self {
            id: Uuid::new_v4(),
            name,
            value,
            category,
            metadata: metadata.unwrap_or_else(empty_object),
            created_at: now,
            updated_at: now,
        }
    }

    /// Overwrite the mutable fields and bump `updated_at`.
    pub fn apply(&mut self, input: NewDataItem) {
        // ---
        let NewDataItem {
            name,
            value,
            category,
            metadata,
        } = input;

        self.name = name;
        self.value = value;
        self.category = category;
        self.metadata = metadata.unwrap_or_else(empty_object);
        self.updated_at = Utc::now();
    }
}

/// Client-supplied fields for create and update.
///
/// Server-managed fields (`id`, timestamps) are ignored if a client sends them.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewDataItem {
    pub name: String,
    pub value: f64,
    pub category: String,
    #[serde(default)]
    pub metadata: Option<Value>,
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

/// Filter and pagination for listing items.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemQuery {
    pub category: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for ItemQuery {
    fn default() -> Self {
        Self {
            category: None,
            limit: 100,
            offset: 0,
        }
    }
}

/// Aggregate statistics over all items.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DataStats {
    pub total_items: i64,
    pub categories: BTreeMap<String, i64>,
    pub average_value: f64,
    pub min_value: f64,
    pub max_value: f64,
}

impl DataStats {
    /// Compute statistics from `(category, value)` pairs.
    pub fn from_values<'a, I>(rows: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, f64)>,
    {
        // ---
        let mut stats = DataStats::default();
        let mut sum = 0.0;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;

        for (category, value) in rows {
            stats.total_items += 1;
            *stats.categories.entry(category.to_string()).or_insert(0) += 1;
            sum += value;
            min = min.min(value);
            max = max.max(value);
        }

        if stats.total_items > 0 {
            stats.average_value = sum / stats.total_items as f64;
            stats.min_value = min;
            stats.max_value = max;
        }
        stats
    }
}
