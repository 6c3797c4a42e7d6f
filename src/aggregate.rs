// src/aggregate.rs

use crate::description::ColumnMap;
use crate::table::{GeoTable, Row, Value};
use std::collections::BTreeMap;
use tracing::debug;

/// How two values for the same column are merged when rows collapse into one
/// geographic unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePolicy {
    /// Numeric accumulation. Non-numeric values are ignored by the sum.
    Sum,
    /// Keep the first non-empty value seen; later values never overwrite it.
    FirstNonEmpty,
    /// Always take the newest value.
    Override,
}

/// Per-column merge policies, resolved once from the descriptor before any
/// aggregation runs. Columns without an explicit entry fall back to
/// `FirstNonEmpty`.
#[derive(Debug, Clone, Default)]
pub struct MergePlan {
    policies: BTreeMap<String, MergePolicy>,
}

impl MergePlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve the plan for a dataset: the total-population column sums,
    /// everything else keeps its first meaningful value.
    pub fn from_columns(columns: &ColumnMap) -> Self {
        let mut plan = Self::new();
        if let Some(pop) = &columns.total_population {
            plan.set(pop, MergePolicy::Sum);
        }
        plan
    }

    pub fn set(&mut self, column: &str, policy: MergePolicy) -> &mut Self {
        self.policies.insert(column.to_string(), policy);
        self
    }

    pub fn policy_for(&self, column: &str) -> MergePolicy {
        self.policies
            .get(column)
            .copied()
            .unwrap_or(MergePolicy::FirstNonEmpty)
    }
}

fn merge_value(policy: MergePolicy, current: &Value, incoming: &Value) -> Value {
    match policy {
        MergePolicy::Sum => match (current.as_f64(), incoming.as_f64()) {
            (Some(a), Some(b)) => Value::Float(a + b),
            (Some(a), None) => Value::Float(a),
            (None, Some(b)) => Value::Float(b),
            (None, None) => current.clone(),
        },
        MergePolicy::FirstNonEmpty => {
            if current.is_truthy() {
                current.clone()
            } else {
                incoming.clone()
            }
        }
        MergePolicy::Override => incoming.clone(),
    }
}

/// Group table rows by the value of `key_column`, merging attributes under
/// the given plan. The returned key set is exactly the set of distinct key
/// values present in the table; rows with an empty key are dropped.
pub fn aggregate_by_key(
    table: &dyn GeoTable,
    key_column: &str,
    plan: &MergePlan,
) -> BTreeMap<String, Row> {
    let mut grouped: BTreeMap<String, Row> = BTreeMap::new();

    for row in table.rows() {
        let key = match row.get(key_column).and_then(Value::as_key) {
            Some(k) => k,
            None => continue,
        };

        match grouped.get_mut(&key) {
            Some(acc) => {
                for (column, incoming) in row {
                    match acc.get(column) {
                        Some(current) => {
                            let merged =
                                merge_value(plan.policy_for(column), current, incoming);
                            acc.insert(column.clone(), merged);
                        }
                        None => {
                            acc.insert(column.clone(), incoming.clone());
                        }
                    }
                }
            }
            None => {
                grouped.insert(key, row.clone());
            }
        }
    }

    debug!(units = grouped.len(), key = key_column, "aggregated rows");
    grouped
}
