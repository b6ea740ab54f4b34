//! Aggregation results
//!
//! Results are built from the same [`Agg`] tree that was compiled into
//! the request, so each result node has the shape of its spec.

use super::HitSchemas;
use crate::document::Document;
use crate::error::DslError;
use crate::expr::{Agg, AggShape};
use crate::Result;
use indexmap::IndexMap;
use serde_json::{Map, Value};

#[derive(Debug, Clone)]
pub struct Bucket {
    pub key: Value,
    pub key_as_string: Option<String>,
    pub doc_count: u64,
    pub aggregations: IndexMap<String, AggResult>,
}

impl Bucket {
    pub fn get_aggregation(&self, name: &str) -> Option<&AggResult> {
        self.aggregations.get(name)
    }
}

#[derive(Debug, Clone)]
pub enum AggResult {
    SingleValue {
        value: Option<f64>,
        value_as_string: Option<String>,
    },
    Stats {
        count: u64,
        min: Option<f64>,
        max: Option<f64>,
        avg: Option<f64>,
        sum: Option<f64>,
        /// Extended stats (`variance`, `std_deviation` ...)
        extra: Map<String, Value>,
    },
    Percentiles {
        values: IndexMap<String, Option<f64>>,
    },
    TopHits {
        total: u64,
        max_score: Option<f64>,
        hits: Vec<Document>,
    },
    Buckets {
        buckets: Vec<Bucket>,
        doc_count_error_upper_bound: Option<u64>,
        sum_other_doc_count: Option<u64>,
    },
    SingleBucket {
        doc_count: u64,
        aggregations: IndexMap<String, AggResult>,
    },
}

impl AggResult {
    pub(crate) fn build(agg: &Agg, raw: &Value, schemas: &HitSchemas) -> Result<AggResult> {
        let Value::Object(data) = raw else {
            return Err(DslError::InvalidResponse(format!(
                "{} aggregation result must be an object",
                agg.kind.name()
            )));
        };

        let result = match agg.kind.shape() {
            AggShape::SingleValue => AggResult::SingleValue {
                value: data.get("value").and_then(Value::as_f64),
                value_as_string: data
                    .get("value_as_string")
                    .and_then(Value::as_str)
                    .map(String::from),
            },
            AggShape::Stats => {
                let mut extra = data.clone();
                for key in ["count", "min", "max", "avg", "sum"] {
                    extra.remove(key);
                }
                AggResult::Stats {
                    count: data.get("count").and_then(Value::as_u64).unwrap_or(0),
                    min: data.get("min").and_then(Value::as_f64),
                    max: data.get("max").and_then(Value::as_f64),
                    avg: data.get("avg").and_then(Value::as_f64),
                    sum: data.get("sum").and_then(Value::as_f64),
                    extra,
                }
            }
            AggShape::Percentiles => AggResult::Percentiles {
                values: percentile_values(data.get("values")),
            },
            AggShape::TopHits => {
                let hits = data.get("hits");
                AggResult::TopHits {
                    total: hits.and_then(|h| h.get("total")).map(total_value).unwrap_or(0),
                    max_score: hits.and_then(|h| h.get("max_score")).and_then(Value::as_f64),
                    hits: hits
                        .and_then(|h| h.get("hits"))
                        .and_then(Value::as_array)
                        .map(|items| items.iter().map(|hit| schemas.document(hit)).collect())
                        .unwrap_or_default(),
                }
            }
            AggShape::MultiBucket => {
                let buckets = match data.get("buckets") {
                    Some(Value::Array(items)) => items
                        .iter()
                        .map(|raw_bucket| build_bucket(agg, None, raw_bucket, schemas))
                        .collect::<Result<Vec<_>>>()?,
                    Some(Value::Object(keyed)) => keyed
                        .iter()
                        .map(|(key, raw_bucket)| build_bucket(agg, Some(key), raw_bucket, schemas))
                        .collect::<Result<Vec<_>>>()?,
                    _ => Vec::new(),
                };
                AggResult::Buckets {
                    buckets,
                    doc_count_error_upper_bound: data
                        .get("doc_count_error_upper_bound")
                        .and_then(Value::as_u64),
                    sum_other_doc_count: data.get("sum_other_doc_count").and_then(Value::as_u64),
                }
            }
            AggShape::SingleBucket => AggResult::SingleBucket {
                doc_count: data.get("doc_count").and_then(Value::as_u64).unwrap_or(0),
                aggregations: build_sub_aggs(agg, raw, schemas)?,
            },
        };
        Ok(result)
    }

    /// Metric value of a single-value aggregation
    pub fn value(&self) -> Option<f64> {
        match self {
            AggResult::SingleValue { value, .. } => *value,
            _ => None,
        }
    }

    pub fn buckets(&self) -> &[Bucket] {
        match self {
            AggResult::Buckets { buckets, .. } => buckets,
            _ => &[],
        }
    }

    pub fn doc_count(&self) -> Option<u64> {
        match self {
            AggResult::SingleBucket { doc_count, .. } => Some(*doc_count),
            _ => None,
        }
    }

    /// Sub-aggregation of a single-bucket aggregation
    pub fn get_aggregation(&self, name: &str) -> Option<&AggResult> {
        match self {
            AggResult::SingleBucket { aggregations, .. } => aggregations.get(name),
            _ => None,
        }
    }
}

fn build_bucket(agg: &Agg, key: Option<&str>, raw: &Value, schemas: &HitSchemas) -> Result<Bucket> {
    let key = match key {
        Some(key) => Value::from(key),
        None => raw.get("key").cloned().unwrap_or(Value::Null),
    };
    Ok(Bucket {
        key,
        key_as_string: raw
            .get("key_as_string")
            .and_then(Value::as_str)
            .map(String::from),
        doc_count: raw.get("doc_count").and_then(Value::as_u64).unwrap_or(0),
        aggregations: build_sub_aggs(agg, raw, schemas)?,
    })
}

fn build_sub_aggs(
    agg: &Agg,
    raw: &Value,
    schemas: &HitSchemas,
) -> Result<IndexMap<String, AggResult>> {
    let mut results = IndexMap::new();
    for (name, sub_agg) in &agg.aggs {
        if let Some(raw_sub) = raw.get(name) {
            results.insert(name.clone(), AggResult::build(sub_agg, raw_sub, schemas)?);
        }
    }
    Ok(results)
}

/// Percentiles come keyed (`{"50.0": 3}`) or as a list of `{key, value}`
fn percentile_values(raw: Option<&Value>) -> IndexMap<String, Option<f64>> {
    match raw {
        Some(Value::Object(values)) => values
            .iter()
            .map(|(k, v)| (k.clone(), v.as_f64()))
            .collect(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| {
                let key = item.get("key")?;
                let key = match key {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                Some((key, item.get("value").and_then(Value::as_f64)))
            })
            .collect(),
        _ => IndexMap::new(),
    }
}

/// Hit total as a legacy number or a `{value, relation}` object
pub(crate) fn total_value(total: &Value) -> u64 {
    match total {
        Value::Number(n) => n.as_u64().unwrap_or(0),
        other => other.get("value").and_then(Value::as_u64).unwrap_or(0),
    }
}
