//! Request parameters for list and aggregation queries

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Flat `{"path__path__operator": value}` dictionary
pub type QueryDict = Map<String, Value>;

/// Parameters of a list query
///
/// Every container defaults to a fresh empty value, so a missing
/// `filter_dict` can never leak state between calls.
///
/// # Example
/// ```rust
/// use dictquery::core::query::ListParams;
///
/// let params: ListParams = serde_json::from_str(r#"{
///     "filter_dict": {"attribute__description__icontains": "temp", "value__gt": 2},
///     "exclude_dict": {"variant": "draft"},
///     "order_by": ["-value", "attribute__description"]
/// }"#).unwrap();
/// assert_eq!(params.order_by.len(), 2);
/// assert!(params.limit.is_none());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListParams {
    /// Conjunctive filter terms
    pub filter_dict: QueryDict,

    /// Conjunctive terms, each negated
    pub exclude_dict: QueryDict,

    /// Ordering paths, `-` prefix for descending
    pub order_by: Vec<String>,

    /// Optional row limit the caller applies to the built query
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl ListParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter_dict.insert(path.into(), value.into());
        self
    }

    pub fn exclude(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.exclude_dict.insert(path.into(), value.into());
        self
    }

    pub fn order(mut self, path: impl Into<String>) -> Self {
        self.order_by.push(path.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Parameters of an aggregation query
///
/// `agg` is kept as raw JSON and validated when the aggregation is built, so
/// malformed specs are reported with the offending key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregateParams {
    pub filter_dict: QueryDict,

    pub exclude_dict: QueryDict,

    pub group_by: Vec<String>,

    /// `{result_key: {"field": ..., "function": ...}}`
    pub agg: Map<String, Value>,

    /// Ordering over group by columns and aggregate keys, `-` for descending
    pub order_by: Vec<String>,
}

impl AggregateParams {
    /// The filtering part of the request, as list parameters
    pub fn list_params(&self) -> ListParams {
        ListParams {
            filter_dict: self.filter_dict.clone(),
            exclude_dict: self.exclude_dict.clone(),
            order_by: Vec::new(),
            limit: None,
        }
    }
}

/// Parameters of a dimension listing
///
/// `key` selects the dimension whose values are listed; listing the
/// dimension keys themselves ignores it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DimensionParams {
    pub filter_dict: QueryDict,

    pub exclude_dict: QueryDict,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

impl DimensionParams {
    pub fn list_params(&self) -> ListParams {
        ListParams {
            filter_dict: self.filter_dict.clone(),
            exclude_dict: self.exclude_dict.clone(),
            order_by: Vec::new(),
            limit: None,
        }
    }
}
