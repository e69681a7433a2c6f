//! Query options for vector search: the facade-wide default and the
//! per-call overlay.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{IndexerError, Result};
use crate::filter::FilterExpr;

/// Options applied to every query of a search call.
///
/// Used at two levels. The facade holds a default policy from its config
/// (`match_args`) and every call may bring an overlay parsed from request
/// parameters. [`QueryPolicy::merged_with`] is the only place the two meet.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QueryPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<FilterExpr>,
    /// Upper bound on matches per query. `None` means no bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    /// Matches scoring below this similarity are dropped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score_threshold: Option<f32>,
}

impl QueryPolicy {
    /// Overlay `overrides` on `self`. Every field set in `overrides` wins;
    /// unset fields fall back to `self`.
    pub fn merged_with(&self, overrides: &QueryPolicy) -> QueryPolicy {
        QueryPolicy {
            filter: overrides.filter.clone().or_else(|| self.filter.clone()),
            limit: overrides.limit.or(self.limit),
            score_threshold: overrides.score_threshold.or(self.score_threshold),
        }
    }

    /// Read the overlay keys out of request parameters. Keys other than
    /// `filter`, `limit` and `score_threshold` are ignored.
    pub fn from_params(params: &Map<String, Value>) -> Result<Self> {
        let filter = match params.get("filter") {
            None | Some(Value::Null) => None,
            Some(v) => Some(FilterExpr::from_json(v)?),
        };
        let limit = match params.get("limit") {
            None | Some(Value::Null) => None,
            Some(v) => Some(v.as_u64().map(|n| n as usize).ok_or_else(|| {
                IndexerError::invalid_request(format!("limit must be a non-negative integer, got {v}"))
            })?),
        };
        let score_threshold = match params.get("score_threshold") {
            None | Some(Value::Null) => None,
            Some(v) => Some(v.as_f64().map(|n| n as f32).ok_or_else(|| {
                IndexerError::invalid_request(format!("score_threshold must be a number, got {v}"))
            })?),
        };
        Ok(Self { filter, limit, score_threshold })
    }

    pub fn is_empty(&self) -> bool {
        self.filter.is_none() && self.limit.is_none() && self.score_threshold.is_none()
    }
}
