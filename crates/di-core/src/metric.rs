//! Distance metrics and the distance-to-similarity normalisation.

use std::fmt;
use std::str::FromStr;

use crate::error::IndexerError;

/// Distance metric fixed per collection.
///
/// Stores report raw distances (lower is closer). [`Metric::similarity`]
/// turns them into scores where higher is closer, so match lists can be
/// ordered the same way regardless of metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Raw distance is `1 - cos(a, b)`.
    #[serde(alias = "cos")]
    Cosine,
    /// Raw distance is the euclidean distance.
    #[serde(alias = "l2", alias = "euclidean")]
    L2Norm,
    /// Raw distance is the negated dot product.
    #[serde(alias = "dot", alias = "ip", alias = "inner_product")]
    DotProduct,
}

impl Default for Metric {
    fn default() -> Self {
        Self::Cosine
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cosine => write!(f, "cosine"),
            Self::L2Norm => write!(f, "l2_norm"),
            Self::DotProduct => write!(f, "dot_product"),
        }
    }
}

impl FromStr for Metric {
    type Err = IndexerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cosine" | "cos" => Ok(Self::Cosine),
            "l2_norm" | "l2" | "euclidean" => Ok(Self::L2Norm),
            "dot_product" | "dot" | "ip" | "inner_product" => Ok(Self::DotProduct),
            other => Err(IndexerError::InvalidConfig(format!("unknown distance metric '{other}'"))),
        }
    }
}

impl Metric {
    /// Map a raw store distance to a similarity. Strictly decreasing in
    /// `distance` for every metric.
    #[inline]
    pub fn similarity(self, distance: f32) -> f32 {
        match self {
            Self::Cosine => 1.0 - distance,
            Self::L2Norm => 1.0 / (1.0 + distance.max(0.0)),
            Self::DotProduct => -distance,
        }
    }
}
