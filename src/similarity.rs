//! Distance-to-similarity normalization.
//!
//! The vector index reports raw distances under its configured metric;
//! ranking and thresholding work on bounded similarity scores where higher
//! means closer. The maps are pure and order-preserving.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// Distance metric the vector index is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// Cosine distance `1 - cos(a, b)`; similarity is `1 - d`.
    Cosine,
    /// Euclidean distance; similarity is `1 / (1 + d)`, in `(0, 1]`.
    L2,
    /// Inner product stored as the *negated* dot product, so similarity is
    /// `-d`. An index that reports raw positive inner products would invert
    /// ranking under this map — the bundled index honors the negated
    /// convention.
    Ip,
}

impl DistanceMetric {
    pub fn label(self) -> &'static str {
        match self {
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::L2 => "l2",
            DistanceMetric::Ip => "ip",
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for DistanceMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cosine" => Ok(DistanceMetric::Cosine),
            "l2" => Ok(DistanceMetric::L2),
            "ip" => Ok(DistanceMetric::Ip),
            other => Err(format!(
                "unknown distance metric '{}', expected cosine, l2, or ip",
                other
            )),
        }
    }
}

/// Convert raw distances into similarity scores, same length and order.
pub fn distances_to_similarities(distances: &[f64], metric: DistanceMetric) -> Vec<f64> {
    distances
        .iter()
        .map(|&d| match metric {
            DistanceMetric::Cosine => 1.0 - d,
            DistanceMetric::L2 => 1.0 / (1.0 + d),
            DistanceMetric::Ip => -d,
        })
        .collect()
}
