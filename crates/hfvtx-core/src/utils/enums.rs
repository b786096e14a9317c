use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::HfvtxError;

/// A simple enum describing a binary sign, used for track charges.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sign {
    /// A positive indicator.
    Positive,
    /// A negative indicator.
    Negative,
}

impl Sign {
    /// The sign of a float, treating zero as positive.
    pub fn of(value: f64) -> Self {
        if value < 0.0 {
            Self::Negative
        } else {
            Self::Positive
        }
    }

    /// `+1.0` or `-1.0`.
    pub fn value(&self) -> f64 {
        match self {
            Sign::Positive => 1.0,
            Sign::Negative => -1.0,
        }
    }
}

impl Display for Sign {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Sign::Positive => write!(f, "+"),
            Sign::Negative => write!(f, "-"),
        }
    }
}

impl FromStr for Sign {
    type Err = HfvtxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_ref() {
            "+" | "plus" | "pos" | "positive" => Ok(Self::Positive),
            "-" | "minus" | "neg" | "negative" => Ok(Self::Negative),
            _ => Err(HfvtxError::ParseError {
                name: s.to_string(),
                object: "Sign".to_string(),
            }),
        }
    }
}

/// The metric in which the distance between two trajectories is minimized.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DcaMetric {
    /// Plain Euclidean distance; the vertex is the midpoint of the closest-approach points.
    Absolute,
    /// Distance weighted by the inverse of the summed position covariances; the vertex is the
    /// covariance-weighted mean of the closest-approach points.
    Weighted,
}

impl Display for DcaMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DcaMetric::Absolute => write!(f, "Absolute"),
            DcaMetric::Weighted => write!(f, "Weighted"),
        }
    }
}

impl FromStr for DcaMetric {
    type Err = HfvtxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "absolute" | "abs" | "euclidean" => Ok(Self::Absolute),
            "weighted" | "chi2" | "covariance" => Ok(Self::Weighted),
            _ => Err(HfvtxError::ParseError {
                name: s.to_string(),
                object: "DcaMetric".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_parsing() {
        assert_eq!("plus".parse::<Sign>().unwrap(), Sign::Positive);
        assert_eq!("-".parse::<Sign>().unwrap(), Sign::Negative);
        assert!("sideways".parse::<Sign>().is_err());
        assert_eq!(Sign::Negative.to_string(), "-");
        assert_eq!(Sign::of(-0.3), Sign::Negative);
        assert_eq!(Sign::of(0.0).value(), 1.0);
    }

    #[test]
    fn test_metric_parsing() {
        assert_eq!("ABS".parse::<DcaMetric>().unwrap(), DcaMetric::Absolute);
        assert_eq!("chi2".parse::<DcaMetric>().unwrap(), DcaMetric::Weighted);
        let err = "manhattan".parse::<DcaMetric>().unwrap_err();
        assert!(matches!(err, HfvtxError::ParseError { .. }));
    }
}
