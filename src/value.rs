//! --- Multi-Dimensional Value ---
//! A contribution's worth is assessed along eight named dimensions rather than
//! a single scalar. `environmental` and `health` may go negative to record
//! harm; every other dimension is constrained to be non-negative.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValueError {
    #[error("Unknown value dimension: '{0}'")]
    UnknownDimension(String),
    #[error("Dimension '{0}' must be a finite number, got {1}")]
    NonFinite(Dimension, f64),
    #[error("Dimension '{0}' cannot be negative, got {1}")]
    Negative(Dimension, f64),
}

/// The eight value dimensions. The derived `Ord` follows declaration order,
/// which is also the canonical serialization order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Knowledge,
    Computation,
    Originality,
    Consciousness,
    Environmental,
    Health,
    Scalability,
    EthicalAlignment,
}

impl Dimension {
    pub const ALL: [Dimension; 8] = [
        Dimension::Knowledge,
        Dimension::Computation,
        Dimension::Originality,
        Dimension::Consciousness,
        Dimension::Environmental,
        Dimension::Health,
        Dimension::Scalability,
        Dimension::EthicalAlignment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Knowledge => "knowledge",
            Dimension::Computation => "computation",
            Dimension::Originality => "originality",
            Dimension::Consciousness => "consciousness",
            Dimension::Environmental => "environmental",
            Dimension::Health => "health",
            Dimension::Scalability => "scalability",
            Dimension::EthicalAlignment => "ethical_alignment",
        }
    }

    /// Harm dimensions may carry negative values.
    pub fn allows_negative(&self) -> bool {
        matches!(self, Dimension::Environmental | Dimension::Health)
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dimension {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Dimension::ALL
            .iter()
            .copied()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| ValueError::UnknownDimension(s.to_string()))
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ValueVector {
    #[serde(default)]
    pub knowledge: f64,
    #[serde(default)]
    pub computation: f64,
    #[serde(default)]
    pub originality: f64,
    #[serde(default)]
    pub consciousness: f64,
    #[serde(default)]
    pub environmental: f64,
    #[serde(default)]
    pub health: f64,
    #[serde(default)]
    pub scalability: f64,
    #[serde(default)]
    pub ethical_alignment: f64,
}

impl ValueVector {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn get(&self, dimension: Dimension) -> f64 {
        match dimension {
            Dimension::Knowledge => self.knowledge,
            Dimension::Computation => self.computation,
            Dimension::Originality => self.originality,
            Dimension::Consciousness => self.consciousness,
            Dimension::Environmental => self.environmental,
            Dimension::Health => self.health,
            Dimension::Scalability => self.scalability,
            Dimension::EthicalAlignment => self.ethical_alignment,
        }
    }

    pub fn set(&mut self, dimension: Dimension, value: f64) {
        let slot = match dimension {
            Dimension::Knowledge => &mut self.knowledge,
            Dimension::Computation => &mut self.computation,
            Dimension::Originality => &mut self.originality,
            Dimension::Consciousness => &mut self.consciousness,
            Dimension::Environmental => &mut self.environmental,
            Dimension::Health => &mut self.health,
            Dimension::Scalability => &mut self.scalability,
            Dimension::EthicalAlignment => &mut self.ethical_alignment,
        };
        *slot = value;
    }

    /// Builder-style setter, handy when assembling vectors in tests and templates.
    pub fn with(mut self, dimension: Dimension, value: f64) -> Self {
        self.set(dimension, value);
        self
    }

    pub fn add(&self, other: &ValueVector) -> ValueVector {
        self.zip_with(other, |a, b| a + b)
    }

    pub fn scale(&self, factor: f64) -> ValueVector {
        let mut out = *self;
        for d in Dimension::ALL {
            out.set(d, self.get(d) * factor);
        }
        out
    }

    /// Sum of every dimension, with negative harm dimensions contributing zero
    /// instead of subtracting.
    pub fn total_value(&self) -> f64 {
        Dimension::ALL
            .iter()
            .map(|d| {
                let v = self.get(*d);
                if d.allows_negative() {
                    v.max(0.0)
                } else {
                    v
                }
            })
            .sum()
    }

    /// All dimensions keyed by dimension, iterated in declaration order.
    pub fn to_map(&self) -> BTreeMap<Dimension, f64> {
        Dimension::ALL.iter().map(|d| (*d, self.get(*d))).collect()
    }

    /// Inverse of [`ValueVector::to_map`]. Missing dimensions default to 0.0.
    pub fn from_map(map: &BTreeMap<Dimension, f64>) -> Result<Self, ValueError> {
        let mut out = ValueVector::zero();
        for (d, v) in map {
            out.set(*d, *v);
        }
        out.validate()?;
        Ok(out)
    }

    /// Same as [`ValueVector::from_map`] but keyed by dimension name, as found
    /// in loosely-typed inputs such as configuration files.
    pub fn from_named_map<'a, I>(entries: I) -> Result<Self, ValueError>
    where
        I: IntoIterator<Item = (&'a str, f64)>,
    {
        let mut map = BTreeMap::new();
        for (name, v) in entries {
            map.insert(name.parse::<Dimension>()?, v);
        }
        Self::from_map(&map)
    }

    pub fn validate(&self) -> Result<(), ValueError> {
        for d in Dimension::ALL {
            let v = self.get(d);
            if !v.is_finite() {
                return Err(ValueError::NonFinite(d, v));
            }
            if v < 0.0 && !d.allows_negative() {
                return Err(ValueError::Negative(d, v));
            }
        }
        Ok(())
    }

    pub fn as_array(&self) -> [f64; 8] {
        Dimension::ALL.map(|d| self.get(d))
    }

    pub fn euclidean_distance(&self, other: &ValueVector) -> f64 {
        self.as_array()
            .iter()
            .zip(other.as_array().iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f64>()
            .sqrt()
    }

    /// Arithmetic mean of a set of vectors; `None` for an empty set.
    pub fn mean(vectors: &[ValueVector]) -> Option<ValueVector> {
        if vectors.is_empty() {
            return None;
        }
        let sum = vectors
            .iter()
            .fold(ValueVector::zero(), |acc, v| acc.add(v));
        Some(sum.scale(1.0 / vectors.len() as f64))
    }

    fn zip_with(&self, other: &ValueVector, f: impl Fn(f64, f64) -> f64) -> ValueVector {
        let mut out = ValueVector::zero();
        for d in Dimension::ALL {
            out.set(d, f(self.get(d), other.get(d)));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference_vector() -> ValueVector {
        ValueVector {
            knowledge: 9.0,
            computation: 7.0,
            originality: 8.0,
            consciousness: 2.0,
            environmental: 5.0,
            health: 6.0,
            scalability: 7.0,
            ethical_alignment: 8.0,
        }
    }

    #[test]
    fn total_value_sums_all_positive_dimensions() {
        assert_eq!(reference_vector().total_value(), 52.0);
    }

    #[test]
    fn negative_harm_dimensions_do_not_reduce_total() {
        let mut v = reference_vector();
        v.environmental = -20.0;
        v.health = -3.0;
        // 52 - 5 - 6 from the previously positive harm dimensions.
        assert_eq!(v.total_value(), 41.0);
        assert!(v.validate().is_ok());
    }

    #[test]
    fn negative_knowledge_is_rejected() {
        let v = ValueVector::zero().with(Dimension::Knowledge, -1.0);
        assert_eq!(
            v.validate(),
            Err(ValueError::Negative(Dimension::Knowledge, -1.0))
        );
    }

    #[test]
    fn non_finite_values_are_rejected() {
        let v = ValueVector::zero().with(Dimension::Health, f64::NAN);
        assert!(matches!(
            v.validate(),
            Err(ValueError::NonFinite(Dimension::Health, _))
        ));
    }

    #[test]
    fn to_map_preserves_declaration_order() {
        let keys: Vec<&str> = reference_vector()
            .to_map()
            .keys()
            .map(|d| d.as_str())
            .collect();
        assert_eq!(
            keys,
            vec![
                "knowledge",
                "computation",
                "originality",
                "consciousness",
                "environmental",
                "health",
                "scalability",
                "ethical_alignment"
            ]
        );
    }

    #[test]
    fn from_named_map_rejects_unknown_names() {
        let err = ValueVector::from_named_map([("wisdom", 1.0)]).unwrap_err();
        assert_eq!(err, ValueError::UnknownDimension("wisdom".to_string()));
    }

    #[test]
    fn scale_and_add_are_field_wise() {
        let v = reference_vector();
        let doubled = v.scale(2.0);
        assert_eq!(doubled, v.add(&v));
        assert_eq!(doubled.total_value(), 104.0);
    }

    #[test]
    fn mean_and_distance() {
        let a = ValueVector::zero().with(Dimension::Knowledge, 2.0);
        let b = ValueVector::zero().with(Dimension::Knowledge, 4.0);
        let mean = ValueVector::mean(&[a, b]).unwrap();
        assert_eq!(mean.knowledge, 3.0);
        assert_eq!(a.euclidean_distance(&b), 2.0);
        assert!(ValueVector::mean(&[]).is_none());
    }

    #[test]
    fn serde_uses_snake_case_dimension_names() {
        let json = serde_json::to_string(&Dimension::EthicalAlignment).unwrap();
        assert_eq!(json, "\"ethical_alignment\"");
        assert_eq!(
            "ethical_alignment".parse::<Dimension>().unwrap(),
            Dimension::EthicalAlignment
        );
    }
}
