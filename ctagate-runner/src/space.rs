//! Parameter space — named axes of candidate values and their Cartesian
//! expansion into concrete settings.
//!
//! Axes expand in declaration order, with the first axis varying slowest.
//! That order is what makes brute-force rankings reproducible: candidates
//! keep a stable generation index that tie-breaking preserves.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One concrete assignment of values to every parameter axis.
///
/// Parameters keep declaration order, not alphabetical order, so two
/// settings from the same space always print their keys the same way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSetting {
    params: Vec<(String, f64)>,
}

impl ParameterSetting {
    pub fn new(params: Vec<(String, f64)>) -> Self {
        Self { params }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.params
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.params.iter().map(|(n, v)| (n.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Canonical string form, usable as a memoization key.
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ParameterSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (name, value)) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}: {value}")?;
        }
        write!(f, "}}")
    }
}

/// Errors detected when validating a space before expansion.
#[derive(Debug, Error, PartialEq)]
pub enum SpaceError {
    #[error("parameter '{name}' has no candidate values")]
    EmptyValues { name: String },
    #[error("parameter '{name}' declared more than once")]
    Duplicate { name: String },
    #[error("parameter '{name}' range step must be positive, got {step}")]
    NonPositiveStep { name: String, step: f64 },
    #[error("parameter '{name}' range start {start} exceeds end {end}")]
    InvertedRange { name: String, start: f64, end: f64 },
    #[error("parameter '{name}' contains a non-finite value {value}")]
    NonFinite { name: String, value: f64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Axis {
    Range { start: f64, end: f64, step: f64 },
    Values(Vec<f64>),
}

/// A set of named parameter axes to search over.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OptimizationSpace {
    axes: Vec<(String, Axis)>,
}

impl OptimizationSpace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an inclusive arithmetic range: start, start+step, ... while <= end.
    pub fn add_range(mut self, name: impl Into<String>, start: f64, end: f64, step: f64) -> Self {
        self.axes
            .push((name.into(), Axis::Range { start, end, step }));
        self
    }

    /// Add an explicit list of candidate values.
    pub fn add_values(mut self, name: impl Into<String>, values: Vec<f64>) -> Self {
        self.axes.push((name.into(), Axis::Values(values)));
        self
    }

    /// Add a parameter pinned to a single value.
    pub fn add_fixed(self, name: impl Into<String>, value: f64) -> Self {
        self.add_values(name, vec![value])
    }

    pub fn parameter_names(&self) -> Vec<&str> {
        self.axes.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// Check every axis before expansion. Empty axes and degenerate ranges
    /// fail here, not silently at expansion time.
    pub fn validate(&self) -> Result<(), SpaceError> {
        for (i, (name, axis)) in self.axes.iter().enumerate() {
            if self.axes[..i].iter().any(|(n, _)| n == name) {
                return Err(SpaceError::Duplicate { name: name.clone() });
            }
            match axis {
                Axis::Range { start, end, step } => {
                    for bound in [start, end, step] {
                        if !bound.is_finite() {
                            return Err(SpaceError::NonFinite {
                                name: name.clone(),
                                value: *bound,
                            });
                        }
                    }
                    if *step <= 0.0 {
                        return Err(SpaceError::NonPositiveStep {
                            name: name.clone(),
                            step: *step,
                        });
                    }
                    if start > end {
                        return Err(SpaceError::InvertedRange {
                            name: name.clone(),
                            start: *start,
                            end: *end,
                        });
                    }
                }
                Axis::Values(values) => {
                    if values.is_empty() {
                        return Err(SpaceError::EmptyValues { name: name.clone() });
                    }
                    if let Some(bad) = values.iter().find(|v| !v.is_finite()) {
                        return Err(SpaceError::NonFinite {
                            name: name.clone(),
                            value: *bad,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Candidate values along each axis, in declaration order.
    pub fn axis_values(&self) -> Vec<(String, Vec<f64>)> {
        self.axes
            .iter()
            .map(|(name, axis)| {
                let values = match axis {
                    Axis::Range { start, end, step } => {
                        let mut values = Vec::new();
                        let mut value = *start;
                        while value <= *end + 1e-12 {
                            values.push(value);
                            value += step;
                        }
                        values
                    }
                    Axis::Values(values) => values.clone(),
                };
                (name.clone(), values)
            })
            .collect()
    }

    /// Number of settings the Cartesian product yields. Zero axes give an
    /// empty product, not one empty setting.
    pub fn size(&self) -> usize {
        if self.axes.is_empty() {
            return 0;
        }
        self.axis_values().iter().map(|(_, v)| v.len()).product()
    }

    /// Expand into every concrete setting, first axis varying slowest.
    pub fn settings(&self) -> Result<Vec<ParameterSetting>, SpaceError> {
        self.validate()?;
        if self.axes.is_empty() {
            return Ok(Vec::new());
        }
        let axes = self.axis_values();
        let mut settings = vec![Vec::new()];
        for (name, values) in &axes {
            let mut next = Vec::with_capacity(settings.len() * values.len());
            for partial in &settings {
                for value in values {
                    let mut extended: Vec<(String, f64)> = partial.clone();
                    extended.push((name.clone(), *value));
                    next.push(extended);
                }
            }
            settings = next;
        }
        Ok(settings.into_iter().map(ParameterSetting::new).collect())
    }
}
