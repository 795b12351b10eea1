//! Parameter grids and their deterministic enumeration.

use gs_types::{validation_error, Configuration, GsResult, ParameterValue};
use serde::{Deserialize, Serialize};

/// A single grid dimension: a parameter and its candidate values, in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterAxis {
    pub name: String,
    pub values: Vec<ParameterValue>,
}

/// The full grid. Axis order is insertion order and drives enumeration order.
///
/// Serialized as a list of axes rather than a JSON object so the order
/// survives a round trip through a config file.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ParameterGrid {
    pub parameters: Vec<ParameterAxis>,
}

impl ParameterGrid {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter. Re-adding an existing name replaces its values but
    /// keeps its original position.
    pub fn add<I, V>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<ParameterValue>,
    {
        let name = name.into();
        let values: Vec<ParameterValue> = values.into_iter().map(Into::into).collect();

        match self.parameters.iter_mut().find(|axis| axis.name == name) {
            Some(axis) => axis.values = values,
            None => self.parameters.push(ParameterAxis { name, values }),
        }
        self
    }

    /// Number of configurations in the grid, or `None` on overflow.
    pub fn size(&self) -> Option<usize> {
        self.parameters
            .iter()
            .try_fold(1usize, |total, axis| total.checked_mul(axis.values.len()))
    }

    pub fn is_empty(&self) -> bool {
        self.size() == Some(0)
    }

    /// Lazily enumerate every configuration. The first parameter varies
    /// slowest; each call starts over and yields the same sequence.
    pub fn iter(&self) -> ConfigurationIter<'_> {
        ConfigurationIter {
            grid: self,
            indices: vec![0; self.parameters.len()],
            done: self.parameters.iter().any(|axis| axis.values.is_empty()),
        }
    }

    /// Refuse NaN and infinite values. They have no canonical key of their
    /// own, so they could never be recorded or resumed reliably.
    pub fn ensure_finite(&self) -> GsResult<()> {
        for axis in &self.parameters {
            if let Some(value) = axis.values.iter().find(|v| !v.is_finite()) {
                return Err(validation_error!(
                    "parameter {:?} has non-finite value {value}",
                    axis.name
                ));
            }
        }
        Ok(())
    }

    /// Check that `configuration` assigns an allowed value to every grid
    /// parameter and nothing else.
    pub fn validate(&self, configuration: &Configuration) -> GsResult<()> {
        for (name, value) in configuration.iter() {
            let axis = self
                .parameters
                .iter()
                .find(|axis| axis.name == name)
                .ok_or_else(|| validation_error!("unknown parameter {name:?}"))?;
            if !axis.values.contains(value) {
                return Err(validation_error!(
                    "value {value} is not allowed for parameter {name:?}"
                ));
            }
        }
        if let Some(missing) = self
            .parameters
            .iter()
            .find(|axis| configuration.get(&axis.name).is_none())
        {
            return Err(validation_error!("missing parameter {:?}", missing.name));
        }
        Ok(())
    }

    pub fn contains(&self, configuration: &Configuration) -> bool {
        self.validate(configuration).is_ok()
    }
}

impl<'a> IntoIterator for &'a ParameterGrid {
    type Item = Configuration;
    type IntoIter = ConfigurationIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Odometer over the grid's value indices.
#[derive(Debug, Clone)]
pub struct ConfigurationIter<'a> {
    grid: &'a ParameterGrid,
    indices: Vec<usize>,
    done: bool,
}

impl Iterator for ConfigurationIter<'_> {
    type Item = Configuration;

    fn next(&mut self) -> Option<Configuration> {
        if self.done {
            return None;
        }

        let configuration = self
            .grid
            .parameters
            .iter()
            .zip(&self.indices)
            .map(|(axis, &i)| (axis.name.clone(), axis.values[i].clone()))
            .collect();

        // Advance the last axis first; carry into earlier axes on wrap.
        self.done = true;
        for (axis, index) in self.grid.parameters.iter().zip(self.indices.iter_mut()).rev() {
            *index += 1;
            if *index < axis.values.len() {
                self.done = false;
                break;
            }
            *index = 0;
        }

        Some(configuration)
    }
}
