//! Space and time dependent functions referenced by conditions and kernels.
use crate::error::{Error, Result};
use nalgebra::Point3;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Function {
    Constant { value: f64 },
    /// `offset + slope * t`
    LinearInTime { offset: f64, slope: f64 },
    /// Piecewise linear interpolation in time, constant beyond the first and last sample.
    Piecewise { times: Vec<f64>, values: Vec<f64> },
    /// A constant vector, one value per component.
    Components { values: Vec<f64> },
}

impl Function {
    pub fn evaluate(&self, component: usize, _x: &Point3<f64>, t: f64) -> Result<f64> {
        match self {
            Function::Constant { value } => Ok(*value),
            Function::LinearInTime { offset, slope } => Ok(offset + slope * t),
            Function::Piecewise { times, values } => {
                if times.is_empty() || times.len() != values.len() {
                    return Err(Error::Configuration(
                        "Piecewise function needs the same, non-zero number of times and values".to_string(),
                    ));
                }
                let n = times.len();
                if t <= times[0] {
                    return Ok(values[0]);
                }
                if t >= times[n - 1] {
                    return Ok(values[n - 1]);
                }
                let k = times.partition_point(|&ti| ti <= t);
                let (t0, t1) = (times[k - 1], times[k]);
                let (v0, v1) = (values[k - 1], values[k]);
                Ok(v0 + (v1 - v0) * (t - t0) / (t1 - t0))
            }
            Function::Components { values } => values.get(component).copied().ok_or_else(|| {
                Error::Configuration(format!(
                    "Component {} requested from a function with {} components",
                    component,
                    values.len()
                ))
            }),
        }
    }
}

/// Function table. Function ids are 1-based, as in input records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionManager {
    functions: Vec<Function>,
}

impl FunctionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_functions(functions: Vec<Function>) -> Self {
        Self { functions }
    }

    /// Appends a function and returns its id.
    pub fn add(&mut self, function: Function) -> usize {
        self.functions.push(function);
        self.functions.len()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    pub fn get(&self, id: usize) -> Result<&Function> {
        id.checked_sub(1)
            .and_then(|idx| self.functions.get(idx))
            .ok_or_else(|| Error::Configuration(format!("Unknown function id {}", id)))
    }

    pub fn evaluate(&self, id: usize, component: usize, x: &Point3<f64>, t: f64) -> Result<f64> {
        self.get(id)?.evaluate(component, x, t)
    }
}
