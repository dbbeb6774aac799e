//! Problem configuration, read once at startup and passed explicitly to every component.
use crate::condition::Condition;
use crate::element::{CellShape, PhysicsKind, ProblemVariant};
use crate::error::{Error, Result};
use crate::function::FunctionManager;
use crate::material::MaterialRecord;
use crate::result_test::ResultExpectation;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MeshConfig {
    /// `cells` line cells between `0` and `length` along the x-axis.
    Line { length: f64, cells: usize, shape: CellShape },
    /// A `size[0] x size[1]` rectangle in the xy-plane.
    Rectangle { size: [f64; 2], cells: [usize; 2] },
    Box { size: [f64; 3], cells: [usize; 3] },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementConfig {
    pub physics: PhysicsKind,
    #[serde(default = "default_variant")]
    pub variant: ProblemVariant,
    /// Element record without shape, e.g. `MAT 1 KINEM linear`.
    pub linedef: String,
}

fn default_variant() -> ProblemVariant {
    ProblemVariant::Standard
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SchemeConfig {
    OneStepTheta { theta: f64 },
    Bdf2,
    Stationary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeIntegrationConfig {
    pub scheme: SchemeConfig,
    pub time_step: f64,
    pub num_steps: usize,
    /// Wraps the scheme in the hybrid (particle) integrator.
    #[serde(default)]
    pub hybrid: bool,
    #[serde(default = "default_true")]
    pub initial_time_derivative: bool,
    #[serde(default)]
    pub explicit_predictor: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LineSearchConfig {
    FullStep,
    Backtracking { sufficient_decrease: f64, min_step: f64 },
    Aitken { initial_relaxation: f64, max_relaxation: f64 },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinearSolverConfig {
    DenseLu,
    SparseCholesky,
    ConjugateGradient,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NonlinearSolverConfig {
    /// Name of the direction in the direction factory, e.g. `Newton` or `FixPoint`.
    pub direction: String,
    pub line_search: LineSearchConfig,
    pub linear_solver: LinearSolverConfig,
    pub tolerance: f64,
    pub max_iterations: usize,
}

impl Default for NonlinearSolverConfig {
    fn default() -> Self {
        Self {
            direction: "Newton".to_string(),
            line_search: LineSearchConfig::FullStep,
            linear_solver: LinearSolverConfig::DenseLu,
            tolerance: 1e-10,
            max_iterations: 20,
        }
    }
}

/// A 0D compartment attached to one node of the field.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReducedModelConfig {
    pub node: usize,
    pub resistance: f64,
    pub compliance: f64,
    pub coupling: f64,
    #[serde(default)]
    pub initial_pressure: f64,
}

/// Level-set bookkeeping of a `LevelSet` element variant.
#[derive(Debug, Copy, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelSetConfig {
    /// Reinitialize to a signed distance every this many steps. Zero disables reinitialization.
    pub reinit_interval: usize,
}

/// Penalty parameters of beam-to-solid meshtying.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeamToSolidConfig {
    pub penalty_parameter: f64,
    #[serde(default)]
    pub rotational_penalty_parameter: Option<f64>,
}

impl BeamToSolidConfig {
    pub fn validate(&self) -> Result<()> {
        if self.penalty_parameter < 0.0 {
            return Err(Error::Configuration(format!(
                "Beam-to-solid meshtying penalty parameter must not be negative, got {}",
                self.penalty_parameter
            )));
        }
        if let Some(rotational) = self.rotational_penalty_parameter {
            if rotational < 0.0 {
                return Err(Error::Configuration(format!(
                    "Beam-to-solid rotational penalty parameter must not be negative, got {}",
                    rotational
                )));
            }
        }
        Ok(())
    }
}

/// Cloning of the field into a second physics, e.g. scatra into thermo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloneConfig {
    pub target_name: String,
    /// Material of the cloned elements.
    pub material: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    pub restart_dir: PathBuf,
    /// Write a restart every this many steps. Zero disables restart output.
    #[serde(default)]
    pub restart_every: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            restart_dir: PathBuf::from("restart"),
            restart_every: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProblemConfig {
    pub name: String,
    pub mesh: MeshConfig,
    pub element: ElementConfig,
    pub materials: Vec<MaterialRecord>,
    #[serde(default)]
    pub functions: FunctionManager,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    pub time_integration: TimeIntegrationConfig,
    #[serde(default)]
    pub nonlinear_solver: NonlinearSolverConfig,
    #[serde(default)]
    pub reduced_model: Option<ReducedModelConfig>,
    #[serde(default)]
    pub level_set: LevelSetConfig,
    #[serde(default)]
    pub beam_to_solid: Option<BeamToSolidConfig>,
    #[serde(default)]
    pub clone: Option<CloneConfig>,
    #[serde(default)]
    pub result_tests: Vec<ResultExpectation>,
    #[serde(default)]
    pub output: OutputConfig,
}

impl ProblemConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|err| Error::Configuration(format!("Invalid configuration: {}", err)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|err| Error::Configuration(format!("Cannot read {}: {}", path.display(), err)))?;
        Self::from_json_str(&json)
    }

    /// Checks everything that can be checked before the first evaluation.
    pub fn validate(&self) -> Result<()> {
        if let Some(beam_to_solid) = &self.beam_to_solid {
            beam_to_solid.validate()?;
        }
        let ti = &self.time_integration;
        if !(ti.time_step > 0.0) {
            return Err(Error::Configuration(format!(
                "Time step must be positive, got {}",
                ti.time_step
            )));
        }
        if let SchemeConfig::OneStepTheta { theta } = ti.scheme {
            if !(theta > 0.0 && theta <= 1.0) {
                return Err(Error::Configuration(format!("Theta must lie in (0, 1], got {}", theta)));
            }
        }
        if let Some(reduced) = &self.reduced_model {
            if !(reduced.resistance > 0.0 && reduced.compliance > 0.0) || reduced.coupling < 0.0 {
                return Err(Error::Configuration(
                    "Reduced model needs positive resistance and compliance and a non-negative coupling".to_string(),
                ));
            }
        }
        match self.mesh {
            MeshConfig::Line { cells, .. } if cells == 0 => Err(Error::Configuration("Empty line mesh".to_string())),
            MeshConfig::Rectangle { cells, .. } if cells.contains(&0) => {
                Err(Error::Configuration("Empty rectangle mesh".to_string()))
            }
            MeshConfig::Box { cells, .. } if cells.contains(&0) => {
                Err(Error::Configuration("Empty box mesh".to_string()))
            }
            _ => Ok(()),
        }
    }
}
