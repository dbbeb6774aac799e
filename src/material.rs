//! Material parameter records and the material table.
use crate::element::Kinematics;
use crate::error::{Error, Result};
use crate::Gid;
use log::debug;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, OnceLock};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MaterialKind {
    /// Scalar transport with diffusivity and capacity.
    Scatra,
    /// Fourier heat conduction.
    Fourier,
    StVenantKirchhoff,
    /// Multiscale material whose Gauss points carry micro-scale state.
    MicroMaterial,
}

impl Display for MaterialKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Real(f64),
    Text(String),
}

/// A material record as given in the input: id, kind and untyped key-value parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialRecord {
    pub id: usize,
    pub kind: MaterialKind,
    #[serde(default)]
    pub params: BTreeMap<String, ParamValue>,
}

impl MaterialRecord {
    pub fn new(id: usize, kind: MaterialKind) -> Self {
        Self {
            id,
            kind,
            params: BTreeMap::new(),
        }
    }

    pub fn with_real(mut self, key: &str, value: f64) -> Self {
        self.params.insert(key.to_string(), ParamValue::Real(value));
        self
    }

    pub fn with_int(mut self, key: &str, value: i64) -> Self {
        self.params.insert(key.to_string(), ParamValue::Int(value));
        self
    }

    pub fn with_text(mut self, key: &str, value: &str) -> Self {
        self.params.insert(key.to_string(), ParamValue::Text(value.to_string()));
        self
    }
}

/// Parameters in the form consumed by element kernels.
#[derive(Debug, Clone, PartialEq)]
pub enum QuickParams {
    Transport { diffusivity: f64, capacity: f64 },
    Elastic { young: f64, poisson: f64, density: f64 },
}

/// Accumulated control actions of one micro-scale Gauss point.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MicroState {
    pub restart_reads: usize,
    pub invana_inits: usize,
}

/// A validated material.
#[derive(Debug)]
pub struct Material {
    record: MaterialRecord,
    quick: OnceLock<QuickParams>,
    micro_states: Mutex<FxHashMap<(Gid, usize), MicroState>>,
}

impl Material {
    /// Validates the record and installs the quick-access parameters.
    pub fn from_record(record: MaterialRecord) -> Result<Self> {
        let material = Self {
            record,
            quick: OnceLock::new(),
            micro_states: Mutex::new(FxHashMap::default()),
        };
        let quick = material.build_quick_params()?;
        material.install_quick_params(quick)?;
        Ok(material)
    }

    pub fn id(&self) -> usize {
        self.record.id
    }

    pub fn kind(&self) -> MaterialKind {
        self.record.kind
    }

    pub fn record(&self) -> &MaterialRecord {
        &self.record
    }

    pub fn real(&self, key: &str) -> Result<f64> {
        match self.record.params.get(key) {
            Some(ParamValue::Real(value)) => Ok(*value),
            Some(ParamValue::Int(value)) => Ok(*value as f64),
            Some(ParamValue::Text(_)) => Err(Error::Configuration(format!(
                "Parameter {} of material {} must be numeric",
                key, self.record.id
            ))),
            None => Err(Error::Configuration(format!(
                "Material {} ({}) is missing required parameter {}",
                self.record.id, self.record.kind, key
            ))),
        }
    }

    fn real_or(&self, key: &str, default: f64) -> Result<f64> {
        if self.record.params.contains_key(key) {
            self.real(key)
        } else {
            Ok(default)
        }
    }

    fn build_quick_params(&self) -> Result<QuickParams> {
        let positive = |key: &str, value: f64| {
            if value > 0.0 {
                Ok(value)
            } else {
                Err(Error::Configuration(format!(
                    "Parameter {} of material {} must be positive, got {}",
                    key, self.record.id, value
                )))
            }
        };
        match self.record.kind {
            MaterialKind::Scatra => Ok(QuickParams::Transport {
                diffusivity: self.real("DIFFUSIVITY")?,
                capacity: positive("CAPACITY", self.real_or("CAPACITY", 1.0)?)?,
            }),
            MaterialKind::Fourier => Ok(QuickParams::Transport {
                diffusivity: self.real("CONDUCT")?,
                capacity: positive("CAPA", self.real("CAPA")?)?,
            }),
            MaterialKind::StVenantKirchhoff | MaterialKind::MicroMaterial => {
                let young = positive("YOUNG", self.real("YOUNG")?)?;
                let poisson = self.real("NUE")?;
                if !(-1.0..0.5).contains(&poisson) {
                    return Err(Error::Configuration(format!(
                        "Poisson ratio of material {} must lie in [-1, 0.5), got {}",
                        self.record.id, poisson
                    )));
                }
                Ok(QuickParams::Elastic {
                    young,
                    poisson,
                    density: self.real_or("DENS", 0.0)?,
                })
            }
        }
    }

    /// Installs the quick-access parameter block. This happens exactly once per material.
    pub fn install_quick_params(&self, params: QuickParams) -> Result<()> {
        self.quick.set(params).map_err(|_| {
            Error::Configuration(format!(
                "Quick-access parameters of material {} are already installed",
                self.record.id
            ))
        })
    }

    pub fn quick_params(&self) -> Result<&QuickParams> {
        self.quick.get().ok_or_else(|| {
            Error::Configuration(format!(
                "Quick-access parameters of material {} are not installed",
                self.record.id
            ))
        })
    }

    /// Returns `(diffusivity, capacity)` of a transport material.
    pub fn transport_params(&self) -> Result<(f64, f64)> {
        match self.quick_params()? {
            QuickParams::Transport { diffusivity, capacity } => Ok((*diffusivity, *capacity)),
            _ => Err(Error::Configuration(format!(
                "Material {} ({}) is not a transport material",
                self.record.id, self.record.kind
            ))),
        }
    }

    /// Returns `(young, poisson, density)` of an elastic material.
    pub fn elastic_params(&self) -> Result<(f64, f64, f64)> {
        match self.quick_params()? {
            QuickParams::Elastic {
                young,
                poisson,
                density,
            } => Ok((*young, *poisson, *density)),
            _ => Err(Error::Configuration(format!(
                "Material {} ({}) is not an elastic material",
                self.record.id, self.record.kind
            ))),
        }
    }

    /// Whether elements with the given kinematics may use this material.
    pub fn valid_kinematics(&self, kinematics: Kinematics) -> Result<()> {
        let valid = match self.record.kind {
            MaterialKind::Scatra | MaterialKind::Fourier => kinematics == Kinematics::Linear,
            MaterialKind::StVenantKirchhoff => true,
            MaterialKind::MicroMaterial => kinematics == Kinematics::NonlinearTotLag,
        };
        if valid {
            Ok(())
        } else {
            Err(Error::Configuration(format!(
                "Material {} ({}) does not support {} kinematics",
                self.record.id, self.record.kind, kinematics
            )))
        }
    }

    pub fn is_multiscale(&self) -> bool {
        self.record.kind == MaterialKind::MicroMaterial
    }

    /// Reads restart data of the micro-scale problem attached to a Gauss point.
    pub fn micro_read_restart(&self, element: Gid, gp: usize) {
        if self.is_multiscale() {
            self.micro_states.lock().entry((element, gp)).or_default().restart_reads += 1;
        }
    }

    /// Initializes the micro-scale problem of a Gauss point for inverse analysis.
    pub fn micro_invana_init(&self, element: Gid, gp: usize) {
        if self.is_multiscale() {
            self.micro_states.lock().entry((element, gp)).or_default().invana_inits += 1;
        }
    }

    pub fn micro_state(&self, element: Gid, gp: usize) -> Option<MicroState> {
        self.micro_states.lock().get(&(element, gp)).cloned()
    }
}

/// Table of all materials of a problem, keyed by material id.
#[derive(Debug, Default)]
pub struct MaterialTable {
    materials: BTreeMap<usize, Arc<Material>>,
}

impl MaterialTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: impl IntoIterator<Item = MaterialRecord>) -> Result<Self> {
        let mut table = Self::new();
        for record in records {
            table.insert(record)?;
        }
        Ok(table)
    }

    pub fn insert(&mut self, record: MaterialRecord) -> Result<Arc<Material>> {
        if self.materials.contains_key(&record.id) {
            return Err(Error::Configuration(format!("Duplicate material id {}", record.id)));
        }
        debug!("Registering material {} ({})", record.id, record.kind);
        let material = Arc::new(Material::from_record(record)?);
        self.materials.insert(material.id(), material.clone());
        Ok(material)
    }

    pub fn get(&self, id: usize) -> Result<Arc<Material>> {
        self.materials
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::Configuration(format!("Unknown material id {}", id)))
    }

    pub fn len(&self) -> usize {
        self.materials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }
}
