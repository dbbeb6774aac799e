//! Level-set transport on top of a one-step-theta integrator.
use super::participant::{StepParticipant, StepView};
use crate::comm::all_gather_array;
use crate::config::LevelSetConfig;
use crate::discretization::Discretization;
use crate::error::{Error, Result};
use crate::linalg::DistributedVector;
use crate::Gid;
use itertools::Itertools;
use log::debug;
use mpfe_pack::{PackBuffer, UnpackBuffer};
use nalgebra::{DVector, Point3};
use std::any::Any;

/// Intermediate level-set fields and the reinitialization companion `phi*`.
///
/// `phi*` is only touched by [`LevelSet::update_reinit`] during reinitialization and does not
/// take part in the rotation of the integrator state. With a non-zero reinitialization interval,
/// every accepted step whose number is a multiple of the interval replaces `phi*` by the signed
/// distance to the zero level of the accepted field.
#[derive(Debug, Clone)]
pub struct LevelSet {
    phinptheta: DVector<f64>,
    phidtnptheta: DVector<f64>,
    phistar: Option<DVector<f64>>,
    num_reinit_updates: usize,
    reinit_interval: usize,
}

impl LevelSet {
    pub fn new() -> Self {
        Self {
            phinptheta: DVector::zeros(0),
            phidtnptheta: DVector::zeros(0),
            phistar: None,
            num_reinit_updates: 0,
            reinit_interval: 0,
        }
    }

    pub fn from_config(config: &LevelSetConfig) -> Self {
        Self::new().with_reinit_interval(config.reinit_interval)
    }

    /// Reinitializes every `interval` accepted steps. Zero disables reinitialization.
    pub fn with_reinit_interval(mut self, interval: usize) -> Self {
        self.reinit_interval = interval;
        self
    }

    pub fn reinit_interval(&self) -> usize {
        self.reinit_interval
    }

    /// `phi_{n+theta} = (1 - theta) phi_n + theta phi_{n+1}` of the last solved step.
    pub fn phinptheta(&self) -> &DVector<f64> {
        &self.phinptheta
    }

    /// `dphi/dt_{n+theta}`, interpolated like [`LevelSet::phinptheta`].
    pub fn phidtnptheta(&self) -> &DVector<f64> {
        &self.phidtnptheta
    }

    pub fn phistar(&self) -> Option<&DVector<f64>> {
        self.phistar.as_ref()
    }

    pub fn num_reinit_updates(&self) -> usize {
        self.num_reinit_updates
    }

    /// Stores the result of one reinitialization iteration as the new `phi*`.
    pub fn update_reinit(&mut self, phi: &DVector<f64>) -> Result<()> {
        if let Some(phistar) = &self.phistar {
            if phistar.len() != phi.len() {
                return Err(Error::Connectivity(format!(
                    "Reinitialized level set has {} entries, expected {}",
                    phi.len(),
                    phistar.len()
                )));
            }
        }
        self.phistar = Some(phi.clone());
        self.num_reinit_updates += 1;
        Ok(())
    }
}

impl Default for LevelSet {
    fn default() -> Self {
        Self::new()
    }
}

impl StepParticipant for LevelSet {
    fn name(&self) -> &str {
        "level_set"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn init(&mut self, view: &StepView) -> Result<()> {
        self.phinptheta = view.state.phin.owned().clone();
        self.phidtnptheta = view.state.phidtn.owned().clone();
        self.phistar = Some(view.state.phin.owned().clone());
        Ok(())
    }

    /// The level set is always advanced from the last converged field.
    fn allows_explicit_predictor(&self) -> bool {
        false
    }

    fn post_solve(&mut self, view: &StepView) -> Result<()> {
        let theta = view.theta;
        let state = view.state;
        self.phinptheta = state.phin.owned() * (1.0 - theta) + state.phinp.owned() * theta;
        self.phidtnptheta = state.phidtn.owned() * (1.0 - theta) + state.phidtnp.owned() * theta;
        Ok(())
    }

    fn update(&mut self, view: &StepView) -> Result<()> {
        if self.reinit_interval == 0 || view.step % self.reinit_interval != 0 {
            return Ok(());
        }
        let phi = signed_distance(view.dis, &view.state.phin)?;
        self.update_reinit(&phi)?;
        debug!(
            "Reinitialized level set of {} after step {} ({} updates)",
            view.dis.name(),
            view.step,
            self.num_reinit_updates
        );
        Ok(())
    }

    fn write_restart(&self, buffer: &mut PackBuffer) -> Result<()> {
        let phistar = self.phistar.as_ref().map(|v| v.as_slice()).unwrap_or(&[]);
        buffer.add_pod(self.phistar.is_some())?;
        buffer.add_pod(phistar.len())?;
        buffer.add_array(phistar)?;
        Ok(())
    }

    fn read_restart(&mut self, view: &StepView, buffer: &mut UnpackBuffer) -> Result<()> {
        let present: bool = buffer.extract_pod()?;
        let len: usize = buffer.extract_pod()?;
        let values: Vec<f64> = buffer.extract_array(len)?;
        self.phistar = present.then(|| DVector::from_vec(values));
        self.phinptheta = view.state.phin.owned().clone();
        self.phidtnptheta = view.state.phidtn.owned().clone();
        Ok(())
    }
}

/// Signed distance of the owned nodes to the zero level of the scalar field `phi`.
///
/// The zero level is approximated by the nodes where `phi` vanishes and by linear interpolation
/// between every pair of nodes of an element whose values differ in sign. A field without a zero
/// level is returned unchanged. Collective.
pub fn signed_distance(dis: &Discretization, phi: &DistributedVector) -> Result<DVector<f64>> {
    let comm = dis.comm().as_ref();
    let global = phi.gather_global(comm)?;
    let dof_of = |gid: Gid| -> Result<Gid> {
        let dofs = dis.dofs_of_node(gid)?;
        if dofs.len() != 1 {
            return Err(Error::Configuration(format!(
                "Level-set reinitialization needs a scalar field, node {} has {} DOFs",
                gid,
                dofs.len()
            )));
        }
        Ok(dofs.start)
    };

    let mut interface: Vec<f64> = Vec::new();
    for element in dis.owned_elements() {
        let coords = dis.element_coords(element)?;
        let values = element
            .node_ids()
            .iter()
            .map(|&gid| -> Result<f64> { Ok(global[dof_of(gid)?]) })
            .collect::<Result<Vec<f64>>>()?;
        for (x, &value) in coords.iter().zip(&values) {
            if value == 0.0 {
                interface.extend(x.coords.iter());
            }
        }
        for (i, j) in (0..values.len()).tuple_combinations() {
            let (a, b) = (values[i], values[j]);
            if a * b < 0.0 {
                let crossing = coords[i] + (coords[j] - coords[i]) * (a / (a - b));
                interface.extend(crossing.coords.iter());
            }
        }
    }

    let points: Vec<Point3<f64>> = all_gather_array(comm, &interface)?
        .into_iter()
        .flatten()
        .collect::<Vec<f64>>()
        .chunks_exact(3)
        .map(|c| Point3::new(c[0], c[1], c[2]))
        .collect();

    let mut result = phi.owned().clone();
    if points.is_empty() {
        return Ok(result);
    }
    let map = phi.map();
    for node in dis.owned_nodes() {
        let dof = dof_of(node.gid())?;
        let lid = map.local_index(dof).ok_or_else(|| {
            Error::Connectivity(format!("DOF {} of owned node {} is not owned", dof, node.gid()))
        })?;
        let distance = points
            .iter()
            .map(|p| (p - node.coords()).norm())
            .fold(f64::INFINITY, f64::min);
        result[lid] = if result[lid] < 0.0 { -distance } else { distance };
    }
    Ok(result)
}
