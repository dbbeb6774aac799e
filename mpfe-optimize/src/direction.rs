use crate::group::AbstractGroup;
use crate::linear::LinearSolver;
use nalgebra::DVector;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;
use std::fmt::Display;

/// Computes a search direction from the current state of a group.
pub trait Direction {
    fn name(&self) -> &str;

    fn compute(
        &mut self,
        direction: &mut DVector<f64>,
        group: &mut dyn AbstractGroup,
        linear_solver: &mut dyn LinearSolver,
    ) -> Result<(), Box<dyn Error>>;
}

/// Newton direction `d = -J^{-1} F(x)`.
#[derive(Debug, Clone, Default)]
pub struct Newton;

impl Direction for Newton {
    fn name(&self) -> &str {
        "Newton"
    }

    fn compute(
        &mut self,
        direction: &mut DVector<f64>,
        group: &mut dyn AbstractGroup,
        linear_solver: &mut dyn LinearSolver,
    ) -> Result<(), Box<dyn Error>> {
        group.compute_newton(linear_solver)?;
        direction.copy_from(group.newton());
        Ok(())
    }
}

/// Fixed-point direction `d = F(x)`.
///
/// Intended for problems posed as `F(x) = G(x) - x`, where `x + d` is the next fixed-point
/// iterate. The direction carries no damping of its own, so it must be paired with a relaxing
/// line search such as [`Aitken`](crate::line_search::Aitken) to converge in general.
#[derive(Debug, Clone, Default)]
pub struct FixPoint;

impl Direction for FixPoint {
    fn name(&self) -> &str {
        "FixPoint"
    }

    fn compute(
        &mut self,
        direction: &mut DVector<f64>,
        group: &mut dyn AbstractGroup,
        _linear_solver: &mut dyn LinearSolver,
    ) -> Result<(), Box<dyn Error>> {
        group.compute_f()?;
        direction.copy_from(group.f());
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownDirection(pub String);

impl Display for UnknownDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "No direction registered under the name \"{}\"", self.0)
    }
}

impl Error for UnknownDirection {}

type DirectionConstructor = Box<dyn Fn() -> Box<dyn Direction> + Send + Sync>;

/// Builds directions by name, so that callers can select a direction from configuration
/// without naming a concrete type.
pub struct DirectionFactory {
    constructors: BTreeMap<String, DirectionConstructor>,
}

impl fmt::Debug for DirectionFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectionFactory")
            .field("names", &self.constructors.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for DirectionFactory {
    /// A factory with `Newton` and `FixPoint` registered.
    fn default() -> Self {
        let mut factory = Self::empty();
        factory.register("Newton", || Box::new(Newton));
        factory.register("FixPoint", || Box::new(FixPoint));
        factory
    }
}

impl DirectionFactory {
    pub fn empty() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }

    /// Registers a constructor. A previous registration under the same name is replaced.
    pub fn register<F>(&mut self, name: impl Into<String>, constructor: F)
    where
        F: Fn() -> Box<dyn Direction> + Send + Sync + 'static,
    {
        self.constructors.insert(name.into(), Box::new(constructor));
    }

    pub fn build(&self, name: &str) -> Result<Box<dyn Direction>, UnknownDirection> {
        self.constructors
            .get(name)
            .map(|constructor| constructor())
            .ok_or_else(|| UnknownDirection(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(String::as_str)
    }
}
