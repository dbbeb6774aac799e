//! Function table from (physics, cell shape, variant) to element kernels.
use crate::element::{CellShape, Element, ElementData, ElementKernel, PhysicsKind, ProblemVariant};
use crate::error::{Error, Result};
use crate::material::MaterialTable;
use crate::Gid;
use log::debug;
use rustc_hash::FxHashMap;
use std::fmt;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// Shapes for which kernels are instantiated. Requests for any other shape fail at factory time.
pub const INSTANTIATED_SHAPES: [CellShape; 14] = [
    CellShape::Hex8,
    CellShape::Hex20,
    CellShape::Hex27,
    CellShape::Tet4,
    CellShape::Tet10,
    CellShape::Quad4,
    CellShape::Quad9,
    CellShape::Tri3,
    CellShape::Tri6,
    CellShape::Line2,
    CellShape::Line3,
    CellShape::Nurbs9,
    CellShape::Nurbs27,
    CellShape::Pyramid5,
];

/// The restricted shape set instantiated for extended finite element problems.
pub const XFEM_SHAPES: [CellShape; 5] = [
    CellShape::Hex8,
    CellShape::Hex20,
    CellShape::Hex27,
    CellShape::Tet4,
    CellShape::Tet10,
];

/// Packs a registry key into a single tag.
pub fn pack_tag(physics: PhysicsKind, shape: CellShape, variant: ProblemVariant) -> u32 {
    (physics.code() as u32) << 16 | (shape.code() as u32) << 8 | variant.code() as u32
}

#[derive(Default, Clone)]
pub struct ElementRegistry {
    kernels: FxHashMap<u32, Arc<dyn ElementKernel>>,
}

impl Debug for ElementRegistry {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut tags: Vec<_> = self.kernels.keys().collect();
        tags.sort_unstable();
        f.debug_struct("ElementRegistry").field("tags", &tags).finish()
    }
}

impl ElementRegistry {
    /// An empty registry.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry with the kernels of every enabled physics family.
    pub fn with_defaults() -> Self {
        #[allow(unused_mut)]
        let mut registry = Self::empty();
        #[cfg(feature = "transport")]
        crate::element::transport::register(&mut registry);
        #[cfg(feature = "solid")]
        crate::element::solid::register(&mut registry);
        #[cfg(feature = "truss")]
        crate::element::truss::register(&mut registry);
        debug!("Element registry holds {} kernels", registry.len());
        registry
    }

    pub fn len(&self) -> usize {
        self.kernels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kernels.is_empty()
    }

    /// Registers a kernel under its own key, replacing any previous entry.
    ///
    /// # Panics
    ///
    /// Panics if the kernel shape is not instantiated.
    pub fn register(&mut self, kernel: Arc<dyn ElementKernel>) {
        assert!(
            INSTANTIATED_SHAPES.contains(&kernel.shape()),
            "Kernel shape {} is not instantiated",
            kernel.shape()
        );
        let tag = pack_tag(kernel.physics(), kernel.shape(), kernel.variant());
        self.kernels.insert(tag, kernel);
    }

    /// Looks up the kernel for the given key.
    pub fn provide(
        &self,
        physics: PhysicsKind,
        shape: CellShape,
        variant: ProblemVariant,
    ) -> Result<Arc<dyn ElementKernel>> {
        if !INSTANTIATED_SHAPES.contains(&shape) {
            return Err(Error::UnsupportedCellShape {
                shape,
                context: format!("no {} kernels are instantiated for this shape", physics),
            });
        }
        self.kernels
            .get(&pack_tag(physics, shape, variant))
            .cloned()
            .ok_or(Error::UnknownElementVariant {
                physics,
                shape,
                variant,
            })
    }

    /// Looks up the extended finite element kernel, which exists for a restricted shape set only.
    pub fn provide_xfem(&self, physics: PhysicsKind, shape: CellShape) -> Result<Arc<dyn ElementKernel>> {
        if !XFEM_SHAPES.contains(&shape) {
            return Err(Error::UnsupportedCellShape {
                shape,
                context: "extended finite elements are restricted to hexahedra and tetrahedra".to_string(),
            });
        }
        self.provide(physics, shape, ProblemVariant::Xfem)
    }

    /// Creates an element by reading its record with the matching kernel.
    #[allow(clippy::too_many_arguments)]
    pub fn create_element(
        &self,
        gid: Gid,
        owner: usize,
        physics: PhysicsKind,
        variant: ProblemVariant,
        shape: CellShape,
        node_ids: Vec<Gid>,
        linedef: &str,
        materials: &MaterialTable,
    ) -> Result<Element> {
        let kernel = match variant {
            ProblemVariant::Xfem => self.provide_xfem(physics, shape)?,
            _ => self.provide(physics, shape, variant)?,
        };
        let data = kernel.read_element(physics.element_type_name(), shape.name(), linedef, materials)?;
        Self::assemble_element(gid, owner, node_ids, kernel, data)
    }

    /// Creates an element from already validated element data.
    pub fn element_from_data(
        &self,
        gid: Gid,
        owner: usize,
        physics: PhysicsKind,
        variant: ProblemVariant,
        shape: CellShape,
        node_ids: Vec<Gid>,
        data: ElementData,
    ) -> Result<Element> {
        let kernel = self.provide(physics, shape, variant)?;
        Self::assemble_element(gid, owner, node_ids, kernel, data)
    }

    fn assemble_element(
        gid: Gid,
        owner: usize,
        node_ids: Vec<Gid>,
        kernel: Arc<dyn ElementKernel>,
        data: ElementData,
    ) -> Result<Element> {
        let shape = kernel.shape();
        if node_ids.len() != shape.num_nodes() {
            return Err(Error::Connectivity(format!(
                "Element {} of shape {} has {} nodes, expected {}",
                gid,
                shape,
                node_ids.len(),
                shape.num_nodes()
            )));
        }
        Ok(Element {
            gid,
            owner,
            node_ids,
            shape,
            physics: kernel.physics(),
            variant: kernel.variant(),
            data,
            kernel,
        })
    }
}
