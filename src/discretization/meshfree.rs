use crate::error::{Error, Result};
use crate::Gid;
use mpfe_pack::{Pack, PackBuffer, PackError, Unpack, UnpackBuffer};

/// A bin of a spatial binning strategy. Unlike an [`Element`](crate::element::Element), its node
/// list changes during the simulation while id and owner stay fixed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeshfreeBin {
    gid: Gid,
    owner: usize,
    node_ids: Vec<Gid>,
}

impl MeshfreeBin {
    pub fn new(gid: Gid, owner: usize) -> Self {
        Self {
            gid,
            owner,
            node_ids: Vec::new(),
        }
    }

    pub fn gid(&self) -> Gid {
        self.gid
    }

    pub fn owner(&self) -> usize {
        self.owner
    }

    pub fn node_ids(&self) -> &[Gid] {
        &self.node_ids
    }

    pub fn num_nodes(&self) -> usize {
        self.node_ids.len()
    }

    pub fn add_node(&mut self, gid: Gid) {
        self.node_ids.push(gid);
    }

    /// Removes the first occurrence of a node.
    pub fn delete_node(&mut self, gid: Gid) -> Result<()> {
        let position = self
            .node_ids
            .iter()
            .position(|&id| id == gid)
            .ok_or_else(|| {
                Error::Connectivity(format!("No node with gid {} to delete in bin {}", gid, self.gid))
            })?;
        self.node_ids.remove(position);
        Ok(())
    }

    pub fn delete_all_nodes(&mut self) {
        self.node_ids.clear();
    }
}

impl Pack for MeshfreeBin {
    fn pack(&self, buffer: &mut PackBuffer) -> std::result::Result<(), PackError> {
        let mut object = buffer.begin_object()?;
        object.add_pod(self.gid)?;
        object.add_pod(self.owner)?;
        object.add_pod(self.node_ids.len())?;
        object.add_array(&self.node_ids)
    }
}

impl Unpack for MeshfreeBin {
    fn unpack(buffer: &mut UnpackBuffer) -> std::result::Result<Self, PackError> {
        let mut object = buffer.extract_object()?;
        let gid = object.extract_pod()?;
        let owner = object.extract_pod()?;
        let len: usize = object.extract_pod()?;
        let node_ids = object.extract_array(len)?;
        Ok(Self { gid, owner, node_ids })
    }
}
