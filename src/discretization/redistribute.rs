//! Migration of elements and nodes to a new partition.
use super::pack::{pack_element, pack_node, unpack_element, unpack_node};
use super::{Discretization, Node};
use crate::comm::all_gather_array;
use crate::element::Element;
use crate::error::{Error, Result};
use crate::Gid;
use log::info;
use mpfe_pack::{PackBuffer, UnpackBuffer};
use rustc_hash::FxHashMap;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Packs elements together with their nodes, one buffer per target rank.
fn pack_for_targets<'a>(
    size: usize,
    nodes: &BTreeMap<Gid, Node>,
    outgoing: impl Iterator<Item = (usize, &'a Element)> + Clone,
) -> Result<Vec<Vec<u8>>> {
    let pack_all = |buffers: &mut Vec<PackBuffer>| -> Result<()> {
        for (target, element) in outgoing.clone() {
            let buffer = &mut buffers[target];
            pack_element(buffer, element)?;
            for gid in element.node_ids() {
                let node = nodes.get(gid).ok_or_else(|| {
                    Error::Connectivity(format!("Node {} of element {} is missing", gid, element.gid()))
                })?;
                pack_node(buffer, node)?;
            }
        }
        Ok(())
    };
    let mut buffers: Vec<PackBuffer> = (0..size).map(|_| PackBuffer::new()).collect();
    pack_all(&mut buffers)?;
    buffers.iter_mut().for_each(PackBuffer::start_packing);
    pack_all(&mut buffers)?;
    Ok(buffers
        .into_iter()
        .map(PackBuffer::finish)
        .collect::<std::result::Result<Vec<_>, _>>()?)
}

/// Unpacks a stream written by [`pack_for_targets`].
fn unpack_from_sources(dis: &Discretization, received: &[Vec<u8>]) -> Result<(Vec<Element>, Vec<Node>)> {
    let mut elements = Vec::new();
    let mut nodes = Vec::new();
    for bytes in received {
        let mut reader = UnpackBuffer::new(bytes);
        while !reader.is_at_end() {
            let element = unpack_element(&mut reader, &dis.registry, &dis.materials)?;
            for _ in 0..element.node_ids().len() {
                nodes.push(unpack_node(&mut reader)?);
            }
            elements.push(element);
        }
    }
    Ok((elements, nodes))
}

impl Discretization {
    /// Moves every owned element to the rank given by `partition` and rebuilds the maps.
    /// Collective.
    ///
    /// Owned elements missing from `partition` stay on this rank. Afterwards every node is owned
    /// by the lowest rank that owns an adjacent element, and every element is ghosted on all ranks
    /// owning one of its nodes. Nodes without adjacent elements stay with their current owner.
    /// All states are dropped.
    pub fn redistribute(&mut self, partition: &BTreeMap<Gid, usize>) -> Result<()> {
        let comm = Arc::clone(&self.comm);
        let rank = comm.rank();
        let size = comm.size();
        if let Some((gid, target)) = partition.iter().find(|(_, &target)| target >= size) {
            return Err(Error::Configuration(format!(
                "Element {} is assigned to rank {}, but there are only {} ranks",
                gid, target, size
            )));
        }

        // Phase 1: send owned elements with their nodes to their new owners
        let owned: Vec<&Element> = self.elements.values().filter(|e| e.owner() == rank).collect();
        let send = pack_for_targets(
            size,
            &self.nodes,
            owned
                .iter()
                .map(|e| (partition.get(&e.gid()).copied().unwrap_or(rank), *e)),
        )?;
        let received = comm.all_to_all(send)?;
        let (mut new_owned, migrated_nodes) = unpack_from_sources(self, &received)?;
        for element in &mut new_owned {
            element.owner = rank;
        }

        // Phase 2: the lowest rank with an adjacent owned element owns a node
        let adjacent: BTreeSet<Gid> = new_owned
            .iter()
            .flat_map(|e| e.node_ids().iter().copied())
            .collect();
        let adjacent: Vec<Gid> = adjacent.into_iter().collect();
        let mut node_owner: FxHashMap<Gid, usize> = FxHashMap::default();
        for (source, gids) in all_gather_array(comm.as_ref(), &adjacent)?.iter().enumerate() {
            for gid in gids {
                node_owner.entry(*gid).or_insert(source);
            }
        }

        let mut nodes: BTreeMap<Gid, Node> = BTreeMap::new();
        for node in migrated_nodes.into_iter() {
            nodes.entry(node.gid).or_insert(node);
        }
        // Orphan nodes stay where they are
        for node in self.nodes.values() {
            if node.owner == rank && !node_owner.contains_key(&node.gid) {
                nodes.insert(node.gid, node.clone());
            }
        }

        // Phase 3: ghost owned elements on every other rank owning one of their nodes
        let mut ghost_targets = Vec::new();
        for element in &new_owned {
            let targets: BTreeSet<usize> = element
                .node_ids()
                .iter()
                .filter_map(|gid| node_owner.get(gid).copied())
                .filter(|&owner| owner != rank)
                .collect();
            ghost_targets.extend(targets.into_iter().map(|target| (target, element)));
        }
        let send = pack_for_targets(size, &nodes, ghost_targets.iter().copied())?;
        let received = comm.all_to_all(send)?;
        let (ghosts, ghost_nodes) = unpack_from_sources(self, &received)?;

        for node in ghost_nodes {
            nodes.entry(node.gid).or_insert(node);
        }
        for node in nodes.values_mut() {
            if let Some(&owner) = node_owner.get(&node.gid) {
                node.owner = owner;
            }
        }

        let mut elements = BTreeMap::new();
        for element in new_owned.into_iter().chain(ghosts) {
            elements.entry(element.gid()).or_insert(element);
        }

        info!(
            "Redistributed {} on rank {}: {} elements ({} owned), {} nodes",
            self.name,
            rank,
            elements.len(),
            elements.values().filter(|e: &&Element| e.owner() == rank).count(),
            nodes.len()
        );

        self.nodes = nodes;
        self.duplicate_nodes.clear();
        self.elements = elements;
        self.reset();
        self.fill_complete()
    }
}
