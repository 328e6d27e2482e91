//! Union-find over node ids, recording which collapsed tree node survives in place of which.

use std::collections::{HashMap, HashSet};

use crate::constants::system::MAX_REMAP_CHAIN;
use crate::error::{GraphError, Result};
use crate::models::NodeId;

#[derive(Debug, Clone, Default)]
pub struct RemapTable {
    links: HashMap<NodeId, NodeId>,
}

impl RemapTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Whether `id` was collapsed into another node
    pub fn is_remapped(&self, id: &NodeId) -> bool {
        self.links.contains_key(id)
    }

    /// Record that `from` collapses into `to`
    ///
    /// `to` is resolved first, so chains stay shallow; a link that would close a cycle is
    /// rejected.
    pub fn remap(&mut self, from: NodeId, to: NodeId) -> Result<()> {
        let target = self.find(&to)?;
        if target == from {
            return Err(GraphError::RemapCycle { node_id: from });
        }
        self.links.insert(from, target);
        Ok(())
    }

    /// Final survivor for `id`, compressing the path behind it
    pub fn find(&mut self, id: &NodeId) -> Result<NodeId> {
        let (root, path) = self.walk(id)?;
        for visited in path {
            self.links.insert(visited, root.clone());
        }
        Ok(root)
    }

    /// Final survivor for `id` without touching the table
    pub fn resolve(&self, id: &NodeId) -> Result<NodeId> {
        self.walk(id).map(|(root, _)| root)
    }

    fn walk(&self, id: &NodeId) -> Result<(NodeId, Vec<NodeId>)> {
        let mut current = id.clone();
        let mut path = Vec::new();
        let mut seen = HashSet::new();
        while let Some(next) = self.links.get(&current) {
            if !seen.insert(current.clone()) || path.len() >= MAX_REMAP_CHAIN {
                return Err(GraphError::RemapCycle { node_id: id.clone() });
            }
            path.push(current);
            current = next.clone();
        }
        Ok((current, path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(value: &str) -> NodeId {
        NodeId::from(value)
    }

    #[test]
    fn test_unmapped_id_is_its_own_root() {
        let mut table = RemapTable::new();
        assert_eq!(table.find(&id("7")).unwrap(), id("7"));
        assert!(table.is_empty());
    }

    #[test]
    fn test_chains_resolve_transitively() {
        let mut table = RemapTable::new();
        table.remap(id("9"), id("6")).unwrap();
        table.remap(id("6"), id("3")).unwrap();
        assert_eq!(table.resolve(&id("9")).unwrap(), id("3"));
        assert_eq!(table.find(&id("9")).unwrap(), id("3"));
        // compressed
        assert_eq!(table.links.get(&id("9")), Some(&id("3")));
    }

    #[test]
    fn test_cycle_is_rejected() {
        let mut table = RemapTable::new();
        table.remap(id("5"), id("4")).unwrap();
        let error = table.remap(id("4"), id("5")).unwrap_err();
        assert_eq!(error, GraphError::RemapCycle { node_id: id("4") });
        assert!(table.remap(id("8"), id("8")).is_err());
    }

    #[test]
    fn test_corrupt_cycle_fails_fast() {
        let mut table = RemapTable::new();
        table.links.insert(id("1"), id("2"));
        table.links.insert(id("2"), id("1"));
        assert!(matches!(
            table.find(&id("1")),
            Err(GraphError::RemapCycle { .. })
        ));
    }
}
