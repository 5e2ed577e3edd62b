//! The plan DAG.
//!
//! Nodes are keyed by opaque string ids and kept in insertion order so
//! traversal is deterministic. Edges run from producer to consumer and may
//! carry a join-leg label. The graph is strictly acyclic; `add_edge`
//! verifies this.

use crate::errors::{Error, Result};

/// Opaque stable node id
pub type Nid = String;

/// Mint a random node id for an inserted node.
pub fn random_nid() -> Nid {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Which leg of a join an edge feeds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinLeg {
    Left,
    Right,
}

/// A producer → consumer edge with an optional join-leg label
pub type Edge = (Nid, Nid, Option<JoinLeg>);

/// A DAG of plan nodes with deterministic traversal order.
#[derive(Debug, Clone, Default)]
pub struct PlanGraph<N> {
    nodes: Vec<(Nid, N)>,
    edges: Vec<Edge>,
}

impl<N> PlanGraph<N> {
    pub fn new() -> Self {
        PlanGraph {
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    /// Insert or replace the node with this id, preserving its position.
    pub fn add_node(&mut self, nid: impl Into<Nid>, node: N) {
        let nid = nid.into();
        if let Some(existing) = self.nodes.iter_mut().find(|(id, _)| *id == nid) {
            existing.1 = node;
        } else {
            self.nodes.push((nid, node));
        }
    }

    pub fn contains(&self, nid: &str) -> bool {
        self.nodes.iter().any(|(id, _)| id == nid)
    }

    pub fn get(&self, nid: &str) -> Option<&N> {
        self.nodes.iter().find(|(id, _)| id == nid).map(|(_, n)| n)
    }

    pub fn get_mut(&mut self, nid: &str) -> Option<&mut N> {
        self.nodes
            .iter_mut()
            .find(|(id, _)| id == nid)
            .map(|(_, n)| n)
    }

    /// Nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = (&Nid, &N)> {
        self.nodes.iter().map(|(id, n)| (id, n))
    }

    pub fn node_ids(&self) -> Vec<Nid> {
        self.nodes.iter().map(|(id, _)| id.clone()).collect()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Add a producer → consumer edge. Duplicate edges are ignored; an edge
    /// that would close a cycle is an internal error.
    pub fn add_edge(
        &mut self,
        source: impl Into<Nid>,
        target: impl Into<Nid>,
        label: Option<JoinLeg>,
    ) -> Result<()> {
        let source = source.into();
        let target = target.into();
        if self
            .edges
            .iter()
            .any(|(s, t, _)| *s == source && *t == target)
        {
            return Ok(());
        }
        if source == target || self.reaches(&target, &source) {
            return Err(Error::InvalidInternalState(format!(
                "edge {source} -> {target} would create a cycle"
            )));
        }
        self.edges.push((source, target, label));
        Ok(())
    }

    /// Is there a path from `from` to `to` along edges?
    fn reaches(&self, from: &str, to: &str) -> bool {
        let mut stack = vec![from.to_string()];
        let mut seen = std::collections::HashSet::new();
        while let Some(current) = stack.pop() {
            if current == to {
                return true;
            }
            if !seen.insert(current.clone()) {
                continue;
            }
            for (source, target, _) in &self.edges {
                if *source == current {
                    stack.push(target.clone());
                }
            }
        }
        false
    }

    pub fn remove_edge(&mut self, source: &str, target: &str) {
        self.edges
            .retain(|(s, t, _)| !(s == source && t == target));
    }

    /// Edges feeding `nid`, in insertion order.
    pub fn ingoing_edges(&self, nid: &str) -> Vec<Edge> {
        self.edges
            .iter()
            .filter(|(_, t, _)| t == nid)
            .cloned()
            .collect()
    }

    /// Edges leaving `nid`, in insertion order.
    pub fn outgoing_edges(&self, nid: &str) -> Vec<Edge> {
        self.edges
            .iter()
            .filter(|(s, _, _)| s == nid)
            .cloned()
            .collect()
    }

    /// Nodes with no incoming edges (the scans), in insertion order.
    pub fn get_entry_points(&self) -> Vec<Nid> {
        self.nodes
            .iter()
            .map(|(id, _)| id.clone())
            .filter(|id| self.ingoing_edges(id).is_empty())
            .collect()
    }

    /// Nodes with no outgoing edges (the head), in insertion order.
    pub fn get_exit_points(&self) -> Vec<Nid> {
        self.nodes
            .iter()
            .map(|(id, _)| id.clone())
            .filter(|id| self.outgoing_edges(id).is_empty())
            .collect()
    }

    /// The single exit point, or an internal error.
    pub fn exit_point(&self) -> Result<Nid> {
        let exits = self.get_exit_points();
        if exits.len() != 1 {
            return Err(Error::InvalidInternalState(format!(
                "plan has {} heads, expected exactly 1",
                exits.len()
            )));
        }
        Ok(exits[0].clone())
    }

    /// Insert `node` between `target` and all of its producers. The
    /// rewired producer edges keep their labels; the new edge into
    /// `target` is unlabelled.
    pub fn insert_node_before(
        &mut self,
        new_nid: impl Into<Nid>,
        node: N,
        target: &str,
    ) -> Result<()> {
        let new_nid = new_nid.into();
        self.add_node(new_nid.clone(), node);
        for (source, _, label) in self.ingoing_edges(target) {
            self.remove_edge(&source, target);
            self.add_edge(source, new_nid.clone(), label)?;
        }
        self.add_edge(new_nid, target.to_string(), None)
    }

    /// Insert `node` between `source` and all of its consumers.
    pub fn insert_node_after(
        &mut self,
        new_nid: impl Into<Nid>,
        node: N,
        source: &str,
    ) -> Result<()> {
        let new_nid = new_nid.into();
        self.add_node(new_nid.clone(), node);
        for (_, target, label) in self.outgoing_edges(source) {
            self.remove_edge(source, &target);
            self.add_edge(new_nid.clone(), target, label)?;
        }
        self.add_edge(source.to_string(), new_nid, None)
    }

    /// Remove a node. With `heal` each producer is reconnected to each
    /// consumer, preserving the producer edge's label; without it the
    /// graph is left disconnected.
    pub fn remove_node(&mut self, nid: &str, heal: bool) -> Result<()> {
        if heal {
            let ingoing = self.ingoing_edges(nid);
            let outgoing = self.outgoing_edges(nid);
            for (source, _, label) in &ingoing {
                for (_, target, _) in &outgoing {
                    self.add_edge(source.clone(), target.clone(), *label)?;
                }
            }
        }
        self.edges.retain(|(s, t, _)| s != nid && t != nid);
        self.nodes.retain(|(id, _)| id != nid);
        Ok(())
    }

    /// The ordered path from `nid` to an exit point, starting with `nid`.
    pub fn trace_to_root(&self, nid: &str) -> Vec<Nid> {
        let mut path = vec![nid.to_string()];
        let mut current = nid.to_string();
        while let Some((_, parent, _)) = self.outgoing_edges(&current).first().cloned() {
            if path.contains(&parent) {
                break;
            }
            path.push(parent.clone());
            current = parent;
        }
        path
    }

    /// All nodes in a deterministic order with scans (leaves) first:
    /// post-order from the exit points, ties broken by edge insertion
    /// order.
    pub fn depth_first_search_flat(&self) -> Vec<Nid> {
        let mut ordered = Vec::new();
        let mut seen = std::collections::HashSet::new();
        for exit in self.get_exit_points() {
            self.post_order(&exit, &mut seen, &mut ordered);
        }
        ordered
    }

    fn post_order(
        &self,
        nid: &str,
        seen: &mut std::collections::HashSet<Nid>,
        ordered: &mut Vec<Nid>,
    ) {
        if !seen.insert(nid.to_string()) {
            return;
        }
        for (source, _, _) in self.ingoing_edges(nid) {
            self.post_order(&source, seen, ordered);
        }
        ordered.push(nid.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear_graph() -> PlanGraph<&'static str> {
        // scan -> filter -> project (exit)
        let mut graph = PlanGraph::new();
        graph.add_node("scan", "scan");
        graph.add_node("filter", "filter");
        graph.add_node("project", "project");
        graph.add_edge("scan", "filter", None).expect("acyclic");
        graph.add_edge("filter", "project", None).expect("acyclic");
        graph
    }

    #[test]
    fn entry_and_exit_points() {
        let graph = linear_graph();
        assert_eq!(graph.get_entry_points(), vec!["scan".to_string()]);
        assert_eq!(graph.get_exit_points(), vec!["project".to_string()]);
        assert_eq!(graph.exit_point().expect("single exit"), "project");
    }

    #[test]
    fn cycles_are_rejected() {
        let mut graph = linear_graph();
        assert!(graph.add_edge("project", "scan", None).is_err());
        assert!(graph.add_edge("scan", "scan", None).is_err());
    }

    #[test]
    fn insert_before_rewires_producers() {
        let mut graph = linear_graph();
        graph
            .insert_node_before("new", "new", "filter")
            .expect("insert succeeds");
        // scan -> new -> filter
        assert_eq!(graph.ingoing_edges("new")[0].0, "scan");
        assert_eq!(graph.outgoing_edges("new")[0].1, "filter");
        assert!(graph.ingoing_edges("filter").iter().all(|(s, _, _)| s == "new"));
    }

    #[test]
    fn insert_after_rewires_consumers_and_keeps_labels() {
        let mut graph = PlanGraph::new();
        graph.add_node("left", "left");
        graph.add_node("join", "join");
        graph
            .add_edge("left", "join", Some(JoinLeg::Left))
            .expect("acyclic");
        graph
            .insert_node_after("filter", "filter", "left")
            .expect("insert succeeds");
        // left -> filter -> join, with the leg label surviving on the
        // filter -> join edge
        let (_, _, label) = graph.outgoing_edges("filter")[0].clone();
        assert_eq!(label, Some(JoinLeg::Left));
        assert_eq!(graph.outgoing_edges("left")[0].1, "filter");
    }

    #[test]
    fn remove_with_heal_reconnects() {
        let mut graph = linear_graph();
        graph.remove_node("filter", true).expect("removal succeeds");
        assert_eq!(graph.outgoing_edges("scan")[0].1, "project");
        assert!(!graph.contains("filter"));
    }

    #[test]
    fn remove_without_heal_disconnects() {
        let mut graph = linear_graph();
        graph
            .remove_node("filter", false)
            .expect("removal succeeds");
        assert!(graph.outgoing_edges("scan").is_empty());
        assert!(graph.ingoing_edges("project").is_empty());
    }

    #[test]
    fn trace_to_root_walks_upward() {
        let graph = linear_graph();
        assert_eq!(
            graph.trace_to_root("scan"),
            vec!["scan".to_string(), "filter".to_string(), "project".to_string()]
        );
    }

    #[test]
    fn dfs_flat_yields_scans_first() {
        let mut graph = PlanGraph::new();
        graph.add_node("left_scan", "left_scan");
        graph.add_node("right_scan", "right_scan");
        graph.add_node("join", "join");
        graph.add_node("exit", "exit");
        graph
            .add_edge("left_scan", "join", Some(JoinLeg::Left))
            .expect("acyclic");
        graph
            .add_edge("right_scan", "join", Some(JoinLeg::Right))
            .expect("acyclic");
        graph.add_edge("join", "exit", None).expect("acyclic");
        let order = graph.depth_first_search_flat();
        assert_eq!(order[0], "left_scan");
        assert_eq!(order[1], "right_scan");
        assert_eq!(order.last().map(String::as_str), Some("exit"));
    }
}
