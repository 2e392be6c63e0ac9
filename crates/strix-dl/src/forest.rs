//! The interpretation forest: tableau individuals and their role edges.
//!
//! Nodes live in an arena and refer to each other by index, never by
//! reference; edges are (target-index, role-set) records owned by the
//! source node. Every mutation is either an append or a flag write, so a
//! choice point can capture a node as a handful of lengths and booleans
//! and restore it exactly by truncation. Backtracking then reduces to
//! truncating the arena and replaying the per-node snapshots.

use smallvec::SmallVec;
use std::collections::HashMap;
use strix_core::{ConceptRef, DependencySet, RoleId};

/// Index handle of one tableau individual.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub u32);

impl NodeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A pending concept on an individual's to-do or cardinality queue.
#[derive(Debug, Clone)]
pub struct Obligation {
    pub concept: ConceptRef,
    pub deps: DependencySet,
    /// Choice-point depth at which the obligation was queued.
    pub level: u32,
}

/// A universal restriction registered on an individual, applied to every
/// current and future successor reachable by an equal-or-sub role.
#[derive(Debug, Clone)]
pub struct UniversalObligation {
    pub role: RoleId,
    pub filler: ConceptRef,
    pub deps: DependencySet,
    pub level: u32,
}

/// One labeled edge to a successor. A pair of individuals can be connected
/// by several entries; the effective role set is the union.
#[derive(Debug, Clone)]
pub struct Edge {
    pub target: NodeId,
    pub roles: SmallVec<[RoleId; 2]>,
    pub deps: DependencySet,
}

/// Records which obligation spawned an individual. Two individuals
/// carrying a marker for the same obligation stand for successors that a
/// minimum-cardinality restriction requires to be distinct, so they may
/// never merge. Markers inherited through a merge carry the merge's
/// dependencies.
#[derive(Debug, Clone)]
pub struct CreationMarker {
    pub node: NodeId,
    pub concept: ConceptRef,
    pub deps: DependencySet,
}

/// Outcome of asserting a concept on an individual.
#[derive(Debug)]
pub enum AddLabel {
    /// New fact; the caller queues the matching obligation.
    Added,
    /// Already present; nothing to do.
    Present,
    /// The negation is already present; the set explains the conflict.
    Clash(DependencySet),
}

/// One tableau individual.
#[derive(Debug, Clone)]
pub struct Individual {
    pub parent: Option<NodeId>,
    /// Roles on the edge from the parent; appended to on merges.
    pub parent_roles: SmallVec<[RoleId; 2]>,
    pub edges: Vec<Edge>,
    /// Asserted concepts, append-only; parallel index map for lookups.
    labels: Vec<(ConceptRef, DependencySet, u32)>,
    label_index: HashMap<ConceptRef, u32>,
    pub todo: Vec<Obligation>,
    pub todo_cursor: usize,
    pub universals: Vec<UniversalObligation>,
    /// Cardinality obligations, processed after the to-do list drains.
    pub card: Vec<Obligation>,
    pub card_cursor: usize,
    /// Which existential/cardinality obligations this node answers for.
    /// Grows on merge; two nodes sharing an entry may never be merged.
    pub created_by: SmallVec<[CreationMarker; 1]>,
    pub blocked_by: Option<NodeId>,
    /// Logically destroyed: merged away.
    pub skip: bool,
    pub merged_into: Option<NodeId>,
    /// Carries a literal or datatype label.
    pub data_vertex: bool,
    /// Positive model-cache hit: treated as fully expanded.
    pub cached: bool,
}

impl Individual {
    fn new(parent: Option<NodeId>, parent_roles: SmallVec<[RoleId; 2]>) -> Self {
        Self {
            parent,
            parent_roles,
            edges: Vec::new(),
            labels: Vec::new(),
            label_index: HashMap::new(),
            todo: Vec::new(),
            todo_cursor: 0,
            universals: Vec::new(),
            card: Vec::new(),
            card_cursor: 0,
            created_by: SmallVec::new(),
            blocked_by: None,
            skip: false,
            merged_into: None,
            data_vertex: false,
            cached: false,
        }
    }

    pub fn has_label(&self, c: ConceptRef) -> bool {
        self.label_index.contains_key(&c)
    }

    pub fn label_deps(&self, c: ConceptRef) -> Option<&DependencySet> {
        self.label_index
            .get(&c)
            .map(|&i| &self.labels[i as usize].1)
    }

    pub fn labels(&self) -> impl Iterator<Item = &(ConceptRef, DependencySet, u32)> {
        self.labels.iter()
    }

    pub fn label_count(&self) -> usize {
        self.labels.len()
    }

    /// Pending work on either queue.
    pub fn has_pending(&self) -> bool {
        self.todo_cursor < self.todo.len() || self.card_cursor < self.card.len()
    }
}

/// Restorable image of one individual: lengths, cursors, flags.
#[derive(Debug, Clone)]
pub struct NodeSnapshot {
    labels_len: u32,
    edges_len: u32,
    parent_roles_len: u32,
    todo_len: u32,
    todo_cursor: u32,
    universals_len: u32,
    card_len: u32,
    card_cursor: u32,
    created_by_len: u32,
    blocked_by: Option<NodeId>,
    skip: bool,
    merged_into: Option<NodeId>,
    data_vertex: bool,
    cached: bool,
}

/// The growable set of tableau individuals.
#[derive(Debug, Default)]
pub struct Forest {
    nodes: Vec<Individual>,
}

impl Forest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &Individual {
        &self.nodes[id.index()]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Individual {
        &mut self.nodes[id.index()]
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len() as u32).map(NodeId)
    }

    pub fn add_root(&mut self) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Individual::new(None, SmallVec::new()));
        id
    }

    /// Create a successor of `parent` connected by `roles`.
    pub fn add_child(
        &mut self,
        parent: NodeId,
        roles: SmallVec<[RoleId; 2]>,
        deps: DependencySet,
        created_by: CreationMarker,
    ) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        let mut child = Individual::new(Some(parent), roles.clone());
        child.created_by.push(created_by);
        self.nodes.push(child);
        self.nodes[parent.index()].edges.push(Edge {
            target: id,
            roles,
            deps,
        });
        id
    }

    /// Add an edge between two existing individuals (ABox assertions,
    /// merge rewiring). Always a fresh entry; never mutates an old one.
    pub fn add_edge(
        &mut self,
        from: NodeId,
        to: NodeId,
        roles: SmallVec<[RoleId; 2]>,
        deps: DependencySet,
    ) {
        self.nodes[from.index()].edges.push(Edge {
            target: to,
            roles,
            deps,
        });
    }

    /// Follow merge forwarding to the surviving representative.
    pub fn resolve(&self, mut id: NodeId) -> NodeId {
        while let Some(next) = self.nodes[id.index()].merged_into {
            id = next;
        }
        id
    }

    /// Assert a concept; detects an immediate complement clash.
    pub fn add_label(
        &mut self,
        id: NodeId,
        concept: ConceptRef,
        deps: DependencySet,
        level: u32,
    ) -> AddLabel {
        let node = &mut self.nodes[id.index()];
        if node.label_index.contains_key(&concept) {
            return AddLabel::Present;
        }
        if let Some(&i) = node.label_index.get(&concept.neg()) {
            let conflict = deps.unioned(&node.labels[i as usize].1);
            return AddLabel::Clash(conflict);
        }
        let pos = node.labels.len() as u32;
        node.labels.push((concept, deps, level));
        node.label_index.insert(concept, pos);
        AddLabel::Added
    }

    /// An individual excluded from expansion and from the final model:
    /// merged away, or inside a blocked subtree.
    pub fn is_active(&self, id: NodeId) -> bool {
        let mut cur = id;
        loop {
            let node = &self.nodes[cur.index()];
            if node.skip || node.merged_into.is_some() {
                return false;
            }
            // the blocked node itself stays excluded from expansion
            if node.blocked_by.is_some() {
                return false;
            }
            match node.parent {
                Some(p) => cur = p,
                None => return true,
            }
        }
    }

    /// Like `is_active`, but the directly blocked individual counts as
    /// live: its labels anchor the blocking test and the model.
    pub fn is_live(&self, id: NodeId) -> bool {
        let node = &self.nodes[id.index()];
        if node.skip || node.merged_into.is_some() {
            return false;
        }
        match node.parent {
            Some(p) => self.is_active(p),
            None => true,
        }
    }

    pub fn snapshot(&self) -> Vec<NodeSnapshot> {
        self.nodes
            .iter()
            .map(|n| NodeSnapshot {
                labels_len: n.labels.len() as u32,
                edges_len: n.edges.len() as u32,
                parent_roles_len: n.parent_roles.len() as u32,
                todo_len: n.todo.len() as u32,
                todo_cursor: n.todo_cursor as u32,
                universals_len: n.universals.len() as u32,
                card_len: n.card.len() as u32,
                card_cursor: n.card_cursor as u32,
                created_by_len: n.created_by.len() as u32,
                blocked_by: n.blocked_by,
                skip: n.skip,
                merged_into: n.merged_into,
                data_vertex: n.data_vertex,
                cached: n.cached,
            })
            .collect()
    }

    /// Roll the forest back to a snapshot: discard growth, restore every
    /// surviving node's cursors and flags.
    pub fn restore(&mut self, forest_len: usize, snapshots: &[NodeSnapshot]) {
        self.nodes.truncate(forest_len);
        for (node, snap) in self.nodes.iter_mut().zip(snapshots) {
            for (c, _, _) in node.labels.drain(snap.labels_len as usize..) {
                node.label_index.remove(&c);
            }
            node.edges.truncate(snap.edges_len as usize);
            node.parent_roles.truncate(snap.parent_roles_len as usize);
            node.todo.truncate(snap.todo_len as usize);
            node.todo_cursor = snap.todo_cursor as usize;
            node.universals.truncate(snap.universals_len as usize);
            node.card.truncate(snap.card_len as usize);
            node.card_cursor = snap.card_cursor as usize;
            node.created_by.truncate(snap.created_by_len as usize);
            node.blocked_by = snap.blocked_by;
            node.skip = snap.skip;
            node.merged_into = snap.merged_into;
            node.data_vertex = snap.data_vertex;
            node.cached = snap.cached;
        }
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn marker(node: NodeId, concept: ConceptRef) -> CreationMarker {
        CreationMarker {
            node,
            concept,
            deps: DependencySet::new(),
        }
    }

    #[test]
    fn labels_detect_complement_clash() {
        let mut f = Forest::new();
        let n = f.add_root();
        let c = ConceptRef(5);
        assert!(matches!(
            f.add_label(n, c, DependencySet::singleton(2), 2),
            AddLabel::Added
        ));
        assert!(matches!(
            f.add_label(n, c, DependencySet::new(), 0),
            AddLabel::Present
        ));
        match f.add_label(n, c.neg(), DependencySet::singleton(4), 4) {
            AddLabel::Clash(deps) => {
                assert_eq!(deps.iter().collect::<Vec<_>>(), vec![2, 4]);
            }
            other => panic!("expected clash, got {other:?}"),
        }
    }

    #[test]
    fn restore_truncates_growth_and_flags() {
        let mut f = Forest::new();
        let root = f.add_root();
        f.add_label(root, ConceptRef(3), DependencySet::new(), 0);
        let snap = f.snapshot();
        let len = f.len();

        let child = f.add_child(
            root,
            SmallVec::from_slice(&[RoleId(0)]),
            DependencySet::new(),
            marker(root, ConceptRef(7)),
        );
        f.add_label(root, ConceptRef(9), DependencySet::new(), 1);
        f.node_mut(root).skip = true;
        assert_eq!(f.len(), 2);
        assert!(f.node(root).has_label(ConceptRef(9)));
        let _ = child;

        f.restore(len, &snap);
        assert_eq!(f.len(), 1);
        assert!(f.node(root).has_label(ConceptRef(3)));
        assert!(!f.node(root).has_label(ConceptRef(9)));
        assert!(!f.node(root).skip);
        assert!(f.node(root).edges.is_empty());
    }

    #[test]
    fn resolve_follows_merge_chain() {
        let mut f = Forest::new();
        let a = f.add_root();
        let b = f.add_root();
        let c = f.add_root();
        f.node_mut(a).merged_into = Some(b);
        f.node_mut(a).skip = true;
        f.node_mut(b).merged_into = Some(c);
        f.node_mut(b).skip = true;
        assert_eq!(f.resolve(a), c);
        assert_eq!(f.resolve(c), c);
    }

    #[test]
    fn blocked_subtree_is_inactive_but_anchor_stays_live() {
        let mut f = Forest::new();
        let root = f.add_root();
        let blocked = f.add_child(
            root,
            SmallVec::from_slice(&[RoleId(0)]),
            DependencySet::new(),
            marker(root, ConceptRef(2)),
        );
        let below = f.add_child(
            blocked,
            SmallVec::from_slice(&[RoleId(0)]),
            DependencySet::new(),
            marker(blocked, ConceptRef(2)),
        );
        f.node_mut(blocked).blocked_by = Some(root);
        assert!(!f.is_active(blocked));
        assert!(!f.is_active(below));
        assert!(f.is_live(blocked));
        assert!(!f.is_live(below));
        assert!(f.is_active(root));
    }
}
