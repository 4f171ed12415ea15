//! Graph Nodes
//!
//! This module defines the node types that live in the signal graph.
//!
//! Every node is stored in a single arena owned by the [`Runtime`] and is
//! referred to by its stable [`NodeId`] index. Nodes never hold references
//! to each other; parent and kid edges are id lists. This keeps the graph
//! free of reference cycles and makes dead-branch pruning a matter of
//! flipping a tombstone flag.
//!
//! [`Runtime`]: super::runtime::Runtime

use smallvec::SmallVec;

/// Maximum number of parents a synchronized node may have.
///
/// The per-tick fan-in bookkeeping uses one bit per parent position, so the
/// limit is the width of the bitmask.
pub const MAX_PARENTS: usize = 32;

/// Unique identifier for a node in the signal graph.
///
/// Ids are arena indices: assigned sequentially at construction time and
/// never reused, even after the node is pruned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    /// Get the raw id value.
    pub fn raw(&self) -> u32 {
        self.0
    }

    pub(crate) fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Logical tick of the graph.
///
/// A timestamp is stamped once per external dispatch and threaded unchanged
/// through the whole propagation walk: every node reached during one
/// dispatch observes the same value. Across dispatches timestamps are
/// non-decreasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(pub u64);

/// The update rule a node applies when its parents report.
///
/// This is a closed sum: the propagation walk matches it exhaustively, so a
/// node kind without defined semantics cannot exist.
pub enum NodeKind<V> {
    /// A root node. Its value changes only when an external dispatch names
    /// it as the target.
    Input,

    /// Pointwise combination of one or more parents. Covers `map`, `map2`
    /// and `mapN`; the closure receives the parents' current values in
    /// declaration order.
    Map {
        f: Box<dyn FnMut(&[V]) -> V>,
    },

    /// Stateful fold over a single parent. The accumulator persists across
    /// ticks; this is the only node whose previous value outlives a tick.
    Fold {
        step: Box<dyn FnMut(&V, &V) -> V>,
    },

    /// Two-way join. On a simultaneous update from both sides the tie-break
    /// closure decides the emitted value; a single-side update passes that
    /// side through unchanged.
    Merge {
        tie: Box<dyn FnMut(&V, &V) -> V>,
    },

    /// Conditional map over a single parent. `None` suppresses the update.
    FilterMap {
        f: Box<dyn FnMut(&V) -> Option<V>>,
    },

    /// Emits the second parent's current value whenever the first parent
    /// (the ticker) updates. Parents are `[ticker, signal]`.
    SampleOn,

    /// Suppresses updates whose value equals the previous one, judged by
    /// the supplied equality closure.
    DropRepeats {
        eq: Box<dyn Fn(&V, &V) -> bool>,
    },

    /// Pairs the parent's value with the current tick via a host-supplied
    /// injection.
    Stamped {
        inject: Box<dyn FnMut(Timestamp, &V) -> V>,
    },

    /// Re-delivers the parent's updates to itself after a host-scheduled
    /// pause. Acts as a root when the scheduled wakeup is dispatched; its
    /// kids hear from it only via the root walk.
    Delay {
        delay_ms: u64,
    },

    /// Terminal consumer. On update, copies the parent value and invokes
    /// the host handler. Has no kids.
    Output {
        handler: Box<dyn FnMut(&V)>,
    },
}

impl<V> NodeKind<V> {
    /// Whether this node participates in the root walk of a dispatch.
    pub fn is_root(&self) -> bool {
        matches!(self, NodeKind::Input | NodeKind::Delay { .. })
    }

    /// Short name for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Input => "input",
            NodeKind::Map { .. } => "map",
            NodeKind::Fold { .. } => "foldp",
            NodeKind::Merge { .. } => "merge",
            NodeKind::FilterMap { .. } => "filter_map",
            NodeKind::SampleOn => "sample_on",
            NodeKind::DropRepeats { .. } => "drop_repeats",
            NodeKind::Stamped { .. } => "stamped",
            NodeKind::Delay { .. } => "delay",
            NodeKind::Output { .. } => "output",
        }
    }
}

/// A node in the signal graph.
///
/// Besides its identity, value and update rule, a node carries the
/// ephemeral per-tick fan-in state: `seen` records which parent positions
/// have reported this tick, `updated` which of those carried a fresh value.
/// Both reset to zero after the node fires its kids.
pub struct Node<V> {
    pub(crate) id: NodeId,
    pub(crate) value: V,
    pub(crate) kind: NodeKind<V>,

    /// Parents in declaration order. Position in this list is the bit
    /// position in `seen`/`updated`.
    pub(crate) parents: SmallVec<[NodeId; 2]>,

    /// Kids to notify, in registration order.
    pub(crate) kids: SmallVec<[NodeId; 4]>,

    /// Bitmask of parent positions that reported this tick.
    pub(crate) seen: u32,

    /// Bitmask of parent positions that reported with `update = true`.
    pub(crate) updated: u32,

    /// Dispatch generation at which this node last fired its kids. Host
    /// timestamps may repeat across dispatches (they are only
    /// non-decreasing), so the single-fire check keys on the runtime's own
    /// generation counter. Firing twice in one generation is a protocol
    /// violation.
    pub(crate) fired_gen: Option<u64>,

    /// Cleared by pruning; dead nodes are skipped by the walk.
    pub(crate) alive: bool,
}

impl<V> Node<V> {
    pub(crate) fn new(
        id: NodeId,
        value: V,
        kind: NodeKind<V>,
        parents: SmallVec<[NodeId; 2]>,
    ) -> Self {
        Self {
            id,
            value,
            kind,
            parents,
            kids: SmallVec::new(),
            seen: 0,
            updated: 0,
            fired_gen: None,
            alive: true,
        }
    }

    /// Get the node's id.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Get the node's current value.
    pub fn value(&self) -> &V {
        &self.value
    }

    /// Position of `parent` in this node's parent list.
    pub(crate) fn parent_position(&self, parent: NodeId) -> Option<usize> {
        self.parents.iter().position(|p| *p == parent)
    }

    /// Whether every parent has reported this tick.
    pub(crate) fn all_parents_seen(&self) -> bool {
        self.seen.count_ones() as usize == self.parents.len()
    }

    /// Reset the per-tick fan-in state after a synchronized firing.
    pub(crate) fn reset_tick_state(&mut self) {
        self.seen = 0;
        self.updated = 0;
    }
}

impl<V: std::fmt::Debug> std::fmt::Debug for Node<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("kind", &self.kind.name())
            .field("value", &self.value)
            .field("parents", &self.parents)
            .field("kids", &self.kids)
            .field("alive", &self.alive)
            .finish()
    }
}
