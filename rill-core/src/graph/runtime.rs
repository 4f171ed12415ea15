//! Signal Runtime
//!
//! The runtime owns the node arena and is the single entry point for all
//! externally caused graph changes. Construction is append-only: combinator
//! builders validate their parents and push a new node; after startup the
//! graph only ever shrinks through [`Runtime::prune`].
//!
//! # Propagation
//!
//! [`Runtime::dispatch`] stamps the logical tick, writes the new value into
//! the target input, then walks every root in registration order. Each root
//! fires its kids with `update = (root == target)`; every reached node
//! hears from each of its parents exactly once per tick. Multi-parent nodes
//! count reports in a per-tick bitmask and fire their own kids only once
//! all parents have reported, so a kid never observes a half-updated mix of
//! its parents (the glitch-free property).
//!
//! # Protocol violations
//!
//! A dispatch issued while another dispatch is still unwinding, a node
//! notified twice by the same parent in one tick, and a node firing twice
//! in one tick are all programming errors in the graph or the host. The
//! graph's value consistency is already broken when one is detected, so
//! they panic with a diagnostic naming the node instead of returning an
//! error.

use smallvec::SmallVec;
use tracing::{debug, trace, warn};

use super::error::GraphError;
use super::node::{Node, NodeId, NodeKind, Timestamp, MAX_PARENTS};
use super::scheduler::{Scheduler, Wakeup};

/// Fallback scheduler for runtimes built without one. Dropping a wakeup is
/// only observable if the graph contains `delay` nodes, hence the warning.
struct NullScheduler;

impl<V> Scheduler<V> for NullScheduler {
    fn schedule(&mut self, delay_ms: u64, _wakeup: Wakeup<V>) {
        warn!(delay_ms, "delay wakeup dropped: runtime has no scheduler");
    }
}

/// The signal graph and its dispatcher.
///
/// All nodes share the value type `V`; hosts with heterogeneous signals
/// supply their own sum type for `V`.
pub struct Runtime<V> {
    nodes: Vec<Node<V>>,
    /// Input and delay nodes, in registration order. Every dispatch walks
    /// all of them.
    roots: Vec<NodeId>,
    scheduler: Box<dyn Scheduler<V>>,
    last_stamp: Option<Timestamp>,
    /// Bumped once per dispatch; keys the single-fire check.
    generation: u64,
    /// Single-flight guard for the propagation walk.
    in_flight: bool,
}

impl<V: Clone + 'static> Runtime<V> {
    /// Create a runtime without a host scheduler. `delay` wakeups are
    /// dropped with a warning; use [`Runtime::with_scheduler`] if the graph
    /// contains delays.
    pub fn new() -> Self {
        Self::with_scheduler(Box::new(NullScheduler))
    }

    /// Create a runtime that hands `delay` wakeups to the given host
    /// scheduler.
    pub fn with_scheduler(scheduler: Box<dyn Scheduler<V>>) -> Self {
        Self {
            nodes: Vec::new(),
            roots: Vec::new(),
            scheduler,
            last_stamp: None,
            generation: 0,
            in_flight: false,
        }
    }

    // ------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------

    /// Add a root input holding `initial`.
    pub fn input(&mut self, initial: V) -> NodeId {
        // No parents to validate, so this cannot fail.
        let id = NodeId(self.nodes.len() as u32);
        self.roots.push(id);
        self.nodes
            .push(Node::new(id, initial, NodeKind::Input, SmallVec::new()));
        id
    }

    /// Map a single parent through `f`.
    pub fn map(
        &mut self,
        parent: NodeId,
        mut f: impl FnMut(&V) -> V + 'static,
    ) -> Result<NodeId, GraphError> {
        let initial = f(self.signal_value(parent)?);
        self.add_node(
            initial,
            NodeKind::Map {
                f: Box::new(move |vals| f(&vals[0])),
            },
            SmallVec::from_slice(&[parent]),
        )
    }

    /// Combine two parents pointwise.
    pub fn map2(
        &mut self,
        a: NodeId,
        b: NodeId,
        mut f: impl FnMut(&V, &V) -> V + 'static,
    ) -> Result<NodeId, GraphError> {
        let initial = f(self.signal_value(a)?, self.signal_value(b)?);
        self.add_node(
            initial,
            NodeKind::Map {
                f: Box::new(move |vals| f(&vals[0], &vals[1])),
            },
            SmallVec::from_slice(&[a, b]),
        )
    }

    /// Combine any number of parents pointwise. The closure receives the
    /// parents' current values in declaration order.
    pub fn map_n(
        &mut self,
        parents: &[NodeId],
        mut f: impl FnMut(&[V]) -> V + 'static,
    ) -> Result<NodeId, GraphError> {
        let mut initial_args: SmallVec<[V; 4]> = SmallVec::new();
        for &p in parents {
            initial_args.push(self.signal_value(p)?.clone());
        }
        let initial = f(&initial_args);
        self.add_node(
            initial,
            NodeKind::Map { f: Box::new(f) },
            SmallVec::from_slice(parents),
        )
    }

    /// Stateful fold: on each parent update, `value = step(parent, value)`.
    /// Starts at `seed`; the accumulator persists across ticks.
    pub fn foldp(
        &mut self,
        parent: NodeId,
        seed: V,
        step: impl FnMut(&V, &V) -> V + 'static,
    ) -> Result<NodeId, GraphError> {
        self.signal_value(parent)?;
        self.add_node(
            seed,
            NodeKind::Fold {
                step: Box::new(step),
            },
            SmallVec::from_slice(&[parent]),
        )
    }

    /// Two-way join. Simultaneous updates are resolved by `tie`; otherwise
    /// the updating side passes through. The initial value is the left
    /// parent's.
    pub fn merge(
        &mut self,
        left: NodeId,
        right: NodeId,
        tie: impl FnMut(&V, &V) -> V + 'static,
    ) -> Result<NodeId, GraphError> {
        let initial = self.signal_value(left)?.clone();
        self.signal_value(right)?;
        self.add_node(
            initial,
            NodeKind::Merge { tie: Box::new(tie) },
            SmallVec::from_slice(&[left, right]),
        )
    }

    /// Conditional map: `Some(v)` updates with `v`, `None` suppresses the
    /// update. Starts at `f` applied to the parent's value, or `seed` when
    /// that is `None`.
    pub fn filter_map(
        &mut self,
        parent: NodeId,
        seed: V,
        mut f: impl FnMut(&V) -> Option<V> + 'static,
    ) -> Result<NodeId, GraphError> {
        let initial = f(self.signal_value(parent)?).unwrap_or(seed);
        self.add_node(
            initial,
            NodeKind::FilterMap { f: Box::new(f) },
            SmallVec::from_slice(&[parent]),
        )
    }

    /// Emit `signal`'s current value whenever `ticker` updates. Updates of
    /// `signal` alone do not fire.
    pub fn sample_on(&mut self, ticker: NodeId, signal: NodeId) -> Result<NodeId, GraphError> {
        self.signal_value(ticker)?;
        let initial = self.signal_value(signal)?.clone();
        self.add_node(
            initial,
            NodeKind::SampleOn,
            SmallVec::from_slice(&[ticker, signal]),
        )
    }

    /// Suppress updates equal to the previous value, using `V`'s domain
    /// equality.
    pub fn drop_repeats(&mut self, parent: NodeId) -> Result<NodeId, GraphError>
    where
        V: PartialEq,
    {
        self.drop_repeats_by(parent, |a, b| a == b)
    }

    /// Suppress updates equal to the previous value, judged by a caller
    /// supplied comparator.
    pub fn drop_repeats_by(
        &mut self,
        parent: NodeId,
        eq: impl Fn(&V, &V) -> bool + 'static,
    ) -> Result<NodeId, GraphError> {
        let initial = self.signal_value(parent)?.clone();
        self.add_node(
            initial,
            NodeKind::DropRepeats { eq: Box::new(eq) },
            SmallVec::from_slice(&[parent]),
        )
    }

    /// Pair the parent's value with the tick it arrived on, via a host
    /// supplied injection into `V`.
    pub fn stamped(
        &mut self,
        parent: NodeId,
        mut inject: impl FnMut(Timestamp, &V) -> V + 'static,
    ) -> Result<NodeId, GraphError> {
        let initial = inject(Timestamp::default(), self.signal_value(parent)?);
        self.add_node(
            initial,
            NodeKind::Stamped {
                inject: Box::new(inject),
            },
            SmallVec::from_slice(&[parent]),
        )
    }

    /// Re-deliver the parent's updates to this node after `delay_ms`,
    /// through the host scheduler. The delay node joins the root walk.
    pub fn delay(&mut self, parent: NodeId, delay_ms: u64) -> Result<NodeId, GraphError> {
        let initial = self.signal_value(parent)?.clone();
        let id = self.add_node(
            initial,
            NodeKind::Delay { delay_ms },
            SmallVec::from_slice(&[parent]),
        )?;
        self.roots.push(id);
        Ok(id)
    }

    /// Wire a terminal consumer: `handler` runs with the parent's fresh
    /// value whenever the parent updates.
    pub fn output(
        &mut self,
        parent: NodeId,
        handler: impl FnMut(&V) + 'static,
    ) -> Result<NodeId, GraphError> {
        let initial = self.signal_value(parent)?.clone();
        self.add_node(
            initial,
            NodeKind::Output {
                handler: Box::new(handler),
            },
            SmallVec::from_slice(&[parent]),
        )
    }

    /// Validate parents and append a node to the arena.
    fn add_node(
        &mut self,
        value: V,
        kind: NodeKind<V>,
        parents: SmallVec<[NodeId; 2]>,
    ) -> Result<NodeId, GraphError> {
        if parents.is_empty() {
            return Err(GraphError::NoParents);
        }
        if parents.len() > MAX_PARENTS {
            return Err(GraphError::TooManyParents {
                got: parents.len(),
                limit: MAX_PARENTS,
            });
        }
        for (i, &p) in parents.iter().enumerate() {
            self.signal_value(p)?;
            if parents[..i].contains(&p) {
                return Err(GraphError::DuplicateParent { parent: p });
            }
        }

        let id = NodeId(self.nodes.len() as u32);
        for &p in &parents {
            self.nodes[p.index()].kids.push(id);
        }
        self.nodes.push(Node::new(id, value, kind, parents));
        Ok(id)
    }

    /// Look up a live, non-terminal node's value for use as a parent.
    fn signal_value(&self, id: NodeId) -> Result<&V, GraphError> {
        let node = self
            .nodes
            .get(id.index())
            .filter(|n| n.alive)
            .ok_or(GraphError::UnknownNode(id))?;
        if matches!(node.kind, NodeKind::Output { .. }) {
            return Err(GraphError::TerminalParent(id));
        }
        Ok(&node.value)
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    /// Deliver an external event: stamp the tick, set the target input's
    /// value, and run one full propagation walk.
    ///
    /// `target` must be a live input or delay node, and `stamp` must not
    /// precede the previous dispatch's stamp.
    ///
    /// # Panics
    ///
    /// Panics if called while a previous dispatch is still unwinding on the
    /// stack. Signal values must be internally consistent for the duration
    /// of a walk, so a concurrent stamp cannot be queued or retried.
    pub fn dispatch(
        &mut self,
        stamp: Timestamp,
        target: NodeId,
        value: V,
    ) -> Result<(), GraphError> {
        {
            let node = self
                .nodes
                .get(target.index())
                .filter(|n| n.alive)
                .ok_or(GraphError::UnknownNode(target))?;
            if !node.kind.is_root() {
                return Err(GraphError::NotAnInput(target));
            }
        }
        if let Some(last) = self.last_stamp {
            if stamp < last {
                return Err(GraphError::TimestampRegression { got: stamp, last });
            }
        }
        if self.in_flight {
            panic!(
                "protocol violation: re-entrant dispatch at {:?} targeting {:?}",
                stamp, target
            );
        }

        trace!(stamp = stamp.0, target = target.raw(), "dispatch");
        self.in_flight = true;
        self.last_stamp = Some(stamp);
        self.generation += 1;

        self.nodes[target.index()].value = value;
        let roots = self.roots.clone();
        for root in roots {
            if self.nodes[root.index()].alive {
                self.fire(root, stamp, root == target);
            }
        }

        self.in_flight = false;
        Ok(())
    }

    /// Notify every kid of `id`, at most once per dispatch generation.
    fn fire(&mut self, id: NodeId, stamp: Timestamp, update: bool) {
        let generation = self.generation;
        let node = &mut self.nodes[id.index()];
        if node.fired_gen == Some(generation) {
            panic!(
                "protocol violation: {} node {:?} fired twice at {:?}",
                node.kind.name(),
                id,
                stamp
            );
        }
        node.fired_gen = Some(generation);

        let kids = node.kids.clone();
        for kid in kids {
            self.notify(kid, stamp, update, id);
        }
    }

    /// One parent's report to `id` for this tick. Fires the node's own kids
    /// once all parents have reported.
    fn notify(&mut self, id: NodeId, stamp: Timestamp, update: bool, source: NodeId) {
        let node = &mut self.nodes[id.index()];
        if !node.alive {
            return;
        }
        let pos = match node.parent_position(source) {
            Some(pos) => pos,
            None => panic!(
                "protocol violation: node {:?} notified by non-parent {:?}",
                id, source
            ),
        };
        let bit = 1u32 << pos;
        if node.seen & bit != 0 {
            panic!(
                "protocol violation: {} node {:?} notified twice by parent {:?} in one tick",
                node.kind.name(),
                id,
                source
            );
        }
        node.seen |= bit;
        if update {
            node.updated |= bit;
        }
        if !node.all_parents_seen() {
            return;
        }

        let out = self.settle(id, stamp);
        // Delay kids are fired from the root walk; outputs have no kids.
        let terminal = matches!(
            self.nodes[id.index()].kind,
            NodeKind::Delay { .. } | NodeKind::Output { .. }
        );
        if !terminal {
            self.fire(id, stamp, out);
        }
    }

    /// Apply the node's update rule once all parents have reported.
    /// Returns the node's own update flag for its kids.
    fn settle(&mut self, id: NodeId, stamp: Timestamp) -> bool {
        let pvals: SmallVec<[V; 4]> = {
            let parents = self.nodes[id.index()].parents.clone();
            parents
                .iter()
                .map(|p| self.nodes[p.index()].value.clone())
                .collect()
        };

        // Delay needs the scheduler, which lives beside the arena, so it is
        // handled before borrowing the node across the match below.
        let delay = match &self.nodes[id.index()].kind {
            NodeKind::Delay { delay_ms } => Some(*delay_ms),
            _ => None,
        };
        if let Some(delay_ms) = delay {
            let node = &mut self.nodes[id.index()];
            let any = node.updated != 0;
            node.reset_tick_state();
            if any {
                trace!(node = id.raw(), delay_ms, "delay scheduling wakeup");
                self.scheduler.schedule(
                    delay_ms,
                    Wakeup {
                        target: id,
                        value: pvals[0].clone(),
                    },
                );
            }
            return false;
        }

        let node = &mut self.nodes[id.index()];
        let any = node.updated != 0;
        let left = node.updated & 0b01 != 0;
        let right = node.updated & 0b10 != 0;
        node.reset_tick_state();

        match &mut node.kind {
            NodeKind::Map { f } => {
                if any {
                    let next = f(&pvals);
                    node.value = next;
                }
                any
            }
            NodeKind::Fold { step } => {
                if any {
                    let next = step(&pvals[0], &node.value);
                    node.value = next;
                }
                any
            }
            NodeKind::Merge { tie } => {
                if left && right {
                    let next = tie(&pvals[0], &pvals[1]);
                    node.value = next;
                    true
                } else if left {
                    node.value = pvals[0].clone();
                    true
                } else if right {
                    node.value = pvals[1].clone();
                    true
                } else {
                    false
                }
            }
            NodeKind::FilterMap { f } => {
                if any {
                    match f(&pvals[0]) {
                        Some(next) => {
                            node.value = next;
                            true
                        }
                        None => false,
                    }
                } else {
                    false
                }
            }
            NodeKind::SampleOn => {
                // The ticker alone decides the update flag; the value is
                // read from the signal side at this moment either way.
                if left {
                    node.value = pvals[1].clone();
                }
                left
            }
            NodeKind::DropRepeats { eq } => {
                if any && !eq(&pvals[0], &node.value) {
                    node.value = pvals[0].clone();
                    true
                } else {
                    false
                }
            }
            NodeKind::Stamped { inject } => {
                if any {
                    let next = inject(stamp, &pvals[0]);
                    node.value = next;
                }
                any
            }
            NodeKind::Output { handler } => {
                if any {
                    node.value = pvals[0].clone();
                    handler(&node.value);
                }
                any
            }
            NodeKind::Input | NodeKind::Delay { .. } => {
                unreachable!("settled out of band")
            }
        }
    }

    // ------------------------------------------------------------------
    // Maintenance & reads
    // ------------------------------------------------------------------

    /// Tombstone every node that is not transitively a parent of some
    /// output, removing it from surviving kid lists and from the root walk.
    /// Returns the number of nodes removed.
    pub fn prune(&mut self) -> usize {
        let mut live = vec![false; self.nodes.len()];
        let mut stack: Vec<NodeId> = self
            .nodes
            .iter()
            .filter(|n| n.alive && matches!(n.kind, NodeKind::Output { .. }))
            .map(|n| n.id)
            .collect();

        while let Some(id) = stack.pop() {
            if live[id.index()] {
                continue;
            }
            live[id.index()] = true;
            stack.extend(self.nodes[id.index()].parents.iter().copied());
        }

        let mut removed = 0;
        for node in &mut self.nodes {
            if node.alive && !live[node.id.index()] {
                node.alive = false;
                removed += 1;
            }
        }
        for node in &mut self.nodes {
            if node.alive {
                node.kids.retain(|k| live[k.index()]);
            }
        }
        self.roots.retain(|r| live[r.index()]);

        debug!(removed, remaining = self.live_node_count(), "pruned graph");
        removed
    }

    /// Read a node's current value. `None` for unknown or pruned nodes.
    /// The render/consumer boundary: reads never mutate.
    pub fn value(&self, id: NodeId) -> Option<&V> {
        self.nodes.get(id.index()).filter(|n| n.alive).map(|n| &n.value)
    }

    /// The stamp of the most recent dispatch, if any.
    pub fn last_stamp(&self) -> Option<Timestamp> {
        self.last_stamp
    }

    /// Whether `id` names a live node.
    pub fn is_alive(&self, id: NodeId) -> bool {
        self.nodes.get(id.index()).is_some_and(|n| n.alive)
    }

    /// Total nodes ever constructed, tombstones included.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Nodes surviving pruning.
    pub fn live_node_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.alive).count()
    }
}

impl<V: Clone + 'static> Default for Runtime<V> {
    fn default() -> Self {
        Self::new()
    }
}
