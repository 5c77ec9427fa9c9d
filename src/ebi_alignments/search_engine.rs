use std::{
    collections::BinaryHeap,
    fmt::Debug,
    rc::Rc,
    sync::Arc,
    time::Instant,
};

use priority_queue::PriorityQueue;
use rustc_hash::{FxBuildHasher, FxHashMap};

use crate::{
    ebi_alignments::{
        cross_product_net::CrossProductNet,
        cross_product_search_state::{
            MoveKind, QueueEntry, QueuePriority, SearchNode, StateKey,
        },
        marking_interner::{MarkingId, MarkingInterner},
        trace_net::TraceNet,
    },
    ebi_objects::alignments::Move,
    marking::{DataMarking, Marking},
};

/// A lower bound on the remaining cost of aligning, used by A*.
pub trait AlignmentHeuristics: Debug + Send + Sync {
    /// Only admissible heuristics are used; others make the search fall back to Dijkstra.
    fn is_admissible(&self) -> bool;

    /// A lower bound on the cost of completing an alignment from `marking` with the events
    /// from `trace_position` on still to be consumed, or `None` if no completion exists.
    fn estimate(
        &self,
        product: &CrossProductNet,
        trace: &TraceNet,
        marking: &Marking,
        trace_position: usize,
    ) -> Option<u64>;
}

#[derive(Debug, Clone, Default)]
pub struct SearchSettings {
    pub deadline: Option<Instant>,
    /// Keep at most one open entry per state; a new entry replaces it only if it is cheaper.
    pub low_memory: bool,
    pub restrict_log_after_model: bool,
    /// Keep going after the first optimal alignment to find the other ones of equal cost.
    pub enumerate_all: bool,
}

#[derive(Debug)]
pub enum SearchOutcome {
    Found(Rc<SearchNode>),
    Exhausted,
    TimedOut,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchStatistics {
    pub visited_states: usize,
    pub queued_states: usize,
    pub closed_set_size: usize,
    pub distinct_markings: usize,
}

enum OpenSet {
    Heap(BinaryHeap<QueueEntry>),
    Dominating {
        queue: PriorityQueue<StateKey, QueuePriority, FxBuildHasher>,
        nodes: FxHashMap<StateKey, Rc<SearchNode>>,
    },
}

impl OpenSet {
    fn new(low_memory: bool) -> Self {
        if low_memory {
            Self::Dominating {
                queue: PriorityQueue::with_default_hasher(),
                nodes: FxHashMap::default(),
            }
        } else {
            Self::Heap(BinaryHeap::new())
        }
    }

    /// Returns whether the entry was stored.
    fn push(&mut self, priority: QueuePriority, node: Rc<SearchNode>) -> bool {
        match self {
            OpenSet::Heap(heap) => {
                heap.push(QueueEntry { priority, node });
                true
            }
            OpenSet::Dominating { queue, nodes } => {
                let key = node.get_state();
                match queue.get_priority(&key) {
                    Some(existing) if existing.estimated_cost <= priority.estimated_cost => false,
                    Some(_) => {
                        queue.change_priority(&key, priority);
                        nodes.insert(key, node);
                        true
                    }
                    None => {
                        queue.push(key, priority);
                        nodes.insert(key, node);
                        true
                    }
                }
            }
        }
    }

    fn pop(&mut self) -> Option<(QueuePriority, Rc<SearchNode>)> {
        match self {
            OpenSet::Heap(heap) => heap.pop().map(|entry| (entry.priority, entry.node)),
            OpenSet::Dominating { queue, nodes } => {
                let (key, priority) = queue.pop()?;
                match nodes.remove(&key) {
                    Some(node) => Some((priority, node)),
                    None => unreachable!("open state {:?} has no search node", key),
                }
            }
        }
    }
}

/// Best-first search over the synchronous product of one trace and the model.
pub struct SearchEngine {
    product: Arc<CrossProductNet>,
    trace: TraceNet,
    heuristic: Option<Arc<dyn AlignmentHeuristics>>,
    settings: SearchSettings,
    interner: MarkingInterner,
    final_markings: Vec<bool>,
    open: OpenSet,
    closed: FxHashMap<StateKey, u64>,
    estimates: FxHashMap<StateKey, Option<u64>>,
    counter: u64,
    visited_states: usize,
    queued_states: usize,
    optimal_cost: Option<u64>,
    lower_bound: u64,
}

impl SearchEngine {
    pub fn new(
        product: Arc<CrossProductNet>,
        trace: TraceNet,
        heuristic: Option<Arc<dyn AlignmentHeuristics>>,
        settings: SearchSettings,
    ) -> Self {
        let heuristic = heuristic.filter(|heuristic| {
            if !heuristic.is_admissible() {
                log::warn!(
                    "heuristic {:?} is not admissible and will not be used; falling back to Dijkstra",
                    heuristic
                );
            }
            heuristic.is_admissible()
        });

        let mut result = Self {
            open: OpenSet::new(settings.low_memory && !settings.enumerate_all),
            product,
            trace,
            heuristic,
            settings,
            interner: MarkingInterner::new(),
            final_markings: vec![],
            closed: FxHashMap::default(),
            estimates: FxHashMap::default(),
            counter: 0,
            visited_states: 0,
            queued_states: 0,
            optimal_cost: None,
            lower_bound: 0,
        };

        let initial = result.intern(DataMarking::new(result.product.initial_marking.clone()));
        let root = Rc::new(SearchNode::root(initial));
        if let Some(estimate) = result.estimate(&root.get_state()) {
            result.enqueue(root, estimate);
        }
        result
    }

    /// Runs until the next goal node, the end of the search or the deadline.
    /// After the first goal, only goals of the same cost are returned.
    pub fn next_goal(&mut self) -> SearchOutcome {
        loop {
            if let Some(deadline) = self.settings.deadline {
                if Instant::now() >= deadline {
                    log::trace!("search reached its deadline");
                    return SearchOutcome::TimedOut;
                }
            }

            let Some((priority, node)) = self.open.pop() else {
                return SearchOutcome::Exhausted;
            };

            if let Some(optimal_cost) = self.optimal_cost {
                if priority.estimated_cost > optimal_cost {
                    return SearchOutcome::Exhausted;
                }
            }
            self.lower_bound = self.lower_bound.max(priority.estimated_cost);

            let state = node.get_state();
            if self.is_dominated(&state, node.cost) {
                continue;
            }

            if node.trace_position == self.trace.len() && self.final_markings[node.marking] {
                self.optimal_cost.get_or_insert(node.cost);
                return SearchOutcome::Found(node);
            }

            self.closed
                .entry(state)
                .and_modify(|cost| *cost = (*cost).min(node.cost))
                .or_insert(node.cost);
            self.visited_states += 1;
            self.expand(&node);
        }
    }

    fn expand(&mut self, node: &Rc<SearchNode>) {
        let Some(marking) = self.interner.get(node.marking).cloned() else {
            unreachable!("marking {} was never interned", node.marking)
        };

        let successors = self.product.successors(
            &self.trace,
            &marking,
            node.trace_position,
            node.get_previous_move_kind(),
            self.settings.restrict_log_after_model,
        );

        for successor in successors {
            let marking_id = match successor.marking {
                Some(marking) => self.intern(marking),
                None => node.marking,
            };
            let child = node.successor(marking_id, successor.kind, successor.transition, successor.cost);
            let state = child.get_state();
            if self.is_dominated(&state, child.cost) {
                continue;
            }
            if let Some(estimate) = self.estimate(&state) {
                self.enqueue(Rc::new(child), estimate);
            }
        }
    }

    fn enqueue(&mut self, node: Rc<SearchNode>, estimate: u64) {
        let priority = QueuePriority {
            estimated_cost: node.cost.saturating_add(estimate),
            trace_position: node.trace_position,
            move_kind: node.get_previous_move_kind(),
            length: node.length,
            counter: self.counter,
        };
        self.counter += 1;
        if self.open.push(priority, node) {
            self.queued_states += 1;
        }
    }

    /// A state is dominated if it was expanded before at a lower cost, or at the same cost
    /// unless all optimal alignments are sought.
    fn is_dominated(&self, state: &StateKey, cost: u64) -> bool {
        match self.closed.get(state) {
            Some(closed_cost) if self.settings.enumerate_all => *closed_cost < cost,
            Some(closed_cost) => *closed_cost <= cost,
            None => false,
        }
    }

    /// `None` prunes the state.
    fn estimate(&mut self, state: &StateKey) -> Option<u64> {
        let Some(heuristic) = &self.heuristic else {
            return Some(0);
        };
        if let Some(estimate) = self.estimates.get(state) {
            return *estimate;
        }
        let estimate = match self.interner.get(state.0) {
            Some(marking) => {
                heuristic.estimate(&self.product, &self.trace, &marking.marking, state.1)
            }
            None => unreachable!("marking {} was never interned", state.0),
        };
        self.estimates.insert(*state, estimate);
        estimate
    }

    fn intern(&mut self, marking: DataMarking) -> MarkingId {
        let is_final = self.product.is_final(&marking);
        let id = self.interner.intern(marking);
        if id == self.final_markings.len() {
            self.final_markings.push(is_final);
        }
        debug_assert_eq!(self.final_markings.len(), self.interner.len());
        id
    }

    /// The alignment described by the path from the root to `node`.
    pub fn get_alignment(&self, node: &SearchNode, with_transition_names: bool) -> Vec<Move> {
        let net = &self.product.net;
        let name = |transition: usize| {
            if with_transition_names {
                net.get_transition_name(transition).map(str::to_string)
            } else {
                None
            }
        };

        node.get_moves()
            .into_iter()
            .map(|(kind, transition, position)| match (kind, transition) {
                (MoveKind::Log, _) | (_, None) => Move::LogMove {
                    label: self.trace.get_label(position).unwrap_or_default().to_string(),
                },
                (MoveKind::Synchronous, Some(transition)) => Move::SynchronousMove {
                    label: self.trace.get_label(position).unwrap_or_default().to_string(),
                    transition: name(transition),
                },
                (MoveKind::Model, Some(transition)) => match net.get_transition_label_str(transition) {
                    Some(label) => Move::ModelMove {
                        label: label.to_string(),
                        transition: name(transition),
                    },
                    None => Move::SilentMove {
                        transition: name(transition),
                    },
                },
            })
            .collect()
    }

    pub fn get_statistics(&self) -> SearchStatistics {
        SearchStatistics {
            visited_states: self.visited_states,
            queued_states: self.queued_states,
            closed_set_size: self.closed.len(),
            distinct_markings: self.interner.len(),
        }
    }

    /// The highest estimated cost popped so far; no alignment is cheaper.
    pub fn get_lower_bound(&self) -> u64 {
        self.lower_bound
    }
}
