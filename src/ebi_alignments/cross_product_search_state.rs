use std::{cmp::Ordering, rc::Rc};

use crate::{
    ebi_alignments::marking_interner::MarkingId,
    ebi_objects::labelled_petri_net::TransitionIndex,
};

/// A state of the synchronous product: an interned marking and the number of consumed events.
pub type StateKey = (MarkingId, usize);

/// Declaration order is the tie-breaking preference between equally good queue entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MoveKind {
    Synchronous,
    Log,
    /// Includes moves on silent transitions.
    Model,
}

/// A node of the search tree. Nodes share their ancestry through `previous_state`, so a
/// discarded branch is freed as soon as nothing refers to it.
#[derive(Debug)]
pub struct SearchNode {
    pub marking: MarkingId,
    pub trace_position: usize,
    pub cost: u64,
    pub length: usize,
    pub previous_move: Option<(MoveKind, Option<TransitionIndex>)>,
    pub previous_state: Option<Rc<SearchNode>>,
}

impl SearchNode {
    pub fn root(marking: MarkingId) -> Self {
        Self {
            marking,
            trace_position: 0,
            cost: 0,
            length: 0,
            previous_move: None,
            previous_state: None,
        }
    }

    pub fn successor(
        self: &Rc<Self>,
        marking: MarkingId,
        kind: MoveKind,
        transition: Option<TransitionIndex>,
        cost: u64,
    ) -> Self {
        Self {
            marking,
            trace_position: match kind {
                MoveKind::Synchronous | MoveKind::Log => self.trace_position + 1,
                MoveKind::Model => self.trace_position,
            },
            cost: self.cost.saturating_add(cost),
            length: self.length + 1,
            previous_move: Some((kind, transition)),
            previous_state: Some(Rc::clone(self)),
        }
    }

    pub fn get_state(&self) -> StateKey {
        (self.marking, self.trace_position)
    }

    pub fn get_previous_move_kind(&self) -> Option<MoveKind> {
        self.previous_move.map(|(kind, _)| kind)
    }

    /// The moves from the root to this node, with the trace position each move started at.
    pub fn get_moves(&self) -> Vec<(MoveKind, Option<TransitionIndex>, usize)> {
        let mut result = Vec::with_capacity(self.length);
        let mut node = self;
        while let (Some((kind, transition)), Some(previous)) =
            (node.previous_move, node.previous_state.as_deref())
        {
            result.push((kind, transition, previous.trace_position));
            node = previous;
        }
        debug_assert!(
            node.previous_state.is_none() && node.length == 0,
            "back-pointer chain does not reach the root"
        );
        result.reverse();
        result
    }
}

impl Drop for SearchNode {
    fn drop(&mut self) {
        //unlink iteratively; a long chain would otherwise be dropped recursively
        let mut previous = self.previous_state.take();
        while let Some(node) = previous {
            previous = match Rc::try_unwrap(node) {
                Ok(mut node) => node.previous_state.take(),
                Err(_) => None,
            };
        }
    }
}

/// The priority of an open-set entry. The best entry compares greatest, so that it pops first
/// from a max-heap: lowest estimated total cost, then most of the trace consumed, then
/// synchronous before log before model moves, then shortest, then earliest inserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueuePriority {
    pub estimated_cost: u64,
    pub trace_position: usize,
    pub move_kind: Option<MoveKind>,
    pub length: usize,
    pub counter: u64,
}

impl Ord for QueuePriority {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .estimated_cost
            .cmp(&self.estimated_cost)
            .then_with(|| self.trace_position.cmp(&other.trace_position))
            .then_with(|| other.move_kind.cmp(&self.move_kind))
            .then_with(|| other.length.cmp(&self.length))
            .then_with(|| other.counter.cmp(&self.counter))
    }
}

impl PartialOrd for QueuePriority {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug)]
pub struct QueueEntry {
    pub priority: QueuePriority,
    pub node: Rc<SearchNode>,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority
    }
}

impl Eq for QueueEntry {}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority.cmp(&other.priority)
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::BinaryHeap, rc::Rc};

    use super::{MoveKind, QueuePriority, SearchNode};

    fn priority(
        estimated_cost: u64,
        trace_position: usize,
        move_kind: MoveKind,
        length: usize,
        counter: u64,
    ) -> QueuePriority {
        QueuePriority {
            estimated_cost,
            trace_position,
            move_kind: Some(move_kind),
            length,
            counter,
        }
    }

    #[test]
    fn pop_order() {
        let mut heap = BinaryHeap::new();
        heap.push(priority(5, 0, MoveKind::Synchronous, 0, 0));
        heap.push(priority(3, 0, MoveKind::Model, 4, 1));
        heap.push(priority(3, 2, MoveKind::Model, 4, 2));
        heap.push(priority(3, 2, MoveKind::Log, 4, 3));
        heap.push(priority(3, 2, MoveKind::Log, 3, 4));
        heap.push(priority(3, 2, MoveKind::Log, 3, 5));

        let counters = std::iter::from_fn(|| heap.pop().map(|p| p.counter)).collect::<Vec<_>>();
        assert_eq!(counters, vec![4, 5, 3, 2, 1, 0]);
    }

    #[test]
    fn moves_of_a_path() {
        let root = Rc::new(SearchNode::root(0));
        let sync = Rc::new(root.successor(1, MoveKind::Synchronous, Some(0), 0));
        let model = Rc::new(sync.successor(2, MoveKind::Model, Some(1), 1));
        let log = model.successor(2, MoveKind::Log, None, 10);

        assert_eq!(log.cost, 11);
        assert_eq!(log.trace_position, 2);
        assert_eq!(log.get_state(), (2, 2));
        assert_eq!(
            log.get_moves(),
            vec![
                (MoveKind::Synchronous, Some(0), 0),
                (MoveKind::Model, Some(1), 1),
                (MoveKind::Log, None, 1)
            ]
        );
    }

    #[test]
    fn long_chains_drop() {
        let mut node = Rc::new(SearchNode::root(0));
        for _ in 0..200_000 {
            node = Rc::new(node.successor(0, MoveKind::Model, Some(0), 1));
        }
        assert_eq!(node.length, 200_000);
        drop(node);
    }
}
