use indexmap::IndexSet;
use rustc_hash::FxBuildHasher;

use crate::marking::DataMarking;

pub type MarkingId = usize;

/// Assigns each distinct marking a dense id, in order of first appearance. Ids stay valid for
/// the lifetime of the interner, which is one trace alignment.
#[derive(Debug, Default)]
pub struct MarkingInterner {
    markings: IndexSet<DataMarking, FxBuildHasher>,
}

impl MarkingInterner {
    pub fn new() -> Self {
        Self {
            markings: IndexSet::with_hasher(FxBuildHasher),
        }
    }

    pub fn intern(&mut self, marking: DataMarking) -> MarkingId {
        self.markings.insert_full(marking).0
    }

    pub fn get(&self, id: MarkingId) -> Option<&DataMarking> {
        self.markings.get_index(id)
    }

    pub fn len(&self) -> usize {
        self.markings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markings.is_empty()
    }
}
