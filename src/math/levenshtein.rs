/// One step of an insert/delete alignment between a trace and a reference sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOperation {
    /// Both sequences advance on an equal element.
    Match,
    /// Only the trace advances.
    Delete,
    /// Only the reference advances.
    Insert,
}

#[derive(Debug, Clone, Copy)]
pub struct EditCosts<'a> {
    /// Per trace position, the cost of deleting that element.
    pub delete_costs: &'a [u64],
    pub insert_cost: u64,
    pub match_cost: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditAlignment {
    pub cost: u64,
    pub operations: Vec<EditOperation>,
    /// Number of filled cells of the cost table.
    pub cells: usize,
}

/// Minimum-cost alignment of `trace` against `reference` with weighted insertions, deletions
/// and matches; there is no substitution. Among equal-cost choices a match is preferred over a
/// deletion, and a deletion over an insertion.
pub fn align_sequences<T: PartialEq>(
    trace: &[T],
    reference: &[T],
    costs: &EditCosts,
) -> EditAlignment {
    let (n, m) = (trace.len(), reference.len());
    let width = m + 1;
    let mut table = vec![0u64; (n + 1) * width];

    for i in 1..=n {
        table[i * width] = table[(i - 1) * width].saturating_add(costs.delete_costs[i - 1]);
    }
    for j in 1..=m {
        table[j] = table[j - 1].saturating_add(costs.insert_cost);
    }
    for i in 1..=n {
        for j in 1..=m {
            let delete = table[(i - 1) * width + j].saturating_add(costs.delete_costs[i - 1]);
            let insert = table[i * width + j - 1].saturating_add(costs.insert_cost);
            let mut best = delete.min(insert);
            if trace[i - 1] == reference[j - 1] {
                best = best.min(table[(i - 1) * width + j - 1].saturating_add(costs.match_cost));
            }
            table[i * width + j] = best;
        }
    }

    //walk back from the end
    let mut operations = Vec::with_capacity(n + m);
    let (mut i, mut j) = (n, m);
    while i > 0 || j > 0 {
        let current = table[i * width + j];
        if i > 0
            && j > 0
            && trace[i - 1] == reference[j - 1]
            && table[(i - 1) * width + j - 1].saturating_add(costs.match_cost) == current
        {
            operations.push(EditOperation::Match);
            i -= 1;
            j -= 1;
        } else if i > 0
            && table[(i - 1) * width + j].saturating_add(costs.delete_costs[i - 1]) == current
        {
            operations.push(EditOperation::Delete);
            i -= 1;
        } else {
            operations.push(EditOperation::Insert);
            j -= 1;
        }
    }
    operations.reverse();

    EditAlignment {
        cost: table[n * width + m],
        operations,
        cells: (n + 1) * width,
    }
}

/// Unweighted insert/delete distance.
pub fn distance<T: PartialEq>(trace1: &[T], trace2: &[T]) -> u64 {
    let delete_costs = vec![1; trace1.len()];
    align_sequences(
        trace1,
        trace2,
        &EditCosts {
            delete_costs: &delete_costs,
            insert_cost: 1,
            match_cost: 0,
        },
    )
    .cost
}

#[cfg(test)]
mod tests {
    use super::{align_sequences, distance, EditCosts, EditOperation};

    #[test]
    fn weighted_alignment() {
        let trace = ["a", "x", "b"];
        let reference = ["a", "b", "c"];
        let delete_costs = [10, 10, 10];
        let result = align_sequences(
            &trace,
            &reference,
            &EditCosts {
                delete_costs: &delete_costs,
                insert_cost: 7,
                match_cost: 0,
            },
        );
        assert_eq!(result.cost, 17);
        assert_eq!(
            result.operations,
            vec![
                EditOperation::Match,
                EditOperation::Delete,
                EditOperation::Match,
                EditOperation::Insert
            ]
        );
        assert_eq!(result.cells, 16);
    }

    #[test]
    fn no_substitution() {
        assert_eq!(distance(&["a"], &["b"]), 2);
        assert_eq!(distance::<&str>(&[], &["a", "b"]), 2);
        assert_eq!(distance(&["a", "b"], &["a", "b"]), 0);
    }

    #[test]
    fn prefers_deletion_on_ties() {
        let delete_costs = [5];
        let result = align_sequences(
            &["a"],
            &["b"],
            &EditCosts {
                delete_costs: &delete_costs,
                insert_cost: 5,
                match_cost: 0,
            },
        );
        assert_eq!(result.cost, 10);
        assert_eq!(
            result.operations,
            vec![EditOperation::Insert, EditOperation::Delete]
        );
    }
}
