use microlp::{ComparisonOp, Error, OptimizationDirection, Problem, Variable};

use crate::{
    ebi_alignments::{
        cross_product_net::CrossProductNet, search_engine::AlignmentHeuristics,
        trace_net::TraceNet,
    },
    ebi_objects::labelled_petri_net::{ArcType, TransitionIndex},
    marking::Marking,
};

const TOLERANCE: f64 = 1e-6;

/// Lower bound from the LP relaxation of the marking equation of the synchronous product,
/// restricted to the part of the trace that is still to be consumed.
///
/// Variables count model moves and synchronous moves per transition and log moves per remaining
/// activity. Every remaining event is consumed by a synchronous or a log move, and the
/// transitions fired must turn the current marking into the final one. Log moves are priced at
/// the cheapest remaining log move.
///
/// Reset arcs make token counts non-linear, so on nets with reset arcs the bound is 0.
#[derive(Debug, Clone)]
pub struct MarkingEquationHeuristic {
    /// Per place, the net token effect of each transition that changes it.
    incidence: Vec<Vec<(TransitionIndex, f64)>>,
    has_reset_arcs: bool,
}

impl MarkingEquationHeuristic {
    pub fn new(product: &CrossProductNet) -> Self {
        let net = product.get_net();
        let mut incidence = vec![vec![]; net.get_number_of_places()];
        for transition in 0..net.get_number_of_transitions() {
            let mut effect: Vec<(usize, i64)> = vec![];
            let mut add = |place: usize, delta: i64| match effect.iter_mut().find(|(p, _)| *p == place) {
                Some((_, total)) => *total += delta,
                None => effect.push((place, delta)),
            };
            for (place, cardinality, arc_type) in net.get_input_arcs(transition) {
                if arc_type == ArcType::Normal {
                    add(place, -(cardinality as i64));
                }
            }
            for (place, cardinality) in net.get_output_arcs(transition) {
                add(place, cardinality as i64);
            }
            for (place, delta) in effect {
                if delta != 0 {
                    incidence[place].push((transition, delta as f64));
                }
            }
        }

        Self {
            incidence,
            has_reset_arcs: net.has_arcs_of_type(ArcType::Reset),
        }
    }
}

impl AlignmentHeuristics for MarkingEquationHeuristic {
    fn is_admissible(&self) -> bool {
        true
    }

    fn estimate(
        &self,
        product: &CrossProductNet,
        trace: &TraceNet,
        marking: &Marking,
        trace_position: usize,
    ) -> Option<u64> {
        if self.has_reset_arcs {
            return Some(0);
        }
        let net = product.get_net();
        let mut problem = Problem::new(OptimizationDirection::Minimize);

        let model_moves: Vec<Variable> = (0..net.get_number_of_transitions())
            .map(|transition| {
                problem.add_var(
                    product.model_move_costs[transition] as f64,
                    (0.0, f64::INFINITY),
                )
            })
            .collect();

        //each remaining event is consumed by a synchronous move or a log move
        let mut sync_moves: Vec<Option<Variable>> = vec![None; net.get_number_of_transitions()];
        if let Some(log_move_cost) = trace.get_minimum_log_move_cost(trace_position) {
            for (activity, count) in trace.get_suffix_activity_counts(trace_position) {
                let mut expression = vec![(problem.add_var(log_move_cost as f64, (0.0, f64::INFINITY)), 1.0)];
                for transition in product.get_transitions_with_activity(activity) {
                    let variable = problem.add_var(product.sync_move_cost as f64, (0.0, f64::INFINITY));
                    sync_moves[*transition] = Some(variable);
                    expression.push((variable, 1.0));
                }
                problem.add_constraint(expression, ComparisonOp::Eq, count as f64);
            }
        }

        //marking equation
        for (place, effects) in self.incidence.iter().enumerate() {
            let difference = product.final_marking.get(place) as f64 - marking.get(place) as f64;
            let mut expression = vec![];
            for (transition, effect) in effects {
                expression.push((model_moves[*transition], *effect));
                if let Some(variable) = sync_moves[*transition] {
                    expression.push((variable, *effect));
                }
            }
            if expression.is_empty() {
                if difference != 0.0 {
                    return None;
                }
                continue;
            }
            problem.add_constraint(expression, ComparisonOp::Eq, difference);
        }

        match problem.solve() {
            Ok(solution) => Some((solution.objective() - TOLERANCE).ceil().max(0.0) as u64),
            Err(Error::Infeasible) => None,
            Err(error) => {
                log::debug!("marking equation not solved ({}); estimating 0", error);
                Some(0)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        ebi_alignments::{
            cross_product_net::CrossProductNet, search_engine::AlignmentHeuristics,
            trace_net::TraceNet,
        },
        ebi_objects::{
            event_log::Trace,
            labelled_petri_net::{ArcType, LabelledPetriNet},
        },
        marking::Marking,
        techniques::align::AlignmentOptions,
    };

    use super::MarkingEquationHeuristic;

    /// p0 -A-> p1 -B-> p2
    fn sequence(reset: bool) -> CrossProductNet {
        let mut net = LabelledPetriNet::new("sequence");
        let p0 = net.add_place("p0").unwrap();
        let p1 = net.add_place("p1").unwrap();
        let p2 = net.add_place("p2").unwrap();
        let a = net.add_transition("a", Some("A")).unwrap();
        let b = net.add_transition("b", Some("B")).unwrap();
        net.add_place_transition_arc(p0, a, 1, ArcType::Normal).unwrap();
        net.add_transition_place_arc(a, p1, 1).unwrap();
        net.add_place_transition_arc(p1, b, 1, ArcType::Normal).unwrap();
        net.add_transition_place_arc(b, p2, 1).unwrap();
        if reset {
            net.add_place_transition_arc(p2, b, 1, ArcType::Reset).unwrap();
        }
        CrossProductNet::new(
            net,
            Marking::from_vec(vec![(p0, 1)]),
            Marking::from_vec(vec![(p2, 1)]),
            &AlignmentOptions::default(),
        )
        .unwrap()
    }

    fn estimate(product: &CrossProductNet, activities: &[&str], marking: &Marking, position: usize) -> Option<u64> {
        let trace = TraceNet::new(
            &Trace::from_activities(activities.iter().copied()),
            product,
            &AlignmentOptions::default(),
        )
        .unwrap();
        MarkingEquationHeuristic::new(product).estimate(product, &trace, marking, position)
    }

    #[test]
    fn lower_bounds() {
        let product = sequence(false);
        let initial = product.initial_marking.clone();

        //perfectly fitting
        assert_eq!(estimate(&product, &["A", "B"], &initial, 0), Some(0));
        //B must be a model move
        assert_eq!(estimate(&product, &["A"], &initial, 0), Some(10000));
        //C is a log move, B a model move
        assert_eq!(estimate(&product, &["A", "C"], &initial, 0), Some(20000));
        //only the suffix counts
        assert_eq!(estimate(&product, &["C", "A", "B"], &initial, 1), Some(0));
    }

    #[test]
    fn dead_end() {
        let product = sequence(false);
        //tokens in p1 and p2 can never return to the single-token final marking
        let stuck = Marking::from_vec(vec![(2, 2)]);
        assert_eq!(estimate(&product, &[], &stuck, 0), None);
    }

    #[test]
    fn reset_arcs_give_zero() {
        let product = sequence(true);
        let initial = product.initial_marking.clone();
        assert_eq!(estimate(&product, &["A"], &initial, 0), Some(0));
    }
}
