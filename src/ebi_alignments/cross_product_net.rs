use anyhow::{Context, Result};
use bitvec::bitvec;

use crate::{
    ebi_alignments::{cross_product_search_state::MoveKind, trace_net::TraceNet},
    ebi_framework::{activity_key::Activity, model_error::ModelError},
    ebi_objects::{
        event_log::Attributes,
        labelled_petri_net::{LabelledPetriNet, TransitionIndex},
    },
    marking::{DataMarking, Marking},
    techniques::align::AlignmentOptions,
};

/// The model side of the synchronous product, prepared once and shared by all traces.
/// The product itself is never built: successors are generated on demand from a
/// (marking, trace position) pair.
#[derive(Debug)]
pub struct CrossProductNet {
    pub(crate) net: LabelledPetriNet,
    pub(crate) initial_marking: Marking,
    pub(crate) final_marking: Marking,
    pub(crate) model_move_costs: Vec<u64>,
    pub(crate) sync_move_cost: u64,
    /// Transitions sorted by (model-move cost, index).
    pub(crate) model_move_order: Vec<TransitionIndex>,
    /// For each model activity, the transitions carrying it.
    pub(crate) activity2transitions: Vec<Vec<TransitionIndex>>,
    pub(crate) data_aware: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Successor {
    pub kind: MoveKind,
    pub transition: Option<TransitionIndex>,
    /// `None` for a log move, which keeps the marking.
    pub marking: Option<DataMarking>,
    pub cost: u64,
}

impl CrossProductNet {
    pub fn new(
        net: LabelledPetriNet,
        initial_marking: Marking,
        final_marking: Marking,
        options: &AlignmentOptions,
    ) -> Result<Self> {
        net.check_marking(&initial_marking)
            .context("checking the initial marking")?;
        net.check_marking(&final_marking)
            .context("checking the final marking")?;

        if options.invisible_cost == 0 {
            return Err(ModelError::InvalidCost(
                "the cost of invisible model moves must be positive".to_string(),
            )
            .into());
        }

        let mut model_move_costs = Vec::with_capacity(net.get_number_of_transitions());
        for transition in 0..net.get_number_of_transitions() {
            let cost = match (
                net.get_transition_properties(transition).cost,
                &options.model_cost_function,
            ) {
                (Some(cost), _) => cost,
                (None, Some(function)) => {
                    let cost = function(&net, transition);
                    u64::try_from(cost).map_err(|_| {
                        ModelError::InvalidCost(format!(
                            "model-move cost {} of transition `{}`",
                            cost,
                            net.get_transition_name(transition).unwrap_or_default()
                        ))
                    })?
                }
                (None, None) if net.is_transition_silent(transition) => options.invisible_cost,
                (None, None) => options.log_move_cost,
            };
            model_move_costs.push(cost);
        }

        let mut model_move_order: Vec<TransitionIndex> = (0..net.get_number_of_transitions()).collect();
        model_move_order.sort_by_key(|transition| (model_move_costs[*transition], *transition));

        let mut activity2transitions =
            vec![vec![]; net.get_activity_key().get_number_of_activities()];
        for transition in 0..net.get_number_of_transitions() {
            if let Some(activity) = net.get_transition_label(transition) {
                activity2transitions[activity.id()].push(transition);
            }
        }

        let data_aware = net.is_data_aware();
        Ok(Self {
            net,
            initial_marking,
            final_marking,
            model_move_costs,
            sync_move_cost: options.sync_cost,
            model_move_order,
            activity2transitions,
            data_aware,
        })
    }

    pub fn get_net(&self) -> &LabelledPetriNet {
        &self.net
    }

    pub fn is_final(&self, marking: &DataMarking) -> bool {
        marking.marking == self.final_marking
    }

    pub fn get_transitions_with_activity(
        &self,
        activity: Activity,
    ) -> &[TransitionIndex] {
        self.activity2transitions
            .get(activity.id())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// All moves out of `(marking, trace_position)`, in expansion order: synchronous moves,
    /// then model moves by ascending cost, then the log move.
    ///
    /// A transition that can move synchronously is not offered as a model move, a model move
    /// that leaves the state unchanged is dropped, and with `restrict_log_after_model` no log
    /// move follows a model move.
    pub fn successors(
        &self,
        trace: &TraceNet,
        marking: &DataMarking,
        trace_position: usize,
        previous_move: Option<MoveKind>,
        restrict_log_after_model: bool,
    ) -> Vec<Successor> {
        let mut result = vec![];
        let event = if self.data_aware {
            trace.get_event(trace_position)
        } else {
            None
        };

        //synchronous moves
        let mut sync_consumed = bitvec![0; self.net.get_number_of_transitions()];
        if let Some(activity) = trace.get_activity(trace_position) {
            for transition in self.get_transitions_with_activity(activity) {
                if self.is_enabled(*transition, marking, event) {
                    sync_consumed.set(*transition, true);
                    result.push(Successor {
                        kind: MoveKind::Synchronous,
                        transition: Some(*transition),
                        marking: Some(self.fire(*transition, marking, event)),
                        cost: self.sync_move_cost,
                    });
                }
            }
        }

        //model moves
        for transition in &self.model_move_order {
            if sync_consumed[*transition] || !self.is_enabled(*transition, marking, None) {
                continue;
            }
            let new_marking = self.fire(*transition, marking, None);
            if &new_marking == marking {
                continue;
            }
            result.push(Successor {
                kind: MoveKind::Model,
                transition: Some(*transition),
                marking: Some(new_marking),
                cost: self.model_move_costs[*transition],
            });
        }

        //log move
        if trace_position < trace.len()
            && !(restrict_log_after_model && previous_move == Some(MoveKind::Model))
        {
            result.push(Successor {
                kind: MoveKind::Log,
                transition: None,
                marking: None,
                cost: trace.get_log_move_cost(trace_position),
            });
        }

        result
    }

    fn is_enabled(
        &self,
        transition: TransitionIndex,
        marking: &DataMarking,
        event: Option<&Attributes>,
    ) -> bool {
        if self.data_aware {
            self.net.is_enabled_data(transition, marking, event)
        } else {
            self.net.is_enabled(transition, &marking.marking)
        }
    }

    fn fire(
        &self,
        transition: TransitionIndex,
        marking: &DataMarking,
        event: Option<&Attributes>,
    ) -> DataMarking {
        if self.data_aware {
            self.net.fire_data(transition, marking, event)
        } else {
            DataMarking::new(self.net.fire(transition, &marking.marking))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::{
        ebi_alignments::{cross_product_search_state::MoveKind, trace_net::TraceNet},
        ebi_framework::model_error::ModelError,
        ebi_objects::{
            event_log::Trace,
            labelled_petri_net::{ArcType, LabelledPetriNet},
        },
        marking::{DataMarking, Marking},
        techniques::align::AlignmentOptions,
    };

    use super::CrossProductNet;

    /// p0 -A-> p1, p0 -B-> p1, p0 -tau-> p1, plus a self-loop C on p0
    fn choice() -> (LabelledPetriNet, Marking, Marking) {
        let mut net = LabelledPetriNet::new("choice");
        let p0 = net.add_place("p0").unwrap();
        let p1 = net.add_place("p1").unwrap();
        for (name, label) in [("a", Some("A")), ("b", Some("B")), ("tau", None), ("c", Some("C"))] {
            let t = net.add_transition(name, label).unwrap();
            net.add_place_transition_arc(p0, t, 1, ArcType::Normal).unwrap();
            net.add_transition_place_arc(t, if name == "c" { p0 } else { p1 }, 1)
                .unwrap();
        }
        (
            net,
            Marking::from_vec(vec![(p0, 1)]),
            Marking::from_vec(vec![(p1, 1)]),
        )
    }

    #[test]
    fn expansion_order() {
        let (net, initial, final_marking) = choice();
        let options = AlignmentOptions::default();
        let product = CrossProductNet::new(net.clone(), initial.clone(), final_marking, &options).unwrap();
        let trace = TraceNet::new(&Trace::from_activities(["A"]), &product, &options).unwrap();

        let successors = product.successors(&trace, &DataMarking::new(initial), 0, None, true);
        let moves = successors
            .iter()
            .map(|s| (s.kind, s.transition.map(|t| net.get_transition_name(t).unwrap())))
            .collect::<Vec<_>>();

        //a moves synchronously so it is no model move; the self-loop c changes nothing
        assert_eq!(
            moves,
            vec![
                (MoveKind::Synchronous, Some("a")),
                (MoveKind::Model, Some("tau")),
                (MoveKind::Model, Some("b")),
                (MoveKind::Log, None)
            ]
        );
        assert_eq!(successors[1].cost, 1);
        assert_eq!(successors[2].cost, 10000);
    }

    #[test]
    fn no_log_move_after_model_move() {
        let (net, initial, final_marking) = choice();
        let options = AlignmentOptions::default();
        let product = CrossProductNet::new(net, initial.clone(), final_marking, &options).unwrap();
        let trace = TraceNet::new(&Trace::from_activities(["X"]), &product, &options).unwrap();
        let marking = DataMarking::new(initial);

        let restricted = product.successors(&trace, &marking, 0, Some(MoveKind::Model), true);
        assert!(restricted.iter().all(|s| s.kind != MoveKind::Log));

        let unrestricted = product.successors(&trace, &marking, 0, Some(MoveKind::Model), false);
        assert_eq!(unrestricted.last().map(|s| s.kind), Some(MoveKind::Log));
    }

    #[test]
    fn invalid_costs() {
        let (net, initial, final_marking) = choice();

        let options = AlignmentOptions {
            invisible_cost: 0,
            ..Default::default()
        };
        let error = CrossProductNet::new(net.clone(), initial.clone(), final_marking.clone(), &options)
            .unwrap_err();
        assert!(matches!(
            error.downcast_ref::<ModelError>(),
            Some(ModelError::InvalidCost(_))
        ));

        let options = AlignmentOptions {
            model_cost_function: Some(Arc::new(
                |_: &LabelledPetriNet, transition: usize| transition as i64 - 2,
            )),
            ..Default::default()
        };
        let error = CrossProductNet::new(net, initial, final_marking, &options).unwrap_err();
        assert!(matches!(
            error.downcast_ref::<ModelError>(),
            Some(ModelError::InvalidCost(_))
        ));
    }

    #[test]
    fn invalid_marking() {
        let (net, initial, _) = choice();
        let error = CrossProductNet::new(
            net,
            initial,
            Marking::from_vec(vec![(7, 1)]),
            &AlignmentOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(
            error.downcast_ref::<ModelError>(),
            Some(ModelError::InvalidMarking(_))
        ));
    }
}
