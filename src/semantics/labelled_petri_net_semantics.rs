use anyhow::{Result, anyhow};
use bitvec::{bitvec, vec::BitVec};

use crate::{
    ebi_framework::activity_key::{Activity, ActivityKey},
    ebi_objects::{
        accepting_petri_net::AcceptingPetriNet,
        event_log::Attributes,
        guard_expression::OverlayScope,
        labelled_petri_net::{ArcType, LabelledPetriNet, TransitionIndex},
    },
    marking::{DataMarking, Marking},
    semantics::semantics::Semantics,
};

impl LabelledPetriNet {
    /// Control-flow enabling: normal arcs need their weight in tokens, inhibitor arcs need an
    /// empty place, reset arcs impose nothing.
    pub fn is_enabled(&self, transition: TransitionIndex, marking: &Marking) -> bool {
        self.get_input_arcs(transition)
            .all(|(place, cardinality, arc_type)| match arc_type {
                ArcType::Normal => marking.get(place) >= cardinality,
                ArcType::Inhibitor => marking.get(place) == 0,
                ArcType::Reset => true,
            })
    }

    /// Fires `transition` without checking whether it is enabled; token counts saturate at zero.
    pub fn fire(&self, transition: TransitionIndex, marking: &Marking) -> Marking {
        let mut result = marking.clone();
        for (place, cardinality, arc_type) in self.get_input_arcs(transition) {
            match arc_type {
                ArcType::Normal => result.remove(place, cardinality),
                ArcType::Inhibitor => {}
                ArcType::Reset => result.clear_place(place),
            }
        }
        for (place, cardinality) in self.get_output_arcs(transition) {
            result.add(place, cardinality);
        }
        result
    }

    pub fn enabled_transitions<'a>(
        &'a self,
        marking: &'a Marking,
    ) -> impl Iterator<Item = TransitionIndex> + 'a {
        (0..self.get_number_of_transitions())
            .filter(move |transition| self.is_enabled(*transition, marking))
    }

    /// Data-aware enabling. With an event, the guard sees the event's attributes on top of the
    /// marking's variables (a synchronous move); without, only the variables (a model move).
    pub fn is_enabled_data(
        &self,
        transition: TransitionIndex,
        marking: &DataMarking,
        event: Option<&Attributes>,
    ) -> bool {
        if !self.is_enabled(transition, &marking.marking) {
            return false;
        }
        match &self.properties[transition].guard {
            Some(guard) => guard.evaluate(&OverlayScope {
                event,
                variables: &marking.variables,
            }),
            None => true,
        }
    }

    /// Data-aware firing. Only a synchronous move (with an event) writes variables: each of the
    /// transition's write variables takes the event's value, if the event has one.
    pub fn fire_data(
        &self,
        transition: TransitionIndex,
        marking: &DataMarking,
        event: Option<&Attributes>,
    ) -> DataMarking {
        let mut variables = marking.variables.clone();
        if let Some(event) = event {
            for variable in &self.properties[transition].write_variables {
                if let Some(value) = event.get(variable) {
                    variables.insert(variable.clone(), value.clone());
                }
            }
        }
        DataMarking {
            marking: self.fire(transition, &marking.marking),
            variables,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct LPNMarking {
    pub(crate) marking: Marking,
    pub(crate) enabled_transitions: BitVec,
    pub(crate) number_of_enabled_transitions: usize,
}

impl LPNMarking {
    pub fn get_marking(&self) -> &Marking {
        &self.marking
    }
}

fn compute_enabled_transition(
    net: &LabelledPetriNet,
    state: &mut LPNMarking,
    transition: TransitionIndex,
) {
    let enabled = net.is_enabled(transition, &state.marking);
    if enabled != state.enabled_transitions[transition] {
        state.enabled_transitions.set(transition, enabled);
        if enabled {
            state.number_of_enabled_transitions += 1;
        } else {
            state.number_of_enabled_transitions -= 1;
        }
    }
}

impl Semantics for AcceptingPetriNet {
    type SemState = LPNMarking;

    fn get_activity_key(&self) -> &ActivityKey {
        self.net.get_activity_key()
    }

    fn get_initial_state(&self) -> LPNMarking {
        let mut result = LPNMarking {
            marking: self.initial_marking.clone(),
            enabled_transitions: bitvec![0; self.net.get_number_of_transitions()],
            number_of_enabled_transitions: 0,
        };
        for transition in 0..self.net.get_number_of_transitions() {
            compute_enabled_transition(&self.net, &mut result, transition);
        }
        result
    }

    fn execute_transition(&self, state: &mut LPNMarking, transition: TransitionIndex) -> Result<()> {
        if transition >= self.net.get_number_of_transitions() || !state.enabled_transitions[transition] {
            return Err(anyhow!("transition {} is not enabled", transition));
        }

        state.marking = self.net.fire(transition, &state.marking);

        //only transitions connected to a touched place can change their enabledness
        let touched = self
            .net
            .get_input_arcs(transition)
            .map(|(place, _, _)| place)
            .chain(self.net.get_output_arcs(transition).map(|(place, _)| place))
            .collect::<Vec<_>>();
        for place in touched {
            for transition_t in self.net.get_place_output_transitions(place) {
                compute_enabled_transition(&self.net, state, *transition_t);
            }
        }
        Ok(())
    }

    fn is_final_state(&self, state: &LPNMarking) -> bool {
        state.marking == self.final_marking
    }

    fn is_transition_silent(&self, transition: TransitionIndex) -> bool {
        self.net.is_transition_silent(transition)
    }

    fn get_transition_activity(&self, transition: TransitionIndex) -> Option<Activity> {
        self.net.get_transition_label(transition)
    }

    fn get_enabled_transitions(&self, state: &LPNMarking) -> Vec<TransitionIndex> {
        let mut result = Vec::with_capacity(state.number_of_enabled_transitions);
        result.extend(state.enabled_transitions.iter_ones());
        result
    }

    fn get_number_of_transitions(&self) -> usize {
        self.net.get_number_of_transitions()
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        ebi_objects::{
            accepting_petri_net::AcceptingPetriNet,
            event_log::{AttributeValue, Attributes},
            labelled_petri_net::{ArcType, LabelledPetriNet},
            transition_properties::TransitionProperties,
        },
        marking::{DataMarking, Marking},
        semantics::semantics::Semantics,
    };

    #[test]
    fn weighted_arcs() {
        let mut net = LabelledPetriNet::new("");
        let p = net.add_place("p").unwrap();
        let q = net.add_place("q").unwrap();
        let t = net.add_transition("t", Some("A")).unwrap();
        net.add_place_transition_arc(p, t, 2, ArcType::Normal).unwrap();
        net.add_transition_place_arc(t, q, 3).unwrap();

        let one = Marking::from_vec(vec![(p, 1)]);
        assert!(!net.is_enabled(t, &one));

        let two = Marking::from_vec(vec![(p, 2)]);
        assert!(net.is_enabled(t, &two));
        assert_eq!(net.fire(t, &two), Marking::from_vec(vec![(q, 3)]));
        assert_eq!(net.enabled_transitions(&two).collect::<Vec<_>>(), vec![t]);
    }

    #[test]
    fn inhibitor_and_reset_arcs() {
        let mut net = LabelledPetriNet::new("");
        let p = net.add_place("p").unwrap();
        let buffer = net.add_place("buffer").unwrap();
        let q = net.add_place("q").unwrap();
        let inhibited = net.add_transition("inhibited", Some("X")).unwrap();
        let reset = net.add_transition("reset", None).unwrap();
        net.add_place_transition_arc(p, inhibited, 1, ArcType::Normal).unwrap();
        net.add_place_transition_arc(buffer, inhibited, 1, ArcType::Inhibitor).unwrap();
        net.add_place_transition_arc(p, reset, 1, ArcType::Normal).unwrap();
        net.add_place_transition_arc(buffer, reset, 1, ArcType::Reset).unwrap();
        net.add_transition_place_arc(reset, q, 1).unwrap();

        let marking = Marking::from_vec(vec![(p, 1), (buffer, 3)]);
        assert!(!net.is_enabled(inhibited, &marking));
        assert!(net.is_enabled(reset, &marking));
        assert_eq!(net.fire(reset, &marking), Marking::from_vec(vec![(q, 1)]));

        //a reset arc does not need tokens
        let empty_buffer = Marking::from_vec(vec![(p, 1)]);
        assert!(net.is_enabled(reset, &empty_buffer));
        assert!(net.is_enabled(inhibited, &empty_buffer));
    }

    #[test]
    fn guards_and_writes() {
        let mut net = LabelledPetriNet::new("");
        let p = net.add_place("p").unwrap();
        let t = net
            .add_transition_with_properties(
                "t",
                Some("A"),
                TransitionProperties::from_map([
                    ("guard", "amount > 100"),
                    ("writeVariables", "amount"),
                ])
                .unwrap(),
            )
            .unwrap();
        net.add_place_transition_arc(p, t, 1, ArcType::Normal).unwrap();

        let marking = DataMarking::new(Marking::from_vec(vec![(p, 1)]));
        let mut event = Attributes::new();
        event.insert("amount".to_string(), AttributeValue::Int(500));

        assert!(!net.is_enabled_data(t, &marking, None));
        assert!(net.is_enabled_data(t, &marking, Some(&event)));

        let after = net.fire_data(t, &marking, Some(&event));
        assert!(after.marking.is_empty());
        assert_eq!(after.variables.get("amount"), Some(&AttributeValue::Int(500)));

        let model_move = net.fire_data(t, &marking, None);
        assert!(model_move.variables.is_empty());
    }

    #[test]
    fn incremental_enabledness() {
        let mut net = LabelledPetriNet::new("");
        let p0 = net.add_place("p0").unwrap();
        let p1 = net.add_place("p1").unwrap();
        let a = net.add_transition("a", Some("A")).unwrap();
        let b = net.add_transition("b", Some("B")).unwrap();
        net.add_place_transition_arc(p0, a, 1, ArcType::Normal).unwrap();
        net.add_transition_place_arc(a, p1, 1).unwrap();
        net.add_place_transition_arc(p1, b, 1, ArcType::Normal).unwrap();

        let apn = AcceptingPetriNet::new(
            net,
            Marking::from_vec(vec![(p0, 1)]),
            Marking::new(),
        )
        .unwrap();

        let mut state = apn.get_initial_state();
        assert_eq!(apn.get_enabled_transitions(&state), vec![a]);
        assert!(apn.execute_transition(&mut state, b).is_err());
        apn.execute_transition(&mut state, a).unwrap();
        assert_eq!(apn.get_enabled_transitions(&state), vec![b]);
        apn.execute_transition(&mut state, b).unwrap();
        assert!(apn.get_enabled_transitions(&state).is_empty());
        assert!(apn.is_final_state(&state));
    }
}
