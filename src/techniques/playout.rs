use anyhow::{Context, Result};
use std::{
    collections::{HashSet, VecDeque},
    hash::Hash,
    time::Instant,
};

use crate::{ebi_framework::activity_key::Activity, semantics::semantics::Semantics};

pub trait Playout {
    /// Label sequences of complete runs, shortest first, at most `max_traces` distinct ones.
    /// Runs are explored breadth-first, firing enabled transitions in index order, and are cut
    /// off after `max_length` transitions. A run that reaches a state with a label sequence
    /// seen before is not extended.
    ///
    /// Returns `None` if the deadline passed first.
    fn playout(
        &self,
        max_traces: usize,
        max_length: usize,
        deadline: Option<Instant>,
    ) -> Result<Option<Vec<Vec<String>>>>;
}

impl<T> Playout for T
where
    T: Semantics + ?Sized,
    T::SemState: Hash + Eq,
{
    fn playout(
        &self,
        max_traces: usize,
        max_length: usize,
        deadline: Option<Instant>,
    ) -> Result<Option<Vec<Vec<String>>>> {
        let mut result = vec![];
        let mut seen: HashSet<Vec<Activity>> = HashSet::new();
        let mut visited: HashSet<(T::SemState, Vec<Activity>)> = HashSet::new();

        let initial_state = self.get_initial_state();
        visited.insert((initial_state.clone(), vec![]));
        let mut queue = VecDeque::new();
        queue.push_back((initial_state, vec![], 0usize));

        while let Some((state, trace, length)) = queue.pop_front() {
            if result.len() >= max_traces {
                break;
            }
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                log::debug!(
                    "playout reached its deadline with {} traces and {} runs queued",
                    result.len(),
                    queue.len()
                );
                return Ok(None);
            }

            if self.is_final_state(&state) && seen.insert(trace.clone()) {
                result.push(
                    trace
                        .iter()
                        .map(|activity| {
                            self.get_activity_key()
                                .get_activity_label(activity)
                                .map(str::to_string)
                                .with_context(|| format!("activity {} has no label", activity))
                        })
                        .collect::<Result<Vec<_>>>()?,
                );
            }

            if length >= max_length {
                continue;
            }
            for transition in self.get_enabled_transitions(&state) {
                let mut next_state = state.clone();
                self.execute_transition(&mut next_state, transition)?;
                let mut next_trace = trace.clone();
                if let Some(activity) = self.get_transition_activity(transition) {
                    next_trace.push(activity);
                }
                //runs are queued in order of length, so an earlier visit can do all this one can
                if visited.insert((next_state.clone(), next_trace.clone())) {
                    queue.push_back((next_state, next_trace, length + 1));
                }
            }
        }

        log::debug!("playout produced {} traces", result.len());
        Ok(Some(result))
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use ntest::timeout;

    use crate::{
        ebi_objects::{
            accepting_petri_net::AcceptingPetriNet,
            labelled_petri_net::{ArcType, LabelledPetriNet},
        },
        marking::Marking,
    };

    use super::Playout;

    /// p0 -A-> p1 -B-> p0, with a silent skip of B
    fn cycle() -> AcceptingPetriNet {
        let mut net = LabelledPetriNet::new("cycle");
        let p0 = net.add_place("p0").unwrap();
        let p1 = net.add_place("p1").unwrap();
        let a = net.add_transition("a", Some("A")).unwrap();
        let b = net.add_transition("b", Some("B")).unwrap();
        let tau = net.add_transition("tau", None).unwrap();
        net.add_place_transition_arc(p0, a, 1, ArcType::Normal).unwrap();
        net.add_transition_place_arc(a, p1, 1).unwrap();
        net.add_place_transition_arc(p1, b, 1, ArcType::Normal).unwrap();
        net.add_transition_place_arc(b, p0, 1).unwrap();
        net.add_place_transition_arc(p1, tau, 1, ArcType::Normal).unwrap();
        net.add_transition_place_arc(tau, p0, 1).unwrap();
        let marking = Marking::from_vec(vec![(p0, 1)]);
        AcceptingPetriNet::new(net, marking.clone(), marking).unwrap()
    }

    #[test]
    fn breadth_first_runs() {
        let net = cycle();
        let traces = net.playout(4, 10, None).unwrap().unwrap();
        assert_eq!(
            traces,
            vec![
                vec![],
                vec!["A".to_string(), "B".to_string()],
                vec!["A".to_string()],
                vec!["A".to_string(), "B".to_string(), "A".to_string(), "B".to_string()],
            ]
        );
    }

    #[test]
    fn length_limit() {
        let net = cycle();
        let traces = net.playout(100, 2, None).unwrap().unwrap();
        assert_eq!(traces.len(), 3);
    }

    /// p0 with two silent self-loops and a visible self-loop
    fn silent_loops() -> AcceptingPetriNet {
        let mut net = LabelledPetriNet::new("silent loops");
        let p0 = net.add_place("p0").unwrap();
        for (name, label) in [("tau1", None), ("tau2", None), ("a", Some("A"))] {
            let transition = net.add_transition(name, label).unwrap();
            net.add_place_transition_arc(p0, transition, 1, ArcType::Normal).unwrap();
            net.add_transition_place_arc(transition, p0, 1).unwrap();
        }
        let marking = Marking::from_vec(vec![(p0, 1)]);
        AcceptingPetriNet::new(net, marking.clone(), marking).unwrap()
    }

    #[test]
    #[timeout(10000)]
    fn silent_cycles_are_not_unrolled() {
        let net = silent_loops();
        let traces = net.playout(1000, 60, None).unwrap().unwrap();
        assert_eq!(traces.len(), 61);
        assert_eq!(traces[0], Vec::<String>::new());
        assert_eq!(traces[2], vec!["A".to_string(), "A".to_string()]);
    }

    #[test]
    fn deadline() {
        let net = cycle();
        assert_eq!(net.playout(4, 10, Some(Instant::now())).unwrap(), None);

        let later = Instant::now() + Duration::from_secs(3600);
        assert_eq!(net.playout(4, 10, Some(later)).unwrap().map(|traces| traces.len()), Some(4));
    }
}
