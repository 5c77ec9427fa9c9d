use anyhow::{Context, Error, Result};
use std::collections::HashMap;

use crate::{
    ebi_alignments::cross_product_net::CrossProductNet,
    ebi_framework::{activity_key::Activity, model_error::ModelError},
    ebi_objects::event_log::{Attributes, Trace},
    techniques::align::AlignmentOptions,
};

/// The trace side of the synchronous product: a linear sequence of events, translated to the
/// model's activities, with the cost of skipping each one.
#[derive(Debug, Clone)]
pub struct TraceNet {
    pub(crate) labels: Vec<String>,
    pub(crate) activities: Vec<Activity>,
    pub(crate) log_move_costs: Vec<u64>,
    /// Event attributes, only kept when the net is data-aware.
    pub(crate) events: Vec<Attributes>,
    /// `suffix_minimum_log_move_cost[i]` is the cheapest log move at position `i` or later.
    suffix_minimum_log_move_cost: Vec<u64>,
}

impl TraceNet {
    pub fn new(trace: &Trace, product: &CrossProductNet, options: &AlignmentOptions) -> Result<Self> {
        let labels = trace
            .get_activities(&options.activity_key)
            .context("reading the activities of the trace")?;
        Self::from_labels(
            labels,
            if product.data_aware {
                trace.events.iter().map(|event| event.attributes.clone()).collect()
            } else {
                vec![]
            },
            product,
            options,
        )
    }

    pub fn from_labels(
        labels: Vec<String>,
        events: Vec<Attributes>,
        product: &CrossProductNet,
        options: &AlignmentOptions,
    ) -> Result<Self> {
        let activities = product
            .net
            .get_activity_key()
            .translate_trace(labels.iter().map(String::as_str));

        let log_move_costs = (0..labels.len())
            .map(|position| match &options.trace_cost_function {
                Some(function) => {
                    let cost = function(position);
                    u64::try_from(cost).map_err(|_| {
                        Error::from(ModelError::InvalidCost(format!(
                            "log-move cost {} at trace position {}",
                            cost, position
                        )))
                    })
                }
                None => Ok(options.log_move_cost),
            })
            .collect::<Result<Vec<_>>>()?;

        let mut suffix_minimum_log_move_cost = vec![u64::MAX; labels.len() + 1];
        for position in (0..labels.len()).rev() {
            suffix_minimum_log_move_cost[position] =
                log_move_costs[position].min(suffix_minimum_log_move_cost[position + 1]);
        }

        Ok(Self {
            labels,
            activities,
            log_move_costs,
            events,
            suffix_minimum_log_move_cost,
        })
    }

    pub fn len(&self) -> usize {
        self.activities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.activities.is_empty()
    }

    pub fn get_activity(&self, position: usize) -> Option<Activity> {
        self.activities.get(position).copied()
    }

    pub fn get_label(&self, position: usize) -> Option<&str> {
        self.labels.get(position).map(String::as_str)
    }

    pub fn get_log_move_cost(&self, position: usize) -> u64 {
        self.log_move_costs[position]
    }

    pub fn get_event(&self, position: usize) -> Option<&Attributes> {
        self.events.get(position)
    }

    pub fn get_minimum_log_move_cost(&self, from_position: usize) -> Option<u64> {
        self.suffix_minimum_log_move_cost
            .get(from_position)
            .copied()
            .filter(|cost| *cost != u64::MAX)
    }

    /// Number of occurrences of each activity from `from_position` on.
    pub fn get_suffix_activity_counts(&self, from_position: usize) -> Vec<(Activity, usize)> {
        let mut counts: HashMap<Activity, usize> = HashMap::new();
        for activity in self.activities.iter().skip(from_position) {
            *counts.entry(*activity).or_default() += 1;
        }
        let mut result = counts.into_iter().collect::<Vec<_>>();
        result.sort();
        result
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::{
        ebi_alignments::cross_product_net::CrossProductNet,
        ebi_framework::model_error::ModelError,
        ebi_objects::{event_log::Trace, labelled_petri_net::LabelledPetriNet},
        marking::Marking,
        techniques::align::AlignmentOptions,
    };

    use super::TraceNet;

    fn product(options: &AlignmentOptions) -> CrossProductNet {
        let mut net = LabelledPetriNet::new("");
        net.add_place("p").unwrap();
        net.add_transition("a", Some("A")).unwrap();
        CrossProductNet::new(net, Marking::new(), Marking::new(), options).unwrap()
    }

    #[test]
    fn costs_and_counts() {
        let options = AlignmentOptions {
            trace_cost_function: Some(Arc::new(|position: usize| 10 - position as i64)),
            ..Default::default()
        };
        let product = product(&options);
        let trace = TraceNet::new(&Trace::from_activities(["A", "Z", "A"]), &product, &options).unwrap();

        assert_eq!(trace.len(), 3);
        assert_eq!(trace.log_move_costs, vec![10, 9, 8]);
        assert_eq!(trace.get_minimum_log_move_cost(0), Some(8));
        assert_eq!(trace.get_minimum_log_move_cost(3), None);
        assert_eq!(trace.get_activity(0), trace.get_activity(2));
        assert_eq!(trace.get_activity(1).unwrap().id(), 1);
        assert_eq!(trace.get_label(1), Some("Z"));

        let counts = trace.get_suffix_activity_counts(1);
        assert_eq!(counts.len(), 2);
        assert!(counts.iter().all(|(_, count)| *count == 1));
    }

    #[test]
    fn negative_log_cost() {
        let options = AlignmentOptions {
            trace_cost_function: Some(Arc::new(|_: usize| -1i64)),
            ..Default::default()
        };
        let product = product(&options);
        let error = TraceNet::new(&Trace::from_activities(["A"]), &product, &options).unwrap_err();
        assert!(matches!(
            error.downcast_ref::<ModelError>(),
            Some(ModelError::InvalidCost(_))
        ));
    }
}
