use anyhow::{Context, Error, Result};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, str::FromStr};

use crate::{
    ebi_framework::infoable::Infoable,
    ebi_objects::{
        labelled_petri_net::{ArcEndpoints, ArcType, LabelledPetriNet},
        transition_properties::TransitionProperties,
    },
    marking::Marking,
};

/// A labelled Petri net with its initial and final marking.
#[derive(Clone, Debug)]
pub struct AcceptingPetriNet {
    pub net: LabelledPetriNet,
    pub initial_marking: Marking,
    pub final_marking: Marking,
}

impl AcceptingPetriNet {
    pub fn new(net: LabelledPetriNet, initial_marking: Marking, final_marking: Marking) -> Result<Self> {
        net.check_marking(&initial_marking)
            .context("checking the initial marking")?;
        net.check_marking(&final_marking)
            .context("checking the final marking")?;
        Ok(Self {
            net,
            initial_marking,
            final_marking,
        })
    }

    pub fn to_definition(&self) -> NetDefinition {
        let net = &self.net;
        let names = |marking: &Marking| {
            marking
                .iter()
                .map(|(place, tokens)| (net.place_names[place].clone(), tokens))
                .collect()
        };
        NetDefinition {
            name: net.get_name().to_string(),
            places: net.place_names.clone(),
            transitions: (0..net.get_number_of_transitions())
                .map(|transition| TransitionDefinition {
                    name: net.transition_names[transition].clone(),
                    label: net.get_transition_label_str(transition).map(str::to_string),
                    properties: net.get_transition_properties(transition).to_map(),
                })
                .collect(),
            arcs: net
                .get_arcs()
                .iter()
                .map(|arc| {
                    let (from, to) = match arc.endpoints {
                        ArcEndpoints::PlaceTransition(place, transition) => (
                            net.place_names[place].clone(),
                            net.transition_names[transition].clone(),
                        ),
                        ArcEndpoints::TransitionPlace(transition, place) => (
                            net.transition_names[transition].clone(),
                            net.place_names[place].clone(),
                        ),
                    };
                    ArcDefinition {
                        from,
                        to,
                        weight: arc.weight,
                        arc_type: arc.arc_type,
                    }
                })
                .collect(),
            initial_marking: names(&self.initial_marking),
            final_marking: names(&self.final_marking),
        }
    }
}

impl FromStr for AcceptingPetriNet {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let definition: NetDefinition =
            serde_json::from_str(s).context("parsing Petri net definition")?;
        definition.build()
    }
}

impl Infoable for AcceptingPetriNet {
    fn info(&self, f: &mut impl std::io::Write) -> Result<()> {
        writeln!(f, "Name\t\t\t\t{}", self.net.get_name())?;
        self.net.info(f)?;
        writeln!(
            f,
            "Initial marking\t\t\t{}",
            self.initial_marking.display_with_names(&self.net)
        )?;
        writeln!(
            f,
            "Final marking\t\t\t{}",
            self.final_marking.display_with_names(&self.net)
        )?;
        Ok(())
    }
}

/// Serialisable description of an accepting Petri net; everything is referenced by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetDefinition {
    #[serde(default)]
    pub name: String,
    pub places: Vec<String>,
    pub transitions: Vec<TransitionDefinition>,
    pub arcs: Vec<ArcDefinition>,
    #[serde(default)]
    pub initial_marking: BTreeMap<String, u64>,
    #[serde(default)]
    pub final_marking: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionDefinition {
    pub name: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArcDefinition {
    pub from: String,
    pub to: String,
    #[serde(default = "default_weight")]
    pub weight: u64,
    #[serde(default, rename = "type")]
    pub arc_type: ArcType,
}

fn default_weight() -> u64 {
    1
}

impl NetDefinition {
    pub fn build(&self) -> Result<AcceptingPetriNet> {
        let mut net = LabelledPetriNet::new(&self.name);
        for place in &self.places {
            net.add_place(place)?;
        }
        for transition in &self.transitions {
            let properties = TransitionProperties::from_map(
                transition
                    .properties
                    .iter()
                    .map(|(key, value)| (key.as_str(), value.as_str())),
            )
            .with_context(|| format!("reading properties of transition `{}`", transition.name))?;
            net.add_transition_with_properties(
                &transition.name,
                transition.label.as_deref(),
                properties,
            )?;
        }
        for arc in &self.arcs {
            net.add_arc_by_name(&arc.from, &arc.to, arc.weight, arc.arc_type)?;
        }

        let initial_marking = Marking::from_names(
            &net,
            self.initial_marking
                .iter()
                .map(|(place, tokens)| (place.as_str(), *tokens)),
        )
        .context("reading the initial marking")?;
        let final_marking = Marking::from_names(
            &net,
            self.final_marking
                .iter()
                .map(|(place, tokens)| (place.as_str(), *tokens)),
        )
        .context("reading the final marking")?;

        AcceptingPetriNet::new(net, initial_marking, final_marking)
    }
}
