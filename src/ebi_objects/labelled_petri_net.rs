use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use strum_macros::{Display, EnumString};

use crate::{
    ebi_framework::{
        activity_key::{Activity, ActivityKey},
        infoable::Infoable,
        model_error::ModelError,
    },
    ebi_objects::transition_properties::TransitionProperties,
    marking::Marking,
};

pub type PlaceIndex = usize;
pub type TransitionIndex = usize;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ArcType {
    /// Consumes `weight` tokens; enabled only if that many are present.
    #[default]
    Normal,
    /// Enabled only if the place is empty; consumes nothing.
    Inhibitor,
    /// No enabling condition; empties the place.
    Reset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArcEndpoints {
    PlaceTransition(PlaceIndex, TransitionIndex),
    TransitionPlace(TransitionIndex, PlaceIndex),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetArc {
    pub endpoints: ArcEndpoints,
    pub weight: u64,
    pub arc_type: ArcType,
}

/// A labelled Petri net stored as an arena: places and transitions are indices, and each
/// transition keeps its input and output arcs next to each other.
#[derive(Clone, Debug, Default)]
pub struct LabelledPetriNet {
    pub(crate) name: String,
    pub(crate) activity_key: ActivityKey,
    pub(crate) place_names: Vec<String>,
    pub(crate) transition_names: Vec<String>,
    pub(crate) labels: Vec<Option<Activity>>,
    pub(crate) properties: Vec<TransitionProperties>,
    pub(crate) arcs: Vec<NetArc>,
    pub(crate) place2index: HashMap<String, PlaceIndex>,
    pub(crate) transition2index: HashMap<String, TransitionIndex>,
    pub(crate) place2output_transitions: Vec<Vec<TransitionIndex>>,
    pub(crate) transition2input_places: Vec<Vec<PlaceIndex>>,
    pub(crate) transition2input_places_cardinality: Vec<Vec<u64>>,
    pub(crate) transition2input_arc_types: Vec<Vec<ArcType>>,
    pub(crate) transition2output_places: Vec<Vec<PlaceIndex>>,
    pub(crate) transition2output_places_cardinality: Vec<Vec<u64>>,
}

impl LabelledPetriNet {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn get_name(&self) -> &str {
        &self.name
    }

    pub fn get_number_of_places(&self) -> usize {
        self.place_names.len()
    }

    pub fn get_number_of_transitions(&self) -> usize {
        self.transition_names.len()
    }

    pub fn get_activity_key(&self) -> &ActivityKey {
        &self.activity_key
    }

    pub fn add_place(&mut self, name: &str) -> Result<PlaceIndex> {
        if self.place2index.contains_key(name) {
            return Err(ModelError::InvalidNet(format!("duplicate place `{}`", name)).into());
        }
        let place = self.get_number_of_places();
        self.place_names.push(name.to_string());
        self.place2index.insert(name.to_string(), place);
        self.place2output_transitions.push(vec![]);
        Ok(place)
    }

    pub fn add_transition(&mut self, name: &str, label: Option<&str>) -> Result<TransitionIndex> {
        self.add_transition_with_properties(name, label, TransitionProperties::default())
    }

    pub fn add_transition_with_properties(
        &mut self,
        name: &str,
        label: Option<&str>,
        properties: TransitionProperties,
    ) -> Result<TransitionIndex> {
        if self.transition2index.contains_key(name) {
            return Err(ModelError::InvalidNet(format!("duplicate transition `{}`", name)).into());
        }
        let transition = self.get_number_of_transitions();
        let activity = label.map(|label| self.activity_key.process_activity(label));
        self.transition_names.push(name.to_string());
        self.transition2index.insert(name.to_string(), transition);
        self.labels.push(activity);
        self.properties.push(properties);
        self.transition2input_places.push(vec![]);
        self.transition2input_places_cardinality.push(vec![]);
        self.transition2input_arc_types.push(vec![]);
        self.transition2output_places.push(vec![]);
        self.transition2output_places_cardinality.push(vec![]);
        Ok(transition)
    }

    pub fn add_place_transition_arc(
        &mut self,
        from_place: PlaceIndex,
        to_transition: TransitionIndex,
        cardinality: u64,
        arc_type: ArcType,
    ) -> Result<()> {
        self.check_arc(from_place, to_transition, cardinality)?;

        if !self.place2output_transitions[from_place].contains(&to_transition) {
            self.place2output_transitions[from_place].push(to_transition);
        }

        let existing = (0..self.transition2input_places[to_transition].len()).find(|pos| {
            self.transition2input_places[to_transition][*pos] == from_place
                && self.transition2input_arc_types[to_transition][*pos] == arc_type
        });
        if let Some(pos) = existing {
            if arc_type == ArcType::Normal {
                self.transition2input_places_cardinality[to_transition][pos] += cardinality;
            }
        } else {
            self.transition2input_places[to_transition].push(from_place);
            self.transition2input_places_cardinality[to_transition].push(cardinality);
            self.transition2input_arc_types[to_transition].push(arc_type);
        }

        self.arcs.push(NetArc {
            endpoints: ArcEndpoints::PlaceTransition(from_place, to_transition),
            weight: cardinality,
            arc_type,
        });
        Ok(())
    }

    pub fn add_transition_place_arc(
        &mut self,
        from_transition: TransitionIndex,
        to_place: PlaceIndex,
        cardinality: u64,
    ) -> Result<()> {
        self.check_arc(to_place, from_transition, cardinality)?;

        if let Some(pos) = self.transition2output_places[from_transition]
            .iter()
            .position(|p| *p == to_place)
        {
            self.transition2output_places_cardinality[from_transition][pos] += cardinality;
        } else {
            self.transition2output_places[from_transition].push(to_place);
            self.transition2output_places_cardinality[from_transition].push(cardinality);
        }

        self.arcs.push(NetArc {
            endpoints: ArcEndpoints::TransitionPlace(from_transition, to_place),
            weight: cardinality,
            arc_type: ArcType::Normal,
        });
        Ok(())
    }

    /// Adds an arc between a place and a transition identified by name, in either direction.
    /// Inhibitor and reset arcs can only go from a place to a transition.
    pub fn add_arc_by_name(
        &mut self,
        from: &str,
        to: &str,
        cardinality: u64,
        arc_type: ArcType,
    ) -> Result<()> {
        if let (Some(place), Some(transition)) =
            (self.get_place_index(from), self.get_transition_index(to))
        {
            return self.add_place_transition_arc(place, transition, cardinality, arc_type);
        }
        if let (Some(transition), Some(place)) =
            (self.get_transition_index(from), self.get_place_index(to))
        {
            if arc_type != ArcType::Normal {
                return Err(ModelError::InvalidNet(format!(
                    "{} arc from transition `{}` to place `{}`; such arcs must go from a place to a transition",
                    arc_type, from, to
                ))
                .into());
            }
            return self.add_transition_place_arc(transition, place, cardinality);
        }
        Err(ModelError::InvalidNet(format!(
            "arc from `{}` to `{}` does not connect an existing place and an existing transition",
            from, to
        ))
        .into())
    }

    fn check_arc(
        &self,
        place: PlaceIndex,
        transition: TransitionIndex,
        cardinality: u64,
    ) -> Result<()> {
        if transition >= self.get_number_of_transitions() {
            return Err(ModelError::InvalidNet(format!(
                "non-existing transition {} referenced, while there are {}",
                transition,
                self.get_number_of_transitions()
            ))
            .into());
        } else if place >= self.get_number_of_places() {
            return Err(ModelError::InvalidNet(format!(
                "non-existing place {} referenced, while there are {}",
                place,
                self.get_number_of_places()
            ))
            .into());
        } else if cardinality == 0 {
            return Err(ModelError::InvalidNet(format!(
                "arc between place `{}` and transition `{}` has weight 0",
                self.place_names[place], self.transition_names[transition]
            ))
            .into());
        }
        Ok(())
    }

    pub fn get_place_index(&self, name: &str) -> Option<PlaceIndex> {
        self.place2index.get(name).copied()
    }

    pub fn get_transition_index(&self, name: &str) -> Option<TransitionIndex> {
        self.transition2index.get(name).copied()
    }

    pub fn get_place_name(&self, place: PlaceIndex) -> Option<&str> {
        self.place_names.get(place).map(String::as_str)
    }

    pub fn get_transition_name(&self, transition: TransitionIndex) -> Option<&str> {
        self.transition_names.get(transition).map(String::as_str)
    }

    pub fn get_transition_label(&self, transition: TransitionIndex) -> Option<Activity> {
        self.labels.get(transition).copied().flatten()
    }

    pub fn get_transition_label_str(&self, transition: TransitionIndex) -> Option<&str> {
        self.get_transition_label(transition)
            .and_then(|activity| self.activity_key.get_activity_label(&activity))
    }

    pub fn is_transition_silent(&self, transition: TransitionIndex) -> bool {
        self.get_transition_label(transition).is_none()
    }

    pub fn get_transition_properties(&self, transition: TransitionIndex) -> &TransitionProperties {
        &self.properties[transition]
    }

    pub fn get_arcs(&self) -> &[NetArc] {
        &self.arcs
    }

    pub fn get_input_arcs(
        &self,
        transition: TransitionIndex,
    ) -> impl Iterator<Item = (PlaceIndex, u64, ArcType)> + '_ {
        self.transition2input_places[transition]
            .iter()
            .zip(self.transition2input_places_cardinality[transition].iter())
            .zip(self.transition2input_arc_types[transition].iter())
            .map(|((place, cardinality), arc_type)| (*place, *cardinality, *arc_type))
    }

    pub fn get_output_arcs(
        &self,
        transition: TransitionIndex,
    ) -> impl Iterator<Item = (PlaceIndex, u64)> + '_ {
        self.transition2output_places[transition]
            .iter()
            .zip(self.transition2output_places_cardinality[transition].iter())
            .map(|(place, cardinality)| (*place, *cardinality))
    }

    pub fn get_place_output_transitions(&self, place: PlaceIndex) -> &[TransitionIndex] {
        &self.place2output_transitions[place]
    }

    pub fn has_arcs_of_type(&self, arc_type: ArcType) -> bool {
        self.arcs.iter().any(|arc| arc.arc_type == arc_type)
    }

    /// Whether any transition carries a guard or writes variables.
    pub fn is_data_aware(&self) -> bool {
        self.properties
            .iter()
            .any(TransitionProperties::is_data_aware)
    }

    pub fn check_marking(&self, marking: &Marking) -> Result<()> {
        match marking.get_maximum_place() {
            Some(place) if place >= self.get_number_of_places() => {
                Err(ModelError::InvalidMarking(format!(
                    "non-existing place {} referenced, while there are {}",
                    place,
                    self.get_number_of_places()
                ))
                .into())
            }
            _ => Ok(()),
        }
    }
}

impl Infoable for LabelledPetriNet {
    fn info(&self, f: &mut impl std::io::Write) -> Result<()> {
        writeln!(f, "Number of places\t\t{}", self.get_number_of_places())?;
        writeln!(
            f,
            "Number of transitions\t\t{}",
            self.get_number_of_transitions()
        )?;
        writeln!(
            f,
            "Number of activities\t\t{}",
            self.activity_key.get_number_of_activities()
        )?;
        writeln!(
            f,
            "Number of silent transitions\t{}",
            (0..self.get_number_of_transitions())
                .filter(|transition| self.is_transition_silent(*transition))
                .count()
        )?;
        writeln!(f, "Number of arcs\t\t\t{}", self.arcs.len())?;
        writeln!(
            f,
            "Inhibitor arcs\t\t\t{}",
            self.has_arcs_of_type(ArcType::Inhibitor)
        )?;
        writeln!(f, "Reset arcs\t\t\t{}", self.has_arcs_of_type(ArcType::Reset))?;
        writeln!(f, "Data-aware\t\t\t{}", self.is_data_aware())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use crate::{
        ebi_framework::{infoable::Infoable, model_error::ModelError},
        marking::Marking,
    };

    use super::{ArcType, LabelledPetriNet};

    fn is_invalid_net(result: anyhow::Result<()>) -> bool {
        matches!(
            result.unwrap_err().downcast_ref::<ModelError>(),
            Some(ModelError::InvalidNet(_))
        )
    }

    #[test]
    fn build_net() {
        let mut net = LabelledPetriNet::new("net");
        let p0 = net.add_place("p0").unwrap();
        let p1 = net.add_place("p1").unwrap();
        let a = net.add_transition("t_a", Some("A")).unwrap();
        let tau = net.add_transition("tau", None).unwrap();
        net.add_place_transition_arc(p0, a, 1, ArcType::Normal).unwrap();
        net.add_arc_by_name("p0", "t_a", 2, ArcType::Normal).unwrap();
        net.add_arc_by_name("t_a", "p1", 1, ArcType::Normal).unwrap();
        net.add_arc_by_name("p1", "tau", 1, ArcType::Inhibitor).unwrap();

        assert_eq!(net.get_input_arcs(a).collect::<Vec<_>>(), vec![(p0, 3, ArcType::Normal)]);
        assert_eq!(net.get_output_arcs(a).collect::<Vec<_>>(), vec![(p1, 1)]);
        assert_eq!(net.get_transition_label_str(a), Some("A"));
        assert!(net.is_transition_silent(tau));
        assert!(net.has_arcs_of_type(ArcType::Inhibitor));
        assert!(!net.has_arcs_of_type(ArcType::Reset));
        assert_eq!(net.get_arcs().len(), 4);
        assert_eq!(net.get_place_output_transitions(p1), &[tau]);

        let mut f = vec![];
        net.info(&mut f).unwrap();
        assert!(String::from_utf8(f).unwrap().contains("Number of transitions\t\t2"));
    }

    #[test]
    fn invalid_arcs() {
        let mut net = LabelledPetriNet::new("net");
        net.add_place("p").unwrap();
        net.add_transition("t", Some("A")).unwrap();

        assert!(is_invalid_net(net.add_arc_by_name("p", "t", 0, ArcType::Normal)));
        assert!(is_invalid_net(net.add_arc_by_name("p", "q", 1, ArcType::Normal)));
        assert!(is_invalid_net(net.add_arc_by_name("p", "p", 1, ArcType::Normal)));
        assert!(is_invalid_net(net.add_arc_by_name("t", "p", 1, ArcType::Reset)));
        assert!(is_invalid_net(net.add_place_transition_arc(0, 5, 1, ArcType::Normal)));
        assert!(is_invalid_net(net.add_transition_place_arc(0, 5, 1)));
        assert!(is_invalid_net(net.add_place("p").map(|_| ())));
        assert!(is_invalid_net(net.add_transition("t", None).map(|_| ())));
    }

    #[test]
    fn check_marking() {
        let mut net = LabelledPetriNet::new("net");
        net.add_place("p").unwrap();
        assert!(net.check_marking(&Marking::from_vec(vec![(0, 1)])).is_ok());
        let error = net
            .check_marking(&Marking::from_vec(vec![(1, 1)]))
            .unwrap_err();
        assert!(matches!(
            error.downcast_ref::<ModelError>(),
            Some(ModelError::InvalidMarking(_))
        ));
    }

    #[test]
    fn arc_type_names() {
        assert_eq!(ArcType::from_str("reset").unwrap(), ArcType::Reset);
        assert_eq!(ArcType::Inhibitor.to_string(), "inhibitor");
    }
}
