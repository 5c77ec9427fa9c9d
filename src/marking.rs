use anyhow::Result;
use std::{
    collections::BTreeMap,
    fmt::{Debug, Display, Formatter},
};

use crate::{
    ebi_framework::model_error::ModelError,
    ebi_objects::{
        event_log::AttributeValue,
        labelled_petri_net::{LabelledPetriNet, PlaceIndex},
    },
};

/// A multiset of places. Stored sparse and sorted by place, without zero entries, so that
/// two equal markings are structurally equal and hash alike.
#[derive(Clone, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Marking {
    pub(crate) place2token: Vec<(PlaceIndex, u64)>,
}

impl Marking {
    pub fn new() -> Self {
        Self::default()
    }

    /// Duplicate places are summed; zero entries are dropped.
    pub fn from_vec(mut place2token: Vec<(PlaceIndex, u64)>) -> Self {
        place2token.sort_by_key(|(place, _)| *place);
        let mut result = Self::new();
        for (place, tokens) in place2token {
            result.add(place, tokens);
        }
        result
    }

    pub fn from_names<'a>(
        net: &LabelledPetriNet,
        place2token: impl IntoIterator<Item = (&'a str, u64)>,
    ) -> Result<Self> {
        let mut result = Self::new();
        for (name, tokens) in place2token {
            let place = net.get_place_index(name).ok_or_else(|| {
                ModelError::InvalidMarking(format!("place `{}` does not exist in the net", name))
            })?;
            result.add(place, tokens);
        }
        Ok(result)
    }

    pub fn get(&self, place: PlaceIndex) -> u64 {
        match self.find(place) {
            Ok(index) => self.place2token[index].1,
            Err(_) => 0,
        }
    }

    pub fn set(&mut self, place: PlaceIndex, tokens: u64) {
        match (self.find(place), tokens) {
            (Ok(index), 0) => {
                self.place2token.remove(index);
            }
            (Ok(index), _) => self.place2token[index].1 = tokens,
            (Err(_), 0) => {}
            (Err(index), _) => self.place2token.insert(index, (place, tokens)),
        }
    }

    /// Saturates at u64::MAX.
    pub fn add(&mut self, place: PlaceIndex, amount: u64) {
        let tokens = self.get(place).saturating_add(amount);
        self.set(place, tokens);
    }

    /// Saturates at zero.
    pub fn remove(&mut self, place: PlaceIndex, amount: u64) {
        let tokens = self.get(place).saturating_sub(amount);
        self.set(place, tokens);
    }

    pub fn clear_place(&mut self, place: PlaceIndex) {
        self.set(place, 0);
    }

    pub fn is_empty(&self) -> bool {
        self.place2token.is_empty()
    }

    /// Places with at least one token, in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = (PlaceIndex, u64)> + '_ {
        self.place2token.iter().copied()
    }

    pub fn get_maximum_place(&self) -> Option<PlaceIndex> {
        self.place2token.last().map(|(place, _)| *place)
    }

    pub fn display_with_names<'a>(&'a self, net: &'a LabelledPetriNet) -> impl Display + 'a {
        NamedMarking { marking: self, net }
    }

    fn find(&self, place: PlaceIndex) -> std::result::Result<usize, usize> {
        self.place2token.binary_search_by_key(&place, |(p, _)| *p)
    }
}

impl Display for Marking {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (i, (place, tokens)) in self.place2token.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}:{}", place, tokens)?;
        }
        write!(f, "}}")
    }
}

impl Debug for Marking {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}

struct NamedMarking<'a> {
    marking: &'a Marking,
    net: &'a LabelledPetriNet,
}

impl Display for NamedMarking<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (i, (place, tokens)) in self.marking.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match self.net.get_place_name(place) {
                Some(name) => write!(f, "{}:{}", name, tokens)?,
                None => write!(f, "{}:{}", place, tokens)?,
            }
        }
        write!(f, "}}")
    }
}

/// A marking together with the values of the net's variables.
#[derive(Clone, PartialEq, Eq, Hash, Default, Debug)]
pub struct DataMarking {
    pub marking: Marking,
    pub variables: BTreeMap<String, AttributeValue>,
}

impl DataMarking {
    pub fn new(marking: Marking) -> Self {
        Self {
            marking,
            variables: BTreeMap::new(),
        }
    }
}

impl From<Marking> for DataMarking {
    fn from(value: Marking) -> Self {
        Self::new(value)
    }
}

impl Display for DataMarking {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.marking)?;
        if !self.variables.is_empty() {
            write!(f, " [")?;
            for (i, (name, value)) in self.variables.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}={}", name, value)?;
            }
            write!(f, "]")?;
        }
        Ok(())
    }
}
