use anyhow::{Context, Error, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fmt::Display,
    hash::{Hash, Hasher},
    str::FromStr,
};

use crate::ebi_framework::infoable::Infoable;

pub const DEFAULT_ACTIVITY_KEY: &str = "concept:name";

///
/// Values of event attributes and of net variables.
///
/// Floats compare and hash by their bit pattern, so that variable maps can be part of an
/// interned marking.
///
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Boolean(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl AttributeValue {
    /// Ints and floats, as a float.
    pub fn try_as_number(&self) -> Option<f64> {
        match self {
            AttributeValue::Int(v) => Some(*v as f64),
            AttributeValue::Float(v) => Some(*v),
            _ => None,
        }
    }
}

impl PartialEq for AttributeValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (AttributeValue::Boolean(a), AttributeValue::Boolean(b)) => a == b,
            (AttributeValue::Int(a), AttributeValue::Int(b)) => a == b,
            (AttributeValue::Float(a), AttributeValue::Float(b)) => a.to_bits() == b.to_bits(),
            (AttributeValue::String(a), AttributeValue::String(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for AttributeValue {}

impl Hash for AttributeValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            AttributeValue::Boolean(v) => v.hash(state),
            AttributeValue::Int(v) => v.hash(state),
            AttributeValue::Float(v) => v.to_bits().hash(state),
            AttributeValue::String(v) => v.hash(state),
        }
    }
}

impl Display for AttributeValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttributeValue::Boolean(v) => write!(f, "{}", v),
            AttributeValue::Int(v) => write!(f, "{}", v),
            AttributeValue::Float(v) => write!(f, "{}", v),
            AttributeValue::String(v) => write!(f, "{}", v),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::String(value.to_string())
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Int(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Float(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Boolean(value)
    }
}

pub type Attributes = BTreeMap<String, AttributeValue>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Event {
    pub attributes: Attributes,
}

impl Event {
    pub fn new(activity: &str) -> Self {
        let mut attributes = Attributes::new();
        attributes.insert(DEFAULT_ACTIVITY_KEY.to_string(), activity.into());
        Self { attributes }
    }

    pub fn with_attribute(mut self, key: &str, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes.get(key)
    }

    /// The label under `activity_key`; non-string values are rendered.
    pub fn get_activity(&self, activity_key: &str) -> Option<String> {
        self.attributes.get(activity_key).map(|value| value.to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    #[serde(default)]
    pub attributes: Attributes,
    pub events: Vec<Event>,
}

impl Trace {
    pub fn from_activities<'a>(activities: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            attributes: Attributes::new(),
            events: activities.into_iter().map(Event::new).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn get_activities(&self, activity_key: &str) -> Result<Vec<String>> {
        self.events
            .iter()
            .enumerate()
            .map(|(i, event)| {
                event.get_activity(activity_key).ok_or_else(|| {
                    anyhow!("event {} has no attribute `{}`", i, activity_key)
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventLog {
    #[serde(default)]
    pub attributes: Attributes,
    pub traces: Vec<Trace>,
}

impl EventLog {
    pub fn new(traces: Vec<Trace>) -> Self {
        Self {
            attributes: Attributes::new(),
            traces,
        }
    }

    pub fn get_number_of_traces(&self) -> usize {
        self.traces.len()
    }

    pub fn get_number_of_events(&self) -> usize {
        self.traces.iter().map(Trace::len).sum()
    }
}

impl FromStr for EventLog {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_str(s).context("parsing event log")
    }
}

impl Infoable for EventLog {
    fn info(&self, f: &mut impl std::io::Write) -> Result<()> {
        writeln!(f, "Number of traces\t{}", self.get_number_of_traces())?;
        writeln!(f, "Number of events\t{}", self.get_number_of_events())?;
        Ok(())
    }
}
