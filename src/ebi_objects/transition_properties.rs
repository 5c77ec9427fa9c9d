use anyhow::Result;
use std::collections::BTreeMap;

use crate::{ebi_framework::model_error::ModelError, ebi_objects::guard_expression::Guard};

pub const PROPERTY_GUARD: &str = "guard";
pub const PROPERTY_READ_VARIABLES: &str = "readVariables";
pub const PROPERTY_WRITE_VARIABLES: &str = "writeVariables";
pub const PROPERTY_COST: &str = "cost";

/// The properties bag of a transition: its guard, the variables it reads and writes, and an
/// optional model-move cost that takes precedence over any cost function.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransitionProperties {
    pub guard: Option<Guard>,
    pub read_variables: Vec<String>,
    pub write_variables: Vec<String>,
    pub cost: Option<u64>,
}

impl TransitionProperties {
    pub fn from_map<'a>(properties: impl IntoIterator<Item = (&'a str, &'a str)>) -> Result<Self> {
        let mut result = Self::default();
        for (key, value) in properties {
            match key {
                PROPERTY_GUARD => result.guard = Some(Guard::parse(value)?),
                PROPERTY_READ_VARIABLES => result.read_variables = split_variables(value),
                PROPERTY_WRITE_VARIABLES => result.write_variables = split_variables(value),
                PROPERTY_COST => {
                    result.cost = Some(value.trim().parse::<u64>().map_err(|_| {
                        ModelError::InvalidNet(format!(
                            "transition cost `{}` is not a non-negative integer",
                            value
                        ))
                    })?)
                }
                _ => {
                    return Err(ModelError::InvalidNet(format!(
                        "unknown transition property `{}`",
                        key
                    ))
                    .into());
                }
            }
        }
        Ok(result)
    }

    /// Whether the transition takes part in the data perspective.
    pub fn is_data_aware(&self) -> bool {
        self.guard.is_some() || !self.write_variables.is_empty()
    }

    pub fn to_map(&self) -> BTreeMap<String, String> {
        let mut result = BTreeMap::new();
        if let Some(guard) = &self.guard {
            result.insert(PROPERTY_GUARD.to_string(), guard.source().to_string());
        }
        if !self.read_variables.is_empty() {
            result.insert(
                PROPERTY_READ_VARIABLES.to_string(),
                self.read_variables.join(","),
            );
        }
        if !self.write_variables.is_empty() {
            result.insert(
                PROPERTY_WRITE_VARIABLES.to_string(),
                self.write_variables.join(","),
            );
        }
        if let Some(cost) = self.cost {
            result.insert(PROPERTY_COST.to_string(), cost.to_string());
        }
        result
    }
}

fn split_variables(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}
