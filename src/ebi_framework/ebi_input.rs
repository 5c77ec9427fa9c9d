use anyhow::{Context, Result, anyhow};
use clap::ArgMatches;
use std::{
    fs::File,
    io::{self, Read},
    path::PathBuf,
    str::FromStr,
};
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter};

use crate::{
    ebi_framework::infoable::Infoable,
    ebi_objects::{accepting_petri_net::AcceptingPetriNet, event_log::EventLog},
};

pub enum EbiInput {
    AcceptingPetriNet(AcceptingPetriNet),
    EventLog(EventLog),
}

impl EbiInput {
    pub fn get_type(&self) -> EbiInputType {
        match self {
            EbiInput::AcceptingPetriNet(_) => EbiInputType::AcceptingPetriNet,
            EbiInput::EventLog(_) => EbiInputType::EventLog,
        }
    }

    pub fn to_net(self) -> Result<AcceptingPetriNet> {
        match self {
            EbiInput::AcceptingPetriNet(net) => Ok(net),
            other => Err(anyhow!("expected an accepting Petri net, got {}", other.get_type())),
        }
    }

    pub fn to_log(self) -> Result<EventLog> {
        match self {
            EbiInput::EventLog(log) => Ok(log),
            other => Err(anyhow!("expected an event log, got {}", other.get_type())),
        }
    }
}

impl Infoable for EbiInput {
    fn info(&self, f: &mut impl std::io::Write) -> Result<()> {
        match self {
            EbiInput::AcceptingPetriNet(net) => net.info(f),
            EbiInput::EventLog(log) => log.info(f),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter)]
pub enum EbiInputType {
    #[strum(serialize = "accepting Petri net")]
    AcceptingPetriNet,
    #[strum(serialize = "event log")]
    EventLog,
}

impl EbiInputType {
    pub fn get_article(&self) -> &str {
        "an"
    }

    pub fn parse(&self, text: &str) -> Result<EbiInput> {
        Ok(match self {
            EbiInputType::AcceptingPetriNet => {
                EbiInput::AcceptingPetriNet(AcceptingPetriNet::from_str(text)?)
            }
            EbiInputType::EventLog => EbiInput::EventLog(EventLog::from_str(text)?),
        })
    }

    pub fn possible_inputs_as_strings_with_articles(input_types: &[EbiInputType], last_connector: &str) -> String {
        let mut result = input_types
            .iter()
            .map(|input_type| format!("{} {}", input_type.get_article(), input_type))
            .collect::<Vec<_>>();
        match result.pop() {
            Some(last) if result.is_empty() => last,
            Some(last) => format!("{}{}{}", result.join(", "), last_connector, last),
            None => String::new(),
        }
    }
}

/// Reads the file given for `cli_id`, or standard input if the file is `-`.
pub fn get_reader(cli_matches: &ArgMatches, cli_id: &str) -> Result<String> {
    let path = cli_matches
        .get_one::<PathBuf>(cli_id)
        .ok_or_else(|| anyhow!("argument {} was not given", cli_id))?;
    let mut text = String::new();
    if path.as_os_str() == "-" {
        io::stdin()
            .read_to_string(&mut text)
            .context("reading standard input")?;
    } else {
        File::open(path)
            .with_context(|| format!("opening {:?}", path))?
            .read_to_string(&mut text)
            .with_context(|| format!("reading {:?}", path))?;
    }
    Ok(text)
}

/// Attempts to parse the text as any of the given input types. Returns the last error if unsuccessful.
pub fn read_as_any(input_types: &[EbiInputType], text: &str) -> Result<EbiInput> {
    let mut error = None;
    for input_type in input_types {
        match input_type
            .parse(text)
            .with_context(|| format!("parsing as {} {}", input_type.get_article(), input_type))
        {
            Ok(input) => return Ok(input),
            Err(e) => error = Some(e),
        }
    }
    match error {
        Some(e) => Err(e),
        None => Err(anyhow!("no input type to parse as")),
    }
}

pub fn read_as_any_object(text: &str) -> Result<EbiInput> {
    read_as_any(&EbiInputType::iter().collect::<Vec<_>>(), text)
}
