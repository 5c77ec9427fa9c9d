use anyhow::{Context, Result, anyhow};
use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};
use indicatif::{ProgressBar, ProgressStyle};
use itertools::Itertools;
use std::{collections::BTreeSet, path::PathBuf};

use crate::{
    ebi_commands::{ebi_command_conformance, ebi_command_info},
    ebi_framework::{
        ebi_input::{self, EbiInput, EbiInputType},
        ebi_output::{self, EbiExporter, EbiOutput, EbiOutputType},
    },
};

pub const EBI_COMMANDS: EbiCommand = EbiCommand::Group {
    name_short: "ebi-align",
    name_long: None,
    explanation_short: "Ebi-align: optimal alignments of event logs against Petri nets.",
    explanation_long: None,
    children: &[
        &ebi_command_conformance::EBI_CONFORMANCE,
        &ebi_command_info::EBI_INFO,
    ],
};

pub const ARG_SHORT_OUTPUT: char = 'o';
pub const ARG_ID_OUTPUT: &str = "output";
pub const ARG_ID_JSON: &str = "json";

pub enum EbiCommand {
    Group {
        name_short: &'static str,
        name_long: Option<&'static str>,
        explanation_short: &'static str,
        explanation_long: Option<&'static str>,
        children: &'static [&'static EbiCommand],
    },
    Command {
        name_short: &'static str,
        name_long: Option<&'static str>,
        explanation_short: &'static str,
        explanation_long: Option<&'static str>,
        cli_command: Option<fn(command: Command) -> Command>, //create the cli command. An output -o argument is always added

        input_types: &'static [&'static [EbiInputType]], //for each fixed-position input parameter, the types that are accepted
        input_names: &'static [&'static str],
        input_helps: &'static [&'static str],

        execute: fn(inputs: Vec<EbiInput>, cli_matches: Option<&ArgMatches>) -> Result<EbiOutput>, //the cli_matches are provided only when called from the cli
        output_type: &'static EbiOutputType,
    },
}

impl EbiCommand {
    pub fn build_cli(&self) -> Command {
        let mut command;
        match self {
            EbiCommand::Group {
                name_short,
                name_long,
                explanation_short,
                explanation_long,
                children,
            } => {
                let name = if let Some(x) = name_long { x } else { name_short };
                command = Command::new(name)
                    .about(explanation_short)
                    .subcommand_required(true)
                    .allow_external_subcommands(false);

                if name_long.is_some() {
                    command = command.alias(name_short);
                }

                if let Some(l) = explanation_long {
                    command = command.long_about(l);
                }

                for child in children.iter() {
                    command = command.subcommand(child.build_cli());
                }
            }
            EbiCommand::Command {
                name_short,
                name_long,
                explanation_short,
                explanation_long,
                cli_command,
                input_types,
                input_names,
                input_helps,
                ..
            } => {
                let name = if let Some(x) = name_long { x } else { name_short };
                command = Command::new(name).about(explanation_short);

                if name_long.is_some() {
                    command = command.alias(name_short);
                }

                if let Some(l) = explanation_long {
                    command = command.long_about(l);
                }

                for (i, (input_name, (input_type, input_help))) in input_names
                    .iter()
                    .zip(input_types.iter().zip(input_helps.iter()))
                    .enumerate()
                {
                    let arg = Arg::new(format!("{}x{}", input_name, i))
                        .action(ArgAction::Set)
                        .value_name(input_name)
                        .help(input_help)
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .long_help(format!(
                            "{} Expects {}; use - to read from standard input.",
                            input_help,
                            EbiInputType::possible_inputs_as_strings_with_articles(
                                input_type, " or "
                            )
                        ));

                    command = command.arg(arg);
                }

                if let Some(f) = cli_command {
                    command = (f)(command);
                }

                command = command
                    .arg(
                        Arg::new(ARG_ID_OUTPUT)
                            .short(ARG_SHORT_OUTPUT)
                            .long(ARG_ID_OUTPUT)
                            .action(ArgAction::Set)
                            .value_name("FILE")
                            .help("Saves the result to a file.")
                            .required(false)
                            .value_parser(value_parser!(PathBuf)),
                    )
                    .arg(
                        Arg::new(ARG_ID_JSON)
                            .long(ARG_ID_JSON)
                            .action(ArgAction::SetTrue)
                            .help("Writes the result as JSON.")
                            .required(false),
                    );
            }
        };
        command
    }

    pub fn short_name(&self) -> &str {
        match self {
            EbiCommand::Group { name_short, .. } => name_short,
            EbiCommand::Command { name_short, .. } => name_short,
        }
    }

    pub fn long_name(&self) -> &str {
        match self {
            EbiCommand::Group {
                name_short,
                name_long,
                ..
            }
            | EbiCommand::Command {
                name_short,
                name_long,
                ..
            } => match name_long {
                Some(x) => x,
                None => name_short,
            },
        }
    }

    pub fn explanation_long(&self) -> &str {
        match self {
            EbiCommand::Group {
                explanation_short,
                explanation_long,
                ..
            }
            | EbiCommand::Command {
                explanation_short,
                explanation_long,
                ..
            } => match explanation_long {
                Some(x) => x,
                None => explanation_short,
            },
        }
    }

    pub fn get_progress_bar(total_ticks: usize) -> ProgressBar {
        let pb = ProgressBar::new(total_ticks as u64);
        if let Ok(style) = ProgressStyle::with_template("[{wide_bar:.cyan/blue}] {pos:>7}/{len:7}") {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb.set_position(0);
        pb
    }

    pub fn execute(&self, cli_matches: &ArgMatches) -> Result<()> {
        match self {
            EbiCommand::Group { children, .. } => {
                for child in children.iter() {
                    if let Some(sub_matches) = cli_matches.subcommand_matches(child.long_name()) {
                        return child.execute(sub_matches);
                    }
                }
            }
            EbiCommand::Command {
                input_types,
                execute,
                output_type,
                input_names,
                ..
            } => {
                //read the inputs
                let mut inputs = vec![];
                for (i, (input_types, input_name)) in
                    input_types.iter().zip(input_names.iter()).enumerate()
                {
                    let cli_id = format!("{}x{}", input_name, i);

                    log::info!("Reading {}", input_name);
                    let text = ebi_input::get_reader(cli_matches, &cli_id)
                        .with_context(|| format!("Reading parameter {}.", input_name))?;
                    let input = ebi_input::read_as_any(input_types, &text)
                        .with_context(|| format!("Reading parameter {}.", input_name))?;
                    inputs.push(input);
                }

                log::info!("Starting {}", self.long_name());

                let result = (execute)(inputs, Some(cli_matches))?;

                if &&result.get_type() != output_type {
                    return Err(anyhow!(
                        "Output type {} does not match the declared output of {}.",
                        result.get_type(),
                        output_type
                    ));
                }

                let to_file = cli_matches.get_one::<PathBuf>(ARG_ID_OUTPUT);
                let exporter =
                    Self::select_exporter(output_type, to_file, cli_matches.get_flag(ARG_ID_JSON));
                if let Some(to_file) = to_file {
                    //write result to file
                    log::info!(
                        "Writing result to {:?} as {} {}",
                        to_file,
                        exporter.get_article(),
                        exporter
                    );
                    ebi_output::export_object(to_file, result, exporter)?;
                } else {
                    //write result to STDOUT
                    log::info!("Writing result as {} {}", exporter.get_article(), exporter);
                    print!("{}", ebi_output::export_to_string(result, exporter)?);
                }

                return Ok(());
            }
        }
        Err(anyhow!("command not recognised"))
    }

    /// JSON if asked for or if the file has the json extension; otherwise the default exporter.
    pub fn select_exporter(
        output_type: &EbiOutputType,
        to_file: Option<&PathBuf>,
        json: bool,
    ) -> EbiExporter {
        let exporters = output_type.get_exporters();
        let json_by_extension = to_file.is_some_and(|file| {
            file.extension()
                .is_some_and(|extension| Some(extension.to_string_lossy().as_ref()) == EbiExporter::Json.get_file_extension())
        });
        if (json || json_by_extension) && exporters.contains(&EbiExporter::Json) {
            return EbiExporter::Json;
        }
        exporters
            .into_iter()
            .next()
            .unwrap_or(EbiExporter::String)
    }

    pub fn path_to_string(path: &[&EbiCommand]) -> String {
        path.iter().map(|command| command.long_name()).join(" ")
    }

    pub fn get_command_paths(&self) -> BTreeSet<Vec<&'static EbiCommand>> {
        let mut result = BTreeSet::new();
        Self::get_paths_recursive(&EBI_COMMANDS, &mut result, vec![]);
        result
    }

    fn get_paths_recursive(
        command: &'static EbiCommand,
        result: &mut BTreeSet<Vec<&'static EbiCommand>>,
        prefix: Vec<&'static EbiCommand>,
    ) {
        match command {
            EbiCommand::Group { children, .. } => {
                for child in children.iter() {
                    let mut prefix = prefix.clone();
                    prefix.push(command);
                    Self::get_paths_recursive(child, result, prefix);
                }
            }
            EbiCommand::Command { .. } => {
                let mut prefix = prefix;
                prefix.push(command);
                result.insert(prefix);
            }
        }
    }

    /// The commands that accept the given type as one of their inputs.
    pub fn get_applicable_commands(input_type: EbiInputType) -> BTreeSet<Vec<&'static EbiCommand>> {
        let mut result = EBI_COMMANDS.get_command_paths();
        result.retain(|path| match path.last() {
            Some(EbiCommand::Command { input_types, .. }) => input_types
                .iter()
                .any(|input_types| input_types.len() == 1 && input_types[0] == input_type),
            _ => false,
        });
        result
    }
}

impl Ord for EbiCommand {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.long_name().cmp(other.long_name())
    }
}

impl PartialOrd for EbiCommand {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for EbiCommand {
    fn eq(&self, other: &Self) -> bool {
        self.long_name() == other.long_name()
    }
}

impl Eq for EbiCommand {}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use crate::ebi_framework::{
        ebi_input::EbiInputType,
        ebi_output::{EbiExporter, EbiOutputType},
    };

    use super::{EBI_COMMANDS, EbiCommand};

    #[test]
    fn cli_is_consistent() {
        EBI_COMMANDS.build_cli().debug_assert();
    }

    #[test]
    fn command_paths() {
        let paths = EBI_COMMANDS
            .get_command_paths()
            .iter()
            .map(|path| EbiCommand::path_to_string(path))
            .collect::<Vec<_>>();
        assert!(paths.contains(&"ebi-align conformance alignments".to_string()));
        assert!(paths.contains(&"ebi-align information".to_string()));

        let applicable = EbiCommand::get_applicable_commands(EbiInputType::EventLog);
        assert!(
            applicable
                .iter()
                .all(|path| EbiCommand::path_to_string(path).contains("conformance"))
        );
    }

    #[test]
    fn exporter_selection() {
        let json_file = PathBuf::from("out.json");
        let text_file = PathBuf::from("out.ali");
        assert_eq!(
            EbiCommand::select_exporter(&EbiOutputType::Alignments, None, false),
            EbiExporter::AlignmentsText
        );
        assert_eq!(
            EbiCommand::select_exporter(&EbiOutputType::Alignments, None, true),
            EbiExporter::Json
        );
        assert_eq!(
            EbiCommand::select_exporter(&EbiOutputType::Alignments, Some(&json_file), false),
            EbiExporter::Json
        );
        assert_eq!(
            EbiCommand::select_exporter(&EbiOutputType::Alignments, Some(&text_file), false),
            EbiExporter::AlignmentsText
        );
        assert_eq!(
            EbiCommand::select_exporter(&EbiOutputType::String, None, true),
            EbiExporter::String
        );
    }
}
