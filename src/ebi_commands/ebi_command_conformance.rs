use anyhow::{Context, Result, anyhow};
use clap::{Arg, ArgAction, ArgMatches, Command, builder::PossibleValuesParser, value_parser};
use std::{fs, path::PathBuf, str::FromStr, time::Duration};
use strum::IntoEnumIterator;

use crate::{
    ebi_framework::{
        ebi_command::EbiCommand,
        ebi_input::EbiInputType,
        ebi_output::{EbiOutput, EbiOutputType},
    },
    ebi_objects::event_log::{DEFAULT_ACTIVITY_KEY, EventLog},
    techniques::align::{Align, AlignmentOptions, DEFAULT_LOG_MOVE_COST, Variant},
};

pub const ARG_ID_VARIANT: &str = "variant";
pub const ARG_ID_LOG_MOVE_COST: &str = "log-move-cost";
pub const ARG_ID_SYNC_COST: &str = "sync-cost";
pub const ARG_ID_INVISIBLE_COST: &str = "invisible-cost";
pub const ARG_ID_TIMEOUT_TRACE: &str = "timeout-trace";
pub const ARG_ID_TIMEOUT_TOTAL: &str = "timeout-total";
pub const ARG_ID_TRANSITION_IDS: &str = "transition-ids";
pub const ARG_ID_ACTIVITY_KEY: &str = "activity-key";
pub const ARG_ID_PARALLELISM: &str = "parallelism";
pub const ARG_ID_LOW_MEMORY: &str = "low-memory";
pub const ARG_ID_NO_RESTRICT: &str = "no-restrict-log-after-model";
pub const ARG_ID_REFERENCE: &str = "reference";
pub const ARG_ID_PROGRESS: &str = "progress";
pub const ARG_ID_INCLUDE_TIMEOUTS: &str = "include-timeouts";

pub const EBI_CONFORMANCE: EbiCommand = EbiCommand::Group {
    name_short: "conf",
    name_long: Some("conformance"),
    explanation_short: "Check the conformance of an event log against an accepting Petri net.",
    explanation_long: None,
    children: &[
        &EBI_CONFORMANCE_ALIGNMENTS,
        &EBI_CONFORMANCE_TRACE_FITNESS,
    ],
};

pub const EBI_CONFORMANCE_ALIGNMENTS: EbiCommand = EbiCommand::Command {
    name_short: "ali",
    name_long: Some("alignments"),
    explanation_short: "Compute an optimal alignment for each trace.",
    explanation_long: Some(
        "Compute an optimal alignment for each trace of the event log.\nThe search is performed on the synchronous product of the net and the trace. By default, all traces are aligned concurrently on all CPU cores; use --parallelism to reduce the number of threads. Traces that exceed their time budget are reported with status timeout.",
    ),
    cli_command: Some(|command| cli_alignment_options(command)),
    input_types: &[
        &[EbiInputType::AcceptingPetriNet],
        &[EbiInputType::EventLog],
    ],
    input_names: &["NET", "LOG"],
    input_helps: &["The accepting Petri net.", "The event log."],
    execute: |mut inputs, cli_matches| {
        let net = inputs.remove(0).to_net()?;
        let log = inputs.remove(0).to_log()?;
        let options = alignment_options_from_cli(cli_matches)?;

        let result = net.align_log(&log, &options)?;

        Ok(EbiOutput::Alignments(result))
    },
    output_type: &EbiOutputType::Alignments,
};

pub const EBI_CONFORMANCE_TRACE_FITNESS: EbiCommand = EbiCommand::Command {
    name_short: "tfit",
    name_long: Some("trace-fitness"),
    explanation_short: "Compute the average trace-fitness of an event log.",
    explanation_long: Some(
        "Compute the average trace-fitness of an event log: for each optimal alignment, the number of synchronous moves divided by the number of moves except silent moves. Traces that timed out are left out unless --include-timeouts is given, in which case they count as not fitting at all.",
    ),
    cli_command: Some(|command| {
        cli_alignment_options(command).arg(
            Arg::new(ARG_ID_INCLUDE_TIMEOUTS)
                .long(ARG_ID_INCLUDE_TIMEOUTS)
                .action(ArgAction::SetTrue)
                .help("Count traces that timed out in the average, with a fitness of 0."),
        )
    }),
    input_types: &[
        &[EbiInputType::AcceptingPetriNet],
        &[EbiInputType::EventLog],
    ],
    input_names: &["NET", "LOG"],
    input_helps: &["The accepting Petri net.", "The event log."],
    execute: |mut inputs, cli_matches| {
        let net = inputs.remove(0).to_net()?;
        let log = inputs.remove(0).to_log()?;
        let options = alignment_options_from_cli(cli_matches)?;
        let include_timeouts =
            cli_matches.is_some_and(|matches| matches.get_flag(ARG_ID_INCLUDE_TIMEOUTS));

        let alignments = net.align_log(&log, &options)?;
        let statistics = alignments.get_statistics(include_timeouts);
        log::info!("{}", statistics);

        let fitness = statistics
            .mean_trace_fitness
            .ok_or_else(|| anyhow!("no trace could be aligned within its time budget"))?;
        Ok(EbiOutput::Float(fitness))
    },
    output_type: &EbiOutputType::Float,
};

pub fn cli_alignment_options(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_ID_VARIANT)
                .long(ARG_ID_VARIANT)
                .action(ArgAction::Set)
                .value_name("VARIANT")
                .help("The search to perform.")
                .default_value("dijkstra")
                .value_parser(PossibleValuesParser::new(
                    Variant::iter().map(|variant| variant.to_string()),
                )),
        )
        .arg(
            Arg::new(ARG_ID_LOG_MOVE_COST)
                .long(ARG_ID_LOG_MOVE_COST)
                .action(ArgAction::Set)
                .value_name("COST")
                .help("The cost of a log move and of a visible model move.")
                .default_value(DEFAULT_LOG_MOVE_COST.to_string())
                .value_parser(value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_ID_SYNC_COST)
                .long(ARG_ID_SYNC_COST)
                .action(ArgAction::Set)
                .value_name("COST")
                .help("The cost of a synchronous move.")
                .default_value("0")
                .value_parser(value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_ID_INVISIBLE_COST)
                .long(ARG_ID_INVISIBLE_COST)
                .action(ArgAction::Set)
                .value_name("COST")
                .help("The cost of a model move on a silent transition; must be positive.")
                .default_value("1")
                .value_parser(value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_ID_TIMEOUT_TRACE)
                .long(ARG_ID_TIMEOUT_TRACE)
                .action(ArgAction::Set)
                .value_name("SECONDS")
                .help("The time budget of a single trace.")
                .value_parser(value_parser!(f64)),
        )
        .arg(
            Arg::new(ARG_ID_TIMEOUT_TOTAL)
                .long(ARG_ID_TIMEOUT_TOTAL)
                .action(ArgAction::Set)
                .value_name("SECONDS")
                .help("The time budget of the whole log.")
                .value_parser(value_parser!(f64)),
        )
        .arg(
            Arg::new(ARG_ID_TRANSITION_IDS)
                .long(ARG_ID_TRANSITION_IDS)
                .action(ArgAction::SetTrue)
                .help("Include the names of the transitions in model and synchronous moves."),
        )
        .arg(
            Arg::new(ARG_ID_ACTIVITY_KEY)
                .long(ARG_ID_ACTIVITY_KEY)
                .action(ArgAction::Set)
                .value_name("KEY")
                .help("The event attribute that holds the activity.")
                .default_value(DEFAULT_ACTIVITY_KEY),
        )
        .arg(
            Arg::new(ARG_ID_PARALLELISM)
                .long(ARG_ID_PARALLELISM)
                .action(ArgAction::Set)
                .value_name("THREADS")
                .help("The number of traces aligned concurrently; all cores by default.")
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new(ARG_ID_LOW_MEMORY)
                .long(ARG_ID_LOW_MEMORY)
                .action(ArgAction::SetTrue)
                .help("Keep at most one queued entry per search state."),
        )
        .arg(
            Arg::new(ARG_ID_NO_RESTRICT)
                .long(ARG_ID_NO_RESTRICT)
                .action(ArgAction::SetTrue)
                .help("Allow log moves directly after model moves."),
        )
        .arg(
            Arg::new(ARG_ID_REFERENCE)
                .long(ARG_ID_REFERENCE)
                .action(ArgAction::Set)
                .value_name("FILE")
                .help("An event log of reference traces for the edit_distance variant; a playout of the net by default.")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new(ARG_ID_PROGRESS)
                .long(ARG_ID_PROGRESS)
                .action(ArgAction::SetTrue)
                .help("Show a progress bar."),
        )
}

pub fn alignment_options_from_cli(cli_matches: Option<&ArgMatches>) -> Result<AlignmentOptions> {
    let mut options = AlignmentOptions::default();
    let Some(matches) = cli_matches else {
        return Ok(options);
    };

    if let Some(variant) = matches.get_one::<String>(ARG_ID_VARIANT) {
        options.variant = Variant::from_str(variant)
            .with_context(|| format!("unknown variant `{}`", variant))?;
    }
    if let Some(cost) = matches.get_one::<u64>(ARG_ID_LOG_MOVE_COST) {
        options.log_move_cost = *cost;
    }
    if let Some(cost) = matches.get_one::<u64>(ARG_ID_SYNC_COST) {
        options.sync_cost = *cost;
    }
    if let Some(cost) = matches.get_one::<u64>(ARG_ID_INVISIBLE_COST) {
        options.invisible_cost = *cost;
    }
    options.max_align_time_trace = seconds(matches, ARG_ID_TIMEOUT_TRACE)?;
    options.max_align_time_total = seconds(matches, ARG_ID_TIMEOUT_TOTAL)?;
    options.return_transition_identifiers = matches.get_flag(ARG_ID_TRANSITION_IDS);
    if let Some(key) = matches.get_one::<String>(ARG_ID_ACTIVITY_KEY) {
        options.activity_key = key.clone();
    }
    options.parallelism = matches.get_one::<usize>(ARG_ID_PARALLELISM).copied();
    options.low_memory = matches.get_flag(ARG_ID_LOW_MEMORY);
    options.restrict_log_after_model = !matches.get_flag(ARG_ID_NO_RESTRICT);
    options.show_progress = matches.get_flag(ARG_ID_PROGRESS);

    if let Some(file) = matches.get_one::<PathBuf>(ARG_ID_REFERENCE) {
        let text =
            fs::read_to_string(file).with_context(|| format!("reading reference log {:?}", file))?;
        let reference = EventLog::from_str(&text)
            .with_context(|| format!("parsing reference log {:?}", file))?;
        options.reference_log = Some(
            reference
                .traces
                .iter()
                .map(|trace| trace.get_activities(&options.activity_key))
                .collect::<Result<Vec<_>>>()?,
        );
    }

    Ok(options)
}

fn seconds(matches: &ArgMatches, cli_id: &str) -> Result<Option<Duration>> {
    matches
        .get_one::<f64>(cli_id)
        .map(|seconds| {
            Duration::try_from_secs_f64(*seconds)
                .with_context(|| format!("invalid time budget for --{}", cli_id))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use std::{fs, time::Duration};

    use crate::{
        ebi_framework::ebi_command::EBI_COMMANDS,
        ebi_objects::alignments::AlignmentStatus,
        techniques::align::Variant,
    };

    use super::alignment_options_from_cli;

    fn options_of(args: &[&str]) -> anyhow::Result<crate::techniques::align::AlignmentOptions> {
        let matches = EBI_COMMANDS.build_cli().try_get_matches_from(args)?;
        let (_, conformance) = matches.subcommand().unwrap();
        let (_, alignments) = conformance.subcommand().unwrap();
        alignment_options_from_cli(Some(alignments))
    }

    #[test]
    fn default_options() {
        let options = options_of(&["ebi-align", "conformance", "alignments", "net", "log"]).unwrap();
        assert_eq!(options.variant, Variant::Dijkstra);
        assert_eq!(options.log_move_cost, 10000);
        assert_eq!(options.invisible_cost, 1);
        assert_eq!(options.sync_cost, 0);
        assert_eq!(options.max_align_time_trace, None);
        assert!(options.restrict_log_after_model);
        assert!(!options.return_transition_identifiers);
        assert_eq!(options.parallelism, None);
    }

    #[test]
    fn given_options() {
        let options = options_of(&[
            "ebi-align",
            "conf",
            "ali",
            "net",
            "log",
            "--variant",
            "a_star",
            "--log-move-cost",
            "5",
            "--timeout-trace",
            "1.5",
            "--transition-ids",
            "--parallelism",
            "2",
            "--no-restrict-log-after-model",
            "--activity-key",
            "activity",
        ])
        .unwrap();
        assert_eq!(options.variant, Variant::AStar);
        assert_eq!(options.log_move_cost, 5);
        assert_eq!(options.max_align_time_trace, Some(Duration::from_millis(1500)));
        assert!(options.return_transition_identifiers);
        assert_eq!(options.parallelism, Some(2));
        assert!(!options.restrict_log_after_model);
        assert_eq!(options.activity_key, "activity");
    }

    #[test]
    fn invalid_options() {
        assert!(
            options_of(&["ebi-align", "conformance", "alignments", "net", "log", "--variant", "bfs"]).is_err()
        );
        assert!(
            options_of(&["ebi-align", "conformance", "alignments", "net", "log", "--timeout-trace", "-1"]).is_err()
        );
    }

    #[test]
    fn align_files() {
        let output = std::env::temp_dir().join(format!("ebi_align_{}.json", std::process::id()));
        let matches = EBI_COMMANDS
            .build_cli()
            .try_get_matches_from([
                "ebi-align",
                "conformance",
                "alignments",
                "testfiles/loop.json",
                "testfiles/loop_log.json",
                "--transition-ids",
                "-o",
                output.to_str().unwrap(),
            ])
            .unwrap();
        EBI_COMMANDS.execute(&matches).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
        fs::remove_file(&output).unwrap();

        let results = json.as_array().unwrap();
        assert_eq!(results.len(), 3);
        for result in results {
            assert_eq!(result["status"], AlignmentStatus::Optimal.to_string());
        }
        assert_eq!(results[0]["cost"], 0);
        assert_eq!(results[1]["cost"], 0);
        assert_eq!(results[2]["cost"], 10000);
    }
}
