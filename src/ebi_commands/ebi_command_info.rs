use std::io::Write;

use crate::ebi_framework::{
    ebi_command::EbiCommand,
    ebi_input::EbiInputType,
    ebi_output::{EbiOutput, EbiOutputType},
    infoable::Infoable,
};

pub const EBI_INFO: EbiCommand = EbiCommand::Command {
    name_short: "info",
    name_long: Some("information"),
    explanation_short: "Show information about a file.",
    explanation_long: None,
    cli_command: None,
    input_types: &[&[EbiInputType::AcceptingPetriNet, EbiInputType::EventLog]],
    input_names: &["FILE"],
    input_helps: &["An accepting Petri net or an event log."],
    execute: |mut inputs, _| {
        let input = inputs.remove(0);
        let input_type = input.get_type();
        let mut f = vec![];

        writeln!(
            f,
            "Object was recognised as {} {}.",
            input_type.get_article(),
            input_type
        )?;

        //object-specific info
        input.info(&mut f)?;

        //show applicable commands
        let paths = EbiCommand::get_applicable_commands(input_type)
            .iter()
            .map(|path| EbiCommand::path_to_string(path))
            .collect::<Vec<_>>();
        writeln!(f, "An {} can be used in:", input_type)?;
        writeln!(f, "\t{}", paths.join("\n\t"))?;

        Ok(EbiOutput::String(String::from_utf8(f)?))
    },
    output_type: &EbiOutputType::String,
};
