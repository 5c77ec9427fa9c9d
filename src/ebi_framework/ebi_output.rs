use anyhow::{Context, Result, anyhow};
use std::{
    fmt::{self, Display},
    fs::File,
    io::Write,
    path::PathBuf,
};

use crate::ebi_objects::alignments::Alignments;

pub enum EbiOutput {
    Alignments(Alignments),
    Float(f64),
    String(String),
}

impl EbiOutput {
    pub fn get_type(&self) -> EbiOutputType {
        match self {
            EbiOutput::Alignments(_) => EbiOutputType::Alignments,
            EbiOutput::Float(_) => EbiOutputType::Float,
            EbiOutput::String(_) => EbiOutputType::String,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EbiOutputType {
    Alignments,
    Float,
    String,
}

impl EbiOutputType {
    /// All exporters that can handle this output type; the first one is the default.
    pub fn get_exporters(&self) -> Vec<EbiExporter> {
        match self {
            EbiOutputType::Alignments => vec![EbiExporter::AlignmentsText, EbiExporter::Json],
            EbiOutputType::Float => vec![EbiExporter::Float, EbiExporter::Json],
            EbiOutputType::String => vec![EbiExporter::String],
        }
    }
}

impl Display for EbiOutputType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EbiOutputType::Alignments => Display::fmt(&"alignments", f),
            EbiOutputType::Float => Display::fmt(&"number", f),
            EbiOutputType::String => Display::fmt(&"text", f),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EbiExporter {
    AlignmentsText,
    Json,
    Float,
    String,
}

impl EbiExporter {
    pub fn export_from_object(&self, output: EbiOutput, f: &mut dyn std::io::Write) -> Result<()> {
        match (self, output) {
            (EbiExporter::AlignmentsText, EbiOutput::Alignments(alignments)) => {
                Ok(write!(f, "{}", alignments)?)
            }
            (EbiExporter::Json, EbiOutput::Alignments(alignments)) => {
                Ok(writeln!(f, "{}", alignments.to_json()?)?)
            }
            (EbiExporter::Json, EbiOutput::Float(value)) => {
                Ok(writeln!(f, "{}", serde_json::to_string(&value)?)?)
            }
            (EbiExporter::Float, EbiOutput::Float(value)) => Ok(writeln!(f, "{}", value)?),
            (EbiExporter::String, EbiOutput::String(value)) => Ok(write!(f, "{}", value)?),
            (exporter, output) => Err(anyhow!(
                "cannot export {} as {}",
                output.get_type(),
                exporter
            )),
        }
    }

    pub fn get_article(&self) -> &str {
        match self {
            EbiExporter::AlignmentsText => "an",
            EbiExporter::Json => "a",
            EbiExporter::Float => "a",
            EbiExporter::String => "",
        }
    }

    pub fn get_file_extension(&self) -> Option<&str> {
        match self {
            EbiExporter::AlignmentsText => Some("ali"),
            EbiExporter::Json => Some("json"),
            EbiExporter::Float | EbiExporter::String => None,
        }
    }
}

impl Display for EbiExporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EbiExporter::AlignmentsText => Display::fmt(&"alignments file", f),
            EbiExporter::Json => Display::fmt(&"JSON file", f),
            EbiExporter::Float => Display::fmt(&"number", f),
            EbiExporter::String => Display::fmt(&"text", f),
        }
    }
}

pub fn export_object(to_file: &PathBuf, object: EbiOutput, exporter: EbiExporter) -> Result<()> {
    let file = File::create(to_file)
        .with_context(|| format!("Writing result to file {:?}.", to_file))?;
    let mut writer = std::io::BufWriter::new(&file);
    exporter
        .export_from_object(object, &mut writer)
        .with_context(|| format!("Writing result to file {:?}.", to_file))?;
    writer
        .flush()
        .with_context(|| format!("writing result to file {:?}", to_file))
}

pub fn export_to_string(object: EbiOutput, exporter: EbiExporter) -> Result<String> {
    let mut f = vec![];
    exporter.export_from_object(object, &mut f)?;
    Ok(String::from_utf8(f)?)
}

#[cfg(test)]
mod tests {
    use crate::ebi_objects::alignments::{AlignmentResult, AlignmentStatus, Alignments};

    use super::{EbiExporter, EbiOutput, export_to_string};

    #[test]
    fn export_alignments() {
        let alignments = Alignments::new(vec![AlignmentResult::not_started(
            AlignmentStatus::Infeasible,
        )]);

        let text = export_to_string(
            EbiOutput::Alignments(alignments.clone()),
            EbiExporter::AlignmentsText,
        )
        .unwrap();
        assert!(text.starts_with("alignments\n"));

        let json = export_to_string(EbiOutput::Alignments(alignments), EbiExporter::Json).unwrap();
        assert!(json.contains("\"infeasible\""));
    }

    #[test]
    fn mismatched_exporter() {
        assert!(export_to_string(EbiOutput::Float(0.5), EbiExporter::AlignmentsText).is_err());
        assert_eq!(
            export_to_string(EbiOutput::Float(0.5), EbiExporter::Float).unwrap(),
            "0.5\n"
        );
    }
}
