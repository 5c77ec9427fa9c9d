use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use strum_macros::{Display as StrumDisplay, EnumString};

use crate::{ebi_framework::infoable::Infoable, techniques::fitness::Fitness};

pub const HEADER: &str = "alignments";

/// Marks the side of a move that does not advance.
pub const SKIP: &str = ">>";

/// One step of an alignment. Transition names are only present when they were requested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(into = "MovePair")]
pub enum Move {
    LogMove {
        label: String,
    },
    ModelMove {
        label: String,
        transition: Option<String>,
    },
    SynchronousMove {
        label: String,
        transition: Option<String>,
    },
    SilentMove {
        transition: Option<String>,
    },
}

impl Move {
    /// The trace side; `None` is a skip.
    pub fn get_log_label(&self) -> Option<&str> {
        match self {
            Move::LogMove { label } | Move::SynchronousMove { label, .. } => Some(label),
            Move::ModelMove { .. } | Move::SilentMove { .. } => None,
        }
    }

    /// The model side; `None` is a skip, and a silent transition has the empty label.
    pub fn get_model_label(&self) -> Option<&str> {
        match self {
            Move::ModelMove { label, .. } | Move::SynchronousMove { label, .. } => Some(label),
            Move::SilentMove { .. } => Some(""),
            Move::LogMove { .. } => None,
        }
    }

    pub fn get_transition(&self) -> Option<&str> {
        match self {
            Move::LogMove { .. } => None,
            Move::ModelMove { transition, .. }
            | Move::SynchronousMove { transition, .. }
            | Move::SilentMove { transition } => transition.as_deref(),
        }
    }

    pub fn is_synchronous(&self) -> bool {
        matches!(self, Move::SynchronousMove { .. })
    }

    pub fn is_silent(&self) -> bool {
        matches!(self, Move::SilentMove { .. })
    }

    pub fn to_pair(&self) -> MovePair {
        MovePair {
            log: self.get_log_label().unwrap_or(SKIP).to_string(),
            model: self.get_model_label().unwrap_or(SKIP).to_string(),
            transition: self.get_transition().map(str::to_string),
        }
    }
}

impl Display for Move {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({}, {})",
            self.get_log_label().unwrap_or(SKIP),
            match self {
                Move::SilentMove { .. } => "τ",
                _ => self.get_model_label().unwrap_or(SKIP),
            }
        )
    }
}

/// An alignment step as a pair of labels, with [`SKIP`] on the side that does not move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovePair {
    pub log: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub transition: Option<String>,
}

impl From<Move> for MovePair {
    fn from(value: Move) -> Self {
        value.to_pair()
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, StrumDisplay, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AlignmentStatus {
    Optimal,
    /// The time budget ran out; the alignment is empty and the cost is a lower bound.
    Timeout,
    /// The final marking cannot be reached; the alignment is empty.
    Infeasible,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlignmentResult {
    pub alignment: Vec<Move>,
    pub cost: u64,
    pub visited_states: usize,
    pub queued_states: usize,
    pub closed_set_size: usize,
    pub distinct_markings: usize,
    pub status: AlignmentStatus,
}

impl AlignmentResult {
    /// A result for a trace whose search never started.
    pub fn not_started(status: AlignmentStatus) -> Self {
        Self {
            alignment: vec![],
            cost: 0,
            visited_states: 0,
            queued_states: 0,
            closed_set_size: 0,
            distinct_markings: 0,
            status,
        }
    }

    pub fn is_optimal(&self) -> bool {
        self.status == AlignmentStatus::Optimal
    }
}

/// The alignments of a log, in the order of its traces.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Alignments {
    results: Vec<AlignmentResult>,
}

impl Alignments {
    pub fn new(results: Vec<AlignmentResult>) -> Self {
        Self { results }
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn get_results(&self) -> &[AlignmentResult] {
        &self.results
    }

    pub fn iter(&self) -> impl Iterator<Item = &AlignmentResult> {
        self.results.iter()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Summary over the optimal results, and over timed-out ones if `include_timeouts` is set.
    /// Timed-out results contribute their lower bound to the mean cost and a fitness of 0.
    pub fn get_statistics(&self, include_timeouts: bool) -> AlignmentStatistics {
        let count = |status| self.iter().filter(|result| result.status == status).count();
        let included = self
            .iter()
            .filter(|result| {
                result.is_optimal()
                    || (include_timeouts && result.status == AlignmentStatus::Timeout)
            })
            .collect::<Vec<_>>();

        let (mean_cost, mean_trace_fitness) = if included.is_empty() {
            (None, None)
        } else {
            let n = included.len() as f64;
            (
                Some(included.iter().map(|result| result.cost as f64).sum::<f64>() / n),
                Some(
                    included
                        .iter()
                        .map(|result| match result.status {
                            AlignmentStatus::Timeout => 0.0,
                            _ => result.trace_fitness(),
                        })
                        .sum::<f64>()
                        / n,
                ),
            )
        };

        AlignmentStatistics {
            number_of_alignments: self.len(),
            optimal: count(AlignmentStatus::Optimal),
            timeout: count(AlignmentStatus::Timeout),
            infeasible: count(AlignmentStatus::Infeasible),
            mean_cost,
            mean_trace_fitness,
            visited_states: self.iter().map(|result| result.visited_states).sum(),
            queued_states: self.iter().map(|result| result.queued_states).sum(),
        }
    }
}

impl FromIterator<AlignmentResult> for Alignments {
    fn from_iter<T: IntoIterator<Item = AlignmentResult>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl IntoIterator for Alignments {
    type Item = AlignmentResult;
    type IntoIter = std::vec::IntoIter<AlignmentResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.into_iter()
    }
}

impl Display for Alignments {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{}", HEADER)?;
        writeln!(f, "# number of alignments\n{}", self.results.len())?;

        for (i, result) in self.results.iter().enumerate() {
            writeln!(f, "# alignment {}", i)?;
            writeln!(f, "# status\n{}", result.status)?;
            writeln!(f, "# cost\n{}", result.cost)?;
            writeln!(
                f,
                "# visited states {}, queued states {}, closed set {}, markings {}",
                result.visited_states,
                result.queued_states,
                result.closed_set_size,
                result.distinct_markings
            )?;
            writeln!(f, "# number of moves\n{}", result.alignment.len())?;

            for (j, movee) in result.alignment.iter().enumerate() {
                writeln!(f, "# move {}", j)?;

                match movee {
                    Move::LogMove { label } => {
                        writeln!(f, "log move")?;
                        writeln!(f, "label {}", label)?;
                    }
                    Move::ModelMove { label, .. } => {
                        writeln!(f, "model move")?;
                        writeln!(f, "label {}", label)?;
                    }
                    Move::SynchronousMove { label, .. } => {
                        writeln!(f, "synchronous move")?;
                        writeln!(f, "label {}", label)?;
                    }
                    Move::SilentMove { .. } => {
                        writeln!(f, "silent move")?;
                    }
                };
                if let Some(transition) = movee.get_transition() {
                    writeln!(f, "transition {}", transition)?;
                }
            }
        }

        write!(f, "")
    }
}

impl Infoable for Alignments {
    fn info(&self, f: &mut impl std::io::Write) -> Result<()> {
        writeln!(f, "Number of alignments\t\t{}", self.results.len())?;
        writeln!(f, "{}", self.get_statistics(false))?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlignmentStatistics {
    pub number_of_alignments: usize,
    pub optimal: usize,
    pub timeout: usize,
    pub infeasible: usize,
    pub mean_cost: Option<f64>,
    pub mean_trace_fitness: Option<f64>,
    pub visited_states: usize,
    pub queued_states: usize,
}

impl Display for AlignmentStatistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Number of alignments\t{}", self.number_of_alignments)?;
        writeln!(f, "Optimal\t\t\t{}", self.optimal)?;
        writeln!(f, "Timeout\t\t\t{}", self.timeout)?;
        writeln!(f, "Infeasible\t\t{}", self.infeasible)?;
        match self.mean_cost {
            Some(cost) => writeln!(f, "Mean cost\t\t{}", cost)?,
            None => writeln!(f, "Mean cost\t\tn/a")?,
        }
        match self.mean_trace_fitness {
            Some(fitness) => writeln!(f, "Mean trace fitness\t{}", fitness)?,
            None => writeln!(f, "Mean trace fitness\tn/a")?,
        }
        writeln!(f, "Visited states\t\t{}", self.visited_states)?;
        write!(f, "Queued states\t\t{}", self.queued_states)
    }
}

#[cfg(test)]
mod tests {
    use super::{AlignmentResult, AlignmentStatus, Alignments, Move, MovePair};

    fn result(alignment: Vec<Move>, cost: u64, status: AlignmentStatus) -> AlignmentResult {
        AlignmentResult {
            alignment,
            cost,
            visited_states: 3,
            queued_states: 5,
            closed_set_size: 3,
            distinct_markings: 2,
            status,
        }
    }

    fn sync(label: &str) -> Move {
        Move::SynchronousMove {
            label: label.to_string(),
            transition: None,
        }
    }

    #[test]
    fn pairs() {
        let moves = vec![
            sync("A"),
            Move::LogMove {
                label: "A".to_string(),
            },
            Move::ModelMove {
                label: "B".to_string(),
                transition: Some("t_b".to_string()),
            },
            Move::SilentMove { transition: None },
        ];
        let pairs = moves.iter().map(Move::to_pair).collect::<Vec<_>>();
        assert_eq!(
            pairs,
            vec![
                MovePair { log: "A".to_string(), model: "A".to_string(), transition: None },
                MovePair { log: "A".to_string(), model: ">>".to_string(), transition: None },
                MovePair {
                    log: ">>".to_string(),
                    model: "B".to_string(),
                    transition: Some("t_b".to_string())
                },
                MovePair { log: ">>".to_string(), model: "".to_string(), transition: None },
            ]
        );
        assert_eq!(moves[1].to_string(), "(A, >>)");
        assert_eq!(moves[3].to_string(), "(>>, τ)");
    }

    #[test]
    fn json_export() {
        let alignments = Alignments::new(vec![result(vec![sync("A")], 0, AlignmentStatus::Optimal)]);
        let json: serde_json::Value = serde_json::from_str(&alignments.to_json().unwrap()).unwrap();
        assert_eq!(json[0]["status"], "optimal");
        assert_eq!(json[0]["cost"], 0);
        assert_eq!(json[0]["alignment"][0]["log"], "A");
        assert_eq!(json[0]["alignment"][0]["model"], "A");
        assert!(json[0]["alignment"][0].get("transition").is_none());
    }

    #[test]
    fn text_export() {
        let alignments = Alignments::new(vec![result(
            vec![
                sync("A"),
                Move::LogMove {
                    label: "C".to_string(),
                },
            ],
            10000,
            AlignmentStatus::Optimal,
        )]);
        let text = alignments.to_string();
        assert!(text.starts_with("alignments\n# number of alignments\n1\n"));
        assert!(text.contains("# status\noptimal\n# cost\n10000\n"));
        assert!(text.contains("synchronous move\nlabel A\n"));
        assert!(text.contains("log move\nlabel C\n"));
    }

    #[test]
    fn timed_out_traces_do_not_fit() {
        let alignments = Alignments::new(vec![
            result(
                vec![Move::LogMove {
                    label: "A".to_string(),
                }],
                10000,
                AlignmentStatus::Optimal,
            ),
            AlignmentResult::not_started(AlignmentStatus::Timeout),
        ]);

        assert_eq!(alignments.get_statistics(false).mean_trace_fitness, Some(0.0));
        assert_eq!(alignments.get_statistics(true).mean_trace_fitness, Some(0.0));

        let only_timeouts = Alignments::new(vec![AlignmentResult::not_started(
            AlignmentStatus::Timeout,
        )]);
        assert_eq!(only_timeouts.get_statistics(false).mean_trace_fitness, None);
        assert_eq!(only_timeouts.get_statistics(true).mean_trace_fitness, Some(0.0));
    }

    #[test]
    fn statistics() {
        let alignments = Alignments::new(vec![
            result(vec![sync("A")], 0, AlignmentStatus::Optimal),
            result(
                vec![
                    sync("A"),
                    Move::LogMove {
                        label: "B".to_string(),
                    },
                ],
                10000,
                AlignmentStatus::Optimal,
            ),
            result(vec![], 30000, AlignmentStatus::Timeout),
            result(vec![], 0, AlignmentStatus::Infeasible),
        ]);

        let statistics = alignments.get_statistics(false);
        assert_eq!(statistics.number_of_alignments, 4);
        assert_eq!((statistics.optimal, statistics.timeout, statistics.infeasible), (2, 1, 1));
        assert_eq!(statistics.mean_cost, Some(5000.0));
        assert_eq!(statistics.mean_trace_fitness, Some(0.75));
        assert_eq!(statistics.visited_states, 12);

        let with_timeouts = alignments.get_statistics(true);
        assert_eq!(with_timeouts.mean_cost, Some(40000.0 / 3.0));
        assert_eq!(with_timeouts.mean_trace_fitness, Some(0.5));
        assert!(with_timeouts.to_string().contains("Timeout\t\t\t1"));
    }
}
