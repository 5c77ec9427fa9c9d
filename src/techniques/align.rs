use anyhow::{Context, Result, anyhow};
use logging_timer::time;
use rayon::prelude::*;
use std::{
    fmt::Debug,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};
use strum_macros::{Display, EnumIter, EnumString};

use crate::{
    ebi_alignments::{
        cross_product_net::CrossProductNet,
        linear_programming_solver::MarkingEquationHeuristic,
        search_engine::{
            AlignmentHeuristics, SearchEngine, SearchOutcome, SearchSettings, SearchStatistics,
        },
        trace_net::TraceNet,
    },
    ebi_framework::ebi_command::EbiCommand,
    ebi_objects::{
        accepting_petri_net::AcceptingPetriNet,
        alignments::{AlignmentResult, AlignmentStatus, Alignments, Move},
        event_log::{DEFAULT_ACTIVITY_KEY, EventLog, Trace},
        labelled_petri_net::{LabelledPetriNet, TransitionIndex},
    },
    marking::Marking,
    math::levenshtein::{EditAlignment, EditCosts, EditOperation, align_sequences},
    techniques::playout::Playout,
};

pub const DEFAULT_LOG_MOVE_COST: u64 = 10000;

/// Cost of a log move on the event at the given trace position.
pub type TraceCostFunction = Arc<dyn Fn(usize) -> i64 + Send + Sync>;

/// Cost of a model move on the given transition.
pub type ModelCostFunction = Arc<dyn Fn(&LabelledPetriNet, TransitionIndex) -> i64 + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum Variant {
    #[default]
    Dijkstra,
    AStar,
    EditDistance,
}

#[derive(Clone)]
pub struct AlignmentOptions {
    /// Defaults to `log_move_cost` for every event.
    pub trace_cost_function: Option<TraceCostFunction>,
    /// Defaults to `invisible_cost` for silent transitions and `log_move_cost` for the others.
    /// A `cost` transition property takes precedence.
    pub model_cost_function: Option<ModelCostFunction>,
    pub sync_cost: u64,
    /// Must be positive.
    pub invisible_cost: u64,
    pub log_move_cost: u64,
    pub max_align_time_trace: Option<Duration>,
    pub max_align_time_total: Option<Duration>,
    pub return_transition_identifiers: bool,
    pub activity_key: String,
    pub variant: Variant,
    /// Number of worker threads; all cores if not given.
    pub parallelism: Option<usize>,
    /// Used by the A* variant instead of the marking equation.
    pub heuristic: Option<Arc<dyn AlignmentHeuristics>>,
    pub low_memory: bool,
    pub restrict_log_after_model: bool,
    /// Reference traces of the edit-distance variant; a playout of the model if not given.
    pub reference_log: Option<Vec<Vec<String>>>,
    pub max_playout_traces: usize,
    pub max_playout_length: usize,
    pub show_progress: bool,
}

impl Default for AlignmentOptions {
    fn default() -> Self {
        Self {
            trace_cost_function: None,
            model_cost_function: None,
            sync_cost: 0,
            invisible_cost: 1,
            log_move_cost: DEFAULT_LOG_MOVE_COST,
            max_align_time_trace: None,
            max_align_time_total: None,
            return_transition_identifiers: false,
            activity_key: DEFAULT_ACTIVITY_KEY.to_string(),
            variant: Variant::default(),
            parallelism: None,
            heuristic: None,
            low_memory: false,
            restrict_log_after_model: true,
            reference_log: None,
            max_playout_traces: 1000,
            max_playout_length: 100,
            show_progress: false,
        }
    }
}

impl Debug for AlignmentOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlignmentOptions")
            .field(
                "trace_cost_function",
                &self.trace_cost_function.as_ref().map(|_| "Fn(usize)"),
            )
            .field(
                "model_cost_function",
                &self.model_cost_function.as_ref().map(|_| "Fn(net, transition)"),
            )
            .field("sync_cost", &self.sync_cost)
            .field("invisible_cost", &self.invisible_cost)
            .field("log_move_cost", &self.log_move_cost)
            .field("max_align_time_trace", &self.max_align_time_trace)
            .field("max_align_time_total", &self.max_align_time_total)
            .field(
                "return_transition_identifiers",
                &self.return_transition_identifiers,
            )
            .field("activity_key", &self.activity_key)
            .field("variant", &self.variant)
            .field("parallelism", &self.parallelism)
            .field("heuristic", &self.heuristic)
            .field("low_memory", &self.low_memory)
            .field("restrict_log_after_model", &self.restrict_log_after_model)
            .field(
                "reference_log",
                &self.reference_log.as_ref().map(|traces| traces.len()),
            )
            .field("max_playout_traces", &self.max_playout_traces)
            .field("max_playout_length", &self.max_playout_length)
            .field("show_progress", &self.show_progress)
            .finish()
    }
}

pub trait Align {
    fn align_trace(&self, trace: &Trace, options: &AlignmentOptions) -> Result<AlignmentResult>;

    /// Aligns the traces in parallel; the results are in the order of the traces.
    fn align_log(&self, log: &EventLog, options: &AlignmentOptions) -> Result<Alignments>;

    /// All optimal alignments of the trace, cheapest first.
    fn align_trace_all_optimal(
        &self,
        trace: &Trace,
        options: &AlignmentOptions,
    ) -> Result<AlignmentIterator>;
}

impl Align for AcceptingPetriNet {
    fn align_trace(&self, trace: &Trace, options: &AlignmentOptions) -> Result<AlignmentResult> {
        let deadline = deadline_after(options.max_align_time_trace);
        let aligner = Aligner::new(self.clone(), options, deadline)?;
        aligner.align(trace, deadline)
    }

    fn align_log(&self, log: &EventLog, options: &AlignmentOptions) -> Result<Alignments> {
        align_log_with(self.clone(), log, options)
    }

    fn align_trace_all_optimal(
        &self,
        trace: &Trace,
        options: &AlignmentOptions,
    ) -> Result<AlignmentIterator> {
        if options.variant == Variant::EditDistance {
            return Err(anyhow!(
                "the {} variant does not enumerate alignments",
                options.variant
            ));
        }
        let aligner = Aligner::new(self.clone(), options, None)?;
        let trace = TraceNet::new(trace, &aligner.product, options)?;
        let settings = SearchSettings {
            deadline: deadline_after(options.max_align_time_trace),
            low_memory: false,
            restrict_log_after_model: options.restrict_log_after_model,
            enumerate_all: true,
        };
        Ok(AlignmentIterator {
            engine: SearchEngine::new(aligner.product, trace, aligner.heuristic, settings),
            with_transition_names: options.return_transition_identifiers,
            timed_out: false,
        })
    }
}

pub fn align_trace(
    trace: &Trace,
    net: &LabelledPetriNet,
    initial_marking: &Marking,
    final_marking: &Marking,
    options: &AlignmentOptions,
) -> Result<AlignmentResult> {
    let net = AcceptingPetriNet::new(net.clone(), initial_marking.clone(), final_marking.clone())?;
    let deadline = deadline_after(options.max_align_time_trace);
    Aligner::new(net, options, deadline)?.align(trace, deadline)
}

pub fn align_log(
    log: &EventLog,
    net: &LabelledPetriNet,
    initial_marking: &Marking,
    final_marking: &Marking,
    options: &AlignmentOptions,
) -> Result<Alignments> {
    let net = AcceptingPetriNet::new(net.clone(), initial_marking.clone(), final_marking.clone())?;
    align_log_with(net, log, options)
}

#[time("info")]
fn align_log_with(
    net: AcceptingPetriNet,
    log: &EventLog,
    options: &AlignmentOptions,
) -> Result<Alignments> {
    let log_deadline = deadline_after(options.max_align_time_total);
    let playout_deadline = earliest(log_deadline, deadline_after(options.max_align_time_trace));
    let aligner = Aligner::new(net, options, playout_deadline)?;
    log::info!(
        "align {} traces with variant {}",
        log.get_number_of_traces(),
        options.variant
    );

    let cancelled = AtomicBool::new(false);
    let progress_bar = options
        .show_progress
        .then(|| EbiCommand::get_progress_bar(log.get_number_of_traces()));

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.parallelism.unwrap_or(0))
        .build()
        .context("creating the thread pool")?;

    let results = pool.install(|| {
        log.traces
            .par_iter()
            .enumerate()
            .map(|(index, trace)| {
                let expired = log_deadline.is_some_and(|deadline| Instant::now() >= deadline);
                let result = if expired || cancelled.load(Ordering::Relaxed) {
                    if !cancelled.swap(true, Ordering::Relaxed) {
                        log::warn!("log time budget exhausted; remaining traces time out");
                    }
                    Ok(AlignmentResult::not_started(AlignmentStatus::Timeout))
                } else {
                    aligner
                        .align(trace, log_deadline)
                        .with_context(|| format!("aligning trace {}", index))
                };
                if let Some(progress_bar) = &progress_bar {
                    progress_bar.inc(1);
                }
                result
            })
            .collect::<Result<Vec<_>>>()
    })?;

    if let Some(progress_bar) = progress_bar {
        progress_bar.finish_and_clear();
    }

    let result = Alignments::new(results);
    let statistics = result.get_statistics(false);
    log::info!(
        "aligned {} traces: {} optimal, {} timed out, {} infeasible",
        statistics.number_of_alignments,
        statistics.optimal,
        statistics.timeout,
        statistics.infeasible
    );
    Ok(result)
}

fn deadline_after(budget: Option<Duration>) -> Option<Instant> {
    budget.and_then(|budget| Instant::now().checked_add(budget))
}

fn earliest(a: Option<Instant>, b: Option<Instant>) -> Option<Instant> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, None) => a,
        (None, b) => b,
    }
}

fn to_result(
    alignment: Vec<Move>,
    cost: u64,
    statistics: SearchStatistics,
    status: AlignmentStatus,
) -> AlignmentResult {
    AlignmentResult {
        alignment,
        cost,
        visited_states: statistics.visited_states,
        queued_states: statistics.queued_states,
        closed_set_size: statistics.closed_set_size,
        distinct_markings: statistics.distinct_markings,
        status,
    }
}

enum Method {
    Search,
    /// Against the given reference traces.
    EditDistance(Vec<Vec<String>>),
    /// The playout of the model did not finish within its time budget.
    PlayoutTimedOut,
}

/// What the alignments of all traces of a log share.
struct Aligner<'a> {
    product: Arc<CrossProductNet>,
    heuristic: Option<Arc<dyn AlignmentHeuristics>>,
    method: Method,
    options: &'a AlignmentOptions,
}

impl<'a> Aligner<'a> {
    /// The playout of the edit-distance variant stops at `playout_deadline`.
    fn new(
        net: AcceptingPetriNet,
        options: &'a AlignmentOptions,
        playout_deadline: Option<Instant>,
    ) -> Result<Self> {
        if options.parallelism == Some(0) {
            return Err(anyhow!("parallelism must be at least 1"));
        }

        let method = match (options.variant, &options.reference_log) {
            (Variant::EditDistance, Some(reference_log)) => {
                Method::EditDistance(reference_log.clone())
            }
            (Variant::EditDistance, None) => match net
                .playout(
                    options.max_playout_traces,
                    options.max_playout_length,
                    playout_deadline,
                )
                .context("playing out the model")?
            {
                Some(references) => Method::EditDistance(references),
                None => {
                    log::warn!("playout of the model timed out; all traces time out");
                    Method::PlayoutTimedOut
                }
            },
            (Variant::Dijkstra | Variant::AStar, _) => Method::Search,
        };

        let AcceptingPetriNet {
            net,
            initial_marking,
            final_marking,
        } = net;
        let product = Arc::new(
            CrossProductNet::new(net, initial_marking, final_marking, options)
                .context("preparing the model")?,
        );

        let heuristic: Option<Arc<dyn AlignmentHeuristics>> = match (options.variant, &options.heuristic) {
            (Variant::AStar, Some(heuristic)) => Some(Arc::clone(heuristic)),
            (Variant::AStar, None) => Some(Arc::new(MarkingEquationHeuristic::new(&product))),
            (Variant::Dijkstra | Variant::EditDistance, _) => None,
        };

        Ok(Self {
            product,
            heuristic,
            method,
            options,
        })
    }

    fn align(&self, trace: &Trace, log_deadline: Option<Instant>) -> Result<AlignmentResult> {
        let trace = TraceNet::new(trace, &self.product, self.options)?;
        let deadline = earliest(log_deadline, deadline_after(self.options.max_align_time_trace));
        Ok(match &self.method {
            Method::Search => self.align_search(trace, deadline),
            Method::EditDistance(references) => {
                self.align_edit_distance(trace, references, deadline)
            }
            Method::PlayoutTimedOut => AlignmentResult::not_started(AlignmentStatus::Timeout),
        })
    }

    fn align_search(&self, trace: TraceNet, deadline: Option<Instant>) -> AlignmentResult {
        let length = trace.len();
        let mut engine = SearchEngine::new(
            Arc::clone(&self.product),
            trace,
            self.heuristic.clone(),
            SearchSettings {
                deadline,
                low_memory: self.options.low_memory,
                restrict_log_after_model: self.options.restrict_log_after_model,
                enumerate_all: false,
            },
        );

        let outcome = engine.next_goal();
        let statistics = engine.get_statistics();
        let result = match outcome {
            SearchOutcome::Found(node) => to_result(
                engine.get_alignment(&node, self.options.return_transition_identifiers),
                node.cost,
                statistics,
                AlignmentStatus::Optimal,
            ),
            SearchOutcome::TimedOut => {
                log::warn!(
                    "trace of length {} timed out after visiting {} states",
                    length,
                    statistics.visited_states
                );
                to_result(
                    vec![],
                    engine.get_lower_bound(),
                    statistics,
                    AlignmentStatus::Timeout,
                )
            }
            SearchOutcome::Exhausted => {
                to_result(vec![], 0, statistics, AlignmentStatus::Infeasible)
            }
        };

        log::debug!(
            "trace of length {}: {} with cost {}, {} visited, {} queued",
            length,
            result.status,
            result.cost,
            result.visited_states,
            result.queued_states
        );
        result
    }

    /// The cheapest insert/delete alignment against any of the reference traces; the first
    /// reference wins ties.
    fn align_edit_distance(
        &self,
        trace: TraceNet,
        references: &[Vec<String>],
        deadline: Option<Instant>,
    ) -> AlignmentResult {
        let costs = EditCosts {
            delete_costs: &trace.log_move_costs,
            insert_cost: self.options.log_move_cost,
            match_cost: self.options.sync_cost,
        };

        let mut statistics = SearchStatistics::default();
        let mut best: Option<(usize, EditAlignment)> = None;
        for (index, reference) in references.iter().enumerate() {
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                log::warn!("edit-distance alignment timed out after {} references", index);
                return to_result(vec![], 0, statistics, AlignmentStatus::Timeout);
            }
            let alignment = align_sequences(&trace.labels, reference, &costs);
            statistics.visited_states += alignment.cells;
            if best
                .as_ref()
                .is_none_or(|(_, best)| alignment.cost < best.cost)
            {
                best = Some((index, alignment));
            }
        }

        let Some((index, best)) = best else {
            return to_result(vec![], 0, statistics, AlignmentStatus::Infeasible);
        };

        let reference = &references[index];
        let (mut i, mut j) = (0, 0);
        let mut alignment = Vec::with_capacity(best.operations.len());
        for operation in &best.operations {
            match operation {
                EditOperation::Match => {
                    alignment.push(Move::SynchronousMove {
                        label: trace.labels[i].clone(),
                        transition: None,
                    });
                    i += 1;
                    j += 1;
                }
                EditOperation::Delete => {
                    alignment.push(Move::LogMove {
                        label: trace.labels[i].clone(),
                    });
                    i += 1;
                }
                EditOperation::Insert => {
                    alignment.push(Move::ModelMove {
                        label: reference[j].clone(),
                        transition: None,
                    });
                    j += 1;
                }
            }
        }

        to_result(alignment, best.cost, statistics, AlignmentStatus::Optimal)
    }
}

/// Successive optimal alignments of one trace, as long as they cost no more than the first.
pub struct AlignmentIterator {
    engine: SearchEngine,
    with_transition_names: bool,
    timed_out: bool,
}

impl AlignmentIterator {
    /// Whether the iteration ended because the time budget ran out.
    pub fn is_timed_out(&self) -> bool {
        self.timed_out
    }
}

impl Iterator for AlignmentIterator {
    type Item = AlignmentResult;

    fn next(&mut self) -> Option<Self::Item> {
        if self.timed_out {
            return None;
        }
        match self.engine.next_goal() {
            SearchOutcome::Found(node) => Some(to_result(
                self.engine.get_alignment(&node, self.with_transition_names),
                node.cost,
                self.engine.get_statistics(),
                AlignmentStatus::Optimal,
            )),
            SearchOutcome::TimedOut => {
                self.timed_out = true;
                None
            }
            SearchOutcome::Exhausted => None,
        }
    }
}
