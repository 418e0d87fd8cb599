//! Wires the source, the merge stages and the sink into one chain, one thread
//! per stage.

use std::thread::{self, Scope, ScopedJoinHandle};
use std::time::Instant;

use tracing::{debug, error, info, info_span, warn};

use crate::error::{Result, SortError};
use crate::link::{self, Inlet, Outlet};
use crate::sink::Sink;
use crate::source::{self, Source};
use crate::stage::{MergeStage, StageReport};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Chain length including the source. `None` picks the minimum for the
    /// input.
    pub stages: Option<usize>,
    /// Per-tag capacity of every link. `None` means unbounded.
    pub link_capacity: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortOutcome {
    pub sorted: Vec<u8>,
    pub reports: Vec<StageReport>,
}

#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn with_stages(stages: usize) -> Self {
        Self::new(PipelineConfig {
            stages: Some(stages),
            ..PipelineConfig::default()
        })
    }

    /// Chain length used for an input of `elements` numbers.
    pub fn stages_for(&self, elements: usize) -> usize {
        self.config
            .stages
            .unwrap_or_else(|| source::required_stages(elements))
    }

    /// Admission control only: checks `numbers` against the configured chain
    /// and returns the chain length a run would use.
    pub fn admit(&self, numbers: &[u8]) -> Result<usize> {
        let stages = self.stages_for(numbers.len());
        Source::new(numbers, stages)?;
        Ok(stages)
    }

    /// Sorts `numbers` and returns the terminal stage's output.
    pub fn sort(&self, numbers: &[u8]) -> Result<Vec<u8>> {
        self.run(numbers).map(|outcome| outcome.sorted)
    }

    pub fn run(&self, numbers: &[u8]) -> Result<SortOutcome> {
        let stages = self.stages_for(numbers.len());
        let source = Source::new(numbers, stages)?;

        let start = Instant::now();
        let outcome = if stages == 1 {
            // Only a single element is admissible here; the source is the sink.
            SortOutcome {
                sorted: source.numbers().to_vec(),
                reports: vec![source_report(numbers.len())],
            }
        } else {
            thread::scope(|scope| self.run_chain(scope, source, stages))?
        };
        info!(
            elements = numbers.len(),
            stages,
            elapsed = ?start.elapsed(),
            "pipeline finished"
        );
        Ok(outcome)
    }

    fn run_chain<'scope>(
        &self,
        scope: &'scope Scope<'scope, '_>,
        source: Source<'scope>,
        stages: usize,
    ) -> Result<SortOutcome> {
        let capacity = self.config.link_capacity;
        let elements = source.numbers().len();

        // Link k feeds stage k.
        let (mut outlets, mut inlets): (Vec<Outlet>, Vec<Inlet>) =
            (1..stages).map(|k| link::link(k, capacity)).unzip();
        let terminal_inlet = inlets.pop();
        let first_outlet = outlets.remove(0);

        let mut workers: Vec<(usize, ScopedJoinHandle<'scope, Result<StageReport>>)> =
            Vec::with_capacity(stages);
        workers.push((
            0,
            spawn(scope, 0, move || {
                source.run(&first_outlet).map(source_report)
            })?,
        ));
        for (index, (mut inlet, mut outlet)) in (1..).zip(inlets.into_iter().zip(outlets)) {
            let handle = spawn(scope, index, move || {
                MergeStage::new(index).run(&mut inlet, &mut outlet)
            })?;
            workers.push((index, handle));
        }

        let last = stages - 1;
        let Some(mut inlet) = terminal_inlet else {
            unreachable!("chain of {stages} stages has a terminal link");
        };
        let terminal = spawn(scope, last, move || {
            let mut sink = Sink::with_capacity(elements);
            let report = MergeStage::new(last).run(&mut inlet, &mut sink)?;
            Ok((report, sink.into_sorted()))
        })?;

        let mut errors = Vec::new();
        let mut reports = Vec::with_capacity(stages);
        for (index, handle) in workers {
            match join(index, handle) {
                Ok(report) => reports.push(report),
                Err(err) => errors.push(err),
            }
        }
        let sorted = match join(last, terminal) {
            Ok((report, sorted)) => {
                reports.push(report);
                Some(sorted)
            }
            Err(err) => {
                errors.push(err);
                None
            }
        };

        for err in errors.iter().filter(|err| err.is_consequential()) {
            warn!(%err, "stage stopped after a neighbour failed");
        }
        if let Some(err) = root_cause(errors) {
            error!(%err, "pipeline aborted");
            return Err(err);
        }
        for report in &reports {
            debug!(
                stage = report.index,
                emitted = report.emitted,
                peak_buffered = report.peak_buffered,
                "stage report"
            );
        }
        Ok(SortOutcome {
            sorted: sorted.unwrap_or_default(),
            reports,
        })
    }
}

fn source_report(sent: usize) -> StageReport {
    StageReport {
        index: 0,
        emitted: sent,
        peak_buffered: 0,
    }
}

fn spawn<'scope, T, F>(
    scope: &'scope Scope<'scope, '_>,
    index: usize,
    body: F,
) -> Result<ScopedJoinHandle<'scope, Result<T>>>
where
    T: Send + 'scope,
    F: FnOnce() -> Result<T> + Send + 'scope,
{
    let span = info_span!("stage", index);
    let handle = thread::Builder::new()
        .name(format!("stage-{index}"))
        .spawn_scoped(scope, move || {
            let _guard = span.enter();
            body()
        })?;
    Ok(handle)
}

fn join<T>(index: usize, handle: ScopedJoinHandle<'_, Result<T>>) -> Result<T> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(SortError::StagePanicked { stage: index }),
    }
}

/// Errors arrive in stage order; the first one that is not merely a neighbour
/// hanging up is the one that broke the chain.
fn root_cause(errors: Vec<SortError>) -> Option<SortError> {
    let position = errors
        .iter()
        .position(|err| !err.is_consequential())
        .unwrap_or(0);
    errors.into_iter().nth(position)
}
