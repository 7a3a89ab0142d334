//! Parallel execution of a spec set.
//!
//! The selected specs are partitioned across `min(N, len(specs))` streams.
//! Each stream owns one runner subprocess and runs its share of the specs
//! sequentially; per-stream results are aggregated once every stream has
//! ended. A stream that fails to start or dies mid-flight records which
//! specs it never executed and lets its siblings finish.

pub mod result;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use eyre::Result;
use gauge_core::Specification;
use tracing::{info, warn};

use crate::config::GaugeConfig;
use crate::convert::to_proto_spec;
use crate::runner::Runner;
use result::SuiteResult;

/// Step-validation findings collected before the run; a spec with an entry
/// here produced no runnable scenario and is counted as skipped.
#[derive(Debug, Clone, Default)]
pub struct ValidationErrMaps {
    pub spec_errs: HashMap<String, Vec<String>>,
}

/// Specs that one stream never got to execute, and why.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamExecError {
    pub specs_skipped: Vec<String>,
    pub message: String,
}

impl fmt::Display for StreamExecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "The following specifications could not be executed:")?;
        for spec in &self.specs_skipped {
            writeln!(f, "{spec}")?;
        }
        write!(f, "Reason : {}.", self.message)
    }
}

impl std::error::Error for StreamExecError {}

/// The fan-out coordinator.
pub struct ParallelExecution {
    config: Arc<GaugeConfig>,
    specs: Vec<Specification>,
    requested_streams: usize,
    err_maps: ValidationErrMaps,
}

impl ParallelExecution {
    pub fn new(
        config: Arc<GaugeConfig>,
        specs: Vec<Specification>,
        requested_streams: usize,
        err_maps: ValidationErrMaps,
    ) -> Self {
        ParallelExecution {
            config,
            specs,
            requested_streams,
            err_maps,
        }
    }

    /// Streams actually used: never more than there are specs.
    pub fn number_of_streams(&self) -> usize {
        self.requested_streams.min(self.specs.len())
    }

    /// Round-robin partition of the specs across the streams. No ordering
    /// guarantee is promised to callers.
    fn distribute_specs(&mut self, streams: usize) -> Vec<Vec<Specification>> {
        let mut groups: Vec<Vec<Specification>> = (0..streams).map(|_| Vec::new()).collect();
        for (i, spec) in self.specs.drain(..).enumerate() {
            groups[i % streams].push(spec);
        }
        groups
    }

    /// Run every stream to completion and aggregate.
    pub async fn run(mut self) -> SuiteResult {
        let streams = self.number_of_streams();
        if streams == 0 {
            return self.aggregate_results(Vec::new());
        }
        info!(streams, specs = self.specs.len(), "starting parallel execution");

        let mut handles = Vec::with_capacity(streams);
        for (stream, specs) in self.distribute_specs(streams).into_iter().enumerate() {
            let config = Arc::clone(&self.config);
            handles.push(tokio::spawn(execute_stream(stream, specs, config)));
        }

        let mut results = Vec::with_capacity(streams);
        for handle in handles {
            match handle.await {
                Ok(result) => results.push(result),
                Err(join_error) => {
                    // A panicked stream reports as failed with no spec list;
                    // the specs it held are unaccounted for.
                    warn!(%join_error, "execution stream panicked");
                    results.push(SuiteResult {
                        is_failed: true,
                        unhandled_errors: vec![StreamExecError {
                            specs_skipped: Vec::new(),
                            message: format!("stream panicked: {join_error}"),
                        }],
                        ..Default::default()
                    });
                }
            }
        }
        self.aggregate_results(results)
    }

    /// Merge per-stream results into the suite result.
    ///
    /// Times sum, spec results concatenate, the last non-empty pre/post
    /// suite hook failure wins, and the skipped count is the number of
    /// specs the validation pass found unrunnable.
    pub fn aggregate_results(&self, results: Vec<SuiteResult>) -> SuiteResult {
        let mut aggregate = SuiteResult::default();
        for result in results {
            aggregate.execution_time += result.execution_time;
            aggregate.specs_failed_count += result.specs_failed_count;
            aggregate.spec_results.extend(result.spec_results);
            if result.is_failed {
                aggregate.is_failed = true;
            }
            if result.pre_suite.is_some() {
                aggregate.pre_suite = result.pre_suite;
            }
            if result.post_suite.is_some() {
                aggregate.post_suite = result.post_suite;
            }
            aggregate.unhandled_errors.extend(result.unhandled_errors);
        }
        aggregate.specs_skipped_count = self.err_maps.spec_errs.len();
        aggregate
    }
}

/// Run one stream: start a runner, execute the stream's specs in order,
/// fire the suite hooks, shut the runner down.
async fn execute_stream(
    stream: usize,
    specs: Vec<Specification>,
    config: Arc<GaugeConfig>,
) -> SuiteResult {
    let mut suite = SuiteResult::default();

    let runner = match Runner::start(&config).await {
        Ok(runner) => runner,
        Err(error) => {
            warn!(stream, %error, "runner failed to start");
            return stream_failure(&specs, format!("{error}"));
        }
    };

    match runner.suite_begin().await {
        Ok(failure) => suite.pre_suite = failure,
        Err(error) => {
            warn!(stream, %error, "runner died before the suite began");
            let _ = runner.kill().await;
            return stream_failure(&specs, format!("{error}"));
        }
    }
    if suite.pre_suite.is_some() {
        suite.is_failed = true;
    }

    let mut specs = specs.into_iter();
    while let Some(spec) = specs.next() {
        info!(stream, spec = %spec.heading, "executing spec");
        match runner.execute_spec(to_proto_spec(&spec)).await {
            Ok(result) => suite.record_spec(result.into()),
            Err(error) => {
                // The runner is gone mid-stream. Everything not yet
                // executed, this spec included, is reported unexecuted.
                warn!(stream, %error, "runner died mid-stream");
                let mut skipped = vec![spec.heading.clone()];
                skipped.extend(specs.map(|s| s.heading));
                suite.is_failed = true;
                suite.unhandled_errors.push(StreamExecError {
                    specs_skipped: skipped,
                    message: format!("{error}"),
                });
                let _ = runner.kill().await;
                return suite;
            }
        }
    }

    match runner.suite_end().await {
        Ok(failure) => suite.post_suite = failure,
        Err(error) => warn!(stream, %error, "runner died during the suite teardown"),
    }
    if suite.post_suite.is_some() {
        suite.is_failed = true;
    }

    if let Err(error) = runner.kill().await {
        warn!(stream, %error, "failed to stop stream runner");
    }
    suite
}

fn stream_failure(specs: &[Specification], message: String) -> SuiteResult {
    SuiteResult {
        is_failed: true,
        unhandled_errors: vec![StreamExecError {
            specs_skipped: specs.iter().map(|s| s.heading.clone()).collect(),
            message,
        }],
        ..Default::default()
    }
}

/// Select specs by tag expression and run them across `streams` runners.
///
/// An invalid tag expression is fatal here, before anything executes.
pub async fn execute(
    config: Arc<GaugeConfig>,
    specs: Vec<Specification>,
    tags: Option<&str>,
    streams: usize,
) -> Result<SuiteResult> {
    let specs = match tags {
        Some(tags) => {
            let expression = gauge_core::TagExpression::parse(tags)?;
            gauge_core::filter_specs_by_tags(specs, &expression)
        }
        None => specs,
    };
    let execution = ParallelExecution::new(config, specs, streams, ValidationErrMaps::default());
    Ok(execution.run().await)
}
