//! Suite and spec results.

use std::time::Duration;

use gauge_proto::{ProtoHookFailure, ProtoSpecResult};

/// Outcome of one executed spec, as recorded by the host.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpecResult {
    pub heading: String,
    pub file_name: String,
    pub failed: bool,
    pub execution_time: Duration,
    pub error_message: Option<String>,
}

impl From<ProtoSpecResult> for SpecResult {
    fn from(result: ProtoSpecResult) -> Self {
        SpecResult {
            heading: result.spec_heading,
            file_name: result.file_name,
            failed: result.failed,
            execution_time: Duration::from_millis(result.execution_time_ms),
            error_message: result.error_message,
        }
    }
}

/// Aggregated outcome of a suite, or of one execution stream of it.
#[derive(Debug, Clone, Default)]
pub struct SuiteResult {
    pub execution_time: Duration,
    pub spec_results: Vec<SpecResult>,
    pub specs_failed_count: usize,
    pub specs_skipped_count: usize,
    pub is_failed: bool,
    pub pre_suite: Option<ProtoHookFailure>,
    pub post_suite: Option<ProtoHookFailure>,
    pub unhandled_errors: Vec<super::StreamExecError>,
}

impl SuiteResult {
    pub fn record_spec(&mut self, result: SpecResult) {
        self.execution_time += result.execution_time;
        if result.failed {
            self.specs_failed_count += 1;
            self.is_failed = true;
        }
        self.spec_results.push(result);
    }
}
