//! gauge - acceptance-test host orchestrator
//!
//! Specifications are authored as markdown prose (specs → scenarios →
//! steps) and executed by language-specific runner subprocesses. This
//! crate is the host side: it discovers and indexes specifications, serves
//! a long-lived API for IDE integrations, selects scenarios by tag, and
//! fans execution out across parallel runner streams.
//!
//! The library surface exists for the binary and for integration tests;
//! the domain model and the wire protocol live in `gauge-core` and
//! `gauge-proto`.

pub mod api;
pub mod config;
pub mod convert;
pub mod execution;
pub mod extractor;
pub mod formatter;
pub mod plugin;
pub mod refactor;
pub mod runner;

use std::path::Path;

use eyre::Result;
use gauge_core::{Specification, util};
use tracing::warn;

/// Parse every spec under the specs directory, concepts first.
///
/// Per-file parse failures are logged and skipped; an unparseable file
/// never aborts discovery.
pub fn parse_project_specs(specs_dir: &Path) -> Result<Vec<Specification>> {
    let concept_files = util::find_concept_files(specs_dir);
    let (dictionary, concept_errors) = gauge_core::create_concept_dictionary(&concept_files);
    for error in concept_errors {
        warn!(%error, "concept parse failure");
    }

    let mut specs = Vec::new();
    for file in util::find_spec_files(specs_dir) {
        match gauge_core::parse_spec_file(&file, &dictionary) {
            Ok(parsed) => specs.extend(parsed),
            Err(error) => warn!(%error, "spec parse failure"),
        }
    }
    Ok(specs)
}
