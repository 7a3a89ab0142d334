//! The live index of specs, concepts, and steps.
//!
//! Created once per process and populated asynchronously: the watcher
//! subscribes first (so nothing slips between the initial parse and the
//! first notification), concepts parse before specs (spec parsing resolves
//! concept references), then the runner is asked which steps it
//! implements. A readiness latch holds every external reader until that
//! initial population is done; afterwards watcher events mutate the caches
//! in place under one mutex.
//!
//! Step merging is first-writer-wins across three sources, in order:
//! implemented steps from the runner, steps from concepts, steps from
//! specs. Steps derived from a file are kept when the file is removed -
//! autocomplete entries surviving a transient delete-and-save are worth
//! more than a momentarily exact cache.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use gauge_core::{
    Concept, ConceptDictionary, Specification, StepValue, create_step_value,
    parse_concept_file, parse_spec_file, util,
};
use gauge_proto::ConceptInfo;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::api::watcher::{FileEvent, FileEventKind, SpecWatcher};
use crate::convert::to_concept_info;
use crate::runner::Runner;

#[derive(Default)]
struct Caches {
    concept_dictionary: ConceptDictionary,
    specs: HashMap<PathBuf, Vec<Specification>>,
    concepts: HashMap<PathBuf, Vec<Concept>>,
    steps: HashMap<String, StepValue>,
}

/// The gatherer. See the module docs for the lifecycle.
pub struct SpecInfoGatherer {
    specs_dir: PathBuf,
    caches: Mutex<Caches>,
    ready_tx: watch::Sender<bool>,
    ready_rx: watch::Receiver<bool>,
}

impl SpecInfoGatherer {
    pub fn new(specs_dir: PathBuf) -> Arc<SpecInfoGatherer> {
        let (ready_tx, ready_rx) = watch::channel(false);
        Arc::new(SpecInfoGatherer {
            specs_dir,
            caches: Mutex::new(Caches::default()),
            ready_tx,
            ready_rx,
        })
    }

    /// Populate the caches and start watching for changes.
    ///
    /// Blocks until the watcher has subscribed and the initial parse is
    /// complete; readers waiting on the latch proceed once this returns.
    /// The returned watcher keeps feeding the gatherer until dropped. A
    /// watcher that cannot subscribe (say, no specs directory yet) is
    /// logged and skipped; the index then reflects the initial parse only.
    pub async fn make_list_of_available_steps(
        self: &Arc<Self>,
        runner: Option<&Runner>,
        runner_request_timeout: std::time::Duration,
    ) -> Option<SpecWatcher> {
        let gatherer = Arc::clone(self);
        let watcher = match SpecWatcher::start(&self.specs_dir, move |event| {
            gatherer.on_file_event(event);
        }) {
            Ok(watcher) => Some(watcher),
            Err(error) => {
                warn!(%error, "file watching unavailable");
                None
            }
        };

        // Concepts first: spec parsing needs the concept dictionary.
        self.init_concepts_cache();
        self.init_specs_cache();
        self.init_steps_cache(runner, runner_request_timeout).await;

        self.ready_tx.send_replace(true);
        watcher
    }

    fn init_concepts_cache(&self) {
        let files = util::find_concept_files(&self.specs_dir);
        info!(count = files.len(), "initializing concepts cache");
        let mut caches = self.caches.lock().expect("gatherer mutex poisoned");
        for file in files {
            match parse_concept_file(&file, &caches.concept_dictionary) {
                Ok(concepts) => {
                    add_concepts(&mut caches, file, concepts);
                }
                Err(error) => warn!(%error, "concept parse failure, skipping file"),
            }
        }
    }

    fn init_specs_cache(&self) {
        let files = util::find_spec_files(&self.specs_dir);
        info!(count = files.len(), "initializing specs cache");
        let mut caches = self.caches.lock().expect("gatherer mutex poisoned");
        for file in files {
            match parse_spec_file(&file, &caches.concept_dictionary) {
                Ok(specs) => {
                    debug!(file = %file.display(), "adding specs");
                    caches.specs.insert(file, specs);
                }
                Err(error) => warn!(%error, "spec parse failure, skipping file"),
            }
        }
    }

    async fn init_steps_cache(
        &self,
        runner: Option<&Runner>,
        runner_request_timeout: std::time::Duration,
    ) {
        let implemented = match runner {
            Some(runner) => match runner.step_names(runner_request_timeout).await {
                Ok(steps) => steps,
                Err(error) => {
                    warn!(%error, "no implemented steps from runner");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        let mut caches = self.caches.lock().expect("gatherer mutex poisoned");
        let mut merged: Vec<StepValue> = Vec::new();
        for text in &implemented {
            match gauge_core::extract_step_value_and_params(text, false) {
                Ok(step_value) => merged.push(step_value),
                Err(error) => warn!(%error, step = %text, "unparseable implemented step"),
            }
        }
        merged.extend(steps_from_concepts(caches.concepts.values().flatten()));
        merged.extend(steps_from_specs(caches.specs.values().flatten()));

        info!(count = merged.len(), "initializing steps cache");
        add_steps(&mut caches.steps, merged);
    }

    // ------------------------------------------------------------------
    // Readers. Each waits for the initial population, snapshots under the
    // mutex, and returns caller-owned copies.
    // ------------------------------------------------------------------

    async fn wait_ready(&self) {
        let mut ready = self.ready_rx.clone();
        while !*ready.borrow() {
            if ready.changed().await.is_err() {
                return;
            }
        }
    }

    pub async fn available_specs(&self) -> Vec<Specification> {
        self.wait_ready().await;
        let caches = self.caches.lock().expect("gatherer mutex poisoned");
        caches.specs.values().flatten().cloned().collect()
    }

    pub async fn available_steps(&self) -> Vec<StepValue> {
        self.wait_ready().await;
        let caches = self.caches.lock().expect("gatherer mutex poisoned");
        caches.steps.values().cloned().collect()
    }

    pub async fn concept_infos(&self) -> Vec<ConceptInfo> {
        self.wait_ready().await;
        let caches = self.caches.lock().expect("gatherer mutex poisoned");
        caches
            .concepts
            .values()
            .flatten()
            .map(to_concept_info)
            .collect()
    }

    // ------------------------------------------------------------------
    // Incremental updates, driven by the watcher.
    // ------------------------------------------------------------------

    /// Apply one file event. Non-spec, non-concept paths are ignored.
    pub fn on_file_event(&self, event: FileEvent) {
        let path = &event.path;
        let is_spec = util::is_spec_file(path);
        let is_concept = util::is_concept_file(path);
        if !is_spec && !is_concept {
            return;
        }
        match event.kind {
            FileEventKind::Create | FileEventKind::Write => {
                if is_concept {
                    self.on_concept_file_modified(path);
                } else {
                    self.on_spec_file_modified(path);
                }
            }
            // A rename is a removal; the new name arrives as a create.
            FileEventKind::Remove | FileEventKind::Rename => {
                if is_concept {
                    self.on_concept_file_removed(path);
                } else {
                    self.on_spec_file_removed(path);
                }
            }
        }
    }

    fn on_spec_file_modified(&self, file: &Path) {
        info!(file = %file.display(), "spec file added / modified");
        let mut caches = self.caches.lock().expect("gatherer mutex poisoned");
        match parse_spec_file(file, &caches.concept_dictionary) {
            Ok(specs) => {
                let steps = steps_from_specs(specs.iter());
                caches.specs.insert(file.to_path_buf(), specs);
                add_steps(&mut caches.steps, steps);
            }
            Err(error) => warn!(%error, "spec parse failure, keeping previous entry"),
        }
    }

    fn on_concept_file_modified(&self, file: &Path) {
        info!(file = %file.display(), "concept file added / modified");
        let mut caches = self.caches.lock().expect("gatherer mutex poisoned");
        match parse_concept_file(file, &caches.concept_dictionary) {
            Ok(concepts) => {
                add_concepts(&mut caches, file.to_path_buf(), concepts);
                let steps = steps_from_concepts(caches.concepts.values().flatten());
                add_steps(&mut caches.steps, steps);
            }
            Err(error) => warn!(%error, "concept parse failure, keeping previous entry"),
        }
    }

    fn on_spec_file_removed(&self, file: &Path) {
        info!(file = %file.display(), "spec file removed");
        let mut caches = self.caches.lock().expect("gatherer mutex poisoned");
        caches.specs.remove(file);
    }

    fn on_concept_file_removed(&self, file: &Path) {
        info!(file = %file.display(), "concept file removed");
        let mut caches = self.caches.lock().expect("gatherer mutex poisoned");
        caches.concepts.remove(file);
        caches.concept_dictionary.remove_file(file);
    }
}

/// Insert a file's concepts into the cache and the dictionary.
fn add_concepts(caches: &mut Caches, file: PathBuf, concepts: Vec<Concept>) {
    // The dictionary is rebuilt here rather than patched: definitions from
    // other files may shadow or be shadowed by the ones being added.
    caches.concepts.insert(file, concepts);
    let mut dictionary = ConceptDictionary::new();
    for concept in caches.concepts.values().flatten() {
        if let Err(duplicate) = dictionary.add(concept.clone()) {
            debug!(
                concept = %duplicate.step.text,
                file = %duplicate.file_name.display(),
                "duplicate concept definition ignored"
            );
        }
    }
    dictionary.resolve_nested();
    // Cached bodies may reference concepts from other files, including
    // ones that were not in the dictionary when they parsed.
    for concept in caches.concepts.values_mut().flatten() {
        for step in &mut concept.concept_steps {
            step.is_concept = dictionary.lookup(step).is_some();
        }
    }
    caches.concept_dictionary = dictionary;
}

/// First writer wins: an existing entry for a signature is never replaced.
fn add_steps(cache: &mut HashMap<String, StepValue>, steps: Vec<StepValue>) {
    for step in steps {
        cache.entry(step.value.clone()).or_insert(step);
    }
}

fn steps_from_specs<'a>(specs: impl Iterator<Item = &'a Specification>) -> Vec<StepValue> {
    specs
        .flat_map(|spec| spec.scenarios.iter())
        .flat_map(|scenario| scenario.steps.iter())
        .filter(|step| !step.is_concept)
        .map(create_step_value)
        .collect()
}

fn steps_from_concepts<'a>(concepts: impl Iterator<Item = &'a Concept>) -> Vec<StepValue> {
    concepts
        .flat_map(|concept| concept.concept_steps.iter())
        .filter(|step| !step.is_concept)
        .map(create_step_value)
        .collect()
}
