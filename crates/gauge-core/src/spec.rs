//! The specification tree.
//!
//! A specification file parses into one or more [`Specification`]s (a file
//! yields several only in edge cases), each owning an ordered list of
//! [`Scenario`]s. Steps appearing before the first scenario are the spec's
//! contexts and run ahead of every scenario.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::step_value::create_step_value;

/// A single executable sentence within a scenario or concept.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Step {
    /// The step text as authored, without the leading `*`.
    pub text: String,
    /// 1-indexed source line.
    pub line: usize,
    /// Whether the step resolved to a concept in the concept dictionary.
    pub is_concept: bool,
    /// Whether an inline table immediately follows the step.
    pub has_inline_table: bool,
}

impl Step {
    pub fn new(text: impl Into<String>, line: usize) -> Self {
        Step {
            text: text.into(),
            line,
            ..Default::default()
        }
    }
}

/// A tagged, ordered list of steps within a specification.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scenario {
    pub heading: String,
    pub tags: Vec<String>,
    pub steps: Vec<Step>,
    /// 1-indexed line of the scenario heading.
    pub line: usize,
}

/// A specification document: heading, optional tags, contexts, scenarios.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Specification {
    pub heading: String,
    pub file_name: PathBuf,
    pub tags: Vec<String>,
    /// Steps declared before the first scenario; they run ahead of each one.
    pub contexts: Vec<Step>,
    pub scenarios: Vec<Scenario>,
}

impl Specification {
    pub fn new(heading: impl Into<String>, file_name: impl Into<PathBuf>) -> Self {
        Specification {
            heading: heading.into(),
            file_name: file_name.into(),
            ..Default::default()
        }
    }

    /// Apply a filter to every item of the spec, removing the items the
    /// filter discards. Items are visited in document order, contexts first.
    pub fn filter<F: SpecItemFilter + ?Sized>(&mut self, filter: &mut F) {
        self.contexts
            .retain(|context| !filter.discard(&SpecItem::Context(context)));
        self.scenarios
            .retain(|scenario| !filter.discard(&SpecItem::Scenario(scenario)));
    }
}

/// One item of a specification, as seen by a [`SpecItemFilter`].
#[derive(Debug)]
pub enum SpecItem<'a> {
    Context(&'a Step),
    Scenario(&'a Scenario),
}

/// A predicate over spec items. Returning `true` removes the item.
///
/// Filters take `&mut self` so they can carry traversal state (the index
/// filter counts scenarios as it goes).
pub trait SpecItemFilter {
    fn discard(&mut self, item: &SpecItem<'_>) -> bool;
}

/// A named, reusable step composed of sub-steps; owned by a source file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Concept {
    /// The concept heading, which is also its step text.
    pub step: Step,
    pub concept_steps: Vec<Step>,
    pub file_name: PathBuf,
}

/// Lookup table from canonical step value to concept definition.
///
/// Rebuilt from the concept files before each spec parse so step resolution
/// sees the latest definitions.
#[derive(Debug, Clone, Default)]
pub struct ConceptDictionary {
    concepts: HashMap<String, Concept>,
}

impl ConceptDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a concept under its canonical step value. The first
    /// definition of a signature wins; duplicates are reported back.
    pub fn add(&mut self, concept: Concept) -> Result<(), Concept> {
        let key = create_step_value(&concept.step).value;
        if self.concepts.contains_key(&key) {
            return Err(concept);
        }
        self.concepts.insert(key, concept);
        Ok(())
    }

    /// Resolve a step text against the dictionary.
    pub fn lookup(&self, step: &Step) -> Option<&Concept> {
        self.concepts.get(&create_step_value(step).value)
    }

    pub fn concepts(&self) -> impl Iterator<Item = &Concept> {
        self.concepts.values()
    }

    pub fn len(&self) -> usize {
        self.concepts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.concepts.is_empty()
    }

    /// Drop every concept defined in the given file.
    pub fn remove_file(&mut self, file: &Path) {
        self.concepts.retain(|_, c| c.file_name != file);
    }

    /// Re-resolve nested concept references in every stored concept's body.
    ///
    /// Concepts may compose concepts defined in files parsed later, so the
    /// flags set at parse time only cover what the dictionary held then.
    /// Called once every signature is registered.
    pub fn resolve_nested(&mut self) {
        let signatures: std::collections::HashSet<String> = self.concepts.keys().cloned().collect();
        for concept in self.concepts.values_mut() {
            for step in &mut concept.concept_steps {
                step.is_concept = signatures.contains(&create_step_value(step).value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct DropEverySecondScenario {
        seen: usize,
    }

    impl SpecItemFilter for DropEverySecondScenario {
        fn discard(&mut self, item: &SpecItem<'_>) -> bool {
            match item {
                SpecItem::Scenario(_) => {
                    self.seen += 1;
                    self.seen % 2 == 0
                }
                SpecItem::Context(_) => false,
            }
        }
    }

    fn spec_with_scenarios(count: usize) -> Specification {
        let mut spec = Specification::new("Spec", "spec.spec");
        for i in 0..count {
            spec.scenarios.push(Scenario {
                heading: format!("scenario {i}"),
                line: i + 2,
                ..Default::default()
            });
        }
        spec
    }

    #[test]
    fn filter_visits_scenarios_in_order() {
        let mut spec = spec_with_scenarios(4);
        spec.filter(&mut DropEverySecondScenario { seen: 0 });
        let headings: Vec<_> = spec.scenarios.iter().map(|s| s.heading.as_str()).collect();
        assert_eq!(headings, vec!["scenario 0", "scenario 2"]);
    }

    #[test]
    fn filter_retains_contexts_by_default() {
        let mut spec = spec_with_scenarios(2);
        spec.contexts.push(Step::new("log in as admin", 2));
        spec.filter(&mut DropEverySecondScenario { seen: 0 });
        assert_eq!(spec.contexts.len(), 1);
    }

    #[test]
    fn dictionary_first_definition_wins() {
        let mut dict = ConceptDictionary::new();
        let first = Concept {
            step: Step::new("log in as <user>", 1),
            file_name: "a.cpt".into(),
            ..Default::default()
        };
        let duplicate = Concept {
            step: Step::new("log in as <name>", 1),
            file_name: "b.cpt".into(),
            ..Default::default()
        };
        assert!(dict.add(first).is_ok());
        // Same signature once parameters are canonicalised.
        assert!(dict.add(duplicate).is_err());
        assert_eq!(dict.len(), 1);
        let resolved = dict.lookup(&Step::new("log in as \"sue\"", 9)).unwrap();
        assert_eq!(resolved.file_name, PathBuf::from("a.cpt"));
    }

    #[test]
    fn resolve_nested_marks_cross_concept_references() {
        let mut dict = ConceptDictionary::new();
        // Added in the wrong order: the composing concept arrives before
        // the concept it references.
        dict.add(Concept {
            step: Step::new("prepare a clean tenant", 1),
            concept_steps: vec![
                Step::new("reset the database", 2),
                Step::new("create tenant <name>", 3),
            ],
            file_name: "compose.cpt".into(),
        })
        .unwrap();
        dict.add(Concept {
            step: Step::new("create tenant <name>", 1),
            concept_steps: vec![Step::new("post tenant <name>", 2)],
            file_name: "tenant.cpt".into(),
        })
        .unwrap();

        dict.resolve_nested();

        let composed = dict.lookup(&Step::new("prepare a clean tenant", 9)).unwrap();
        assert!(!composed.concept_steps[0].is_concept);
        assert!(composed.concept_steps[1].is_concept);
    }

    #[test]
    fn dictionary_remove_file_drops_owned_concepts() {
        let mut dict = ConceptDictionary::new();
        dict.add(Concept {
            step: Step::new("open the vault", 1),
            file_name: "vault.cpt".into(),
            ..Default::default()
        })
        .unwrap();
        dict.remove_file(Path::new("vault.cpt"));
        assert!(dict.is_empty());
    }
}
