//! gauge-core - Domain model and spec analysis for the gauge host
//!
//! This crate provides the building blocks the host orchestrator works with:
//!
//! - The specification tree ([`Specification`], [`Scenario`], [`Step`],
//!   [`Concept`]) produced by the parser
//! - Canonical step signatures ([`StepValue`]) used as the equality key for
//!   autocomplete and refactoring
//! - The tag-expression language ([`TagExpression`]) and the scenario
//!   filters built on top of it
//! - Spec/concept file recognition and discovery
//!
//! # Selecting scenarios by tag
//!
//! ```
//! use gauge_core::{Scenario, Specification, TagExpression, filter_specs_by_tags};
//!
//! let expression = TagExpression::parse("smoke & !wip").unwrap();
//! let mut spec = Specification::new("Login", "login.spec");
//! spec.scenarios.push(Scenario {
//!     heading: "Valid user".into(),
//!     tags: vec!["smoke".into()],
//!     ..Default::default()
//! });
//! let selected = filter_specs_by_tags(vec![spec], &expression);
//! assert_eq!(selected.len(), 1);
//! ```

mod filter;
mod parser;
mod spec;
mod step_value;
mod tags;
pub mod util;

pub use filter::{ScenarioIndexFilter, ScenarioTagFilter, filter_specs_by_tags};
pub use parser::{ParseError, create_concept_dictionary, parse_concept_file, parse_concept_text, parse_spec_file, parse_spec_text};
pub use spec::{Concept, ConceptDictionary, Scenario, SpecItem, SpecItemFilter, Specification, Step};
pub use step_value::{StepError, StepValue, create_step_value, extract_step_value_and_params};
pub use tags::{ExpressionError, TagExpression, normalise};
