//! Spec and concept file parsing.
//!
//! The grammar is line-oriented markdown:
//!
//! ```text
//! # Specification heading        (or underlined with `=`)
//! tags: smoke, login
//!
//! * a context step
//!
//! ## Scenario heading            (or underlined with `-`)
//! tags: fast
//! * a step with "static" and <dynamic> parameters
//! * a tabular step
//!    |id|name|
//!    |1 |sue |
//! ```
//!
//! Steps before the first scenario are the spec's contexts. A `tags:` line
//! attaches to the spec before the first scenario and to the current
//! scenario after. Anything else is prose and is ignored.
//!
//! Concept files hold one or more `# heading` blocks whose steps make up
//! the concept body; the heading doubles as the concept's step text.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::spec::{Concept, ConceptDictionary, Scenario, Specification, Step};

#[derive(Debug, Clone, Error, PartialEq)]
#[error("{file}:{line}: {message}")]
pub struct ParseError {
    pub file: PathBuf,
    pub line: usize,
    pub message: String,
}

impl ParseError {
    fn new(file: &Path, line: usize, message: impl Into<String>) -> Self {
        ParseError {
            file: file.to_path_buf(),
            line,
            message: message.into(),
        }
    }
}

/// One logical line of a spec file.
enum Line<'a> {
    SpecHeading(&'a str),
    ScenarioHeading(&'a str),
    Tags(&'a str),
    Step(&'a str),
    TableRow,
    Prose,
}

fn classify<'a>(line: &'a str, next: Option<&str>) -> (Line<'a>, bool) {
    let trimmed = line.trim();
    if let Some(heading) = trimmed.strip_prefix("##") {
        return (Line::ScenarioHeading(heading.trim()), false);
    }
    if let Some(heading) = trimmed.strip_prefix('#') {
        return (Line::SpecHeading(heading.trim()), false);
    }
    if let Some(step) = trimmed.strip_prefix('*') {
        return (Line::Step(step.trim()), false);
    }
    if trimmed.starts_with('|') && trimmed.ends_with('|') {
        return (Line::TableRow, false);
    }
    if let Some(tags) = tags_value(trimmed) {
        return (Line::Tags(tags), false);
    }
    // Setext-style headings: a text line underlined with `=` (spec) or `-`
    // (scenario). The underline itself is consumed by the caller.
    if !trimmed.is_empty() {
        if let Some(next) = next.map(str::trim) {
            if !next.is_empty() && next.chars().all(|c| c == '=') {
                return (Line::SpecHeading(trimmed), true);
            }
            if !next.is_empty() && next.chars().all(|c| c == '-') {
                return (Line::ScenarioHeading(trimmed), true);
            }
        }
    }
    (Line::Prose, false)
}

fn tags_value(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("tags:").or_else(|| line.strip_prefix("Tags:"))?;
    Some(rest.trim())
}

fn split_tags(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse the text of a spec file into its specifications.
///
/// A file normally yields exactly one spec; several `#` headings produce
/// several. Steps are resolved against the concept dictionary so concept
/// references are flagged.
pub fn parse_spec_text(
    content: &str,
    file: &Path,
    dictionary: &ConceptDictionary,
) -> Result<Vec<Specification>, ParseError> {
    let lines: Vec<&str> = content.lines().collect();
    let mut specs: Vec<Specification> = Vec::new();
    let mut scenario: Option<Scenario> = None;
    let mut idx = 0;

    while idx < lines.len() {
        let line_no = idx + 1;
        let (line, consumed_underline) = classify(lines[idx], lines.get(idx + 1).copied());
        match line {
            Line::SpecHeading(heading) => {
                if heading.is_empty() {
                    return Err(ParseError::new(file, line_no, "empty specification heading"));
                }
                if let Some(done) = scenario.take() {
                    specs.last_mut().expect("scenario without spec").scenarios.push(done);
                }
                specs.push(Specification::new(heading, file));
            }
            Line::ScenarioHeading(heading) => {
                if heading.is_empty() {
                    return Err(ParseError::new(file, line_no, "empty scenario heading"));
                }
                let Some(spec) = specs.last_mut() else {
                    return Err(ParseError::new(
                        file,
                        line_no,
                        "scenario found before any specification heading",
                    ));
                };
                if let Some(done) = scenario.take() {
                    spec.scenarios.push(done);
                }
                scenario = Some(Scenario {
                    heading: heading.to_string(),
                    line: line_no,
                    ..Default::default()
                });
            }
            Line::Tags(value) => match (&mut scenario, specs.last_mut()) {
                (Some(scenario), _) => scenario.tags.extend(split_tags(value)),
                (None, Some(spec)) => spec.tags.extend(split_tags(value)),
                (None, None) => {
                    return Err(ParseError::new(
                        file,
                        line_no,
                        "tags found before any specification heading",
                    ));
                }
            },
            Line::Step(text) => {
                if text.is_empty() {
                    return Err(ParseError::new(file, line_no, "empty step"));
                }
                let mut step = Step::new(text, line_no);
                step.has_inline_table = lines
                    .get(idx + 1)
                    .map(|l| l.trim().starts_with('|'))
                    .unwrap_or(false);
                step.is_concept = dictionary.lookup(&step).is_some();
                match (&mut scenario, specs.last_mut()) {
                    (Some(scenario), _) => scenario.steps.push(step),
                    (None, Some(spec)) => spec.contexts.push(step),
                    (None, None) => {
                        return Err(ParseError::new(
                            file,
                            line_no,
                            "step found before any specification heading",
                        ));
                    }
                }
            }
            Line::TableRow | Line::Prose => {}
        }
        idx += if consumed_underline { 2 } else { 1 };
    }

    if let Some(done) = scenario.take() {
        specs.last_mut().expect("scenario without spec").scenarios.push(done);
    }
    if specs.is_empty() {
        return Err(ParseError::new(file, 1, "no specification heading found"));
    }
    Ok(specs)
}

/// Parse a spec file from disk.
pub fn parse_spec_file(
    path: &Path,
    dictionary: &ConceptDictionary,
) -> Result<Vec<Specification>, ParseError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| ParseError::new(path, 0, format!("unreadable file: {e}")))?;
    parse_spec_text(&content, path, dictionary)
}

/// Parse the text of a concept file.
///
/// Body steps are resolved against the dictionary the same way spec steps
/// are, so a concept composing another concept carries the reference flag.
pub fn parse_concept_text(
    content: &str,
    file: &Path,
    dictionary: &ConceptDictionary,
) -> Result<Vec<Concept>, ParseError> {
    let lines: Vec<&str> = content.lines().collect();
    let mut concepts: Vec<Concept> = Vec::new();
    let mut idx = 0;

    while idx < lines.len() {
        let line_no = idx + 1;
        let (line, consumed_underline) = classify(lines[idx], lines.get(idx + 1).copied());
        match line {
            Line::SpecHeading(heading) | Line::ScenarioHeading(heading) => {
                if heading.is_empty() {
                    return Err(ParseError::new(file, line_no, "empty concept heading"));
                }
                if let Some(last) = concepts.last() {
                    if last.concept_steps.is_empty() {
                        return Err(ParseError::new(
                            file,
                            last.step.line,
                            format!("concept '{}' has no steps", last.step.text),
                        ));
                    }
                }
                concepts.push(Concept {
                    step: Step::new(heading, line_no),
                    concept_steps: Vec::new(),
                    file_name: file.to_path_buf(),
                });
            }
            Line::Step(text) => {
                if text.is_empty() {
                    return Err(ParseError::new(file, line_no, "empty step"));
                }
                let Some(concept) = concepts.last_mut() else {
                    return Err(ParseError::new(
                        file,
                        line_no,
                        "step found before any concept heading",
                    ));
                };
                let mut step = Step::new(text, line_no);
                step.has_inline_table = lines
                    .get(idx + 1)
                    .map(|l| l.trim().starts_with('|'))
                    .unwrap_or(false);
                step.is_concept = dictionary.lookup(&step).is_some();
                concept.concept_steps.push(step);
            }
            Line::Tags(_) | Line::TableRow | Line::Prose => {}
        }
        idx += if consumed_underline { 2 } else { 1 };
    }

    match concepts.last() {
        None => Err(ParseError::new(file, 1, "no concept heading found")),
        Some(last) if last.concept_steps.is_empty() => Err(ParseError::new(
            file,
            last.step.line,
            format!("concept '{}' has no steps", last.step.text),
        )),
        Some(_) => Ok(concepts),
    }
}

/// Parse a concept file from disk.
pub fn parse_concept_file(
    path: &Path,
    dictionary: &ConceptDictionary,
) -> Result<Vec<Concept>, ParseError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| ParseError::new(path, 0, format!("unreadable file: {e}")))?;
    parse_concept_text(&content, path, dictionary)
}

/// Build a concept dictionary from a set of concept files.
///
/// Per-file parse failures and duplicate definitions are collected, not
/// fatal: the dictionary holds everything that did parse. A concept may
/// compose a concept defined in a file parsed later, so nested references
/// are re-resolved once every signature is registered.
pub fn create_concept_dictionary(files: &[PathBuf]) -> (ConceptDictionary, Vec<ParseError>) {
    let mut dictionary = ConceptDictionary::new();
    let mut errors = Vec::new();
    for file in files {
        match parse_concept_file(file, &dictionary) {
            Ok(concepts) => {
                for concept in concepts {
                    let line = concept.step.line;
                    if let Err(duplicate) = dictionary.add(concept) {
                        errors.push(ParseError::new(
                            file,
                            line,
                            format!("duplicate concept definition '{}'", duplicate.step.text),
                        ));
                    }
                }
            }
            Err(error) => errors.push(error),
        }
    }
    dictionary.resolve_nested();
    (dictionary, errors)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPEC: &str = "\
# Customer login
tags: login, smoke

Some prose describing the spec.

* navigate to the home page

## Valid credentials
tags: fast
* login as \"sue\" with password \"secret\"
* see the dashboard

## Locked account
--------------
* login as \"mallory\" with password \"secret\"
* see the lockout notice
";

    #[test]
    fn parses_headings_tags_contexts_and_scenarios() {
        let specs =
            parse_spec_text(SPEC, Path::new("login.spec"), &ConceptDictionary::new()).unwrap();
        assert_eq!(specs.len(), 1);
        let spec = &specs[0];
        assert_eq!(spec.heading, "Customer login");
        assert_eq!(spec.tags, vec!["login", "smoke"]);
        assert_eq!(spec.contexts.len(), 1);
        assert_eq!(spec.scenarios.len(), 2);
        assert_eq!(spec.scenarios[0].heading, "Valid credentials");
        assert_eq!(spec.scenarios[0].tags, vec!["fast"]);
        assert_eq!(spec.scenarios[0].steps.len(), 2);
        assert_eq!(spec.scenarios[1].heading, "Locked account");
    }

    #[test]
    fn setext_headings_parse() {
        let text = "Checkout\n========\n\nGuest checkout\n--------------\n* pay\n";
        let specs =
            parse_spec_text(text, Path::new("checkout.spec"), &ConceptDictionary::new()).unwrap();
        assert_eq!(specs[0].heading, "Checkout");
        assert_eq!(specs[0].scenarios[0].heading, "Guest checkout");
    }

    #[test]
    fn multiple_spec_headings_yield_multiple_specs() {
        let text = "# One\n## s\n* step\n# Two\n## t\n* step\n";
        let specs = parse_spec_text(text, Path::new("two.spec"), &ConceptDictionary::new()).unwrap();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[1].heading, "Two");
        assert_eq!(specs[1].scenarios.len(), 1);
    }

    #[test]
    fn inline_table_marks_the_preceding_step() {
        let text = "# S\n## sc\n* create users\n|id|name|\n|1|sue|\n* done\n";
        let specs = parse_spec_text(text, Path::new("t.spec"), &ConceptDictionary::new()).unwrap();
        let steps = &specs[0].scenarios[0].steps;
        assert!(steps[0].has_inline_table);
        assert!(!steps[1].has_inline_table);
    }

    #[test]
    fn steps_resolve_against_the_concept_dictionary() {
        let concepts = parse_concept_text(
            "# login as <user>\n* enter <user>\n* submit\n",
            Path::new("c.cpt"),
            &ConceptDictionary::new(),
        )
        .unwrap();
        let mut dictionary = ConceptDictionary::new();
        for c in concepts {
            dictionary.add(c).unwrap();
        }
        let text = "# S\n## sc\n* login as \"sue\"\n* see the dashboard\n";
        let specs = parse_spec_text(text, Path::new("t.spec"), &dictionary).unwrap();
        let steps = &specs[0].scenarios[0].steps;
        assert!(steps[0].is_concept);
        assert!(!steps[1].is_concept);
    }

    #[test]
    fn concept_bodies_resolve_nested_concept_references() {
        let base = parse_concept_text(
            "# open the admin console\n* navigate to \"/admin\"\n",
            Path::new("base.cpt"),
            &ConceptDictionary::new(),
        )
        .unwrap();
        let mut dictionary = ConceptDictionary::new();
        for c in base {
            dictionary.add(c).unwrap();
        }

        let composed = parse_concept_text(
            "# audit the admin console\n* open the admin console\n* capture the audit log\n",
            Path::new("composed.cpt"),
            &dictionary,
        )
        .unwrap();
        let steps = &composed[0].concept_steps;
        assert!(steps[0].is_concept);
        assert!(!steps[1].is_concept);
    }

    #[test]
    fn scenario_before_spec_heading_is_an_error() {
        let err = parse_spec_text("## sc\n* step\n", Path::new("bad.spec"), &ConceptDictionary::new())
            .unwrap_err();
        assert_eq!(err.line, 1);
        assert!(err.message.contains("before any specification heading"));
    }

    #[test]
    fn file_without_heading_is_an_error() {
        assert!(
            parse_spec_text("just prose\n", Path::new("bad.spec"), &ConceptDictionary::new())
                .is_err()
        );
    }

    #[test]
    fn concept_without_steps_is_an_error() {
        let err =
            parse_concept_text("# lonely concept\n", Path::new("c.cpt"), &ConceptDictionary::new())
                .unwrap_err();
        assert!(err.message.contains("has no steps"));
    }

    #[test]
    fn concept_file_may_define_several_concepts() {
        let text = "# first\n* a\n# second\n* b\n* c\n";
        let concepts =
            parse_concept_text(text, Path::new("c.cpt"), &ConceptDictionary::new()).unwrap();
        assert_eq!(concepts.len(), 2);
        assert_eq!(concepts[1].concept_steps.len(), 2);
    }
}
