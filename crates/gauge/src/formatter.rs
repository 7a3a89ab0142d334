//! Canonical re-rendering of spec files.

use std::path::{Path, PathBuf};

use gauge_core::{ConceptDictionary, Scenario, Specification, parse_spec_file};
use tracing::info;

/// Outcome of formatting one file.
#[derive(Debug, Clone, Default)]
pub struct FormatResult {
    pub file: PathBuf,
    pub warnings: Vec<String>,
    pub error: Option<String>,
}

/// Parse and re-render each file in place. Parse failures leave the file
/// untouched and are reported per file.
pub fn format_spec_files(files: &[PathBuf]) -> Vec<FormatResult> {
    files.iter().map(|file| format_spec_file(file)).collect()
}

fn format_spec_file(file: &Path) -> FormatResult {
    let mut result = FormatResult {
        file: file.to_path_buf(),
        ..Default::default()
    };
    // Formatting does not resolve concepts; an empty dictionary keeps the
    // steps verbatim.
    let specs = match parse_spec_file(file, &ConceptDictionary::new()) {
        Ok(specs) => specs,
        Err(error) => {
            result.error = Some(error.to_string());
            return result;
        }
    };
    if specs.len() > 1 {
        result.warnings.push(format!(
            "{} defines {} specifications in one file",
            file.display(),
            specs.len()
        ));
    }

    let rendered: String = specs.iter().map(render_spec).collect();
    match std::fs::read_to_string(file) {
        Ok(current) if current == rendered => {}
        _ => {
            if let Err(error) = std::fs::write(file, &rendered) {
                result.error = Some(format!("failed to write {}: {error}", file.display()));
                return result;
            }
            info!(file = %file.display(), "formatted");
        }
    }
    result
}

fn render_spec(spec: &Specification) -> String {
    let mut out = String::new();
    out.push_str(&format!("# {}\n", spec.heading));
    if !spec.tags.is_empty() {
        out.push_str(&format!("tags: {}\n", spec.tags.join(", ")));
    }
    if !spec.contexts.is_empty() {
        out.push('\n');
        for context in &spec.contexts {
            out.push_str(&format!("* {}\n", context.text));
        }
    }
    for scenario in &spec.scenarios {
        out.push_str(&render_scenario(scenario));
    }
    out
}

fn render_scenario(scenario: &Scenario) -> String {
    let mut out = String::new();
    out.push_str(&format!("\n## {}\n", scenario.heading));
    if !scenario.tags.is_empty() {
        out.push_str(&format!("tags: {}\n", scenario.tags.join(", ")));
    }
    for step in &scenario.steps {
        out.push_str(&format!("* {}\n", step.text));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrites_to_canonical_form() {
        let temp = tempfile::tempdir().unwrap();
        let file = temp.path().join("messy.spec");
        std::fs::write(
            &file,
            "Login\n=====\ntags:  smoke ,login\n\n   * open the app\n\nValid user\n----------\n  *   login as \"sue\"\n",
        )
        .unwrap();

        let results = format_spec_files(&[file.clone()]);
        assert!(results[0].error.is_none());

        let formatted = std::fs::read_to_string(&file).unwrap();
        assert_eq!(
            formatted,
            "# Login\ntags: smoke, login\n\n* open the app\n\n## Valid user\n* login as \"sue\"\n"
        );
    }

    #[test]
    fn formatting_is_idempotent() {
        let temp = tempfile::tempdir().unwrap();
        let file = temp.path().join("a.spec");
        std::fs::write(&file, "# S\n## sc\n* one\n").unwrap();

        format_spec_files(&[file.clone()]);
        let first = std::fs::read_to_string(&file).unwrap();
        format_spec_files(&[file.clone()]);
        let second = std::fs::read_to_string(&file).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn parse_failures_are_reported_not_written() {
        let temp = tempfile::tempdir().unwrap();
        let file = temp.path().join("bad.spec");
        std::fs::write(&file, "* step without a heading\n").unwrap();

        let results = format_spec_files(&[file.clone()]);
        assert!(results[0].error.is_some());
        assert_eq!(
            std::fs::read_to_string(&file).unwrap(),
            "* step without a heading\n"
        );
    }

    #[test]
    fn multiple_specs_in_one_file_warn() {
        let temp = tempfile::tempdir().unwrap();
        let file = temp.path().join("two.spec");
        std::fs::write(&file, "# One\n## s\n* a\n# Two\n## t\n* b\n").unwrap();

        let results = format_spec_files(&[file.clone()]);
        assert_eq!(results[0].warnings.len(), 1);
    }
}
