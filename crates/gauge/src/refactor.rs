//! Step rephrasing.
//!
//! Rewrites every usage of a step across spec and concept files when its
//! wording changes. Parameters are matched by name, so `login as <user>`
//! can become `sign in as <user> quickly` and each concrete usage keeps
//! its own argument values.

use std::path::{Path, PathBuf};

use gauge_core::util;
use tracing::info;

/// Outcome of a refactoring request.
#[derive(Debug, Clone, Default)]
pub struct RefactoringResult {
    pub success: bool,
    pub errors: Vec<String>,
    pub files_changed: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ParamKind {
    /// `"literal"`
    Static,
    /// `<name>`
    Dynamic,
}

#[derive(Debug, Clone)]
struct ParsedStep {
    /// Canonical form with `{}` placeholders.
    value: String,
    params: Vec<(String, ParamKind)>,
}

fn parse_step(text: &str) -> Option<ParsedStep> {
    let mut value = String::with_capacity(text.len());
    let mut params = Vec::new();
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        match c {
            '"' => {
                let mut param = String::new();
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some(inner) => param.push(inner),
                        None => return None,
                    }
                }
                value.push_str("{}");
                params.push((param, ParamKind::Static));
            }
            '<' => {
                let mut param = String::new();
                loop {
                    match chars.next() {
                        Some('>') => break,
                        Some(inner) => param.push(inner),
                        None => return None,
                    }
                }
                value.push_str("{}");
                params.push((param.trim().to_string(), ParamKind::Dynamic));
            }
            _ => value.push(c),
        }
    }
    Some(ParsedStep {
        value: value.trim().to_string(),
        params,
    })
}

/// Rephrase `old_step` as `new_step` in every spec and concept file under
/// the specs directory.
pub fn perform_rephrase_refactoring(
    old_step: &str,
    new_step: &str,
    specs_dir: &Path,
) -> RefactoringResult {
    let mut result = RefactoringResult::default();

    let Some(old) = parse_step(old_step) else {
        result.errors.push(format!("malformed step: {old_step}"));
        return result;
    };
    let Some(new) = parse_step(new_step) else {
        result.errors.push(format!("malformed step: {new_step}"));
        return result;
    };

    // Every parameter of the new wording must come from the old one; a
    // parameter may be dropped but not invented.
    let mut mapping: Vec<usize> = Vec::with_capacity(new.params.len());
    for (name, _) in &new.params {
        match old.params.iter().position(|(old_name, _)| old_name == name) {
            Some(index) => mapping.push(index),
            None => {
                result
                    .errors
                    .push(format!("parameter <{name}> is not present in the step being changed"));
                return result;
            }
        }
    }

    let mut files: Vec<PathBuf> = util::find_spec_files(specs_dir);
    files.extend(util::find_concept_files(specs_dir));

    for file in files {
        match rewrite_file(&file, &old, &new, &mapping) {
            Ok(true) => result
                .files_changed
                .push(file.to_string_lossy().into_owned()),
            Ok(false) => {}
            Err(error) => result.errors.push(error),
        }
    }

    result.success = result.errors.is_empty();
    if result.success {
        info!(files = result.files_changed.len(), "rephrased step usages");
    }
    result
}

/// Rewrite one file; returns whether anything changed.
fn rewrite_file(
    file: &Path,
    old: &ParsedStep,
    new: &ParsedStep,
    mapping: &[usize],
) -> Result<bool, String> {
    let content = std::fs::read_to_string(file)
        .map_err(|e| format!("failed to read {}: {e}", file.display()))?;

    let mut changed = false;
    let mut lines: Vec<String> = Vec::with_capacity(content.lines().count());
    for line in content.lines() {
        lines.push(rewrite_line(line, old, new, mapping, &mut changed));
    }

    if changed {
        let mut output = lines.join("\n");
        if content.ends_with('\n') {
            output.push('\n');
        }
        std::fs::write(file, output).map_err(|e| format!("failed to write {}: {e}", file.display()))?;
    }
    Ok(changed)
}

fn rewrite_line(
    line: &str,
    old: &ParsedStep,
    new: &ParsedStep,
    mapping: &[usize],
    changed: &mut bool,
) -> String {
    let trimmed = line.trim_start();
    let Some(step_text) = trimmed.strip_prefix('*') else {
        return line.to_string();
    };
    let Some(usage) = parse_step(step_text.trim()) else {
        return line.to_string();
    };
    if usage.value != old.value || usage.params.len() != old.params.len() {
        return line.to_string();
    }

    // Rebuild the new wording with this usage's own argument values.
    let mut rendered = String::new();
    let mut next_param = 0usize;
    let mut rest = new.value.as_str();
    while let Some(placeholder) = rest.find("{}") {
        rendered.push_str(&rest[..placeholder]);
        let (value, kind) = &usage.params[mapping[next_param]];
        match kind {
            ParamKind::Static => {
                rendered.push('"');
                rendered.push_str(value);
                rendered.push('"');
            }
            ParamKind::Dynamic => {
                rendered.push('<');
                rendered.push_str(value);
                rendered.push('>');
            }
        }
        next_param += 1;
        rest = &rest[placeholder + 2..];
    }
    rendered.push_str(rest);

    *changed = true;
    let indent = &line[..line.len() - trimmed.len()];
    format!("{indent}* {rendered}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_spec(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn rephrases_usages_preserving_arguments() {
        let temp = tempfile::tempdir().unwrap();
        let spec = write_spec(
            temp.path(),
            "login.spec",
            "# Login\n## ok\n* login as \"sue\" with role <role>\n* something else\n",
        );

        let result = perform_rephrase_refactoring(
            "login as <user> with role <role>",
            "sign in as <user> granted <role>",
            temp.path(),
        );
        assert!(result.success, "errors: {:?}", result.errors);
        assert_eq!(result.files_changed.len(), 1);

        let rewritten = std::fs::read_to_string(&spec).unwrap();
        assert!(rewritten.contains("* sign in as \"sue\" granted <role>"));
        assert!(rewritten.contains("* something else"));
    }

    #[test]
    fn parameters_can_be_dropped_but_not_invented() {
        let temp = tempfile::tempdir().unwrap();
        write_spec(temp.path(), "a.spec", "# S\n## s\n* login as \"sue\"\n");

        let dropped =
            perform_rephrase_refactoring("login as <user>", "login quickly", temp.path());
        assert!(dropped.success);

        let invented =
            perform_rephrase_refactoring("login quickly", "login as <user>", temp.path());
        assert!(!invented.success);
        assert!(invented.errors[0].contains("<user>"));
    }

    #[test]
    fn concept_bodies_are_rewritten_too() {
        let temp = tempfile::tempdir().unwrap();
        let concept = write_spec(
            temp.path(),
            "auth.cpt",
            "# authenticated session\n* login as \"admin\"\n* see the dashboard\n",
        );

        let result =
            perform_rephrase_refactoring("login as <user>", "sign in as <user>", temp.path());
        assert!(result.success);
        let rewritten = std::fs::read_to_string(&concept).unwrap();
        assert!(rewritten.contains("* sign in as \"admin\""));
    }

    #[test]
    fn unrelated_files_are_untouched() {
        let temp = tempfile::tempdir().unwrap();
        write_spec(temp.path(), "a.spec", "# S\n## s\n* unrelated step\n");
        let result =
            perform_rephrase_refactoring("login as <user>", "sign in as <user>", temp.path());
        assert!(result.success);
        assert!(result.files_changed.is_empty());
    }
}
