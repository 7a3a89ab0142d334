//! Concept extraction.
//!
//! Turns a run of steps inside a spec into a named, reusable concept: the
//! steps move into a concept file and the spec keeps a single step naming
//! the concept.

use std::path::Path;

use eyre::{Result, bail};
use gauge_core::util;

/// Extract lines `begin_line..=end_line` (1-indexed) of `spec_file` into a
/// concept named `concept_name` inside `concept_file`. Returns the changed
/// files.
pub fn extract_concept(
    concept_name: &str,
    concept_file: &Path,
    spec_file: &Path,
    begin_line: usize,
    end_line: usize,
) -> Result<Vec<String>> {
    let concept_name = concept_name.trim();
    if concept_name.is_empty() {
        bail!("concept name must not be empty");
    }
    if !util::is_concept_file(concept_file) {
        bail!(
            "{} is not a concept file (expected a .{} extension)",
            concept_file.display(),
            util::CONCEPT_EXTENSION
        );
    }
    if begin_line == 0 || end_line < begin_line {
        bail!("invalid selection: lines {begin_line}..{end_line}");
    }

    let content = std::fs::read_to_string(spec_file)?;
    let lines: Vec<&str> = content.lines().collect();
    if end_line > lines.len() {
        bail!(
            "selection ends at line {end_line} but {} has {} lines",
            spec_file.display(),
            lines.len()
        );
    }

    let selected = &lines[begin_line - 1..end_line];
    if selected.is_empty() || !selected.iter().all(|l| l.trim_start().starts_with('*')) {
        bail!("the selection must cover only steps");
    }

    // Append the new concept; the file may not exist yet.
    let mut concept_text = match std::fs::read_to_string(concept_file) {
        Ok(existing) if !existing.is_empty() => {
            let mut text = existing;
            if !text.ends_with('\n') {
                text.push('\n');
            }
            text.push('\n');
            text
        }
        _ => String::new(),
    };
    concept_text.push_str(&format!("# {concept_name}\n"));
    for line in selected {
        concept_text.push_str(&format!("* {}\n", line.trim_start().trim_start_matches('*').trim()));
    }
    std::fs::write(concept_file, concept_text)?;

    // Replace the selection with a single step naming the concept.
    let mut rewritten: Vec<String> = Vec::with_capacity(lines.len());
    rewritten.extend(lines[..begin_line - 1].iter().map(|l| l.to_string()));
    rewritten.push(format!("* {concept_name}"));
    rewritten.extend(lines[end_line..].iter().map(|l| l.to_string()));
    let mut output = rewritten.join("\n");
    if content.ends_with('\n') {
        output.push('\n');
    }
    std::fs::write(spec_file, output)?;

    Ok(vec![
        spec_file.to_string_lossy().into_owned(),
        concept_file.to_string_lossy().into_owned(),
    ])
}
