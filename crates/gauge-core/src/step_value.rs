//! Canonical step signatures.
//!
//! Two steps are the same step when their parameter-stripped forms match:
//! `login as "sue"` and `login as "bob"` both canonicalise to `login as {}`.
//! The canonical form is the key the step cache, autocomplete, and the
//! refactorer operate on.

use thiserror::Error;

use crate::spec::Step;

/// A canonical step signature: the step text with parameter positions
/// replaced by `{}` placeholders, plus the original parameter list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepValue {
    /// Parameter-stripped form, e.g. `login as {}`.
    pub value: String,
    /// Display form with parameter names, e.g. `login as <user>`.
    pub parameterized: String,
    /// Parameter names/literals in positional order.
    pub args: Vec<String>,
}

#[derive(Debug, Error, PartialEq)]
pub enum StepError {
    #[error("unterminated quoted parameter in step: {0}")]
    UnterminatedQuote(String),
    #[error("unclosed dynamic parameter in step: {0}")]
    UnclosedParam(String),
}

/// Extract the canonical [`StepValue`] from a step text.
///
/// Quoted literals (`"sue"`) become static parameters, angle-bracketed names
/// (`<user>`) dynamic ones; both collapse to `{}` in the canonical form.
/// When the step carries an inline table, a trailing table parameter is
/// appended so the signature distinguishes tabular steps.
pub fn extract_step_value_and_params(
    text: &str,
    has_inline_table: bool,
) -> Result<StepValue, StepError> {
    let mut value = String::with_capacity(text.len());
    let mut args = Vec::new();

    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        match c {
            '"' => {
                let mut arg = String::new();
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some(inner) => arg.push(inner),
                        None => return Err(StepError::UnterminatedQuote(text.to_string())),
                    }
                }
                value.push_str("{}");
                args.push(arg);
            }
            '<' => {
                let mut arg = String::new();
                loop {
                    match chars.next() {
                        Some('>') => break,
                        Some(inner) => arg.push(inner),
                        None => return Err(StepError::UnclosedParam(text.to_string())),
                    }
                }
                value.push_str("{}");
                args.push(arg.trim().to_string());
            }
            _ => value.push(c),
        }
    }

    if has_inline_table {
        if !value.ends_with(' ') && !value.is_empty() {
            value.push(' ');
        }
        value.push_str("{}");
        args.push("table".to_string());
    }

    let value = value.trim().to_string();
    let parameterized = parameterize(&value, &args);
    Ok(StepValue {
        value,
        parameterized,
        args,
    })
}

/// Build the step value for an already-parsed step.
///
/// Parse failures cannot occur here: the parser only produces steps whose
/// parameters it already delimited, so malformed text degrades to a
/// parameterless signature.
pub fn create_step_value(step: &Step) -> StepValue {
    extract_step_value_and_params(&step.text, step.has_inline_table).unwrap_or_else(|_| StepValue {
        value: step.text.clone(),
        parameterized: step.text.clone(),
        args: Vec::new(),
    })
}

fn parameterize(value: &str, args: &[String]) -> String {
    let mut out = String::with_capacity(value.len());
    let mut args = args.iter();
    let mut rest = value;
    while let Some(idx) = rest.find("{}") {
        out.push_str(&rest[..idx]);
        match args.next() {
            Some(arg) => {
                out.push('<');
                out.push_str(arg);
                out.push('>');
            }
            None => out.push_str("{}"),
        }
        rest = &rest[idx + 2..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_step_is_its_own_value() {
        let sv = extract_step_value_and_params("open the home page", false).unwrap();
        assert_eq!(sv.value, "open the home page");
        assert_eq!(sv.parameterized, "open the home page");
        assert!(sv.args.is_empty());
    }

    #[test]
    fn static_and_dynamic_params_collapse_to_placeholders() {
        let sv = extract_step_value_and_params("login as \"sue\" with role <role>", false).unwrap();
        assert_eq!(sv.value, "login as {} with role {}");
        assert_eq!(sv.parameterized, "login as <sue> with role <role>");
        assert_eq!(sv.args, vec!["sue", "role"]);
    }

    #[test]
    fn inline_table_extends_the_signature() {
        let sv = extract_step_value_and_params("create users", true).unwrap();
        assert_eq!(sv.value, "create users {}");
        assert_eq!(sv.args, vec!["table"]);
    }

    #[test]
    fn steps_differing_only_in_literals_share_a_value() {
        let a = extract_step_value_and_params("login as \"sue\"", false).unwrap();
        let b = extract_step_value_and_params("login as \"bob\"", false).unwrap();
        assert_eq!(a.value, b.value);
        assert_ne!(a.args, b.args);
    }

    #[test]
    fn static_and_dynamic_call_styles_share_a_signature() {
        // One implementation serves both call styles, so the placeholder is
        // the same for literal and dynamic parameters.
        let literal = extract_step_value_and_params("login as \"sue\"", false).unwrap();
        let dynamic = extract_step_value_and_params("login as <name>", false).unwrap();
        assert_eq!(literal.value, "login as {}");
        assert_eq!(literal.value, dynamic.value);
    }

    #[test]
    fn unterminated_quote_is_an_error() {
        let err = extract_step_value_and_params("login as \"sue", false).unwrap_err();
        assert!(matches!(err, StepError::UnterminatedQuote(_)));
    }

    #[test]
    fn unclosed_dynamic_param_is_an_error() {
        let err = extract_step_value_and_params("login as <user", false).unwrap_err();
        assert!(matches!(err, StepError::UnclosedParam(_)));
    }
}
