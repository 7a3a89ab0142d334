//! The tag-expression language.
//!
//! Scenarios are selected with boolean expressions over tag names:
//! `smoke & !wip`, `(a | b) & !c`. Accepted operator spellings are `&`,
//! `&&` or `,` for conjunction, `|` or `||` for disjunction, `!` for
//! negation, and parentheses for grouping. Whitespace is insignificant.
//!
//! Expressions are normalised, tokenised over the canonical operator set
//! `{& | ! ( )}`, and parsed once into a small AST with the usual
//! precedence (`!` over `&` over `|`). Evaluation walks the AST against a
//! tag-membership predicate, so operands are always matched as whole
//! tokens: a tag named `long` can never shadow `longer`, and tags spelled
//! `true` or `false` are ordinary operands.

use std::collections::HashSet;

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ExpressionError {
    #[error("invalid tag expression: {0}")]
    Invalid(String),
}

/// Normalise a raw expression: strip all whitespace, rewrite `,` to `&`,
/// and collapse runs of `&` / `|` (which also maps `&&` and `||` to their
/// single-character forms). Idempotent.
pub fn normalise(expression: &str) -> String {
    let mut out = String::with_capacity(expression.len());
    for c in expression.chars() {
        let c = if c == ',' { '&' } else { c };
        if c.is_whitespace() {
            continue;
        }
        if (c == '&' || c == '|') && out.ends_with(c) {
            continue;
        }
        out.push(c);
    }
    out
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    And,
    Or,
    Not,
    Open,
    Close,
    Tag(String),
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::And => "'&'".into(),
            Token::Or => "'|'".into(),
            Token::Not => "'!'".into(),
            Token::Open => "'('".into(),
            Token::Close => "')'".into(),
            Token::Tag(t) => format!("'{t}'"),
        }
    }
}

fn tokenise(normalised: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut operand = String::new();
    for c in normalised.chars() {
        let op = match c {
            '&' => Some(Token::And),
            '|' => Some(Token::Or),
            '!' => Some(Token::Not),
            '(' => Some(Token::Open),
            ')' => Some(Token::Close),
            _ => None,
        };
        match op {
            Some(token) => {
                if !operand.is_empty() {
                    tokens.push(Token::Tag(std::mem::take(&mut operand)));
                }
                tokens.push(token);
            }
            None => operand.push(c),
        }
    }
    if !operand.is_empty() {
        tokens.push(Token::Tag(operand));
    }
    tokens
}

#[derive(Debug, Clone, PartialEq)]
enum Ast {
    Tag(String),
    Not(Box<Ast>),
    And(Box<Ast>, Box<Ast>),
    Or(Box<Ast>, Box<Ast>),
}

impl Ast {
    fn eval(&self, is_present: &dyn Fn(&str) -> bool) -> bool {
        match self {
            Ast::Tag(tag) => is_present(tag),
            Ast::Not(inner) => !inner.eval(is_present),
            Ast::And(lhs, rhs) => lhs.eval(is_present) && rhs.eval(is_present),
            Ast::Or(lhs, rhs) => lhs.eval(is_present) || rhs.eval(is_present),
        }
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expression(&mut self) -> Result<Ast, ExpressionError> {
        let mut lhs = self.conjunction()?;
        while matches!(self.peek(), Some(Token::Or)) {
            self.next();
            let rhs = self.conjunction()?;
            lhs = Ast::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn conjunction(&mut self) -> Result<Ast, ExpressionError> {
        let mut lhs = self.unary()?;
        while matches!(self.peek(), Some(Token::And)) {
            self.next();
            let rhs = self.unary()?;
            lhs = Ast::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Ast, ExpressionError> {
        match self.next() {
            Some(Token::Not) => Ok(Ast::Not(Box::new(self.unary()?))),
            Some(Token::Open) => {
                let inner = self.expression()?;
                match self.next() {
                    Some(Token::Close) => Ok(inner),
                    Some(token) => Err(ExpressionError::Invalid(format!(
                        "expected ')', found {}",
                        token.describe()
                    ))),
                    None => Err(ExpressionError::Invalid("unbalanced '('".into())),
                }
            }
            Some(Token::Tag(tag)) => Ok(Ast::Tag(tag)),
            Some(token) => Err(ExpressionError::Invalid(format!(
                "expected a tag, found {}",
                token.describe()
            ))),
            None => Err(ExpressionError::Invalid(
                "expected a tag, found end of expression".into(),
            )),
        }
    }
}

/// A parsed tag expression.
///
/// The empty expression is valid and accepts every tag set.
#[derive(Debug, Clone, PartialEq)]
pub struct TagExpression {
    source: String,
    ast: Option<Ast>,
}

impl TagExpression {
    /// Parse an expression, normalising first. Fails with
    /// [`ExpressionError::Invalid`] on any syntactically malformed input
    /// (dangling operators, unbalanced parentheses, empty operand slots).
    pub fn parse(expression: &str) -> Result<Self, ExpressionError> {
        let normalised = normalise(expression);
        if normalised.is_empty() {
            return Ok(TagExpression {
                source: expression.to_string(),
                ast: None,
            });
        }
        let mut parser = Parser {
            tokens: tokenise(&normalised),
            pos: 0,
        };
        let ast = parser.expression()?;
        if let Some(trailing) = parser.next() {
            return Err(ExpressionError::Invalid(format!(
                "unexpected {} after expression",
                trailing.describe()
            )));
        }
        Ok(TagExpression {
            source: expression.to_string(),
            ast: Some(ast),
        })
    }

    /// Check an expression for well-formedness without evaluating it
    /// against a real tag set.
    pub fn validate(expression: &str) -> Result<(), ExpressionError> {
        Self::parse(expression).map(|_| ())
    }

    /// Evaluate against a set of present tags.
    ///
    /// Tags are compared with all whitespace stripped on both sides, so a
    /// scenario tagged `slow suite` matches the operand `slowsuite`.
    pub fn evaluate(&self, present_tags: &HashSet<String>) -> bool {
        let stripped: HashSet<String> = present_tags
            .iter()
            .map(|t| t.chars().filter(|c| !c.is_whitespace()).collect())
            .collect();
        self.eval_with(&|tag| stripped.contains(tag))
    }

    /// Evaluate against an arbitrary membership predicate.
    pub fn eval_with(&self, is_present: &dyn Fn(&str) -> bool) -> bool {
        match &self.ast {
            Some(ast) => ast.eval(is_present),
            None => true,
        }
    }

    /// The expression as originally written.
    pub fn source(&self) -> &str {
        &self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags<const N: usize>(values: [&str; N]) -> HashSet<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn eval(expression: &str, present: &HashSet<String>) -> bool {
        TagExpression::parse(expression).unwrap().evaluate(present)
    }

    #[test]
    fn normalise_strips_whitespace_and_aliases() {
        assert_eq!(normalise(" a && b "), "a&b");
        assert_eq!(normalise("a || b"), "a|b");
        assert_eq!(normalise("a, b"), "a&b");
        assert_eq!(normalise("a &, b"), "a&b");
    }

    #[test]
    fn normalise_is_idempotent() {
        for raw in ["a && b", "a ,|, b", "!( a || b )", "tag one & tag two"] {
            let once = normalise(raw);
            assert_eq!(normalise(&once), once, "for input {raw:?}");
        }
    }

    #[test]
    fn empty_expression_accepts_everything() {
        assert!(eval("", &tags(["anything"])));
        assert!(eval("   ", &tags([])));
    }

    #[test]
    fn conjunction_requires_all_tags() {
        assert!(eval("smoke & !wip", &tags(["smoke"])));
        assert!(!eval("smoke & !wip", &tags(["smoke", "wip"])));
    }

    #[test]
    fn comma_reads_as_conjunction() {
        assert!(eval("a, b", &tags(["a", "b"])));
        assert!(!eval("a, b", &tags(["a"])));
    }

    #[test]
    fn negated_group() {
        assert!(eval("!(a | b)", &tags(["c"])));
        assert!(!eval("!(a | b)", &tags(["a"])));
    }

    #[test]
    fn and_or_are_commutative() {
        for present in [tags(["a"]), tags(["b"]), tags(["a", "b"]), tags([])] {
            assert_eq!(eval("a & b", &present), eval("b & a", &present));
            assert_eq!(eval("a | b", &present), eval("b | a", &present));
        }
    }

    #[test]
    fn de_morgan_holds() {
        for present in [tags(["a"]), tags(["b"]), tags(["a", "b"]), tags([])] {
            assert_eq!(eval("!(a & b)", &present), eval("!a | !b", &present));
            assert_eq!(eval("!(a | b)", &present), eval("!a & !b", &present));
        }
    }

    #[test]
    fn operands_never_shadow_their_prefixes() {
        let present = tags(["longer"]);
        assert!(!eval("long & longer", &present));
        assert!(eval("longer", &present));
        assert!(!eval("long", &present));
    }

    #[test]
    fn tags_named_true_or_false_are_ordinary_operands() {
        assert!(eval("true", &tags(["true"])));
        assert!(!eval("true", &tags(["a"])));
        assert!(eval("!false", &tags([])));
    }

    #[test]
    fn precedence_binds_not_then_and_then_or() {
        // a | b & c  ==  a | (b & c)
        assert!(eval("a | b & c", &tags(["a"])));
        assert!(!eval("a | b & c", &tags(["b"])));
        // !a & b  ==  (!a) & b
        assert!(eval("!a & b", &tags(["b"])));
    }

    #[test]
    fn tags_with_inner_spaces_match_stripped() {
        assert!(eval("slowsuite", &tags(["slow suite"])));
        assert!(eval("slow suite", &tags(["slowsuite"])));
    }

    #[test]
    fn malformed_expressions_fail_validation() {
        for bad in ["&", "a &", "& a", "(a", "a)", "!(a", "a !b", "()"] {
            assert!(
                TagExpression::validate(bad).is_err(),
                "expected {bad:?} to be rejected"
            );
        }
    }

    #[test]
    fn double_operators_collapse_before_parsing() {
        // `a | | b` is malformed, but `a || b` is the disjunction alias.
        assert!(TagExpression::validate("a || b").is_ok());
        assert!(TagExpression::validate("a && b").is_ok());
    }
}
