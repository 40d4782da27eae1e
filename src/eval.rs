//! Embedded expressions: `$name` and `${...}`.

use crate::env::Environment;
use crate::value::Value;
use anyhow::{Result, anyhow, bail};
use regex::Regex;
use std::sync::LazyLock;

static EXPRESSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)(?:(:-|:\?)(.*))?$").expect("valid expression regex")
});

/// Evaluates the text of an embedded expression.
///
/// The interpreter only stringifies what comes back.
pub trait Evaluator: Send + Sync {
    fn eval(&self, expression: &str, env: &Environment) -> Result<Value>;
}

/// Default evaluator over session variables.
///
/// Supported forms:
/// - `name`: the variable, or null when unset;
/// - `name:-fallback`: `fallback` when the variable is unset or empty;
/// - `name:?message`: fail with `message` when unset or empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct VariableEvaluator;

impl Evaluator for VariableEvaluator {
    fn eval(&self, expression: &str, env: &Environment) -> Result<Value> {
        let caps = EXPRESSION
            .captures(expression.trim())
            .ok_or_else(|| anyhow!("bad substitution: {expression}"))?;
        let name = &caps[1];
        let value = env.get_var(name).filter(|v| !v.is_empty());

        match (caps.get(2).map(|m| m.as_str()), value) {
            (_, Some(v)) => Ok(Value::from(v)),
            (Some(":-"), None) => Ok(Value::from(caps.get(3).map_or("", |m| m.as_str()))),
            (Some(":?"), None) => {
                let message = caps.get(3).map_or("", |m| m.as_str());
                if message.is_empty() {
                    bail!("{name}: parameter not set")
                }
                bail!("{name}: {message}")
            }
            (_, None) => match env.get_var(name) {
                Some(empty) => Ok(Value::from(empty)),
                None => Ok(Value::Null),
            },
        }
    }
}

/// Piece of an argument fragment, split at substitution boundaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum WordPart {
    Literal(String),
    /// `$(...)`: the inner command line.
    CmdSubst(String),
    /// `$name` or `${...}`: the expression text.
    ParamSubst(String),
}

/// Split fragment text into literal and substitution parts.
///
/// The lexer already guarantees `$(` and `${` are balanced. A `$` not
/// followed by a name or an opening bracket is literal.
pub(crate) fn split_word(text: &str) -> Vec<WordPart> {
    let chars: Vec<char> = text.chars().collect();
    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        if ch != '$' {
            literal.push(ch);
            i += 1;
            continue;
        }
        match chars.get(i + 1) {
            Some(&open @ ('(' | '{')) => {
                let close = if open == '(' { ')' } else { '}' };
                let Some(end) = matching(&chars, i + 1, open, close) else {
                    literal.extend(&chars[i..]);
                    break;
                };
                if !literal.is_empty() {
                    parts.push(WordPart::Literal(std::mem::take(&mut literal)));
                }
                let inner: String = chars[i + 2..end].iter().collect();
                parts.push(if open == '(' {
                    WordPart::CmdSubst(inner)
                } else {
                    WordPart::ParamSubst(inner)
                });
                i = end + 1;
            }
            Some(&c) if c.is_ascii_alphabetic() || c == '_' => {
                if !literal.is_empty() {
                    parts.push(WordPart::Literal(std::mem::take(&mut literal)));
                }
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && (chars[end].is_ascii_alphanumeric() || chars[end] == '_')
                {
                    end += 1;
                }
                parts.push(WordPart::ParamSubst(chars[start..end].iter().collect()));
                i = end;
            }
            _ => {
                literal.push('$');
                i += 1;
            }
        }
    }

    if !literal.is_empty() {
        parts.push(WordPart::Literal(literal));
    }
    parts
}

/// Index of the bracket closing the one at `open_at`. Within `$(...)`,
/// brackets inside quotes or after a backslash do not count.
fn matching(chars: &[char], open_at: usize, open: char, close: char) -> Option<usize> {
    let quoting = open == '(';
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut i = open_at;
    while i < chars.len() {
        let c = chars[i];
        match quote {
            Some(q) if c == q => quote = None,
            Some('"') if c == '\\' => i += 1,
            Some(_) => {}
            None if quoting && (c == '\'' || c == '"') => quote = Some(c),
            None if quoting && c == '\\' => i += 1,
            None if c == open => depth += 1,
            None if c == close => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            None => {}
        }
        i += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> Environment {
        let mut env = Environment::new();
        env.set_var("NAME", "world");
        env.set_var("EMPTY", "");
        env
    }

    #[test]
    fn test_variable_lookup() {
        let ev = VariableEvaluator;
        assert_eq!(ev.eval("NAME", &env()).unwrap(), Value::from("world"));
        assert_eq!(ev.eval("MISSING", &env()).unwrap(), Value::Null);
        assert_eq!(ev.eval("EMPTY", &env()).unwrap(), Value::from(""));
    }

    #[test]
    fn test_fallback_and_required() {
        let ev = VariableEvaluator;
        assert_eq!(ev.eval("MISSING:-x y", &env()).unwrap(), Value::from("x y"));
        assert_eq!(ev.eval("EMPTY:-d", &env()).unwrap(), Value::from("d"));
        assert_eq!(ev.eval("NAME:-d", &env()).unwrap(), Value::from("world"));

        let err = ev.eval("MISSING:?must be set", &env()).unwrap_err();
        assert_eq!(err.to_string(), "MISSING: must be set");
        assert!(ev.eval("MISSING:?", &env()).is_err());
    }

    #[test]
    fn test_bad_expression() {
        let err = VariableEvaluator.eval("1abc", &env()).unwrap_err();
        assert!(err.to_string().contains("bad substitution"));
    }

    #[test]
    fn test_split_word() {
        assert_eq!(
            split_word("a$NAME-${X:-y}$(echo (z))$"),
            vec![
                WordPart::Literal("a".to_string()),
                WordPart::ParamSubst("NAME".to_string()),
                WordPart::Literal("-".to_string()),
                WordPart::ParamSubst("X:-y".to_string()),
                WordPart::CmdSubst("echo (z)".to_string()),
                WordPart::Literal("$".to_string()),
            ]
        );
        assert_eq!(split_word("$1"), vec![WordPart::Literal("$1".to_string())]);
        assert_eq!(
            split_word(r#"<$(echo ")" '(')>"#),
            vec![
                WordPart::Literal("<".to_string()),
                WordPart::CmdSubst(r#"echo ")" '('"#.to_string()),
                WordPart::Literal(">".to_string()),
            ]
        );
        assert!(split_word("").is_empty());
    }
}
