//! Evaluating pass: statement fragments to an argument vector.

use crate::error::ShellError;
use crate::eval::{WordPart, split_word};
use crate::interpreter::Interpreter;
use crate::parser::{Fragment, Statement};
use log::trace;

/// Token being assembled plus the tokens finished so far.
///
/// Adjacent fragments land in the same buffer, so `foo"bar"baz` is one
/// token. Empty buffers are never flushed.
#[derive(Debug, Default)]
struct ExpressionState {
    buffer: String,
    tokens: Vec<String>,
}

impl ExpressionState {
    fn push(&mut self, text: &str) {
        self.buffer.push_str(text);
    }

    fn flush(&mut self) {
        if !self.buffer.is_empty() {
            self.tokens.push(std::mem::take(&mut self.buffer));
        }
    }

    fn finish(mut self) -> Vec<String> {
        self.flush();
        self.tokens
    }
}

/// Evaluate `statement` into `[command, args...]`.
///
/// The result is empty when every fragment expanded to nothing.
pub(crate) fn expand_statement(
    shell: &mut Interpreter,
    statement: &Statement,
) -> Result<Vec<String>, ShellError> {
    let mut state = ExpressionState::default();
    for fragment in &statement.fragments {
        match fragment {
            Fragment::Plain(text) | Fragment::Quoted(text) => {
                let text = substitute(shell, text)?;
                state.push(&text);
            }
            Fragment::Opaque(text) => state.push(text),
            Fragment::Space => state.flush(),
        }
    }
    let tokens = state.finish();
    trace!("expanded to {tokens:?}");
    Ok(tokens)
}

fn substitute(shell: &mut Interpreter, text: &str) -> Result<String, ShellError> {
    let mut out = String::with_capacity(text.len());
    for part in split_word(text) {
        match part {
            WordPart::Literal(literal) => out.push_str(&literal),
            WordPart::ParamSubst(expr) => {
                let value = shell
                    .evaluator()
                    .eval(&expr, shell.env())
                    .map_err(|err| ShellError::Evaluation {
                        fragment: format!("${{{expr}}}"),
                        source: err.into(),
                    })?;
                out.push_str(&value.to_string());
            }
            WordPart::CmdSubst(line) => match shell.substitute_command(&line) {
                Ok(captured) => out.push_str(&captured),
                Err(exit @ ShellError::Exit(_)) => return Err(exit),
                Err(err) => {
                    return Err(ShellError::Evaluation {
                        fragment: format!("$({line})"),
                        source: Box::new(err),
                    });
                }
            },
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::Kernel;
    use crate::parser::parse_line;
    use std::sync::Arc;

    fn expand(shell: &mut Interpreter, line: &str) -> Result<Vec<String>, ShellError> {
        let parsed = parse_line(line).unwrap();
        expand_statement(shell, &parsed.statements[0])
    }

    fn shell() -> Interpreter {
        let (shell, _out) = Interpreter::captured(Arc::new(Kernel::with_builtins().unwrap()));
        shell
    }

    #[test]
    fn test_adjacent_fragments_concatenate() {
        let mut sh = shell();
        assert_eq!(expand(&mut sh, r#"foo"bar"baz"#).unwrap(), ["foobarbaz"]);
        assert_eq!(
            expand(&mut sh, r#"foo "bar" baz"#).unwrap(),
            ["foo", "bar", "baz"]
        );
        assert_eq!(expand(&mut sh, "a'$X'b").unwrap(), ["a$Xb"]);
    }

    #[test]
    fn test_variables_substituted() {
        let mut sh = shell();
        sh.env_mut().set_var("WHO", "two words");
        assert_eq!(
            expand(&mut sh, r#"echo $WHO "<${WHO}>""#).unwrap(),
            ["echo", "two words", "<two words>"]
        );
    }

    #[test]
    fn test_empty_tokens_dropped() {
        let mut sh = shell();
        assert_eq!(expand(&mut sh, "echo $UNSET x").unwrap(), ["echo", "x"]);
        assert!(expand(&mut sh, "$UNSET").unwrap().is_empty());
    }

    #[test]
    fn test_command_substitution_uses_output() {
        let mut sh = shell();
        assert_eq!(expand(&mut sh, "x$(echo hi)y").unwrap(), ["xhiy"]);
        // nothing written: the result value is used
        assert_eq!(expand(&mut sh, "$(pwd)").unwrap(), ["/"]);
    }

    #[test]
    fn test_quoted_close_paren_in_substitution() {
        let mut sh = shell();
        assert_eq!(
            expand(&mut sh, r#"echo $(echo ")")"#).unwrap(),
            ["echo", ")"]
        );
        assert_eq!(expand(&mut sh, r#""$(echo 'a)b')""#).unwrap(), ["a)b"]);
    }

    #[test]
    fn test_substitution_failure_is_evaluation_error() {
        let mut sh = shell();
        let err = expand(&mut sh, "echo ${X:?missing}").unwrap_err();
        assert!(
            matches!(&err, ShellError::Evaluation { fragment, .. } if fragment == "${X:?missing}")
        );
        let err = expand(&mut sh, "echo $(nope)").unwrap_err();
        assert!(matches!(&err, ShellError::Evaluation { fragment, .. } if fragment == "$(nope)"));
    }

    #[test]
    fn test_exit_inside_substitution_passes_through() {
        let mut sh = shell();
        let err = expand(&mut sh, "echo $(exit 4)").unwrap_err();
        assert_eq!(err.exit_code(), Some(4));
    }
}
