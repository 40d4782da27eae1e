//! Lexical analysis of one command line into argument fragments.
//!
//! Fragments are kept as raw text; substitution happens later, during
//! evaluation. Adjacent fragments with no [`Token::Space`] between them form
//! a single argument.

use log::trace;
use thiserror::Error;

/// A token produced by the lexer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Bare text, subject to substitution.
    Plain(String),
    /// Text from inside double quotes, subject to substitution. Whitespace
    /// inside does not split the argument.
    Quoted(String),
    /// Text passed through verbatim: single-quoted text, backslash escapes
    /// and operator characters the interpreter does not implement itself.
    Opaque(String),
    /// A run of blanks separating arguments.
    Space,
    /// Statement separator, `;` or a newline.
    Separator,
}

/// Errors that can occur during lexical analysis.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LexingError {
    /// A closing quote (single or double) was not found.
    #[error("unterminated quote")]
    UnfinishedQuote,
    /// A closing parenthesis for command substitution `$(...)` was not found.
    #[error("unterminated command substitution")]
    UnfinishedCmdSubst,
    /// A closing brace for parameter substitution `${...}` was not found.
    #[error("unterminated parameter substitution")]
    UnfinishedParamSubst,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexingState {
    /// At the start of an argument: after blanks, a separator or the line start.
    Start,
    ReadingPlain,
    ReadingSingleQuote,
    ReadingDoubleQuote,
    ReadingComment,
}

struct LexingFSM {
    input: Vec<char>,
    pos: usize,
    state: LexingState,
    buffer: String,
    out: Vec<Token>,
}

impl LexingFSM {
    fn new(line: &str) -> Self {
        LexingFSM {
            input: line.chars().collect(),
            pos: 0,
            state: LexingState::Start,
            buffer: String::new(),
            out: Vec::new(),
        }
    }

    fn make_tokens(mut self) -> Result<Vec<Token>, LexingError> {
        while let Some(ch) = self.read_char() {
            match self.state {
                LexingState::Start | LexingState::ReadingPlain => self.handle_unquoted(ch)?,
                LexingState::ReadingSingleQuote => self.handle_single_quote(ch),
                LexingState::ReadingDoubleQuote => self.handle_double_quote(ch)?,
                LexingState::ReadingComment => self.handle_comment(ch),
            }
        }

        if matches!(
            self.state,
            LexingState::ReadingSingleQuote | LexingState::ReadingDoubleQuote
        ) {
            return Err(LexingError::UnfinishedQuote);
        }

        self.flush_plain();
        trace!("lexed {} tokens", self.out.len());
        Ok(self.out)
    }

    fn read_char(&mut self) -> Option<char> {
        let ch = self.input.get(self.pos).copied();
        if ch.is_some() {
            self.pos += 1;
        }
        ch
    }

    fn peek_char(&self) -> Option<char> {
        self.input.get(self.pos).copied()
    }

    fn handle_unquoted(&mut self, ch: char) -> Result<(), LexingError> {
        match ch {
            ' ' | '\t' | '\r' => {
                self.flush_plain();
                self.push_space();
                self.state = LexingState::Start;
            }
            ';' | '\n' => {
                self.flush_plain();
                self.out.push(Token::Separator);
                self.state = LexingState::Start;
            }
            '#' if self.state == LexingState::Start => self.state = LexingState::ReadingComment,
            '\'' => {
                self.flush_plain();
                self.state = LexingState::ReadingSingleQuote;
            }
            '"' => {
                self.flush_plain();
                self.state = LexingState::ReadingDoubleQuote;
            }
            '\\' => {
                self.flush_plain();
                match self.read_char() {
                    // line continuation
                    Some('\n') => {}
                    Some(c) => self.out.push(Token::Opaque(c.to_string())),
                    None => self.out.push(Token::Opaque("\\".to_string())),
                }
                self.state = LexingState::ReadingPlain;
            }
            '|' | '&' | '<' | '>' => {
                self.flush_plain();
                self.out.push(Token::Opaque(ch.to_string()));
                self.state = LexingState::ReadingPlain;
            }
            '$' => {
                self.read_dollar();
                self.state = LexingState::ReadingPlain;
                return self.read_substitution_body();
            }
            c => {
                self.buffer.push(c);
                self.state = LexingState::ReadingPlain;
            }
        }
        Ok(())
    }

    fn handle_single_quote(&mut self, ch: char) {
        match ch {
            '\'' => {
                self.out
                    .push(Token::Opaque(std::mem::take(&mut self.buffer)));
                self.state = LexingState::ReadingPlain;
            }
            c => self.buffer.push(c),
        }
    }

    fn handle_double_quote(&mut self, ch: char) -> Result<(), LexingError> {
        match ch {
            '"' => {
                self.out
                    .push(Token::Quoted(std::mem::take(&mut self.buffer)));
                self.state = LexingState::ReadingPlain;
            }
            '\\' => match self.peek_char() {
                Some(c @ ('"' | '\\' | '$' | '`')) => {
                    self.read_char();
                    if !self.buffer.is_empty() {
                        self.out
                            .push(Token::Quoted(std::mem::take(&mut self.buffer)));
                    }
                    self.out.push(Token::Opaque(c.to_string()));
                }
                _ => self.buffer.push('\\'),
            },
            '$' => {
                self.read_dollar();
                self.read_substitution_body()?;
            }
            c => self.buffer.push(c),
        }
        Ok(())
    }

    fn handle_comment(&mut self, ch: char) {
        if ch == '\n' {
            self.out.push(Token::Separator);
            self.state = LexingState::Start;
        }
    }

    fn read_dollar(&mut self) {
        self.buffer.push('$');
    }

    /// After a `$`, copy a `(...)` or `{...}` body verbatim into the buffer so
    /// that blanks inside it do not split the argument.
    fn read_substitution_body(&mut self) -> Result<(), LexingError> {
        match self.peek_char() {
            Some('(') => {
                self.read_char();
                let body = self.collect_nested('(', ')', LexingError::UnfinishedCmdSubst)?;
                self.buffer.push('(');
                self.buffer.push_str(&body);
                self.buffer.push(')');
            }
            Some('{') => {
                self.read_char();
                let body = self.collect_nested('{', '}', LexingError::UnfinishedParamSubst)?;
                self.buffer.push('{');
                self.buffer.push_str(&body);
                self.buffer.push('}');
            }
            _ => {}
        }
        Ok(())
    }

    /// Collects characters up to the matching `close`, tracking nesting depth.
    ///
    /// Inside a `$(...)` body, quoted text and backslash escapes are copied
    /// without counting brackets.
    fn collect_nested(
        &mut self,
        open: char,
        close: char,
        unfinished: LexingError,
    ) -> Result<String, LexingError> {
        let quoting = open == '(';
        let mut depth = 1usize;
        let mut quote: Option<char> = None;
        let mut s = String::new();
        while let Some(ch) = self.read_char() {
            match quote {
                Some(q) if ch == q => quote = None,
                Some('"') | None if quoting && ch == '\\' => {
                    s.push(ch);
                    match self.read_char() {
                        Some(next) => s.push(next),
                        None => break,
                    }
                    continue;
                }
                Some(_) => {}
                None if quoting && (ch == '\'' || ch == '"') => quote = Some(ch),
                None if ch == open => depth += 1,
                None if ch == close => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(s);
                    }
                }
                None => {}
            }
            s.push(ch);
        }
        Err(unfinished)
    }

    fn flush_plain(&mut self) {
        if !self.buffer.is_empty() {
            self.out.push(Token::Plain(std::mem::take(&mut self.buffer)));
        }
    }

    fn push_space(&mut self) {
        match self.out.last() {
            None | Some(Token::Space) | Some(Token::Separator) => {}
            Some(_) => self.out.push(Token::Space),
        }
    }
}

/// Tokenize a command line.
///
/// # Returns
/// A vector of tokens on success, or a [`LexingError`] if a quote or
/// substitution is left open.
pub fn split_into_tokens(line: &str) -> Result<Vec<Token>, LexingError> {
    LexingFSM::new(line).make_tokens()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(s: &str) -> Token {
        Token::Plain(s.to_string())
    }

    #[test]
    fn test_adjacent_fragments_without_space() {
        let tokens = split_into_tokens(r#"foo"bar"baz"#).unwrap();
        assert_eq!(
            tokens,
            vec![plain("foo"), Token::Quoted("bar".to_string()), plain("baz")]
        );
    }

    #[test]
    fn test_blanks_become_single_space() {
        let tokens = split_into_tokens("  foo   \"bar\"\tbaz  ").unwrap();
        assert_eq!(
            tokens,
            vec![
                plain("foo"),
                Token::Space,
                Token::Quoted("bar".to_string()),
                Token::Space,
                plain("baz"),
                Token::Space,
            ]
        );
    }

    #[test]
    fn test_single_quotes_are_opaque() {
        let tokens = split_into_tokens("echo '$HOME x'").unwrap();
        assert_eq!(
            tokens,
            vec![plain("echo"), Token::Space, Token::Opaque("$HOME x".to_string())]
        );
    }

    #[test]
    fn test_separators_and_comments() {
        let tokens = split_into_tokens("a;b # trailing comment\nc").unwrap();
        assert_eq!(
            tokens,
            vec![
                plain("a"),
                Token::Separator,
                plain("b"),
                Token::Space,
                Token::Separator,
                plain("c"),
            ]
        );
    }

    #[test]
    fn test_hash_inside_word_is_text() {
        let tokens = split_into_tokens("a#b").unwrap();
        assert_eq!(tokens, vec![plain("a#b")]);
    }

    #[test]
    fn test_substitution_bodies_keep_blanks() {
        let tokens = split_into_tokens("echo $(echo (a b)) ${x:-y z}").unwrap();
        assert_eq!(
            tokens,
            vec![
                plain("echo"),
                Token::Space,
                plain("$(echo (a b))"),
                Token::Space,
                plain("${x:-y z}"),
            ]
        );
    }

    #[test]
    fn test_quoted_brackets_inside_command_substitution() {
        let tokens = split_into_tokens(r#"echo $(echo ")") "$(echo 'a)b')""#).unwrap();
        assert_eq!(
            tokens,
            vec![
                plain("echo"),
                Token::Space,
                plain(r#"$(echo ")")"#),
                Token::Space,
                Token::Quoted("$(echo 'a)b')".to_string()),
            ]
        );
        assert_eq!(
            split_into_tokens(r#"echo $(echo ")"#),
            Err(LexingError::UnfinishedCmdSubst)
        );
    }

    #[test]
    fn test_escapes_are_opaque() {
        let tokens = split_into_tokens(r#"a\$b "x\"y""#).unwrap();
        assert_eq!(
            tokens,
            vec![
                plain("a"),
                Token::Opaque("$".to_string()),
                plain("b"),
                Token::Space,
                Token::Quoted("x".to_string()),
                Token::Opaque("\"".to_string()),
                Token::Quoted("y".to_string()),
            ]
        );
    }

    #[test]
    fn test_operators_pass_through() {
        let tokens = split_into_tokens("a > b").unwrap();
        assert_eq!(
            tokens,
            vec![plain("a"), Token::Space, Token::Opaque(">".to_string()), Token::Space, plain("b")]
        );
    }

    #[test]
    fn test_unfinished_constructs() {
        assert_eq!(split_into_tokens("echo \"abc"), Err(LexingError::UnfinishedQuote));
        assert_eq!(split_into_tokens("echo 'abc"), Err(LexingError::UnfinishedQuote));
        assert_eq!(split_into_tokens("echo $(ls"), Err(LexingError::UnfinishedCmdSubst));
        assert_eq!(split_into_tokens("echo ${x"), Err(LexingError::UnfinishedParamSubst));
    }
}
