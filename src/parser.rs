use crate::lexer::{self, LexingError, Token};

/// One piece of an argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    /// Bare text; substitutions are evaluated.
    Plain(String),
    /// Double-quoted text; substitutions are evaluated, blanks are kept.
    Quoted(String),
    /// Verbatim text.
    Opaque(String),
    /// Argument boundary.
    Space,
}

/// A single command invocation: the fragments between two separators.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Statement {
    pub fragments: Vec<Fragment>,
}

/// Parsed form of a whole input line.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Line {
    pub statements: Vec<Statement>,
}

impl Line {
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

struct AstBuilder {
    tokens: Vec<Token>,
    pos: usize,
}

impl AstBuilder {
    fn from(tokens: Vec<Token>) -> Self {
        AstBuilder { tokens, pos: 0 }
    }

    fn build_ast(mut self) -> Line {
        let mut statements = Vec::new();
        while self.peek().is_some() {
            if let Some(statement) = self.parse_statement() {
                statements.push(statement);
            }
        }
        Line { statements }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn consume(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    /// Parse fragments up to and including the next separator.
    ///
    /// Returns `None` for a statement made only of blanks, e.g. in `a;;b`.
    fn parse_statement(&mut self) -> Option<Statement> {
        let mut fragments = Vec::new();
        while let Some(token) = self.consume() {
            let fragment = match token {
                Token::Separator => break,
                Token::Plain(s) => Fragment::Plain(s),
                Token::Quoted(s) => Fragment::Quoted(s),
                Token::Opaque(s) => Fragment::Opaque(s),
                Token::Space => Fragment::Space,
            };
            fragments.push(fragment);
        }

        while fragments.last() == Some(&Fragment::Space) {
            fragments.pop();
        }
        if fragments.first() == Some(&Fragment::Space) {
            fragments.remove(0);
        }

        if fragments.is_empty() {
            None
        } else {
            Some(Statement { fragments })
        }
    }
}

/// Build the statement list from lexer tokens.
pub fn construct_ast(tokens: Vec<Token>) -> Line {
    AstBuilder::from(tokens).build_ast()
}

/// Tokenize and parse `line` in one step.
pub fn parse_line(line: &str) -> Result<Line, LexingError> {
    let tokens = lexer::split_into_tokens(line)?;
    Ok(construct_ast(tokens))
}
