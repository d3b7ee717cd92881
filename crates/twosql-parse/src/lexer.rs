//! Template tokenizer
//!
//! Produces the raw token stream the pipeline operates on. Directives are
//! block comments with a recognized head: `/*= expr */` and `/*$ expr */`
//! substitute values, `/* IF */`, `/* ELSEIF */`, `/* ELSE */`, `/* END */`,
//! and `/* FOR var : xs */` control structure. Any other comment is carried
//! through untouched.

use regex::Regex;
use std::sync::OnceLock;
use twosql_core::{DirectiveKind, DirectiveMetadata, SourcePos, Token, TokenKind};

/// Tokenization error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LexError {
    #[error("unterminated block comment starting at line {line}, column {column}")]
    UnterminatedComment { line: usize, column: usize },

    #[error("unterminated string literal starting at line {line}, column {column}")]
    UnterminatedString { line: usize, column: usize },

    #[error("unterminated quoted identifier starting at line {line}, column {column}")]
    UnterminatedIdentifier { line: usize, column: usize },
}

impl LexError {
    /// Line/column the error points at
    pub fn position(&self) -> (usize, usize) {
        match self {
            Self::UnterminatedComment { line, column }
            | Self::UnterminatedString { line, column }
            | Self::UnterminatedIdentifier { line, column } => (*line, *column),
        }
    }
}

/// Tokenize template source into a directive-annotated token stream
pub fn tokenize(source: &str) -> Result<Vec<Token>, LexError> {
    Lexer {
        src: source,
        offset: 0,
        line: 1,
        column: 1,
    }
    .run()
}

fn directive_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?is)^\s*(IF|ELSEIF|ELSE|END|FOR)\b(.*)$").expect("directive pattern is valid")
    })
}

struct Lexer<'a> {
    src: &'a str,
    offset: usize,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    fn rest(&self) -> &'a str {
        &self.src[self.offset..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn pos(&self) -> SourcePos {
        SourcePos::new(self.line, self.column, self.offset)
    }

    /// Consume `len` bytes (must end on a char boundary) and return them
    fn advance(&mut self, len: usize) -> &'a str {
        let taken = &self.src[self.offset..self.offset + len];
        for ch in taken.chars() {
            if ch == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        self.offset += len;
        taken
    }

    fn run(mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();

        while let Some(ch) = self.peek() {
            let pos = self.pos();

            let token = if ch.is_whitespace() {
                let len = prefix_len(self.rest(), |c| c.is_whitespace());
                Token::new(TokenKind::Whitespace, self.advance(len), pos)
            } else if self.rest().starts_with("--") {
                let len = self.rest().find('\n').unwrap_or(self.rest().len());
                Token::new(TokenKind::Comment, self.advance(len), pos)
            } else if self.rest().starts_with("/*") {
                self.block_comment(pos)?
            } else if ch == '\'' {
                self.string_literal(pos)?
            } else if ch == '"' {
                self.quoted_identifier(pos)?
            } else if ch.is_ascii_digit() {
                let len = number_len(self.rest());
                Token::new(TokenKind::Number, self.advance(len), pos)
            } else if ch.is_alphabetic() || ch == '_' {
                let len = prefix_len(self.rest(), |c| c.is_alphanumeric() || c == '_');
                Token::new(TokenKind::Word, self.advance(len), pos)
            } else {
                match ch {
                    ',' => Token::new(TokenKind::Comma, self.advance(1), pos),
                    '(' => Token::new(TokenKind::OpenParen, self.advance(1), pos),
                    ')' => Token::new(TokenKind::CloseParen, self.advance(1), pos),
                    ';' => Token::new(TokenKind::Semicolon, self.advance(1), pos),
                    _ => {
                        let len = operator_len(self.rest());
                        Token::new(TokenKind::Operator, self.advance(len), pos)
                    }
                }
            };

            tokens.push(token);
        }

        Ok(tokens)
    }

    fn block_comment(&mut self, pos: SourcePos) -> Result<Token, LexError> {
        let end = self.rest().find("*/").ok_or(LexError::UnterminatedComment {
            line: pos.line,
            column: pos.column,
        })?;

        let text = self.advance(end + 2).to_string();
        let body = &text[2..text.len() - 2];

        Ok(match classify_directive(body) {
            Some(metadata) => Token::directive(text, pos, metadata),
            None => Token::new(TokenKind::Comment, text, pos),
        })
    }

    fn string_literal(&mut self, pos: SourcePos) -> Result<Token, LexError> {
        let rest = self.rest();
        let bytes = rest.as_bytes();
        let mut i = 1;

        loop {
            match bytes.get(i) {
                None => {
                    return Err(LexError::UnterminatedString {
                        line: pos.line,
                        column: pos.column,
                    })
                }
                Some(b'\'') => {
                    // '' is an escaped quote inside the literal
                    if bytes.get(i + 1) == Some(&b'\'') {
                        i += 2;
                    } else {
                        i += 1;
                        break;
                    }
                }
                Some(_) => {
                    let ch_len = rest[i..].chars().next().map(|c| c.len_utf8()).unwrap_or(1);
                    i += ch_len;
                }
            }
        }

        Ok(Token::new(TokenKind::QuotedString, self.advance(i), pos))
    }

    fn quoted_identifier(&mut self, pos: SourcePos) -> Result<Token, LexError> {
        let rest = self.rest();
        let end = rest[1..].find('"').ok_or(LexError::UnterminatedIdentifier {
            line: pos.line,
            column: pos.column,
        })?;

        Ok(Token::new(TokenKind::Word, self.advance(end + 2), pos))
    }
}

/// Classify a block comment body as a directive, if it is one
fn classify_directive(body: &str) -> Option<DirectiveMetadata> {
    if let Some(expr) = body.strip_prefix('=') {
        return Some(DirectiveMetadata::new(DirectiveKind::Variable, expr.trim()));
    }
    if let Some(expr) = body.strip_prefix('$') {
        return Some(DirectiveMetadata::new(DirectiveKind::Const, expr.trim()));
    }

    let captures = directive_pattern().captures(body)?;
    let kind = match captures.get(1)?.as_str().to_ascii_uppercase().as_str() {
        "IF" => DirectiveKind::If,
        "ELSEIF" => DirectiveKind::ElseIf,
        "ELSE" => DirectiveKind::Else,
        "END" => DirectiveKind::End,
        "FOR" => DirectiveKind::For,
        _ => return None,
    };
    let expr = captures.get(2).map(|m| m.as_str().trim()).unwrap_or("");

    Some(DirectiveMetadata::new(kind, expr))
}

fn prefix_len(rest: &str, pred: impl Fn(char) -> bool) -> usize {
    rest.char_indices()
        .find(|(_, c)| !pred(*c))
        .map(|(i, _)| i)
        .unwrap_or(rest.len())
}

fn number_len(rest: &str) -> usize {
    let mut len = 0;
    let mut seen_dot = false;

    for ch in rest.chars() {
        if ch.is_ascii_digit() {
            len += 1;
        } else if ch == '.' && !seen_dot {
            seen_dot = true;
            len += 1;
        } else {
            break;
        }
    }

    // a trailing dot belongs to the next token, not the number
    if rest[..len].ends_with('.') {
        len -= 1;
    }

    len
}

fn operator_len(rest: &str) -> usize {
    const TWO_CHAR: &[&str] = &["<=", ">=", "<>", "!=", "||", "::"];
    for op in TWO_CHAR {
        if rest.starts_with(op) {
            return 2;
        }
    }
    rest.chars().next().map(|c| c.len_utf8()).unwrap_or(1)
}
