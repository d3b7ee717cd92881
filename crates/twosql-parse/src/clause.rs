//! Clause and statement model
//!
//! A clause is a contiguous, position-monotonic token range with a head
//! keyword and a body. Clauses own their token buffers, so range edits stay
//! local and never shift indices in sibling clauses.

use serde::{Deserialize, Serialize};
use twosql_core::{DirectiveKind, Token};

/// Head keyword class of a clause
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClauseKind {
    Select,
    From,
    Where,
    GroupBy,
    Having,
    OrderBy,
    Limit,
    Offset,
    InsertInto,
    Values,
    Update,
    Set,
    Delete,
    /// Leading or unclassified tokens
    Fragment,
}

impl ClauseKind {
    /// Whether this clause takes an implicit presence guard
    pub fn is_limit_like(&self) -> bool {
        matches!(self, Self::Limit | Self::Offset)
    }
}

/// Statement classification, taken from the leading clause
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    Other,
}

/// A contiguous token range with a head and body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clause {
    kind: ClauseKind,
    tokens: Vec<Token>,
    condition: Option<String>,
}

impl Clause {
    /// Create a clause from tokens
    pub fn new(kind: ClauseKind, tokens: Vec<Token>) -> Self {
        Self {
            kind,
            tokens,
            condition: None,
        }
    }

    /// Head keyword class
    pub fn kind(&self) -> ClauseKind {
        self.kind
    }

    /// Ordered tokens (including directives)
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Mutable token access (no length change)
    pub fn tokens_mut(&mut self) -> &mut [Token] {
        &mut self.tokens
    }

    /// Number of tokens
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Whether the clause has no tokens
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Token at an index
    pub fn token(&self, index: usize) -> Option<&Token> {
        self.tokens.get(index)
    }

    /// Replace the token range `[start, end)` with new tokens
    pub fn replace_range(&mut self, start: usize, end: usize, replacement: Vec<Token>) {
        self.tokens.splice(start..end, replacement);
    }

    /// Insert tokens immediately after an index
    pub fn insert_after(&mut self, index: usize, tokens: Vec<Token>) {
        let at = index + 1;
        self.tokens.splice(at..at, tokens);
    }

    /// Remove and return the token at an index
    pub fn remove(&mut self, index: usize) -> Token {
        self.tokens.remove(index)
    }

    /// Clause-level if-condition, if any
    pub fn condition(&self) -> Option<&str> {
        self.condition.as_deref()
    }

    /// Set the clause-level if-condition
    pub fn set_condition(&mut self, condition: impl Into<String>) {
        self.condition = Some(condition.into());
    }

    /// Indices of directive tokens, in order
    pub fn directive_indices(&self) -> Vec<usize> {
        self.tokens
            .iter()
            .enumerate()
            .filter(|(_, t)| t.metadata().is_some())
            .map(|(i, _)| i)
            .collect()
    }

    /// Count directives of one kind
    pub fn count_directives(&self, kind: DirectiveKind) -> usize {
        self.tokens
            .iter()
            .filter(|t| t.metadata().map(|m| m.kind) == Some(kind))
            .count()
    }

    /// Concatenate token texts back into SQL
    pub fn render(&self) -> String {
        self.tokens.iter().map(|t| t.text.as_str()).collect()
    }
}

/// A statement: ordered clauses plus INSERT column metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    kind: StatementKind,
    clauses: Vec<Clause>,
    insert_columns: Vec<String>,
}

impl Statement {
    /// Create a statement
    pub fn new(kind: StatementKind, clauses: Vec<Clause>, insert_columns: Vec<String>) -> Self {
        Self {
            kind,
            clauses,
            insert_columns,
        }
    }

    /// Statement classification
    pub fn kind(&self) -> StatementKind {
        self.kind
    }

    /// Ordered clauses
    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    /// Mutable clause access
    pub fn clauses_mut(&mut self) -> &mut [Clause] {
        &mut self.clauses
    }

    /// Declared INSERT column names, in column-list order
    pub fn insert_columns(&self) -> &[String] {
        &self.insert_columns
    }

    /// Concatenate all clause tokens back into SQL
    pub fn render(&self) -> String {
        self.clauses.iter().map(|c| c.render()).collect()
    }
}
