//! Statement scanner
//!
//! Splits a flat token stream into clauses at top-level keyword boundaries.
//! Deliberately minimal: clause heads are only recognized at parenthesis
//! depth zero, so subqueries and CTE bodies stay inside their enclosing
//! clause. This is the shape the directive pipeline needs; it is not a SQL
//! grammar.

use crate::clause::{Clause, ClauseKind, Statement, StatementKind};
use twosql_core::{Token, TokenKind};

/// Scan a token stream into a statement
pub fn scan_statement(tokens: Vec<Token>) -> Statement {
    let mut clauses: Vec<Clause> = Vec::new();
    let mut current_kind = ClauseKind::Fragment;
    let mut current: Vec<Token> = Vec::new();
    let mut depth = 0usize;

    for token in tokens {
        let starts = if depth == 0 && token.kind == TokenKind::Word {
            clause_keyword(&token.text)
        } else {
            None
        };

        match token.kind {
            TokenKind::OpenParen => depth += 1,
            TokenKind::CloseParen => depth = depth.saturating_sub(1),
            _ => {}
        }

        if let Some(kind) = starts {
            if !current.is_empty() {
                clauses.push(Clause::new(current_kind, current));
                current = Vec::new();
            }
            current_kind = kind;
        }

        current.push(token);
    }

    if !current.is_empty() {
        clauses.push(Clause::new(current_kind, current));
    }

    let kind = statement_kind(&clauses);
    let insert_columns = if kind == StatementKind::Insert {
        clauses
            .iter()
            .find(|c| c.kind() == ClauseKind::InsertInto)
            .map(extract_insert_columns)
            .unwrap_or_default()
    } else {
        Vec::new()
    };

    tracing::debug!(
        clauses = clauses.len(),
        insert_columns = insert_columns.len(),
        "scanned statement"
    );

    Statement::new(kind, clauses, insert_columns)
}

fn clause_keyword(word: &str) -> Option<ClauseKind> {
    match word.to_ascii_uppercase().as_str() {
        "SELECT" => Some(ClauseKind::Select),
        "FROM" => Some(ClauseKind::From),
        "WHERE" => Some(ClauseKind::Where),
        "GROUP" => Some(ClauseKind::GroupBy),
        "HAVING" => Some(ClauseKind::Having),
        "ORDER" => Some(ClauseKind::OrderBy),
        "LIMIT" => Some(ClauseKind::Limit),
        "OFFSET" => Some(ClauseKind::Offset),
        "INSERT" => Some(ClauseKind::InsertInto),
        "VALUES" => Some(ClauseKind::Values),
        "UPDATE" => Some(ClauseKind::Update),
        "SET" => Some(ClauseKind::Set),
        "DELETE" => Some(ClauseKind::Delete),
        _ => None,
    }
}

fn statement_kind(clauses: &[Clause]) -> StatementKind {
    for clause in clauses {
        match clause.kind() {
            ClauseKind::Select => return StatementKind::Select,
            ClauseKind::InsertInto => return StatementKind::Insert,
            ClauseKind::Update => return StatementKind::Update,
            ClauseKind::Delete => return StatementKind::Delete,
            ClauseKind::Fragment => continue,
            _ => return StatementKind::Other,
        }
    }
    StatementKind::Other
}

/// Column names from the parenthesized list after the INSERT target table
fn extract_insert_columns(clause: &Clause) -> Vec<String> {
    let mut columns = Vec::new();
    let mut depth = 0usize;

    for token in clause.tokens() {
        match token.kind {
            TokenKind::OpenParen => depth += 1,
            TokenKind::CloseParen => {
                if depth <= 1 {
                    break;
                }
                depth -= 1;
            }
            TokenKind::Word if depth == 1 => {
                columns.push(token.text.trim_matches('"').to_string());
            }
            _ => {}
        }
    }

    columns
}
