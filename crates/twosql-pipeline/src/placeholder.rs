//! Placeholder insertion and range detection
//!
//! Insertion runs on the raw stream, before clause scanning: it guarantees
//! every value directive is immediately followed by a syntactically valid
//! literal, so a generic SQL grammar parses the statement as if the
//! directive were invisible.
//!
//! Detection runs per clause, after scanning, and is read-only: it records
//! on each dummyable directive (variable, const, end) the exact token range
//! that constitutes a removable placeholder. Only source-adjacent content
//! counts - a whitespace gap means the author left real content there.

use twosql_core::{SourcePos, Token, TokenKind};
use twosql_parse::Clause;

/// Ensure every value directive is followed by a parseable literal
///
/// A following literal or parenthesized group is reused as the placeholder.
/// Anything else gets a synthetic `0` inserted at the directive's end
/// offset, so it is source-adjacent and later detected as the placeholder.
pub fn ensure_placeholders(tokens: &mut Vec<Token>) {
    let mut i = 0;

    while i < tokens.len() {
        let is_value = tokens[i]
            .metadata()
            .map(|m| m.kind.is_value())
            .unwrap_or(false);

        if is_value {
            let mut next = i + 1;
            while next < tokens.len() && tokens[next].is_whitespace() {
                next += 1;
            }

            let needs_synthetic = match tokens.get(next) {
                Some(tok) => {
                    !((tok.is_literal_like() && !is_reserved_word(tok))
                        || tok.kind == TokenKind::OpenParen)
                }
                None => true,
            };

            if needs_synthetic {
                let directive = &tokens[i];
                let pos = SourcePos::new(
                    directive.pos.line,
                    directive.pos.column + directive.text.chars().count(),
                    directive.end_offset(),
                );
                tokens.insert(i + 1, Token::new(TokenKind::Number, "0", pos));
                i += 1;
            }
        }

        i += 1;
    }
}

/// Record the removable placeholder range on each dummyable directive
///
/// Idempotent: re-running on an already-detected (or resolved) clause
/// yields identical ranges.
pub fn detect_placeholder_ranges(clause: &mut Clause) {
    let targets: Vec<(usize, usize)> = clause
        .tokens()
        .iter()
        .enumerate()
        .filter(|(_, t)| t.metadata().map(|m| m.kind.is_dummyable()).unwrap_or(false))
        .map(|(i, t)| (i, t.end_offset()))
        .collect();

    for (idx, directive_end) in targets {
        let range = placeholder_range_at(clause.tokens(), idx, directive_end);
        if let Some(metadata) = clause.tokens_mut()[idx].metadata_mut() {
            metadata.placeholder_range = range;
        }
    }
}

/// A bare keyword after a directive is upcoming SQL, not a usable
/// placeholder - the skeleton would not parse without a synthetic literal.
/// NULL is reserved too: an authored `NULL` left after a directive is
/// stripped by the validator's cleanup, never reused.
fn is_reserved_word(token: &Token) -> bool {
    const RESERVED: &[&str] = &[
        "AND", "OR", "NOT", "NULL", "IN", "IS", "LIKE", "BETWEEN", "SELECT", "FROM", "WHERE",
        "GROUP", "ORDER", "BY", "HAVING", "LIMIT", "OFFSET", "INSERT", "INTO", "VALUES", "UPDATE",
        "SET", "DELETE", "JOIN", "ON", "UNION", "CASE", "WHEN", "THEN", "ELSE", "ASC", "DESC",
    ];
    token.kind == TokenKind::Word && RESERVED.iter().any(|kw| token.text.eq_ignore_ascii_case(kw))
}

fn placeholder_range_at(tokens: &[Token], idx: usize, directive_end: usize) -> Vec<usize> {
    let next = idx + 1;
    let Some(tok) = tokens.get(next) else {
        return Vec::new();
    };

    // a gap means the author left real content, not a placeholder
    if tok.is_whitespace() || tok.pos.offset != directive_end {
        return Vec::new();
    }

    if tok.is_literal_like() {
        return vec![next];
    }

    if tok.kind == TokenKind::OpenParen {
        // span to the matching closer at the same nesting level, covering
        // row-group placeholders like ('1','name')
        let mut depth = 0usize;
        for (i, t) in tokens.iter().enumerate().skip(next) {
            match t.kind {
                TokenKind::OpenParen => depth += 1,
                TokenKind::CloseParen => {
                    depth -= 1;
                    if depth == 0 {
                        return (next..=i).collect();
                    }
                }
                _ => {}
            }
        }
        // unmatched opener; the balance validator reports it
        return Vec::new();
    }

    Vec::new()
}
