//! Directive chain linking
//!
//! Per clause, single scan: IF/FOR push onto a scope stack, ELSEIF/ELSE
//! attach to the open IF, END pops. Each directive in a chain gets a
//! `next_index` forward reference, enabling O(1) matching-end and
//! next-branch lookup. Chains that open and close at different parenthesis
//! depths are rejected. Errors accumulate rather than fail fast - one pass
//! may report several independent chain defects.

use twosql_core::{
    Diagnostic, DiagnosticCode, Diagnostics, DirectiveKind, Location, LoopBinding, SourcePos,
    TokenKind,
};
use twosql_parse::Clause;

struct OpenChain {
    kind: DirectiveKind,
    last: usize,
    open_depth: i32,
    pos: SourcePos,
}

/// Link IF/ELSEIF/ELSE/END and FOR/END chains within one clause
pub fn link_chains(clause: &mut Clause, diags: &mut Diagnostics) {
    let mut stack: Vec<OpenChain> = Vec::new();
    let mut links: Vec<(usize, usize)> = Vec::new();
    let mut depth: i32 = 0;

    for (i, token) in clause.tokens().iter().enumerate() {
        match token.kind {
            TokenKind::OpenParen => depth += 1,
            TokenKind::CloseParen => depth -= 1,
            TokenKind::Directive => {
                let Some(metadata) = token.metadata() else { continue };
                match metadata.kind {
                    DirectiveKind::If | DirectiveKind::For => {
                        stack.push(OpenChain {
                            kind: metadata.kind,
                            last: i,
                            open_depth: depth,
                            pos: token.pos,
                        });
                    }
                    DirectiveKind::ElseIf | DirectiveKind::Else => match stack.last_mut() {
                        Some(open) if open.kind == DirectiveKind::If => {
                            if depth != open.open_depth {
                                diags.push(crossing_error(metadata.kind, open.open_depth, depth, token.pos));
                            }
                            links.push((open.last, i));
                            open.last = i;
                        }
                        _ => {
                            diags.push(
                                Diagnostic::error(
                                    DiagnosticCode::UnbalancedDirective,
                                    format!(
                                        "{} directive has no open IF in this clause; directive chains may not cross clause boundaries",
                                        metadata.kind.as_str().to_uppercase()
                                    ),
                                )
                                .with_location(at(token.pos)),
                            );
                        }
                    },
                    DirectiveKind::End => match stack.pop() {
                        Some(open) => {
                            if depth != open.open_depth {
                                diags.push(crossing_error(open.kind, open.open_depth, depth, token.pos));
                            }
                            links.push((open.last, i));
                        }
                        None => {
                            diags.push(
                                Diagnostic::error(
                                    DiagnosticCode::UnbalancedDirective,
                                    "END directive has no open IF or FOR in this clause; directive chains may not cross clause boundaries",
                                )
                                .with_location(at(token.pos)),
                            );
                        }
                    },
                    DirectiveKind::Variable | DirectiveKind::Const => {}
                }
            }
            _ => {}
        }
    }

    for open in stack {
        diags.push(
            Diagnostic::error(
                DiagnosticCode::UnbalancedDirective,
                format!(
                    "{} directive is not closed in this clause; directive chains may not cross clause boundaries",
                    open.kind.as_str().to_uppercase()
                ),
            )
            .with_location(at(open.pos)),
        );
    }

    for (from, to) in links {
        if let Some(metadata) = clause.tokens_mut()[from].metadata_mut() {
            metadata.next_index = Some(to);
        }
    }
}

/// Walk a chain from its opener to the matching END, if linked
pub fn matching_end(clause: &Clause, opener: usize) -> Option<usize> {
    let mut idx = opener;
    loop {
        let metadata = clause.token(idx)?.metadata()?;
        let next = metadata.next_index?;
        let next_kind = clause.token(next)?.metadata()?.kind;
        if next_kind == DirectiveKind::End {
            return Some(next);
        }
        idx = next;
    }
}

/// Parse a FOR directive body: `<loopVar> : <iterableExpr>`
///
/// Exactly one colon separates the two parts; anything else is a format
/// error.
pub fn parse_loop_binding(expr: &str) -> Result<LoopBinding, String> {
    let parts: Vec<&str> = expr.split(':').collect();
    if parts.len() != 2 {
        return Err(format!(
            "FOR directive must be `variable : iterable`, got `{}`",
            expr
        ));
    }

    let var = parts[0].trim();
    let source_expr = parts[1].trim();
    if var.is_empty() || source_expr.is_empty() {
        return Err(format!(
            "FOR directive must be `variable : iterable`, got `{}`",
            expr
        ));
    }

    Ok(LoopBinding {
        var: var.to_string(),
        source_expr: source_expr.to_string(),
    })
}

fn crossing_error(kind: DirectiveKind, opened: i32, closed: i32, pos: SourcePos) -> Diagnostic {
    Diagnostic::error(
        DiagnosticCode::DirectiveCrossesParentheses,
        format!(
            "{} chain crosses parentheses boundary: opened at depth {}, reached depth {}",
            kind.as_str().to_uppercase(),
            opened,
            closed
        ),
    )
    .with_location(at(pos))
}

fn at(pos: SourcePos) -> Location {
    Location::at(pos.line, pos.column)
}
