//! Balance validation
//!
//! Runs before structural parsing, over the raw token stream. Two
//! independent stacks: parentheses, and IF/FOR directive nesting. Purely
//! syntactic - no expression is evaluated here.

use twosql_core::{
    Diagnostic, DiagnosticCode, Diagnostics, DirectiveKind, Location, SourcePos, Token, TokenKind,
};

/// Check parenthesis and IF/FOR/END nesting over a raw token stream
pub fn validate_balance(tokens: &[Token], diags: &mut Diagnostics) {
    let mut parens: Vec<SourcePos> = Vec::new();
    let mut directives: Vec<(DirectiveKind, SourcePos)> = Vec::new();

    for token in tokens {
        match token.kind {
            TokenKind::OpenParen => parens.push(token.pos),
            TokenKind::CloseParen => {
                if parens.pop().is_none() {
                    diags.push(
                        Diagnostic::error(
                            DiagnosticCode::UnbalancedParenthesis,
                            "closing parenthesis without a matching opener",
                        )
                        .with_location(at(token.pos)),
                    );
                }
            }
            TokenKind::Directive => {
                let Some(metadata) = token.metadata() else { continue };
                match metadata.kind {
                    DirectiveKind::If | DirectiveKind::For => {
                        directives.push((metadata.kind, token.pos));
                    }
                    DirectiveKind::ElseIf | DirectiveKind::Else => {
                        // branch transitions do not pop; they just require an open IF
                        if directives.last().map(|(k, _)| *k) != Some(DirectiveKind::If) {
                            diags.push(
                                Diagnostic::error(
                                    DiagnosticCode::UnbalancedDirective,
                                    format!(
                                        "{} directive without an open IF",
                                        metadata.kind.as_str().to_uppercase()
                                    ),
                                )
                                .with_location(at(token.pos)),
                            );
                        }
                    }
                    DirectiveKind::End => {
                        if directives.pop().is_none() {
                            diags.push(
                                Diagnostic::error(
                                    DiagnosticCode::UnbalancedDirective,
                                    "END directive without an open IF or FOR",
                                )
                                .with_location(at(token.pos)),
                            );
                        }
                    }
                    DirectiveKind::Variable | DirectiveKind::Const => {}
                }
            }
            _ => {}
        }
    }

    for pos in parens {
        diags.push(
            Diagnostic::error(
                DiagnosticCode::UnbalancedParenthesis,
                "parenthesis is never closed",
            )
            .with_location(at(pos)),
        );
    }

    for (kind, pos) in directives {
        diags.push(
            Diagnostic::error(
                DiagnosticCode::UnbalancedDirective,
                format!("{} directive is never closed", kind.as_str().to_uppercase()),
            )
            .with_location(at(pos)),
        );
    }
}

fn at(pos: SourcePos) -> Location {
    Location::at(pos.line, pos.column)
}
