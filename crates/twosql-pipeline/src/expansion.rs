//! Array/object expansion planning
//!
//! Inside INSERT VALUES ranges, a variable directive bound to an array or
//! object value is rewritten into repeated per-row/per-column directive
//! sequences, so one template parameter can feed a bulk insert. FOR/END
//! directives are mirrored with a simulated loop-scope stack so nested
//! variable directives classify against the correct element.
//!
//! Column order is taken from the INSERT's column list. Every declared
//! column must be present in a bound object; a miss fails the pass naming
//! the field and the object's available fields.

use crate::chain::parse_loop_binding;
use twosql_core::{
    Diagnostic, DiagnosticCode, Diagnostics, DirectiveKind, DirectiveMetadata, Location,
    SourcePos, Token, TokenKind,
};
use twosql_expr::EvaluationScope;
use twosql_parse::Clause;

/// Value shape driving the expansion decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Scalar,
    ScalarArray,
    Object,
    ObjectArray,
}

fn classify(value: &serde_json::Value) -> Shape {
    match value {
        serde_json::Value::Object(_) => Shape::Object,
        serde_json::Value::Array(items) => {
            if items.first().map(|v| v.is_object()).unwrap_or(false) {
                Shape::ObjectArray
            } else {
                Shape::ScalarArray
            }
        }
        _ => Shape::Scalar,
    }
}

enum Sim {
    Plain,
    Loop,
}

struct PlannedEdit {
    start: usize,
    end: usize,
    replacement: Vec<Token>,
}

/// Expand array/object variable directives inside a VALUES clause
pub fn expand_values_clause(
    clause: &mut Clause,
    columns: &[String],
    scope: &mut EvaluationScope<'_>,
    diags: &mut Diagnostics,
) {
    let mut stack: Vec<Sim> = Vec::new();
    let mut edits: Vec<PlannedEdit> = Vec::new();

    for (i, token) in clause.tokens().iter().enumerate() {
        let Some(metadata) = token.metadata() else { continue };
        match metadata.kind {
            DirectiveKind::If => stack.push(Sim::Plain),
            DirectiveKind::For => stack.push(enter_simulated_loop(&metadata.expr, scope)),
            DirectiveKind::End => {
                if let Some(Sim::Loop) = stack.pop() {
                    scope.exit_loop();
                }
            }
            DirectiveKind::Variable => {
                // expressions that fail to evaluate are the validator's to report
                let Ok(evaluated) = scope.evaluate(metadata.expr.trim()) else {
                    continue;
                };

                match (classify(&evaluated.value), &evaluated.value) {
                    (Shape::Scalar, _) => {}
                    (Shape::ScalarArray, serde_json::Value::Array(items)) => {
                        edits.push(plan_scalar_array(clause, i, metadata, items));
                    }
                    (Shape::Object, serde_json::Value::Object(map)) => {
                        if let Some(edit) = plan_object(clause, i, metadata, map, columns, diags) {
                            edits.push(edit);
                        }
                    }
                    (Shape::ObjectArray, serde_json::Value::Array(rows)) => {
                        if let Some(edit) = plan_object_array(clause, i, metadata, rows, columns, diags)
                        {
                            edits.push(edit);
                        }
                    }
                    _ => {}
                }
            }
            DirectiveKind::Const | DirectiveKind::ElseIf | DirectiveKind::Else => {}
        }
    }

    unwind(&mut stack, scope);

    tracing::debug!(edits = edits.len(), "planned VALUES expansions");

    // back-to-front so earlier indices stay valid
    edits.sort_by(|a, b| b.start.cmp(&a.start));
    for edit in edits {
        clause.replace_range(edit.start, edit.end, edit.replacement);
    }
}

/// Reject object-valued directives used as `IN (...)` operands
pub fn check_in_operands(
    clause: &Clause,
    scope: &mut EvaluationScope<'_>,
    diags: &mut Diagnostics,
) {
    let mut stack: Vec<Sim> = Vec::new();

    for (i, token) in clause.tokens().iter().enumerate() {
        let Some(metadata) = token.metadata() else { continue };
        match metadata.kind {
            DirectiveKind::If => stack.push(Sim::Plain),
            DirectiveKind::For => stack.push(enter_simulated_loop(&metadata.expr, scope)),
            DirectiveKind::End => {
                if let Some(Sim::Loop) = stack.pop() {
                    scope.exit_loop();
                }
            }
            DirectiveKind::Variable => {
                if !follows_in_keyword(clause, i) {
                    continue;
                }
                let Ok(evaluated) = scope.evaluate(metadata.expr.trim()) else {
                    continue;
                };
                if matches!(classify(&evaluated.value), Shape::Object | Shape::ObjectArray) {
                    diags.push(
                        Diagnostic::error(
                            DiagnosticCode::ObjectInInList,
                            format!(
                                "object-valued `{}` cannot be an IN (...) operand; IN lists require scalars",
                                metadata.expr.trim()
                            ),
                        )
                        .with_location(Location::at(token.pos.line, token.pos.column)),
                    );
                }
            }
            _ => {}
        }
    }

    unwind(&mut stack, scope);
}

fn enter_simulated_loop(expr: &str, scope: &mut EvaluationScope<'_>) -> Sim {
    let Ok(binding) = parse_loop_binding(expr) else {
        return Sim::Plain;
    };

    let elements = match scope.evaluate(&binding.source_expr) {
        Ok(evaluated) => match evaluated.value {
            serde_json::Value::Array(items) => items,
            _ => Vec::new(),
        },
        Err(_) => Vec::new(),
    };

    scope.enter_loop(binding.var, &elements);
    Sim::Loop
}

fn unwind(stack: &mut Vec<Sim>, scope: &mut EvaluationScope<'_>) {
    while let Some(frame) = stack.pop() {
        if matches!(frame, Sim::Loop) {
            scope.exit_loop();
        }
    }
}

fn follows_in_keyword(clause: &Clause, idx: usize) -> bool {
    clause.tokens()[..idx]
        .iter()
        .rev()
        .find(|t| !t.is_whitespace())
        .map(|t| t.is_word("IN"))
        .unwrap_or(false)
}

/// Directive index through the end of its placeholder
fn edit_span(i: usize, metadata: &DirectiveMetadata) -> (usize, usize) {
    let end = metadata
        .placeholder_range
        .last()
        .map(|last| last + 1)
        .unwrap_or(i + 1);
    (i, end)
}

fn plan_scalar_array(
    clause: &Clause,
    i: usize,
    metadata: &DirectiveMetadata,
    items: &[serde_json::Value],
) -> PlannedEdit {
    let (start, end) = edit_span(i, metadata);
    let mut builder = TokenBuilder::new(clause.tokens()[i].pos);

    for (n, item) in items.iter().enumerate() {
        if n > 0 {
            builder.separator();
        }
        builder.push_directive(&format!("{}[{}]", metadata.expr.trim(), n));
        builder.push_placeholder(item);
    }

    PlannedEdit {
        start,
        end,
        replacement: builder.into_tokens(),
    }
}

fn plan_object(
    clause: &Clause,
    i: usize,
    metadata: &DirectiveMetadata,
    map: &serde_json::Map<String, serde_json::Value>,
    columns: &[String],
    diags: &mut Diagnostics,
) -> Option<PlannedEdit> {
    let expr = metadata.expr.trim();
    let pos = clause.tokens()[i].pos;

    if columns.is_empty() || !check_fields(expr, map, columns, pos, diags) {
        return None;
    }

    let (start, end) = edit_span(i, metadata);

    // keep the row parentheses when the placeholder was a group
    let grouped = metadata
        .placeholder_range
        .first()
        .and_then(|&idx| clause.token(idx))
        .map(|t| t.kind == TokenKind::OpenParen)
        .unwrap_or(false);

    let mut builder = TokenBuilder::new(pos);
    if grouped {
        builder.push(TokenKind::OpenParen, "(");
    }
    push_columns(&mut builder, expr, map, columns);
    if grouped {
        builder.push(TokenKind::CloseParen, ")");
    }

    Some(PlannedEdit {
        start,
        end,
        replacement: builder.into_tokens(),
    })
}

fn plan_object_array(
    clause: &Clause,
    i: usize,
    metadata: &DirectiveMetadata,
    rows: &[serde_json::Value],
    columns: &[String],
    diags: &mut Diagnostics,
) -> Option<PlannedEdit> {
    let expr = metadata.expr.trim();
    let pos = clause.tokens()[i].pos;

    if columns.is_empty() {
        return None;
    }

    let mut complete = true;
    for (n, row) in rows.iter().enumerate() {
        if let serde_json::Value::Object(map) = row {
            if !check_fields(&format!("{}[{}]", expr, n), map, columns, pos, diags) {
                complete = false;
            }
        }
    }
    if !complete {
        return None;
    }

    let (start, end) = edit_span(i, metadata);
    let mut builder = TokenBuilder::new(pos);

    for (n, row) in rows.iter().enumerate() {
        let serde_json::Value::Object(map) = row else { continue };
        if n > 0 {
            builder.separator();
        }
        builder.push(TokenKind::OpenParen, "(");
        push_columns(&mut builder, &format!("{}[{}]", expr, n), map, columns);
        builder.push(TokenKind::CloseParen, ")");
    }

    Some(PlannedEdit {
        start,
        end,
        replacement: builder.into_tokens(),
    })
}

fn push_columns(
    builder: &mut TokenBuilder,
    base_expr: &str,
    map: &serde_json::Map<String, serde_json::Value>,
    columns: &[String],
) {
    for (n, column) in columns.iter().enumerate() {
        if n > 0 {
            builder.separator();
        }
        builder.push_directive(&format!("{}.{}", base_expr, column));
        builder.push_placeholder(map.get(column).unwrap_or(&serde_json::Value::Null));
    }
}

fn check_fields(
    expr: &str,
    map: &serde_json::Map<String, serde_json::Value>,
    columns: &[String],
    pos: SourcePos,
    diags: &mut Diagnostics,
) -> bool {
    let mut complete = true;

    for column in columns {
        if !map.contains_key(column) {
            let available: Vec<&str> = map.keys().map(|k| k.as_str()).collect();
            diags.push(
                Diagnostic::error(
                    DiagnosticCode::MissingObjectField,
                    format!(
                        "object bound to `{}` is missing field `{}` (available fields: {})",
                        expr,
                        column,
                        available.join(", ")
                    ),
                )
                .with_location(Location::at(pos.line, pos.column)),
            );
            complete = false;
        }
    }

    complete
}

/// Builds replacement token runs with contiguous positions, so each new
/// directive stays source-adjacent to its placeholder
struct TokenBuilder {
    line: usize,
    column: usize,
    offset: usize,
    tokens: Vec<Token>,
}

impl TokenBuilder {
    fn new(base: SourcePos) -> Self {
        Self {
            line: base.line,
            column: base.column,
            offset: base.offset,
            tokens: Vec::new(),
        }
    }

    fn next_pos(&mut self, text: &str) -> SourcePos {
        let pos = SourcePos::new(self.line, self.column, self.offset);
        self.column += text.chars().count();
        self.offset += text.len();
        pos
    }

    fn push(&mut self, kind: TokenKind, text: &str) {
        let pos = self.next_pos(text);
        self.tokens.push(Token::new(kind, text, pos));
    }

    fn push_directive(&mut self, expr: &str) {
        let text = format!("/*= {} */", expr);
        let pos = self.next_pos(&text);
        self.tokens.push(Token::directive(
            text,
            pos,
            DirectiveMetadata::new(DirectiveKind::Variable, expr),
        ));
    }

    fn push_placeholder(&mut self, value: &serde_json::Value) {
        let (kind, text) = match value {
            serde_json::Value::String(_) => (TokenKind::QuotedString, "''"),
            serde_json::Value::Bool(_) => (TokenKind::Word, "FALSE"),
            _ => (TokenKind::Number, "0"),
        };
        self.push(kind, text);
    }

    fn separator(&mut self) {
        self.push(TokenKind::Comma, ",");
        self.push(TokenKind::Whitespace, " ");
    }

    fn into_tokens(self) -> Vec<Token> {
        self.tokens
    }
}
