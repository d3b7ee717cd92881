//! Expression and scope validation
//!
//! The final stage. Per clause, in token order, with an open-scope stack for
//! loop bindings. Every directive expression is evaluated; successful value
//! directives have their placeholder replaced with a typed literal (or a
//! literal inserted when no placeholder follows). Edits are staged during
//! the scan and applied back-to-front so indices never go stale.

use crate::chain::{matching_end, parse_loop_binding};
use serde::Serialize;
use std::collections::BTreeMap;
use twosql_core::{
    system_column_type, Diagnostic, DiagnosticCode, Diagnostics, DirectiveKind, DirectiveMetadata,
    Location, ParamType, SourcePos, Token, TokenKind,
};
use twosql_expr::{EvalError, EvaluationScope};
use twosql_parse::Clause;

/// Type information recorded per directive, keyed by source byte offset
///
/// Downstream result-shape generation consumes this map.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeDescriptor {
    /// The directive expression
    pub expr: String,

    /// Rendered logical type name
    pub type_name: String,
}

enum Edit {
    Replace {
        start: usize,
        end: usize,
        with: Vec<Token>,
    },
    Insert {
        after: usize,
        with: Vec<Token>,
    },
}

impl Edit {
    fn position(&self) -> usize {
        match self {
            Edit::Replace { start, .. } => *start,
            Edit::Insert { after, .. } => after + 1,
        }
    }
}

enum Open {
    Plain,
    Loop,
}

/// Validate and resolve one clause
pub fn validate_clause(
    clause: &mut Clause,
    scope: &mut EvaluationScope<'_>,
    types: &mut BTreeMap<usize, TypeDescriptor>,
    diags: &mut Diagnostics,
) {
    // the clause-level condition (explicit or synthesized) is evaluated like
    // any IF condition: failure is a hard error, never a silent false
    if let Some(condition) = clause.condition().map(str::to_string) {
        let pos = clause.token(0).map(|t| t.pos).unwrap_or_default();
        check_condition(&condition, pos, scope, diags);
    }

    // snapshot directives before issuing edits
    let snapshot: Vec<(usize, DirectiveMetadata)> = clause
        .tokens()
        .iter()
        .enumerate()
        .filter_map(|(i, t)| t.metadata().map(|m| (i, m.clone())))
        .collect();

    let mut stack: Vec<Open> = Vec::new();
    let mut edits: Vec<Edit> = Vec::new();

    for (idx, metadata) in &snapshot {
        let pos = clause.token(*idx).map(|t| t.pos).unwrap_or_default();

        match metadata.kind {
            DirectiveKind::Variable | DirectiveKind::Const => {
                resolve_value_directive(*idx, metadata, pos, scope, types, &mut edits, diags);
            }
            DirectiveKind::If => {
                stack.push(Open::Plain);
                check_condition(&metadata.expr, pos, scope, diags);
            }
            DirectiveKind::ElseIf => {
                check_condition(&metadata.expr, pos, scope, diags);
            }
            DirectiveKind::Else => {}
            DirectiveKind::For => {
                match parse_loop_binding(&metadata.expr) {
                    Err(message) => {
                        diags.push(
                            Diagnostic::error(DiagnosticCode::MalformedForDirective, message)
                                .with_location(at(pos)),
                        );
                        stack.push(Open::Plain);
                    }
                    Ok(binding) => {
                        let elements = match scope.evaluate(&binding.source_expr) {
                            Err(err) => {
                                diags.push(eval_diag(&binding.source_expr, &err, pos));
                                Vec::new()
                            }
                            Ok(evaluated) => match evaluated.value {
                                serde_json::Value::Array(items) => items,
                                other => {
                                    diags.push(
                                        Diagnostic::error(
                                            DiagnosticCode::ExpressionTypeMismatch,
                                            format!(
                                                "FOR iterable `{}` must be an array",
                                                binding.source_expr
                                            ),
                                        )
                                        .with_comparison("ARRAY", ParamType::of_value(&other).to_string())
                                        .with_location(at(pos)),
                                    );
                                    Vec::new()
                                }
                            },
                        };

                        scope.enter_loop(binding.var.as_str(), &elements);
                        stack.push(Open::Loop);

                        if let Some(meta) = clause.tokens_mut()[*idx].metadata_mut() {
                            meta.loop_binding = Some(binding);
                        }

                        if let Some(end_idx) = matching_end(clause, *idx) {
                            check_loop_body(clause, *idx, end_idx, diags);
                        }
                    }
                }
            }
            DirectiveKind::End => {
                if let Some(Open::Loop) = stack.pop() {
                    scope.exit_loop();
                }
                // sample rows after a loop end are dropped from the resolved
                // stream
                if let (Some(&start), Some(&last)) = (
                    metadata.placeholder_range.first(),
                    metadata.placeholder_range.last(),
                ) {
                    edits.push(Edit::Replace {
                        start,
                        end: last + 1,
                        with: Vec::new(),
                    });
                }
            }
        }
    }

    // unwind leftovers; unbalanced templates were already diagnosed
    while let Some(frame) = stack.pop() {
        if matches!(frame, Open::Loop) {
            scope.exit_loop();
        }
    }

    apply_edits(clause, edits);
}

fn resolve_value_directive(
    idx: usize,
    metadata: &DirectiveMetadata,
    pos: SourcePos,
    scope: &EvaluationScope<'_>,
    types: &mut BTreeMap<usize, TypeDescriptor>,
    edits: &mut Vec<Edit>,
    diags: &mut Diagnostics,
) {
    let expr = metadata.expr.trim();

    // system columns resolve from ambient request context at render time
    if let Some(ty) = system_column_type(expr) {
        types.insert(
            pos.offset,
            TypeDescriptor {
                expr: expr.to_string(),
                type_name: ty.to_string(),
            },
        );
        return;
    }

    let result = match metadata.kind {
        DirectiveKind::Const => scope.evaluate_const(expr),
        _ => scope.evaluate(expr),
    };

    match result {
        Err(err) => diags.push(eval_diag(expr, &err, pos)),
        Ok(evaluated) => {
            types.insert(
                pos.offset,
                TypeDescriptor {
                    expr: expr.to_string(),
                    type_name: evaluated.ty.to_string(),
                },
            );

            let anchor = pos;
            let with = literal_tokens(&evaluated.value, anchor);

            if metadata.placeholder_range.is_empty() {
                edits.push(Edit::Insert { after: idx, with });
            } else {
                let start = metadata.placeholder_range[0];
                let end = metadata.placeholder_range.last().copied().unwrap_or(start) + 1;
                edits.push(Edit::Replace { start, end, with });
            }
        }
    }
}

fn check_condition(expr: &str, pos: SourcePos, scope: &EvaluationScope<'_>, diags: &mut Diagnostics) {
    match scope.evaluate(expr) {
        Err(err) => diags.push(eval_diag(expr, &err, pos)),
        Ok(evaluated) => {
            if evaluated.ty != ParamType::Bool {
                diags.push(
                    Diagnostic::error(
                        DiagnosticCode::ExpressionTypeMismatch,
                        format!("condition `{}` must evaluate to a boolean", expr),
                    )
                    .with_comparison("BOOL", evaluated.ty.to_string())
                    .with_location(at(pos)),
                );
            }
        }
    }
}

/// The controlled body (and each if-branch directly under it) must contain
/// a top-level comma, AND, or OR - absence would silently merge adjacent
/// rows or conditions
fn check_loop_body(clause: &Clause, for_idx: usize, end_idx: usize, diags: &mut Diagnostics) {
    let pos = clause.tokens()[for_idx].pos;

    if !has_separator(clause.tokens(), for_idx + 1, end_idx) {
        diags.push(
            Diagnostic::error(
                DiagnosticCode::LoopBodyMissingSeparator,
                "FOR body must include a comma, AND, or OR",
            )
            .with_location(at(pos)),
        );
        return;
    }

    let mut nesting = 0usize;
    for i in (for_idx + 1)..end_idx {
        if let Some(metadata) = clause.token(i).and_then(|t| t.metadata()) {
            match metadata.kind {
                DirectiveKind::If => {
                    if nesting == 0 {
                        check_if_branches(clause, i, diags);
                    }
                    nesting += 1;
                }
                DirectiveKind::For => nesting += 1,
                DirectiveKind::End => nesting = nesting.saturating_sub(1),
                _ => {}
            }
        }
    }
}

fn check_if_branches(clause: &Clause, if_idx: usize, diags: &mut Diagnostics) {
    let mut idx = if_idx;

    while let Some(next) = clause
        .token(idx)
        .and_then(|t| t.metadata())
        .and_then(|m| m.next_index)
    {
        if !has_separator(clause.tokens(), idx + 1, next) {
            let pos = clause.tokens()[idx].pos;
            diags.push(
                Diagnostic::error(
                    DiagnosticCode::LoopBodyMissingSeparator,
                    "IF branch inside a FOR body must include a comma, AND, or OR",
                )
                .with_location(at(pos)),
            );
        }

        if clause.token(next).and_then(|t| t.metadata()).map(|m| m.kind)
            == Some(DirectiveKind::End)
        {
            break;
        }
        idx = next;
    }
}

fn has_separator(tokens: &[Token], start: usize, end: usize) -> bool {
    let mut depth = 0usize;

    for token in &tokens[start..end.min(tokens.len())] {
        match token.kind {
            TokenKind::OpenParen => depth += 1,
            TokenKind::CloseParen => depth = depth.saturating_sub(1),
            TokenKind::Comma if depth == 0 => return true,
            TokenKind::Word if depth == 0 && (token.is_word("AND") || token.is_word("OR")) => {
                return true
            }
            _ => {}
        }
    }

    false
}

fn eval_diag(expr: &str, err: &EvalError, pos: SourcePos) -> Diagnostic {
    let code = if err.is_undefined() {
        DiagnosticCode::UndefinedExpression
    } else {
        DiagnosticCode::ExpressionEvalError
    };
    Diagnostic::error(code, err.to_string()).with_location(at(pos))
}

/// Render a value as SQL literal tokens
///
/// int -> bare number; float -> decimal literal; string -> quoted and
/// escaped; bool -> TRUE/FALSE; scalar array -> parenthesized list (IN
/// operands); anything else -> quoted textual form.
fn literal_tokens(value: &serde_json::Value, pos: SourcePos) -> Vec<Token> {
    match value {
        serde_json::Value::Null => vec![Token::new(TokenKind::Word, "NULL", pos)],
        serde_json::Value::Bool(b) => {
            vec![Token::new(TokenKind::Word, if *b { "TRUE" } else { "FALSE" }, pos)]
        }
        serde_json::Value::Number(n) => vec![Token::new(TokenKind::Number, render_number(n), pos)],
        serde_json::Value::String(s) => {
            vec![Token::new(TokenKind::QuotedString, quote_string(s), pos)]
        }
        serde_json::Value::Array(items)
            if items.iter().all(|v| !v.is_array() && !v.is_object()) =>
        {
            let mut tokens = vec![Token::new(TokenKind::OpenParen, "(", pos)];
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    tokens.push(Token::new(TokenKind::Comma, ",", pos));
                    tokens.push(Token::new(TokenKind::Whitespace, " ", pos));
                }
                tokens.extend(literal_tokens(item, pos));
            }
            tokens.push(Token::new(TokenKind::CloseParen, ")", pos));
            tokens
        }
        other => vec![Token::new(
            TokenKind::QuotedString,
            quote_string(&other.to_string()),
            pos,
        )],
    }
}

fn render_number(n: &serde_json::Number) -> String {
    if let Some(i) = n.as_i64() {
        i.to_string()
    } else if let Some(u) = n.as_u64() {
        u.to_string()
    } else {
        let f = n.as_f64().unwrap_or(0.0);
        if f.fract() == 0.0 {
            format!("{:.1}", f)
        } else {
            f.to_string()
        }
    }
}

fn quote_string(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

fn apply_edits(clause: &mut Clause, mut edits: Vec<Edit>) {
    // back-to-front so earlier indices stay valid
    edits.sort_by_key(|e| std::cmp::Reverse(e.position()));

    for edit in edits {
        let after = match edit {
            Edit::Replace { start, end, with } => {
                let len = with.len();
                clause.replace_range(start, end, with);
                start + len
            }
            Edit::Insert { after, with } => {
                let len = with.len();
                clause.insert_after(after, with);
                after + 1 + len
            }
        };
        strip_null_after(clause, after);
    }
}

/// An authored NULL placeholder must not leak into final SQL
fn strip_null_after(clause: &mut Clause, mut idx: usize) {
    while idx < clause.len()
        && clause.token(idx).map(|t| t.is_whitespace()).unwrap_or(false)
    {
        idx += 1;
    }
    if idx < clause.len() && clause.token(idx).map(|t| t.is_word("NULL")).unwrap_or(false) {
        clause.remove(idx);
    }
}

fn at(pos: SourcePos) -> Location {
    Location::at(pos.line, pos.column)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::link_chains;
    use crate::placeholder::{detect_placeholder_ranges, ensure_placeholders};
    use pretty_assertions::assert_eq;
    use serde_json::Map;
    use twosql_core::{ParamSchema, ParamType, TypeRegistry};
    use twosql_parse::{scan_statement, tokenize, Statement};

    fn run(
        sql: &str,
        schema: ParamSchema,
        values: Vec<(&str, serde_json::Value)>,
    ) -> (Statement, BTreeMap<usize, TypeDescriptor>, Diagnostics) {
        let registry = TypeRegistry::new();
        let mut map = Map::new();
        for (name, value) in values {
            map.insert(name.to_string(), value);
        }
        let mut scope = EvaluationScope::new(&schema, &map, Map::new(), &registry);

        let mut tokens = tokenize(sql).unwrap();
        ensure_placeholders(&mut tokens);
        let mut statement = scan_statement(tokens);

        let mut types = BTreeMap::new();
        let mut diags = Diagnostics::new();
        for clause in statement.clauses_mut() {
            detect_placeholder_ranges(clause);
            link_chains(clause, &mut diags);
            validate_clause(clause, &mut scope, &mut types, &mut diags);
        }

        (statement, types, diags)
    }

    #[test]
    fn placeholder_round_trip() {
        let schema = ParamSchema::new().declare("x", ParamType::Int);
        let (statement, types, diags) =
            run("WHERE a = /*= x */123", schema, vec![("x", serde_json::json!(7))]);

        assert!(!diags.has_errors());
        let rendered = statement.render();
        assert_eq!(rendered, "WHERE a = /*= x */7");
        assert!(!rendered.contains("123"));
        assert_eq!(types.values().next().unwrap().type_name, "INT");
    }

    #[test]
    fn two_directives_resolve_independently() {
        let schema = ParamSchema::new()
            .declare("id", ParamType::Int)
            .declare("name", ParamType::String);
        let (statement, _, diags) = run(
            "WHERE id = /*= id */1 AND name = /*= name */'x'",
            schema,
            vec![
                ("id", serde_json::json!(5)),
                ("name", serde_json::json!("bob")),
            ],
        );

        assert!(!diags.has_errors());
        let rendered = statement.render();
        assert_eq!(rendered, "WHERE id = /*= id */5 AND name = /*= name */'bob'");
    }

    #[test]
    fn string_literals_are_escaped() {
        let schema = ParamSchema::new().declare("name", ParamType::String);
        let (statement, _, _) = run(
            "WHERE name = /*= name */'x'",
            schema,
            vec![("name", serde_json::json!("o'brien"))],
        );
        assert!(statement.render().contains("'o''brien'"));
    }

    #[test]
    fn bool_and_float_literal_forms() {
        let schema = ParamSchema::new()
            .declare("flag", ParamType::Bool)
            .declare("rate", ParamType::Float);
        let (statement, _, _) = run(
            "WHERE a = /*= flag */true AND b = /*= rate */0.5",
            schema,
            vec![
                ("flag", serde_json::json!(true)),
                ("rate", serde_json::json!(2.0)),
            ],
        );

        let rendered = statement.render();
        assert!(rendered.contains("TRUE"));
        assert!(rendered.contains("2.0"));
    }

    #[test]
    fn missing_placeholder_gets_insertion() {
        let schema = ParamSchema::new().declare("id", ParamType::Int);
        // ensure_placeholders synthesizes a `0` after the directive, which
        // the validator then replaces
        let (statement, _, diags) = run(
            "WHERE id = /*= id */ AND b = 1",
            schema,
            vec![("id", serde_json::json!(9))],
        );

        assert!(!diags.has_errors());
        assert!(statement.render().contains("/*= id */9 AND"));
    }

    #[test]
    fn authored_null_placeholder_is_stripped() {
        let schema = ParamSchema::new().declare("id", ParamType::Int);
        let (statement, _, _) = run(
            "SET col = /*= id */ NULL",
            schema,
            vec![("id", serde_json::json!(3))],
        );

        let rendered = statement.render();
        assert!(rendered.contains("/*= id */3"));
        assert!(!rendered.to_uppercase().contains("NULL"));
    }

    #[test]
    fn undefined_expression_is_an_error() {
        let schema = ParamSchema::new();
        let (_, _, diags) = run("WHERE id = /*= missing */1", schema, vec![]);
        assert!(diags
            .iter()
            .any(|d| d.code == DiagnosticCode::UndefinedExpression));
    }

    #[test]
    fn condition_failure_is_hard_error() {
        let schema = ParamSchema::new();
        let (_, _, diags) = run("WHERE /* IF ghost */ a = 1 /* END */", schema, vec![]);
        assert!(diags
            .iter()
            .any(|d| d.code == DiagnosticCode::UndefinedExpression));
    }

    #[test]
    fn non_boolean_condition_is_a_type_mismatch() {
        let schema = ParamSchema::new().declare("limit", ParamType::Int);
        let (_, _, diags) = run("WHERE /* IF limit */ a = 1 /* END */", schema, vec![]);
        assert!(diags
            .iter()
            .any(|d| d.code == DiagnosticCode::ExpressionTypeMismatch));
    }

    #[test]
    fn malformed_for_directive() {
        let schema = ParamSchema::new().declare("tags", ParamType::array(ParamType::String));
        let (_, _, diags) = run("WHERE /* FOR tags */ a = 1 OR /* END */", schema, vec![]);
        assert!(diags
            .iter()
            .any(|d| d.code == DiagnosticCode::MalformedForDirective));
    }

    #[test]
    fn loop_body_needs_separator() {
        let schema = ParamSchema::new().declare("tags", ParamType::array(ParamType::String));

        let (_, _, diags) = run(
            "WHERE /* FOR t : tags */ name = /*= t */'x' /* END */",
            schema.clone(),
            vec![],
        );
        assert!(diags
            .iter()
            .any(|d| d.code == DiagnosticCode::LoopBodyMissingSeparator));

        let (_, _, diags) = run(
            "WHERE /* FOR t : tags */ name = /*= t */'x' OR /* END */",
            schema,
            vec![],
        );
        assert!(!diags
            .iter()
            .any(|d| d.code == DiagnosticCode::LoopBodyMissingSeparator));
    }

    #[test]
    fn loop_variable_resolves_and_pops() {
        let schema = ParamSchema::new().declare("tags", ParamType::array(ParamType::String));
        let (statement, _, diags) = run(
            "WHERE /* FOR t : tags */ name = /*= t */'x' OR /* END */ /*= missing_after */1",
            schema,
            vec![("tags", serde_json::json!(["a"]))],
        );

        // the loop variable resolved inside the body
        assert!(statement.render().contains("/*= t */'a'"));
        // and the trailing undefined expression still errored
        assert!(diags
            .iter()
            .any(|d| d.code == DiagnosticCode::UndefinedExpression));
    }

    #[test]
    fn non_array_iterable_is_a_type_mismatch() {
        let schema = ParamSchema::new().declare("tags", ParamType::Int);
        let (_, _, diags) = run("WHERE /* FOR t : tags */ a = 1 OR /* END */", schema, vec![]);
        assert!(diags
            .iter()
            .any(|d| d.code == DiagnosticCode::ExpressionTypeMismatch));
    }

    #[test]
    fn system_columns_bypass_scope() {
        let schema = ParamSchema::new();
        let (statement, types, diags) = run(
            "SET updated_at = /*= updated_at */'2020-01-01', v = /*= version */0",
            schema,
            vec![],
        );

        assert!(!diags.has_errors());
        // placeholders stay for render-time binding
        assert!(statement.render().contains("'2020-01-01'"));

        let names: Vec<&str> = types.values().map(|t| t.type_name.as_str()).collect();
        assert!(names.contains(&"TIMESTAMP"));
        assert!(names.contains(&"INT"));
    }

    #[test]
    fn end_sample_rows_are_removed() {
        let schema = ParamSchema::new().declare(
            "rows",
            ParamType::array(ParamType::object(vec![])),
        );
        let (statement, _, _) = run(
            "VALUES /* FOR r : rows */(0), /* END */('9')",
            schema,
            vec![("rows", serde_json::json!([{}]))],
        );

        let rendered = statement.render();
        assert!(!rendered.contains("'9'"));
        assert!(rendered.contains("/* END */"));
    }

    #[test]
    fn number_rendering() {
        assert_eq!(render_number(&serde_json::Number::from(7)), "7");
        let f = serde_json::Number::from_f64(2.0).unwrap();
        assert_eq!(render_number(&f), "2.0");
        let f = serde_json::Number::from_f64(1.25).unwrap();
        assert_eq!(render_number(&f), "1.25");
    }
}
