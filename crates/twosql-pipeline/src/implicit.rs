//! Implicit condition synthesis
//!
//! A LIMIT or OFFSET clause bound to exactly one variable directive gets an
//! implicit presence guard: omitting the value at render time drops the
//! clause instead of emitting a null limit. Zero or multiple variable
//! directives leave the clause explicit - guessing which variable gates the
//! clause would be ambiguous.

use twosql_core::DirectiveKind;
use twosql_parse::Clause;

/// Synthesize `<expr> != null` as the effective clause condition
pub fn synthesize_implicit_condition(clause: &mut Clause) {
    if !clause.kind().is_limit_like() || clause.condition().is_some() {
        return;
    }

    let exprs: Vec<String> = clause
        .tokens()
        .iter()
        .filter_map(|t| t.metadata())
        .filter(|m| m.kind == DirectiveKind::Variable)
        .map(|m| m.expr.clone())
        .collect();

    if let [expr] = exprs.as_slice() {
        let condition = format!("{} != null", expr);
        tracing::debug!(clause = ?clause.kind(), condition = %condition, "synthesized implicit condition");
        clause.set_condition(condition);
    }
}
