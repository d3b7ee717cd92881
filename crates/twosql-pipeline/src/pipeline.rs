//! Pipeline driver
//!
//! Sequences the stages over one statement:
//! balance -> placeholder insertion -> clause scan -> range detection ->
//! VALUES expansion -> re-detection -> chain linking -> implicit condition
//! -> validation.
//!
//! Strict mode runs everything; Inspect mode skips the semantic stages and
//! yields best-effort structural output even with an incomplete schema.

use crate::validate::TypeDescriptor;
use crate::{balance, chain, expansion, implicit, placeholder, validate};
use std::collections::BTreeMap;
use twosql_core::{
    Diagnostic, DiagnosticCode, Diagnostics, Location, ParamSchema, TypeRegistry,
};
use twosql_expr::EvaluationScope;
use twosql_parse::{scan_statement, tokenize, ClauseKind, Statement};

/// Validation mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationMode {
    /// Full structural and semantic validation
    Strict,

    /// Structural stages only; semantic validation is skipped so structural
    /// facts can be extracted even with an incomplete schema
    Inspect,
}

/// The directive-processing pipeline
#[derive(Debug, Clone, Copy)]
pub struct Pipeline {
    mode: ValidationMode,
}

impl Pipeline {
    /// Create a strict pipeline
    pub fn new() -> Self {
        Self {
            mode: ValidationMode::Strict,
        }
    }

    /// Set the validation mode
    pub fn with_mode(mut self, mode: ValidationMode) -> Self {
        self.mode = mode;
        self
    }

    /// Run the per-clause stages over a scanned statement
    ///
    /// Returns the position-to-type map for downstream result-shape
    /// generation; diagnostics accumulate into `diags`.
    pub fn run(
        &self,
        statement: &mut Statement,
        scope: &mut EvaluationScope<'_>,
        diags: &mut Diagnostics,
    ) -> BTreeMap<usize, TypeDescriptor> {
        let columns = statement.insert_columns().to_vec();
        let mut types = BTreeMap::new();

        for clause in statement.clauses_mut() {
            placeholder::detect_placeholder_ranges(clause);
        }

        if self.mode == ValidationMode::Strict {
            for clause in statement.clauses_mut() {
                if clause.kind() == ClauseKind::Values {
                    expansion::expand_values_clause(clause, &columns, scope, diags);
                }
                expansion::check_in_operands(clause, scope, diags);
            }

            // expansion minted new directives; re-detect their placeholders
            for clause in statement.clauses_mut() {
                placeholder::detect_placeholder_ranges(clause);
            }
        }

        for clause in statement.clauses_mut() {
            chain::link_chains(clause, diags);
            implicit::synthesize_implicit_condition(clause);
        }

        if self.mode == ValidationMode::Strict {
            for clause in statement.clauses_mut() {
                validate::validate_clause(clause, scope, &mut types, diags);
            }
        }

        tracing::debug!(
            directives = types.len(),
            diagnostics = diags.len(),
            "pipeline finished"
        );

        types
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of processing one template
#[derive(Debug)]
pub struct ProcessResult {
    /// The scanned (and, in strict mode, resolved) statement
    pub statement: Option<Statement>,

    /// Resolved SQL, present only when no error accumulated - any error
    /// blocks code generation
    pub rendered: Option<String>,

    /// Position-to-type map for result-shape generation
    pub types: BTreeMap<usize, TypeDescriptor>,

    /// Everything every stage reported
    pub diagnostics: Diagnostics,
}

impl ProcessResult {
    /// Whether the template is ready for code generation
    pub fn is_ok(&self) -> bool {
        !self.diagnostics.has_errors()
    }
}

/// Tokenize, validate, and resolve one template from source text
pub fn process_template(
    source: &str,
    schema: &ParamSchema,
    values: &serde_json::Map<String, serde_json::Value>,
    constants: serde_json::Map<String, serde_json::Value>,
    registry: &TypeRegistry,
    mode: ValidationMode,
) -> ProcessResult {
    let mut diagnostics = Diagnostics::new();

    let mut tokens = match tokenize(source) {
        Ok(tokens) => tokens,
        Err(err) => {
            let (line, column) = err.position();
            diagnostics.push(
                Diagnostic::error(DiagnosticCode::TemplateSyntaxError, err.to_string())
                    .with_location(Location::at(line, column)),
            );
            return ProcessResult {
                statement: None,
                rendered: None,
                types: BTreeMap::new(),
                diagnostics,
            };
        }
    };

    balance::validate_balance(&tokens, &mut diagnostics);
    placeholder::ensure_placeholders(&mut tokens);

    let mut statement = scan_statement(tokens);
    let mut scope = EvaluationScope::new(schema, values, constants, registry);
    let types = Pipeline::new()
        .with_mode(mode)
        .run(&mut statement, &mut scope, &mut diagnostics);

    let rendered = if diagnostics.has_errors() {
        None
    } else {
        Some(statement.render())
    };

    ProcessResult {
        statement: Some(statement),
        rendered,
        types,
        diagnostics,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;
    use twosql_core::ParamType;

    fn values_of(pairs: Vec<(&str, serde_json::Value)>) -> Map<String, serde_json::Value> {
        pairs
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }

    #[test]
    fn strict_run_resolves_and_renders() {
        let schema = ParamSchema::new().declare("id", ParamType::Int);
        let registry = TypeRegistry::new();
        let result = process_template(
            "SELECT a FROM t WHERE id = /*= id */1",
            &schema,
            &values_of(vec![("id", serde_json::json!(42))]),
            Map::new(),
            &registry,
            ValidationMode::Strict,
        );

        assert!(result.is_ok());
        assert!(result.rendered.unwrap().contains("/*= id */42"));
        assert_eq!(result.types.len(), 1);
    }

    #[test]
    fn errors_block_rendering() {
        let schema = ParamSchema::new();
        let registry = TypeRegistry::new();
        let result = process_template(
            "SELECT a FROM t WHERE id = /*= nope */1",
            &schema,
            &Map::new(),
            Map::new(),
            &registry,
            ValidationMode::Strict,
        );

        assert!(!result.is_ok());
        assert!(result.rendered.is_none());
        // the statement itself survives for inspection
        assert!(result.statement.is_some());
    }

    #[test]
    fn inspect_mode_skips_semantic_checks() {
        // undefined parameter, but inspect mode only cares about structure
        let schema = ParamSchema::new();
        let registry = TypeRegistry::new();
        let result = process_template(
            "SELECT a FROM t WHERE id = /*= nope */1 /* IF ghost */ AND b = 1 /* END */",
            &schema,
            &Map::new(),
            Map::new(),
            &registry,
            ValidationMode::Inspect,
        );

        assert!(result.is_ok());
        assert!(result.types.is_empty());
    }

    #[test]
    fn inspect_mode_still_reports_structure() {
        let schema = ParamSchema::new();
        let registry = TypeRegistry::new();
        let result = process_template(
            "SELECT a FROM t WHERE /* IF x */ a = 1",
            &schema,
            &Map::new(),
            Map::new(),
            &registry,
            ValidationMode::Inspect,
        );

        assert!(!result.is_ok());
        assert!(result
            .diagnostics
            .iter()
            .any(|d| d.code == DiagnosticCode::UnbalancedDirective));
    }

    #[test]
    fn lex_failure_is_a_template_syntax_error() {
        let schema = ParamSchema::new();
        let registry = TypeRegistry::new();
        let result = process_template(
            "SELECT 'oops",
            &schema,
            &Map::new(),
            Map::new(),
            &registry,
            ValidationMode::Strict,
        );

        assert!(!result.is_ok());
        assert!(result
            .diagnostics
            .iter()
            .any(|d| d.code == DiagnosticCode::TemplateSyntaxError));
        assert!(result.statement.is_none());
    }
}
