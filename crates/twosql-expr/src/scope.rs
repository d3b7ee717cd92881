//! Evaluation scope
//!
//! A stack of named bindings: declared parameters, constants, and loop
//! variables. Loop bindings are pushed on loop entry and popped on exit,
//! nesting to match directive nesting depth.

use minijinja::{Environment, UndefinedBehavior, Value};
use serde_json::Map;
use std::collections::HashMap;
use twosql_core::{ParamSchema, ParamType, TypeRegistry};

/// Evaluation error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvalError {
    #[error("undefined expression `{expr}`: {message}")]
    Undefined { expr: String, message: String },

    #[error("failed to evaluate `{expr}`: {message}")]
    Eval { expr: String, message: String },
}

impl EvalError {
    /// Whether the error is an undefined-name error
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined { .. })
    }
}

/// A successfully evaluated expression
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluated {
    /// Evaluated value
    pub value: serde_json::Value,

    /// Inferred logical type
    pub ty: ParamType,
}

/// Named-binding environment for directive expressions
///
/// Instantiated per statement; the registry is shared by reference across
/// statements.
pub struct EvaluationScope<'r> {
    registry: &'r TypeRegistry,
    declared: HashMap<String, ParamType>,
    params: Map<String, serde_json::Value>,
    constants: Map<String, serde_json::Value>,
    loops: Vec<(String, serde_json::Value)>,
}

impl<'r> EvaluationScope<'r> {
    /// Build a scope from a schema, parameter values, and constants
    ///
    /// Declared parameters without a bound value get a dummy value
    /// synthesized from their declared type.
    pub fn new(
        schema: &ParamSchema,
        values: &Map<String, serde_json::Value>,
        constants: Map<String, serde_json::Value>,
        registry: &'r TypeRegistry,
    ) -> Self {
        let mut params = Map::new();
        let mut declared = HashMap::new();

        for decl in &schema.params {
            let value = values
                .get(&decl.name)
                .cloned()
                .unwrap_or_else(|| decl.ty.dummy_value(registry));
            params.insert(decl.name.clone(), value);
            declared.insert(decl.name.clone(), decl.ty.clone());
        }

        Self {
            registry,
            declared,
            params,
            constants,
            loops: Vec::new(),
        }
    }

    /// Evaluate an expression against parameters and loop bindings
    pub fn evaluate(&self, expr: &str) -> Result<Evaluated, EvalError> {
        let value = eval_expression(expr, &self.param_context())?;
        let ty = self.infer_type(expr, &value);
        Ok(Evaluated { value, ty })
    }

    /// Evaluate an expression against the constants map only
    pub fn evaluate_const(&self, expr: &str) -> Result<Evaluated, EvalError> {
        let value = eval_expression(expr, &self.constants)?;
        let ty = ParamType::of_value(&value);
        Ok(Evaluated { value, ty })
    }

    /// Push a loop binding; the variable is bound to the first element
    ///
    /// An empty collection binds null - element-typed expressions then fail
    /// evaluation, which is the correct signal when nothing is known about
    /// the element shape.
    pub fn enter_loop(&mut self, name: impl Into<String>, elements: &[serde_json::Value]) {
        let element = elements.first().cloned().unwrap_or(serde_json::Value::Null);
        self.loops.push((name.into(), element));
    }

    /// Pop the innermost loop binding
    pub fn exit_loop(&mut self) {
        self.loops.pop();
    }

    /// Current loop nesting depth
    pub fn loop_depth(&self) -> usize {
        self.loops.len()
    }

    /// Type of a loop variable, if bound
    pub fn loop_variable_type(&self, name: &str) -> Option<ParamType> {
        self.loops
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| ParamType::of_value(v))
    }

    /// Whether a name is a declared parameter
    pub fn is_declared(&self, name: &str) -> bool {
        self.declared.contains_key(name)
    }

    fn param_context(&self) -> Map<String, serde_json::Value> {
        let mut ctx = self.params.clone();
        for (name, value) in &self.loops {
            ctx.insert(name.clone(), value.clone());
        }
        ctx
    }

    /// Prefer the declared type when the expression is a bare parameter
    /// name; otherwise infer from the evaluated value
    fn infer_type(&self, expr: &str, value: &serde_json::Value) -> ParamType {
        if let Some(ty) = self.declared.get(expr.trim()) {
            return ty.resolve(self.registry).clone();
        }
        ParamType::of_value(value)
    }
}

fn eval_expression(
    expr: &str,
    ctx: &Map<String, serde_json::Value>,
) -> Result<serde_json::Value, EvalError> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    // templates compare against `null`, which minijinja spells `none`
    env.add_global("null", Value::from(()));

    let compiled = env.compile_expression(expr).map_err(|e| EvalError::Eval {
        expr: expr.to_string(),
        message: e.to_string(),
    })?;

    let outcome = compiled
        .eval(Value::from_serialize(ctx))
        .map_err(|e| match e.kind() {
            minijinja::ErrorKind::UndefinedError => EvalError::Undefined {
                expr: expr.to_string(),
                message: e.to_string(),
            },
            _ => EvalError::Eval {
                expr: expr.to_string(),
                message: e.to_string(),
            },
        })?;

    serde_json::to_value(&outcome).map_err(|e| EvalError::Eval {
        expr: expr.to_string(),
        message: e.to_string(),
    })
}
