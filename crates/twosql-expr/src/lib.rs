//! Embedded expression evaluation
//!
//! Directive expressions (`/*= user.id */`, `/* IF limit != null */`,
//! `/* FOR r : rows */`) are evaluated with minijinja against a scope built
//! from declared parameters, constants, and loop bindings. Parameters with
//! no bound value are evaluated against dummy values synthesized from their
//! declared types, so validation can run ahead of time.

pub mod scope;

pub use scope::{Evaluated, EvalError, EvaluationScope};
