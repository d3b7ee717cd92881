//! The directive-processing pipeline
//!
//! Keeps two representations of a SQL template consistent at once: a
//! syntactically valid skeleton statement (so a conventional SQL grammar can
//! parse clause structure) and a semantically rich directive graph (so
//! runtime template behavior is correct).
//!
//! Stage order:
//! 1. Balance validation over the raw token stream
//! 2. Placeholder insertion (every value directive gets a literal)
//! 3. Placeholder range detection, per clause
//! 4. Array/object expansion inside INSERT VALUES
//! 5. Directive chain linking and boundary checks
//! 6. Implicit LIMIT/OFFSET condition synthesis
//! 7. Expression and scope validation, resolving placeholders to typed
//!    literals
//!
//! Every stage accumulates into a shared [`twosql_core::Diagnostics`]
//! collector; any error blocks code generation.

pub mod balance;
pub mod chain;
pub mod expansion;
pub mod implicit;
pub mod pipeline;
pub mod placeholder;
pub mod validate;

pub use pipeline::{process_template, Pipeline, ProcessResult, ValidationMode};
pub use validate::TypeDescriptor;
