//! Template tokenization and clause structure
//!
//! This crate handles:
//! - Tokenizing SQL template source, recognizing directive comments
//! - The clause abstraction (token-range read/replace/insert operations)
//! - Splitting a token stream into statement clauses

pub mod clause;
pub mod lexer;
pub mod scanner;

pub use clause::{Clause, ClauseKind, Statement, StatementKind};
pub use lexer::{tokenize, LexError};
pub use scanner::scan_statement;
