//! twosql Core
//!
//! Core domain model with stable, versioned types.
//! Never rename diagnostic codes - they are part of the public API.

pub mod config;
pub mod diagnostic;
pub mod report;
pub mod schema;
pub mod token;

pub use config::{Config, SeverityThreshold};
pub use diagnostic::{Diagnostic, DiagnosticCode, DiagnosticFamily, Diagnostics, Location, Severity};
pub use report::{Report, ReportVersion};
pub use schema::{system_column_type, FieldDecl, ParamDecl, ParamSchema, ParamType, SchemaFile, TypeRegistry};
pub use token::{DirectiveKind, DirectiveMetadata, LoopBinding, SourcePos, Token, TokenKind};
