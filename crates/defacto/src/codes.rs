//! Common error codes used across the compiler.
//!
//! Hand-authored to match the shape `xtask error-codes` would generate from
//! `error-codes.yaml` — see `crates/xtask/src/error_codes.rs` for the
//! generator this mirrors.
#![allow(non_upper_case_globals)]
use codespan_reporting::diagnostic::Severity;

#[derive(Debug, Clone, PartialEq, Eq, Ord, PartialOrd, Hash)]
pub struct ErrorCode {
    pub segments: &'static [&'static str],
    pub severity: Severity,
    pub description: &'static str,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                write!(f, "::")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

/// All error codes.
pub const ALL: &[ErrorCode] = &[
    lex::unknown_character,
    parse::structural,
    parse::recoverable,
    resolve::undefined_symbol,
    discipline::violation,
    codegen::unused_before_free,
    external::tool_failed,
];

/// The error codes definition, as YAML.
pub const DEFINITION: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/error-codes.yaml"));

pub mod lex {
    use super::*;

    /// An unrecognised character was skipped by the lexer.
    pub const unknown_character: ErrorCode = ErrorCode {
        segments: &["lex", "unknown_character"],
        severity: Severity::Warning,
        description: "An unrecognised character was skipped by the lexer.",
    };
}

pub mod parse {
    use super::*;

    /// A structural mismatch in the token stream (wrong token class,
    /// missing delimiter, undefined type, or similar).
    pub const structural: ErrorCode = ErrorCode {
        segments: &["parse", "structural"],
        severity: Severity::Error,
        description: "A structural mismatch in the token stream (wrong token class, missing delimiter, undefined type, or similar).",
    };

    /// An unrecognised statement or token was skipped; parsing continued
    /// past it.
    pub const recoverable: ErrorCode = ErrorCode {
        segments: &["parse", "recoverable"],
        severity: Severity::Warning,
        description: "An unrecognised statement or token was skipped; parsing continued past it.",
    };
}

pub mod resolve {
    use super::*;

    /// A variable, array, struct, or field reference did not resolve in
    /// the symbol table.
    pub const undefined_symbol: ErrorCode = ErrorCode {
        segments: &["resolve", "undefined_symbol"],
        severity: Severity::Error,
        description: "A variable, array, struct, or field reference did not resolve in the symbol table.",
    };
}

pub mod discipline {
    use super::*;

    /// A const-immutability or memory-discipline rule was violated.
    pub const violation: ErrorCode = ErrorCode {
        segments: &["discipline", "violation"],
        severity: Severity::Error,
        description: "A const-immutability or memory-discipline rule was violated (assignment to const, free of const, break outside a loop, const array, const missing initializer).",
    };
}

pub mod codegen {
    use super::*;

    /// An identifier was auto-freed at the end of its section without ever
    /// having been read from.
    pub const unused_before_free: ErrorCode = ErrorCode {
        segments: &["codegen", "unused_before_free"],
        severity: Severity::Warning,
        description: "An identifier was auto-freed at the end of its section without ever having been read from.",
    };
}

pub mod external {
    use super::*;

    /// The external assembler or linker exited unsuccessfully.
    pub const tool_failed: ErrorCode = ErrorCode {
        segments: &["external", "tool_failed"],
        severity: Severity::Error,
        description: "The external assembler or linker exited unsuccessfully.",
    };
}
