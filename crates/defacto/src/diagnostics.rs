use codespan_reporting::diagnostic::{Label, Severity};
use salsa::Accumulator;

use crate::{
    Db, Text,
    types::{SourceFile, Span},
};

type CodespanDiagnostic = codespan_reporting::diagnostic::Diagnostic<SourceFile>;

/// A newtype wrapper around [`DiagnosticKind`], accumulated as the compiler
/// runs. This crate standardises on the plural `Diagnostics` name for the
/// accumulator across every stage (lexing, parsing, code generation).
#[repr(transparent)]
#[salsa::accumulator]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostics(pub DiagnosticKind);

impl Diagnostics {
    pub fn to_codespan(&self) -> CodespanDiagnostic {
        self.0.to_codespan()
    }

    pub fn severity(&self) -> Severity {
        self.0.to_codespan().severity
    }
}

impl<K: Into<DiagnosticKind>> From<K> for Diagnostics {
    fn from(k: K) -> Self {
        Diagnostics(k.into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, thiserror::Error)]
pub enum DiagnosticKind {
    #[error(transparent)]
    Lex(LexWarning),
    #[error(transparent)]
    Parse(ParseError),
    #[error(transparent)]
    ParseWarning(ParseWarning),
    #[error(transparent)]
    Resolve(ResolveError),
    #[error(transparent)]
    Discipline(DisciplineError),
    #[error(transparent)]
    CodegenWarning(CodegenWarning),
    #[error(transparent)]
    External(ExternalError),
}

impl DiagnosticKind {
    pub fn to_codespan(&self) -> CodespanDiagnostic {
        match self {
            DiagnosticKind::Lex(e) => e.to_codespan(),
            DiagnosticKind::Parse(e) => e.to_codespan(),
            DiagnosticKind::ParseWarning(e) => e.to_codespan(),
            DiagnosticKind::Resolve(e) => e.to_codespan(),
            DiagnosticKind::Discipline(e) => e.to_codespan(),
            DiagnosticKind::CodegenWarning(e) => e.to_codespan(),
            DiagnosticKind::External(e) => e.to_codespan(),
        }
    }
}

/// An unrecognised character — a warning, never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, thiserror::Error)]
#[error("unknown character '{ch}'")]
pub struct LexWarning {
    pub file: SourceFile,
    pub span: Span,
    pub ch: char,
}

impl LexWarning {
    pub fn accumulate(self, db: &dyn Db) {
        Diagnostics::from(self).accumulate(db);
    }

    pub fn to_codespan(&self) -> CodespanDiagnostic {
        CodespanDiagnostic::new(Severity::Warning)
            .with_code(crate::codes::lex::unknown_character.to_string())
            .with_message(format!("unknown character '{}'", self.ch))
            .with_label(Label::primary(self.file, self.span))
    }
}

/// A structural parse failure: wrong token class, missing delimiter,
/// undefined type, and similar. Always fatal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, thiserror::Error)]
#[error("{msg}")]
pub struct ParseError {
    pub file: SourceFile,
    pub span: Span,
    pub msg: Text,
}

impl ParseError {
    pub fn accumulate(self, db: &dyn Db) {
        Diagnostics::from(self).accumulate(db);
    }

    pub fn to_codespan(&self) -> CodespanDiagnostic {
        CodespanDiagnostic::new(Severity::Error)
            .with_code(crate::codes::parse::structural.to_string())
            .with_message(self.msg.to_string())
            .with_label(Label::primary(self.file, self.span))
    }
}

impl From<ParseError> for DiagnosticKind {
    fn from(value: ParseError) -> Self {
        DiagnosticKind::Parse(value)
    }
}

/// A recoverable parse hiccup: an unrecognised statement or token that the
/// parser skipped and continued past, rather than aborting on. Never
/// fatal, unlike [`ParseError`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, thiserror::Error)]
#[error("{msg}")]
pub struct ParseWarning {
    pub file: SourceFile,
    pub msg: Text,
}

impl ParseWarning {
    pub fn accumulate(self, db: &dyn Db) {
        Diagnostics::from(self).accumulate(db);
    }

    pub fn to_codespan(&self) -> CodespanDiagnostic {
        CodespanDiagnostic::new(Severity::Warning)
            .with_code(crate::codes::parse::recoverable.to_string())
            .with_message(self.msg.to_string())
    }
}

impl From<ParseWarning> for DiagnosticKind {
    fn from(value: ParseWarning) -> Self {
        DiagnosticKind::ParseWarning(value)
    }
}

impl From<LexWarning> for DiagnosticKind {
    fn from(value: LexWarning) -> Self {
        DiagnosticKind::Lex(value)
    }
}

/// An undefined variable/array/struct/field reference at code-gen time
/// Always fatal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, thiserror::Error)]
#[error("{msg}")]
pub struct ResolveError {
    pub file: SourceFile,
    pub msg: Text,
}

impl ResolveError {
    pub fn accumulate(self, db: &dyn Db) {
        Diagnostics::from(self).accumulate(db);
    }

    pub fn to_codespan(&self) -> CodespanDiagnostic {
        CodespanDiagnostic::new(Severity::Error)
            .with_code(crate::codes::resolve::undefined_symbol.to_string())
            .with_message(self.msg.to_string())
    }
}

impl From<ResolveError> for DiagnosticKind {
    fn from(value: ResolveError) -> Self {
        DiagnosticKind::Resolve(value)
    }
}

/// Const-immutability or memory-discipline violation: assignment to
/// const, free of const, `break` outside a loop, const array, const
/// missing initializer. Always fatal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, thiserror::Error)]
#[error("{msg}")]
pub struct DisciplineError {
    pub file: SourceFile,
    pub msg: Text,
}

impl DisciplineError {
    pub fn accumulate(self, db: &dyn Db) {
        Diagnostics::from(self).accumulate(db);
    }

    pub fn to_codespan(&self) -> CodespanDiagnostic {
        CodespanDiagnostic::new(Severity::Error)
            .with_code(crate::codes::discipline::violation.to_string())
            .with_message(self.msg.to_string())
    }
}

impl From<DisciplineError> for DiagnosticKind {
    fn from(value: DisciplineError) -> Self {
        DiagnosticKind::Discipline(value)
    }
}

/// A warning emitted when the end-of-section sweep auto-frees an
/// identifier that was never read.
#[derive(Debug, Clone, PartialEq, Eq, Hash, thiserror::Error)]
#[error("'{name}' is auto-freed without ever having been read from")]
pub struct CodegenWarning {
    pub file: SourceFile,
    pub name: Text,
}

impl CodegenWarning {
    pub fn accumulate(self, db: &dyn Db) {
        Diagnostics::from(self).accumulate(db);
    }

    pub fn to_codespan(&self) -> CodespanDiagnostic {
        CodespanDiagnostic::new(Severity::Warning)
            .with_code(crate::codes::codegen::unused_before_free.to_string())
            .with_message(self.to_string())
    }
}

impl From<CodegenWarning> for DiagnosticKind {
    fn from(value: CodegenWarning) -> Self {
        DiagnosticKind::CodegenWarning(value)
    }
}

/// Assembler/linker failure, surfaced with exit code 2.
#[derive(Debug, Clone, PartialEq, Eq, Hash, thiserror::Error)]
#[error(transparent)]
pub struct ExternalError(#[from] pub crate::cmd::CommandError);

impl ExternalError {
    pub fn accumulate(self, db: &dyn Db) {
        Diagnostics::from(self).accumulate(db);
    }

    pub fn to_codespan(&self) -> CodespanDiagnostic {
        CodespanDiagnostic::new(Severity::Error)
            .with_code(crate::codes::external::tool_failed.to_string())
            .with_message(self.0.to_string())
    }
}

impl From<ExternalError> for DiagnosticKind {
    fn from(value: ExternalError) -> Self {
        DiagnosticKind::External(value)
    }
}
