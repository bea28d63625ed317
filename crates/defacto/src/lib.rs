//! defacto — compiler core
//!
//! This crate implements the compilation pipeline for the defacto systems
//! language: a small, statically-typed language that lowers directly to
//! native assembly across five backends (bare-metal x86-32, 32-bit and
//! 64-bit Linux, 64-bit macOS, and AArch64). It is designed to be embedded
//! in tools and tests, and powers the `defacto` command-line tool in the
//! `defacto-driver` crate.
//!
//! The pipeline is linear, with each stage tracked by [`salsa`] to enable
//! incremental recomputation and diagnostics accumulation:
//!
//! - Import splicing: [`splice_imports`]
//! - Parsing: [`parse`]
//! - Code generation (ASM IR): [`codegen::generate_assembly`]
//! - Rendering (assembly text): [`render::render_program`]
//! - Assembling and linking: [`assemble_and_link`]
//!
//! There is no separate lowering stage: unlike a three-address-code
//! pipeline, [`codegen::generate_assembly`] walks the parse tree directly
//! and streams target assembly in one pass.
//!
//! Data is passed through well-defined types like [`types::SourceFile`],
//! [`types::Ast`], [`codegen::asm::Program`], and [`Text`]. Diagnostics are
//! accumulated via a salsa accumulator, see [`diagnostics`]. Targets are
//! described by [`target::Target`], one of the five backends named on the
//! driver's command line.
//!
//! Quick start
//! -----------
//! Parse, generate, and render a tiny program to assembly text:
//!
//! ```rust
//! use defacto::{Database, SourceFile, Text, Target};
//!
//! let db = Database::default();
//! let src = concat!(
//!     "#Mainprogramm.start\n",
//!     "<.de\n",
//!     "var msg: string = \"hi\"\n",
//!     "display{msg}\n",
//!     ".>\n",
//!     "#Mainprogramm.end\n",
//! );
//! let file = SourceFile::new(&db, Text::from("main.de"), Text::from(src));
//!
//! // Parse -> ASM IR -> assembly text
//! let ast = defacto::parse(&db, file);
//! let program = defacto::codegen::generate_assembly(&db, ast, file, Target::Linux64);
//! let asm_text = defacto::render_program(&db, program).unwrap();
//!
//! assert!(asm_text.as_str().contains("_start"));
//! ```
//!
//! Capturing diagnostics
//! ---------------------
//! Each stage can emit diagnostics which are accumulated rather than
//! panicking. You can retrieve them using the stage's `accumulated::<T>()`
//! helper:
//!
//! ```rust
//! use defacto::{Database, SourceFile, Text, diagnostics::Diagnostics};
//!
//! let db = Database::default();
//! let file = SourceFile::new(&db, "main.de".into(), "#Mainprogramm.start\n#Mainprogramm.end\n".into());
//! let _ = defacto::parse(&db, file);
//! let diags: Vec<&Diagnostics> = defacto::parse::accumulated::<Diagnostics>(&db, file);
//! // Render with codespan-reporting using `defacto::Files`
//! ```
//!
//! Targets and OS-specific behavior
//! --------------------------------
//! Rendering takes a [`target::Target`] — there is no single default, the
//! driver always names the backend explicitly (`-kernel`, `-terminal`,
//! `-terminal64`, `-terminal-macos`, `-terminal-arm64`). On macOS, libc
//! symbol names are rendered with a leading underscore (e.g. `_malloc`);
//! on bare metal, no libc is available at all.
//!
//! Notes on preprocessing
//! ----------------------
//! [`splice_imports`] resolves `Import{name}` directives by reading
//! `name.de` from the source file's directory, then from `lib/`, and
//! splicing its text in — there is no C-style preprocessor in this
//! pipeline.
//!
//! See also
//! --------
//! - [`codegen::asm`] for the assembly IR
//! - [`diagnostics`] for diagnostics accumulation and error codes
//! - `defacto-driver` for CLI orchestration and staged callbacks

mod assembling;
mod cmd;
pub mod codegen;
pub mod codes;
mod debug;
pub mod diagnostics;
mod files;
mod parsing;
mod preprocessing;
pub mod render;
pub mod target;
mod text;
pub mod types;

use std::fmt::{self, Debug};

pub use crate::{
    assembling::{assemble, assemble_and_link, link},
    cmd::CommandError,
    codegen::generate_assembly,
    debug::SerializeWithDatabase,
    files::Files,
    parsing::parse,
    preprocessing::{PreprocessorError, splice_imports},
    render::render_program,
    target::Target,
    text::Text,
    types::{Ast, SourceFile, Tree},
};

#[salsa::db]
pub trait Db: salsa::Database {}

#[salsa::db]
impl<T: salsa::Database> Db for T {}

#[salsa::db]
#[derive(Default, Clone)]
pub struct Database {
    storage: salsa::Storage<Self>,
}

#[salsa::db]
impl salsa::Database for Database {}

impl Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Database { storage: _ } = self;

        f.debug_struct("Database").finish_non_exhaustive()
    }
}
