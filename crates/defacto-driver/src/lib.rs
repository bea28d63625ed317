//! defacto compiler driver
//!
//! This crate provides the command-line interface and orchestration for the
//! `defacto` compiler. It wires together the stages from the `defacto`
//! crate, manages temporary files, captures diagnostics between stages, and
//! exposes a small callback API for tooling and testing.
//!
//! What this crate offers
//! ----------------------
//! - A `main()` entrypoint for the `defacto` binary: [`cli::main`]
//! - A stage runner with callbacks: [`run`] and the [`Callbacks`] trait
//! - A configuration object for compilation sessions: [`Config`]
//! - An outcome type capturing success, error, or early return: [`Outcome`]
//!
//! Running the pipeline with callbacks
//! -----------------------------------
//! The [`run`] function executes the full pipeline: import splicing →
//! parsing → codegen → rendering → assemble+link. There is no lowering
//! stage — codegen walks the parse tree directly.
//!
//! You can implement [`Callbacks`] to observe intermediate artifacts, collect
//! diagnostics, or stop the pipeline early:
//!
//! ```rust
//! use std::ops::ControlFlow;
//! use defacto_driver::{Callbacks, Config, Outcome};
//! use defacto::{Text, diagnostics::Diagnostics, codegen::asm, types::{Ast, SourceFile}};
//!
//! struct Noop;
//! impl Callbacks for Noop {
//!     type Output = ();
//!
//!     fn after_parse<'db>(
//!         &mut self,
//!         _db: &'db dyn defacto::Db,
//!         _source_file: SourceFile,
//!         _ast: Ast<'db>,
//!         _diags: Vec<&Diagnostics>,
//!     ) -> ControlFlow<Self::Output> {
//!         ControlFlow::Continue(())
//!     }
//!
//!     fn after_codegen<'db>(
//!         &mut self,
//!         _db: &'db dyn defacto::Db,
//!         _asm: asm::Program<'db>,
//!         _diags: Vec<&Diagnostics>,
//!     ) -> ControlFlow<Self::Output> { ControlFlow::Continue(()) }
//!
//!     fn after_render_assembly(
//!         &mut self,
//!         _db: &dyn defacto::Db,
//!         _asm: Text,
//!         _diags: Vec<&Diagnostics>,
//!     ) -> ControlFlow<Self::Output> { ControlFlow::Continue(()) }
//! }
//!
//! // In your application:
//! // let outcome = defacto_driver::run(&mut Noop, config);
//! // outcome.to_result()?;
//! ```
//!
//! CLI entrypoint
//! --------------
//! The binary uses [`cli::main`] to parse flags (target, output path,
//! `-S`, `-v`, etc.), set up tracing, and delegate to [`run`]. See
//! `crates/defacto-driver/src/cli.rs` for details.

mod callbacks;
mod cli;

pub use crate::{
    callbacks::{Callbacks, Config, Outcome, run},
    cli::{exit_code, main},
};
