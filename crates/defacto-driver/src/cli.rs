use std::{ffi::OsString, ops::ControlFlow, path::PathBuf};

use anyhow::Context;
use clap::Parser;
use codespan_reporting::{
    diagnostic::Severity,
    term::{self, termcolor::ColorChoice as TermColor},
};
use defacto::{
    Database, Files, Target, Text,
    codegen::asm,
    diagnostics::Diagnostics,
    types::{Ast, SourceFile},
};
use tracing_subscriber::{EnvFilter, fmt::format::FmtSpan};

use crate::{Callbacks, Config, Outcome};

const QUIET_FILTER: &str = "warn";
const VERBOSE_FILTERS: &[&str] = &["debug", "defacto=trace", "defacto_syntax=trace", "defacto_driver=trace"];

/// A `main()` function that parses the command line arguments and runs the
/// compiler.
#[doc(hidden)]
pub fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { VERBOSE_FILTERS.join(",") } else { QUIET_FILTER.to_string() };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.parse().unwrap());

    tracing_subscriber::fmt()
        .compact()
        .with_env_filter(env_filter)
        .with_span_events(FmtSpan::CLOSE)
        .init();

    cli.run()
}

/// Compile a `.de` source file to native assembly, then assemble and link
/// it into an executable.
#[derive(Debug, clap::Parser)]
#[command(name = "defacto")]
struct Cli {
    /// Stop after writing assembly text; never invoke the assembler.
    #[clap(short = 'S')]
    stop_after_assembly: bool,
    /// The C driver used as a linker front-end on macOS targets.
    #[clap(long, env = "DEFACTO_CC", hide = true, default_value = "clang")]
    cc: OsString,
    /// The linker used on every other target.
    #[clap(long, env = "DEFACTO_LD", hide = true, default_value = "ld")]
    ld: OsString,
    /// The file to write the compiled binary (or assembly text, with `-S`) to.
    #[clap(short, long, default_value = "a.out")]
    output: PathBuf,
    /// Print verbose tracing to standard error.
    #[clap(short = 'v', long)]
    verbose: bool,
    #[clap(flatten)]
    target: TargetFlags,
    input: PathBuf,
}

/// The five backends, as a mutually exclusive flag group. With none given,
/// bare metal is the default everywhere except macOS, where the host's own
/// architecture is picked instead.
#[derive(Debug, Copy, Clone, Default, clap::Args)]
struct TargetFlags {
    /// Freestanding 32-bit x86, no libc.
    #[clap(long, group = "target")]
    kernel: bool,
    /// 32-bit Linux, `int 0x80` syscalls.
    #[clap(long, group = "target")]
    terminal: bool,
    /// 64-bit Linux, `syscall`.
    #[clap(long, group = "target")]
    terminal64: bool,
    /// 64-bit macOS.
    #[clap(long = "terminal-macos", group = "target")]
    terminal_macos: bool,
    /// AArch64, runs on both Linux and macOS.
    #[clap(long = "terminal-arm64", group = "target")]
    terminal_arm64: bool,
}

impl TargetFlags {
    fn resolve(self) -> Target {
        if self.terminal {
            return Target::Linux32;
        }
        if self.terminal64 {
            return Target::Linux64;
        }
        if self.terminal_macos {
            return Target::MacOs64;
        }
        if self.terminal_arm64 {
            return Target::Arm64 { macos: cfg!(target_os = "macos") };
        }
        if self.kernel {
            return Target::BareMetal;
        }

        if cfg!(target_os = "macos") {
            if cfg!(target_arch = "aarch64") {
                Target::Arm64 { macos: true }
            } else {
                Target::MacOs64
            }
        } else {
            Target::BareMetal
        }
    }
}

impl Cli {
    #[tracing::instrument(level = "info", skip_all)]
    pub fn run(self) -> anyhow::Result<()> {
        let src = std::fs::read_to_string(&self.input)
            .with_context(|| format!("failed to read {}", self.input.display()))?;
        let db = Database::default();

        let source_file =
            SourceFile::new(&db, Text::from(self.input.display().to_string()), src.into());

        let target = self.target.resolve();

        let cfg = Config {
            db,
            target,
            cc: self.cc.clone(),
            ld: self.ld.clone(),
            output: self.output.clone(),
            input: source_file,
            stop_after_assembly: self.stop_after_assembly,
        };

        let mut cb = DefaultCallbacks::new(Files::new());

        crate::callbacks::run(&mut cb, cfg).to_result_with(|ret| ret)
    }
}

#[derive(Debug, Clone)]
struct DefaultCallbacks {
    colour: TermColor,
    files: Files,
}

impl DefaultCallbacks {
    fn new(files: Files) -> Self {
        DefaultCallbacks { colour: TermColor::Auto, files }
    }

    fn emit_diagnostics(&self, diags: &[&Diagnostics]) -> Result<(), anyhow::Error> {
        let mut writer = codespan_reporting::term::termcolor::StandardStream::stderr(self.colour);
        let cfg = codespan_reporting::term::Config::default();

        for diag in diags {
            term::emit(&mut writer, &cfg, &self.files, &diag.to_codespan())?;
        }

        Ok(())
    }

    fn handle_diags(&mut self, diags: &[&Diagnostics]) -> ControlFlow<Result<(), anyhow::Error>> {
        if let Err(e) = self.emit_diagnostics(diags) {
            return ControlFlow::Break(Err(e));
        }

        if diags.iter().any(|d| d.severity() >= Severity::Error) {
            return ControlFlow::Break(Err(anyhow::anyhow!("compilation failed")));
        }

        ControlFlow::Continue(())
    }
}

impl Callbacks for DefaultCallbacks {
    type Output = Result<(), anyhow::Error>;

    fn after_parse<'db>(
        &mut self,
        db: &'db dyn defacto::Db,
        source_file: SourceFile,
        _ast: Ast<'db>,
        diags: Vec<&Diagnostics>,
    ) -> ControlFlow<Self::Output> {
        // `source_file` is the import-spliced file codegen and diagnostics
        // actually run against, not the one `Cli::run` read off disk.
        self.files.add(db, source_file);
        self.handle_diags(&diags)
    }

    fn after_codegen<'db>(
        &mut self,
        _db: &'db dyn defacto::Db,
        _asm: asm::Program<'db>,
        diags: Vec<&Diagnostics>,
    ) -> ControlFlow<Self::Output> {
        self.handle_diags(&diags)
    }

    fn after_render_assembly(
        &mut self,
        _db: &dyn defacto::Db,
        _asm: Text,
        diags: Vec<&Diagnostics>,
    ) -> ControlFlow<Self::Output> {
        self.handle_diags(&diags)
    }

    fn after_compile(&mut self, _db: &dyn defacto::Db, _binary: PathBuf) -> ControlFlow<Self::Output> {
        ControlFlow::Continue(())
    }
}

/// Maps a top-level [`anyhow::Error`] onto the process exit code the
/// command-line surface promises: 1 for a user or parser error, 2 when the
/// failure came from the external assembler or linker.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    if err.downcast_ref::<defacto::CommandError>().is_some() { 2 } else { 1 }
}
