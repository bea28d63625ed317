use std::{ffi::OsString, ops::ControlFlow, path::PathBuf};

use defacto::{
    Text,
    codegen::asm,
    diagnostics::Diagnostics,
    target::Target,
    types::{Ast, SourceFile},
};

/// Everything [`run`] needs to compile one source file for one target.
#[derive(Debug, Clone)]
pub struct Config {
    pub db: defacto::Database,
    pub target: Target,
    /// `DEFACTO_CC`: the clang-as-link-frontend used on macOS targets.
    pub cc: OsString,
    /// `DEFACTO_LD`: the linker used everywhere else.
    pub ld: OsString,
    pub output: PathBuf,
    pub input: SourceFile,
    /// `-S`: stop after writing assembly text, never invoke the assembler.
    pub stop_after_assembly: bool,
}

#[derive(Debug)]
pub enum Outcome<Ret> {
    /// The compilation succeeded.
    Ok,
    /// The compilation failed.
    Err(anyhow::Error),
    /// The compilation returned early.
    EarlyReturn(Ret),
}

impl<Ret> Outcome<Ret> {
    pub fn to_result_with(
        self,
        f: impl FnOnce(Ret) -> Result<(), anyhow::Error>,
    ) -> Result<(), anyhow::Error> {
        match self {
            Self::Ok => Ok(()),
            Self::Err(e) => Err(e),
            Self::EarlyReturn(ret) => f(ret),
        }
    }

    pub fn to_result(self) -> Result<(), anyhow::Error> {
        self.to_result_with(|_| Err(anyhow::anyhow!("returned early")))
    }
}

impl<Ret> From<anyhow::Error> for Outcome<Ret> {
    fn from(err: anyhow::Error) -> Self {
        Self::Err(err)
    }
}

/// The assembler for `target`'s architecture. Unlike the linker, this is
/// never overridden by an environment variable — `nasm`/`as` are
/// implementation details of the assembly stage, not a user-facing
/// toolchain choice.
fn assembler_for(target: Target) -> OsString {
    match target.arch() {
        defacto::target::Arch::X86 => OsString::from("nasm"),
        defacto::target::Arch::Arm64 => OsString::from("as"),
    }
}

/// Run the compiler.
///
/// This function is the entry point for the compiler. It will run the
/// compiler through the various stages of compilation, and call the
/// appropriate callbacks at each stage.
#[tracing::instrument(level = "info", skip_all)]
pub fn run<C: Callbacks>(cb: &mut C, cfg: Config) -> Outcome<C::Output> {
    let Config { db, target, cc, ld, output, input, stop_after_assembly } = cfg;

    let temp =
        match tempfile::tempdir().map_err(|e| anyhow::anyhow!("failed to create temp dir: {e}")) {
            Ok(temp) => temp,
            Err(e) => return Outcome::Err(e),
        };

    let spliced = match defacto::splice_imports(&db, input)
        .map_err(|e| anyhow::anyhow!("failed to resolve imports: {e}"))
    {
        Ok(spliced) => spliced,
        Err(e) => return Outcome::Err(e),
    };

    let source_file = SourceFile::new(&db, input.path(&db).clone(), spliced);

    let ast = defacto::parse(&db, source_file);
    let diags: Vec<&Diagnostics> = defacto::parse::accumulated::<Diagnostics>(&db, source_file);
    if let ControlFlow::Break(ret) = cb.after_parse(&db, source_file, ast, diags) {
        return Outcome::EarlyReturn(ret);
    }

    let program = defacto::generate_assembly(&db, ast, source_file, target);
    let diags: Vec<&Diagnostics> =
        defacto::generate_assembly::accumulated::<Diagnostics>(&db, ast, source_file, target);
    if let ControlFlow::Break(ret) = cb.after_codegen(&db, program, diags) {
        return Outcome::EarlyReturn(ret);
    }

    let assembly = match defacto::render_program(&db, program) {
        Ok(assembly) => assembly,
        Err(e) => return Outcome::Err(e.into()),
    };
    let diags: Vec<&Diagnostics> = defacto::render_program::accumulated::<Diagnostics>(&db, program);
    if let ControlFlow::Break(ret) = cb.after_render_assembly(&db, assembly.clone(), diags) {
        return Outcome::EarlyReturn(ret);
    }

    if stop_after_assembly {
        if let Err(e) = std::fs::write(&output, assembly.as_str()) {
            return Outcome::Err(e.into());
        }
        return Outcome::Ok;
    }

    let asm_path = temp.path().join("assembly.s");
    if let Err(e) = std::fs::write(&asm_path, assembly.as_str()) {
        return Outcome::Err(e.into());
    }

    let assembler = assembler_for(target);
    let linker = if target.is_macos() { cc } else { ld };

    if let Err(e) =
        defacto::assemble_and_link(&db, assembler, linker, target, asm_path, output.clone())
    {
        return Outcome::Err(e.into());
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o755);
        if let Err(e) = std::fs::set_permissions(&output, perms) {
            return Outcome::Err(e.into());
        }
    }

    if let ControlFlow::Break(ret) = cb.after_compile(&db, output) {
        return Outcome::EarlyReturn(ret);
    }

    Outcome::Ok
}

/// Callbacks fired at various stages of compilation.
///
/// Called in order: `after_parse`, `after_codegen`, `after_render_assembly`,
/// `after_compile`. There is no lowering stage between parsing and codegen
/// — the generator walks the parse tree directly.
///
/// If a callback returns `ControlFlow::Break`, the compiler stops running
/// and returns early.
pub trait Callbacks {
    type Output;

    /// Called after parsing the file.
    fn after_parse<'db>(
        &mut self,
        _db: &'db dyn defacto::Db,
        _source_file: SourceFile,
        _ast: Ast<'db>,
        _diags: Vec<&Diagnostics>,
    ) -> ControlFlow<Self::Output> {
        ControlFlow::Continue(())
    }

    /// Called after generating assembly instructions from the parse tree.
    fn after_codegen<'db>(
        &mut self,
        _db: &'db dyn defacto::Db,
        _asm: asm::Program<'db>,
        _diags: Vec<&Diagnostics>,
    ) -> ControlFlow<Self::Output> {
        ControlFlow::Continue(())
    }

    /// Called after rendering the assembly instructions to text.
    fn after_render_assembly(
        &mut self,
        _db: &dyn defacto::Db,
        _asm: Text,
        _diags: Vec<&Diagnostics>,
    ) -> ControlFlow<Self::Output> {
        ControlFlow::Continue(())
    }

    fn after_compile(&mut self, _db: &dyn defacto::Db, _binary: PathBuf) -> ControlFlow<Self::Output> {
        ControlFlow::Continue(())
    }
}
