//! Black-box scenario tests: each trial compiles a literal `.de` source
//! string (or, for import resolution, a fixture on disk), links it for
//! `-terminal64`, runs the binary, and checks stdout/exit code or the
//! expected compile-time failure.
//!
//! Bare-metal flat binaries can't be executed on the test host, so every
//! scenario here targets `Target::Linux64` even where its source text
//! doesn't name a target explicitly.

use std::{
    ops::ControlFlow,
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

use anyhow::{Context, Error};
use defacto::{
    Ast, Db, Database, SourceFile, Target, Text, codegen::asm, diagnostics::Diagnostics,
};
use defacto_driver::{Callbacks as DriverCallbacks, Config, Outcome, run};
use libtest_mimic::{Arguments, Failed, Trial};

fn main() {
    let args = Arguments::from_args();

    let trials = vec![
        Trial::test("hello_world_terminal64", || run_scenario(hello_world())),
        Trial::test("arithmetic_precedence", || run_scenario(arithmetic_precedence())),
        Trial::test("const_violation", || run_scenario(const_violation())),
        Trial::test("loop_with_break", || run_scenario(loop_with_break())),
        Trial::test("struct_field_access", || run_scenario(struct_field_access())),
        Trial::test("import_resolution", || run_scenario(import_resolution())),
    ];

    libtest_mimic::run(&args, trials).exit()
}

/// What a scenario expects once `run()` has finished.
enum Expectation {
    /// Compilation must fail with a diagnostic whose message contains
    /// `needle`.
    FailsWith { needle: &'static str },
    /// Compilation must succeed, link, and the binary must exit with
    /// `code` and (optionally) write exactly `stdout`.
    Runs { code: i32, stdout: Option<&'static str> },
}

struct Scenario {
    input: PathBuf,
    expect: Expectation,
}

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures").join(name)
}

fn write_fixture(name: &str, src: &str) -> PathBuf {
    let path = fixture(name);
    std::fs::write(&path, src).expect("failed to write scenario fixture");
    path
}

fn hello_world() -> Scenario {
    let src = r#"#Mainprogramm.start
<.de
var msg: string = "Hi"
static.pl>
display{msg}
.>
#Mainprogramm.end
"#;
    Scenario {
        input: write_fixture("hello_world.de", src),
        expect: Expectation::Runs { code: 0, stdout: Some("Hi\n") },
    }
}

fn arithmetic_precedence() -> Scenario {
    let src = r#"#Mainprogramm.start
<.de
var r: i32 = 0
static.pl>
r = (2+(3*4))
printnum{r}
.>
#Mainprogramm.end
"#;
    Scenario {
        input: write_fixture("arithmetic_precedence.de", src),
        expect: Expectation::Runs { code: 0, stdout: Some("14\n") },
    }
}

fn const_violation() -> Scenario {
    let src = r#"#Mainprogramm.start
<.de
const K: i32 = 5
static.pl>
K = 6
.>
#Mainprogramm.end
"#;
    Scenario {
        input: write_fixture("const_violation.de", src),
        expect: Expectation::FailsWith { needle: "cannot assign to const 'K'" },
    }
}

fn loop_with_break() -> Scenario {
    let src = r#"#Mainprogramm.start
<.de
var i: i32 = 0
static.pl>
loop {
    i = (i+1)
    if i == 3 {
        stop
    }
}
printnum{i}
.>
#Mainprogramm.end
"#;
    Scenario {
        input: write_fixture("loop_with_break.de", src),
        expect: Expectation::Runs { code: 0, stdout: Some("3\n") },
    }
}

fn struct_field_access() -> Scenario {
    let src = r#"struct P {
    x: i32
    y: i32
}
#Mainprogramm.start
<.de
var p: P
static.pl>
p.x = 7
p.y = 11
printnum{p.x}
.>
#Mainprogramm.end
"#;
    Scenario {
        input: write_fixture("struct_field_access.de", src),
        expect: Expectation::Runs { code: 0, stdout: Some("7\n") },
    }
}

fn import_resolution() -> Scenario {
    // `util.de` (checked into `fixtures/`) declares `fn doit() { ... printnum{1} ... }`.
    let src = r#"#Mainprogramm.start
Import{util}
<.de
static.pl>
call doit
.>
#Mainprogramm.end
"#;
    Scenario {
        input: write_fixture("import_resolution.de", src),
        expect: Expectation::Runs { code: 0, stdout: Some("1\n") },
    }
}

fn run_scenario(scenario: Scenario) -> Result<(), Failed> {
    let Scenario { input, expect } = scenario;

    let db = Database::default();
    let temp = tempfile::tempdir().context("failed to create a scratch directory")?;
    let src = std::fs::read_to_string(&input)
        .with_context(|| format!("failed to read {}", input.display()))?;
    let source_file = SourceFile::new(&db, input.display().to_string().into(), src.into());
    let output = temp.path().join("a.out");

    let cfg = Config {
        db,
        target: Target::Linux64,
        cc: "clang".into(),
        ld: "ld".into(),
        output: output.clone(),
        input: source_file,
        stop_after_assembly: false,
    };

    let mut cb = ScenarioCallbacks { expect };
    match run(&mut cb, cfg) {
        Outcome::Ok => {
            if !output.exists() {
                return Err(Failed::from(anyhow::anyhow!(
                    "compilation reported success but no binary was produced"
                )));
            }
            Ok(())
        }
        Outcome::EarlyReturn(result) => result.map_err(Failed::from),
        Outcome::Err(e) => Err(Failed::from(e)),
    }
}

struct ScenarioCallbacks {
    expect: Expectation,
}

impl ScenarioCallbacks {
    fn handle_diags(&self, diags: Vec<&Diagnostics>) -> ControlFlow<Result<(), Error>> {
        match &self.expect {
            Expectation::FailsWith { needle } => {
                if diags.is_empty() {
                    ControlFlow::Continue(())
                } else if diags.iter().any(|d| d.to_codespan().message.contains(needle)) {
                    ControlFlow::Break(Ok(()))
                } else {
                    ControlFlow::Break(Err(anyhow::anyhow!(
                        "expected a diagnostic containing {needle:?}, got: {diags:#?}"
                    )))
                }
            }
            Expectation::Runs { .. } => {
                if diags.is_empty() {
                    ControlFlow::Continue(())
                } else {
                    ControlFlow::Break(Err(anyhow::anyhow!("unexpected diagnostics: {diags:#?}")))
                }
            }
        }
    }
}

impl DriverCallbacks for ScenarioCallbacks {
    type Output = Result<(), Error>;

    fn after_parse<'db>(
        &mut self,
        _db: &'db dyn Db,
        _source_file: SourceFile,
        _ast: Ast<'db>,
        diags: Vec<&Diagnostics>,
    ) -> ControlFlow<Self::Output> {
        self.handle_diags(diags)
    }

    fn after_codegen<'db>(
        &mut self,
        _db: &'db dyn Db,
        _asm: asm::Program<'db>,
        diags: Vec<&Diagnostics>,
    ) -> ControlFlow<Self::Output> {
        self.handle_diags(diags)
    }

    fn after_render_assembly(
        &mut self,
        _db: &dyn Db,
        _asm: Text,
        diags: Vec<&Diagnostics>,
    ) -> ControlFlow<Self::Output> {
        self.handle_diags(diags)
    }

    fn after_compile(&mut self, _db: &dyn Db, binary: PathBuf) -> ControlFlow<Self::Output> {
        let (expected_code, expected_stdout) = match &self.expect {
            Expectation::FailsWith { needle } => {
                return ControlFlow::Break(Err(anyhow::anyhow!(
                    "expected compilation to fail with {needle:?}, but it succeeded"
                )));
            }
            Expectation::Runs { code, stdout } => (*code, *stdout),
        };

        let output = match Command::new(&binary).stdin(Stdio::null()).output() {
            Ok(output) => output,
            Err(e) => return ControlFlow::Break(Err(e.into())),
        };

        if output.status.code() != Some(expected_code) {
            return ControlFlow::Break(Err(anyhow::anyhow!(
                "expected exit code {expected_code}, got {}\nstderr: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr),
            )));
        }

        if let Some(expected_stdout) = expected_stdout {
            let stdout = String::from_utf8_lossy(&output.stdout);
            if stdout != expected_stdout {
                return ControlFlow::Break(Err(anyhow::anyhow!(
                    "expected stdout {expected_stdout:?}, got {stdout:?}"
                )));
            }
        }

        ControlFlow::Continue(())
    }
}
