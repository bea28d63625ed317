//! Thin wrappers around the external assembler and linker — these are not
//! part of the compiler proper, just the contract the driver uses to turn
//! emitted assembly text into a binary.
//!
//! Covers the five backends' different assemblers
//! (`nasm -f bin|elf32|elf64|macho64`, `as` for AArch64) and link steps,
//! built on [`crate::cmd::run_cmd`].

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    process::Command,
};

use crate::{CommandError, Db, target::Target};

/// `nasm`/`as` flags selecting the output format for `target`.
fn assembler_args(target: Target) -> Vec<&'static str> {
    match target {
        Target::BareMetal => vec!["-f", "bin"],
        Target::Linux32 => vec!["-f", "elf32"],
        Target::Linux64 => vec!["-f", "elf64"],
        Target::MacOs64 => vec!["-f", "macho64"],
        Target::Arm64 { macos: true } => vec!["-arch", "arm64"],
        Target::Arm64 { macos: false } => vec![],
    }
}

/// Run the assembler over `assembly`, producing `dest` — a flat binary for
/// bare metal, an object file for every other target.
#[salsa::tracked]
pub fn assemble(
    _db: &dyn Db,
    assembler: OsString,
    target: Target,
    assembly: PathBuf,
    dest: PathBuf,
) -> Result<(), CommandError> {
    let mut cmd = Command::new(assembler);
    cmd.args(assembler_args(target)).arg(&assembly).arg("-o").arg(&dest);
    crate::cmd::run_cmd(&mut cmd)?;
    Ok(())
}

/// Link an object file into a final executable. Bare metal never reaches
/// this — its assembler step already produces the final flat binary.
#[salsa::tracked]
pub fn link(
    _db: &dyn Db,
    linker: OsString,
    target: Target,
    object: PathBuf,
    dest: PathBuf,
) -> Result<(), CommandError> {
    let mut cmd = Command::new(linker);
    if target.bits() == 32 && target.arch() == crate::target::Arch::X86 {
        cmd.arg("-m32");
    }
    cmd.arg("-nostartfiles").arg("-e").arg("_start").arg(&object).arg("-o").arg(&dest);
    crate::cmd::run_cmd(&mut cmd)?;
    Ok(())
}

/// Assemble `assembly` and, unless `target` is bare metal, link the
/// resulting object into `dest`.
#[salsa::tracked]
pub fn assemble_and_link(
    db: &dyn Db,
    assembler: OsString,
    linker: OsString,
    target: Target,
    assembly: PathBuf,
    dest: PathBuf,
) -> Result<(), CommandError> {
    if target.is_bare_metal() {
        return assemble(db, assembler, target, assembly, dest);
    }

    let object = object_path(&dest);
    assemble(db, assembler, target, assembly, object.clone())?;
    link(db, linker, target, object, dest)
}

fn object_path(dest: &Path) -> PathBuf {
    dest.with_extension("o")
}
