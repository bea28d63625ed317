//! The five backends this compiler can lower a program to.
//!
//! There is no single default target: the backend is always named
//! explicitly by the driver (`-kernel`, `-terminal`, `-terminal64`,
//! `-terminal-macos`, `-terminal-arm64`).

use std::fmt;

/// Instruction-set family.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Arch {
    X86,
    Arm64,
}

/// Assembler dialect the renderer must emit.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Dialect {
    /// Intel-syntax NASM, used for every x86 target.
    Nasm,
    /// AT&T-ish GNU `as` syntax, with Apple's `@PAGE`/`@PAGEOFF` relocation
    /// modifiers on macOS.
    Gas,
}

/// One of the five backends named in `-kernel`/`-terminal*`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Target {
    /// `-kernel`: freestanding 32-bit x86, no libc, device I/O permitted.
    BareMetal,
    /// `-terminal`: 32-bit Linux, `int 0x80` syscalls.
    Linux32,
    /// `-terminal64`: 64-bit Linux, `syscall`.
    Linux64,
    /// `-terminal-macos`: 64-bit macOS, `syscall` with the `0x2000000`
    /// class-mask added to the syscall number.
    MacOs64,
    /// `-terminal-arm64`: AArch64, `svc`. Runs on both Linux and macOS;
    /// the OS only changes the syscall convention, not the register file.
    Arm64 { macos: bool },
}

impl Target {
    pub fn arch(self) -> Arch {
        match self {
            Target::BareMetal | Target::Linux32 | Target::Linux64 | Target::MacOs64 => Arch::X86,
            Target::Arm64 { .. } => Arch::Arm64,
        }
    }

    pub fn dialect(self) -> Dialect {
        match self.arch() {
            Arch::X86 => Dialect::Nasm,
            Arch::Arm64 => Dialect::Gas,
        }
    }

    /// Register/pointer width in bits. Bare metal and 32-bit Linux share
    /// the 32-bit GPR table; 64-bit Linux and macOS share the 64-bit one.
    /// AArch64 is always 64-bit here (there is no 32-bit ARM backend).
    pub fn bits(self) -> u8 {
        match self {
            Target::BareMetal | Target::Linux32 => 32,
            Target::Linux64 | Target::MacOs64 | Target::Arm64 { .. } => 64,
        }
    }

    pub fn is_bare_metal(self) -> bool {
        matches!(self, Target::BareMetal)
    }

    pub fn is_macos(self) -> bool {
        matches!(self, Target::MacOs64 | Target::Arm64 { macos: true })
    }

    /// Whether libc (`malloc`/`free`, the C calling convention for
    /// `extern` declarations) is available. Only the bare-metal target
    /// runs without one.
    pub fn has_libc(self) -> bool {
        !self.is_bare_metal()
    }

    /// Name as it appears on the driver's mutually-exclusive target flags.
    pub fn flag_name(self) -> &'static str {
        match self {
            Target::BareMetal => "-kernel",
            Target::Linux32 => "-terminal",
            Target::Linux64 => "-terminal64",
            Target::MacOs64 => "-terminal-macos",
            Target::Arm64 { macos: false } => "-terminal-arm64",
            Target::Arm64 { macos: true } => "-terminal-arm64",
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.flag_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_width_is_keyed_by_target_not_os() {
        assert_eq!(Target::Linux32.bits(), 32);
        assert_eq!(Target::BareMetal.bits(), 32);
        assert_eq!(Target::Linux64.bits(), 64);
        assert_eq!(Target::MacOs64.bits(), 64);
        assert_eq!(Target::Arm64 { macos: false }.bits(), 64);
    }

    #[test]
    fn only_bare_metal_lacks_libc() {
        assert!(!Target::BareMetal.has_libc());
        assert!(Target::Linux64.has_libc());
        assert!(Target::Arm64 { macos: true }.has_libc());
    }
}
