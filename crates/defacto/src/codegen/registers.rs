//! Register ABI tables mapping `#RN` sigils to concrete GPRs.
//!
//! Keyed on bit-width rather than OS: Linux64 and macOS64 share the 64-bit
//! table, Linux32 and bare-metal share the 32-bit one. The 64-bit table
//! uses all sixteen distinct GPRs (`r8`-`r15` for `#R9`-`#R16`) rather than
//! recycling the low eight.

/// A source-level `#RN` register, 1-based.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Sigil(pub u8);

impl Sigil {
    pub fn parse(text: &str) -> Option<Self> {
        let digits = text.trim_start_matches("#R");
        digits.parse().ok().filter(|n| (1..=16).contains(n)).map(Sigil)
    }

    /// The concrete x86 register name for this sigil at the given bit
    /// width. 32-bit targets only have eight GPRs, so `#R9`-`#R16` recycle
    /// onto the low eight rather than failing to resolve.
    pub fn x86_name(self, bits: u8) -> &'static str {
        const NAMES32: [&str; 16] = [
            "edi", "esi", "edx", "ecx", "ebx", "eax", "ebp", "esp", "edi", "esi", "edx", "ecx",
            "ebx", "eax", "ebp", "esp",
        ];
        const NAMES64: [&str; 16] = [
            "rdi", "rsi", "rdx", "rcx", "rbx", "rax", "rbp", "rsp", "r8", "r9", "r10", "r11",
            "r12", "r13", "r14", "r15",
        ];
        let idx = (self.0 - 1) as usize;
        if bits == 64 { NAMES64[idx] } else { NAMES32[idx] }
    }

    /// The 32-bit-wide alias of this sigil's 64-bit register, used when an
    /// instruction needs a 32-bit operand on a 64-bit target (e.g. `cmp`
    /// against an `i32`).
    pub fn x86_name32(self) -> &'static str {
        const NAMES: [&str; 16] = [
            "edi", "esi", "edx", "ecx", "ebx", "eax", "ebp", "esp", "r8d", "r9d", "r10d", "r11d",
            "r12d", "r13d", "r14d", "r15d",
        ];
        NAMES[(self.0 - 1) as usize]
    }

    /// AArch64 general-purpose register for this sigil: `#R1`-`#R16` map
    /// onto `x0`-`x15`.
    pub fn arm64_name(self) -> String {
        format!("x{}", self.0 - 1)
    }
}

/// Generator-internal registers used while evaluating expressions and
/// fixing up invalid operand combinations. These alias fixed physical
/// registers that double as sigils `#R6` (accumulator), `#R3` (auxiliary)
/// and `#R7` (spill), so the same register can be "the accumulator" in one
/// instruction and "`#R6`" in the next. `#R7` (`ebp`/`rbp`) is repurposed as
/// spill space because this generator keeps no frame pointer: every
/// variable lives in the data section, so `rbp` is never used as a frame
/// base.
pub const ACCUMULATOR: Sigil = Sigil(6); // eax / rax
pub const AUXILIARY: Sigil = Sigil(3); // edx / rdx
pub const SPILL: Sigil = Sigil(7); // ebp / rbp
pub const COUNTER: Sigil = Sigil(4); // ecx / rcx

/// AArch64 equivalents: `x16`/`x17` are the platform's own designated
/// intra-procedure scratch registers (`IP0`/`IP1`), so they're used instead
/// of aliasing a sigil.
pub const ARM_ACCUMULATOR: &str = "x16";
pub const ARM_AUXILIARY: &str = "x17";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sigils_resolve_to_the_expected_register_names() {
        assert_eq!(Sigil(1).x86_name(32), "edi");
        assert_eq!(Sigil(1).x86_name(64), "rdi");
        assert_eq!(Sigil(6).x86_name(32), "eax");
        assert_eq!(Sigil(6).x86_name(64), "rax");
    }

    #[test]
    fn sixty_four_bit_table_uses_all_sixteen_distinct_registers() {
        let names: std::collections::HashSet<_> =
            (1..=16).map(|n| Sigil(n).x86_name(64)).collect();
        assert_eq!(names.len(), 16);
    }

    #[test]
    fn thirty_two_bit_table_recycles_the_low_eight() {
        assert_eq!(Sigil(9).x86_name(32), Sigil(1).x86_name(32));
    }
}
