//! The assembly IR the code generator emits and [`crate::render`] turns
//! into NASM or GAS text.
//!
//! Covers all five targets: one [`Instruction`] variant per instruction
//! family, split between
//! [`X86Insn`] (bare-metal, Linux32, Linux64, macOS64) and [`Arm64Insn`]
//! (AArch64 Linux/macOS), plus the shared [`Label`][Instruction::Label] and
//! [`Comment`][Instruction::Comment] that both dialects render the same
//! way.

use defacto_syntax::Span;
use serde::{Deserialize, Serialize};

use crate::Text;

#[derive(defacto_macros::SerializeWithDatabase)]
#[salsa::tracked]
#[derive(Debug)]
pub struct Program<'db> {
    #[returns(ref)]
    pub main: Vec<Instruction>,
    pub functions: Vec<FunctionDefinition<'db>>,
    #[returns(ref)]
    pub drivers: Vec<DriverStub>,
    #[returns(ref)]
    pub data: Vec<DataItem>,
    #[returns(ref)]
    pub externs: Vec<Text>,
    #[returns(ref)]
    pub interrupts: Vec<(u32, Text)>,
    pub target: crate::target::Target,
}

#[derive(defacto_macros::SerializeWithDatabase)]
#[salsa::tracked]
#[derive(Debug)]
pub struct FunctionDefinition<'db> {
    pub name: Text,
    #[returns(ref)]
    pub instructions: Vec<Instruction>,
    pub span: Span,
}

/// A registered driver section's generated stub.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DriverStub {
    pub label: Text,
    pub instructions: Vec<Instruction>,
}

/// One entry in the `data` section: a zero-initialized scalar, zeroed
/// array/struct storage, or a string literal. Every variable is emitted as
/// a label in the data section with `dd`/`dq`/`db`/`times N db 0`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataItem {
    Scalar { label: Text, size: u32, init: Option<i64> },
    Bytes { label: Text, size: u32 },
    Str { label: Text, bytes: Vec<u8> },
    /// A pointer-sized slot initialised to another label's address
    /// (`var ptr: *i32 = &x`).
    PointerTo { label: Text, target: Text },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Instruction {
    Label(Text),
    Comment(Text),
    X86(X86Insn),
    Arm64(Arm64Insn),
}

// --- x86 family -------------------------------------------------------

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum X86Reg {
    Sigil(u8),
}

impl X86Reg {
    pub const ACC: X86Reg = X86Reg::Sigil(crate::codegen::registers::ACCUMULATOR.0);
    pub const AUX: X86Reg = X86Reg::Sigil(crate::codegen::registers::AUXILIARY.0);
    pub const SPILL: X86Reg = X86Reg::Sigil(crate::codegen::registers::SPILL.0);
    pub const COUNTER: X86Reg = X86Reg::Sigil(crate::codegen::registers::COUNTER.0);
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operand {
    Imm(i64),
    Reg(X86Reg),
    /// `[label]`
    Label(Text),
    /// `[label + offset]`
    LabelOffset(Text, i32),
    /// `[reg + offset]`
    RegOffset(X86Reg, i32),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cond {
    Eq,
    Neq,
    Lt,
    Gt,
    Lte,
    Gte,
}

impl Cond {
    pub fn from_binop(op: defacto_syntax::ast::BinOp) -> Self {
        use defacto_syntax::ast::BinOp::*;
        match op {
            Eq => Cond::Eq,
            Neq => Cond::Neq,
            Lt => Cond::Lt,
            Gt => Cond::Gt,
            Lte => Cond::Lte,
            Gte => Cond::Gte,
            _ => unreachable!("not a comparison operator"),
        }
    }

    /// The jump-on-negated-condition table used when lowering a
    /// conditional to the branch taken when the condition is false.
    pub fn negated(self) -> Cond {
        match self {
            Cond::Eq => Cond::Neq,
            Cond::Neq => Cond::Eq,
            Cond::Lt => Cond::Gte,
            Cond::Gt => Cond::Lte,
            Cond::Lte => Cond::Gt,
            Cond::Gte => Cond::Lt,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum X86Insn {
    Mov { dst: Operand, src: Operand },
    /// Load-effective-address: used for `&x` and for materialising a
    /// struct field base in a scratch register on 64-bit targets.
    Lea { dst: X86Reg, label: Text },
    Add { dst: Operand, src: Operand },
    Sub { dst: Operand, src: Operand },
    Imul { dst: X86Reg, src: Operand },
    And { dst: Operand, src: Operand },
    Or { dst: Operand, src: Operand },
    Neg(Operand),
    Not(Operand),
    /// Sign-extend the accumulator into the auxiliary register before a
    /// division (`cdq` on 32-bit, `cqo` on 64-bit — the renderer picks).
    SignExtend,
    Idiv(Operand),
    /// `sar dst, cl` — arithmetic (sign-preserving) right shift; the shift
    /// count always comes from `cl`, matching the x86 `sar r, cl` form.
    Sar(Operand),
    Cmp { left: Operand, right: Operand },
    Jmp(Text),
    Jcc { cc: Cond, target: Text },
    /// Store a boolean comparison result (`sete`/`setne`/... + zero-extend)
    /// into a register, used when a comparison's value is assigned to a
    /// variable rather than branched on directly.
    SetCc { cc: Cond, dst: X86Reg },
    Push(Operand),
    Pop(X86Reg),
    Call(Text),
    Ret,
    Syscall,
    Int(u8),
    /// `in al, dx`-style port read into a fixed 8-bit register.
    InByte { port: u16 },
    /// `out dx, al`-style port write.
    OutByte { port: u16 },
    Hlt,
    Xchg { a: X86Reg, b: X86Reg },
    /// `mov byte [base + offset], reg8` — single-byte store, used by the
    /// VGA/PS2 device-I/O helpers where a full-width `mov` would spill
    /// past a one-byte cell.
    MovByteStoreReg { base: X86Reg, offset: i32, src: X86Reg },
    /// `movzx dst, byte [base + offset]`.
    MovByteLoadReg { dst: X86Reg, base: X86Reg, offset: i32 },
    /// `mov byte [label], reg8`.
    MovByteStoreLabel { label: Text, src: X86Reg },
    /// `movzx dst, byte [label]`.
    MovByteLoadLabel { dst: X86Reg, label: Text },
}

// --- AArch64 ------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Arm64Reg {
    Sigil(u8),
    /// `x16`/IP0, the generator's expression accumulator.
    Acc,
    /// `x17`/IP1, the generator's auxiliary register.
    Aux,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Arm64Operand {
    Imm(i64),
    Reg(Arm64Reg),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Arm64Insn {
    MovImm { dst: Arm64Reg, imm: i64 },
    MovReg { dst: Arm64Reg, src: Arm64Reg },
    /// The `adrp`+`add`(+`@PAGEOFF` on macOS) address-materialisation
    /// sequence for a data-section label, collapsed to one IR node; the
    /// renderer expands it to the two-or-three line GAS sequence.
    Adr { dst: Arm64Reg, label: Text },
    Ldr { dst: Arm64Reg, base: Arm64Reg, offset: i32 },
    Str { src: Arm64Reg, base: Arm64Reg, offset: i32 },
    LdrB { dst: Arm64Reg, base: Arm64Reg, offset: i32 },
    StrB { src: Arm64Reg, base: Arm64Reg, offset: i32 },
    AddReg { dst: Arm64Reg, a: Arm64Reg, b: Arm64Reg },
    SubReg { dst: Arm64Reg, a: Arm64Reg, b: Arm64Reg },
    MulReg { dst: Arm64Reg, a: Arm64Reg, b: Arm64Reg },
    SdivReg { dst: Arm64Reg, a: Arm64Reg, b: Arm64Reg },
    /// `asr dst, a, b` — arithmetic right shift by a register-held count,
    /// unlike x86's `sar`, which only shifts by `cl`.
    AsrReg { dst: Arm64Reg, a: Arm64Reg, b: Arm64Reg },
    AddImm { dst: Arm64Reg, src: Arm64Reg, imm: i64 },
    NegReg { dst: Arm64Reg, src: Arm64Reg },
    Mvn { dst: Arm64Reg, src: Arm64Reg },
    CmpReg { a: Arm64Reg, b: Arm64Reg },
    CmpImm { a: Arm64Reg, imm: i64 },
    Cset { dst: Arm64Reg, cc: Cond },
    BCond { cc: Cond, target: Text },
    B(Text),
    Bl(Text),
    Ret,
    Svc(u32),
    Push(Arm64Reg),
    Pop(Arm64Reg),
}
