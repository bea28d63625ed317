//! Turns the [`asm`] IR into assembler-ready text: NASM for the four x86
//! targets, GAS (with Apple's `@PAGE`/`@PAGEOFF` modifiers on macOS) for
//! AArch64.
//!
//! A small struct wrapping a `Write` sink plus one `render_*` method per IR
//! node; each method branches on [`Target`] to pick the right dialect and
//! calling convention for all five backends.

use std::fmt::{self, Write};

use crate::{
    Db,
    codegen::asm::{self, Arm64Insn, Arm64Reg, Cond, DataItem, Instruction, Operand, X86Insn, X86Reg},
    target::{Dialect, Target},
};

#[tracing::instrument(level = "debug", skip_all, fields(target = %program.target(db)))]
#[salsa::tracked]
pub fn render_program<'db>(db: &'db dyn Db, program: asm::Program<'db>) -> Result<crate::Text, fmt::Error> {
    let target = program.target(db);
    let mut output = String::new();
    let mut renderer = AssemblyRenderer::new(target, &mut output);
    renderer.program(db, program)?;
    Ok(output.into())
}

#[derive(Debug)]
pub struct AssemblyRenderer<W> {
    target: Target,
    writer: W,
}

impl<W: Write> AssemblyRenderer<W> {
    pub fn new(target: Target, writer: W) -> Self {
        Self { target, writer }
    }

    pub fn program(&mut self, db: &dyn Db, program: asm::Program<'_>) -> fmt::Result {
        self.prelude()?;
        self.externs(program.externs(db))?;
        self.text_section(db, program)?;
        self.data_section(db, program)?;
        Ok(())
    }

    fn prelude(&mut self) -> fmt::Result {
        match self.target.dialect() {
            Dialect::Nasm => {
                if self.target.is_bare_metal() {
                    writeln!(self.writer, "BITS 32")?;
                    writeln!(self.writer, "ORG 0x1000")?;
                } else {
                    writeln!(self.writer, "BITS {}", self.target.bits())?;
                    writeln!(self.writer, "DEFAULT REL")?;
                }
            }
            Dialect::Gas => {
                writeln!(self.writer, ".align 4")?;
            }
        }
        writeln!(self.writer)
    }

    fn externs(&mut self, externs: &[crate::Text]) -> fmt::Result {
        if self.target.is_bare_metal() {
            return Ok(());
        }
        match self.target.dialect() {
            Dialect::Nasm => {
                for e in externs {
                    writeln!(self.writer, "extern {}", self.x86_symbol(e))?;
                }
                writeln!(self.writer, "extern {}", self.x86_symbol("malloc"))?;
                writeln!(self.writer, "extern {}", self.x86_symbol("free"))?;
            }
            Dialect::Gas => {
                for e in externs {
                    writeln!(self.writer, ".extern {}", self.macos_symbol(e))?;
                }
                writeln!(self.writer, ".extern _malloc")?;
                writeln!(self.writer, ".extern _free")?;
            }
        }
        writeln!(self.writer)
    }

    /// Mach-O's x86 symbol convention prefixes every external C symbol with
    /// an underscore; ELF does not. Internal labels (functions, driver
    /// stubs, `__defacto_*` helpers, local `.L...` labels) are never
    /// libc-provided, so they're left alone regardless of target.
    fn x86_symbol<'a>(&self, label: &'a str) -> std::borrow::Cow<'a, str> {
        let is_internal = label.starts_with("fn_") || label.starts_with("__defacto_") || label.starts_with('.');
        if self.target.is_macos() && !is_internal {
            format!("_{label}").into()
        } else {
            label.into()
        }
    }

    fn text_section(&mut self, db: &dyn Db, program: asm::Program<'_>) -> fmt::Result {
        match self.target.dialect() {
            Dialect::Nasm => writeln!(self.writer, "section .text")?,
            Dialect::Gas => writeln!(self.writer, ".text")?,
        }

        let entry = self.entry_label();
        match self.target.dialect() {
            Dialect::Nasm => writeln!(self.writer, "global {entry}")?,
            Dialect::Gas => writeln!(self.writer, ".globl {entry}")?,
        }
        writeln!(self.writer, "{entry}:")?;

        for instruction in program.main(db) {
            self.render_instruction(instruction)?;
        }
        self.exit_sequence()?;
        writeln!(self.writer)?;

        for function in program.functions(db) {
            let name = function.name(db);
            match self.target.dialect() {
                Dialect::Nasm => writeln!(self.writer, "global {name}")?,
                Dialect::Gas => writeln!(self.writer, ".globl {name}")?,
            }
            for instruction in function.instructions(db) {
                self.render_instruction(instruction)?;
            }
            writeln!(self.writer)?;
        }

        for driver in program.drivers(db) {
            match self.target.dialect() {
                Dialect::Nasm => writeln!(self.writer, "global {}", driver.label)?,
                Dialect::Gas => writeln!(self.writer, ".globl {}", driver.label)?,
            }
            writeln!(self.writer, "{}:", driver.label)?;
            for instruction in &driver.instructions {
                self.render_instruction(instruction)?;
            }
            writeln!(self.writer)?;
        }

        for (number, function) in program.interrupts(db) {
            writeln!(self.writer, "; interrupt {number} -> {function}")?;
        }

        Ok(())
    }

    fn entry_label(&self) -> &'static str {
        "_start"
    }

    /// `exit(0)` for every terminal target, an infinite `hlt` loop for
    /// bare metal.
    fn exit_sequence(&mut self) -> fmt::Result {
        match self.target {
            Target::BareMetal => {
                writeln!(self.writer, "  cli")?;
                writeln!(self.writer, ".hang:")?;
                writeln!(self.writer, "  hlt")?;
                writeln!(self.writer, "  jmp .hang")
            }
            Target::Linux32 => {
                writeln!(self.writer, "  mov ebx, 0")?;
                writeln!(self.writer, "  mov eax, 1")?;
                writeln!(self.writer, "  int 0x80")
            }
            Target::Linux64 => {
                writeln!(self.writer, "  mov rdi, 0")?;
                writeln!(self.writer, "  mov rax, 60")?;
                writeln!(self.writer, "  syscall")
            }
            Target::MacOs64 => {
                writeln!(self.writer, "  mov rdi, 0")?;
                writeln!(self.writer, "  mov rax, 0x2000001")?;
                writeln!(self.writer, "  syscall")
            }
            Target::Arm64 { macos } => {
                writeln!(self.writer, "  mov x0, #0")?;
                writeln!(self.writer, "  mov x8, #{}", if macos { 0x2000001u32 } else { 93 })?;
                writeln!(self.writer, "  svc #0")
            }
        }
    }

    fn render_instruction(&mut self, instruction: &Instruction) -> fmt::Result {
        match instruction {
            Instruction::Label(name) => writeln!(self.writer, "{name}:"),
            Instruction::Comment(text) => writeln!(self.writer, "  ; {text}"),
            Instruction::X86(insn) => self.render_x86(insn),
            Instruction::Arm64(insn) => self.render_arm64(insn),
        }
    }

    // --- x86 / NASM -----------------------------------------------------

    fn reg(&self, reg: X86Reg) -> String {
        let X86Reg::Sigil(n) = reg;
        crate::codegen::registers::Sigil(n).x86_name(self.target.bits()).to_string()
    }

    fn operand(&self, op: &Operand) -> String {
        match op {
            Operand::Imm(n) => n.to_string(),
            Operand::Reg(r) => self.reg(*r),
            Operand::Label(l) => format!("[{l}]"),
            Operand::LabelOffset(l, off) => {
                if *off >= 0 {
                    format!("[{l} + {off}]")
                } else {
                    format!("[{l} - {}]", -off)
                }
            }
            Operand::RegOffset(r, off) => {
                let reg = self.reg(*r);
                if *off >= 0 {
                    format!("[{reg} + {off}]")
                } else {
                    format!("[{reg} - {}]", -off)
                }
            }
        }
    }

    fn cc_suffix(cc: Cond) -> &'static str {
        match cc {
            Cond::Eq => "e",
            Cond::Neq => "ne",
            Cond::Lt => "l",
            Cond::Gt => "g",
            Cond::Lte => "le",
            Cond::Gte => "ge",
        }
    }

    fn render_x86(&mut self, insn: &X86Insn) -> fmt::Result {
        match insn {
            X86Insn::Mov { dst, src } => writeln!(self.writer, "  mov {}, {}", self.operand(dst), self.operand(src)),
            X86Insn::Lea { dst, label } => writeln!(self.writer, "  lea {}, [{label}]", self.reg(*dst)),
            X86Insn::Add { dst, src } => writeln!(self.writer, "  add {}, {}", self.operand(dst), self.operand(src)),
            X86Insn::Sub { dst, src } => writeln!(self.writer, "  sub {}, {}", self.operand(dst), self.operand(src)),
            X86Insn::Imul { dst, src } => writeln!(self.writer, "  imul {}, {}", self.reg(*dst), self.operand(src)),
            X86Insn::And { dst, src } => writeln!(self.writer, "  and {}, {}", self.operand(dst), self.operand(src)),
            X86Insn::Or { dst, src } => writeln!(self.writer, "  or {}, {}", self.operand(dst), self.operand(src)),
            X86Insn::Neg(op) => writeln!(self.writer, "  neg {}", self.operand(op)),
            X86Insn::Not(op) => writeln!(self.writer, "  not {}", self.operand(op)),
            X86Insn::SignExtend => {
                if self.target.bits() == 64 {
                    writeln!(self.writer, "  cqo")
                } else {
                    writeln!(self.writer, "  cdq")
                }
            }
            X86Insn::Idiv(op) => writeln!(self.writer, "  idiv {}", self.operand(op)),
            X86Insn::Sar(op) => writeln!(self.writer, "  sar {}, cl", self.operand(op)),
            X86Insn::Cmp { left, right } => writeln!(self.writer, "  cmp {}, {}", self.operand(left), self.operand(right)),
            X86Insn::Jmp(label) => writeln!(self.writer, "  jmp {label}"),
            X86Insn::Jcc { cc, target } => writeln!(self.writer, "  j{} {target}", Self::cc_suffix(*cc)),
            X86Insn::SetCc { cc, dst } => {
                writeln!(self.writer, "  set{} {}", Self::cc_suffix(*cc), self.reg8(*dst))?;
                writeln!(self.writer, "  movzx {}, {}", self.reg(*dst), self.reg8(*dst))
            }
            X86Insn::Push(op) => writeln!(self.writer, "  push {}", self.operand(op)),
            X86Insn::Pop(r) => writeln!(self.writer, "  pop {}", self.reg(*r)),
            X86Insn::Call(label) => writeln!(self.writer, "  call {}", self.x86_symbol(label)),
            X86Insn::Ret => writeln!(self.writer, "  ret"),
            X86Insn::Syscall => writeln!(self.writer, "  syscall"),
            X86Insn::Int(n) => writeln!(self.writer, "  int 0x{n:x}"),
            X86Insn::InByte { port } => {
                writeln!(self.writer, "  mov dx, {port}")?;
                writeln!(self.writer, "  in al, dx")
            }
            X86Insn::OutByte { port } => {
                writeln!(self.writer, "  mov dx, {port}")?;
                writeln!(self.writer, "  out dx, al")
            }
            X86Insn::Hlt => writeln!(self.writer, "  hlt"),
            X86Insn::Xchg { a, b } => writeln!(self.writer, "  xchg {}, {}", self.reg(*a), self.reg(*b)),
            X86Insn::MovByteStoreReg { base, offset, src } => {
                writeln!(self.writer, "  mov byte {}, {}", self.operand(&Operand::RegOffset(*base, *offset)), self.reg8(*src))
            }
            X86Insn::MovByteLoadReg { dst, base, offset } => {
                writeln!(self.writer, "  movzx {}, byte {}", self.reg(*dst), self.operand(&Operand::RegOffset(*base, *offset)))
            }
            X86Insn::MovByteStoreLabel { label, src } => writeln!(self.writer, "  mov byte [{label}], {}", self.reg8(*src)),
            X86Insn::MovByteLoadLabel { dst, label } => writeln!(self.writer, "  movzx {}, byte [{label}]", self.reg(*dst)),
        }
    }

    /// The 8-bit alias of a sigil's register, used by `setcc`.
    fn reg8(&self, reg: X86Reg) -> &'static str {
        let X86Reg::Sigil(n) = reg;
        const NAMES: [&str; 16] = [
            "dil", "sil", "dl", "cl", "bl", "al", "bpl", "spl", "r8b", "r9b", "r10b", "r11b", "r12b", "r13b", "r14b",
            "r15b",
        ];
        NAMES[(n - 1) as usize]
    }

    // --- AArch64 / GAS ----------------------------------------------------

    fn arm_reg(&self, reg: &Arm64Reg) -> String {
        match reg {
            Arm64Reg::Sigil(n) => crate::codegen::registers::Sigil(*n).arm64_name(),
            Arm64Reg::Acc => crate::codegen::registers::ARM_ACCUMULATOR.to_string(),
            Arm64Reg::Aux => crate::codegen::registers::ARM_AUXILIARY.to_string(),
        }
    }

    fn render_address(&mut self, dst: &Arm64Reg, label: &crate::Text) -> fmt::Result {
        let dst = self.arm_reg(dst);
        if self.target.is_macos() {
            writeln!(self.writer, "  adrp {dst}, {label}@PAGE")?;
            writeln!(self.writer, "  add {dst}, {dst}, {label}@PAGEOFF")
        } else {
            writeln!(self.writer, "  adrp {dst}, {label}")?;
            writeln!(self.writer, "  add {dst}, {dst}, :lo12:{label}")
        }
    }

    fn render_arm64(&mut self, insn: &Arm64Insn) -> fmt::Result {
        match insn {
            Arm64Insn::MovImm { dst, imm } => writeln!(self.writer, "  mov {}, #{imm}", self.arm_reg(dst)),
            Arm64Insn::MovReg { dst, src } => writeln!(self.writer, "  mov {}, {}", self.arm_reg(dst), self.arm_reg(src)),
            Arm64Insn::Adr { dst, label } => self.render_address(dst, label),
            Arm64Insn::Ldr { dst, base, offset } => {
                writeln!(self.writer, "  ldr {}, [{}, #{offset}]", self.arm_reg(dst), self.arm_reg(base))
            }
            Arm64Insn::Str { src, base, offset } => {
                writeln!(self.writer, "  str {}, [{}, #{offset}]", self.arm_reg(src), self.arm_reg(base))
            }
            Arm64Insn::LdrB { dst, base, offset } => {
                writeln!(self.writer, "  ldrb {}, [{}, #{offset}]", self.arm_reg(dst), self.arm_reg(base))
            }
            Arm64Insn::StrB { src, base, offset } => {
                writeln!(self.writer, "  strb {}, [{}, #{offset}]", self.arm_reg(src), self.arm_reg(base))
            }
            Arm64Insn::AddReg { dst, a, b } => {
                writeln!(self.writer, "  add {}, {}, {}", self.arm_reg(dst), self.arm_reg(a), self.arm_reg(b))
            }
            Arm64Insn::SubReg { dst, a, b } => {
                writeln!(self.writer, "  sub {}, {}, {}", self.arm_reg(dst), self.arm_reg(a), self.arm_reg(b))
            }
            Arm64Insn::MulReg { dst, a, b } => {
                writeln!(self.writer, "  mul {}, {}, {}", self.arm_reg(dst), self.arm_reg(a), self.arm_reg(b))
            }
            Arm64Insn::SdivReg { dst, a, b } => {
                writeln!(self.writer, "  sdiv {}, {}, {}", self.arm_reg(dst), self.arm_reg(a), self.arm_reg(b))
            }
            Arm64Insn::AsrReg { dst, a, b } => {
                writeln!(self.writer, "  asr {}, {}, {}", self.arm_reg(dst), self.arm_reg(a), self.arm_reg(b))
            }
            Arm64Insn::AddImm { dst, src, imm } => {
                writeln!(self.writer, "  add {}, {}, #{imm}", self.arm_reg(dst), self.arm_reg(src))
            }
            Arm64Insn::NegReg { dst, src } => writeln!(self.writer, "  neg {}, {}", self.arm_reg(dst), self.arm_reg(src)),
            Arm64Insn::Mvn { dst, src } => writeln!(self.writer, "  mvn {}, {}", self.arm_reg(dst), self.arm_reg(src)),
            Arm64Insn::CmpReg { a, b } => writeln!(self.writer, "  cmp {}, {}", self.arm_reg(a), self.arm_reg(b)),
            Arm64Insn::CmpImm { a, imm } => writeln!(self.writer, "  cmp {}, #{imm}", self.arm_reg(a)),
            Arm64Insn::Cset { dst, cc } => writeln!(self.writer, "  cset {}, {}", self.arm_reg(dst), Self::arm_cc(*cc)),
            Arm64Insn::BCond { cc, target } => writeln!(self.writer, "  b.{} {target}", Self::arm_cc(*cc)),
            Arm64Insn::B(label) => writeln!(self.writer, "  b {label}"),
            Arm64Insn::Bl(label) => writeln!(self.writer, "  bl {}", self.macos_symbol(label)),
            Arm64Insn::Ret => writeln!(self.writer, "  ret"),
            Arm64Insn::Svc(n) => writeln!(self.writer, "  svc #{n}"),
            Arm64Insn::Push(r) => {
                let r = self.arm_reg(r);
                writeln!(self.writer, "  str {r}, [sp, #-16]!")
            }
            Arm64Insn::Pop(r) => {
                let r = self.arm_reg(r);
                writeln!(self.writer, "  ldr {r}, [sp], #16")
            }
        }
    }

    fn macos_symbol<'a>(&self, label: &'a str) -> std::borrow::Cow<'a, str> {
        let is_internal = label.starts_with("fn_") || label.starts_with("__defacto_") || label.starts_with('.');
        if self.target.is_macos() && !is_internal {
            format!("_{label}").into()
        } else {
            label.into()
        }
    }

    fn arm_cc(cc: Cond) -> &'static str {
        match cc {
            Cond::Eq => "eq",
            Cond::Neq => "ne",
            Cond::Lt => "lt",
            Cond::Gt => "gt",
            Cond::Lte => "le",
            Cond::Gte => "ge",
        }
    }

    // --- data section -----------------------------------------------------

    fn data_section(&mut self, db: &dyn Db, program: asm::Program<'_>) -> fmt::Result {
        writeln!(self.writer)?;
        match self.target.dialect() {
            Dialect::Nasm if self.target.is_bare_metal() => writeln!(self.writer, "; data (appended, no section header)")?,
            Dialect::Nasm => writeln!(self.writer, "section .data")?,
            Dialect::Gas if self.target.is_macos() => writeln!(self.writer, ".section __DATA,__data")?,
            Dialect::Gas => writeln!(self.writer, ".data")?,
        }

        if self.target.is_bare_metal() {
            writeln!(self.writer, "__defacto_cursor: dd 0")?;
            writeln!(self.writer, "__defacto_attr: db 15")?;
            writeln!(self.writer, "__defacto_heap_ptr: dd __defacto_heap")?;
        }
        // Two bytes: a one-character write reads/writes index 0 and the
        // trailing zero lets the buffer double as a null-terminated
        // one-character C string for `putchar` on bare metal.
        writeln!(self.writer, "__defacto_charbuf: db 0, 0")?;

        for item in program.data(db) {
            self.render_data_item(item)?;
        }

        if self.target.is_bare_metal() {
            writeln!(self.writer, "__defacto_heap:")?;
            writeln!(self.writer, "  times 0x10000 db 0")?;
        }

        Ok(())
    }

    fn render_data_item(&mut self, item: &DataItem) -> fmt::Result {
        match self.target.dialect() {
            Dialect::Nasm => self.render_data_item_nasm(item),
            Dialect::Gas => self.render_data_item_gas(item),
        }
    }

    fn size_directive(size: u32) -> &'static str {
        match size {
            1 => "db",
            4 => "dd",
            8 => "dq",
            _ => "db",
        }
    }

    fn render_data_item_nasm(&mut self, item: &DataItem) -> fmt::Result {
        match item {
            DataItem::Scalar { label, size, init } => {
                writeln!(self.writer, "{label}: {} {}", Self::size_directive(*size), init.unwrap_or(0))
            }
            DataItem::Bytes { label, size } => writeln!(self.writer, "{label}: times {size} db 0"),
            DataItem::Str { label, bytes } => {
                write!(self.writer, "{label}: db ")?;
                self.write_byte_list(bytes)?;
                writeln!(self.writer, ", 0")
            }
            DataItem::PointerTo { label, target } => {
                writeln!(self.writer, "{label}: {} {target}", if self.target.bits() == 64 { "dq" } else { "dd" })
            }
        }
    }

    fn render_data_item_gas(&mut self, item: &DataItem) -> fmt::Result {
        match item {
            DataItem::Scalar { label, size, init } => {
                let directive = match size {
                    1 => ".byte",
                    4 => ".word",
                    _ => ".quad",
                };
                writeln!(self.writer, "{label}: {directive} {}", init.unwrap_or(0))
            }
            DataItem::Bytes { label, size } => writeln!(self.writer, "{label}: .zero {size}"),
            DataItem::Str { label, bytes } => {
                write!(self.writer, "{label}: .byte ")?;
                self.write_byte_list(bytes)?;
                writeln!(self.writer, ", 0")
            }
            DataItem::PointerTo { label, target } => writeln!(self.writer, "{label}: .quad {target}"),
        }
    }

    fn write_byte_list(&mut self, bytes: &[u8]) -> fmt::Result {
        for (i, b) in bytes.iter().enumerate() {
            if i > 0 {
                write!(self.writer, ", ")?;
            }
            write!(self.writer, "{b}")?;
        }
        Ok(())
    }
}
