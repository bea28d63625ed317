//! The AArch64 backend: instruction selection shared by the Linux and
//! macOS AArch64 targets. Always runs with
//! libc available — there is no freestanding ARM target — so unlike
//! [`super::x86`] this backend never branches on device-I/O availability.

use defacto_syntax::Span;
use defacto_syntax::ast::{AssignTarget, BinOp, Expr};

use super::{Generator, asm, registers::Sigil};
use crate::{Db, Text};

use asm::{Arm64Insn, Arm64Reg, Cond, Instruction};

fn arm(insn: Arm64Insn) -> Instruction {
    Instruction::Arm64(insn)
}

/// Linux/macOS AArch64 syscall numbers — the register file never changes
/// across the two OSes, only the call
/// convention and numbering.
#[allow(dead_code)]
struct Syscalls {
    write: i64,
    read: i64,
    exit: i64,
}

fn syscalls_for(macos: bool) -> Syscalls {
    if macos {
        Syscalls { write: 0x2000004, read: 0x2000003, exit: 0x2000001 }
    } else {
        Syscalls { write: 64, read: 63, exit: 93 }
    }
}

impl Generator {
    fn macos(&self) -> bool {
        matches!(self.target, crate::target::Target::Arm64 { macos: true })
    }

    pub(super) fn arm64_store_literal_at_offset(&mut self, label: &Text, offset: i32, item: &Expr, out: &mut Vec<Instruction>) {
        let value = match item {
            Expr::Number(n) | Expr::Hex(n) => *n,
            Expr::Bool(b) => *b as i64,
            _ => 0,
        };
        out.push(arm(Arm64Insn::Adr { dst: Arm64Reg::Aux, label: label.clone() }));
        out.push(arm(Arm64Insn::MovImm { dst: Arm64Reg::Acc, imm: value }));
        out.push(arm(Arm64Insn::Str { src: Arm64Reg::Acc, base: Arm64Reg::Aux, offset }));
    }

    pub(super) fn lower_expr_arm64(&mut self, db: &dyn Db, expr: &Expr, out: &mut Vec<Instruction>) {
        match expr {
            Expr::Number(n) | Expr::Hex(n) => {
                out.push(arm(Arm64Insn::MovImm { dst: Arm64Reg::Acc, imm: *n }));
            }
            Expr::Bool(b) => {
                out.push(arm(Arm64Insn::MovImm { dst: Arm64Reg::Acc, imm: *b as i64 }));
            }
            Expr::Str(_) => {}
            Expr::Ident(name) => {
                if let Some(label) = self.resolve(db, name) {
                    out.push(arm(Arm64Insn::Adr { dst: Arm64Reg::Aux, label }));
                    out.push(arm(Arm64Insn::Ldr { dst: Arm64Reg::Acc, base: Arm64Reg::Aux, offset: 0 }));
                }
            }
            Expr::Register(reg) => {
                if let Some(sigil) = Sigil::parse(reg) {
                    out.push(arm(Arm64Insn::MovReg { dst: Arm64Reg::Acc, src: Arm64Reg::Sigil(sigil.0) }));
                }
            }
            Expr::AddressOf(inner) => match inner.as_ref() {
                Expr::Ident(name) => {
                    if let Some(label) = self.resolve(db, name) {
                        out.push(arm(Arm64Insn::Adr { dst: Arm64Reg::Acc, label }));
                    }
                }
                Expr::FieldAccess { base, field } => {
                    if let Expr::Ident(base_name) = base.as_ref() {
                        if let Some(label) = self.resolve(db, base_name) {
                            if let Some((offset, _)) = self.struct_field_offset(db, base_name, field) {
                                out.push(arm(Arm64Insn::Adr { dst: Arm64Reg::Acc, label }));
                                out.push(arm(Arm64Insn::AddImm { dst: Arm64Reg::Acc, src: Arm64Reg::Acc, imm: offset as i64 }));
                            }
                        }
                    }
                }
                other => self.lower_expr_arm64(db, other, out),
            },
            Expr::Deref(inner) => {
                self.lower_expr_arm64(db, inner, out);
                out.push(arm(Arm64Insn::Ldr { dst: Arm64Reg::Acc, base: Arm64Reg::Acc, offset: 0 }));
            }
            Expr::Neg(inner) => {
                self.lower_expr_arm64(db, inner, out);
                out.push(arm(Arm64Insn::NegReg { dst: Arm64Reg::Acc, src: Arm64Reg::Acc }));
            }
            Expr::Not(inner) => {
                self.lower_expr_arm64(db, inner, out);
                out.push(arm(Arm64Insn::CmpImm { a: Arm64Reg::Acc, imm: 0 }));
                out.push(arm(Arm64Insn::Cset { dst: Arm64Reg::Acc, cc: Cond::Eq }));
            }
            Expr::Binary { op, lhs, rhs } if *op == BinOp::And || *op == BinOp::Or => {
                self.lower_short_circuit_arm64(db, *op, lhs, rhs, out);
            }
            Expr::Binary { op, lhs, rhs } if op.is_comparison() => {
                self.lower_comparison_value_arm64(db, *op, lhs, rhs, out);
            }
            Expr::Binary { op, lhs, rhs } => {
                self.lower_arithmetic_arm64(db, *op, lhs, rhs, out);
            }
            Expr::ArrayLiteral(_) => {}
            Expr::ArrayIndex { array, index } => self.lower_array_index_arm64(db, array, index, out),
            Expr::FieldAccess { base, field } => self.lower_field_access_arm64(db, base, field, out),
        }
    }

    fn lower_arithmetic_arm64(&mut self, db: &dyn Db, op: BinOp, lhs: &Expr, rhs: &Expr, out: &mut Vec<Instruction>) {
        self.lower_expr_arm64(db, lhs, out);
        out.push(arm(Arm64Insn::Push(Arm64Reg::Acc)));
        self.lower_expr_arm64(db, rhs, out);
        out.push(arm(Arm64Insn::MovReg { dst: Arm64Reg::Aux, src: Arm64Reg::Acc }));
        out.push(arm(Arm64Insn::Pop(Arm64Reg::Acc)));
        match op {
            BinOp::Add => out.push(arm(Arm64Insn::AddReg { dst: Arm64Reg::Acc, a: Arm64Reg::Acc, b: Arm64Reg::Aux })),
            BinOp::Sub => out.push(arm(Arm64Insn::SubReg { dst: Arm64Reg::Acc, a: Arm64Reg::Acc, b: Arm64Reg::Aux })),
            BinOp::Mul => out.push(arm(Arm64Insn::MulReg { dst: Arm64Reg::Acc, a: Arm64Reg::Acc, b: Arm64Reg::Aux })),
            BinOp::Div => out.push(arm(Arm64Insn::SdivReg { dst: Arm64Reg::Acc, a: Arm64Reg::Acc, b: Arm64Reg::Aux })),
            BinOp::Shr => out.push(arm(Arm64Insn::AsrReg { dst: Arm64Reg::Acc, a: Arm64Reg::Acc, b: Arm64Reg::Aux })),
            _ => unreachable!("not an arithmetic operator"),
        }
    }

    fn lower_comparison_value_arm64(&mut self, db: &dyn Db, op: BinOp, lhs: &Expr, rhs: &Expr, out: &mut Vec<Instruction>) {
        self.lower_expr_arm64(db, lhs, out);
        out.push(arm(Arm64Insn::Push(Arm64Reg::Acc)));
        self.lower_expr_arm64(db, rhs, out);
        out.push(arm(Arm64Insn::MovReg { dst: Arm64Reg::Aux, src: Arm64Reg::Acc }));
        out.push(arm(Arm64Insn::Pop(Arm64Reg::Acc)));
        out.push(arm(Arm64Insn::CmpReg { a: Arm64Reg::Acc, b: Arm64Reg::Aux }));
        out.push(arm(Arm64Insn::Cset { dst: Arm64Reg::Acc, cc: Cond::from_binop(op) }));
    }

    fn lower_short_circuit_arm64(&mut self, db: &dyn Db, op: BinOp, lhs: &Expr, rhs: &Expr, out: &mut Vec<Instruction>) {
        let decide_label = self.fresh_label(if op == BinOp::And { "and_false" } else { "or_true" });
        let end_label = self.fresh_label("logic_end");
        let short_circuit_cc = if op == BinOp::And { Cond::Eq } else { Cond::Neq };

        self.lower_expr_arm64(db, lhs, out);
        out.push(arm(Arm64Insn::CmpImm { a: Arm64Reg::Acc, imm: 0 }));
        out.push(arm(Arm64Insn::BCond { cc: short_circuit_cc, target: decide_label.clone() }));
        self.lower_expr_arm64(db, rhs, out);
        out.push(arm(Arm64Insn::CmpImm { a: Arm64Reg::Acc, imm: 0 }));
        out.push(arm(Arm64Insn::BCond { cc: short_circuit_cc, target: decide_label.clone() }));
        out.push(arm(Arm64Insn::MovImm { dst: Arm64Reg::Acc, imm: if op == BinOp::And { 1 } else { 0 } }));
        out.push(arm(Arm64Insn::B(end_label.clone())));
        out.push(Instruction::Label(decide_label));
        out.push(arm(Arm64Insn::MovImm { dst: Arm64Reg::Acc, imm: if op == BinOp::And { 0 } else { 1 } }));
        out.push(Instruction::Label(end_label));
    }

    fn lower_array_index_arm64(&mut self, db: &dyn Db, array: &Expr, index: &Expr, out: &mut Vec<Instruction>) {
        let Expr::Ident(name) = array else { return };
        let Some(label) = self.resolve(db, name) else { return };
        let elem_size = self.symtab_elem_size(name);
        out.push(arm(Arm64Insn::Adr { dst: Arm64Reg::Aux, label }));
        if let Expr::Number(n) = index {
            out.push(arm(Arm64Insn::Ldr {
                dst: Arm64Reg::Acc,
                base: Arm64Reg::Aux,
                offset: (*n * elem_size as i64) as i32,
            }));
            return;
        }
        out.push(arm(Arm64Insn::Push(Arm64Reg::Aux)));
        self.lower_expr_arm64(db, index, out);
        out.push(arm(Arm64Insn::MovImm { dst: Arm64Reg::Aux, imm: elem_size as i64 }));
        out.push(arm(Arm64Insn::MulReg { dst: Arm64Reg::Acc, a: Arm64Reg::Acc, b: Arm64Reg::Aux }));
        out.push(arm(Arm64Insn::Pop(Arm64Reg::Aux)));
        out.push(arm(Arm64Insn::AddReg { dst: Arm64Reg::Aux, a: Arm64Reg::Aux, b: Arm64Reg::Acc }));
        out.push(arm(Arm64Insn::Ldr { dst: Arm64Reg::Acc, base: Arm64Reg::Aux, offset: 0 }));
    }

    fn lower_field_access_arm64(&mut self, db: &dyn Db, base: &Expr, field: &str, out: &mut Vec<Instruction>) {
        let Expr::Ident(base_name) = base else { return };
        let Some(label) = self.resolve(db, base_name) else { return };
        let Some((offset, _)) = self.struct_field_offset(db, base_name, field) else { return };
        out.push(arm(Arm64Insn::Adr { dst: Arm64Reg::Aux, label }));
        out.push(arm(Arm64Insn::Ldr { dst: Arm64Reg::Acc, base: Arm64Reg::Aux, offset: offset as i32 }));
    }

    pub(super) fn arm64_store_result(&mut self, db: &dyn Db, target: &AssignTarget, out: &mut Vec<Instruction>) {
        match target {
            AssignTarget::Ident(name) => {
                if let Some(label) = self.resolve(db, name) {
                    out.push(arm(Arm64Insn::Adr { dst: Arm64Reg::Aux, label }));
                    out.push(arm(Arm64Insn::Str { src: Arm64Reg::Acc, base: Arm64Reg::Aux, offset: 0 }));
                }
            }
            AssignTarget::Register(reg) => {
                if let Some(sigil) = Sigil::parse(reg) {
                    out.push(arm(Arm64Insn::MovReg { dst: Arm64Reg::Sigil(sigil.0), src: Arm64Reg::Acc }));
                }
            }
            AssignTarget::ArrayElement { name, index } => {
                let Some(label) = self.resolve(db, name) else { return };
                let elem_size = self.symtab_elem_size(name);
                out.push(arm(Arm64Insn::Push(Arm64Reg::Acc)));
                out.push(arm(Arm64Insn::Adr { dst: Arm64Reg::Aux, label }));
                if let Expr::Number(n) = index {
                    out.push(arm(Arm64Insn::Pop(Arm64Reg::Acc)));
                    out.push(arm(Arm64Insn::Str {
                        src: Arm64Reg::Acc,
                        base: Arm64Reg::Aux,
                        offset: (*n * elem_size as i64) as i32,
                    }));
                    return;
                }
                out.push(arm(Arm64Insn::Push(Arm64Reg::Aux)));
                self.lower_expr_arm64(db, index, out);
                out.push(arm(Arm64Insn::MovImm { dst: Arm64Reg::Aux, imm: elem_size as i64 }));
                out.push(arm(Arm64Insn::MulReg { dst: Arm64Reg::Acc, a: Arm64Reg::Acc, b: Arm64Reg::Aux }));
                out.push(arm(Arm64Insn::Pop(Arm64Reg::Aux)));
                out.push(arm(Arm64Insn::AddReg { dst: Arm64Reg::Aux, a: Arm64Reg::Aux, b: Arm64Reg::Acc }));
                out.push(arm(Arm64Insn::Pop(Arm64Reg::Acc)));
                out.push(arm(Arm64Insn::Str { src: Arm64Reg::Acc, base: Arm64Reg::Aux, offset: 0 }));
            }
            AssignTarget::StructField { name, field } => {
                let Some(label) = self.resolve(db, name) else { return };
                let Some((offset, _)) = self.struct_field_offset(db, name, field) else { return };
                out.push(arm(Arm64Insn::Adr { dst: Arm64Reg::Aux, label }));
                out.push(arm(Arm64Insn::Str { src: Arm64Reg::Acc, base: Arm64Reg::Aux, offset: offset as i32 }));
            }
            AssignTarget::Deref(name) => {
                if let Some(label) = self.resolve(db, name) {
                    out.push(arm(Arm64Insn::Push(Arm64Reg::Acc)));
                    out.push(arm(Arm64Insn::Adr { dst: Arm64Reg::Aux, label: label.clone() }));
                    out.push(arm(Arm64Insn::Ldr { dst: Arm64Reg::Aux, base: Arm64Reg::Aux, offset: 0 }));
                    out.push(arm(Arm64Insn::Pop(Arm64Reg::Acc)));
                    out.push(arm(Arm64Insn::Str { src: Arm64Reg::Acc, base: Arm64Reg::Aux, offset: 0 }));
                }
            }
        }
    }

    pub(super) fn arm64_condition_jump_if_false(&mut self, db: &dyn Db, cond: &Expr, target_label: &Text, out: &mut Vec<Instruction>) {
        if let Expr::Binary { op, lhs, rhs } = cond {
            if op.is_comparison() {
                self.lower_expr_arm64(db, lhs, out);
                out.push(arm(Arm64Insn::Push(Arm64Reg::Acc)));
                self.lower_expr_arm64(db, rhs, out);
                out.push(arm(Arm64Insn::MovReg { dst: Arm64Reg::Aux, src: Arm64Reg::Acc }));
                out.push(arm(Arm64Insn::Pop(Arm64Reg::Acc)));
                out.push(arm(Arm64Insn::CmpReg { a: Arm64Reg::Acc, b: Arm64Reg::Aux }));
                out.push(arm(Arm64Insn::BCond { cc: Cond::from_binop(*op).negated(), target: target_label.clone() }));
                return;
            }
        }
        self.lower_expr_arm64(db, cond, out);
        out.push(arm(Arm64Insn::CmpImm { a: Arm64Reg::Acc, imm: 0 }));
        out.push(arm(Arm64Insn::BCond { cc: Cond::Eq, target: target_label.clone() }));
    }

    pub(super) fn arm64_reg_move(&mut self, target: &str, source: &str, out: &mut Vec<Instruction>) {
        let (Some(dst), Some(src)) = (Sigil::parse(target), Sigil::parse(source)) else {
            return;
        };
        out.push(arm(Arm64Insn::MovReg { dst: Arm64Reg::Sigil(dst.0), src: Arm64Reg::Sigil(src.0) }));
    }

    /// Unlike [`Self::lower_expr_arm64`], which loads a variable's *value*,
    /// `display` needs the *address* of the string it names, so a `string`
    /// variable is addressed with `adr` rather than loaded with `ldr`.
    fn address_of_arm64(&mut self, db: &dyn Db, e: &Expr, out: &mut Vec<Instruction>) {
        if let Expr::Ident(name) = e {
            if matches!(self.symtab_type(name), Some(defacto_syntax::ast::Type::Str)) {
                if let Some(label) = self.resolve(db, name) {
                    out.push(arm(Arm64Insn::Adr { dst: Arm64Reg::Acc, label }));
                    return;
                }
            }
        }
        self.lower_expr_arm64(db, e, out);
    }

    pub(super) fn arm64_display(&mut self, db: &dyn Db, e: &Expr, out: &mut Vec<Instruction>) {
        self.address_of_arm64(db, e, out);
        self.emit_strlen_write_arm64(out);
    }

    pub(super) fn arm64_printnum(&mut self, db: &dyn Db, e: &Expr, out: &mut Vec<Instruction>) {
        self.lower_expr_arm64(db, e, out);
        if self.ensure_helper("__defacto_itoa") {
            self.build_itoa_arm64();
        }
        out.push(arm(Arm64Insn::Bl("__defacto_itoa".into())));
        self.emit_write_syscall_arm64(out, Arm64Reg::Acc, Arm64Reg::Aux);
    }

    pub(super) fn arm64_putchar(&mut self, db: &dyn Db, e: &Expr, out: &mut Vec<Instruction>) {
        self.lower_expr_arm64(db, e, out);
        out.push(arm(Arm64Insn::Adr { dst: Arm64Reg::Aux, label: "__defacto_charbuf".into() }));
        out.push(arm(Arm64Insn::StrB { src: Arm64Reg::Acc, base: Arm64Reg::Aux, offset: 0 }));
        let one = Arm64Reg::Sigil(8);
        out.push(arm(Arm64Insn::MovImm { dst: one, imm: 1 }));
        self.emit_write_syscall_arm64(out, Arm64Reg::Aux, one);
    }

    /// `color`/`clear`/`reboot` are VGA-text-mode operations with no
    /// AArch64 terminal equivalent: no AArch64 target is ever bare metal,
    /// so these compile to a no-op comment.
    pub(super) fn arm64_color(&mut self, _db: &dyn Db, _e: &Expr, out: &mut Vec<Instruction>) {
        out.push(Instruction::Comment("color has no effect on a terminal AArch64 target".into()));
    }

    pub(super) fn arm64_clear(&mut self, out: &mut Vec<Instruction>) {
        out.push(Instruction::Comment("clear has no effect on a terminal AArch64 target".into()));
    }

    pub(super) fn arm64_reboot(&mut self, out: &mut Vec<Instruction>) {
        out.push(Instruction::Comment("reboot has no effect on a terminal AArch64 target".into()));
    }

    pub(super) fn arm64_readkey(&mut self, target: &str, out: &mut Vec<Instruction>) {
        self.emit_read_syscall_arm64(out);
        self.store_into_ident_or_reg_arm64(target, out);
    }

    pub(super) fn arm64_readchar(&mut self, target: &str, out: &mut Vec<Instruction>) {
        self.emit_read_syscall_arm64(out);
        self.store_into_ident_or_reg_arm64(target, out);
    }

    fn store_into_ident_or_reg_arm64(&mut self, target: &str, out: &mut Vec<Instruction>) {
        if let Some(sigil) = Sigil::parse(target) {
            out.push(arm(Arm64Insn::MovReg { dst: Arm64Reg::Sigil(sigil.0), src: Arm64Reg::Acc }));
        } else if self.symtab.lookup(target).is_some() {
            let label: Text = format!("var_{target}").into();
            out.push(arm(Arm64Insn::Adr { dst: Arm64Reg::Aux, label }));
            out.push(arm(Arm64Insn::Str { src: Arm64Reg::Acc, base: Arm64Reg::Aux, offset: 0 }));
        }
    }

    pub(super) fn arm64_alloc(&mut self, db: &dyn Db, size: &Expr, out: &mut Vec<Instruction>) {
        self.lower_expr_arm64(db, size, out);
        out.push(arm(Arm64Insn::Push(Arm64Reg::Acc)));
        out.push(arm(Arm64Insn::Bl("malloc".into())));
        out.push(arm(Arm64Insn::Pop(Arm64Reg::Aux)));
    }

    pub(super) fn arm64_free(&mut self, db: &dyn Db, name: &str, out: &mut Vec<Instruction>) {
        let Some(label) = self.resolve(db, name) else { return };
        out.push(arm(Arm64Insn::Adr { dst: Arm64Reg::Aux, label: label.clone() }));
        out.push(arm(Arm64Insn::Ldr { dst: Arm64Reg::Acc, base: Arm64Reg::Aux, offset: 0 }));
        out.push(arm(Arm64Insn::Push(Arm64Reg::Aux)));
        out.push(arm(Arm64Insn::Bl("free".into())));
        out.push(arm(Arm64Insn::Pop(Arm64Reg::Aux)));
        out.push(arm(Arm64Insn::MovImm { dst: Arm64Reg::Acc, imm: 0 }));
        out.push(arm(Arm64Insn::Str { src: Arm64Reg::Acc, base: Arm64Reg::Aux, offset: 0 }));
    }

    /// `write(1, buf, len)`: `x0`/`x1`/`x2` are argument registers, `x8`
    /// carries the syscall number (`#R9`/`#R2`/`#R3`/`#R1` in sigil terms —
    /// `Sigil(n)` addresses `x(n-1)`).
    fn emit_write_syscall_arm64(&mut self, out: &mut Vec<Instruction>, buf: Arm64Reg, len: Arm64Reg) {
        let sys = syscalls_for(self.macos());
        out.push(arm(Arm64Insn::MovReg { dst: Arm64Reg::Sigil(2), src: buf }));
        out.push(arm(Arm64Insn::MovReg { dst: Arm64Reg::Sigil(3), src: len }));
        out.push(arm(Arm64Insn::MovImm { dst: Arm64Reg::Sigil(1), imm: 1 }));
        out.push(arm(Arm64Insn::MovImm { dst: Arm64Reg::Sigil(9), imm: sys.write }));
        out.push(arm(Arm64Insn::Svc(0)));
    }

    /// `read(0, &__defacto_charbuf, 1)`, then the single byte read back is
    /// zero-extended into the accumulator with `ldrb`.
    fn emit_read_syscall_arm64(&mut self, out: &mut Vec<Instruction>) {
        let sys = syscalls_for(self.macos());
        out.push(arm(Arm64Insn::Adr { dst: Arm64Reg::Aux, label: "__defacto_charbuf".into() }));
        out.push(arm(Arm64Insn::MovImm { dst: Arm64Reg::Sigil(1), imm: 0 }));
        out.push(arm(Arm64Insn::MovReg { dst: Arm64Reg::Sigil(2), src: Arm64Reg::Aux }));
        out.push(arm(Arm64Insn::MovImm { dst: Arm64Reg::Sigil(3), imm: 1 }));
        out.push(arm(Arm64Insn::MovImm { dst: Arm64Reg::Sigil(9), imm: sys.read }));
        out.push(arm(Arm64Insn::Svc(0)));
        out.push(arm(Arm64Insn::LdrB { dst: Arm64Reg::Acc, base: Arm64Reg::Aux, offset: 0 }));
    }

    /// Walks the null-terminated string addressed by the accumulator,
    /// then writes it with the length it found.
    fn emit_strlen_write_arm64(&mut self, out: &mut Vec<Instruction>) {
        let buf = Arm64Reg::Sigil(14);
        let scan = Arm64Reg::Sigil(15);
        let ch = Arm64Reg::Sigil(13);
        let len = Arm64Reg::Sigil(16);

        let start = self.fresh_label("strlen");
        let done = self.fresh_label("strlen_done");

        out.push(arm(Arm64Insn::MovReg { dst: buf, src: Arm64Reg::Acc }));
        out.push(arm(Arm64Insn::MovReg { dst: scan, src: Arm64Reg::Acc }));
        out.push(arm(Arm64Insn::MovImm { dst: len, imm: 0 }));
        out.push(Instruction::Label(start.clone()));
        out.push(arm(Arm64Insn::LdrB { dst: ch, base: scan, offset: 0 }));
        out.push(arm(Arm64Insn::CmpImm { a: ch, imm: 0 }));
        out.push(arm(Arm64Insn::BCond { cc: Cond::Eq, target: done.clone() }));
        out.push(arm(Arm64Insn::AddImm { dst: scan, src: scan, imm: 1 }));
        out.push(arm(Arm64Insn::AddImm { dst: len, src: len, imm: 1 }));
        out.push(arm(Arm64Insn::B(start)));
        out.push(Instruction::Label(done));
        self.emit_write_syscall_arm64(out, buf, len);
    }

    /// Decimal itoa: the accumulator holds the value on entry, and on
    /// return the accumulator holds the digit buffer's address and the
    /// auxiliary register holds its length. Digits are written back to
    /// front into a 24-byte buffer (room for a 64-bit value's sign and all
    /// digits); the do-while digit loop runs at least once so `0` prints a
    /// single `'0'` rather than nothing.
    fn build_itoa_arm64(&mut self) {
        self.data.push(asm::DataItem::Bytes { label: "__defacto_numbuf".into(), size: 24 });

        let neg = Arm64Reg::Sigil(5);
        let ptr = Arm64Reg::Sigil(6);
        let tmp = Arm64Reg::Sigil(7);
        let len = Arm64Reg::Sigil(8);
        let quot = Arm64Reg::Sigil(10);
        let ten = Arm64Reg::Sigil(11);
        let rem = Arm64Reg::Sigil(12);
        let one = Arm64Reg::Sigil(13);

        let sign_positive = self.fresh_label("itoa_pos");
        let digit_loop = self.fresh_label("itoa_loop");
        let done = self.fresh_label("itoa_done");

        let body = vec![
            Instruction::Label("__defacto_itoa".into()),
            arm(Arm64Insn::MovImm { dst: neg, imm: 0 }),
            arm(Arm64Insn::MovImm { dst: len, imm: 0 }),
            arm(Arm64Insn::MovImm { dst: one, imm: 1 }),
            arm(Arm64Insn::MovImm { dst: ten, imm: 10 }),
            arm(Arm64Insn::CmpImm { a: Arm64Reg::Acc, imm: 0 }),
            arm(Arm64Insn::BCond { cc: Cond::Gte, target: sign_positive.clone() }),
            arm(Arm64Insn::NegReg { dst: Arm64Reg::Acc, src: Arm64Reg::Acc }),
            arm(Arm64Insn::MovImm { dst: neg, imm: 1 }),
            Instruction::Label(sign_positive),
            arm(Arm64Insn::Adr { dst: ptr, label: "__defacto_numbuf".into() }),
            arm(Arm64Insn::AddImm { dst: ptr, src: ptr, imm: 23 }),
            Instruction::Label(digit_loop.clone()),
            arm(Arm64Insn::SdivReg { dst: quot, a: Arm64Reg::Acc, b: ten }),
            arm(Arm64Insn::MulReg { dst: rem, a: quot, b: ten }),
            arm(Arm64Insn::SubReg { dst: rem, a: Arm64Reg::Acc, b: rem }),
            arm(Arm64Insn::AddImm { dst: rem, src: rem, imm: 48 }),
            arm(Arm64Insn::StrB { src: rem, base: ptr, offset: 0 }),
            arm(Arm64Insn::SubReg { dst: ptr, a: ptr, b: one }),
            arm(Arm64Insn::AddImm { dst: len, src: len, imm: 1 }),
            arm(Arm64Insn::MovReg { dst: Arm64Reg::Acc, src: quot }),
            arm(Arm64Insn::CmpImm { a: Arm64Reg::Acc, imm: 0 }),
            arm(Arm64Insn::BCond { cc: Cond::Neq, target: digit_loop }),
            arm(Arm64Insn::CmpImm { a: neg, imm: 0 }),
            arm(Arm64Insn::BCond { cc: Cond::Eq, target: done.clone() }),
            arm(Arm64Insn::MovImm { dst: tmp, imm: 45 }),
            arm(Arm64Insn::StrB { src: tmp, base: ptr, offset: 0 }),
            arm(Arm64Insn::SubReg { dst: ptr, a: ptr, b: one }),
            arm(Arm64Insn::AddImm { dst: len, src: len, imm: 1 }),
            Instruction::Label(done),
            arm(Arm64Insn::AddImm { dst: ptr, src: ptr, imm: 1 }),
            arm(Arm64Insn::MovReg { dst: Arm64Reg::Acc, src: ptr }),
            arm(Arm64Insn::MovReg { dst: Arm64Reg::Aux, src: len }),
            arm(Arm64Insn::Ret),
        ];
        self.functions.push(("__defacto_itoa".into(), body, Span::new(0, 0)));
    }
}
