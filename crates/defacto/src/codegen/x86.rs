//! The x86 backend: instruction selection for bare-metal, Linux32,
//! Linux64, and macOS64.
//!
//! Shares one instruction set ([`asm::X86Insn`]) across all four x86
//! targets; only the syscall numbers, extern declarations, and device-I/O
//! availability differ, which is handled here rather than by having four
//! separate instruction sets.

use defacto_syntax::Span;
use defacto_syntax::ast::{AssignTarget, BinOp, Expr};

use super::{Generator, asm, registers::Sigil};
use crate::{Db, Text, target::Target};

use asm::{Cond, Instruction, Operand, X86Insn, X86Reg};

fn x86(insn: X86Insn) -> Instruction {
    Instruction::X86(insn)
}

/// Linux/macOS syscall numbers this backend needs, keyed by target. Bare
/// metal never reaches these — it has no syscalls.
#[allow(dead_code)]
struct Syscalls {
    write: i64,
    read: i64,
    exit: i64,
}

fn syscalls_for(target: Target) -> Syscalls {
    match target {
        Target::Linux32 => Syscalls { write: 4, read: 3, exit: 1 },
        Target::Linux64 => Syscalls { write: 1, read: 0, exit: 60 },
        Target::MacOs64 => Syscalls {
            write: 0x2000000 | 4,
            read: 0x2000000 | 3,
            exit: 0x2000000 | 1,
        },
        Target::BareMetal | Target::Arm64 { .. } => unreachable!("not an x86 syscall target"),
    }
}

impl Generator {
    pub(super) fn x86_store_literal_at_offset(&mut self, label: &Text, offset: i32, item: &Expr, out: &mut Vec<Instruction>) {
        let value = match item {
            Expr::Number(n) | Expr::Hex(n) => *n,
            Expr::Bool(b) => *b as i64,
            _ => 0,
        };
        out.push(x86(X86Insn::Mov {
            dst: Operand::LabelOffset(label.clone(), offset),
            src: Operand::Imm(value),
        }));
    }

    /// The core expression evaluator: recursively lower
    /// the left operand into the accumulator, spill it across the stack if
    /// the right operand is itself compound, evaluate the right operand,
    /// and apply the operator. Simple right-hand values fold directly into
    /// the instruction's operand rather than spilling.
    pub(super) fn lower_expr_x86(&mut self, db: &dyn Db, expr: &Expr, out: &mut Vec<Instruction>) {
        match expr {
            Expr::Number(n) | Expr::Hex(n) => {
                out.push(x86(X86Insn::Mov { dst: Operand::Reg(X86Reg::ACC), src: Operand::Imm(*n) }));
            }
            Expr::Bool(b) => {
                out.push(x86(X86Insn::Mov { dst: Operand::Reg(X86Reg::ACC), src: Operand::Imm(*b as i64) }));
            }
            Expr::Str(_) => {
                // A string literal used as a value (not a `var` initializer)
                // evaluates to its address — the same as `&`-of-a-label.
            }
            Expr::Ident(name) => {
                if let Some(label) = self.resolve(db, name) {
                    out.push(x86(X86Insn::Mov { dst: Operand::Reg(X86Reg::ACC), src: Operand::Label(label) }));
                }
            }
            Expr::Register(reg) => {
                if let Some(sigil) = Sigil::parse(reg) {
                    out.push(x86(X86Insn::Mov {
                        dst: Operand::Reg(X86Reg::ACC),
                        src: Operand::Reg(X86Reg::Sigil(sigil.0)),
                    }));
                }
            }
            Expr::AddressOf(inner) => match inner.as_ref() {
                Expr::Ident(name) => {
                    if let Some(label) = self.resolve(db, name) {
                        out.push(x86(X86Insn::Lea { dst: X86Reg::ACC, label }));
                    }
                }
                Expr::FieldAccess { base, field } => {
                    if let Expr::Ident(base_name) = base.as_ref() {
                        if let Some(label) = self.resolve(db, base_name) {
                            if let Some((offset, _)) = self.struct_field_offset(db, base_name, field) {
                                out.push(x86(X86Insn::Lea { dst: X86Reg::ACC, label }));
                                out.push(x86(X86Insn::Add {
                                    dst: Operand::Reg(X86Reg::ACC),
                                    src: Operand::Imm(offset as i64),
                                }));
                            }
                        }
                    }
                }
                other => self.lower_expr_x86(db, other, out),
            },
            Expr::Deref(inner) => {
                self.lower_expr_x86(db, inner, out);
                out.push(x86(X86Insn::Mov {
                    dst: Operand::Reg(X86Reg::ACC),
                    src: Operand::RegOffset(X86Reg::ACC, 0),
                }));
            }
            Expr::Neg(inner) => {
                self.lower_expr_x86(db, inner, out);
                out.push(x86(X86Insn::Neg(Operand::Reg(X86Reg::ACC))));
            }
            Expr::Not(inner) => {
                self.lower_expr_x86(db, inner, out);
                out.push(x86(X86Insn::Cmp { left: Operand::Reg(X86Reg::ACC), right: Operand::Imm(0) }));
                out.push(x86(X86Insn::Mov { dst: Operand::Reg(X86Reg::AUX), src: Operand::Imm(0) }));
                out.push(x86(X86Insn::SetCc { cc: Cond::Eq, dst: X86Reg::AUX }));
                out.push(x86(X86Insn::Mov { dst: Operand::Reg(X86Reg::ACC), src: Operand::Reg(X86Reg::AUX) }));
            }
            Expr::Binary { op, lhs, rhs } if *op == BinOp::And || *op == BinOp::Or => {
                self.lower_short_circuit(db, *op, lhs, rhs, out);
            }
            Expr::Binary { op, lhs, rhs } if op.is_comparison() => {
                self.lower_comparison_value(db, *op, lhs, rhs, out);
            }
            Expr::Binary { op, lhs, rhs } => {
                self.lower_arithmetic(db, *op, lhs, rhs, out);
            }
            Expr::ArrayLiteral(_) => {
                // Only meaningful as a `var` initializer; see `declare_var`.
            }
            Expr::ArrayIndex { array, index } => self.lower_array_index_x86(db, array, index, out),
            Expr::FieldAccess { base, field } => self.lower_field_access_x86(db, base, field, out),
        }
    }

    fn lower_arithmetic(&mut self, db: &dyn Db, op: BinOp, lhs: &Expr, rhs: &Expr, out: &mut Vec<Instruction>) {
        self.lower_expr_x86(db, lhs, out);
        if let Some(operand) = simple_operand(rhs) {
            match op {
                BinOp::Add => out.push(x86(X86Insn::Add { dst: Operand::Reg(X86Reg::ACC), src: operand })),
                BinOp::Sub => out.push(x86(X86Insn::Sub { dst: Operand::Reg(X86Reg::ACC), src: operand })),
                BinOp::Mul => out.push(x86(X86Insn::Imul { dst: X86Reg::ACC, src: operand })),
                BinOp::Div => self.emit_div(operand, out),
                BinOp::Shr => self.emit_shr(operand, out),
                _ => unreachable!("not an arithmetic operator"),
            }
            return;
        }
        out.push(x86(X86Insn::Push(Operand::Reg(X86Reg::ACC))));
        self.lower_expr_x86(db, rhs, out);
        out.push(x86(X86Insn::Mov { dst: Operand::Reg(X86Reg::SPILL), src: Operand::Reg(X86Reg::ACC) }));
        out.push(x86(X86Insn::Pop(X86Reg::ACC)));
        match op {
            BinOp::Add => out.push(x86(X86Insn::Add { dst: Operand::Reg(X86Reg::ACC), src: Operand::Reg(X86Reg::SPILL) })),
            BinOp::Sub => out.push(x86(X86Insn::Sub { dst: Operand::Reg(X86Reg::ACC), src: Operand::Reg(X86Reg::SPILL) })),
            BinOp::Mul => out.push(x86(X86Insn::Imul { dst: X86Reg::ACC, src: Operand::Reg(X86Reg::SPILL) })),
            BinOp::Div => self.emit_div(Operand::Reg(X86Reg::SPILL), out),
            BinOp::Shr => self.emit_shr(Operand::Reg(X86Reg::SPILL), out),
            _ => unreachable!("not an arithmetic operator"),
        }
    }

    /// `>>`: the shift count must be in `cl`, which is `#R4`/[`X86Reg::COUNTER`]'s
    /// low byte, so the count operand is moved there before `sar`.
    fn emit_shr(&mut self, count: Operand, out: &mut Vec<Instruction>) {
        out.push(x86(X86Insn::Mov { dst: Operand::Reg(X86Reg::COUNTER), src: count }));
        out.push(x86(X86Insn::Sar(Operand::Reg(X86Reg::ACC))));
    }

    /// `idiv` with explicit sign-extension and save/restore of the
    /// dividend-high register.
    fn emit_div(&mut self, divisor: Operand, out: &mut Vec<Instruction>) {
        out.push(x86(X86Insn::SignExtend));
        out.push(x86(X86Insn::Idiv(divisor)));
    }

    fn lower_comparison_value(&mut self, db: &dyn Db, op: BinOp, lhs: &Expr, rhs: &Expr, out: &mut Vec<Instruction>) {
        out.push(x86(X86Insn::Mov { dst: Operand::Reg(X86Reg::AUX), src: Operand::Imm(0) }));
        self.lower_expr_x86(db, lhs, out);
        out.push(x86(X86Insn::Push(Operand::Reg(X86Reg::ACC))));
        self.lower_expr_x86(db, rhs, out);
        out.push(x86(X86Insn::Mov { dst: Operand::Reg(X86Reg::SPILL), src: Operand::Reg(X86Reg::ACC) }));
        out.push(x86(X86Insn::Pop(X86Reg::ACC)));
        out.push(x86(X86Insn::Cmp { left: Operand::Reg(X86Reg::ACC), right: Operand::Reg(X86Reg::SPILL) }));
        out.push(x86(X86Insn::SetCc { cc: Cond::from_binop(op), dst: X86Reg::AUX }));
        out.push(x86(X86Insn::Mov { dst: Operand::Reg(X86Reg::ACC), src: Operand::Reg(X86Reg::AUX) }));
    }

    /// `&&`/`||` short-circuit: the right operand is only evaluated if the
    /// left doesn't already decide the result.
    fn lower_short_circuit(&mut self, db: &dyn Db, op: BinOp, lhs: &Expr, rhs: &Expr, out: &mut Vec<Instruction>) {
        let decide_label = self.fresh_label(if op == BinOp::And { "and_false" } else { "or_true" });
        let end_label = self.fresh_label("logic_end");
        let short_circuit_cc = if op == BinOp::And { Cond::Eq } else { Cond::Neq };

        self.lower_expr_x86(db, lhs, out);
        out.push(x86(X86Insn::Cmp { left: Operand::Reg(X86Reg::ACC), right: Operand::Imm(0) }));
        out.push(x86(X86Insn::Jcc { cc: short_circuit_cc, target: decide_label.clone() }));
        self.lower_expr_x86(db, rhs, out);
        out.push(x86(X86Insn::Cmp { left: Operand::Reg(X86Reg::ACC), right: Operand::Imm(0) }));
        out.push(x86(X86Insn::Jcc { cc: short_circuit_cc, target: decide_label.clone() }));
        out.push(x86(X86Insn::Mov {
            dst: Operand::Reg(X86Reg::ACC),
            src: Operand::Imm(if op == BinOp::And { 1 } else { 0 }),
        }));
        out.push(x86(X86Insn::Jmp(end_label.clone())));
        out.push(Instruction::Label(decide_label));
        out.push(x86(X86Insn::Mov {
            dst: Operand::Reg(X86Reg::ACC),
            src: Operand::Imm(if op == BinOp::And { 0 } else { 1 }),
        }));
        out.push(Instruction::Label(end_label));
    }

    fn lower_array_index_x86(&mut self, db: &dyn Db, array: &Expr, index: &Expr, out: &mut Vec<Instruction>) {
        let Expr::Ident(name) = array else {
            return;
        };
        let Some(label) = self.resolve(db, name) else {
            return;
        };
        let elem_size = self.symtab_elem_size(name);
        if let Expr::Number(n) = index {
            out.push(x86(X86Insn::Mov {
                dst: Operand::Reg(X86Reg::ACC),
                src: Operand::LabelOffset(label, (*n * elem_size as i64) as i32),
            }));
            return;
        }
        self.lower_expr_x86(db, index, out);
        out.push(x86(X86Insn::Imul { dst: X86Reg::ACC, src: Operand::Imm(elem_size as i64) }));
        out.push(x86(X86Insn::Lea { dst: X86Reg::SPILL, label }));
        out.push(x86(X86Insn::Add { dst: Operand::Reg(X86Reg::SPILL), src: Operand::Reg(X86Reg::ACC) }));
        out.push(x86(X86Insn::Mov { dst: Operand::Reg(X86Reg::ACC), src: Operand::RegOffset(X86Reg::SPILL, 0) }));
    }

    fn lower_field_access_x86(&mut self, db: &dyn Db, base: &Expr, field: &str, out: &mut Vec<Instruction>) {
        let Expr::Ident(base_name) = base else {
            return;
        };
        let Some(label) = self.resolve(db, base_name) else {
            return;
        };
        let Some((offset, _)) = self.struct_field_offset(db, base_name, field) else {
            return;
        };
        if self.bits() == 64 {
            out.push(x86(X86Insn::Lea { dst: X86Reg::SPILL, label }));
            out.push(x86(X86Insn::Mov {
                dst: Operand::Reg(X86Reg::ACC),
                src: Operand::RegOffset(X86Reg::SPILL, offset as i32),
            }));
        } else {
            out.push(x86(X86Insn::Mov {
                dst: Operand::Reg(X86Reg::ACC),
                src: Operand::LabelOffset(label, offset as i32),
            }));
        }
    }

    /// Struct-free, best-effort element size lookup for array indexing.
    /// `#3 Symbol table` only records the declared [`Type`], so an array's
    /// element size has to be derived from it again here.
    pub(super) fn symtab_elem_size(&self, name: &str) -> u32 {
        match self.symtab_type(name) {
            Some(defacto_syntax::ast::Type::Array(elem, _)) => elem.size_on(self.bits()),
            Some(ty) => ty.size_on(self.bits()),
            None => 4,
        }
    }

    pub(super) fn symtab_type(&self, name: &str) -> Option<defacto_syntax::ast::Type> {
        self.symtab.lookup(name).map(|s| s.ty.clone())
    }

    pub(super) fn x86_store_result(&mut self, db: &dyn Db, target: &AssignTarget, out: &mut Vec<Instruction>) {
        match target {
            AssignTarget::Ident(name) => {
                if let Some(label) = self.resolve(db, name) {
                    out.push(x86(X86Insn::Mov { dst: Operand::Label(label), src: Operand::Reg(X86Reg::ACC) }));
                }
            }
            AssignTarget::Register(reg) => {
                if let Some(sigil) = Sigil::parse(reg) {
                    out.push(x86(X86Insn::Mov {
                        dst: Operand::Reg(X86Reg::Sigil(sigil.0)),
                        src: Operand::Reg(X86Reg::ACC),
                    }));
                }
            }
            AssignTarget::ArrayElement { name, index } => {
                let Some(label) = self.resolve(db, name) else { return };
                let elem_size = self.symtab_elem_size(name);
                out.push(x86(X86Insn::Mov { dst: Operand::Reg(X86Reg::SPILL), src: Operand::Reg(X86Reg::ACC) }));
                if let Expr::Number(n) = index {
                    out.push(x86(X86Insn::Mov {
                        dst: Operand::LabelOffset(label, (*n * elem_size as i64) as i32),
                        src: Operand::Reg(X86Reg::SPILL),
                    }));
                    return;
                }
                self.lower_expr_x86(db, index, out);
                out.push(x86(X86Insn::Imul { dst: X86Reg::ACC, src: Operand::Imm(elem_size as i64) }));
                out.push(x86(X86Insn::Lea { dst: X86Reg::AUX, label }));
                out.push(x86(X86Insn::Add { dst: Operand::Reg(X86Reg::AUX), src: Operand::Reg(X86Reg::ACC) }));
                out.push(x86(X86Insn::Mov {
                    dst: Operand::RegOffset(X86Reg::AUX, 0),
                    src: Operand::Reg(X86Reg::SPILL),
                }));
            }
            AssignTarget::StructField { name, field } => {
                let Some(label) = self.resolve(db, name) else { return };
                let Some((offset, _)) = self.struct_field_offset(db, name, field) else { return };
                if self.bits() == 64 {
                    out.push(x86(X86Insn::Mov { dst: Operand::Reg(X86Reg::SPILL), src: Operand::Reg(X86Reg::ACC) }));
                    out.push(x86(X86Insn::Lea { dst: X86Reg::AUX, label }));
                    out.push(x86(X86Insn::Mov {
                        dst: Operand::RegOffset(X86Reg::AUX, offset as i32),
                        src: Operand::Reg(X86Reg::SPILL),
                    }));
                } else {
                    out.push(x86(X86Insn::Mov {
                        dst: Operand::LabelOffset(label, offset as i32),
                        src: Operand::Reg(X86Reg::ACC),
                    }));
                }
            }
            AssignTarget::Deref(name) => {
                if let Some(label) = self.resolve(db, name) {
                    out.push(x86(X86Insn::Mov { dst: Operand::Reg(X86Reg::SPILL), src: Operand::Reg(X86Reg::ACC) }));
                    out.push(x86(X86Insn::Mov { dst: Operand::Reg(X86Reg::AUX), src: Operand::Label(label) }));
                    out.push(x86(X86Insn::Mov {
                        dst: Operand::RegOffset(X86Reg::AUX, 0),
                        src: Operand::Reg(X86Reg::SPILL),
                    }));
                }
            }
        }
    }

    /// The condition-evaluation-and-negated-jump sequence every control-flow
    /// construct uses. A bare identifier or
    /// literal condition is treated as an implicit `!= 0` test, matching
    /// `while cond { }` over a plain boolean.
    pub(super) fn x86_condition_jump_if_false(&mut self, db: &dyn Db, cond: &Expr, target_label: &Text, out: &mut Vec<Instruction>) {
        if let Expr::Binary { op, lhs, rhs } = cond {
            if op.is_comparison() {
                self.lower_expr_x86(db, lhs, out);
                out.push(x86(X86Insn::Push(Operand::Reg(X86Reg::ACC))));
                self.lower_expr_x86(db, rhs, out);
                out.push(x86(X86Insn::Mov { dst: Operand::Reg(X86Reg::SPILL), src: Operand::Reg(X86Reg::ACC) }));
                out.push(x86(X86Insn::Pop(X86Reg::ACC)));
                out.push(x86(X86Insn::Cmp { left: Operand::Reg(X86Reg::ACC), right: Operand::Reg(X86Reg::SPILL) }));
                out.push(x86(X86Insn::Jcc {
                    cc: Cond::from_binop(*op).negated(),
                    target: target_label.clone(),
                }));
                return;
            }
        }
        self.lower_expr_x86(db, cond, out);
        out.push(x86(X86Insn::Cmp { left: Operand::Reg(X86Reg::ACC), right: Operand::Imm(0) }));
        out.push(x86(X86Insn::Jcc { cc: Cond::Eq, target: target_label.clone() }));
    }

    pub(super) fn x86_reg_move(&mut self, target: &str, source: &str, out: &mut Vec<Instruction>) {
        let (Some(dst), Some(src)) = (Sigil::parse(target), Sigil::parse(source)) else {
            return;
        };
        out.push(x86(X86Insn::Mov {
            dst: Operand::Reg(X86Reg::Sigil(dst.0)),
            src: Operand::Reg(X86Reg::Sigil(src.0)),
        }));
    }

    /// Unlike [`Self::lower_expr_x86`], which loads a variable's *value*,
    /// `display` needs the *address* of the string it names — a `string`
    /// variable's data-section label already holds the bytes themselves,
    /// so taking its address is a plain `lea` rather than a load.
    fn address_of_x86(&mut self, db: &dyn Db, e: &Expr, out: &mut Vec<Instruction>) {
        if let Expr::Ident(name) = e {
            if matches!(self.symtab_type(name), Some(defacto_syntax::ast::Type::Str)) {
                if let Some(label) = self.resolve(db, name) {
                    out.push(x86(X86Insn::Lea { dst: X86Reg::ACC, label }));
                    return;
                }
            }
        }
        self.lower_expr_x86(db, e, out);
    }

    pub(super) fn x86_display(&mut self, db: &dyn Db, e: &Expr, out: &mut Vec<Instruction>) {
        self.address_of_x86(db, e, out);
        if self.target.is_bare_metal() {
            self.emit_vga_puts_call(out);
        } else {
            self.emit_strlen_write_x86(out);
        }
    }

    pub(super) fn x86_printnum(&mut self, db: &dyn Db, e: &Expr, out: &mut Vec<Instruction>) {
        self.lower_expr_x86(db, e, out);
        self.emit_itoa_call_x86(out);
        if self.target.is_bare_metal() {
            self.emit_vga_puts_call(out);
        } else {
            self.emit_write_syscall_dyn(out, X86Reg::ACC, X86Reg::COUNTER);
        }
    }

    pub(super) fn x86_putchar(&mut self, db: &dyn Db, e: &Expr, out: &mut Vec<Instruction>) {
        self.lower_expr_x86(db, e, out);
        out.push(x86(X86Insn::MovByteStoreLabel { label: "__defacto_charbuf".into(), src: X86Reg::ACC }));
        if self.target.is_bare_metal() {
            out.push(x86(X86Insn::Lea { dst: X86Reg::ACC, label: "__defacto_charbuf".into() }));
            self.emit_vga_puts_call(out);
        } else {
            self.emit_write_syscall(out, "__defacto_charbuf", 1);
        }
    }

    pub(super) fn x86_color(&mut self, db: &dyn Db, e: &Expr, out: &mut Vec<Instruction>) {
        if !self.target.is_bare_metal() {
            return;
        }
        self.lower_expr_x86(db, e, out);
        out.push(x86(X86Insn::MovByteStoreLabel { label: "__defacto_attr".into(), src: X86Reg::ACC }));
    }

    pub(super) fn x86_clear(&mut self, out: &mut Vec<Instruction>) {
        if self.target.is_bare_metal() {
            if self.ensure_helper("__defacto_vga_clear") {
                self.build_vga_clear_x86();
            }
            out.push(x86(X86Insn::Call("__defacto_vga_clear".into())));
        }
    }

    /// 8042-controller reset: write `0xFE` to the command port, then halt
    /// waiting for the reset to take effect.
    pub(super) fn x86_reboot(&mut self, out: &mut Vec<Instruction>) {
        if self.target.is_bare_metal() {
            out.push(x86(X86Insn::Mov { dst: Operand::Reg(X86Reg::ACC), src: Operand::Imm(0xFE) }));
            out.push(x86(X86Insn::OutByte { port: 0x64 }));
            out.push(x86(X86Insn::Hlt));
        } else {
            out.push(Instruction::Comment("reboot is a no-op outside bare metal".into()));
        }
    }

    pub(super) fn x86_readkey(&mut self, target: &str, out: &mut Vec<Instruction>) {
        if self.target.is_bare_metal() {
            if self.ensure_helper("__defacto_ps2_readkey") {
                self.build_ps2_readkey_x86();
            }
            out.push(x86(X86Insn::Call("__defacto_ps2_readkey".into())));
        } else {
            self.emit_read_syscall(out);
        }
        self.store_into_ident_or_reg(target, out);
    }

    pub(super) fn x86_readchar(&mut self, target: &str, out: &mut Vec<Instruction>) {
        if self.target.is_bare_metal() {
            if self.ensure_helper("__defacto_ps2_readchar") {
                self.build_ps2_readchar_x86();
            }
            out.push(x86(X86Insn::Call("__defacto_ps2_readchar".into())));
        } else {
            self.emit_read_syscall(out);
        }
        self.store_into_ident_or_reg(target, out);
    }

    fn store_into_ident_or_reg(&mut self, target: &str, out: &mut Vec<Instruction>) {
        if let Some(sigil) = Sigil::parse(target) {
            out.push(x86(X86Insn::Mov {
                dst: Operand::Reg(X86Reg::Sigil(sigil.0)),
                src: Operand::Reg(X86Reg::ACC),
            }));
        } else if let Some(label) = self.symtab.lookup(target).map(|_| format!("var_{target}").into()) {
            out.push(x86(X86Insn::Mov { dst: Operand::Label(label), src: Operand::Reg(X86Reg::ACC) }));
        }
    }

    /// `alloc{N}`: a libc `malloc` call on terminal targets, or a bump
    /// allocator over a fixed static arena on bare metal, which has no
    /// libc to call into.
    pub(super) fn x86_alloc(&mut self, db: &dyn Db, size: &Expr, out: &mut Vec<Instruction>) {
        self.lower_expr_x86(db, size, out);
        if self.target.has_libc() {
            out.push(x86(X86Insn::Push(Operand::Reg(X86Reg::ACC))));
            out.push(x86(X86Insn::Call("malloc".into())));
            out.push(x86(X86Insn::Pop(X86Reg::AUX)));
        } else {
            out.push(Instruction::Comment("bump allocator: __defacto_heap_ptr += requested size".into()));
            out.push(x86(X86Insn::Mov { dst: Operand::Reg(X86Reg::AUX), src: Operand::Label("__defacto_heap_ptr".into()) }));
            out.push(x86(X86Insn::Add { dst: Operand::Label("__defacto_heap_ptr".into()), src: Operand::Reg(X86Reg::ACC) }));
            out.push(x86(X86Insn::Mov { dst: Operand::Reg(X86Reg::ACC), src: Operand::Reg(X86Reg::AUX) }));
        }
    }

    pub(super) fn x86_free(&mut self, db: &dyn Db, name: &str, out: &mut Vec<Instruction>) {
        let Some(label) = self.resolve(db, name) else { return };
        if self.target.has_libc() {
            out.push(x86(X86Insn::Mov { dst: Operand::Reg(X86Reg::ACC), src: Operand::Label(label.clone()) }));
            out.push(x86(X86Insn::Push(Operand::Reg(X86Reg::ACC))));
            out.push(x86(X86Insn::Call("free".into())));
            out.push(x86(X86Insn::Pop(X86Reg::AUX)));
        }
        out.push(x86(X86Insn::Mov { dst: Operand::Label(label), src: Operand::Imm(0) }));
    }

    /// `write(2)` of a fixed label/length pair — only `putchar`'s
    /// one-byte write needs this; everything else's length is only known at
    /// run time and goes through [`Self::emit_write_syscall_dyn`].
    fn emit_write_syscall(&mut self, out: &mut Vec<Instruction>, label: &str, len: i64) {
        let sys = syscalls_for(self.target);
        out.push(x86(X86Insn::Lea { dst: X86Reg::Sigil(2), label: label.into() }));
        out.push(x86(X86Insn::Mov { dst: Operand::Reg(X86Reg::Sigil(3)), src: Operand::Imm(len) }));
        out.push(x86(X86Insn::Mov { dst: Operand::Reg(X86Reg::Sigil(1)), src: Operand::Imm(1) }));
        out.push(x86(X86Insn::Mov { dst: Operand::Reg(X86Reg::ACC), src: Operand::Imm(sys.write) }));
        out.push(x86(X86Insn::Syscall));
    }

    /// `write(2)` of a buffer/length pair computed at run time, e.g. a
    /// `display` string whose length is only known by scanning it, or the
    /// digit buffer `__defacto_itoa` hands back.
    fn emit_write_syscall_dyn(&mut self, out: &mut Vec<Instruction>, buf_reg: X86Reg, len_reg: X86Reg) {
        let sys = syscalls_for(self.target);
        out.push(x86(X86Insn::Mov { dst: Operand::Reg(X86Reg::Sigil(2)), src: Operand::Reg(buf_reg) }));
        out.push(x86(X86Insn::Mov { dst: Operand::Reg(X86Reg::Sigil(3)), src: Operand::Reg(len_reg) }));
        out.push(x86(X86Insn::Mov { dst: Operand::Reg(X86Reg::Sigil(1)), src: Operand::Imm(1) }));
        out.push(x86(X86Insn::Mov { dst: Operand::Reg(X86Reg::ACC), src: Operand::Imm(sys.write) }));
        out.push(x86(X86Insn::Syscall));
    }

    fn emit_read_syscall(&mut self, out: &mut Vec<Instruction>) {
        let sys = syscalls_for(self.target);
        out.push(x86(X86Insn::Mov { dst: Operand::Reg(X86Reg::Sigil(1)), src: Operand::Imm(0) }));
        out.push(x86(X86Insn::Lea { dst: X86Reg::Sigil(2), label: "__defacto_charbuf".into() }));
        out.push(x86(X86Insn::Mov { dst: Operand::Reg(X86Reg::Sigil(3)), src: Operand::Imm(1) }));
        out.push(x86(X86Insn::Mov { dst: Operand::Reg(X86Reg::ACC), src: Operand::Imm(sys.read) }));
        out.push(x86(X86Insn::Syscall));
        out.push(x86(X86Insn::Mov { dst: Operand::Reg(X86Reg::ACC), src: Operand::Label("__defacto_charbuf".into()) }));
    }

    /// `display` outside bare metal: ACC already holds the string's
    /// address (see [`Self::address_of_x86`]); scan for the terminating
    /// zero byte to find its length, then write it.
    fn emit_strlen_write_x86(&mut self, out: &mut Vec<Instruction>) {
        let scan = X86Reg::Sigil(2);
        out.push(x86(X86Insn::Mov { dst: Operand::Reg(scan), src: Operand::Reg(X86Reg::ACC) }));
        out.push(x86(X86Insn::Mov { dst: Operand::Reg(X86Reg::COUNTER), src: Operand::Imm(0) }));
        let start = self.fresh_label("strlen");
        let done = self.fresh_label("strlen_done");
        out.push(Instruction::Label(start.clone()));
        out.push(x86(X86Insn::MovByteLoadReg { dst: X86Reg::AUX, base: scan, offset: 0 }));
        out.push(x86(X86Insn::Cmp { left: Operand::Reg(X86Reg::AUX), right: Operand::Imm(0) }));
        out.push(x86(X86Insn::Jcc { cc: Cond::Eq, target: done.clone() }));
        out.push(x86(X86Insn::Add { dst: Operand::Reg(scan), src: Operand::Imm(1) }));
        out.push(x86(X86Insn::Add { dst: Operand::Reg(X86Reg::COUNTER), src: Operand::Imm(1) }));
        out.push(x86(X86Insn::Jmp(start)));
        out.push(Instruction::Label(done));
        self.emit_write_syscall_dyn(out, X86Reg::ACC, X86Reg::COUNTER);
    }

    fn emit_vga_puts_call(&mut self, out: &mut Vec<Instruction>) {
        if self.ensure_helper("__defacto_vga_puts") {
            self.build_vga_puts_x86();
        }
        out.push(x86(X86Insn::Call("__defacto_vga_puts".into())));
    }

    fn emit_itoa_call_x86(&mut self, out: &mut Vec<Instruction>) {
        if self.ensure_helper("__defacto_itoa") {
            self.build_itoa_x86();
        }
        out.push(x86(X86Insn::Call("__defacto_itoa".into())));
    }

    /// Signed-decimal conversion: ACC in, ACC = address of the first digit
    /// (a NUL-free, newline-terminated run inside a shared static buffer),
    /// COUNTER = its length, out. Writes back to front into the tail of
    /// `__defacto_numbuf` so the digit order comes out right without a
    /// second reversal pass.
    fn build_itoa_x86(&mut self) {
        self.data.push(asm::DataItem::Bytes { label: "__defacto_numbuf".into(), size: 24 });

        let neg = X86Reg::Sigil(5);
        let ptr = X86Reg::Sigil(2);
        let tmp = X86Reg::Sigil(1);
        let len = X86Reg::COUNTER;
        let div = X86Reg::SPILL;
        let rem = X86Reg::AUX;

        let sign_positive = self.fresh_label("itoa_pos");
        let digit_loop = self.fresh_label("itoa_loop");
        let done = self.fresh_label("itoa_done");

        let body = vec![
            Instruction::Label("__defacto_itoa".into()),
            x86(X86Insn::Mov { dst: Operand::Reg(neg), src: Operand::Imm(0) }),
            x86(X86Insn::Mov { dst: Operand::Reg(len), src: Operand::Imm(0) }),
            x86(X86Insn::Cmp { left: Operand::Reg(X86Reg::ACC), right: Operand::Imm(0) }),
            x86(X86Insn::Jcc { cc: Cond::Gte, target: sign_positive.clone() }),
            x86(X86Insn::Neg(Operand::Reg(X86Reg::ACC))),
            x86(X86Insn::Mov { dst: Operand::Reg(neg), src: Operand::Imm(1) }),
            Instruction::Label(sign_positive),
            x86(X86Insn::Lea { dst: ptr, label: "__defacto_numbuf".into() }),
            x86(X86Insn::Add { dst: Operand::Reg(ptr), src: Operand::Imm(23) }),
            x86(X86Insn::Mov { dst: Operand::Reg(tmp), src: Operand::Imm(10) }),
            x86(X86Insn::MovByteStoreReg { base: ptr, offset: 0, src: tmp }),
            x86(X86Insn::Sub { dst: Operand::Reg(ptr), src: Operand::Imm(1) }),
            x86(X86Insn::Add { dst: Operand::Reg(len), src: Operand::Imm(1) }),
            // do-while: runs once even for a zero value, since `idiv` of 0
            // by 10 yields a quotient of 0 and we only stop once the
            // quotient we just produced is 0.
            Instruction::Label(digit_loop.clone()),
            x86(X86Insn::Mov { dst: Operand::Reg(div), src: Operand::Imm(10) }),
            x86(X86Insn::SignExtend),
            x86(X86Insn::Idiv(Operand::Reg(div))),
            x86(X86Insn::Add { dst: Operand::Reg(rem), src: Operand::Imm(48) }),
            x86(X86Insn::MovByteStoreReg { base: ptr, offset: 0, src: rem }),
            x86(X86Insn::Sub { dst: Operand::Reg(ptr), src: Operand::Imm(1) }),
            x86(X86Insn::Add { dst: Operand::Reg(len), src: Operand::Imm(1) }),
            x86(X86Insn::Cmp { left: Operand::Reg(X86Reg::ACC), right: Operand::Imm(0) }),
            x86(X86Insn::Jcc { cc: Cond::Neq, target: digit_loop }),
            x86(X86Insn::Cmp { left: Operand::Reg(neg), right: Operand::Imm(0) }),
            x86(X86Insn::Jcc { cc: Cond::Eq, target: done.clone() }),
            x86(X86Insn::Mov { dst: Operand::Reg(tmp), src: Operand::Imm(45) }),
            x86(X86Insn::MovByteStoreReg { base: ptr, offset: 0, src: tmp }),
            x86(X86Insn::Sub { dst: Operand::Reg(ptr), src: Operand::Imm(1) }),
            x86(X86Insn::Add { dst: Operand::Reg(len), src: Operand::Imm(1) }),
            Instruction::Label(done),
            x86(X86Insn::Add { dst: Operand::Reg(ptr), src: Operand::Imm(1) }),
            x86(X86Insn::Mov { dst: Operand::Reg(X86Reg::ACC), src: Operand::Reg(ptr) }),
            x86(X86Insn::Ret),
        ];
        self.functions.push(("__defacto_itoa".into(), body, Span::new(0, 0)));
    }

    /// VGA text-mode string write: ACC holds the string's address on
    /// entry. Tracks the cursor cell in `__defacto_cursor` (a linear
    /// 80-column index) and wraps `\n` to the next line; every other byte
    /// is written with the current `__defacto_attr` at `0xB8000 + cell*2`.
    fn build_vga_puts_x86(&mut self) {
        let src = X86Reg::Sigil(2);
        let ch = X86Reg::Sigil(1);
        let cur = X86Reg::COUNTER;
        let addr = X86Reg::SPILL;
        let attr = X86Reg::AUX;
        let cursor: Text = "__defacto_cursor".into();

        let loop_top = self.fresh_label("vga_loop");
        let newline = self.fresh_label("vga_newline");
        let store_cursor = self.fresh_label("vga_store_cursor");
        let done = self.fresh_label("vga_done");

        let body = vec![
            Instruction::Label("__defacto_vga_puts".into()),
            x86(X86Insn::Mov { dst: Operand::Reg(src), src: Operand::Reg(X86Reg::ACC) }),
            Instruction::Label(loop_top.clone()),
            x86(X86Insn::MovByteLoadReg { dst: ch, base: src, offset: 0 }),
            x86(X86Insn::Cmp { left: Operand::Reg(ch), right: Operand::Imm(0) }),
            x86(X86Insn::Jcc { cc: Cond::Eq, target: done.clone() }),
            x86(X86Insn::Mov { dst: Operand::Reg(cur), src: Operand::Label(cursor.clone()) }),
            x86(X86Insn::Cmp { left: Operand::Reg(ch), right: Operand::Imm(10) }),
            x86(X86Insn::Jcc { cc: Cond::Eq, target: newline.clone() }),
            x86(X86Insn::MovByteLoadLabel { dst: attr, label: "__defacto_attr".into() }),
            x86(X86Insn::Mov { dst: Operand::Reg(addr), src: Operand::Imm(0xB8000) }),
            x86(X86Insn::Mov { dst: Operand::Reg(X86Reg::ACC), src: Operand::Reg(cur) }),
            x86(X86Insn::Imul { dst: X86Reg::ACC, src: Operand::Imm(2) }),
            x86(X86Insn::Add { dst: Operand::Reg(addr), src: Operand::Reg(X86Reg::ACC) }),
            x86(X86Insn::MovByteStoreReg { base: addr, offset: 0, src: ch }),
            x86(X86Insn::MovByteStoreReg { base: addr, offset: 1, src: attr }),
            x86(X86Insn::Add { dst: Operand::Reg(cur), src: Operand::Imm(1) }),
            x86(X86Insn::Jmp(store_cursor.clone())),
            Instruction::Label(newline),
            x86(X86Insn::Mov { dst: Operand::Reg(X86Reg::ACC), src: Operand::Reg(cur) }),
            x86(X86Insn::Mov { dst: Operand::Reg(addr), src: Operand::Imm(80) }),
            x86(X86Insn::SignExtend),
            x86(X86Insn::Idiv(Operand::Reg(addr))),
            x86(X86Insn::Add { dst: Operand::Reg(X86Reg::ACC), src: Operand::Imm(1) }),
            x86(X86Insn::Imul { dst: X86Reg::ACC, src: Operand::Imm(80) }),
            x86(X86Insn::Mov { dst: Operand::Reg(cur), src: Operand::Reg(X86Reg::ACC) }),
            Instruction::Label(store_cursor),
            x86(X86Insn::Mov { dst: Operand::Label(cursor), src: Operand::Reg(cur) }),
            x86(X86Insn::Add { dst: Operand::Reg(src), src: Operand::Imm(1) }),
            x86(X86Insn::Jmp(loop_top)),
            Instruction::Label(done),
            x86(X86Insn::Ret),
        ];
        self.functions.push(("__defacto_vga_puts".into(), body, Span::new(0, 0)));
    }

    /// Blanks all 2000 cells of the 80x25 text-mode page with the current
    /// attribute and resets the cursor to the top-left.
    fn build_vga_clear_x86(&mut self) {
        let idx = X86Reg::COUNTER;
        let addr = X86Reg::SPILL;
        let attr = X86Reg::AUX;
        let space = X86Reg::Sigil(1);
        let cursor: Text = "__defacto_cursor".into();

        let loop_top = self.fresh_label("vga_clear_loop");
        let done = self.fresh_label("vga_clear_done");

        let body = vec![
            Instruction::Label("__defacto_vga_clear".into()),
            x86(X86Insn::MovByteLoadLabel { dst: attr, label: "__defacto_attr".into() }),
            x86(X86Insn::Mov { dst: Operand::Reg(idx), src: Operand::Imm(0) }),
            x86(X86Insn::Mov { dst: Operand::Reg(space), src: Operand::Imm(0x20) }),
            Instruction::Label(loop_top.clone()),
            x86(X86Insn::Cmp { left: Operand::Reg(idx), right: Operand::Imm(2000) }),
            x86(X86Insn::Jcc { cc: Cond::Eq, target: done.clone() }),
            x86(X86Insn::Mov { dst: Operand::Reg(addr), src: Operand::Imm(0xB8000) }),
            x86(X86Insn::Mov { dst: Operand::Reg(X86Reg::ACC), src: Operand::Reg(idx) }),
            x86(X86Insn::Imul { dst: X86Reg::ACC, src: Operand::Imm(2) }),
            x86(X86Insn::Add { dst: Operand::Reg(addr), src: Operand::Reg(X86Reg::ACC) }),
            x86(X86Insn::MovByteStoreReg { base: addr, offset: 0, src: space }),
            x86(X86Insn::MovByteStoreReg { base: addr, offset: 1, src: attr }),
            x86(X86Insn::Add { dst: Operand::Reg(idx), src: Operand::Imm(1) }),
            x86(X86Insn::Jmp(loop_top)),
            Instruction::Label(done),
            x86(X86Insn::Mov { dst: Operand::Label(cursor), src: Operand::Imm(0) }),
            x86(X86Insn::Ret),
        ];
        self.functions.push(("__defacto_vga_clear".into(), body, Span::new(0, 0)));
    }

    /// Polls the 8042 status port (bit 0 = output buffer full) then reads
    /// the raw scancode from the data port.
    fn build_ps2_readkey_x86(&mut self) {
        let poll = self.fresh_label("ps2_poll");
        let body = vec![
            Instruction::Label("__defacto_ps2_readkey".into()),
            Instruction::Label(poll.clone()),
            x86(X86Insn::InByte { port: 0x64 }),
            x86(X86Insn::And { dst: Operand::Reg(X86Reg::ACC), src: Operand::Imm(1) }),
            x86(X86Insn::Cmp { left: Operand::Reg(X86Reg::ACC), right: Operand::Imm(0) }),
            x86(X86Insn::Jcc { cc: Cond::Eq, target: poll }),
            x86(X86Insn::InByte { port: 0x60 }),
            x86(X86Insn::And { dst: Operand::Reg(X86Reg::ACC), src: Operand::Imm(0xFF) }),
            x86(X86Insn::Ret),
        ];
        self.functions.push(("__defacto_ps2_readkey".into(), body, Span::new(0, 0)));
    }

    /// Same polling sequence as [`Self::build_ps2_readkey_x86`], then maps
    /// the scancode through a fixed US set-1 table; unmapped/modifier keys
    /// translate to `0`.
    fn build_ps2_readchar_x86(&mut self) {
        const SCANCODE_TABLE: [u8; 58] = [
            0, 27, b'1', b'2', b'3', b'4', b'5', b'6', b'7', b'8', b'9', b'0', b'-', b'=', 8, 9, b'q', b'w', b'e',
            b'r', b't', b'y', b'u', b'i', b'o', b'p', b'[', b']', 13, 0, b'a', b's', b'd', b'f', b'g', b'h', b'j',
            b'k', b'l', b';', b'\'', b'`', 0, b'\\', b'z', b'x', b'c', b'v', b'b', b'n', b'm', b',', b'.', b'/', 0,
            b'*', 0, b' ',
        ];
        self.data.push(asm::DataItem::Str { label: "__defacto_scancode_table".into(), bytes: SCANCODE_TABLE.to_vec() });

        let poll = self.fresh_label("ps2_poll");
        let body = vec![
            Instruction::Label("__defacto_ps2_readchar".into()),
            Instruction::Label(poll.clone()),
            x86(X86Insn::InByte { port: 0x64 }),
            x86(X86Insn::And { dst: Operand::Reg(X86Reg::ACC), src: Operand::Imm(1) }),
            x86(X86Insn::Cmp { left: Operand::Reg(X86Reg::ACC), right: Operand::Imm(0) }),
            x86(X86Insn::Jcc { cc: Cond::Eq, target: poll }),
            x86(X86Insn::InByte { port: 0x60 }),
            x86(X86Insn::And { dst: Operand::Reg(X86Reg::ACC), src: Operand::Imm(0xFF) }),
            x86(X86Insn::Lea { dst: X86Reg::SPILL, label: "__defacto_scancode_table".into() }),
            x86(X86Insn::Add { dst: Operand::Reg(X86Reg::SPILL), src: Operand::Reg(X86Reg::ACC) }),
            x86(X86Insn::MovByteLoadReg { dst: X86Reg::ACC, base: X86Reg::SPILL, offset: 0 }),
            x86(X86Insn::Ret),
        ];
        self.functions.push(("__defacto_ps2_readchar".into(), body, Span::new(0, 0)));
    }

    /// Driver sections jump into one of these after running their own
    /// body (see `Generator::run`'s bare-metal branch) — the PS/2
    /// controller-command byte to enable the relevant port, or the PPI
    /// port-0x61 gate bits for the PC speaker.
    pub(super) fn x86_ensure_driver_inits(&mut self) {
        if !self.ensure_helper("__defacto_drv_inits") {
            return;
        }
        self.functions.push((
            "_init_keyboard".into(),
            vec![
                Instruction::Label("_init_keyboard".into()),
                x86(X86Insn::Mov { dst: Operand::Reg(X86Reg::ACC), src: Operand::Imm(0xAE) }),
                x86(X86Insn::OutByte { port: 0x64 }),
                x86(X86Insn::Ret),
            ],
            Span::new(0, 0),
        ));
        self.functions.push((
            "_init_mouse".into(),
            vec![
                Instruction::Label("_init_mouse".into()),
                x86(X86Insn::Mov { dst: Operand::Reg(X86Reg::ACC), src: Operand::Imm(0xA8) }),
                x86(X86Insn::OutByte { port: 0x64 }),
                x86(X86Insn::Ret),
            ],
            Span::new(0, 0),
        ));
        self.functions.push((
            "_init_speaker".into(),
            vec![
                Instruction::Label("_init_speaker".into()),
                x86(X86Insn::InByte { port: 0x61 }),
                x86(X86Insn::Or { dst: Operand::Reg(X86Reg::ACC), src: Operand::Imm(3) }),
                x86(X86Insn::OutByte { port: 0x61 }),
                x86(X86Insn::Ret),
            ],
            Span::new(0, 0),
        ));
    }
}

/// A right-hand operand simple enough to fold directly into an
/// instruction without spilling: a literal, a plain identifier, or a bare
/// register, folded directly into the operand rather than evaluated
/// through the accumulator.
fn simple_operand(expr: &Expr) -> Option<Operand> {
    match expr {
        Expr::Number(n) | Expr::Hex(n) => Some(Operand::Imm(*n)),
        Expr::Bool(b) => Some(Operand::Imm(*b as i64)),
        Expr::Ident(name) => Some(Operand::Label(format!("var_{name}").into())),
        Expr::Register(reg) => Sigil::parse(reg).map(|s| Operand::Reg(X86Reg::Sigil(s.0))),
        _ => None,
    }
}
