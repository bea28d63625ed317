//! The code generator: lowers a [`defacto_syntax::ast::Program`] to the
//! [`asm`] IR for one of the five targets in [`crate::target::Target`].
//!
//! A single direct AST walk: there is no intermediate three-address-code
//! stage, [`generate_assembly`] consumes the parse tree itself. [`x86`] and
//! [`arm64`] hold the two backends' instruction selection; this module owns
//! the parts both backends share — the symbol table walk, struct layout,
//! label allocation, the auto-free sweep, and the statement/control-flow
//! structure.

pub mod asm;
mod arm64;
pub(crate) mod registers;
mod symtab;
mod x86;

use defacto_syntax::{
    Span,
    ast::{AssignTarget, BinOp, DriverKind, Expr, Program as AstProgram, Section, Stmt, Type, VarDecl},
};

use crate::{
    Db, Text,
    diagnostics::{CodegenWarning, DisciplineError, ResolveError},
    target::{Arch, Target},
    types::{Ast, SourceFile},
};
use symtab::{Storage, SymbolTable};

pub use asm::Program;

/// Walk the program tree once and emit assembly IR for `target`.
///
/// There is no separate resolution or lowering pass: the generator owns
/// the symbol table for the whole translation unit and resolves, type
/// checks, and emits in the same traversal.
#[tracing::instrument(level = "info", skip(db, ast))]
#[salsa::tracked]
pub fn generate_assembly<'db>(
    db: &'db dyn Db,
    ast: Ast<'db>,
    file: SourceFile,
    target: Target,
) -> asm::Program<'db> {
    let program = ast.tree(db).0.clone();
    let mut gen = Generator::new(target, file);
    gen.run(db, &program);
    gen.into_program(db, target)
}

/// The labels a loop pushes onto [`Generator::loop_stack`] so `break`/
/// `continue` can find their targets without threading them through every
/// recursive call.
struct LoopLabels {
    start: Text,
    end: Text,
}

pub(crate) struct Generator {
    target: Target,
    file: SourceFile,
    symtab: SymbolTable,
    label_id: u32,
    loop_stack: Vec<LoopLabels>,
    data: Vec<asm::DataItem>,
    drivers: Vec<asm::DriverStub>,
    externs: Vec<Text>,
    interrupts: Vec<(u32, Text)>,
    main: Vec<asm::Instruction>,
    functions: Vec<(Text, Vec<asm::Instruction>, Span)>,
    /// Names of generator-synthesized helpers (VGA/PS2 routines, `itoa`,
    /// driver initialisers) already appended to `functions`/`data`, so a
    /// program that uses `display` and `printnum` twice doesn't get the
    /// helper emitted twice.
    helpers: std::collections::HashSet<&'static str>,
}

impl Generator {
    fn new(target: Target, file: SourceFile) -> Self {
        Generator {
            target,
            file,
            symtab: SymbolTable::new(),
            label_id: 0,
            loop_stack: Vec::new(),
            data: Vec::new(),
            drivers: Vec::new(),
            externs: Vec::new(),
            interrupts: Vec::new(),
            main: Vec::new(),
            functions: Vec::new(),
            helpers: std::collections::HashSet::new(),
        }
    }

    fn fresh_label(&mut self, prefix: &str) -> Text {
        self.label_id += 1;
        format!(".L{prefix}{}", self.label_id).into()
    }

    /// Records that helper `name` is about to be emitted. Returns `true`
    /// the first time (the caller should build and push its body), `false`
    /// on every later call (it's already in `functions`/`data`).
    fn ensure_helper(&mut self, name: &'static str) -> bool {
        self.helpers.insert(name)
    }

    fn bits(&self) -> u8 {
        self.target.bits()
    }

    fn arch(&self) -> Arch {
        self.target.arch()
    }

    fn run(&mut self, db: &dyn Db, program: &AstProgram) {
        for s in &program.structs {
            self.symtab.register_struct(s, self.bits());
        }
        for e in &program.externs {
            self.externs.push(e.name.as_str().into());
        }
        for i in &program.interrupts {
            self.interrupts.push((i.number, i.function.as_str().into()));
        }

        if let Some(main) = &program.main {
            let mut out = Vec::new();
            self.lower_section(db, main, &mut out);
            self.main = out;
        }

        for f in &program.functions {
            let mut out = Vec::new();
            out.push(asm::Instruction::Label(format!("fn_{}", f.name).into()));
            self.lower_section(db, &f.body, &mut out);
            out.push(self.ret());
            self.functions.push((format!("fn_{}", f.name).into(), out, Span::new(0, 0)));
        }

        if self.target.is_bare_metal() && !program.driver_sections.is_empty() {
            self.x86_ensure_driver_inits();
        }

        for d in &program.driver_sections {
            let label: Text = format!("__defacto_drv_{}", d.kind.stub_suffix()).into();
            for decl in &d.decls {
                self.symtab.declare_driver_constant(&decl.name);
                let mut ignored = Vec::new();
                self.declare_var(db, decl, Storage::Data, &mut ignored);
            }
            let mut out = Vec::new();
            for stmt in &d.stmts {
                self.lower_stmt(db, stmt, &mut out);
            }
            if self.target.is_bare_metal() {
                let init = match d.kind {
                    DriverKind::Keyboard => "_init_keyboard",
                    DriverKind::Mouse => "_init_mouse",
                    DriverKind::Volume => "_init_speaker",
                };
                out.push(self.jmp(&Text::from(init)));
            } else {
                out.push(self.ret());
            }
            self.drivers.push(asm::DriverStub {
                label,
                instructions: out,
            });
        }
    }

    fn into_program<'db>(self, db: &'db dyn Db, target: Target) -> asm::Program<'db> {
        let functions = self
            .functions
            .into_iter()
            .map(|(name, instructions, span)| asm::FunctionDefinition::new(db, name, instructions, span))
            .collect();
        asm::Program::new(
            db,
            self.main,
            functions,
            self.drivers,
            self.data,
            self.externs,
            self.interrupts,
            target,
        )
    }

    /// Declarations then statements: a section is "an
    /// ordered list of variable declarations interleaved with an ordered
    /// list of statements" but the AST keeps them as two separate ordered
    /// lists — every decl in a section is processed before any of its
    /// statements.
    fn lower_section(&mut self, db: &dyn Db, section: &Section, out: &mut Vec<asm::Instruction>) {
        for decl in &section.decls {
            self.declare_var(db, decl, Storage::Data, out);
        }
        for stmt in &section.stmts {
            self.lower_stmt(db, stmt, out);
        }
        let names: Vec<String> = section.decls.iter().map(|d| d.name.clone()).collect();
        self.auto_free_sweep(db, &names, out);
    }

    fn declare_var(&mut self, db: &dyn Db, decl: &VarDecl, storage: Storage, out: &mut Vec<asm::Instruction>) {
        if decl.is_const && decl.init.is_none() {
            DisciplineError {
                file: self.file,
                msg: format!("const '{}' must have an initializer", decl.name).into(),
            }
            .accumulate(db);
        }
        if decl.is_const && decl.array_len.is_some() {
            DisciplineError {
                file: self.file,
                msg: format!("const '{}' cannot be an array", decl.name).into(),
            }
            .accumulate(db);
        }

        self.symtab.declare(&decl.name, decl.ty.clone(), decl.is_const, storage);
        let label: Text = format!("var_{}", decl.name).into();
        let elem_size = decl.ty.size_on(self.bits());

        match (&decl.array_len, &decl.init) {
            (Some(len), Some(Expr::ArrayLiteral(items))) => {
                self.data.push(asm::DataItem::Bytes {
                    label: label.clone(),
                    size: elem_size * len,
                });
                for (i, item) in items.iter().enumerate() {
                    self.store_array_elem_literal(&label, i as i64, elem_size, item, out);
                }
            }
            (Some(len), None) => {
                self.data.push(asm::DataItem::Bytes { label, size: elem_size * len });
            }
            (None, Some(Expr::Str(s))) => {
                self.data.push(asm::DataItem::Str {
                    label,
                    bytes: s.as_bytes().to_vec(),
                });
            }
            (None, Some(Expr::Number(n))) | (None, Some(Expr::Hex(n))) => {
                self.data.push(asm::DataItem::Scalar {
                    label,
                    size: elem_size,
                    init: Some(*n),
                });
            }
            (None, Some(Expr::AddressOf(inner))) if matches!(inner.as_ref(), Expr::Ident(_)) => {
                let Expr::Ident(target_name) = inner.as_ref() else { unreachable!() };
                self.data.push(asm::DataItem::PointerTo {
                    label,
                    target: format!("var_{target_name}").into(),
                });
            }
            (None, Some(init)) => {
                self.data.push(asm::DataItem::Scalar {
                    label: label.clone(),
                    size: elem_size,
                    init: None,
                });
                let init = init.clone();
                self.emit_assign(db, &AssignTarget::Ident(decl.name.clone()), &init, out);
            }
            (None, None) => {
                self.data.push(asm::DataItem::Scalar { label, size: elem_size, init: None });
            }
        }

        if matches!(decl.ty, Type::Pointer | Type::PointerTo(_)) {
            if let Some(sym) = self.symtab.lookup_mut(&decl.name) {
                sym.storage = Storage::Heap;
            }
        }
    }

    fn store_array_elem_literal(
        &mut self,
        label: &Text,
        index: i64,
        elem_size: u32,
        item: &Expr,
        out: &mut Vec<asm::Instruction>,
    ) {
        let offset = (index * elem_size as i64) as i32;
        match self.arch() {
            Arch::X86 => self.x86_store_literal_at_offset(label, offset, item, out),
            Arch::Arm64 => self.arm64_store_literal_at_offset(label, offset, item, out),
        }
    }

    fn auto_free_sweep(&mut self, db: &dyn Db, names: &[String], out: &mut Vec<asm::Instruction>) {
        for name in self.symtab.declared_this_scope(names) {
            if self.symtab.freed.contains(&name) {
                continue;
            }
            let Some(sym) = self.symtab.lookup(&name) else {
                continue;
            };
            let (read_from, heap) = (sym.read_from, sym.storage == Storage::Heap);
            if !read_from {
                CodegenWarning {
                    file: self.file,
                    name: name.as_str().into(),
                }
                .accumulate(db);
            }
            if heap {
                out.push(asm::Instruction::Comment(format!("auto-free: {name}").into()));
                self.emit_free(db, &name, out);
            }
            self.symtab.mark_freed(&name);
        }
    }

    fn lower_stmt(&mut self, db: &dyn Db, stmt: &Stmt, out: &mut Vec<asm::Instruction>) {
        match stmt {
            Stmt::Assign { target, value } => self.emit_assign(db, target, value, out),
            Stmt::Loop { body } => self.lower_loop(db, body, out),
            Stmt::While { cond, body } => self.lower_while(db, cond, body, out),
            Stmt::For { var, from, to, body } => self.lower_for(db, var, from, to, body, out),
            Stmt::If { cond, then_body, else_body } => self.lower_if(db, cond, then_body, else_body, out),
            Stmt::Switch { value, cases, default } => self.lower_switch(db, value, cases, default, out),
            Stmt::Break => self.lower_break(db, out),
            Stmt::Continue => self.lower_continue(db, out),
            Stmt::Return(value) => {
                if let Some(v) = value {
                    self.lower_expr_into_result(db, v, out);
                }
                out.push(self.ret());
            }
            Stmt::Call(name) => {
                let insn = self.call(name);
                out.push(insn);
            }
            Stmt::DriverCall { target, builtin, use_builtin } => {
                let callee = if *use_builtin { builtin } else { target };
                let insn = self.call(callee);
                out.push(insn);
            }
            Stmt::RegMove { target, source } => self.lower_reg_move(target, source, out),
            Stmt::RegStatic { target: _ } => {}
            Stmt::Display(e) => self.lower_display(db, e, out),
            Stmt::PrintNum(e) => self.lower_printnum(db, e, out),
            Stmt::PutChar(e) => self.lower_putchar(db, e, out),
            Stmt::Color(e) => self.lower_color(db, e, out),
            Stmt::Clear => self.lower_clear(out),
            Stmt::Reboot => self.lower_reboot(out),
            Stmt::ReadKey(target) => self.lower_readkey(target, out),
            Stmt::ReadChar(target) => self.lower_readchar(target, out),
            Stmt::Free(name) => {
                if self.symtab.is_const(name) {
                    DisciplineError {
                        file: self.file,
                        msg: format!("cannot free const '{name}'").into(),
                    }
                    .accumulate(db);
                    return;
                }
                if self.symtab.freed.contains(name) {
                    return; // freeing an already-freed identifier is idempotent
                }
                self.emit_free(db, name, out);
                self.symtab.mark_freed(name);
            }
            Stmt::Alloc(size) => self.lower_alloc(db, size, out),
        }
    }

    fn emit_assign(&mut self, db: &dyn Db, target: &AssignTarget, value: &Expr, out: &mut Vec<asm::Instruction>) {
        let const_name = match target {
            AssignTarget::Ident(n) | AssignTarget::ArrayElement { name: n, .. } | AssignTarget::StructField { name: n, .. } => Some(n.clone()),
            _ => None,
        };
        if let Some(n) = &const_name {
            if self.symtab.is_const(n) {
                DisciplineError {
                    file: self.file,
                    msg: format!("cannot assign to const '{n}'").into(),
                }
                .accumulate(db);
                return;
            }
        }
        self.lower_expr_into_result(db, value, out);
        match self.arch() {
            Arch::X86 => self.x86_store_result(db, target, out),
            Arch::Arm64 => self.arm64_store_result(db, target, out),
        }
    }

    fn lower_expr_into_result(&mut self, db: &dyn Db, expr: &Expr, out: &mut Vec<asm::Instruction>) {
        match self.arch() {
            Arch::X86 => self.lower_expr_x86(db, expr, out),
            Arch::Arm64 => self.lower_expr_arm64(db, expr, out),
        }
    }

    fn lower_loop(&mut self, db: &dyn Db, body: &[Stmt], out: &mut Vec<asm::Instruction>) {
        let start = self.fresh_label("loop_start");
        let end = self.fresh_label("loop_end");
        out.push(asm::Instruction::Label(start.clone()));
        self.loop_stack.push(LoopLabels { start: start.clone(), end: end.clone() });
        for s in body {
            self.lower_stmt(db, s, out);
        }
        self.loop_stack.pop();
        let j = self.jmp(&start);
        out.push(j);
        out.push(asm::Instruction::Label(end));
    }

    fn lower_while(&mut self, db: &dyn Db, cond: &Expr, body: &[Stmt], out: &mut Vec<asm::Instruction>) {
        let start = self.fresh_label("while_start");
        let end = self.fresh_label("while_end");
        out.push(asm::Instruction::Label(start.clone()));
        self.lower_condition_jump_if_false(db, cond, &end, out);
        self.loop_stack.push(LoopLabels { start: start.clone(), end: end.clone() });
        for s in body {
            self.lower_stmt(db, s, out);
        }
        self.loop_stack.pop();
        let j = self.jmp(&start);
        out.push(j);
        out.push(asm::Instruction::Label(end));
    }

    fn lower_for(&mut self, db: &dyn Db, var: &str, from: &Expr, to: &Expr, body: &[Stmt], out: &mut Vec<asm::Instruction>) {
        self.emit_assign(db, &AssignTarget::Ident(var.to_string()), from, out);
        let start = self.fresh_label("for_start");
        let end = self.fresh_label("for_end");
        out.push(asm::Instruction::Label(start.clone()));
        let cond = Expr::Binary {
            op: BinOp::Lt,
            lhs: Box::new(Expr::Ident(var.to_string())),
            rhs: Box::new(to.clone()),
        };
        self.lower_condition_jump_if_false(db, &cond, &end, out);
        self.loop_stack.push(LoopLabels { start: start.clone(), end: end.clone() });
        for s in body {
            self.lower_stmt(db, s, out);
        }
        self.loop_stack.pop();
        let step = Expr::Binary {
            op: BinOp::Add,
            lhs: Box::new(Expr::Ident(var.to_string())),
            rhs: Box::new(Expr::Number(1)),
        };
        self.emit_assign(db, &AssignTarget::Ident(var.to_string()), &step, out);
        let j = self.jmp(&start);
        out.push(j);
        out.push(asm::Instruction::Label(end));
    }

    fn lower_if(&mut self, db: &dyn Db, cond: &Expr, then_body: &[Stmt], else_body: &[Stmt], out: &mut Vec<asm::Instruction>) {
        let else_label = self.fresh_label("if_else");
        let end_label = self.fresh_label("if_end");
        self.lower_condition_jump_if_false(db, cond, &else_label, out);
        for s in then_body {
            self.lower_stmt(db, s, out);
        }
        if !else_body.is_empty() {
            let j = self.jmp(&end_label);
            out.push(j);
        }
        out.push(asm::Instruction::Label(else_label));
        for s in else_body {
            self.lower_stmt(db, s, out);
        }
        out.push(asm::Instruction::Label(end_label));
    }

    fn lower_switch(
        &mut self,
        db: &dyn Db,
        value: &Expr,
        cases: &[(Expr, Vec<Stmt>)],
        default: &Option<Vec<Stmt>>,
        out: &mut Vec<asm::Instruction>,
    ) {
        let end_label = self.fresh_label("switch_end");
        let mut case_labels = Vec::with_capacity(cases.len());
        for _ in cases {
            case_labels.push(self.fresh_label("case"));
        }
        let default_label = if default.is_some() { self.fresh_label("default") } else { end_label.clone() };

        for ((case_value, _), label) in cases.iter().zip(&case_labels) {
            let cond = Expr::Binary {
                op: BinOp::Eq,
                lhs: Box::new(value.clone()),
                rhs: Box::new(case_value.clone()),
            };
            let skip = self.fresh_label("case_skip");
            self.lower_condition_jump_if_false(db, &cond, &skip, out);
            let j = self.jmp(label);
            out.push(j);
            out.push(asm::Instruction::Label(skip));
        }
        let j = self.jmp(&default_label);
        out.push(j);

        for ((_, body), label) in cases.iter().zip(&case_labels) {
            out.push(asm::Instruction::Label(label.clone()));
            for s in body {
                self.lower_stmt(db, s, out);
            }
            let j = self.jmp(&end_label);
            out.push(j);
        }
        if let Some(body) = default {
            out.push(asm::Instruction::Label(default_label));
            for s in body {
                self.lower_stmt(db, s, out);
            }
        }
        out.push(asm::Instruction::Label(end_label));
    }

    fn lower_break(&mut self, db: &dyn Db, out: &mut Vec<asm::Instruction>) {
        match self.loop_stack.last() {
            Some(labels) => {
                let end = labels.end.clone();
                let j = self.jmp(&end);
                out.push(j);
            }
            None => {
                DisciplineError {
                    file: self.file,
                    msg: "'break' outside any loop".into(),
                }
                .accumulate(db);
            }
        }
    }

    fn lower_continue(&mut self, db: &dyn Db, out: &mut Vec<asm::Instruction>) {
        match self.loop_stack.last() {
            Some(labels) => {
                let start = labels.start.clone();
                let j = self.jmp(&start);
                out.push(j);
            }
            None => {
                DisciplineError {
                    file: self.file,
                    msg: "'continue' outside any loop".into(),
                }
                .accumulate(db);
            }
        }
    }

    fn lower_condition_jump_if_false(&mut self, db: &dyn Db, cond: &Expr, target_label: &Text, out: &mut Vec<asm::Instruction>) {
        match self.arch() {
            Arch::X86 => self.x86_condition_jump_if_false(db, cond, target_label, out),
            Arch::Arm64 => self.arm64_condition_jump_if_false(db, cond, target_label, out),
        }
    }

    fn jmp(&self, label: &Text) -> asm::Instruction {
        match self.arch() {
            Arch::X86 => asm::Instruction::X86(asm::X86Insn::Jmp(label.clone())),
            Arch::Arm64 => asm::Instruction::Arm64(asm::Arm64Insn::B(label.clone())),
        }
    }

    fn call(&self, name: &str) -> asm::Instruction {
        match self.arch() {
            Arch::X86 => asm::Instruction::X86(asm::X86Insn::Call(format!("fn_{name}").into())),
            Arch::Arm64 => asm::Instruction::Arm64(asm::Arm64Insn::Bl(format!("fn_{name}").into())),
        }
    }

    fn ret(&self) -> asm::Instruction {
        match self.arch() {
            Arch::X86 => asm::Instruction::X86(asm::X86Insn::Ret),
            Arch::Arm64 => asm::Instruction::Arm64(asm::Arm64Insn::Ret),
        }
    }

    fn lower_reg_move(&mut self, target: &str, source: &str, out: &mut Vec<asm::Instruction>) {
        match self.arch() {
            Arch::X86 => self.x86_reg_move(target, source, out),
            Arch::Arm64 => self.arm64_reg_move(target, source, out),
        }
    }

    fn lower_display(&mut self, db: &dyn Db, e: &Expr, out: &mut Vec<asm::Instruction>) {
        match self.arch() {
            Arch::X86 => self.x86_display(db, e, out),
            Arch::Arm64 => self.arm64_display(db, e, out),
        }
    }

    fn lower_printnum(&mut self, db: &dyn Db, e: &Expr, out: &mut Vec<asm::Instruction>) {
        match self.arch() {
            Arch::X86 => self.x86_printnum(db, e, out),
            Arch::Arm64 => self.arm64_printnum(db, e, out),
        }
    }

    fn lower_putchar(&mut self, db: &dyn Db, e: &Expr, out: &mut Vec<asm::Instruction>) {
        match self.arch() {
            Arch::X86 => self.x86_putchar(db, e, out),
            Arch::Arm64 => self.arm64_putchar(db, e, out),
        }
    }

    fn lower_color(&mut self, db: &dyn Db, e: &Expr, out: &mut Vec<asm::Instruction>) {
        match self.arch() {
            Arch::X86 => self.x86_color(db, e, out),
            Arch::Arm64 => self.arm64_color(db, e, out),
        }
    }

    fn lower_clear(&mut self, out: &mut Vec<asm::Instruction>) {
        match self.arch() {
            Arch::X86 => self.x86_clear(out),
            Arch::Arm64 => self.arm64_clear(out),
        }
    }

    fn lower_reboot(&mut self, out: &mut Vec<asm::Instruction>) {
        match self.arch() {
            Arch::X86 => self.x86_reboot(out),
            Arch::Arm64 => self.arm64_reboot(out),
        }
    }

    fn lower_readkey(&mut self, target: &str, out: &mut Vec<asm::Instruction>) {
        match self.arch() {
            Arch::X86 => self.x86_readkey(target, out),
            Arch::Arm64 => self.arm64_readkey(target, out),
        }
    }

    fn lower_readchar(&mut self, target: &str, out: &mut Vec<asm::Instruction>) {
        match self.arch() {
            Arch::X86 => self.x86_readchar(target, out),
            Arch::Arm64 => self.arm64_readchar(target, out),
        }
    }

    fn lower_alloc(&mut self, db: &dyn Db, size: &Expr, out: &mut Vec<asm::Instruction>) {
        match self.arch() {
            Arch::X86 => self.x86_alloc(db, size, out),
            Arch::Arm64 => self.arm64_alloc(db, size, out),
        }
    }

    fn emit_free(&mut self, db: &dyn Db, name: &str, out: &mut Vec<asm::Instruction>) {
        match self.arch() {
            Arch::X86 => self.x86_free(db, name, out),
            Arch::Arm64 => self.arm64_free(db, name, out),
        }
    }

    /// Resolve an identifier to its data label, recording a [`ResolveError`]
    /// if it was never declared — every reference to a symbol at code-gen
    /// time must resolve in the table.
    fn resolve(&mut self, db: &dyn Db, name: &str) -> Option<Text> {
        if self.symtab.lookup(name).is_none() {
            ResolveError {
                file: self.file,
                msg: format!("undefined symbol '{name}'").into(),
            }
            .accumulate(db);
            return None;
        }
        self.symtab.mark_read(name);
        Some(format!("var_{name}").into())
    }

    fn struct_field_offset(&mut self, db: &dyn Db, base: &str, field: &str) -> Option<(u32, u32)> {
        let sym = self.symtab.lookup(base)?.clone();
        let struct_name = match &sym.ty {
            Type::Named(n) => n.clone(),
            _ => {
                ResolveError {
                    file: self.file,
                    msg: format!("'{base}' is not a struct").into(),
                }
                .accumulate(db);
                return None;
            }
        };
        let Some(layout) = self.symtab.struct_layout(&struct_name) else {
            ResolveError {
                file: self.file,
                msg: format!("unknown struct '{struct_name}'").into(),
            }
            .accumulate(db);
            return None;
        };
        let Some((offset, ty)) = layout.offset_of(&field) else {
            ResolveError {
                file: self.file,
                msg: format!("struct '{struct_name}' has no field '{field}'").into(),
            }
            .accumulate(db);
            return None;
        };
        let size = ty.size_on(self.bits());
        Some((offset, size))
    }
}

#[cfg(test)]
mod tests {
    use crate::{Database, SerializeWithDatabase, Target, types::SourceFile};

    #[test]
    fn hello_world_terminal64_resolves_the_display_label() {
        let src = concat!(
            "#Mainprogramm.start\n",
            "<.de\n",
            "var msg: string = \"Hi\"\n",
            "display{msg}\n",
            ".>\n",
            "#Mainprogramm.end\n",
        );
        let db = Database::default();
        let file = SourceFile::new(&db, "main.de".into(), src.into());
        let ast = crate::parse(&db, file);
        let program = crate::generate_assembly(&db, ast, file, Target::Linux64);

        insta::assert_json_snapshot!(program.serialize_with_db(&db));
    }

    #[test]
    fn const_reassignment_is_a_discipline_error() {
        let src = concat!(
            "#Mainprogramm.start\n",
            "<.de\n",
            "const k: i32 = 5\n",
            "k = 6\n",
            ".>\n",
            "#Mainprogramm.end\n",
        );
        let db = Database::default();
        let file = SourceFile::new(&db, "main.de".into(), src.into());
        let ast = crate::parse(&db, file);
        let _ = crate::generate_assembly(&db, ast, file, Target::Linux64);

        let diags = crate::generate_assembly::accumulated::<crate::diagnostics::Diagnostics>(&db, ast, file, Target::Linux64);
        assert!(diags.iter().any(|d| d.to_codespan().message.contains("cannot assign to const")));
    }

    #[test]
    fn break_outside_a_loop_is_rejected() {
        let src = concat!(
            "#Mainprogramm.start\n",
            "<.de\n",
            "stop\n",
            ".>\n",
            "#Mainprogramm.end\n",
        );
        let db = Database::default();
        let file = SourceFile::new(&db, "main.de".into(), src.into());
        let ast = crate::parse(&db, file);
        let _ = crate::generate_assembly(&db, ast, file, Target::BareMetal);

        let diags = crate::generate_assembly::accumulated::<crate::diagnostics::Diagnostics>(&db, ast, file, Target::BareMetal);
        assert!(diags.iter().any(|d| d.to_codespan().message.contains("break")));
    }
}
