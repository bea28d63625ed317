use std::collections::HashSet;

use crate::ast::*;
use crate::token::{Token, TokenKind};

/// A structural parse failure, carrying the message and the 1-based source
/// line it was detected on.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} (line {line})")]
pub struct ParseError {
    pub message: String,
    pub line: u32,
}

/// A non-fatal recovery warning: a spurious token was skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseWarning {
    pub message: String,
    pub line: u32,
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    const_vars: HashSet<String>,
    pub warnings: Vec<ParseWarning>,
}

type PResult<T> = Result<T, ParseError>;

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Parser {
            tokens,
            pos: 0,
            const_vars: HashSet::new(),
            warnings: Vec::new(),
        }
    }

    fn cur(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn line(&self) -> u32 {
        self.cur().pos.line
    }

    fn adv(&mut self) -> Token {
        let t = self.cur().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn at(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(&self.cur().kind) == std::mem::discriminant(kind)
    }

    fn err<T>(&self, message: impl Into<String>) -> PResult<T> {
        Err(ParseError {
            message: message.into(),
            line: self.line(),
        })
    }

    fn expect(&mut self, kind: TokenKind, msg: &str) -> PResult<Token> {
        if self.at(&kind) {
            Ok(self.adv())
        } else {
            self.err(format!("{msg} (got '{}')", self.cur().text()))
        }
    }

    fn expect_ident(&mut self, msg: &str) -> PResult<String> {
        match &self.cur().kind {
            TokenKind::Ident(s) => {
                let s = s.clone();
                self.adv();
                Ok(s)
            }
            _ => self.err(msg),
        }
    }

    pub fn parse(mut self) -> (PResult<Program>, Vec<ParseWarning>) {
        let result = self.parse_program();
        (result, self.warnings)
    }

    fn parse_program(&mut self) -> PResult<Program> {
        let mut p = Program::new();
        self.expect(
            TokenKind::ProgStart,
            "file must begin with '#Mainprogramm.start'",
        )?;

        loop {
            match self.cur().kind {
                TokenKind::NoRuntime => {
                    p.no_runtime = true;
                    self.adv();
                }
                TokenKind::Safe => {
                    p.safe = true;
                    self.adv();
                }
                _ => break,
            }
        }

        while self.at(&TokenKind::Import) {
            self.adv();
            self.expect(TokenKind::LBrace, "expected '{' after 'Import'")?;
            let name = match &self.cur().kind {
                TokenKind::Ident(s) => s.clone(),
                other => other.text(),
            };
            self.adv();
            self.expect(TokenKind::RBrace, "expected '}' closing Import")?;
            p.imports.push(name);
        }

        loop {
            match &self.cur().kind {
                TokenKind::Struct => p.structs.push(self.parse_struct()?),
                TokenKind::Enum => p.enums.push(self.parse_enum()?),
                TokenKind::Extern => p.externs.push(self.parse_extern()?),
                TokenKind::Interrupt => p.interrupts.push(self.parse_interrupt()?),
                TokenKind::Function | TokenKind::Fn => p.functions.push(self.parse_function()?),
                TokenKind::Driver => p.drivers.push(self.parse_driver_decl()?),
                TokenKind::Include => {
                    self.adv();
                    match &self.cur().kind {
                        TokenKind::StrLit(s) => {
                            p.includes.push(s.clone());
                            self.adv();
                        }
                        _ => return self.err("expected a string literal after 'include'"),
                    }
                }
                _ => break,
            }
        }

        if self.at(&TokenKind::SecOpen) {
            p.main = Some(self.parse_section()?);
        }

        while self.at(&TokenKind::DrvOpen) {
            p.driver_sections.push(self.parse_driver_section()?);
        }

        self.expect(TokenKind::ProgEnd, "file must end with '#Mainprogramm.end'")?;

        if self.at(&TokenKind::DriverStop) {
            p.driver_stop = true;
            self.adv();
        }

        Ok(p)
    }

    fn parse_type(&mut self) -> PResult<Type> {
        let mut depth = 0;
        while self.at(&TokenKind::Star) {
            depth += 1;
            self.adv();
        }
        let mut ty = match &self.cur().kind {
            TokenKind::I32 => {
                self.adv();
                Type::I32
            }
            TokenKind::I64 => {
                self.adv();
                Type::I64
            }
            TokenKind::U8 => {
                self.adv();
                Type::U8
            }
            TokenKind::Bool => {
                self.adv();
                Type::Bool
            }
            TokenKind::Str => {
                self.adv();
                Type::Str
            }
            TokenKind::Ptr => {
                self.adv();
                Type::Pointer
            }
            TokenKind::Ident(name) => {
                let name = name.clone();
                self.adv();
                Type::Named(name)
            }
            _ => return self.err("expected a type"),
        };
        for _ in 0..depth {
            ty = Type::PointerTo(Box::new(ty));
        }
        Ok(ty)
    }

    fn parse_struct(&mut self) -> PResult<StructDecl> {
        self.expect(TokenKind::Struct, "expected 'struct'")?;
        let name = self.expect_ident("expected struct name")?;
        self.expect(TokenKind::LBrace, "expected '{' opening struct body")?;
        let mut fields = Vec::new();
        while !self.at(&TokenKind::RBrace) && !self.at(&TokenKind::Eof) {
            let field_name = self.expect_ident("expected field name")?;
            self.expect(TokenKind::Colon, "expected ':' after field name")?;
            let mut ty = self.parse_type()?;
            if self.at(&TokenKind::LBrack) {
                self.adv();
                let len = self.expect_number("expected array length")?;
                self.expect(TokenKind::RBrack, "expected ']'")?;
                ty = Type::Array(Box::new(ty), len);
            }
            fields.push((field_name, ty));
            if self.at(&TokenKind::Comma) {
                self.adv();
            }
        }
        self.expect(TokenKind::RBrace, "expected '}' closing struct body")?;
        Ok(StructDecl { name, fields })
    }

    fn parse_enum(&mut self) -> PResult<EnumDecl> {
        self.expect(TokenKind::Enum, "expected 'enum'")?;
        let name = self.expect_ident("expected enum name")?;
        self.expect(TokenKind::LBrace, "expected '{' opening enum body")?;
        let mut variants = Vec::new();
        while !self.at(&TokenKind::RBrace) && !self.at(&TokenKind::Eof) {
            variants.push(self.expect_ident("expected enum variant")?);
            if self.at(&TokenKind::Comma) {
                self.adv();
            }
        }
        self.expect(TokenKind::RBrace, "expected '}' closing enum body")?;
        Ok(EnumDecl { name, variants })
    }

    fn parse_extern(&mut self) -> PResult<ExternDecl> {
        self.expect(TokenKind::Extern, "expected 'extern'")?;
        let name = self.expect_ident("expected extern function name")?;
        let library = if self.at(&TokenKind::From) {
            self.adv();
            Some(self.expect_ident("expected library name after 'from'")?)
        } else {
            None
        };
        Ok(ExternDecl { name, library })
    }

    fn parse_interrupt(&mut self) -> PResult<InterruptBinding> {
        self.expect(TokenKind::Interrupt, "expected '#INTERRUPT'")?;
        self.expect(TokenKind::LBrace, "expected '{'")?;
        let number = self.expect_number("expected interrupt vector number")?;
        self.expect(TokenKind::RBrace, "expected '}'")?;
        self.expect(TokenKind::EqEq, "expected '==' after '#INTERRUPT{n}'")?;
        let function = self.expect_ident("expected handler function name")?;
        Ok(InterruptBinding { number, function })
    }

    fn parse_driver_decl(&mut self) -> PResult<DriverDecl> {
        self.expect(TokenKind::Driver, "expected '#DRIVER'")?;
        let name = self.expect_ident("expected driver name")?;
        self.expect(TokenKind::Colon, "expected ':' after driver name")?;
        let kind_text = match &self.cur().kind {
            TokenKind::SigilIdent(s) => s.clone(),
            _ => return self.err("expected a driver kind (#keyboard, #mouse or #volume)"),
        };
        self.adv();
        let kind = DriverKind::from_name(&kind_text)
            .ok_or_else(|| ParseError {
                message: format!("unknown driver kind '{kind_text}'"),
                line: self.line(),
            })?;
        Ok(DriverDecl { name, kind })
    }

    fn parse_driver_section(&mut self) -> PResult<DriverSection> {
        self.expect(TokenKind::DrvOpen, "expected '<drv.'")?;
        let name = self.expect_ident("expected driver section name")?;
        self.expect(TokenKind::Colon, "expected ':' after driver section name")?;
        let kind_text = match &self.cur().kind {
            TokenKind::SigilIdent(s) => s.clone(),
            _ => return self.err("expected a driver kind (#keyboard, #mouse or #volume)"),
        };
        self.adv();
        let kind = DriverKind::from_name(&kind_text).ok_or_else(|| ParseError {
            message: format!("unknown driver kind '{kind_text}'"),
            line: self.line(),
        })?;
        let (decls, stmts) = self.parse_decls_then_stmts(&TokenKind::DrvClose)?;
        self.expect(TokenKind::DrvClose, "expected '.dr>'")?;
        Ok(DriverSection {
            name,
            kind,
            decls,
            stmts,
        })
    }

    fn parse_function(&mut self) -> PResult<FuncDecl> {
        if self.at(&TokenKind::Function) {
            self.adv();
            self.expect(TokenKind::EqEq, "expected '==' after 'function'")?;
            let name = self.expect_ident("expected function name")?;
            self.expect(TokenKind::LBrace, "expected '{'")?;
            let body = self.parse_section()?;
            self.expect(TokenKind::RBrace, "expected '}' closing function body")?;
            return Ok(FuncDecl {
                name,
                params: Vec::new(),
                return_type: None,
                body,
            });
        }

        self.expect(TokenKind::Fn, "expected 'fn'")?;
        let name = self.expect_ident("expected function name")?;
        self.expect(TokenKind::LParen, "expected '(' after function name")?;
        let mut params = Vec::new();
        while !self.at(&TokenKind::RParen) && !self.at(&TokenKind::Eof) {
            let pname = self.expect_ident("expected parameter name")?;
            self.expect(TokenKind::Colon, "expected ':' after parameter name")?;
            let ty = self.parse_type()?;
            params.push((pname, ty));
            if self.at(&TokenKind::Comma) {
                self.adv();
            }
        }
        self.expect(TokenKind::RParen, "expected ')' closing parameter list")?;
        let return_type = if self.at(&TokenKind::Arrow) {
            self.adv();
            Some(self.parse_type()?)
        } else {
            None
        };
        self.expect(TokenKind::LBrace, "expected '{'")?;
        let body = self.parse_section()?;
        self.expect(TokenKind::RBrace, "expected '}' closing function body")?;
        Ok(FuncDecl {
            name,
            params,
            return_type,
            body,
        })
    }

    fn parse_decl(&mut self) -> PResult<VarDecl> {
        let is_const = if self.at(&TokenKind::Const) {
            self.adv();
            true
        } else {
            self.expect(TokenKind::Var, "expected 'var' or 'const'")?;
            false
        };
        let name = self.expect_ident("expected variable name")?;
        self.expect(TokenKind::Colon, "expected ':' after variable name")?;
        let ty = self.parse_type()?;

        let array_len = if self.at(&TokenKind::LBrack) {
            if is_const {
                return self.err("const arrays are not supported");
            }
            self.adv();
            let len = self.expect_number("expected array size")?;
            self.expect(TokenKind::RBrack, "expected ']'")?;
            Some(len)
        } else {
            None
        };

        let init = if self.at(&TokenKind::Eq) {
            self.adv();
            Some(self.parse_expr()?)
        } else {
            None
        };

        if is_const && init.is_none() {
            return self.err("const requires initializer");
        }
        if is_const {
            self.const_vars.insert(name.clone());
        }

        Ok(VarDecl {
            name,
            ty,
            is_const,
            array_len,
            init,
        })
    }

    fn expect_number(&mut self, msg: &str) -> PResult<u32> {
        match &self.cur().kind {
            TokenKind::Number(n) => {
                let n = n.parse().map_err(|_| ParseError {
                    message: format!("{msg}: '{n}' is not a valid number"),
                    line: self.line(),
                })?;
                self.adv();
                Ok(n)
            }
            _ => self.err(msg),
        }
    }

    /// `<.de` … `.>`: decls, an optional `static.pl>` (accepted and
    /// ignored — a no-op separator kept only for older programs), then
    /// statements.
    fn parse_section(&mut self) -> PResult<Section> {
        self.expect(TokenKind::SecOpen, "expected '<.de'")?;
        let (decls, stmts) = self.parse_decls_then_stmts(&TokenKind::SecClose)?;
        self.expect(TokenKind::SecClose, "expected '.>'")?;
        Ok(Section { decls, stmts })
    }

    fn parse_decls_then_stmts(
        &mut self,
        closing: &TokenKind,
    ) -> PResult<(Vec<VarDecl>, Vec<Stmt>)> {
        let mut decls = Vec::new();
        while self.at(&TokenKind::Var) || self.at(&TokenKind::Const) {
            decls.push(self.parse_decl()?);
        }
        if self.at(&TokenKind::StaticPl) {
            self.adv();
        }
        let mut stmts = Vec::new();
        while !self.at(closing) && !self.at(&TokenKind::Eof) {
            if let Some(s) = self.parse_stmt()? {
                stmts.push(s);
            }
        }
        Ok((decls, stmts))
    }

    fn parse_block(&mut self) -> PResult<Vec<Stmt>> {
        self.expect(TokenKind::LBrace, "expected '{'")?;
        let mut body = Vec::new();
        while !self.at(&TokenKind::RBrace) && !self.at(&TokenKind::Eof) {
            if let Some(s) = self.parse_stmt()? {
                body.push(s);
            }
        }
        self.expect(TokenKind::RBrace, "expected '}'")?;
        Ok(body)
    }

    fn braced_arg(&mut self) -> PResult<Expr> {
        self.expect(TokenKind::LBrace, "expected '{'")?;
        let e = self.parse_expr()?;
        self.expect(TokenKind::RBrace, "expected '}'")?;
        Ok(e)
    }

    fn braced_ident(&mut self) -> PResult<String> {
        self.expect(TokenKind::LBrace, "expected '{'")?;
        let name = self.expect_ident("expected identifier")?;
        self.expect(TokenKind::RBrace, "expected '}'")?;
        Ok(name)
    }

    fn parse_stmt(&mut self) -> PResult<Option<Stmt>> {
        match self.cur().kind.clone() {
            TokenKind::Free => {
                self.adv();
                let name = self.braced_ident()?;
                if self.const_vars.contains(&name) {
                    return self.err(format!("cannot free const '{name}'"));
                }
                Ok(Some(Stmt::Free(name)))
            }
            TokenKind::Alloc => {
                self.adv();
                let size = self.braced_arg()?;
                Ok(Some(Stmt::Alloc(size)))
            }
            TokenKind::Display => {
                self.adv();
                Ok(Some(Stmt::Display(self.braced_arg()?)))
            }
            TokenKind::PrintNum => {
                self.adv();
                Ok(Some(Stmt::PrintNum(self.braced_arg()?)))
            }
            TokenKind::PutChar => {
                self.adv();
                Ok(Some(Stmt::PutChar(self.braced_arg()?)))
            }
            TokenKind::Color => {
                self.adv();
                Ok(Some(Stmt::Color(self.braced_arg()?)))
            }
            TokenKind::ReadKey => {
                self.adv();
                Ok(Some(Stmt::ReadKey(self.braced_ident()?)))
            }
            TokenKind::ReadChar => {
                self.adv();
                Ok(Some(Stmt::ReadChar(self.braced_ident()?)))
            }
            TokenKind::Clear => {
                self.adv();
                self.expect(TokenKind::LBrace, "expected '{'")?;
                self.expect(TokenKind::RBrace, "expected '}'")?;
                Ok(Some(Stmt::Clear))
            }
            TokenKind::Reboot => {
                self.adv();
                self.expect(TokenKind::LBrace, "expected '{'")?;
                self.expect(TokenKind::RBrace, "expected '}'")?;
                Ok(Some(Stmt::Reboot))
            }
            TokenKind::Call => {
                self.adv();
                let name = self.expect_ident("expected function name after 'call'")?;
                Ok(Some(Stmt::Call(name)))
            }
            TokenKind::Loop => {
                self.adv();
                Ok(Some(Stmt::Loop {
                    body: self.parse_block()?,
                }))
            }
            TokenKind::While => {
                self.adv();
                let cond = self.parse_condition()?;
                Ok(Some(Stmt::While {
                    cond,
                    body: self.parse_block()?,
                }))
            }
            TokenKind::For => {
                self.adv();
                let var = self.expect_ident("expected loop variable")?;
                self.expect(TokenKind::Eq, "expected '=' after loop variable")?;
                let from = self.parse_expr()?;
                self.expect(TokenKind::To, "expected 'to'")?;
                let to = self.parse_expr()?;
                Ok(Some(Stmt::For {
                    var,
                    from,
                    to,
                    body: self.parse_block()?,
                }))
            }
            TokenKind::If => {
                self.adv();
                let cond = self.parse_condition()?;
                let then_body = self.parse_block()?;
                let else_body = if self.at(&TokenKind::Else) {
                    self.adv();
                    self.parse_block()?
                } else {
                    Vec::new()
                };
                Ok(Some(Stmt::If {
                    cond,
                    then_body,
                    else_body,
                }))
            }
            TokenKind::Switch => {
                self.adv();
                let value = self.parse_expr()?;
                self.expect(TokenKind::LBrace, "expected '{' opening switch body")?;
                let mut cases = Vec::new();
                let mut default = None;
                while !self.at(&TokenKind::RBrace) && !self.at(&TokenKind::Eof) {
                    if self.at(&TokenKind::Case) {
                        self.adv();
                        let case_value = self.parse_expr()?;
                        self.expect(TokenKind::Colon, "expected ':' after case value")?;
                        let mut body = Vec::new();
                        while !self.at(&TokenKind::Case)
                            && !self.at(&TokenKind::Default)
                            && !self.at(&TokenKind::RBrace)
                            && !self.at(&TokenKind::Eof)
                        {
                            if let Some(s) = self.parse_stmt()? {
                                body.push(s);
                            }
                        }
                        cases.push((case_value, body));
                    } else if self.at(&TokenKind::Default) {
                        self.adv();
                        self.expect(TokenKind::Colon, "expected ':' after 'default'")?;
                        let mut body = Vec::new();
                        while !self.at(&TokenKind::Case)
                            && !self.at(&TokenKind::RBrace)
                            && !self.at(&TokenKind::Eof)
                        {
                            if let Some(s) = self.parse_stmt()? {
                                body.push(s);
                            }
                        }
                        default = Some(body);
                    } else {
                        return self.err("expected 'case' or 'default' in switch body");
                    }
                }
                self.expect(TokenKind::RBrace, "expected '}' closing switch body")?;
                Ok(Some(Stmt::Switch {
                    value,
                    cases,
                    default,
                }))
            }
            TokenKind::Stop | TokenKind::Break => {
                self.adv();
                Ok(Some(Stmt::Break))
            }
            TokenKind::Continue => {
                self.adv();
                Ok(Some(Stmt::Continue))
            }
            TokenKind::Return => {
                self.adv();
                if self.at(&TokenKind::RBrace) || self.at(&TokenKind::SecClose) {
                    Ok(Some(Stmt::Return(None)))
                } else {
                    Ok(Some(Stmt::Return(Some(self.parse_expr()?))))
                }
            }
            TokenKind::Mov => {
                self.adv();
                self.expect(TokenKind::LBrace, "expected '{'")?;
                let target = self.expect_register()?;
                self.expect(TokenKind::Comma, "expected ','")?;
                let source = self.expect_register_or_ident()?;
                self.expect(TokenKind::RBrace, "expected '}'")?;
                Ok(Some(Stmt::RegMove { target, source }))
            }
            TokenKind::RegStatic => {
                self.adv();
                self.expect(TokenKind::LBrace, "expected '{'")?;
                let target = self.expect_register()?;
                self.expect(TokenKind::RBrace, "expected '}'")?;
                Ok(Some(Stmt::RegStatic { target }))
            }
            TokenKind::Ident(_) | TokenKind::Register(_) => self.parse_assignment_or_driver_call(),
            TokenKind::SecClose | TokenKind::RBrace | TokenKind::Eof => Ok(None),
            _ => {
                self.warnings.push(ParseWarning {
                    message: format!("unexpected token '{}', skipping", self.cur().text()),
                    line: self.line(),
                });
                self.adv();
                Ok(None)
            }
        }
    }

    fn expect_register(&mut self) -> PResult<String> {
        match &self.cur().kind {
            TokenKind::Register(s) => {
                let s = s.clone();
                self.adv();
                Ok(s)
            }
            _ => self.err("expected a register (#R<n>)"),
        }
    }

    fn expect_register_or_ident(&mut self) -> PResult<String> {
        match &self.cur().kind {
            TokenKind::Register(s) | TokenKind::Ident(s) => {
                let s = s.clone();
                self.adv();
                Ok(s)
            }
            _ => self.err("expected a register or identifier"),
        }
    }

    /// Identifier-led statements: plain assignment, array/struct/pointer
    /// assignment targets, or a driver call (`name << builtin` /
    /// `name !<< builtin`).
    fn parse_assignment_or_driver_call(&mut self) -> PResult<Option<Stmt>> {
        let is_reg = matches!(self.cur().kind, TokenKind::Register(_));
        let name = match &self.cur().kind {
            TokenKind::Ident(s) | TokenKind::Register(s) => s.clone(),
            _ => unreachable!(),
        };
        self.adv();

        if self.at(&TokenKind::DrvFuncAssign) {
            self.adv();
            let builtin = self.expect_ident("expected builtin name after '<<'")?;
            return Ok(Some(Stmt::DriverCall {
                target: name,
                builtin,
                use_builtin: true,
            }));
        }

        if !is_reg && self.const_vars.contains(&name) {
            return self.err(format!("cannot assign to const '{name}'"));
        }

        let target = if self.at(&TokenKind::Dot) {
            self.adv();
            let field = self.expect_ident("expected field name after '.'")?;
            AssignTarget::StructField { name, field }
        } else if self.at(&TokenKind::LBrack) {
            self.adv();
            let index = self.parse_expr()?;
            self.expect(TokenKind::RBrack, "expected ']'")?;
            AssignTarget::ArrayElement { name, index }
        } else if is_reg {
            AssignTarget::Register(name)
        } else {
            AssignTarget::Ident(name)
        };

        self.expect(TokenKind::Eq, "expected '='")?;
        let value = self.parse_expr()?;
        Ok(Some(Stmt::Assign { target, value }))
    }

    /// A boolean condition for `if`/`while`: a full expression, which
    /// subsumes the legacy grammar's bare `L OP R` triple.
    fn parse_condition(&mut self) -> PResult<Expr> {
        self.parse_expr()
    }

    // --- expressions, standard precedence climbing ---

    fn parse_expr(&mut self) -> PResult<Expr> {
        self.parse_binary(0)
    }

    fn parse_binary(&mut self, min_prec: u8) -> PResult<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let Some(op) = self.peek_binop() else {
                break;
            };
            if op.precedence() < min_prec {
                break;
            }
            self.adv();
            let rhs = self.parse_binary(op.precedence() + 1)?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn peek_binop(&self) -> Option<BinOp> {
        Some(match self.cur().kind {
            TokenKind::Plus => BinOp::Add,
            TokenKind::Minus => BinOp::Sub,
            TokenKind::Star => BinOp::Mul,
            TokenKind::Slash => BinOp::Div,
            TokenKind::Shr => BinOp::Shr,
            TokenKind::EqEq => BinOp::Eq,
            TokenKind::Neq => BinOp::Neq,
            TokenKind::Lt => BinOp::Lt,
            TokenKind::Gt => BinOp::Gt,
            TokenKind::Lte => BinOp::Lte,
            TokenKind::Gte => BinOp::Gte,
            TokenKind::LogicAnd => BinOp::And,
            TokenKind::LogicOr => BinOp::Or,
            _ => return None,
        })
    }

    fn parse_unary(&mut self) -> PResult<Expr> {
        match self.cur().kind {
            TokenKind::Amp => {
                self.adv();
                Ok(Expr::AddressOf(Box::new(self.parse_unary()?)))
            }
            TokenKind::Star => {
                self.adv();
                Ok(Expr::Deref(Box::new(self.parse_unary()?)))
            }
            TokenKind::Minus => {
                self.adv();
                Ok(Expr::Neg(Box::new(self.parse_unary()?)))
            }
            TokenKind::LogicNot => {
                self.adv();
                Ok(Expr::Not(Box::new(self.parse_unary()?)))
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> PResult<Expr> {
        let mut e = self.parse_primary()?;
        loop {
            if self.at(&TokenKind::Dot) {
                self.adv();
                let field = self.expect_ident("expected field name after '.'")?;
                e = Expr::FieldAccess {
                    base: Box::new(e),
                    field,
                };
            } else if self.at(&TokenKind::LBrack) {
                self.adv();
                let index = self.parse_expr()?;
                self.expect(TokenKind::RBrack, "expected ']'")?;
                e = Expr::ArrayIndex {
                    array: Box::new(e),
                    index: Box::new(index),
                };
            } else {
                break;
            }
        }
        Ok(e)
    }

    fn parse_primary(&mut self) -> PResult<Expr> {
        match self.cur().kind.clone() {
            TokenKind::Number(n) => {
                self.adv();
                n.parse()
                    .map(Expr::Number)
                    .map_err(|_| ParseError {
                        message: format!("'{n}' is not a valid number"),
                        line: self.line(),
                    })
            }
            TokenKind::Hex(h) | TokenKind::SigilHex(h) => {
                self.adv();
                let digits = h.trim_start_matches("0x").trim_start_matches("0X");
                i64::from_str_radix(digits, 16)
                    .map(Expr::Hex)
                    .map_err(|_| ParseError {
                        message: format!("'{h}' is not a valid hex literal"),
                        line: self.line(),
                    })
            }
            TokenKind::StrLit(s) => {
                self.adv();
                Ok(Expr::Str(s))
            }
            TokenKind::True => {
                self.adv();
                Ok(Expr::Bool(true))
            }
            TokenKind::False => {
                self.adv();
                Ok(Expr::Bool(false))
            }
            TokenKind::Register(s) => {
                self.adv();
                Ok(Expr::Register(s))
            }
            TokenKind::Ident(s) => {
                self.adv();
                Ok(Expr::Ident(s))
            }
            TokenKind::LParen => {
                self.adv();
                let e = self.parse_expr()?;
                self.expect(TokenKind::RParen, "expected ')'")?;
                Ok(e)
            }
            TokenKind::LBrack => {
                self.adv();
                let mut items = Vec::new();
                while !self.at(&TokenKind::RBrack) && !self.at(&TokenKind::Eof) {
                    items.push(self.parse_expr()?);
                    if self.at(&TokenKind::Comma) {
                        self.adv();
                    }
                }
                self.expect(TokenKind::RBrack, "expected ']'")?;
                Ok(Expr::ArrayLiteral(items))
            }
            _ => self.err(format!("expected an expression, got '{}'", self.cur().text())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;

    fn parse(src: &str) -> PResult<Program> {
        let (tokens, _) = Lexer::new(src).tokenize();
        Parser::new(tokens).parse().0
    }

    #[test]
    fn minimal_program_parses() {
        let program = parse("#Mainprogramm.start #Mainprogramm.end").unwrap();
        assert!(program.main.is_none());
        assert!(!program.no_runtime);
    }

    #[test]
    fn hello_world_scenario_parses() {
        let src = r#"
            #Mainprogramm.start
            <.de
            var msg: string = "Hi"
            static.pl>
            display{msg}
            .>
            #Mainprogramm.end
        "#;
        let program = parse(src).unwrap();
        let section = program.main.unwrap();
        assert_eq!(section.decls.len(), 1);
        assert_eq!(section.stmts.len(), 1);
        assert!(matches!(section.stmts[0], Stmt::Display(_)));
    }

    #[test]
    fn arithmetic_precedence_builds_the_expected_tree() {
        let src = r#"
            #Mainprogramm.start
            <.de
            var r: i32 = 0
            r = (2+(3*4))
            .>
            #Mainprogramm.end
        "#;
        let program = parse(src).unwrap();
        let section = program.main.unwrap();
        let Stmt::Assign { value, .. } = &section.stmts[0] else {
            panic!("expected assignment");
        };
        assert_eq!(value.to_string(), "(2+(3*4))");
    }

    #[test]
    fn const_reassignment_is_rejected() {
        let src = r#"
            #Mainprogramm.start
            <.de
            const K: i32 = 5
            K = 6
            .>
            #Mainprogramm.end
        "#;
        let err = parse(src).unwrap_err();
        assert!(err.message.contains("cannot assign to const 'K'"));
    }

    #[test]
    fn struct_field_access_parses() {
        let src = r#"
            #Mainprogramm.start
            struct P { x: i32 y: i32 }
            <.de
            var p: P
            p.x = 7
            p.y = 11
            printnum{p.x}
            .>
            #Mainprogramm.end
        "#;
        let program = parse(src).unwrap();
        assert_eq!(program.structs[0].fields.len(), 2);
        let section = program.main.unwrap();
        assert!(matches!(
            section.stmts[0],
            Stmt::Assign {
                target: AssignTarget::StructField { .. },
                ..
            }
        ));
    }

    #[test]
    fn break_outside_loop_is_tracked_by_the_caller_not_the_parser() {
        // The parser accepts 'stop' anywhere; the code generator is
        // responsible for rejecting a break outside a loop.
        let src = r#"
            #Mainprogramm.start
            <.de
            stop
            .>
            #Mainprogramm.end
        "#;
        let program = parse(src).unwrap();
        assert_eq!(program.main.unwrap().stmts, vec![Stmt::Break]);
    }

    #[test]
    fn static_pl_separator_is_optional() {
        let src = r#"
            #Mainprogramm.start
            <.de
            var x: i32 = 1
            printnum{x}
            .>
            #Mainprogramm.end
        "#;
        let program = parse(src).unwrap();
        let section = program.main.unwrap();
        assert_eq!(section.decls.len(), 1);
        assert_eq!(section.stmts.len(), 1);
    }
}
