//! The per-translation-unit symbol table.
//!
//! Owned exclusively by the active [`crate::codegen::Generator`] instance;
//! nothing outside code generation ever constructs one.

use std::collections::{HashMap, HashSet};

use defacto_syntax::ast::{StructDecl, Type};

use crate::Text;

/// Storage class a variable was declared with.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Storage {
    /// A top-level/section-local variable, laid out as a data-section
    /// label. Every declared variable gets one of these, functions
    /// included, so taking its address yields a link-time-fixed location.
    Data,
    /// The target of `alloc{N}`.
    Heap,
}

/// Whether a heap-backed variable has been released yet.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Ownership {
    Owned,
    Borrowed,
    Freed,
}

#[derive(Debug, Clone)]
pub struct Symbol {
    pub label: Text,
    pub ty: Type,
    pub is_pointer: bool,
    pub storage: Storage,
    pub ownership: Ownership,
    /// Set the first time code generation emits a load from this symbol's
    /// label. Used for the "auto-freed without ever being read" warning.
    pub read_from: bool,
}

#[derive(Debug, Clone)]
pub struct StructLayout {
    pub fields: Vec<(String, Type, u32)>,
    pub size: u32,
}

impl StructLayout {
    pub fn offset_of(&self, field: &str) -> Option<(u32, &Type)> {
        self.fields
            .iter()
            .find(|(name, _, _)| name == field)
            .map(|(_, ty, off)| (*off, ty))
    }
}

/// The symbol table, struct layout table, and the const/freed/driver sets
/// for one translation unit.
#[derive(Debug, Default)]
pub struct SymbolTable {
    symbols: HashMap<String, Symbol>,
    structs: HashMap<String, StructLayout>,
    pub const_declared: HashSet<String>,
    pub freed: HashSet<String>,
    pub driver_constants: HashSet<String>,
    declared_order: Vec<String>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(&mut self, name: &str, ty: Type, is_const: bool, storage: Storage) {
        let is_pointer = ty.is_pointer();
        let label = Text::from(format!("var_{name}"));
        self.symbols.insert(
            name.to_string(),
            Symbol {
                label,
                ty,
                is_pointer,
                storage,
                ownership: Ownership::Owned,
                read_from: false,
            },
        );
        if is_const {
            self.const_declared.insert(name.to_string());
        } else {
            self.declared_order.push(name.to_string());
        }
    }

    pub fn declare_driver_constant(&mut self, name: &str) {
        self.driver_constants.insert(name.to_string());
    }

    pub fn register_struct(&mut self, decl: &StructDecl, bits: u8) {
        let mut offset = 0u32;
        let mut fields = Vec::with_capacity(decl.fields.len());
        for (name, ty) in &decl.fields {
            let size = ty.size_on(bits);
            fields.push((name.clone(), ty.clone(), offset));
            offset += size;
        }
        self.structs.insert(
            decl.name.clone(),
            StructLayout {
                fields,
                size: offset,
            },
        );
    }

    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        self.symbols.get(name)
    }

    pub fn lookup_mut(&mut self, name: &str) -> Option<&mut Symbol> {
        self.symbols.get_mut(name)
    }

    pub fn mark_read(&mut self, name: &str) {
        if let Some(sym) = self.symbols.get_mut(name) {
            sym.read_from = true;
        }
    }

    pub fn struct_layout(&self, name: &str) -> Option<&StructLayout> {
        self.structs.get(name)
    }

    pub fn is_const(&self, name: &str) -> bool {
        self.const_declared.contains(name)
    }

    pub fn is_driver_constant(&self, name: &str) -> bool {
        self.driver_constants.contains(name)
    }

    pub fn mark_freed(&mut self, name: &str) {
        self.freed.insert(name.to_string());
        if let Some(sym) = self.symbols.get_mut(name) {
            sym.ownership = Ownership::Freed;
        }
    }

    /// Every non-const, non-driver identifier declared in the current
    /// section, in declaration order — the candidate set for the
    /// end-of-section auto-free sweep.
    pub fn declared_this_scope(&self, names: &[String]) -> Vec<String> {
        names
            .iter()
            .filter(|n| !self.const_declared.contains(*n) && !self.driver_constants.contains(*n))
            .cloned()
            .collect()
    }
}
