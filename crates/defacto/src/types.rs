use defacto_syntax::ast::Program;

use crate::{Db, Text};

pub use defacto_syntax::Span;

#[salsa::input]
#[derive(Debug)]
pub struct SourceFile {
    #[returns(ref)]
    pub path: Text,
    #[returns(ref)]
    pub contents: Text,
}

/// The hand-rolled program tree, wrapped as one salsa-tracked struct per
/// translation unit.
#[salsa::tracked]
pub struct Ast<'db> {
    #[returns(ref)]
    pub tree: Tree,
}

#[salsa::tracked]
impl<'db> Ast<'db> {
    pub fn sexpr(&self, db: &'db dyn Db) -> String {
        format!("{:#?}", self.tree(db).0)
    }
}

/// Newtype around [`defacto_syntax::ast::Program`] so it can carry the
/// `Eq`/`Hash` impls salsa wants without requiring them of the AST types
/// themselves.
#[derive(Debug, Clone)]
pub struct Tree(pub Program);

impl From<Program> for Tree {
    fn from(value: Program) -> Self {
        Tree(value)
    }
}

impl std::ops::Deref for Tree {
    type Target = Program;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl PartialEq for Tree {
    fn eq(&self, other: &Self) -> bool {
        format!("{:?}", self.0) == format!("{:?}", other.0)
    }
}

impl Eq for Tree {}

impl std::hash::Hash for Tree {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        format!("{:?}", self.0).hash(state);
    }
}
