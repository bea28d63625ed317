use defacto_syntax::{Lexer, Parser, Span};

use crate::{
    Db,
    diagnostics::{LexWarning, ParseError, ParseWarning},
    types::{Ast, SourceFile, Tree},
};

/// Lex and parse a source file into an abstract syntax tree.
///
/// This is the only place the hand-rolled lexer and recursive-descent
/// parser in `defacto_syntax` are driven from; there is no separate TAC
/// stage downstream, `generate_assembly` consumes this tree directly.
#[tracing::instrument(level = "info", skip_all)]
#[salsa::tracked]
pub fn parse(db: &dyn Db, file: SourceFile) -> Ast<'_> {
    let src = file.contents(db);

    let (tokens, unknown_chars) = Lexer::new(src.as_str()).tokenize();
    for unknown in unknown_chars {
        LexWarning {
            file,
            span: Span::new(0, 0),
            ch: unknown.ch,
        }
        .accumulate(db);
    }

    let (result, warnings) = Parser::new(tokens).parse();
    for warning in warnings {
        ParseWarning {
            file,
            msg: format!("line {}: {}", warning.line, warning.message).into(),
        }
        .accumulate(db);
    }

    let program = match result {
        Ok(program) => program,
        Err(err) => {
            ParseError {
                file,
                span: Span::new(0, 0),
                msg: err.message.into(),
            }
            .accumulate(db);
            defacto_syntax::ast::Program::new()
        }
    };

    Ast::new(db, Tree::from(program))
}

#[cfg(test)]
mod tests {
    use crate::{Database, diagnostics::Diagnostics};

    use super::*;

    #[test]
    fn parses_a_minimal_program() {
        let db = Database::default();
        let src = "#Mainprogramm.start\n#NO_RUNTIME\n<.de\n.>\n#Mainprogramm.end\n";
        let file = SourceFile::new(&db, "main.de".into(), src.into());

        let ast = parse(&db, file);
        assert!(ast.tree(&db).functions.is_empty());

        let diags: Vec<&Diagnostics> = parse::accumulated::<Diagnostics>(&db, file);
        assert!(diags.is_empty(), "unexpected diagnostics: {diags:?}");
    }

    #[test]
    fn an_unrecognised_character_is_a_warning_not_a_failure() {
        let db = Database::default();
        let src = "#Mainprogramm.start\n~\n#Mainprogramm.end\n";
        let file = SourceFile::new(&db, "main.de".into(), src.into());

        parse(&db, file);
        let diags = parse::accumulated::<Diagnostics>(&db, file);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].severity(), codespan_reporting::diagnostic::Severity::Warning);
    }
}
