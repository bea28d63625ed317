use std::path::{Path, PathBuf};

use crate::{Db, Text, types::SourceFile};

/// Splices every `Import{name}` library's source into the main file's
/// text, inserted right after the last import directive — where the
/// grammar expects declarations to begin — rather than at the end of the
/// file, since nothing past `#Mainprogramm.end` is ever parsed. A small
/// in-process text splice: there is no C-style preprocessor in this
/// pipeline, only a directory search and string concatenation.
#[salsa::tracked]
pub fn splice_imports(db: &dyn Db, source: SourceFile) -> Result<Text, PreprocessorError> {
    let contents = source.contents(db);
    let dir = Path::new(source.path(db)).parent().map(Path::to_path_buf).unwrap_or_default();

    let src = contents.as_str();
    let imports = find_imports(src);
    let Some(&(_, splice_point)) = imports.last() else {
        return Ok(contents.clone());
    };

    let mut libraries = String::new();
    for (name, _) in &imports {
        let library_path = resolve_library(&dir, name).ok_or_else(|| PreprocessorError {
            name: name.clone(),
            searched: vec![dir.join(format!("{name}.de")), PathBuf::from("lib").join(format!("{name}.de"))],
        })?;
        let library_src = std::fs::read_to_string(&library_path).map_err(|_| PreprocessorError {
            name: name.clone(),
            searched: vec![library_path.clone()],
        })?;
        libraries.push('\n');
        libraries.push_str(&library_src);
    }

    let mut spliced = String::with_capacity(src.len() + libraries.len());
    spliced.push_str(&src[..splice_point]);
    spliced.push_str(&libraries);
    spliced.push_str(&src[splice_point..]);

    Ok(Text::from(spliced))
}

/// Scans raw source text for `Import{name}` directives without requiring a
/// full tokenize pass — preprocessing runs before parsing. Returns each
/// name paired with the byte offset right after its closing `}`.
fn find_imports(src: &str) -> Vec<(String, usize)> {
    let mut names = Vec::new();
    let bytes = src.as_bytes();
    let mut i = 0;
    while let Some(offset) = src[i..].find("Import") {
        let start = i + offset;
        let mut cursor = start + "Import".len();
        while bytes.get(cursor).copied().is_some_and(|b| b == b' ' || b == b'\t') {
            cursor += 1;
        }
        if bytes.get(cursor) == Some(&b'{') {
            cursor += 1;
            let name_start = cursor;
            while bytes.get(cursor).is_some_and(|b| *b != b'}') {
                cursor += 1;
            }
            if bytes.get(cursor) == Some(&b'}') {
                cursor += 1;
                names.push((src[name_start..cursor - 1].trim().to_string(), cursor));
                i = cursor;
                continue;
            }
        }
        i = start + "Import".len();
    }
    names
}

/// `L.de` from (a) the main file's directory, then (b) a `lib/` directory.
fn resolve_library(source_dir: &Path, name: &str) -> Option<PathBuf> {
    let candidates = [
        source_dir.join(format!("{name}.de")),
        PathBuf::from("lib").join(format!("{name}.de")),
    ];
    candidates.into_iter().find(|p| p.is_file())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreprocessorError {
    pub name: String,
    pub searched: Vec<PathBuf>,
}

impl std::error::Error for PreprocessorError {}

impl std::fmt::Display for PreprocessorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "could not resolve Import{{{}}}; searched: ", self.name)?;
        for (i, path) in self.searched.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", path.display())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_every_import_directive_and_its_splice_point() {
        let src = "#Mainprogramm.start\nImport{util}\nImport{net}\n#Mainprogramm.end";
        let imports = find_imports(src);
        let names: Vec<_> = imports.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["util", "net"]);
        let (_, end) = *imports.last().unwrap();
        assert_eq!(&src[end..end + 1], "\n");
    }

    #[test]
    fn a_file_with_no_imports_splices_to_itself() {
        let db = crate::Database::default();
        let file = SourceFile::new(&db, "main.de".into(), "#Mainprogramm.start\n#Mainprogramm.end".into());
        let out = splice_imports(&db, file).unwrap();
        assert_eq!(out.as_str(), "#Mainprogramm.start\n#Mainprogramm.end");
    }

    #[test]
    fn an_import_is_spliced_in_right_after_the_last_import_directive() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("util.de"), "fn doit {\n<.de\nstatic.pl>\n.>\n}\n").unwrap();

        let db = crate::Database::default();
        let path = dir.path().join("main.de");
        let src = "#Mainprogramm.start\nImport{util}\n<.de\nstatic.pl>\ncall doit\n.>\n#Mainprogramm.end";
        let file = SourceFile::new(&db, path.display().to_string().into(), src.into());

        let out = splice_imports(&db, file).unwrap();
        let import_end = out.as_str().find("Import{util}").unwrap() + "Import{util}".len();
        assert!(out.as_str()[import_end..].trim_start().starts_with("fn doit"));
    }
}
