mod error_codes;

use std::{path::PathBuf, sync::LazyLock};

use clap::Parser;
use proc_macro2::TokenStream;

pub(crate) static ROOT_DIR: LazyLock<PathBuf> = LazyLock::new(|| {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .and_then(|p| p.parent())
        .expect("xtask always lives at <workspace>/crates/xtask")
        .to_path_buf()
});

#[derive(Debug, Parser)]
enum Cli {
    /// Regenerate `crates/defacto/src/codes.rs` from
    /// `crates/defacto/error-codes.yaml`.
    ErrorCodes(error_codes::ErrorCodes),
}

fn main() -> anyhow::Result<()> {
    match Cli::parse() {
        Cli::ErrorCodes(cmd) => cmd.run(),
    }
}

/// Write `tokens` to `path`, formatted with `prettyplease`, only touching
/// the file on disk if its contents actually changed.
pub(crate) fn ensure_file_contents(path: &std::path::Path, tokens: TokenStream, marker: &str) {
    let parsed = syn::parse2(tokens).unwrap_or_else(|e| {
        panic!("generated {marker} tokens failed to parse as a file: {e}")
    });
    let formatted = prettyplease::unparse(&parsed);

    if std::fs::read_to_string(path).ok().as_deref() != Some(formatted.as_str()) {
        std::fs::write(path, formatted)
            .unwrap_or_else(|e| panic!("failed to write {}: {e}", path.display()));
    }
}
