use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use lightningcss::targets::Targets;

use crate::error::PostError;
use crate::post::{min_path, read_required};

/// Minifies CSS with `lightningcss`.
#[derive(Debug, Clone, Default)]
pub struct Minifier {
    targets: Targets,
}

impl Minifier {
    /// Minifier which keeps the prefixes the given queries need.
    pub fn new<S: AsRef<str>>(queries: &[S]) -> Result<Self, PostError> {
        Ok(Self {
            targets: crate::post::prefix::targets(queries)?,
        })
    }

    pub fn minify_css(&self, source: &str, filename: &Utf8Path) -> Result<String, PostError> {
        let css_error = |message: String| PostError::Css {
            path: filename.to_owned(),
            message,
        };

        let mut sheet = StyleSheet::parse(
            source,
            ParserOptions {
                filename: filename.to_string(),
                ..ParserOptions::default()
            },
        )
        .map_err(|e| css_error(e.to_string()))?;

        sheet
            .minify(MinifyOptions {
                targets: self.targets,
                ..MinifyOptions::default()
            })
            .map_err(|e| css_error(e.to_string()))?;

        let result = sheet
            .to_css(PrinterOptions {
                minify: true,
                targets: self.targets,
                ..PrinterOptions::default()
            })
            .map_err(|e| css_error(e.to_string()))?;

        Ok(result.code)
    }

    /// Reads `path` and writes its minified sibling, returning the new path.
    pub fn minify_file(&self, path: &Utf8Path) -> Result<Utf8PathBuf, PostError> {
        let source = read_required(path)?;
        let minified = self.minify_css(&source, path)?;

        let target = min_path(path);
        fs::write(&target, minified)?;

        tracing::debug!(%target, "minified");
        Ok(target)
    }
}
