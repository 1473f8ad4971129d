use std::fs;

use camino::Utf8Path;
use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use lightningcss::targets::{Browsers, Targets};

use crate::error::PostError;
use crate::post::read_required;

/// Adds the vendor prefixes a browserslist query needs, through
/// `lightningcss`.
///
/// Properties the prefixer knows nothing about are printed back unchanged.
/// Already prefixed input is recognised, so running the step twice gives the
/// same bytes as running it once.
#[derive(Debug, Clone)]
pub struct Prefixer {
    targets: Targets,
}

impl Prefixer {
    pub fn new<S: AsRef<str>>(queries: &[S]) -> Result<Self, PostError> {
        Ok(Self {
            targets: targets(queries)?,
        })
    }

    pub fn prefix_css(&self, source: &str, filename: &Utf8Path) -> Result<String, PostError> {
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
                minify: false,
                targets: self.targets,
                ..PrinterOptions::default()
            })
            .map_err(|e| css_error(e.to_string()))?;

        Ok(result.code)
    }

    /// Rewrites `path` in place.
    pub fn prefix_file(&self, path: &Utf8Path) -> Result<(), PostError> {
        let source = read_required(path)?;
        let prefixed = self.prefix_css(&source, path)?;
        fs::write(path, prefixed)?;

        tracing::debug!(%path, "prefixed");
        Ok(())
    }
}

/// Resolves browserslist queries into `lightningcss` targets.
pub(crate) fn targets<S: AsRef<str>>(queries: &[S]) -> Result<Targets, PostError> {
    let browsers = Browsers::from_browserslist(queries.iter().map(AsRef::as_ref)).map_err(|e| {
        PostError::Targets(
            queries.iter().map(|q| q.as_ref().to_string()).collect(),
            e.to_string(),
        )
    })?;

    Ok(Targets {
        browsers,
        ..Targets::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prefixer() -> Prefixer {
        Prefixer::new(&["last 2 versions"]).unwrap()
    }

    #[test]
    fn test_adds_vendor_prefix() {
        let css = prefixer()
            .prefix_css(".a { user-select: none; }", Utf8Path::new("a.css"))
            .unwrap();

        assert!(css.contains("-webkit-user-select: none"));
        assert!(css.contains("user-select: none"));
    }

    #[test]
    fn test_is_idempotent() {
        let prefixer = prefixer();
        let source = ".a { user-select: none; }\n.b { appearance: none; }\n";
        let path = Utf8Path::new("a.css");

        let once = prefixer.prefix_css(source, path).unwrap();
        let twice = prefixer.prefix_css(&once, path).unwrap();

        assert_eq!(once, twice);
    }

    #[test]
    fn test_unknown_properties_pass_through() {
        let css = prefixer()
            .prefix_css(".a { rivet-made-up: 12px wide; }", Utf8Path::new("a.css"))
            .unwrap();

        assert!(css.contains("rivet-made-up: 12px wide"));
    }

    #[test]
    fn test_missing_file() {
        let err = prefixer()
            .prefix_file(Utf8Path::new("definitely/not/here.css"))
            .unwrap_err();

        assert!(matches!(err, PostError::NotFound(_)));
    }

    #[test]
    fn test_invalid_query() {
        let err = Prefixer::new(&["rivetbrowser 12"]).unwrap_err();
        assert!(matches!(err, PostError::Targets(..)));
    }
}
