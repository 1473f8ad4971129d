use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use serde::Deserialize;

use crate::error::StyleError;

/// Formatting of the compiled CSS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStyle {
    #[default]
    Expanded,
    Compressed,
}

impl From<OutputStyle> for grass::OutputStyle {
    fn from(style: OutputStyle) -> Self {
        match style {
            OutputStyle::Expanded => grass::OutputStyle::Expanded,
            OutputStyle::Compressed => grass::OutputStyle::Compressed,
        }
    }
}

/// Compiles a tree of Sass sources into CSS with `grass`.
///
/// Every `*.scss` file below `source` whose name does not start with an
/// underscore is an entry point; `source/x/y.scss` ends up in
/// `output/x/y.css`. Partials are only reachable through imports.
#[derive(Debug, Clone)]
pub struct StyleCompiler {
    pub source: Utf8PathBuf,
    pub output: Utf8PathBuf,
    pub include: Vec<Utf8PathBuf>,
    pub style: OutputStyle,
}

impl StyleCompiler {
    pub fn new(source: impl Into<Utf8PathBuf>, output: impl Into<Utf8PathBuf>) -> Self {
        Self {
            source: source.into(),
            output: output.into(),
            include: Vec::new(),
            style: OutputStyle::Expanded,
        }
    }

    pub fn include(mut self, paths: impl IntoIterator<Item = impl Into<Utf8PathBuf>>) -> Self {
        self.include.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn style(mut self, style: OutputStyle) -> Self {
        self.style = style;
        self
    }

    /// Entry points below the source root.
    pub fn entries(&self) -> Result<Vec<Utf8PathBuf>, StyleError> {
        let pattern = format!("{}/**/*.scss", glob::Pattern::escape(self.source.as_str()));

        let mut entries = Vec::new();
        for path in glob::glob(&pattern)? {
            let path = Utf8PathBuf::try_from(path?)?;
            if path.file_name().is_some_and(|name| !name.starts_with('_')) {
                entries.push(path);
            }
        }

        entries.sort();
        Ok(entries)
    }

    /// Output path for an entry point.
    pub fn target(&self, entry: &Utf8Path) -> Utf8PathBuf {
        let relative = entry.strip_prefix(&self.source).unwrap_or(entry);
        self.output.join(relative).with_extension("css")
    }

    /// Compiles every entry point. Entries compile independently: the good
    /// ones are written even when others fail, and a failing entry keeps
    /// whatever output it had before.
    pub fn compile(&self) -> Result<Vec<Utf8PathBuf>, StyleError> {
        let results: Vec<_> = self
            .entries()?
            .into_par_iter()
            .map(|entry| {
                let css = self.compile_one(&entry);
                (entry, css)
            })
            .collect();

        let mut written = Vec::new();
        let mut failures = Vec::new();

        for (entry, css) in results {
            match css {
                Ok(css) => {
                    let target = self.target(&entry);
                    if let Some(dir) = target.parent() {
                        fs::create_dir_all(dir)?;
                    }
                    fs::write(&target, css)?;
                    written.push(target);
                }
                Err(message) => {
                    tracing::error!(file = %entry, "{message}");
                    failures.push((entry, message));
                }
            }
        }

        if !failures.is_empty() {
            return Err(StyleError::Compile(failures));
        }

        tracing::debug!(count = written.len(), "compiled stylesheets");
        Ok(written)
    }

    fn compile_one(&self, entry: &Utf8Path) -> Result<String, String> {
        let options = self
            .include
            .iter()
            .fold(grass::Options::default(), |options, path| {
                options.load_path(path.as_std_path())
            })
            .style(self.style.into());

        grass::from_path(entry.as_std_path(), &options).map_err(|err| err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch() -> (tempfile::TempDir, Utf8PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        (dir, root)
    }

    fn write(path: &Utf8Path, text: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, text).unwrap();
    }

    #[test]
    fn test_import_from_include_path() {
        let (_dir, root) = scratch();
        write(
            &root.join("src/sass/a.scss"),
            "@import \"lib\";\n.a { color: red; }\n",
        );
        write(&root.join("vendor/_lib.scss"), ".lib { margin: 0; }\n");

        let compiler = StyleCompiler::new(root.join("src/sass"), root.join("docs/css"))
            .include([root.join("vendor")]);

        let written = compiler.compile().unwrap();
        assert_eq!(written, vec![root.join("docs/css/a.css")]);

        let outputs: Vec<_> = fs::read_dir(root.join("docs/css")).unwrap().collect();
        assert_eq!(outputs.len(), 1);

        let css = fs::read_to_string(root.join("docs/css/a.css")).unwrap();
        assert!(css.contains(".lib"));
        assert!(css.contains("margin: 0"));
        assert!(css.contains(".a"));
    }

    #[test]
    fn test_partials_are_not_entries() {
        let (_dir, root) = scratch();
        write(&root.join("sass/_vars.scss"), "$c: blue;\n");
        write(&root.join("sass/nested/b.scss"), "@import \"../vars\";\n.b { color: $c; }\n");

        let compiler = StyleCompiler::new(root.join("sass"), root.join("out"));
        assert_eq!(compiler.entries().unwrap(), vec![root.join("sass/nested/b.scss")]);

        compiler.compile().unwrap();
        let css = fs::read_to_string(root.join("out/nested/b.css")).unwrap();
        assert!(css.contains("color: blue"));
    }

    #[test]
    fn test_compressed_style() {
        let (_dir, root) = scratch();
        write(&root.join("sass/a.scss"), ".a {\n  color: red;\n}\n");

        StyleCompiler::new(root.join("sass"), root.join("out"))
            .style(OutputStyle::Compressed)
            .compile()
            .unwrap();

        let css = fs::read_to_string(root.join("out/a.css")).unwrap();
        assert_eq!(css.trim(), ".a{color:red}");
    }

    #[test]
    fn test_failure_keeps_previous_output() {
        let (_dir, root) = scratch();
        write(&root.join("sass/good.scss"), ".good { color: red; }\n");
        write(&root.join("sass/bad.scss"), ".bad { color: $undefined; }\n");
        write(&root.join("out/bad.css"), ".bad { color: green; }\n");

        let err = StyleCompiler::new(root.join("sass"), root.join("out"))
            .compile()
            .unwrap_err();

        let failures = match err {
            StyleError::Compile(failures) => failures,
            other => panic!("expected a compile error, got {other}"),
        };
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, root.join("sass/bad.scss"));
        assert!(failures[0].1.contains("Undefined variable"));

        assert!(root.join("out/good.css").exists());
        assert_eq!(
            fs::read_to_string(root.join("out/bad.css")).unwrap(),
            ".bad { color: green; }\n"
        );
    }
}
