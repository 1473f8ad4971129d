//! Post-processing of released CSS.
//!
//! The chain runs over one stylesheet named after the project:
//!
//! 1. [`copy`]: the compiled CSS tree is copied into the release directory,
//! 2. [`prefix`]: `<name>.css` gets vendor prefixes, in place,
//! 3. [`minify`]: `<name>.min.css` is derived from it,
//! 4. [`header`]: both files get the license banner.
//!
//! Prefix and minify share `<name>.css`, the first writes what the second
//! reads, so they never run concurrently.

pub mod copy;
pub mod header;
pub mod minify;
pub mod prefix;

use std::fs;

use camino::{Utf8Path, Utf8PathBuf};

use crate::error::PostError;

pub use crate::post::copy::copy_css;
pub use crate::post::header::Banner;
pub use crate::post::minify::Minifier;
pub use crate::post::prefix::Prefixer;

/// Locations of the versioned stylesheet inside the release directory.
#[derive(Debug, Clone)]
pub struct ReleaseCss {
    pub dir: Utf8PathBuf,
    pub name: String,
}

impl ReleaseCss {
    pub fn new(dir: impl Into<Utf8PathBuf>, name: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            name: name.into(),
        }
    }

    /// `<dir>/<name>.css`
    pub fn main(&self) -> Utf8PathBuf {
        self.dir.join(format!("{}.css", self.name))
    }

    /// `<dir>/<name>.min.css`
    pub fn minified(&self) -> Utf8PathBuf {
        min_path(&self.main())
    }
}

/// Inserts `.min` before the extension: `a/b.css` → `a/b.min.css`.
pub fn min_path(path: &Utf8Path) -> Utf8PathBuf {
    match path.extension() {
        Some(ext) => path.with_extension(format!("min.{ext}")),
        None => path.with_extension("min"),
    }
}

/// Reads a file which an earlier step was supposed to produce.
pub(crate) fn read_required(path: &Utf8Path) -> Result<String, PostError> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(text),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(PostError::NotFound(path.to_owned()))
        }
        Err(e) => Err(PostError::Io(e)),
    }
}
