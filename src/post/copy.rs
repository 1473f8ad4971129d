use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use rayon::iter::{IntoParallelIterator, ParallelIterator};

use crate::error::PostError;

/// Copies every `*.css` file below `from` into `to`, keeping the relative
/// layout. A missing `from` directory copies nothing.
pub fn copy_css(from: &Utf8Path, to: &Utf8Path) -> Result<Vec<Utf8PathBuf>, PostError> {
    if !from.is_dir() {
        tracing::warn!(%from, "nothing to copy, directory does not exist");
        return Ok(Vec::new());
    }

    let pattern = format!("{}/**/*.css", glob::Pattern::escape(from.as_str()));

    let mut sources = Vec::new();
    for path in glob::glob(&pattern)? {
        sources.push(Utf8PathBuf::try_from(path?)?);
    }

    let mut copied = sources
        .into_par_iter()
        .map(|source| -> Result<_, PostError> {
            let relative = source.strip_prefix(from).unwrap_or(source.as_path());
            let target = to.join(relative);

            if let Some(dir) = target.parent() {
                fs::create_dir_all(dir)?;
            }
            fs::copy(&source, &target)?;

            Ok(target)
        })
        .collect::<Result<Vec<_>, _>>()?;

    copied.sort();
    tracing::debug!(count = copied.len(), %to, "copied stylesheets");
    Ok(copied)
}
