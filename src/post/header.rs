use std::fs;

use camino::Utf8Path;

use crate::config::Project;
use crate::error::PostError;
use crate::post::read_required;

/// License banner prepended to released stylesheets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Banner(String);

impl Banner {
    pub fn new(project: &Project) -> Self {
        Self(format!(
            "/*!\n *\n * Copyright (C) {year} {holder}\n * SPDX-License-Identifier: {license}\n\n * {name} - @version {version}\n */\n\n",
            year = project.year,
            holder = project.holder,
            license = project.license,
            name = project.name,
            version = project.version,
        ))
    }

    pub fn render(&self) -> &str {
        &self.0
    }

    /// Prepends the banner to `path`. Returns `false` when the file already
    /// starts with it and was left alone.
    pub fn stamp(&self, path: &Utf8Path) -> Result<bool, PostError> {
        let body = read_required(path)?;

        if body.starts_with(&self.0) {
            tracing::debug!(%path, "banner already present");
            return Ok(false);
        }

        let mut text = String::with_capacity(self.0.len() + body.len());
        text.push_str(&self.0);
        text.push_str(&body);
        fs::write(path, text)?;

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use camino::Utf8PathBuf;

    use super::*;

    fn demo() -> Project {
        Project {
            holder: "Rivet Authors".into(),
            year: 2024,
            license: "MIT".into(),
            ..Project::new("demo", "1.2.0")
        }
    }

    #[test]
    fn test_render_exact() {
        let banner = Banner::new(&demo());
        assert_eq!(
            banner.render(),
            "/*!\n *\n * Copyright (C) 2024 Rivet Authors\n * SPDX-License-Identifier: MIT\n\n * demo - @version 1.2.0\n */\n\n"
        );
    }

    #[test]
    fn test_stamp_once() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        let path = root.join("demo.css");
        fs::write(&path, ".a{color:red}").unwrap();

        let banner = Banner::new(&demo());
        assert!(banner.stamp(&path).unwrap());
        assert!(!banner.stamp(&path).unwrap());

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text.matches("demo - @version 1.2.0").count(), 1);
        assert!(text.ends_with("*/\n\n.a{color:red}"));
    }

    #[test]
    fn test_new_version_stacks() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        let path = root.join("demo.css");
        fs::write(&path, ".a{}").unwrap();

        Banner::new(&demo()).stamp(&path).unwrap();

        let mut next = demo();
        next.version = "1.3.0".into();
        assert!(Banner::new(&next).stamp(&path).unwrap());

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with(Banner::new(&next).render()));
    }

    #[test]
    fn test_missing_file() {
        let err = Banner::new(&demo())
            .stamp(Utf8Path::new("definitely/not/here.css"))
            .unwrap_err();

        assert!(matches!(err, PostError::NotFound(_)));
    }
}
