//! Project configuration.
//!
//! Everything is read from an optional `tasuki.toml` next to the project.
//! Every key has a default matching the layout of a typical documentation
//! site, so a project with only a `package.json` works out of the box:
//!
//! ```toml
//! [project]
//! holder  = "The Trustees of Indiana University"
//! year    = 2018
//! license = "BSD-3-Clause"
//!
//! [styles]
//! include = ["node_modules/rivet-uits/sass"]
//! ```

use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{Datelike, Utc};
use serde::Deserialize;

use crate::error::ConfigError;
use crate::tool::style::OutputStyle;

/// Name of the configuration file looked up by default.
pub const CONFIG_FILE: &str = "tasuki.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub project: ProjectSection,
    pub paths: Paths,
    pub styles: Styles,
    pub renderer: RendererConfig,
    pub release: Release,
    pub server: Server,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProjectSection {
    pub name: Option<String>,
    pub version: Option<String>,
    pub holder: Option<String>,
    pub year: Option<i32>,
    pub license: Option<String>,
    /// Where to read `name` and `version` from when they are not set here.
    pub manifest: Option<Utf8PathBuf>,
}

/// Directory layout of the project.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Paths {
    /// Root of the templates and Markdown sources.
    pub source: Utf8PathBuf,
    /// Root of the Sass sources.
    pub styles: Utf8PathBuf,
    /// Where the renderer writes HTML and the style compiler writes CSS.
    pub render: Utf8PathBuf,
    /// Where versioned release artifacts go.
    pub release: Utf8PathBuf,
}

impl Default for Paths {
    fn default() -> Self {
        Self {
            source: "src".into(),
            styles: "src/sass".into(),
            render: "docs".into(),
            release: "dist".into(),
        }
    }
}

impl Paths {
    /// Compiled CSS inside the render output.
    pub fn render_css(&self) -> Utf8PathBuf {
        self.render.join("css")
    }

    /// CSS inside the release output.
    pub fn release_css(&self) -> Utf8PathBuf {
        self.release.join("css")
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Styles {
    /// Extra search paths for `@import` / `@use`.
    pub include: Vec<Utf8PathBuf>,
    pub style: OutputStyle,
}

impl Default for Styles {
    fn default() -> Self {
        Self {
            include: vec!["node_modules/rivet-uits/sass".into()],
            style: OutputStyle::Expanded,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RendererConfig {
    /// Program and arguments for a one-shot render.
    pub command: Vec<String>,
    /// Arguments appended to `command` for the long-running watch mode.
    pub watch_args: Vec<String>,
    /// Prefix for every logged output line of the renderer.
    pub label: String,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            command: vec!["npx".into(), "eleventy".into()],
            watch_args: vec!["--watch".into()],
            label: "Eleventy".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Release {
    /// Browserslist queries the prefix step targets.
    pub browsers: Vec<String>,
}

impl Default for Release {
    fn default() -> Self {
        Self {
            browsers: vec!["last 2 versions".into()],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Server {
    /// HTTP port; `0` picks an ephemeral one.
    pub port: u16,
    /// Quiet period used to coalesce file-system events.
    pub debounce_ms: u64,
}

impl Default for Server {
    fn default() -> Self {
        Self {
            port: 3000,
            debounce_ms: 250,
        }
    }
}

impl Config {
    /// Reads `path` if it exists, otherwise returns the defaults.
    pub fn load(path: impl AsRef<Utf8Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!(%path, "no configuration file, using defaults");
            return Ok(Self::default());
        }

        let text = fs::read_to_string(path).map_err(|e| ConfigError::Read(path.to_owned(), e))?;
        Self::parse(path, &text)
    }

    pub(crate) fn parse(path: &Utf8Path, text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Toml(path.to_owned(), e))
    }

    /// Resolves the project metadata, filling the gaps from the package
    /// manifest (`package.json` by default).
    pub fn project(&self) -> Result<Project, ConfigError> {
        let section = &self.project;
        let manifest_path = section
            .manifest
            .clone()
            .unwrap_or_else(|| Utf8PathBuf::from("package.json"));

        let manifest = if section.name.is_none() || section.version.is_none() {
            Manifest::load(&manifest_path)?
        } else {
            None
        };

        let from_manifest = |pick: fn(&Manifest) -> Option<String>| manifest.as_ref().and_then(pick);

        let name = section
            .name
            .clone()
            .or_else(|| from_manifest(|m| m.name.clone()))
            .ok_or(ConfigError::Missing("name"))?;

        let version = section
            .version
            .clone()
            .or_else(|| from_manifest(|m| m.version.clone()))
            .ok_or(ConfigError::Missing("version"))?;

        Ok(Project {
            name,
            version,
            holder: section.holder.clone().unwrap_or_default(),
            year: section.year.unwrap_or_else(current_year),
            license: section
                .license
                .clone()
                .or_else(|| from_manifest(|m| m.license.clone()))
                .unwrap_or_else(|| "UNLICENSED".into()),
        })
    }
}

/// Metadata stamped into release artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub name: String,
    pub version: String,
    pub holder: String,
    pub year: i32,
    pub license: String,
}

impl Project {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            holder: String::new(),
            year: current_year(),
            license: "UNLICENSED".into(),
        }
    }
}

/// The subset of `package.json` we care about.
#[derive(Debug, Deserialize)]
struct Manifest {
    name: Option<String>,
    version: Option<String>,
    license: Option<String>,
}

impl Manifest {
    fn load(path: &Utf8Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }

        let text = fs::read_to_string(path).map_err(|e| ConfigError::Read(path.to_owned(), e))?;
        let manifest =
            serde_json::from_str(&text).map_err(|e| ConfigError::Json(path.to_owned(), e))?;

        Ok(Some(manifest))
    }
}

/// Year of the current UTC date.
fn current_year() -> i32 {
    Utc::now().year()
}
