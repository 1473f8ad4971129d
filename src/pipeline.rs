//! The concrete tasks of a documentation site build.
//!
//! | task             | does                                                    |
//! |------------------|---------------------------------------------------------|
//! | `eleventy`       | one render of the site                                  |
//! | `eleventy:watch` | the renderer in its own watch mode                      |
//! | `sass`           | compiles the Sass tree into the render output           |
//! | `sass:watch`     | re-runs `sass` on style changes                         |
//! | `serve`          | dev server with live reload, re-runs `sass`/`eleventy`  |
//! | `css:copy`       | copies compiled CSS into the release directory          |
//! | `css:prefix`     | vendor prefixes `<name>.css`                            |
//! | `css:minify`     | writes `<name>.min.css`                                 |
//! | `css:header`     | stamps the license banner on both                       |
//! | `release`        | all of the above that produce files, in order           |
//! | `default`        | `eleventy:watch` and `serve` in parallel                |
//!
//! The watch tasks only exist with the `live` feature.

use std::sync::Arc;

use crate::config::Config;
use crate::engine::{Mode, Registry, TaskContext};
use crate::error::GraphError;
use crate::post::{Banner, Minifier, Prefixer, ReleaseCss, copy_css};
use crate::tool::render::Renderer;
use crate::tool::style::StyleCompiler;

/// Name of the task run when none is given.
pub const DEFAULT_TASK: &str = "default";

/// Long-running tasks run in watch mode, everything else is a one-off
/// build.
pub fn mode_of(task: &str) -> Mode {
    if task == DEFAULT_TASK || task == "serve" || task.ends_with(":watch") {
        Mode::Watch
    } else {
        Mode::Build
    }
}

/// Builds the task registry for a project.
///
/// Project metadata is resolved when a task needs it, so tasks which don't
/// (like `sass`) work in a project without a `package.json`.
pub fn registry(config: Config) -> Result<Registry, GraphError> {
    let config = Arc::new(config);
    let mut registry = Registry::new();

    let eleventy = {
        let renderer = Renderer::new(config.renderer.clone());
        registry.register("eleventy", move |_: TaskContext| {
            let renderer = renderer.clone();
            async move { anyhow::Ok(renderer.render().await?) }
        })?
    };

    let sass = {
        let config = config.clone();
        registry.register("sass", move |_: TaskContext| {
            let compiler = StyleCompiler::new(config.paths.styles.clone(), config.paths.render_css())
                .include(config.styles.include.iter().cloned())
                .style(config.styles.style);
            blocking(move || {
                let written = compiler.compile()?;
                tracing::info!("compiled {} stylesheet(s)", written.len());
                Ok(())
            })
        })?
    };

    let copy = {
        let config = config.clone();
        registry.register("css:copy", move |_: TaskContext| {
            let from = config.paths.render_css();
            let to = config.paths.release_css();
            blocking(move || {
                copy_css(&from, &to)?;
                Ok(())
            })
        })?
    };

    let prefix = {
        let config = config.clone();
        registry.register("css:prefix", move |_: TaskContext| {
            let config = config.clone();
            blocking(move || {
                let css = release_css(&config)?;
                Prefixer::new(config.release.browsers.as_slice())?.prefix_file(&css.main())?;
                Ok(())
            })
        })?
    };

    let minify = {
        let config = config.clone();
        registry.register("css:minify", move |_: TaskContext| {
            let config = config.clone();
            blocking(move || {
                let css = release_css(&config)?;
                Minifier::new(config.release.browsers.as_slice())?.minify_file(&css.main())?;
                Ok(())
            })
        })?
    };

    let header = {
        let config = config.clone();
        registry.register("css:header", move |_: TaskContext| {
            let config = config.clone();
            blocking(move || {
                let project = config.project()?;
                let css = ReleaseCss::new(config.paths.release_css(), &project.name);
                let banner = Banner::new(&project);
                for path in [css.main(), css.minified()] {
                    if !banner.stamp(&path)? {
                        tracing::info!("{path} already carries the banner");
                    }
                }
                Ok(())
            })
        })?
    };

    registry.sequence("release", [eleventy, sass, copy, prefix, minify, header])?;

    #[cfg(feature = "live")]
    live(&mut registry, &config, eleventy, sass)?;

    Ok(registry)
}

#[cfg(feature = "live")]
fn live(
    registry: &mut Registry,
    config: &Arc<Config>,
    eleventy: crate::engine::TaskHandle,
    sass: crate::engine::TaskHandle,
) -> Result<(), GraphError> {
    use std::time::Duration;

    use crate::live::{DevServer, Watcher};

    let debounce = Duration::from_millis(config.server.debounce_ms);
    let styles = format!("{}/**/*.scss", config.paths.styles);
    let sources = [
        format!("{}/**/*.md", config.paths.source),
        format!("{}/**/*.njk", config.paths.source),
    ];

    let eleventy_watch = {
        let renderer = Renderer::new(config.renderer.clone());
        registry.register("eleventy:watch", move |ctx: TaskContext| {
            let renderer = renderer.clone();
            async move { anyhow::Ok(renderer.watch(ctx.cancel.clone()).await?) }
        })?
    };

    {
        let watcher = Watcher::new(debounce).task([styles.clone()], sass);
        registry.register("sass:watch", move |ctx: TaskContext| {
            let watcher = watcher.clone();
            async move { anyhow::Ok(watcher.run(&ctx, None).await?) }
        })?;
    }

    let serve = {
        let server = DevServer::new(
            config.paths.render.clone(),
            config.server.port,
            Watcher::new(debounce)
                .task([styles], sass)
                .task(sources, eleventy),
        );
        registry.register("serve", move |ctx: TaskContext| server.clone().run(ctx))?
    };

    registry.parallel(DEFAULT_TASK, [eleventy_watch, serve])?;
    Ok(())
}

/// Release stylesheet paths for the configured project.
fn release_css(config: &Config) -> anyhow::Result<ReleaseCss> {
    let project = config.project()?;
    Ok(ReleaseCss::new(config.paths.release_css(), project.name))
}

/// Runs blocking work off the async threads.
async fn blocking<F>(work: F) -> anyhow::Result<()>
where
    F: FnOnce() -> anyhow::Result<()> + Send + 'static,
{
    tokio::task::spawn_blocking(work).await?
}
