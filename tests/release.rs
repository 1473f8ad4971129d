#![cfg(unix)]

use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use tasuki::{Config, Mode, RunError, Runner, pipeline};

fn project(root: &Utf8Path, renderer: &str) -> Config {
    let mut config = Config::default();

    config.project.name = Some("demo".into());
    config.project.version = Some("1.2.0".into());
    config.project.holder = Some("Rivet Authors".into());
    config.project.year = Some(2024);
    config.project.license = Some("BSD-3-Clause".into());

    config.paths.source = root.join("src");
    config.paths.styles = root.join("src/sass");
    config.paths.render = root.join("docs");
    config.paths.release = root.join("dist");
    config.styles.include = vec![root.join("vendor")];

    config.renderer.command = vec!["sh".into(), "-c".into(), renderer.into()];
    config
}

fn write(path: &Utf8Path, text: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, text).unwrap();
}

fn scratch() -> (tempfile::TempDir, Utf8PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();

    write(
        &root.join("src/sass/demo.scss"),
        "@import \"base\";\n.demo { user-select: none; }\n",
    );
    write(&root.join("src/sass/_local.scss"), "$unused: 1;\n");
    write(&root.join("vendor/_base.scss"), "/* base */\n.base { margin: 0; }\n");

    (dir, root)
}

async fn release(config: Config) -> anyhow::Result<()> {
    let runner = Runner::new(pipeline::registry(config)?, Mode::Build)?;
    runner.run_named("release").await?;
    Ok(())
}

#[tokio::test]
async fn test_release_produces_stamped_css() {
    let (_dir, root) = scratch();
    let renderer = format!("mkdir -p '{}' && echo rendered", root.join("docs"));

    release(project(&root, &renderer)).await.unwrap();

    assert!(root.join("docs/css/demo.css").exists());
    assert!(!root.join("docs/css/_local.css").exists());

    let css = fs::read_to_string(root.join("dist/css/demo.css")).unwrap();
    let min = fs::read_to_string(root.join("dist/css/demo.min.css")).unwrap();

    for text in [&css, &min] {
        assert!(text.starts_with("/*!\n *\n * Copyright (C) 2024 Rivet Authors\n"));
        assert!(text.contains(" * SPDX-License-Identifier: BSD-3-Clause\n"));
        assert_eq!(text.matches("demo - @version 1.2.0").count(), 1);
        assert!(text.contains(".base"));
        assert!(text.contains("-webkit-user-select"));
    }

    assert!(min.len() < css.len());
    assert!(!min.contains("/* base */"));
}

#[tokio::test]
async fn test_release_twice_keeps_one_banner() {
    let (_dir, root) = scratch();
    let renderer = format!("mkdir -p '{}'", root.join("docs"));

    release(project(&root, &renderer)).await.unwrap();
    release(project(&root, &renderer)).await.unwrap();

    for name in ["demo.css", "demo.min.css"] {
        let text = fs::read_to_string(root.join("dist/css").join(name)).unwrap();
        assert_eq!(text.matches("SPDX-License-Identifier").count(), 1, "{name}");
    }
}

#[tokio::test]
async fn test_release_stops_at_renderer_failure() {
    let (_dir, root) = scratch();

    let err = release(project(&root, "exit 3")).await.unwrap_err();
    let err = err.downcast::<RunError>().unwrap();

    assert_eq!(err.task(), "eleventy");
    assert!(err.to_string().contains("status 3"));
    // nothing after the renderer ran
    assert!(!root.join("docs/css").exists());
    assert!(!root.join("dist").exists());
}

#[tokio::test]
async fn test_release_without_stylesheet_fails_with_not_found() {
    let (_dir, root) = scratch();
    let renderer = format!("mkdir -p '{}'", root.join("docs"));

    let mut config = project(&root, &renderer);
    config.project.name = Some("missing".into());

    let err = release(config).await.unwrap_err();
    let err = err.downcast::<RunError>().unwrap();

    assert_eq!(err.task(), "css:prefix");
    assert!(err.to_string().contains("missing.css"));
}
