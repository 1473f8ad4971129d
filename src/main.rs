use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::Parser;
use tasuki::{CONFIG_FILE, Config, Runner, pipeline};

/// Build tasks for a documentation site: render, compile styles, serve,
/// release.
#[derive(Parser, Debug, Clone)]
#[command(version)]
struct Args {
    /// Task to run.
    #[clap(index = 1, default_value = pipeline::DEFAULT_TASK)]
    task: String,

    /// Configuration file; missing means defaults.
    #[clap(long, default_value = CONFIG_FILE)]
    config: Utf8PathBuf,

    /// Dev server port, 0 picks a free one.
    #[clap(long)]
    port: Option<u16>,

    /// Print the registered tasks and exit.
    #[clap(long)]
    list: bool,

    /// Print the task graph as a Mermaid flowchart and exit.
    #[clap(long)]
    graph: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = tasuki::utils::init_logging() {
        eprintln!("couldn't set up logging: {e}");
    }

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    let mut config = Config::load(&args.config)?;
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let registry = pipeline::registry(config)?;

    if args.list {
        for (name, kind) in registry.tasks() {
            println!("{name:<16} {kind}");
        }
        return Ok(());
    }

    if args.graph {
        print!("{registry}");
        return Ok(());
    }

    let handle = registry.lookup(&args.task)?;
    let runner = Runner::new(registry, pipeline::mode_of(&args.task))?;

    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?
        .block_on(async move {
            let cancel = runner.cancel_token();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("shutting down");
                    cancel.cancel();
                }
            });

            let diagnostics = runner.run(handle).await?;
            tracing::info!("\n{}", diagnostics.summary(runner.registry()));
            anyhow::Ok(())
        })
}
