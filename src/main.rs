use std::path::PathBuf;

use anyhow::{Context, Result};

use glens::{Config, ConsoleSink, Harness, Invocation, runner};

const USAGE: &str = "usage: glens <project-dir> <module> [action...] [--tests=<pattern>] [-- gradle args...]";

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let invocation = parse_args(std::env::args().skip(1))?;
    let mut config = Config::load(&invocation.project_dir);
    config.apply_env(std::env::vars())?;

    let harness = Harness::new(runner::detect(), config);
    let mut sink = ConsoleSink::new(std::io::stdout());
    let mut out = std::io::stdout();
    let cancel = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::warn!("unable to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let outcome = harness
        .run_until(&invocation, &mut sink, &mut out, cancel)
        .await?;
    outcome.verdict()?;
    Ok(())
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Invocation> {
    let project_dir = args.next().map(PathBuf::from).context(USAGE)?;
    let module = args.next().context(USAGE)?;

    let mut invocation = Invocation::new(project_dir, module, Vec::new());
    while let Some(arg) = args.next() {
        if arg == "--" {
            invocation.arguments.extend(args.by_ref());
        } else if let Some(pattern) = arg.strip_prefix("--tests=") {
            invocation.test_filter = Some(pattern.to_string());
        } else {
            invocation.actions.push(arg);
        }
    }
    if invocation.actions.is_empty() {
        invocation.actions.push("testDebug".into());
    }
    Ok(invocation)
}
