mod backend;
mod codec;
mod config;
mod daemon;
mod dispatcher;
mod frame;
mod geometry;
mod matcher;
mod paint;
mod preview;
mod provider;
mod surface;
mod types;
mod watcher;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use crate::daemon::{run_daemon, send_quit};
use crate::types::BackendKind;

fn parse_backend_required(args: &[String]) -> Result<BackendKind> {
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--backend" {
            if let Some(value) = iter.next() {
                return match value.as_str() {
                    "hyprland" => Ok(BackendKind::Hyprland),
                    _ => Err(anyhow::anyhow!("unknown backend: {value}")),
                };
            }
        }
    }
    Err(anyhow::anyhow!("missing --backend (hyprland)"))
}

fn init_logging(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    init_logging(args.iter().any(|arg| arg == "--debug"));

    if args.iter().any(|arg| arg == "--quit") {
        send_quit()?;
        return Ok(());
    }
    if args.iter().any(|arg| arg == "--daemon") {
        let backend = parse_backend_required(&args)?;
        run_daemon(backend)?;
        return Ok(());
    }

    eprintln!(
        "Usage: dockpeek --daemon --backend <name> [--debug]\n       dockpeek --quit\nSupported backends: hyprland"
    );
    Ok(())
}
