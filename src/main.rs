use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::{Command, Workspace};

fn main() {
    let args = cli::Args::parse();

    let filter = if args.verbose { "ks=debug" } else { "ks=info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run(args) {
        eprintln!("Error: {err:#}");
        std::process::exit(cli::exit_code(&err));
    }
}

fn run(args: cli::Args) -> anyhow::Result<()> {
    let base_path = cli::resolve_base_path(args.base_path)?;
    let _span = tracing::debug_span!("ks", base_path = %base_path.display()).entered();
    let workspace = Workspace::open(base_path)?;

    match args.command {
        Command::Add { files } => cli::handle_add(&files, &workspace),
        Command::Search { query, k, json } => cli::handle_search(&query, k, json, &workspace),
        Command::Info {} => cli::handle_info(&workspace),
    }
}
