mod commands;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use clap::Parser;
use postversion_core::{Options, VersionConfig};
use postversion_store::{Repository, RepositoryStore};
use tracing_subscriber::EnvFilter;

use commands::{Command, Session};

#[derive(Parser)]
#[command(name = "postversion", about = "Version control for posts")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Directory holding the repository state
    #[arg(long, default_value = "postversion-data")]
    store: PathBuf,

    /// YAML options file
    #[arg(long, default_value = "postversion.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(io::stderr)
        .init();

    let mut store = RepositoryStore::open(&cli.store)?;
    let repo = store.load()?;
    let options = Options::load(&cli.config)?.validated(|ty| repo.supports_history(ty));
    tracing::debug!(post_types = ?options.post_types, "loaded options");

    let mut session = Session::new(repo, VersionConfig::new(options));
    let stdout = io::stdout();
    let mut out = stdout.lock();
    if session.run(cli.command, &mut out, &mut prompt)? {
        store.save(session.repo())?;
    }
    Ok(())
}

/// Ask a yes/no question on the terminal.
fn prompt(question: &str) -> io::Result<bool> {
    let mut stderr = io::stderr();
    write!(stderr, "{question} [y/n] ")?;
    stderr.flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}
