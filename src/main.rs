#[macro_use]
extern crate prettytable;

use anyhow::Context;
use routinely::{Database, Session};
use structopt::StructOpt;
use tracing_subscriber::EnvFilter;

mod cli;
mod config;
mod interface;

use cli::{Command::*, CommandLineArgs};
use config::Config;

fn init_logging(filter: &str) {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    // Get the command-line arguments.
    let CommandLineArgs {
        action,
        db_file,
        user,
        verbose,
    } = CommandLineArgs::from_args();

    let config = Config::resolve(db_file, user, verbose)?;
    init_logging(&config.log_filter);

    let database = Database::open(&config.db_path)?;
    let session = Session::login(&database, &config.username)
        .with_context(|| format!("Cannot act as user '{}', pick another with --user.", config.username))?;

    // Perform the action.
    match action {
        Task { cmd } => interface::task(&database, &session, cmd),
        Routine { cmd } => interface::routine(&database, &session, cmd),
        Tag { cmd } => interface::tag(&database, cmd),
        Generate { date } => interface::generate(&database, &session, date),
    }?;
    Ok(())
}
