//! # geohist
//!
//! Annotates way and relation versions with the child versions that were in
//! effect while each parent version was current, and lists every later child
//! change as an update.
//!
//! Child histories come from a `SQLite` database filled with `geohist import`,
//! or from a JSON document named by `GEOHIST_HISTORY_FILE`. Annotated
//! documents are written to stdout; logs go to stderr.

use anyhow::Result;
use std::env;
use std::path::Path;
use tracing_subscriber::EnvFilter;

mod config;
mod runtime;
mod store;

pub use config::CliConfig;
pub use runtime::Runtime;

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_help();
        return Ok(());
    }

    // Initialize logging
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match args[1].as_str() {
        "import" => {
            let path = file_arg(&args, "import <history.json>");
            let runtime = Runtime::new(CliConfig::from_env()?);
            let imported = runtime.import(path)?;
            println!("Imported {imported} versions");
        }
        "ways" => {
            let path = file_arg(&args, "ways <input.json>");
            let runtime = Runtime::new(CliConfig::from_env()?);
            cancel_on_interrupt(&runtime);
            let doc = runtime.ways(path).await?;
            println!("{}", doc.to_json()?);
        }
        "relations" => {
            let path = file_arg(&args, "relations <input.json>");
            let runtime = Runtime::new(CliConfig::from_env()?);
            cancel_on_interrupt(&runtime);
            let doc = runtime.relations(path).await?;
            println!("{}", doc.to_json()?);
        }
        "help" | "--help" | "-h" => {
            print_help();
        }
        cmd => {
            eprintln!("Unknown command: {cmd}");
            print_help();
            std::process::exit(1);
        }
    }

    Ok(())
}

fn file_arg<'a>(args: &'a [String], usage: &str) -> &'a Path {
    if let Some(path) = args.get(2) {
        Path::new(path)
    } else {
        eprintln!("Usage: geohist {usage}");
        std::process::exit(1);
    }
}

fn cancel_on_interrupt(runtime: &Runtime) {
    let cancel = runtime.cancel_signal();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling");
            cancel.cancel();
        }
    });
}

fn print_help() {
    println!(
        r"geohist

USAGE:
    geohist <COMMAND> <FILE>

COMMANDS:
    import <history.json>     Store every version in the document in the history database
    ways <input.json>         Annotate the ways of the document and print it
    relations <input.json>    Annotate the relations of the document and print it
    help                      Show this help message

ENVIRONMENT:
    GEOHIST_THRESHOLD_SECS    Minimum spacing between updates (default 1800)
    GEOHIST_CONCURRENCY       Maximum simultaneous history lookups (default 16)
    GEOHIST_DB_PATH           History database (default ./geohist.db)
    GEOHIST_HISTORY_FILE      Read histories from this JSON document instead
    GEOHIST_REQUIRE_VISIBLE   Fail on children absent at the parent's timestamp
    RUST_LOG                  Log filter (default info)

EXAMPLES:
    geohist import history.json
    GEOHIST_THRESHOLD_SECS=600 geohist ways ways.json > annotated.json
"
    );
}
