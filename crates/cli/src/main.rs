//! # CLI - snapshot log & merge shell
//!
//! A REPL-style interface over a persisted snapshot log and a set of
//! in-memory merge sources. Reads commands from stdin and prints results to
//! stdout, so it works interactively and with piped scripts alike. See
//! [`shell`] for the command list.
//!
//! ## Configuration
//!
//! ```text
//! SDSS_SNAPSHOT_PATH  snapshot log file            (default: "snapshot.sdss")
//! SDSS_SOURCES        merge playground sources     (default: 2)
//! SDSS_SCAN           default scan direction       (default: "asc")
//! SDSS_LOG            tracing filter directive     (default: "warn")
//! ```
//!
//! ## Example
//!
//! ```text
//! $ cargo run -p cli
//! sdss shell (snapshot=snapshot.sdss, snapshots=0, sources=2, scan=Asc)
//! > ADD nightly 40
//! OK (vlsn=40)
//! > PUT 0 k 9 new
//! OK
//! > PUT 1 k 3 old
//! OK
//! > SCAN
//! k -> new @ 9
//! (1 entries, 1 duplicates)
//! > EXIT
//! bye
//! ```

mod shell;
mod store;

use anyhow::{Context, Result};
use config::CliConfig;
use shell::{Reply, Shell, HELP};
use std::io::{self, BufRead, Write};
use store::SnapshotStore;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let cfg = CliConfig::from_env().context("invalid configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_filter))
        .with_writer(io::stderr)
        .init();

    let store = SnapshotStore::new(&cfg.snapshot_path);
    let snapshot = store.load()?;

    println!(
        "sdss shell (snapshot={}, snapshots={}, sources={}, scan={:?})",
        store.path().display(),
        snapshot.len(),
        cfg.sources,
        cfg.scan
    );
    println!("{}", HELP);

    let mut shell = Shell::new(store, snapshot, cfg.sources, cfg.scan);

    print!("> ");
    io::stdout().flush().ok();

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        match shell.execute(&line) {
            Some(Reply::Text(text)) => println!("{}", text),
            Some(Reply::Exit) => {
                println!("bye");
                break;
            }
            None => {}
        }

        print!("> ");
        io::stdout().flush().ok();
    }

    Ok(())
}
