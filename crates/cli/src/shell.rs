//! Command interpreter behind the REPL.
//!
//! Two groups of commands share one session:
//!
//! ```text
//! ADD name lsn           Register a named snapshot at `lsn` (persisted)
//! DEL name               Drop a named snapshot (persisted)
//! LIST                   Print every snapshot and its LSN
//! VLSN                   Print the smallest LSN still referenced
//! PUT src key lsn value  Write a version into merge source `src`
//! TOMB src key lsn       Write a tombstone into merge source `src`
//! SCAN [ASC|DESC|ANY]    Merge all sources and print the winners
//! SOURCES                Print per-source version and duplicate counts
//! CLEAR [src]            Empty one source, or all of them
//! HELP                   Print this list
//! EXIT / QUIT            Leave the shell
//! ```
//!
//! Source 0 has the highest priority. `PUT`/`TOMB` refuse writes that would
//! give a lower-priority source a newer version of a key than a
//! higher-priority one, since the merge treats that as a broken contract.

use anyhow::{anyhow, bail, Result};
use memtable::Memtable;
use merge::{Direction, MemtableSource, MergeIterator, MergeSourceSet};
use snapshot::SnapshotLog;

use crate::store::SnapshotStore;

pub const HELP: &str = "Commands: ADD name lsn | DEL name | LIST | VLSN\n          \
PUT src key lsn value | TOMB src key lsn | SCAN [ASC|DESC|ANY]\n          \
SOURCES | CLEAR [src] | HELP | EXIT";

/// What the REPL should do after a command.
#[derive(Debug, PartialEq, Eq)]
pub enum Reply {
    Text(String),
    Exit,
}

pub struct Shell {
    store: SnapshotStore,
    snapshot: SnapshotLog,
    sources: Vec<Memtable>,
    scan: Direction,
}

impl Shell {
    pub fn new(store: SnapshotStore, snapshot: SnapshotLog, sources: usize, scan: Direction) -> Self {
        Self {
            store,
            snapshot,
            sources: (0..sources).map(|_| Memtable::new()).collect(),
            scan,
        }
    }

    pub fn snapshot(&self) -> &SnapshotLog {
        &self.snapshot
    }

    /// Runs one input line. Errors are reported as `ERR ...` text, never
    /// propagated, so a bad command does not end the session.
    pub fn execute(&mut self, line: &str) -> Option<Reply> {
        let mut parts = line.split_whitespace();
        let cmd = parts.next()?;
        let args: Vec<&str> = parts.collect();

        let result = match cmd.to_uppercase().as_str() {
            "ADD" => self.add(&args),
            "DEL" => self.del(&args),
            "LIST" => Ok(self.list()),
            "VLSN" => Ok(self.vlsn()),
            "PUT" => self.put(&args),
            "TOMB" => self.tomb(&args),
            "SCAN" => self.scan(&args),
            "SOURCES" => Ok(self.describe_sources()),
            "CLEAR" => self.clear(&args),
            "HELP" => Ok(HELP.to_string()),
            "EXIT" | "QUIT" => return Some(Reply::Exit),
            other => Err(anyhow!("unknown command: {}", other)),
        };

        Some(Reply::Text(match result {
            Ok(text) => text,
            Err(e) => format!("ERR {:#}", e),
        }))
    }

    // -------------------- Snapshot commands --------------------

    fn add(&mut self, args: &[&str]) -> Result<String> {
        let [name, lsn] = args else {
            bail!("usage: ADD name lsn");
        };
        let lsn = parse_lsn(lsn)?;
        let next = self.snapshot.add(lsn, name)?;
        self.store.save(&next)?;
        self.snapshot = next;
        Ok(format!("OK (vlsn={})", self.snapshot.vlsn()))
    }

    fn del(&mut self, args: &[&str]) -> Result<String> {
        let [name] = args else {
            bail!("usage: DEL name");
        };
        let next = self.snapshot.delete(name)?;
        self.store.save(&next)?;
        self.snapshot = next;
        Ok(format!("OK ({} left)", self.snapshot.len()))
    }

    fn list(&self) -> String {
        if self.snapshot.is_empty() {
            return "(empty)".to_string();
        }
        let mut out: Vec<String> = self
            .snapshot
            .records()
            .map(|r| format!("{} @ {}", r.name_lossy(), r.lsn))
            .collect();
        out.push(format!("({} snapshots)", self.snapshot.len()));
        out.join("\n")
    }

    fn vlsn(&self) -> String {
        match self.snapshot.vlsn() {
            u64::MAX => "none".to_string(),
            lsn => lsn.to_string(),
        }
    }

    // -------------------- Merge commands --------------------

    fn put(&mut self, args: &[&str]) -> Result<String> {
        let [src, key, lsn, value @ ..] = args else {
            bail!("usage: PUT src key lsn value");
        };
        if value.is_empty() {
            bail!("usage: PUT src key lsn value");
        }
        let (src, lsn) = self.check_write(src, key, lsn)?;
        self.sources[src].put(key.as_bytes().to_vec(), value.join(" ").into_bytes(), lsn);
        Ok("OK".to_string())
    }

    fn tomb(&mut self, args: &[&str]) -> Result<String> {
        let [src, key, lsn] = args else {
            bail!("usage: TOMB src key lsn");
        };
        let (src, lsn) = self.check_write(src, key, lsn)?;
        self.sources[src].delete(key.as_bytes().to_vec(), lsn);
        Ok("OK".to_string())
    }

    /// Validates a write against source priority.
    fn check_write(&self, src: &str, key: &str, lsn: &str) -> Result<(usize, u64)> {
        let src = self.parse_source(src)?;
        let lsn = parse_lsn(lsn)?;

        if let Some(existing) = self.sources[src].get_entry(key.as_bytes()) {
            if existing.lsn >= lsn {
                bail!("source {} already holds {} at lsn {}", src, key, existing.lsn);
            }
        }
        for (i, mem) in self.sources.iter().enumerate() {
            let Some(other) = mem.get_entry(key.as_bytes()) else {
                continue;
            };
            if (i < src && other.lsn <= lsn) || (i > src && other.lsn >= lsn) {
                bail!(
                    "lsn {} for {} in source {} breaks priority against lsn {} in source {}",
                    lsn,
                    key,
                    src,
                    other.lsn,
                    i
                );
            }
        }
        Ok((src, lsn))
    }

    fn scan(&mut self, args: &[&str]) -> Result<String> {
        let direction = match args {
            [] => self.scan,
            [raw] => config::parse_direction(raw).ok_or_else(|| anyhow!("unknown direction: {}", raw))?,
            _ => bail!("usage: SCAN [ASC|DESC|ANY]"),
        };

        let mut set: MergeSourceSet<_> = self
            .sources
            .iter_mut()
            .map(|mem| MemtableSource::new(mem, direction))
            .collect();
        let mut iter = MergeIterator::open(&mut set, direction);
        let versions = iter.collect_all();
        let duplicates = iter.duplicates();

        if versions.is_empty() {
            return Ok("(empty)".to_string());
        }
        let mut out: Vec<String> = versions
            .iter()
            .map(|v| match v.value() {
                Some(value) => format!(
                    "{} -> {} @ {}",
                    String::from_utf8_lossy(v.key()),
                    String::from_utf8_lossy(value),
                    v.lsn()
                ),
                None => format!("{} (tombstone) @ {}", String::from_utf8_lossy(v.key()), v.lsn()),
            })
            .collect();
        out.push(format!("({} entries, {} duplicates)", versions.len(), duplicates));
        Ok(out.join("\n"))
    }

    fn describe_sources(&self) -> String {
        self.sources
            .iter()
            .enumerate()
            .map(|(i, mem)| {
                let flagged = mem.iter().filter(|v| v.is_duplicate()).count();
                format!("src {}: {} versions, {} duplicates", i, mem.len(), flagged)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn clear(&mut self, args: &[&str]) -> Result<String> {
        match args {
            [] => self.sources.iter_mut().for_each(Memtable::clear),
            [src] => {
                let src = self.parse_source(src)?;
                self.sources[src].clear();
            }
            _ => bail!("usage: CLEAR [src]"),
        }
        Ok("OK".to_string())
    }

    fn parse_source(&self, raw: &str) -> Result<usize> {
        let src: usize = raw
            .parse()
            .map_err(|_| anyhow!("invalid source index: {}", raw))?;
        if src >= self.sources.len() {
            bail!("source {} out of range (0..{})", src, self.sources.len());
        }
        Ok(src)
    }
}

fn parse_lsn(raw: &str) -> Result<u64> {
    raw.parse().map_err(|_| anyhow!("invalid lsn: {}", raw))
}
