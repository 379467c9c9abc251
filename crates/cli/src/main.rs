//! # CLI - ShoalKV interactive shell
//!
//! A REPL over the write path: commands are turned into write batches,
//! appended to the WAL, then applied to the memtable. Reads are served from
//! the memtable. Works interactively or with commands piped through stdin.
//!
//! ## Commands
//!
//! ```text
//! PUT key value      Insert or update a key (value may contain spaces)
//! DEL key            Delete a key (writes a tombstone)
//! GET key            Look up a key (prints value or "(nil)")
//! SCAN               List every live key in order
//! BEGIN              Start grouping PUT/DEL into one batch
//! COMMIT             Write the grouped batch atomically
//! ABORT              Discard the grouped batch
//! STATS              Print store debug info
//! EXIT / QUIT        Shut down
//! ```
//!
//! ## Configuration
//!
//! See the `config` crate for the `SHOAL_*` environment variables. Logs go
//! to stderr, filtered by `SHOAL_LOG`.
//!
//! ## Example
//!
//! ```text
//! $ cargo run -p cli
//! ShoalKV started (seq=0, wal=wal.log, sync=true, replayed=0)
//! > PUT name Alice
//! OK
//! > GET name
//! Alice
//! > EXIT
//! bye
//! ```

mod engine;

use anyhow::Result;
use batch::WriteBatch;
use config::Config;
use engine::Store;
use std::io::{self, BufRead, Write};
use tracing_subscriber::EnvFilter;

fn init_logging(filter: &str) {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn main() -> Result<()> {
    let cfg = Config::from_env();
    init_logging(&cfg.log_filter);

    let mut store = Store::open(&cfg)?;
    // Operations queued between BEGIN and COMMIT.
    let mut pending: Option<WriteBatch> = None;

    let replay = store.replay_stats();
    println!(
        "ShoalKV started (seq={}, wal={}, sync={}, replayed={})",
        store.last_sequence(),
        cfg.wal_path.display(),
        cfg.wal_sync,
        replay.batches
    );
    if replay.corrupt_records > 0 || replay.dropped_bytes > 0 || replay.truncated_bytes > 0 {
        println!(
            "warning: log damage skipped ({} corrupt records, {} bytes dropped, {} bytes truncated)",
            replay.corrupt_records, replay.dropped_bytes, replay.truncated_bytes
        );
    }
    println!("Commands: PUT key value | GET key | DEL key | SCAN");
    println!("          BEGIN | COMMIT | ABORT | STATS | EXIT");
    print!("> ");
    io::stdout().flush().ok();

    let stdin = io::stdin();

    for line in stdin.lock().lines() {
        let line = line?;
        let mut parts = line.split_whitespace();
        if let Some(cmd) = parts.next() {
            match cmd.to_uppercase().as_str() {
                "PUT" | "SET" => {
                    let key = parts.next();
                    let value = parts.collect::<Vec<&str>>().join(" ");
                    match key {
                        Some(k) if !value.is_empty() => match pending.as_mut() {
                            Some(b) => {
                                b.put(k.as_bytes(), value.as_bytes());
                                println!("QUEUED");
                            }
                            None => match store.put(k.as_bytes(), value.as_bytes()) {
                                Ok(()) => println!("OK"),
                                Err(e) => println!("ERR put failed: {:#}", e),
                            },
                        },
                        _ => println!("ERR usage: PUT key value"),
                    }
                }
                "DEL" => match parts.next() {
                    Some(k) => match pending.as_mut() {
                        Some(b) => {
                            b.delete(k.as_bytes());
                            println!("QUEUED");
                        }
                        None => match store.delete(k.as_bytes()) {
                            Ok(()) => println!("OK"),
                            Err(e) => println!("ERR del failed: {:#}", e),
                        },
                    },
                    None => println!("ERR usage: DEL key"),
                },
                "GET" => match parts.next() {
                    Some(k) => match store.get(k.as_bytes()) {
                        Some(v) => println!("{}", String::from_utf8_lossy(&v)),
                        None => println!("(nil)"),
                    },
                    None => println!("ERR usage: GET key"),
                },
                "SCAN" => {
                    let results = store.scan();
                    if results.is_empty() {
                        println!("(empty)");
                    } else {
                        for (k, v) in &results {
                            println!(
                                "{} -> {}",
                                String::from_utf8_lossy(k),
                                String::from_utf8_lossy(v)
                            );
                        }
                        println!("({} entries)", results.len());
                    }
                }
                "BEGIN" => {
                    if pending.is_some() {
                        println!("ERR batch already open");
                    } else {
                        pending = Some(WriteBatch::new());
                        println!("OK");
                    }
                }
                "COMMIT" => match pending.take() {
                    Some(mut b) => {
                        let n = b.count();
                        match store.write(&mut b) {
                            Ok(()) => println!("OK ({} ops)", n),
                            Err(e) => println!("ERR commit failed: {:#}", e),
                        }
                    }
                    None => println!("ERR no open batch"),
                },
                "ABORT" => match pending.take() {
                    Some(b) => println!("OK ({} ops discarded)", b.count()),
                    None => println!("ERR no open batch"),
                },
                "STATS" => {
                    println!("{:?}", store);
                }
                "EXIT" | "QUIT" => {
                    if let Some(b) = &pending {
                        if !b.is_empty() {
                            println!("discarding {} uncommitted ops", b.count());
                        }
                    }
                    println!("bye");
                    break;
                }
                other => {
                    println!("unknown command: {}", other);
                }
            }
        }

        print!("> ");
        io::stdout().flush().ok();
    }

    Ok(())
}
