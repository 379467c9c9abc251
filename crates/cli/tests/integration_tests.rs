/// End-to-end tests for the ShoalKV shell.
/// Each test drives the binary through stdin against a fresh log.
use std::fs;
use std::path::Path;
use tempfile::tempdir;

/// Runs the shell with `commands` on stdin and returns its stdout.
fn run_cli_command(wal_path: &Path, command: &str) -> String {
    use std::io::Write;
    use std::process::{Command, Stdio};

    let mut child = Command::new(env!("CARGO_BIN_EXE_cli"))
        .env("SHOAL_WAL_PATH", wal_path.to_str().unwrap())
        .env("SHOAL_WAL_SYNC", "true")
        .env("SHOAL_ARENA_BLOCK", "1024")
        .env("SHOAL_LOG", "error")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to spawn CLI");

    {
        let stdin = child.stdin.as_mut().expect("Failed to open stdin");
        stdin
            .write_all(command.as_bytes())
            .expect("Failed to write to stdin");
        // The shell may already have exited on a QUIT.
        let _ = stdin.write_all(b"EXIT\n");
    }

    let output = child.wait_with_output().expect("Failed to read output");
    assert!(output.status.success(), "cli exited with {}", output.status);
    String::from_utf8_lossy(&output.stdout).to_string()
}

/// Strips the banner and prompts so each response can be compared exactly.
fn responses(output: &str) -> Vec<String> {
    output
        .lines()
        .skip_while(|l| !l.contains("BEGIN | COMMIT"))
        .skip(1)
        .map(|l| l.trim_start_matches("> ").to_string())
        .filter(|l| !l.is_empty())
        .collect()
}

#[test]
fn test_basic_put_get() {
    let dir = tempdir().unwrap();
    let wal_path = dir.path().join("wal.log");

    let output = run_cli_command(&wal_path, "PUT key1 value1\nGET key1\n");
    assert_eq!(responses(&output), ["OK", "value1", "bye"]);
}

#[test]
fn test_startup_banner() {
    let dir = tempdir().unwrap();
    let wal_path = dir.path().join("wal.log");

    let output = run_cli_command(&wal_path, "");
    assert!(output.starts_with("ShoalKV started (seq=0"));
}

#[test]
fn test_overwrite_key() {
    let dir = tempdir().unwrap();
    let wal_path = dir.path().join("wal.log");

    let commands = "PUT mykey oldvalue\nGET mykey\nPUT mykey newvalue\nGET mykey\n";
    let output = run_cli_command(&wal_path, commands);
    assert_eq!(
        responses(&output),
        ["OK", "oldvalue", "OK", "newvalue", "bye"]
    );
}

#[test]
fn test_delete_key() {
    let dir = tempdir().unwrap();
    let wal_path = dir.path().join("wal.log");

    let output = run_cli_command(&wal_path, "PUT k v\nDEL k\nGET k\n");
    assert_eq!(responses(&output), ["OK", "OK", "(nil)", "bye"]);
}

#[test]
fn test_value_with_spaces() {
    let dir = tempdir().unwrap();
    let wal_path = dir.path().join("wal.log");

    let output = run_cli_command(&wal_path, "PUT greeting hello big world\nGET greeting\n");
    assert!(output.contains("hello big world"));
}

#[test]
fn test_scan_in_key_order_without_tombstones() {
    let dir = tempdir().unwrap();
    let wal_path = dir.path().join("wal.log");

    let commands = "PUT c 3\nPUT a 1\nPUT b 2\nDEL b\nPUT a 10\nSCAN\n";
    let output = run_cli_command(&wal_path, commands);
    let r = responses(&output);
    let scan = &r[5..];
    assert_eq!(scan, ["a -> 10", "c -> 3", "(2 entries)", "bye"]);
}

#[test]
fn test_scan_empty() {
    let dir = tempdir().unwrap();
    let wal_path = dir.path().join("wal.log");

    let output = run_cli_command(&wal_path, "SCAN\n");
    assert!(output.contains("(empty)"));
}

#[test]
fn test_batch_commit() {
    let dir = tempdir().unwrap();
    let wal_path = dir.path().join("wal.log");

    let commands = "BEGIN\nPUT a 1\nPUT b 2\nDEL a\nGET b\nCOMMIT\nGET a\nGET b\n";
    let output = run_cli_command(&wal_path, commands);
    assert_eq!(
        responses(&output),
        ["OK", "QUEUED", "QUEUED", "QUEUED", "(nil)", "OK (3 ops)", "(nil)", "2", "bye"]
    );
}

#[test]
fn test_batch_abort_and_misuse() {
    let dir = tempdir().unwrap();
    let wal_path = dir.path().join("wal.log");

    let commands = "COMMIT\nBEGIN\nBEGIN\nPUT a 1\nABORT\nGET a\n";
    let output = run_cli_command(&wal_path, commands);
    assert_eq!(
        responses(&output),
        [
            "ERR no open batch",
            "OK",
            "ERR batch already open",
            "QUEUED",
            "OK (1 ops discarded)",
            "(nil)",
            "bye"
        ]
    );
}

#[test]
fn test_uncommitted_batch_is_lost_on_exit() {
    let dir = tempdir().unwrap();
    let wal_path = dir.path().join("wal.log");

    run_cli_command(&wal_path, "BEGIN\nPUT a 1\n");
    let output = run_cli_command(&wal_path, "GET a\n");
    assert!(output.contains("(nil)"));
}

#[test]
fn test_persistence_across_restarts() {
    let dir = tempdir().unwrap();
    let wal_path = dir.path().join("wal.log");

    run_cli_command(&wal_path, "PUT persist1 value1\nBEGIN\nPUT persist2 value2\nDEL persist1\nCOMMIT\n");
    assert!(fs::metadata(&wal_path).unwrap().len() > 0);

    let output = run_cli_command(&wal_path, "GET persist1\nGET persist2\n");
    assert!(output.starts_with("ShoalKV started (seq=3"));
    assert_eq!(responses(&output), ["(nil)", "value2", "bye"]);
}

#[test]
fn test_sequence_continues_after_restart() {
    let dir = tempdir().unwrap();
    let wal_path = dir.path().join("wal.log");

    run_cli_command(&wal_path, "PUT k old\n");
    run_cli_command(&wal_path, "PUT k new\n");
    let output = run_cli_command(&wal_path, "GET k\n");
    assert!(output.starts_with("ShoalKV started (seq=2"));
    assert!(output.contains("new"));
    assert!(!output.contains("old"));
}

#[test]
fn test_large_value_spans_log_blocks() {
    let dir = tempdir().unwrap();
    let wal_path = dir.path().join("wal.log");

    let large = "x".repeat(100_000);
    run_cli_command(&wal_path, &format!("PUT big {}\n", large));
    assert!(fs::metadata(&wal_path).unwrap().len() > 3 * 32 * 1024);

    let output = run_cli_command(&wal_path, "GET big\n");
    assert!(output.contains(&large));
}

#[test]
fn test_torn_tail_is_ignored() {
    let dir = tempdir().unwrap();
    let wal_path = dir.path().join("wal.log");

    run_cli_command(&wal_path, "PUT a 1\nPUT b 2\n");
    let bytes = fs::read(&wal_path).unwrap();
    fs::write(&wal_path, &bytes[..bytes.len() - 3]).unwrap();

    let output = run_cli_command(&wal_path, "GET a\nGET b\nPUT c 3\n");
    assert!(output.contains("bytes truncated"));
    assert_eq!(responses(&output), ["1", "(nil)", "OK", "bye"]);

    let output = run_cli_command(&wal_path, "GET a\nGET b\nGET c\n");
    assert!(output.starts_with("ShoalKV started (seq=2"));
    assert!(!output.contains("warning"));
    assert_eq!(responses(&output), ["1", "(nil)", "3", "bye"]);
}

#[test]
fn test_usage_errors() {
    let dir = tempdir().unwrap();
    let wal_path = dir.path().join("wal.log");

    let output = run_cli_command(&wal_path, "PUT\nPUT k\nGET\nDEL\nFROB\n");
    assert_eq!(
        responses(&output),
        [
            "ERR usage: PUT key value",
            "ERR usage: PUT key value",
            "ERR usage: GET key",
            "ERR usage: DEL key",
            "unknown command: FROB",
            "bye"
        ]
    );
}

#[test]
fn test_stats_output() {
    let dir = tempdir().unwrap();
    let wal_path = dir.path().join("wal.log");

    let output = run_cli_command(&wal_path, "PUT a 1\nSTATS\n");
    assert!(output.contains("Store"));
    assert!(output.contains("last_sequence: 1"));
}

#[test]
fn test_quit_command() {
    let dir = tempdir().unwrap();
    let wal_path = dir.path().join("wal.log");

    let output = run_cli_command(&wal_path, "QUIT\n");
    assert_eq!(responses(&output), ["bye"]);
}

#[test]
fn test_mixed_operations_stress() {
    let dir = tempdir().unwrap();
    let wal_path = dir.path().join("wal.log");

    let mut commands = String::new();
    for i in 0..200 {
        commands.push_str(&format!("PUT key{:03} value{}\n", i, i));
        if i % 3 == 0 {
            commands.push_str(&format!("DEL key{:03}\n", i));
        }
    }
    run_cli_command(&wal_path, &commands);

    let output = run_cli_command(&wal_path, "SCAN\nGET key000\nGET key001\n");
    assert!(output.contains("(133 entries)"));
    let r = responses(&output);
    assert_eq!(&r[r.len() - 3..], ["(nil)", "value1", "bye"]);
}

#[test]
fn test_damaged_record_is_reported_and_skipped() {
    let dir = tempdir().unwrap();
    let wal_path = dir.path().join("wal.log");

    run_cli_command(&wal_path, "PUT a 1\n");
    let mut bytes = fs::read(&wal_path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xff;
    fs::write(&wal_path, &bytes).unwrap();

    let output = run_cli_command(&wal_path, "GET a\nPUT b 2\nGET b\n");
    assert!(output.contains("warning: log damage skipped (1 corrupt records"));
    assert_eq!(responses(&output), ["(nil)", "OK", "2", "bye"]);

    let output = run_cli_command(&wal_path, "GET b\n");
    assert!(!output.contains("warning"));
    assert_eq!(responses(&output), ["2", "bye"]);
}
