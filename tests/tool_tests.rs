// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

#![cfg(feature = "tool")]

//! Integration tests for the `mer` CLI tool binary.
//!
//! These tests run the actual binary and verify its behavior.

use mercount::{dump::Writer, mer, Config};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Get the path to the mer binary
fn mer_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps
    path.push("mer");
    path
}

/// Run the mer binary with flags and CLI arguments
fn run_cli(dump_path: &Path, flags: &[&str], args: &[&str]) -> (String, String, bool) {
    let mut cmd_args = flags.to_vec();
    cmd_args.push(dump_path.to_str().unwrap());
    cmd_args.extend(args);

    let output = Command::new(mer_binary())
        .args(&cmd_args)
        .output()
        .expect("Failed to execute mer binary");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

/// Write a dump of 4-mers: ACGT x3, AAAA x1, TTTT x2
fn temp_dump() -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("counts");

    let array = Config::new(64, 8).reprobe_limit(15).seed(1).build().unwrap();
    array.add(mer::encode(b"ACGT").unwrap(), 3);
    array.add(mer::encode(b"AAAA").unwrap(), 1);
    array.add(mer::encode(b"TTTT").unwrap(), 2);

    let mut writer = Writer::for_array(&path, &array, 1).unwrap();
    writer.write_array(&array).unwrap();
    writer.finish().unwrap();

    (dir, path)
}

// ============================================================================
// CLI Command Tests
// ============================================================================

#[test]
fn test_cli_info() {
    let (_dir, path) = temp_dump();

    let (stdout, stderr, success) = run_cli(&path, &[], &["info"]);
    assert!(success, "info failed: {}", stderr);
    assert!(stdout.contains("key length:  8 bits"), "{}", stdout);
    assert!(stdout.contains("distinct:    3"), "{}", stdout);
    assert!(stdout.contains("total:       6"), "{}", stdout);
    assert!(stdout.contains("unique:      1"), "{}", stdout);
}

#[test]
fn test_cli_get() {
    let (_dir, path) = temp_dump();

    let acgt = mer::encode(b"ACGT").unwrap().to_string();

    let (stdout, stderr, success) = run_cli(&path, &[], &["get", "ACGT", "AAAA", "CCCC", &acgt]);
    assert!(success, "get failed: {}", stderr);

    let lines = stdout.lines().collect::<Vec<_>>();
    assert_eq!(
        vec!["ACGT 3", "AAAA 1", "CCCC 0", &format!("{acgt} 3")],
        lines
    );
}

#[test]
fn test_cli_get_canonical() {
    let (_dir, path) = temp_dump();

    // TTTT is stored as is, so folding it onto AAAA finds AAAA's count
    let (stdout, _, success) = run_cli(&path, &[], &["get", "TTTT"]);
    assert!(success);
    assert_eq!("TTTT 2", stdout.trim());

    let (stdout, _, success) = run_cli(&path, &[], &["get", "--canonical", "TTTT"]);
    assert!(success);
    assert_eq!("TTTT 1", stdout.trim());
}

#[test]
fn test_cli_get_invalid_key() {
    let (_dir, path) = temp_dump();

    let (_, stderr, success) = run_cli(&path, &[], &["get", "ACNT"]);
    assert!(!success);
    assert!(stderr.contains("Invalid key"), "{}", stderr);
}

#[test]
fn test_cli_get_wrong_mer_length() {
    let (_dir, path) = temp_dump();

    for key in ["ACG", "ACGTA"] {
        let (_, stderr, success) = run_cli(&path, &[], &["get", key]);
        assert!(!success, "{key} accepted");
        assert!(stderr.contains("Invalid key"), "{}", stderr);
    }
}

#[test]
fn test_cli_dump() {
    let (_dir, path) = temp_dump();

    let (stdout, stderr, success) = run_cli(&path, &["--buffered"], &["dump", "--mers"]);
    assert!(success, "dump failed: {}", stderr);

    let mut lines = stdout.lines().collect::<Vec<_>>();
    lines.sort_unstable();
    assert_eq!(vec!["AAAA 1", "ACGT 3", "TTTT 2"], lines);

    let (stdout, _, success) = run_cli(&path, &[], &["dump", "--limit", "2"]);
    assert!(success);
    assert_eq!(2, stdout.lines().count());
}

#[test]
fn test_cli_bad_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("garbage");
    std::fs::write(&path, b"this is not a dump file at all, not even close").unwrap();

    let (_, stderr, success) = run_cli(&path, &[], &["info"]);
    assert!(!success);
    assert!(stderr.contains("InvalidMagic") || stderr.contains("invalid magic"), "{}", stderr);
}
