#![cfg(not(target_arch = "wasm32"))]

use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

fn memmgr(dir: &Path) -> Command {
    let config = dir.join("config.json");
    if !config.exists() {
        fs::write(
            &config,
            r#"{
                "memmgr": { "dump_block_size": 64, "load_block_size": 64, "task_block_delay_ms": 0 },
                "symbols": { "sci_buf": 268435712 }
            }"#,
        )
        .unwrap();
    }
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_memmgr"));
    cmd.env_remove("RUST_LOG")
        .env("MEMMGR_CONFIG", &config)
        .env("MEMMGR_IMAGE", dir.join("image.json"));
    cmd
}

#[test]
fn poke_persists_between_invocations() {
    let dir = tempdir().unwrap();

    memmgr(dir.path())
        .args(["poke", "--addr", "sci_buf+4", "--width", "32", "--value", "0xdeadbeef"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Poke Command: Addr = 0x10000104"));

    memmgr(dir.path())
        .args(["peek", "--addr", "0x10000104", "--width", "32"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Data = 0xDEADBEEF"));
}

#[test]
fn fill_dump_zero_load_restores_memory() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("fill.dat");
    let file_arg = file.to_str().unwrap();

    memmgr(dir.path())
        .args(["fill", "--addr", "sci_buf", "--bytes", "64", "--pattern", "0xAA"])
        .assert()
        .success();
    memmgr(dir.path())
        .args(["dump", "--addr", "sci_buf", "--bytes", "64", "--file", file_arg])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"byte_count\":64"));
    memmgr(dir.path())
        .args(["fill", "--addr", "sci_buf", "--bytes", "64", "--pattern", "0"])
        .assert()
        .success();
    memmgr(dir.path())
        .args(["load", "--file", file_arg])
        .assert()
        .success();

    memmgr(dir.path())
        .args(["dump-event", "--addr", "sci_buf+48", "--bytes", "4"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Memory Dump: 0xAA 0xAA 0xAA 0xAA from address: 0x10000130",
        ));

    memmgr(dir.path())
        .args(["inspect", file_arg])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"name\": \"sci_buf\""));
}

#[test]
fn failures_exit_non_zero_with_events() {
    let dir = tempdir().unwrap();

    memmgr(dir.path())
        .args(["peek", "--addr", "0x10000002", "--width", "32"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("Peek command failed"));

    memmgr(dir.path())
        .args(["lookup", "missing_symbol"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing_symbol"));

    memmgr(dir.path())
        .args(["poke", "--addr", "0x20000000", "--type", "eeprom", "--width", "8", "--value", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("EEPROM writes are disabled"));
}

#[test]
fn status_reports_commands_from_earlier_invocations() {
    let dir = tempdir().unwrap();

    memmgr(dir.path())
        .args(["poke", "--addr", "0x10000000", "--width", "8", "--value", "1"])
        .assert()
        .success();
    memmgr(dir.path())
        .args(["peek", "--addr", "0x10000002", "--width", "32"])
        .assert()
        .failure();

    memmgr(dir.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"function\": \"poke\""))
        .stdout(predicate::str::contains("\"address\": 268435456"))
        .stdout(predicate::str::contains("\"valid_commands\": 1"))
        .stdout(predicate::str::contains("\"failed_commands\": 1"));
}

#[test]
fn eeprom_enable_is_remembered() {
    let dir = tempdir().unwrap();

    memmgr(dir.path())
        .args(["eeprom-enable", "--bank", "0"])
        .assert()
        .success();
    memmgr(dir.path())
        .args(["poke", "--addr", "0x20000010", "--type", "eeprom", "--width", "16", "--value", "0x1234"])
        .assert()
        .success();
    memmgr(dir.path())
        .args(["status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"durable_write_enabled\": true"));
}

#[test]
fn load_wid_checks_crc() {
    let dir = tempdir().unwrap();

    memmgr(dir.path())
        .args(["load-wid", "--addr", "sci_buf", "--data", "01020304", "--crc", "0x1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("CRC mismatch"));

    memmgr(dir.path())
        .args(["load-wid", "--addr", "sci_buf", "--data", "01020304"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote 4 bytes"));
}
