//! Registry file-format compatibility, error-message and atomic-write tests.

use assert_fs::prelude::*;
use ngxctl_core::{
    paths,
    registry::{self, RegistryStore},
    types::{ConfigId, InstanceRecord, ProcessId, Role},
    RegistryError,
};
use predicates::prelude::predicate;
use std::fs;

/// A registry as written by earlier tooling (four-space indent, insertion order by pid).
const LEGACY_REGISTRY: &str = r#"{
    "111": {
        "port": 80,
        "config_file": "custom_a.conf",
        "type": "master",
        "start_time": "2024-01-01 00:00:00"
    },
    "112": {
        "port": 80,
        "config_file": "custom_a.conf",
        "type": "worker",
        "start_time": "2024-01-01 00:00:00"
    }
}"#;

// ---------------------------------------------------------------------------
// 1. Format compatibility
// ---------------------------------------------------------------------------

#[test]
fn legacy_registry_loads() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let file = home.child(".ngxctl/nginx_pids.json");
    file.write_str(LEGACY_REGISTRY).expect("write");

    let loaded = registry::load(file.path()).expect("load");
    assert_eq!(loaded.len(), 2);
    let master = &loaded[&ProcessId(111)];
    assert_eq!(master.role, Role::Primary);
    assert_eq!(master.listen_port, 80);
    assert_eq!(master.config, ConfigId::from("custom_a.conf"));
    assert_eq!(loaded[&ProcessId(112)].role, Role::Secondary);
}

#[test]
fn save_of_load_is_byte_identical() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let file = home.child(".ngxctl/nginx_pids.json");
    file.write_str(LEGACY_REGISTRY).expect("write");

    let loaded = registry::load(file.path()).expect("load");
    registry::save(file.path(), &loaded).expect("save");

    file.assert(LEGACY_REGISTRY);
}

#[test]
fn flush_without_mutation_is_a_no_op() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let file = home.child(".ngxctl/nginx_pids.json");
    file.write_str(LEGACY_REGISTRY).expect("write");

    let store = RegistryStore::open(file.path()).expect("open");
    store.flush().expect("flush");
    file.assert(LEGACY_REGISTRY);
}

// ---------------------------------------------------------------------------
// 2. Load error messages
// ---------------------------------------------------------------------------

#[test]
fn load_corrupt_json_returns_corrupt_with_path() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let file = home.child("nginx_pids.json");
    file.write_str("{\"111\": {\"port\": 80,").expect("write");

    let err = registry::load(file.path()).unwrap_err();
    assert!(matches!(err, RegistryError::Corrupt { .. }), "got: {err}");
    assert!(err.to_string().contains("nginx_pids.json"));
}

#[test]
fn load_wrong_shape_returns_corrupt() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let file = home.child("nginx_pids.json");
    file.write_str("[1, 2, 3]").expect("write");

    let err = registry::load(file.path()).unwrap_err();
    assert!(err.is_corrupt(), "got: {err}");
}

#[test]
fn load_non_numeric_key_returns_corrupt() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let file = home.child("nginx_pids.json");
    file.write_str(concat!(
        r#"{"abc": {"port": 80, "config_file": "c.conf", "#,
        r#""type": "master", "start_time": "2024-01-01 00:00:00"}}"#,
    ))
    .expect("write");

    assert!(registry::load(file.path()).unwrap_err().is_corrupt());
}

#[test]
fn load_directory_in_place_of_file_returns_corrupt() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let dir = home.child("nginx_pids.json");
    dir.create_dir_all().expect("mkdir");

    assert!(registry::load(dir.path()).unwrap_err().is_corrupt());
}

// ---------------------------------------------------------------------------
// 3. Atomic write safety
// ---------------------------------------------------------------------------

#[test]
fn mid_write_crash_leaves_original_intact() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let path = paths::registry_path(home.path());

    let mut store = RegistryStore::open(&path).expect("open");
    store
        .upsert(
            ProcessId(4242),
            InstanceRecord::new(
                Role::Primary,
                8080,
                ConfigId::from("custom_site.conf"),
                ngxctl_core::types::local_now(),
            ),
        )
        .expect("upsert");
    let original_bytes = fs::read(&path).expect("read original");

    // Simulate crash: .tmp written but process died before rename
    let tmp = registry::tmp_path(&path);
    fs::write(&tmp, b"CRASH - INCOMPLETE WRITE").expect("write crash tmp");

    assert_eq!(original_bytes, fs::read(&path).expect("read after crash"));
    let reopened = RegistryStore::open(&path).expect("reopen ignores orphan tmp");
    assert!(reopened.contains(ProcessId(4242)));
}

#[test]
fn store_writes_to_home_layout() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let mut store = RegistryStore::open(paths::registry_path(home.path())).expect("open");
    store.clear().expect("clear");

    home.child(".ngxctl/nginx_pids.json").assert(predicate::path::exists());
    home.child(".ngxctl/nginx_pids.json").assert("{}");
}
