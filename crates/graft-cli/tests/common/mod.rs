//! Shared test utilities for graft-cli integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;

/// Get a Command for the graft binary, isolated from the user's environment.
///
/// `HOME` points at `home` so that `~/.graft/config.yaml` is never the real
/// one.
#[allow(deprecated)]
pub fn graft_cmd(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("graft").expect("graft binary should exist");
    cmd.env("HOME", home)
        .env("NO_COLOR", "1")
        .env_remove("GRAFT_CONFIG")
        .env_remove("GRAFT_DATABASE_URL")
        .env_remove("GRAFT_VERBOSE")
        .env_remove("GRAFT_QUIET")
        .env_remove("GRAFT_COLOR");
    cmd
}

/// Write `content` to `dir/name` and return the path.
pub fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).expect("write fixture");
    path
}

/// Two people who know each other.
pub const TWO_PEOPLE: &str = r#"{
  "vertices": {
    "Person": [
      {"id": "p1", "name": "Alice"},
      {"id": "p2", "name": "Bob"}
    ]
  },
  "edges": {
    "KNOWS": [
      {"from": "p1", "to": "p2", "since": 2020}
    ]
  }
}"#;

/// An edge whose end vertex does not exist.
pub const DANGLING_EDGE: &str = r#"{
  "vertices": {
    "Person": [
      {"id": "p1", "name": "Alice"},
      {"id": "p2", "name": "Bob"}
    ]
  },
  "edges": {
    "KNOWS": [
      {"from": "p1", "to": "p2"},
      {"from": "p1", "to": "p9"}
    ]
  }
}"#;

/// Schema requiring a string `name` on every person.
pub const PERSON_SCHEMA: &str = r#"vertices:
  Person:
    properties:
      id:
        type: string
        required: true
      name:
        type: string
        required: true
edges:
  KNOWS:
    from: Person
    to: Person
"#;
