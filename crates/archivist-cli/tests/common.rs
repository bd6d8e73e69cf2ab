#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::assert::Assert;
use serde_json::Value;
use tempfile::TempDir;

/// Builds a two-patch `us` archive plus a config file pointing at it.
pub fn prepare_archive(prefix: &str) -> (TempDir, PathBuf) {
    let temp = tempfile::Builder::new()
        .prefix(prefix)
        .tempdir()
        .expect("tempdir");
    let root = temp.path().join("archive");
    write(&root, "original/game.ini", b"base ini");
    write(&root, "us/ps0001-15-1-2008/data/Item.SAH", b"items v1");
    write(&root, "us/ps0001-15-1-2008/data/patch0001.patch", b"diff");
    write(&root, "us/ps0002-2-2-2008/sysmsg-uni.txt", b"hello");

    let config = temp.path().join("archivist.toml");
    fs::write(
        &config,
        format!(
            r#"root = "{root}"
database = "{database}"

[original]
path = "original"
date = "2007-12-18"
distributions = ["us"]

[[distribution]]
code = "us"
path = "us"
"#,
            root = root.display(),
            database = temp.path().join("index.sqlite").display(),
        ),
    )
    .expect("write config");
    (temp, config)
}

pub fn write(root: &Path, relative: &str, contents: &[u8]) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().expect("parent")).expect("create dirs");
    fs::write(path, contents).expect("write fixture");
}

pub fn parse_json(assert: &Assert) -> Value {
    serde_json::from_slice(&assert.get_output().stdout).expect("valid json")
}
