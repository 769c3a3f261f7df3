// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Build profiles keep panics unwinding so a panicking change handler
//! cannot take the whole process down.

#![allow(clippy::panic)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use yare::parameterized;

fn workspace_manifest() -> toml::Table {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../Cargo.toml");
    let text = std::fs::read_to_string(path).expect("workspace Cargo.toml");
    toml::from_str(&text).expect("valid manifest")
}

#[parameterized(
    dev = { "dev" },
    release = { "release" },
)]
fn profile_unwinds_on_panic(profile: &str) {
    let manifest = workspace_manifest();
    let strategy = manifest
        .get("profile")
        .and_then(|profiles| profiles.get(profile))
        .and_then(|table| table.get("panic"))
        .and_then(|value| value.as_str())
        .unwrap_or("unwind");
    assert_eq!(strategy, "unwind", "[profile.{profile}] must not abort on panic");
}

#[test]
fn tests_are_built_with_unwinding() {
    assert!(cfg!(panic = "unwind"));
}
