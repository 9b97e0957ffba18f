// SPDX-License-Identifier: GPL-3.0-only

//! Embeds the version printed by `multicam --version` as `GIT_VERSION`

use std::process::Command;

fn main() {
    println!("cargo::rerun-if-changed=.git/HEAD");
    println!("cargo::rerun-if-env-changed=MULTICAM_VERSION");

    let version = std::env::var("MULTICAM_VERSION")
        .ok()
        .filter(|v| !v.is_empty())
        .or_else(describe_head)
        .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string());

    println!("cargo::rustc-env=GIT_VERSION={}", version);
}

/// `git describe` of HEAD without the tag's `v` prefix, if this is a checkout
fn describe_head() -> Option<String> {
    let output = Command::new("git")
        .args(["describe", "--tags", "--always", "--dirty"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }

    let described = String::from_utf8(output.stdout).ok()?;
    let described = described.trim();
    Some(described.strip_prefix('v').unwrap_or(described).to_string())
}
