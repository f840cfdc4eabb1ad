// SPDX-License-Identifier: GPL-3.0-only

use std::process::Command;

fn main() {
    println!("cargo::rerun-if-changed=.git/HEAD");
    println!("cargo::rerun-if-changed=.git/refs/tags");
    println!("cargo::rerun-if-env-changed=CAMKIT_VERSION");

    let version = std::env::var("CAMKIT_VERSION")
        .ok()
        .or_else(describe)
        .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string());
    println!("cargo::rustc-env=GIT_VERSION={}", version);
}

/// `git describe` without the leading `v`, e.g. "0.2.0" on a tag or
/// "0.2.0-3-g1a2b3c4" past one. Falls back to the short hash when no tag
/// matches.
fn describe() -> Option<String> {
    let out = git(&["describe", "--tags", "--always", "--match", "v*"])?;
    Some(out.strip_prefix('v').unwrap_or(&out).to_string())
}

fn git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    output
        .status
        .success()
        .then(|| String::from_utf8_lossy(&output.stdout).trim().to_string())
        .filter(|s| !s.is_empty())
}
