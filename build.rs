//! Embeds the client version as `BANANA_VERSION`.
//!
//! Tagged builds use the tag without its `v`. Untagged or dirty trees get a
//! build timestamp appended so two local builds never report the same version.

use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/index");

    let version = match describe() {
        Some(tag) if !tag.ends_with("-dirty") => tag,
        Some(tag) => format!("{}-{}", tag, build_stamp()),
        None => format!("0.0.0-dev-{}", build_stamp()),
    };
    println!("cargo:rustc-env=BANANA_VERSION={}", version);
}

/// `git describe` output, e.g. `1.4.0` or `1.4.0-3-gabc123-dirty`.
fn describe() -> Option<String> {
    let output = Command::new("git")
        .args(["describe", "--tags", "--always", "--dirty"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8(output.stdout).ok()?;
    let tag = text.trim();
    let tag = tag.strip_prefix('v').unwrap_or(tag);
    (!tag.is_empty()).then(|| tag.to_string())
}

fn build_stamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
