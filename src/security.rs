#![forbid(unsafe_code)]

//! Process and secret hygiene shared by the binaries and the API clients.

use anyhow::{Result, bail};
use nix::unistd::Uid;

const REDACTED: &str = "[redacted]";

/// Fails fast when a binary is started as root. The service only needs to
/// bind a port and read its web root, both of which work unprivileged.
pub fn ensure_not_root(process: &str) -> Result<()> {
    ensure_not_root_for(Uid::current(), process)
}

fn ensure_not_root_for(uid: Uid, process: &str) -> Result<()> {
    if uid.is_root() {
        bail!(
            "{process} must not be run as root; use a regular user or a dedicated service account"
        );
    }
    Ok(())
}

/// Replaces every occurrence of each non-empty secret in `text`.
pub fn redact(text: &str, secrets: &[&str]) -> String {
    secrets
        .iter()
        .filter(|secret| !secret.is_empty())
        .fold(text.to_string(), |acc, secret| acc.replace(secret, REDACTED))
}
