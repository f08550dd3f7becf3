use std::process::Command;

// Container builds usually lack `.git`, so CI can pass the revision in.
const OVERRIDE_VAR: &str = "CONCIERGE_BUILD_SHA";

fn git_revision() -> Option<String> {
    let output = Command::new("git")
        .args(["describe", "--always", "--dirty=-modified", "--abbrev=8"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let revision = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!revision.is_empty()).then_some(revision)
}

fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/index");
    println!("cargo:rerun-if-env-changed={OVERRIDE_VAR}");

    let revision = std::env::var(OVERRIDE_VAR)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .or_else(git_revision)
        .unwrap_or_else(|| format!("{}-dev", env!("CARGO_PKG_VERSION")));

    println!("cargo:rustc-env=CONCIERGE_GIT_SHA={revision}");
}
