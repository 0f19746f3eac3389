use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

fn main() {
    let hash = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .and_then(|output| {
            if output.status.success() {
                Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
            } else {
                None
            }
        })
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".into());

    println!("cargo:rustc-env=WAYSCRIBER_EXPORT_GIT_HASH={hash}");

    if let Some(git_dir) = resolve_git_dir() {
        for entry in ["HEAD", "refs", "packed-refs"] {
            emit_rerun(&git_dir.join(entry));
        }
    }
}

fn resolve_git_dir() -> Option<PathBuf> {
    if let Some(from_env) = env::var_os("GIT_DIR") {
        return Some(PathBuf::from(from_env));
    }

    let dot_git = PathBuf::from(".git");
    if dot_git.is_dir() {
        return Some(dot_git);
    }

    // Worktrees and submodules use a `.git` file pointing at the real directory.
    let contents = fs::read_to_string(&dot_git).ok()?;
    let rest = contents.strip_prefix("gitdir:")?;
    let resolved = PathBuf::from(rest.trim());
    if resolved.is_relative() {
        return dot_git.parent().map(|parent| parent.join(&resolved));
    }
    Some(resolved)
}

fn emit_rerun(path: &Path) {
    if let Some(display) = path.to_str().filter(|_| path.exists()) {
        println!("cargo:rerun-if-changed={display}");
    }
}
