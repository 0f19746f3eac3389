use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const ALL_DISABLED: &str = r#"
[printer]
enabled = false

[ocr]
enabled = false

[upload]
enabled = false
"#;

fn export_cmd() -> Command {
    Command::cargo_bin("wayscriber-export").expect("binary exists")
}

/// Temp config home containing `wayscriber/destinations.toml`.
fn config_home(contents: &str) -> TempDir {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("wayscriber");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("destinations.toml"), contents).unwrap();
    temp
}

#[test]
fn help_lists_subcommands() {
    export_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Send screenshots to printers"))
        .stdout(predicate::str::contains("export"))
        .stdout(predicate::str::contains("plugins"));
}

#[test]
fn version_includes_package_version() {
    export_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn plugins_reports_disabled_plugins() {
    let temp = config_home(ALL_DISABLED);
    export_cmd()
        .env("XDG_CONFIG_HOME", temp.path())
        .arg("plugins")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "printer: failed to start (printing disabled in config)",
        ))
        .stdout(predicate::str::contains("upload: failed to start"));
}

#[test]
fn list_without_plugins_is_empty() {
    let temp = config_home(ALL_DISABLED);
    export_cmd()
        .env("XDG_CONFIG_HOME", temp.path())
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No destinations available"));
}

#[test]
fn list_json_without_plugins_is_empty_array() {
    let temp = config_home(ALL_DISABLED);
    export_cmd()
        .env("XDG_CONFIG_HOME", temp.path())
        .args(["list", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("[]"));
}

#[test]
fn export_to_unknown_destination_fails() {
    let temp = config_home(ALL_DISABLED);
    let image = temp.path().join("shot.png");
    std::fs::write(&image, [137u8, 80, 78, 71]).unwrap();

    export_cmd()
        .env("XDG_CONFIG_HOME", temp.path())
        .args(["export", "--to", "Printer/Office"])
        .arg(&image)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown destination 'Printer/Office'"));
}

#[test]
fn export_missing_image_fails() {
    let temp = config_home(ALL_DISABLED);
    export_cmd()
        .env("XDG_CONFIG_HOME", temp.path())
        .args(["export", "--to", "OCR"])
        .arg(temp.path().join("missing.png"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load image"));
}

#[test]
fn export_requires_destination() {
    export_cmd()
        .args(["export", "shot.png"])
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "required arguments were not provided",
        ));
}

#[test]
fn explicit_config_path_is_used() {
    let temp = TempDir::new().unwrap();
    let config = temp.path().join("custom.toml");
    std::fs::write(&config, "[ocr\nbroken").unwrap();

    export_cmd()
        .arg("--config")
        .arg(&config)
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to parse config"));
}
