//! End-to-end tests that run the compiled `graft` binary against a
//! temporary host.

use assert_cmd::Command;
use graft_test_utils::{PluginArchive, TestHost, manifest_toml};
use predicates::prelude::*;

/// Get a Command for the graft binary, pointed at `host`'s config.
fn graft(host: &TestHost) -> Command {
    let mut cmd = Command::cargo_bin("graft").expect("Failed to find graft binary");
    cmd.current_dir(host.root())
        .env_remove("GRAFT_DISABLE_INSTALL")
        .env_remove("GRAFT_DISABLE_REMOVE")
        .env_remove("RUST_LOG")
        .arg("--config")
        .arg(host.root().join("graft.toml"));
    cmd
}

fn blog_archive(host: &TestHost) -> std::path::PathBuf {
    host.archive(
        "blog.zip",
        &PluginArchive::plugin("blog", "1.0.0", &[], &[("static/blog.css", "body {}")]),
    )
}

#[test]
fn help_exits_zero() {
    Command::cargo_bin("graft")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("deploy"));
}

#[test]
fn missing_config_is_an_error() {
    let host = TestHost::new();

    graft(&host)
        .arg("list")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("error"));
}

#[test]
fn validate_reports_plugin() {
    let host = TestHost::new();
    let archive = blog_archive(&host);

    graft(&host)
        .arg("validate")
        .arg(&archive)
        .assert()
        .success()
        .stdout(predicate::str::contains("blog"))
        .stdout(predicate::str::contains("1.0.0"));
}

#[test]
fn validate_rejects_two_roots() {
    let host = TestHost::new();
    let archive = host.archive(
        "two.zip",
        &PluginArchive::plugin("one", "1.0.0", &[], &[]).entry("two/x.txt", "x"),
    );

    graft(&host)
        .arg("validate")
        .arg(&archive)
        .assert()
        .failure()
        .stderr(predicate::str::contains("exactly one top-level folder"));
}

#[test]
fn install_enable_and_list() {
    let host = TestHost::new();
    host.write_config("2.4.0", "");
    let archive = blog_archive(&host);

    graft(&host)
        .arg("install")
        .arg(&archive)
        .assert()
        .success()
        .stdout(predicate::str::contains("Installed plugin"));

    graft(&host)
        .args(["enable", "blog"])
        .assert()
        .success()
        .stdout(predicate::str::contains("order 1"));
    host.assert_host_file("static/blog.css", "body {}");

    let output = graft(&host).args(["list", "--json"]).output().unwrap();
    assert!(output.status.success());
    let records: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(records[0]["name"], "blog");
    assert_eq!(records[0]["enabled"], true);
    assert_eq!(records[0]["order"], 1);
}

#[test]
fn install_blocked_from_environment() {
    let host = TestHost::new();
    host.write_config("2.4.0", "");
    let archive = blog_archive(&host);

    graft(&host)
        .env("GRAFT_DISABLE_INSTALL", "1")
        .arg("install")
        .arg(&archive)
        .assert()
        .failure()
        .stderr(predicate::str::contains("disabled by configuration"));
    assert!(!host.plugin_root().join("blog").exists());
}

#[test]
fn incompatible_plugin_is_refused() {
    let host = TestHost::new();
    host.write_config("2.4.0", "");
    let archive = host.archive(
        "future.zip",
        &PluginArchive::new().entry(
            "future/plugin.toml",
            manifest_toml("future", "1.0.0", &[], Some(">=3.0")),
        ),
    );

    graft(&host)
        .arg("install")
        .arg(&archive)
        .assert()
        .failure()
        .stderr(predicate::str::contains("requires host >=3.0"));
}

#[test]
fn remove_enabled_plugin_fails_then_succeeds_after_disable() {
    let host = TestHost::new();
    host.write_config("2.4.0", "");
    host.install_dir("blog", &[], &[("blog.txt", "hi")]);

    graft(&host).args(["enable", "blog"]).assert().success();
    graft(&host)
        .args(["remove", "blog"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("disable it before removing"));

    graft(&host).args(["disable", "blog"]).assert().success();
    assert_eq!(host.host_file("blog.txt"), None);
    graft(&host).args(["remove", "blog"]).assert().success();
    assert!(!host.plugin_root().join("blog").exists());
}

#[test]
fn deploy_clean_restores_host_files() {
    let host = TestHost::new();
    host.write_config("2.4.0", "");
    host.write_host_file("index.html", "host");
    host.install_dir("theme", &[], &[("index.html", "theme")]);

    graft(&host).args(["enable", "theme"]).assert().success();
    host.assert_host_file("index.html", "theme");

    graft(&host)
        .args(["deploy", "--clean", "--no-init"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Deployed 1 plugin(s)"));
    host.assert_host_file("index.html", "theme");

    graft(&host).args(["disable", "theme"]).assert().success();
    host.assert_host_file("index.html", "host");
}

#[test]
fn status_shows_enabled_plugins() {
    let host = TestHost::new();
    host.write_config("2.4.0", "");
    host.install_dir("blog", &[], &[]);
    graft(&host).args(["enable", "blog"]).assert().success();

    graft(&host)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("2.4.0"))
        .stdout(predicate::str::contains("blog"));
}
