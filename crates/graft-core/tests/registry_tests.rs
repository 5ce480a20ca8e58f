//! Registry persistence, reconciliation and self-healing.

use std::time::Duration;

use graft_core::{NoopHooks, PluginRecord, Registry, Settings};
use graft_fs::lock::{FileLock, LockMode};
use graft_test_utils::TestHost;
use pretty_assertions::assert_eq;
use rstest::{fixture, rstest};

#[fixture]
fn host() -> TestHost {
    TestHost::new()
}

fn registry(host: &TestHost) -> Registry {
    let mut settings = Settings::new("2.4.0", host.host_dir(), host.data_dir());
    settings.lock_timeout_ms = 200;
    Registry::from_settings(&settings).unwrap()
}

fn loaded(host: &TestHost) -> Registry {
    let mut registry = registry(host);
    registry.load(&NoopHooks).unwrap();
    registry
}

#[rstest]
fn round_trip_preserves_enabled_order(host: TestHost) {
    for name in ["a", "b", "c"] {
        host.install_dir(name, &[], &[]);
    }
    let mut first = loaded(&host);
    first.add(PluginRecord::new("a").enabled_at(5)).unwrap();
    first.add(PluginRecord::new("b").enabled_at(1)).unwrap();
    first.add(PluginRecord::new("c").enabled_at(3)).unwrap();
    assert_eq!(first.enabled_names(), vec!["b", "c", "a"]);

    let second = loaded(&host);
    assert_eq!(second.enabled_names(), first.enabled_names());
}

#[rstest]
fn untracked_directories_become_disabled_records(host: TestHost) {
    host.install_dir("blog", &["core-ui"], &[]);

    let registry = loaded(&host);

    let record = registry.get("blog").unwrap();
    assert!(!record.enabled);
    assert_eq!(record.version.as_deref(), Some("1.0.0"));
    assert!(record.dependencies.contains("core-ui"));
}

#[rstest]
fn entries_without_directory_are_dropped(host: TestHost) {
    host.install_dir("kept", &[], &[]);
    std::fs::create_dir_all(host.registry_file().parent().unwrap()).unwrap();
    std::fs::write(
        host.registry_file(),
        r#"[{"name": "kept", "enabled": true, "order": 1},
            {"name": "gone", "enabled": true, "order": 2}]"#,
    )
    .unwrap();

    let registry = loaded(&host);

    assert!(registry.get("gone").is_none());
    assert_eq!(registry.enabled_names(), vec!["kept"]);
}

#[rstest]
fn save_heals_broken_dependency(host: TestHost) {
    host.install_dir("a", &["b"], &[]);
    host.install_dir("b", &[], &[]);
    let mut registry = loaded(&host);
    registry.get_mut("b").unwrap().enabled = true;
    registry.get_mut("b").unwrap().order = 1;
    registry.get_mut("a").unwrap().enabled = true;
    registry.get_mut("a").unwrap().order = 2;
    registry.save().unwrap();
    assert_eq!(registry.enabled_names(), vec!["b", "a"]);

    registry.get_mut("b").unwrap().enabled = false;
    registry.save().unwrap();

    assert!(!registry.is_enabled("a"));
    assert!(loaded(&host).enabled_names().is_empty());
}

#[rstest]
fn healing_cascades_through_chains(host: TestHost) {
    host.install_dir("base", &[], &[]);
    host.install_dir("mid", &["base"], &[]);
    host.install_dir("top", &["mid"], &[]);
    let mut registry = loaded(&host);
    for (order, name) in ["base", "mid", "top"].into_iter().enumerate() {
        let record = registry.get_mut(name).unwrap();
        record.enabled = true;
        record.order = order as i64 + 1;
    }
    registry.get_mut("base").unwrap().enabled = false;

    registry.save().unwrap();

    assert!(registry.enabled_names().is_empty());
}

#[rstest]
fn refresh_keeps_persisted_values_for_broken_manifest(host: TestHost) {
    let dir = host.install_dir("blog", &[], &[]);
    let mut registry = loaded(&host);
    assert_eq!(registry.get("blog").unwrap().version.as_deref(), Some("1.0.0"));

    std::fs::write(dir.join("plugin.toml"), "not = [valid").unwrap();
    registry.refresh_metadata();

    assert_eq!(registry.get("blog").unwrap().version.as_deref(), Some("1.0.0"));
}

#[rstest]
fn save_under_lock_contention_fails(host: TestHost) {
    let mut registry = loaded(&host);
    std::fs::create_dir_all(host.registry_file().parent().unwrap()).unwrap();
    let _held =
        FileLock::acquire(&host.registry_file(), LockMode::Exclusive, Duration::from_secs(1)).unwrap();

    let err = registry.add(PluginRecord::new("blog")).unwrap_err();

    assert!(matches!(
        err,
        graft_core::Error::Persistence(graft_fs::Error::LockFailed { .. })
    ));
}
