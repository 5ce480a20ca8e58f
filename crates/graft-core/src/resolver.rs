//! Dependency checks between plugins.
//!
//! Dependencies are plain names: a plugin can only be enabled while every
//! plugin it names is enabled. Before the registry persists, a healing pass
//! disables every plugin whose dependencies have gone missing, repeating
//! until nothing changes so that chains of dependents are disabled too.

use std::collections::HashSet;

use crate::record::PluginRecord;

/// Whether every dependency of `record` appears in `enabled`.
///
/// With `exclude_self`, a dependency on the record's own name is ignored;
/// this is the pre-activation form, used while the record is not yet enabled.
pub fn dependencies_satisfied<S: AsRef<str>>(
    record: &PluginRecord,
    enabled: &[S],
    exclude_self: bool,
) -> bool {
    missing_dependencies(record, enabled, exclude_self).is_empty()
}

/// The dependencies of `record` that are absent from `enabled`, sorted.
pub fn missing_dependencies<S: AsRef<str>>(
    record: &PluginRecord,
    enabled: &[S],
    exclude_self: bool,
) -> Vec<String> {
    let enabled: HashSet<&str> = enabled.iter().map(AsRef::as_ref).collect();
    record
        .dependencies
        .iter()
        .filter(|dep| !(exclude_self && **dep == record.name))
        .filter(|dep| !enabled.contains(dep.as_str()))
        .cloned()
        .collect()
}

/// Disable every enabled record whose dependencies are unmet.
///
/// Each pass computes the enabled set once and disables all violators
/// together; passes repeat until one disables nothing, which takes at most
/// one pass per record. Returns the names disabled, in the order they were
/// disabled.
pub fn heal(records: &mut [PluginRecord]) -> Vec<String> {
    let mut disabled = Vec::new();

    loop {
        let enabled: Vec<String> = records
            .iter()
            .filter(|r| r.enabled)
            .map(|r| r.name.clone())
            .collect();

        let violators: Vec<usize> = records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.enabled && !dependencies_satisfied(r, &enabled, false))
            .map(|(i, _)| i)
            .collect();

        if violators.is_empty() {
            break;
        }

        for index in violators {
            let record = &mut records[index];
            tracing::warn!(
                plugin = %record.name,
                "disabling plugin with unmet dependencies"
            );
            record.enabled = false;
            disabled.push(record.name.clone());
        }
    }

    disabled
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn satisfied_when_all_dependencies_enabled() {
        let record = PluginRecord::new("blog").with_dependencies(["core", "auth"]);
        assert!(dependencies_satisfied(&record, &["auth", "core", "x"], false));
        assert!(!dependencies_satisfied(&record, &["core"], false));
    }

    #[test]
    fn no_dependencies_always_satisfied() {
        let record = PluginRecord::new("blog");
        assert!(dependencies_satisfied::<&str>(&record, &[], false));
    }

    #[test]
    fn exclude_self_ignores_self_reference() {
        let record = PluginRecord::new("blog").with_dependencies(["blog", "core"]);
        assert!(dependencies_satisfied(&record, &["core"], true));
        assert!(!dependencies_satisfied(&record, &["core"], false));
    }

    #[test]
    fn missing_lists_only_absent_names() {
        let record = PluginRecord::new("blog").with_dependencies(["core", "auth", "seo"]);
        assert_eq!(missing_dependencies(&record, &["auth"], false), vec!["core", "seo"]);
    }

    #[test]
    fn heal_disables_dependent_of_disabled_plugin() {
        let mut records = vec![
            PluginRecord::new("a").with_dependencies(["b"]).enabled_at(2),
            PluginRecord::new("b"),
        ];

        let disabled = heal(&mut records);

        assert_eq!(disabled, vec!["a"]);
        assert!(!records[0].enabled);
    }

    #[test]
    fn heal_cascades_through_chains() {
        // c -> b -> a, and a is missing entirely
        let mut records = vec![
            PluginRecord::new("c").with_dependencies(["b"]).enabled_at(3),
            PluginRecord::new("b").with_dependencies(["a"]).enabled_at(2),
            PluginRecord::new("d").enabled_at(1),
        ];

        let disabled = heal(&mut records);

        assert_eq!(disabled, vec!["b", "c"]);
        assert!(records[2].enabled, "unrelated plugin must stay enabled");
    }

    #[test]
    fn heal_leaves_consistent_set_untouched() {
        let mut records = vec![
            PluginRecord::new("a").enabled_at(1),
            PluginRecord::new("b").with_dependencies(["a"]).enabled_at(2),
        ];
        assert!(heal(&mut records).is_empty());
        assert!(records.iter().all(|r| r.enabled));
    }

    fn arb_records() -> impl Strategy<Value = Vec<PluginRecord>> {
        let names = ["a", "b", "c", "d", "e", "f"];
        prop::collection::vec(
            (any::<bool>(), prop::collection::vec(0usize..names.len(), 0..3)),
            names.len(),
        )
        .prop_map(move |specs| {
            specs
                .into_iter()
                .enumerate()
                .map(|(i, (enabled, deps))| {
                    let mut record = PluginRecord::new(names[i])
                        .with_dependencies(deps.into_iter().map(|d| names[d]));
                    record.enabled = enabled;
                    record
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn heal_reaches_a_consistent_fixed_point(mut records in arb_records()) {
            let before: Vec<bool> = records.iter().map(|r| r.enabled).collect();
            let disabled = heal(&mut records);

            let enabled: Vec<String> = records
                .iter()
                .filter(|r| r.enabled)
                .map(|r| r.name.clone())
                .collect();
            for record in records.iter().filter(|r| r.enabled) {
                prop_assert!(dependencies_satisfied(record, &enabled, false));
            }

            // healing only ever disables
            for (record, was_enabled) in records.iter().zip(before) {
                prop_assert!(!record.enabled || was_enabled);
            }
            prop_assert!(disabled.len() <= records.len());
        }
    }
}
