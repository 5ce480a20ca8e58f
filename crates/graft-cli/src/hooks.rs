//! Host hooks for command-line runs.
//!
//! Outside a host process there are no controllers to initialize, so the
//! CLI records each callback in the log instead.

use graft_core::{PluginHooks, PluginRecord};

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingHooks;

impl PluginHooks for TracingHooks {
    fn on_load(&self, record: &PluginRecord) {
        tracing::debug!(plugin = %record.name, order = record.order, "plugin loaded");
    }

    fn init_controller(&self, record: &PluginRecord) {
        tracing::info!(plugin = %record.name, "initializing controller");
    }

    fn post_enable(&self, record: &PluginRecord) {
        tracing::info!(plugin = %record.name, "post-enable hook");
    }

    fn post_disable(&self, record: &PluginRecord) {
        tracing::info!(plugin = %record.name, "post-disable hook");
    }
}
