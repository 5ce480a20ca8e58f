//! Callbacks into the host application.

use crate::record::PluginRecord;

/// Host-side hooks invoked by the registry and the lifecycle manager.
///
/// All methods default to no-ops so hosts only implement what they need.
pub trait PluginHooks {
    /// Called once per enabled plugin, in enabled order, after the registry
    /// has been loaded.
    fn on_load(&self, _record: &PluginRecord) {}

    /// Called once per deployed plugin after a deploy that requested
    /// controller initialization has finished overlaying every plugin.
    fn init_controller(&self, _record: &PluginRecord) {}

    /// Called for a plugin whose `post_enable` flag is set, after
    /// controller initialization. The flag is cleared afterwards.
    fn post_enable(&self, _record: &PluginRecord) {}

    /// Called for a plugin whose `post_disable` flag is set, after
    /// controller initialization. The flag is cleared afterwards.
    fn post_disable(&self, _record: &PluginRecord) {}
}

/// Hooks that do nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

impl PluginHooks for NoopHooks {}

impl<H: PluginHooks + ?Sized> PluginHooks for &H {
    fn on_load(&self, record: &PluginRecord) {
        (**self).on_load(record)
    }

    fn init_controller(&self, record: &PluginRecord) {
        (**self).init_controller(record)
    }

    fn post_enable(&self, record: &PluginRecord) {
        (**self).post_enable(record)
    }

    fn post_disable(&self, record: &PluginRecord) {
        (**self).post_disable(record)
    }
}
