//! Middleware chain construction.
//!
//! Plugins come from two extension points: a shared [`PluginRegistry`]
//! (the process-wide one filled through [`register_plugin`] unless a gateway
//! is given its own) and the plugins attached to a single gateway.
//! The effective list is the registry plugins followed by the local ones and
//! element 0 of that list ends up outermost: it is the first to see the
//! request and the last to see the response.
use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;

use crate::{
    config::models::PluginChainMode,
    ports::{handler::BoxHandler, plugin::Plugin},
};

/// An ordered set of plugins shared by every gateway composed from it.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: RwLock<Vec<Arc<dyn Plugin>>>,
}

impl PluginRegistry {
    pub fn register(&self, plugin: Arc<dyn Plugin>) {
        tracing::debug!(plugin = plugin.name(), "registering plugin");
        self.plugins
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(plugin);
    }

    /// Snapshot of the registered plugins in registration order.
    pub fn snapshot(&self) -> Vec<Arc<dyn Plugin>> {
        self.plugins
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

static GLOBAL_PLUGINS: Lazy<Arc<PluginRegistry>> = Lazy::new(Default::default);

/// The process-wide registry gateways use unless given their own.
pub fn global_registry() -> Arc<PluginRegistry> {
    GLOBAL_PLUGINS.clone()
}

/// Register a plugin for every gateway composed after this call.
pub fn register_plugin(plugin: Arc<dyn Plugin>) {
    GLOBAL_PLUGINS.register(plugin);
}

/// Snapshot of the globally registered plugins in registration order.
pub fn global_plugins() -> Vec<Arc<dyn Plugin>> {
    GLOBAL_PLUGINS.snapshot()
}

fn same_plugin(a: &Arc<dyn Plugin>, b: &Arc<dyn Plugin>) -> bool {
    std::ptr::eq(Arc::as_ptr(a).cast::<()>(), Arc::as_ptr(b).cast::<()>())
}

/// Merge the two extension points into the list the chain is built from.
///
/// In `Single` mode each plugin instance appears once even if it was
/// registered at both points. `Doubled` reproduces the legacy behaviour
/// where the whole list is applied twice.
pub fn effective_plugins(
    global: &[Arc<dyn Plugin>],
    local: &[Arc<dyn Plugin>],
    mode: PluginChainMode,
) -> Vec<Arc<dyn Plugin>> {
    let mut plugins: Vec<Arc<dyn Plugin>> = Vec::with_capacity(global.len() + local.len());
    for plugin in global.iter().chain(local) {
        if !plugins.iter().any(|p| same_plugin(p, plugin)) {
            plugins.push(plugin.clone());
        }
    }

    if mode == PluginChainMode::Doubled {
        plugins.extend_from_within(..);
    }
    plugins
}

/// Wrap `base` with `plugins`, applying them from the end of the list so the
/// first plugin is outermost.
pub fn wrap(base: BoxHandler, plugins: &[Arc<dyn Plugin>]) -> BoxHandler {
    plugins.iter().rev().fold(base, |handler, plugin| {
        tracing::debug!(plugin = plugin.name(), "wrapping handler");
        plugin.wrap(handler)
    })
}
