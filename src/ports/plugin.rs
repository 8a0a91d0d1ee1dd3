use eyre::Result;

use crate::{config::models::GatewayConfig, ports::handler::BoxHandler};

/// Middleware contributed to the gateway pipeline.
///
/// `init` runs once with the final configuration before any handler is
/// built; `wrap` then receives the handler below it and returns the handler
/// that replaces it. Plugins must not hold per-request mutable state.
pub trait Plugin: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn init(&self, _config: &GatewayConfig) -> Result<()> {
        Ok(())
    }

    fn wrap(&self, inner: BoxHandler) -> BoxHandler;
}
