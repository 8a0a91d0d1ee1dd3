//! Ports: the traits the gateway core consumes. Concrete implementations
//! live in [`crate::adapters`].
pub mod handler;
pub mod http_client;
pub mod plugin;
pub mod publisher;
pub mod registry;
pub mod resolver;
pub mod rpc_client;
