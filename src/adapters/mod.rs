pub mod handlers;
pub mod http_client;
pub mod memory_broker;
pub mod memory_registry;
pub mod plugins;
pub mod resolvers;
pub mod rpc_client;

/// Re-export commonly used types from adapters
pub use http_client::HttpClientAdapter;
pub use memory_broker::MemoryBroker;
pub use memory_registry::MemoryRegistry;
pub use plugins::builtin_plugin;
pub use rpc_client::HttpRpcClient;
