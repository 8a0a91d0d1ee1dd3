pub mod chain;
pub mod error;
pub mod gateway;
pub mod handler_selector;
pub mod lifecycle;
pub mod resolver_selector;
pub mod router;
pub mod routes;
pub mod server;
pub mod service;
pub mod stats;
pub mod transport;

pub use error::{GatewayError, GatewayResult};
pub use gateway::{ComposedGateway, Gateway};
pub use handler_selector::{HandlerSelection, MountPath, select_handler};
pub use lifecycle::Lifecycle;
pub use resolver_selector::select_resolver;
pub use server::GatewayServer;
pub use service::Service;
pub use transport::{TransportMode, bootstrap_transport};
