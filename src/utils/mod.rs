pub mod cors;
pub mod graceful_shutdown;

pub use cors::write_cors_headers;
pub use graceful_shutdown::{GracefulShutdown, ShutdownReason};
