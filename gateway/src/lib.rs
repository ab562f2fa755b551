//! HTTP gateway in front of the replicated object store.
//!
//! Routes requests by path verb, resolves replica groups through the
//! balancer, issues scatter/gather storage operations and renders the
//! protocol's XML/JSON response bodies.

pub mod auth;
pub mod container;
pub mod error;
pub mod handlers;
pub mod lookup;
pub mod query;
pub mod registry;
pub mod resolve;
pub mod server;
pub mod xml;

pub use error::{GatewayError, GatewayResult};
pub use handlers::AppState;
pub use registry::{Namespace, NamespaceConfig, Registry, RegistryError};
pub use server::{router, Server};
