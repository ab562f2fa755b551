use thiserror::Error;

/// Startup failures of the proxy binary.
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("{0}")]
    Registry(#[from] gateway::RegistryError),

    #[error("{0}")]
    Balancer(#[from] balancer::BalancerError),
}
