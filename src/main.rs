use std::sync::Arc;

use clap::{Arg, Command};
use tracing::info;

mod config;
mod error;

use balancer::TableBalancer;
use config::Config;
use error::ProxyError;
use gateway::{AppState, Registry, Server};
use storage::{MemoryBackend, Session, StorageBackend};

#[tokio::main]
async fn main() -> Result<(), ProxyError> {
    tracing_subscriber::fmt::init();

    let matches = Command::new("mediaproxy")
        .version("0.1.0")
        .about("HTTP gateway for a replicated object storage cluster")
        .arg(
            Arg::new("config")
                .long("config")
                .help("Path to the JSON configuration file")
                .required(false),
        )
        .arg(
            Arg::new("listen")
                .long("listen")
                .help("Listen address, overrides the configuration file")
                .required(false),
        )
        .get_matches();

    let mut config = match matches.get_one::<String>("config") {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(listen) = matches.get_one::<String>("listen") {
        config.listen = listen.clone();
    }

    info!(
        "starting gateway: {} namespaces, die-limit {}",
        config.namespaces.len(),
        config.die_limit
    );

    let registry = Registry::from_config(&config.namespaces)?;
    let balancer = TableBalancer::new(config.balancer.clone())?;
    let backend = Arc::new(MemoryBackend::new(config.die_limit));

    let state = AppState {
        session: Session::new(backend as Arc<dyn StorageBackend>),
        balancer: Arc::new(balancer),
        registry,
        die_limit: config.die_limit,
        sign_port: config.sign_port.clone(),
    };

    Server::new(state, config.listen).run().await?;
    Ok(())
}
