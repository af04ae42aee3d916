use std::sync::Arc;

use acmezone::config::Config;
use acmezone::container::Container;
use acmezone::dns::{self, ServerConfig};
use acmezone::error::Error;
use anyhow::{anyhow, Result};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_init();

    let mut first_args = std::env::args().take(2);
    let (program_name, config_file) = (
        first_args.next().unwrap_or_else(|| "acmezone".to_string()),
        first_args.next(),
    );

    let config = config_init(&program_name, config_file)?;
    let container = Container::new(config.zones())?;

    let server_config = ServerConfig {
        addr: config.listen_addr,
        no_tcp: config.no_tcp,
        no_udp: config.no_udp,
        tcp_timeout: config.tcp_timeout,
        ready: None,
        soa: config.soa()?,
    };

    let cancel = CancellationToken::new();
    let mut server = tokio::spawn(dns::serve(
        cancel.clone(),
        Arc::new(container),
        server_config,
    ));

    tokio::select! {
        _ = signal::ctrl_c() => {
            tracing::info!("quitting from signal");
            cancel.cancel();
            let _ = (&mut server).await;
        }
        joined = &mut server => {
            if let Ok(Err(err)) = joined {
                if !matches!(err, Error::Cancelled) {
                    return Err(err.into());
                }
            }
        }
    }

    tracing::info!("goodbye");
    Ok(())
}

fn tracing_init() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "acmezone=info".into()),
        )
        .init();
}

fn config_init(program_name: &str, config_file: Option<String>) -> Result<Config> {
    match config_file {
        None => Err(anyhow!("usage: {program_name} /path/to/config.json")),
        Some(config_file) => {
            let config = Config::try_from_file(&config_file)?;
            tracing::debug!("loaded config from {config_file}");
            Ok(config)
        }
    }
}
