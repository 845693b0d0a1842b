use anyhow::{Context, Result};
use clap::Parser;
use intg_core::Discovery;
use intg_device_demo::{DemoIntegration, DemoSetupFlow, MdnsDiscovery};
use intg_persistence::{config_path, ConfigManager};
use intg_ucapi::{
    DriverMetadata, IntegrationDriver, IntegrationServer, MdnsAdvertisement, MdnsPublisher,
    Sessions,
};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Port used when neither the command line nor driver.json sets one
const DEFAULT_PORT: u16 = 9090;

/// Crates whose log level follows `UC_LOG_LEVEL`
const LOG_TARGETS: [&str; 5] = [
    "intg_demo",
    "intg_ucapi",
    "intg_device_demo",
    "intg_core",
    "intg_persistence",
];

#[derive(Parser, Debug)]
#[command(name = "intg-demo", version, about = "Demo integration driver for Unfolded Circle Remotes")]
struct Args {
    /// Directory of the device configuration (config.json); defaults to the home directory
    #[arg(long, env = "UC_CONFIG_HOME")]
    config_home: Option<PathBuf>,

    /// Network interface to listen on
    #[arg(long, env = "UC_INTEGRATION_INTERFACE", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    interface: IpAddr,

    /// WebSocket port; defaults to the port in driver.json, else 9090
    #[arg(long, env = "UC_INTEGRATION_HTTP_PORT")]
    port: Option<u16>,

    /// Don't advertise the driver with mDNS
    #[arg(
        long,
        env = "UC_DISABLE_MDNS_PUBLISH",
        action = clap::ArgAction::SetTrue,
        value_parser = clap::builder::BoolishValueParser::new()
    )]
    disable_mdns_publish: bool,

    /// Host name published with mDNS
    #[arg(long, env = "UC_MDNS_LOCAL_HOSTNAME")]
    mdns_hostname: Option<String>,

    /// Log level of the driver (DEBUG, INFO, WARNING, ERROR); RUST_LOG takes precedence
    #[arg(long, env = "UC_LOG_LEVEL", default_value = "DEBUG")]
    log_level: String,

    /// Driver metadata file
    #[arg(long, default_value = "driver.json")]
    driver_json: PathBuf,

    /// mDNS service type to discover devices during setup, e.g. `_demo._tcp`
    #[arg(long)]
    discovery_service: Option<String>,

    /// Discovery duration in seconds
    #[arg(long, default_value_t = 3)]
    discovery_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter(&args.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let metadata = DriverMetadata::load(&args.driver_json)
        .with_context(|| format!("Failed to load {}", args.driver_json.display()))?;
    tracing::info!(
        "Starting {} ({}) v{}",
        metadata.display_name(),
        metadata.driver_id,
        metadata.version
    );

    let config_dir = config_dir(args.config_home.clone())?;
    let config_file = config_path(&config_dir);
    tracing::info!("Configuration file: {}", config_file.display());
    let config = ConfigManager::load(config_file).await?;

    let discovery = args.discovery_service.as_deref().map(|service| {
        Arc::new(MdnsDiscovery::new(
            service,
            Duration::from_secs(args.discovery_timeout),
        )) as Arc<dyn Discovery>
    });

    let sessions = Sessions::new();
    let driver = IntegrationDriver::new(
        DemoIntegration,
        metadata.clone(),
        config,
        Arc::new(DemoSetupFlow::new(discovery)),
        sessions.clone(),
    );

    driver.register_all_configured_devices().await;
    let events = driver.start().await;

    let port = args.port.or(metadata.port).unwrap_or(DEFAULT_PORT);
    let mut server =
        IntegrationServer::new(SocketAddr::new(args.interface, port), driver.clone(), sessions);
    let local_addr = server.start().await?;

    let publisher = if args.disable_mdns_publish {
        tracing::info!("mDNS publishing disabled");
        None
    } else {
        match MdnsAdvertisement::for_driver(&metadata, local_addr.port(), args.mdns_hostname.as_deref())
            .and_then(|advertisement| MdnsPublisher::publish(&advertisement))
        {
            Ok(publisher) => Some(publisher),
            Err(e) => {
                tracing::warn!("Failed to publish mDNS service: {}", e);
                None
            }
        }
    };

    shutdown_signal().await?;
    tracing::info!("Shutting down");

    server.stop().await;
    driver.shutdown().await;

    if let Some(publisher) = publisher {
        tokio::task::spawn_blocking(move || publisher.shutdown()).await?;
    }
    if let Some(events) = events {
        events.abort();
    }

    Ok(())
}

/// `EnvFilter` directives for a `UC_LOG_LEVEL` value
fn log_filter(level: &str) -> String {
    let level = match level.trim().to_ascii_uppercase().as_str() {
        "TRACE" => "trace",
        "DEBUG" => "debug",
        "WARN" | "WARNING" => "warn",
        "ERROR" | "CRITICAL" => "error",
        _ => "info",
    };

    std::iter::once("warn".to_string())
        .chain(LOG_TARGETS.iter().map(|target| format!("{}={}", target, level)))
        .collect::<Vec<_>>()
        .join(",")
}

/// Get the configuration directory
fn config_dir(config_home: Option<PathBuf>) -> Result<PathBuf> {
    match config_home {
        Some(dir) => Ok(dir),
        None => dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Failed to get home directory")),
    }
}

async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        let mut terminate =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result?,
            _ = terminate.recv() => {}
        }
    }

    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_filter() {
        assert_eq!(
            log_filter("DEBUG"),
            "warn,intg_demo=debug,intg_ucapi=debug,intg_device_demo=debug,intg_core=debug,intg_persistence=debug"
        );
        assert!(log_filter("warning").contains("intg_ucapi=warn"));
        assert!(log_filter("CRITICAL").contains("intg_core=error"));
        assert!(log_filter("bogus").contains("intg_demo=info"));
    }

    #[test]
    fn test_args_defaults() {
        let args = Args::try_parse_from(["intg-demo"]).unwrap();
        assert_eq!(args.interface, IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        assert_eq!(args.driver_json, PathBuf::from("driver.json"));
        assert_eq!(args.discovery_timeout, 3);
    }

    #[test]
    fn test_args_flags() {
        let args = Args::try_parse_from([
            "intg-demo",
            "--port",
            "9191",
            "--disable-mdns-publish",
            "--config-home",
            "/tmp/uc",
            "--discovery-service",
            "_demo._tcp",
        ])
        .unwrap();

        assert_eq!(args.port, Some(9191));
        assert!(args.disable_mdns_publish);
        assert_eq!(config_dir(args.config_home).unwrap(), PathBuf::from("/tmp/uc"));
        assert_eq!(args.discovery_service.as_deref(), Some("_demo._tcp"));
    }
}
