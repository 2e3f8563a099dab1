pub mod config;

use config::AppConfig;
use config_rs::{Config, File};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mcp4661=debug,mcp4661_core=debug,mcp4661_devices=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() != 2 {
        warn!("only one parameter, the config file, is expected.");
        warn!("got {}", args.join(","));
    } else if let Some(cfg_name) = args.get(1).map(|o| o.as_str()) {
        let config_res = Config::builder()
            .add_source(File::with_name(cfg_name))
            .build()
            .and_then(|config| config.try_deserialize::<AppConfig>());

        match config_res {
            Ok(config) => {
                info!("MCP4661 service starting up!");
                if let Some(ref name) = config.metadata.name {
                    info!("name: {name}")
                }
                if let Some(ref descrip) = config.metadata.description {
                    info!("description: {descrip}")
                }

                let cancel_token = CancellationToken::new();
                let ctrl_c_token = cancel_token.clone();
                tokio::spawn(async move {
                    match tokio::signal::ctrl_c().await {
                        Ok(()) => info!("got ctrl-c, shutting down ..."),
                        Err(err) => error!("unable to listen for ctrl-c: {}", err),
                    }
                    ctrl_c_token.cancel();
                });

                match config.start(cancel_token).await {
                    Ok(_) => info!("MCP4661 service shut down!"),
                    Err(err) => error!("MCP4661 service exited with an error: {:?}", err),
                }
            }
            Err(err) => {
                error!("Error starting MCP4661 service. Failed to parse config: {:?}", err);
            }
        }
    }
}
