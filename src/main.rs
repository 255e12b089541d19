use anyhow::Result;
use copyforge::{logging::GenerationFormatter, AppState, ConfigManager, CopyProvider};
use std::env;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "copyforge=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().event_format(GenerationFormatter::new()))
        .init();

    // Check for provider-check mode
    let args: Vec<String> = env::args().collect();
    let check_mode = args.contains(&"--check".to_string());

    if check_mode {
        return run_check_mode();
    }

    info!("copyforge starting up");

    // Load configuration
    let config_manager = ConfigManager::load()?;
    config_manager.start_watching();
    let config = config_manager.get();
    info!("Configuration loaded");
    info!("   Bind: {}", config.bind);
    info!("   Provider: {}", config.provider);

    // Build the provider stack
    let provider = CopyProvider::from_environment(&config)?;
    let state = AppState::new(provider);

    // Rebuild providers when the config file changes
    {
        let mut config_rx = config_manager.subscribe();
        let provider_slot = state.provider.clone();
        tokio::spawn(async move {
            while config_rx.changed().await.is_ok() {
                let updated = config_rx.borrow().clone();
                match CopyProvider::from_environment(&updated) {
                    Ok(rebuilt) => {
                        *provider_slot.write().await = rebuilt;
                        info!("Provider stack rebuilt after config change");
                    }
                    Err(err) => {
                        warn!("Failed to apply config update: {}", err);
                    }
                }
            }
        });
    }

    // Set up signal handling
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

    #[cfg(unix)]
    {
        tokio::spawn(async move {
            let ctrl_c = signal::ctrl_c();
            let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
                .expect("Failed to set up SIGTERM handler");

            tokio::select! {
                _ = ctrl_c => {
                    info!("Received SIGINT (Ctrl+C)");
                }
                _ = sigterm.recv() => {
                    info!("Received SIGTERM");
                }
            }

            let _ = shutdown_tx.send(());
        });
    }

    #[cfg(not(unix))]
    {
        tokio::spawn(async move {
            signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
            info!("Received SIGINT (Ctrl+C)");
            let _ = shutdown_tx.send(());
        });
    }

    // Run server until shutdown signal
    tokio::select! {
        result = copyforge::server::serve(&config, state) => {
            if let Err(e) = result {
                warn!("Server error: {}", e);
            }
        }
        _ = shutdown_rx => {
            info!("Shutdown signal received");
        }
    }

    info!("Shutting down copyforge");

    Ok(())
}

/// `copyforge --check`: report which backends the environment enables, then
/// exit without binding a port.
fn run_check_mode() -> Result<()> {
    let config_manager = ConfigManager::load()?;
    let config = config_manager.get();

    let provider = CopyProvider::from_environment(&config)?;
    let available = provider.available();

    if available.is_empty() {
        warn!("No backend configured; set GEMINI_API_KEY or OPENAI_API_KEY");
    } else {
        for kind in available {
            info!("Backend configured: {}", kind.as_str());
        }
    }
    info!("Provider selection: {}", config.provider);

    Ok(())
}
