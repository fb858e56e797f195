use clap::Parser;
use avatar_core::AvatarConfig;
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

use avatar_server::{server, AppContext};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "avatar.toml")]
    config: String,

    #[arg(long)]
    health: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (dev convenience; production uses real env vars)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Load config
    let config = match AvatarConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // Init logging; RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.service.log_level.as_str()));
    fmt().with_env_filter(filter).init();

    let store = match avatar_core::create_store(&config).await {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to open {:?} store: {}", config.storage.backend, e);
            std::process::exit(1);
        }
    };

    if args.health {
        match store.health().await {
            Ok(v) => println!("✅ Store ({}) healthy: {}", store.name(), v),
            Err(e) => {
                println!("❌ Store health check failed: {}", e);
                std::process::exit(1);
            }
        }

        let supabase = !config.supabase.url.is_empty() && !config.supabase.api_key.is_empty();
        let anam = !config.anam.api_key.is_empty();
        println!("{} Supabase forwarding configured", if supabase { "✅" } else { "⚠️ " });
        println!("{} Anam session tokens configured", if anam { "✅" } else { "⚠️ " });
        println!("✅ Avatar health check passed");
        return Ok(());
    }

    let ctx = AppContext::new(store, config);

    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    server::run_transports(ctx, tx).await?;

    Ok(())
}
