use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use blog_post_pipeline::config::Config;
use blog_post_pipeline::db::Database;
use blog_post_pipeline::notify::{MailNotifier, Notifier};
use blog_post_pipeline::web::{self, auth::hash_password, AppState};
use blog_post_pipeline::{feed, ingest};

#[tokio::main]
async fn main() {
    // `hash-password <password>` prints a value for ADMIN_PASSWORD_HASH and exits.
    let args: Vec<String> = std::env::args().skip(1).collect();
    if let [command, password] = args.as_slice() {
        if command == "hash-password" {
            match hash_password(password) {
                Ok(hash) => println!("{hash}"),
                Err(e) => {
                    eprintln!("{e:#}");
                    std::process::exit(1);
                }
            }
            return;
        }
    }

    if let Err(e) = run().await {
        error!("Fatal error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    init_tracing()?;

    info!("Starting blog-post-pipeline");

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    info!(
        blog = %config.blog_base_url,
        feed = %config.rss_feed_url,
        max_pages = config.scrape.max_pages,
        "Configuration loaded"
    );
    if config.admin_password_hash.is_none() {
        info!("ADMIN_PASSWORD_HASH not set; admin routes are disabled");
    }

    if let Some(parent) = config.database_path.parent() {
        tokio::fs::create_dir_all(parent).await.with_context(|| {
            format!("Failed to create database directory: {}", parent.display())
        })?;
    }

    let db = Database::new(&config.database_path)
        .await
        .context("Failed to initialize database")?;

    info!("Database initialized");

    let notifier: Arc<dyn Notifier> =
        Arc::new(MailNotifier::new(&config).context("Failed to initialize mail notifier")?);
    let http = feed::http_client().context("Failed to build HTTP client")?;
    let config = Arc::new(config);

    // Start scheduled scraping if configured
    let schedule_handle = config.scrape_interval.map(|interval| {
        let config = Arc::clone(&config);
        let db = db.clone();
        let notifier = Arc::clone(&notifier);
        tokio::spawn(async move {
            ingest::schedule_loop(config, db, notifier, interval).await;
        })
    });
    if schedule_handle.is_none() {
        info!("Scheduled scraping disabled");
    }

    // Start web server in background
    let state = AppState {
        db,
        config,
        notifier,
        http,
    };
    let web_handle = tokio::spawn(async move {
        if let Err(e) = web::serve(state).await {
            error!("Web server error: {e:#}");
        }
    });

    shutdown_signal().await;

    info!("Shutting down...");

    web_handle.abort();
    if let Some(handle) = schedule_handle {
        handle.abort();
    }

    info!("Shutdown complete");

    Ok(())
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,blog_post_pipeline=debug"));

    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| matches!(v.to_lowercase().as_str(), "json" | "structured"))
        .unwrap_or(false);

    if use_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
