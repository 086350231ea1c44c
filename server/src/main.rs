//! Driftbox file sync server (driftboxd).

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod auth;
mod config;
mod db;
mod events;
mod pipeline;
mod storage;
mod tree;

use config::Config;

#[derive(Parser)]
#[command(name = "driftboxd")]
#[command(about = "Driftbox file sync server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the server in the foreground.
    Serve,
    /// Run database migrations.
    Migrate,
    /// User management.
    User {
        #[command(subcommand)]
        command: UserCommands,
    },
}

#[derive(Subcommand)]
enum UserCommands {
    /// Create a new user, prompting for a password.
    Create {
        #[arg(long)]
        username: String,
        #[arg(long)]
        admin: bool,
    },
    /// List all users.
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.log_filter.clone())),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Serve => run_server(config).await?,
        Commands::Migrate => run_migrations(&config).await?,
        Commands::User { command } => match command {
            UserCommands::Create { username, admin } => create_user(&config, &username, admin).await?,
            UserCommands::List => list_users(&config).await?,
        },
    }

    Ok(())
}

async fn run_server(config: Config) -> anyhow::Result<()> {
    let db_pool = db::create_pool(&config.database_url).await?;

    tracing::info!("checking database migrations...");
    if let Err(e) = db::run_migrations(&db_pool).await {
        let err_str = e.to_string();
        if !err_str.contains("already exists") {
            tracing::warn!("migration warning: {}", err_str);
        }
    }

    ensure_default_storage_location(&db_pool, &config).await?;

    let metrics: std::sync::Arc<dyn storage::MetricsSink> = std::sync::Arc::new(storage::TracingMetricsSink);
    let router = std::sync::Arc::new(storage::StorageRouter::load(&db_pool, metrics).await?);
    let tree = tree::TreeCache::new(db_pool.clone()).await?;
    let events = std::sync::Arc::new(events::EventBus::new());
    let pipeline = pipeline::ContentPipeline::new(db_pool.clone(), router.clone(), tree.clone(), events.clone());

    pipeline::sweeper::spawn(pipeline.clone());

    let app_state = api::AppState::new(db_pool, config.clone(), router, tree, events, pipeline);
    let addr: std::net::SocketAddr = config.bind_addr.parse()?;

    match (&config.tls_cert_path, &config.tls_key_path) {
        (Some(cert), Some(key)) => {
            tracing::info!("TLS configured, starting driftboxd over HTTPS");
            api::rest::serve_tls(addr, app_state, cert, key).await?;
        }
        _ => {
            api::rest::serve(addr, app_state).await?;
        }
    }

    Ok(())
}

/// First-run bootstrap: if no storage locations are configured yet, register
/// a single default local-fs location pointed at `DEFAULT_STORAGE_PATH` so a
/// fresh instance can accept uploads without a manual setup step.
async fn ensure_default_storage_location(pool: &db::DbPool, config: &Config) -> anyhow::Result<()> {
    let existing = db::locations::list_locations(pool).await?;
    if !existing.is_empty() {
        return Ok(());
    }

    tokio::fs::create_dir_all(&config.default_storage_path).await?;

    db::locations::insert_location(
        pool,
        "default",
        None,
        "local",
        serde_json::json!({ "root": config.default_storage_path }),
        0,
        true,
        false,
    )
    .await?;

    tracing::info!(path = %config.default_storage_path, "bootstrapped default storage location");
    Ok(())
}

async fn run_migrations(config: &Config) -> anyhow::Result<()> {
    println!("running migrations...");
    let pool = db::create_pool(&config.database_url).await?;
    db::run_migrations(&pool).await?;
    println!("migrations complete");
    Ok(())
}

async fn create_user(config: &Config, username: &str, is_admin: bool) -> anyhow::Result<()> {
    use std::io::{self, Write};

    if username.len() < 3 {
        anyhow::bail!("username must be at least 3 characters");
    }
    if !username.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-') {
        anyhow::bail!("username can only contain letters, numbers, underscores, and hyphens");
    }

    print!("Password: ");
    io::stdout().flush()?;
    let password = tokio::task::spawn_blocking(|| -> anyhow::Result<String> { Ok(rpassword::read_password()?) }).await??;

    print!("Confirm password: ");
    io::stdout().flush()?;
    let confirm = tokio::task::spawn_blocking(|| -> anyhow::Result<String> { Ok(rpassword::read_password()?) }).await??;

    if password != confirm {
        anyhow::bail!("passwords do not match");
    }
    if password.len() < 8 {
        anyhow::bail!("password must be at least 8 characters");
    }

    let pool = tokio::time::timeout(std::time::Duration::from_secs(10), db::create_pool(&config.database_url))
        .await
        .map_err(|_| anyhow::anyhow!("database connection timed out, is postgres running?"))??;

    let password_hash = auth::hash_password(&password)?;
    let user = db::users::create_user(&pool, username, &password_hash, is_admin).await?;

    println!("user created: {} (admin: {})", user.id, user.is_admin);
    Ok(())
}

async fn list_users(config: &Config) -> anyhow::Result<()> {
    let pool = db::create_pool(&config.database_url).await?;
    let users = db::users::list_users(&pool).await?;

    if users.is_empty() {
        println!("no users");
    } else {
        for user in users {
            let role = if user.is_admin { "admin" } else { "user" };
            println!("{} - {} ({})", user.id, user.username, role);
        }
    }

    Ok(())
}
