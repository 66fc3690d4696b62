use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use culinarea::{
    auth, chat::ChatHub, config::Config, db,
    narration::{CommandDevice, Narrator, SilentDevice, SpeechDevice},
    storage::LocalStore, users::{self, Role}, AppState,
};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "culinarea")]
#[command(about = "Culinárea recipe and community site")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    config: Config,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the web server (default)
    Serve,
    /// Give an existing account a role: none, admin or propietary
    GrantRole {
        email: String,
        role: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "culinarea=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let Cli { config, command } = Cli::parse();
    let db_pool = db::connect(&config.database_url)
        .await
        .context("failed to open database")?;

    match command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config, db_pool).await,
        Command::GrantRole { email, role } => {
            let role: Role = role.parse()?;
            let user = users::find_by_email(&db_pool, &email).await?
                .with_context(|| format!("no account for {email}"))?;
            users::set_role(&db_pool, &user.id, role).await?;
            println!("{} is now {}", user.email, role.label());
            Ok(())
        }
    }
}

async fn serve(config: Config, db_pool: sqlx::SqlitePool) -> Result<()> {
    let clients = auth::Clients::load(config.oauth_secrets.as_deref(), &config.public_url)
        .await
        .context("failed to load OAuth client secrets")?;

    tokio::fs::create_dir_all(&config.storage_dir)
        .await
        .with_context(|| format!("failed to create {}", config.storage_dir.display()))?;
    let storage = Arc::new(LocalStore::new(&config.storage_dir, &config.files_url()));

    let device: Arc<dyn SpeechDevice> = match &config.speech_command {
        Some(command) => Arc::new(CommandDevice::parse(command)?),
        None => Arc::new(SilentDevice::new(Duration::from_millis(300))),
    };
    let narrator = Narrator::new(device, config.narration_delay(), &config.voice);

    let state = AppState {
        chat: ChatHub::new(db_pool.clone()),
        db_pool,
        clients,
        narrator,
        storage,
    };
    let app = culinarea::app(state, &config.storage_dir, config.session_ttl());

    let listener = tokio::net::TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("failed to bind {}", config.addr))?;
    info!("listening on {} ({})", config.addr, config.public_url);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!("cannot listen for ctrl-c: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!("cannot listen for SIGTERM: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received ctrl-c, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
