//! The CLI surface (§10.2). Replaces the teacher's single-purpose
//! `bin/webserver.rs` with a small subcommand binary: `serve` runs the HTTP
//! surface and the background supervisor side by side, `migrate` applies
//! the embedded migrations and exits.

use std::net::SocketAddr;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{debug, error, info};

use ragctl::application::config::Configuration;
use ragctl::application::Application;
use ragctl::{supervisor, webserver};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP surface and background supervisor.
    Serve(#[command(flatten)] Configuration),
    /// Apply catalog migrations and exit.
    Migrate(#[command(flatten)] Configuration),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve(config) => serve(config).await,
        Command::Migrate(config) => migrate(config).await,
    }
}

async fn migrate(config: Configuration) -> Result<()> {
    Application::install_logging(&config);
    let application = Application::initialize(config).await?;
    info!("migrations applied to {}", application.config.catalog_url);
    Ok(())
}

async fn serve(config: Configuration) -> Result<()> {
    Application::install_logging(&config);
    debug!("installed logging");

    let application = Application::initialize(config).await?;
    debug!("application initialized");

    run(application).await
}

async fn run(application: Application) -> Result<()> {
    let mut joins = tokio::task::JoinSet::new();

    tokio::spawn(supervisor::run(application.clone()));
    joins.spawn(start(application));

    while let Some(result) = joins.join_next().await {
        if let Ok(Err(err)) = result {
            error!(?err, "ragctl server failed");
            return Err(err);
        }
    }

    Ok(())
}

async fn start(app: Application) -> Result<()> {
    let bind = SocketAddr::new(app.config.host.parse()?, app.config.port);
    let router = webserver::build_router(app);

    info!(%bind, "ragctl listening");
    axum::Server::bind(&bind).serve(router.into_make_service()).await?;

    Ok(())
}
