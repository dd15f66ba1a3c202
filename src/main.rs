use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing::info;

mod api;
mod config;
mod engine;
mod error;
mod models;
mod notify;
mod report;
mod stats;
mod store;

use crate::config::Config;
use crate::engine::StudentStateEngine;
use crate::notify::{DisabledNotifier, Notifier, WebhookNotifier};
use crate::store::{InMemoryStore, PostgresStore, StudentStore};

#[derive(Parser)]
#[command(name = "focusloop")]
#[command(about = "Study check-ins and mentor interventions for FocusLoop", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load demo students and check-ins
    Seed,
    /// Run the HTTP API
    Serve {
        /// Address to bind the server to
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,
        /// Port to listen on
        #[arg(long, default_value_t = 3001)]
        port: u16,
        /// Keep all data in memory instead of Postgres
        #[arg(long)]
        in_memory: bool,
    },
    /// Write a markdown digest for mentors
    Report {
        #[arg(long, default_value = "mentor-digest.md")]
        out: PathBuf,
    },
}

async fn connect(config: &Config) -> anyhow::Result<PostgresStore> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_db_connections)
        .connect(config.require_database_url()?)
        .await
        .context("failed to connect to Postgres")?;
    Ok(PostgresStore::new(pool))
}

fn notifier(config: &Config) -> anyhow::Result<Arc<dyn Notifier>> {
    match &config.webhook_url {
        Some(url) => {
            info!("mentor alerts enabled");
            let notifier =
                WebhookNotifier::new(url.as_str()).context("failed to build webhook client")?;
            Ok(Arc::new(notifier))
        }
        None => {
            info!("MENTOR_WEBHOOK_URL not set, mentor alerts will only be logged");
            Ok(Arc::new(DisabledNotifier))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("focusloop=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Commands::InitDb => {
            connect(&config).await?.init_db().await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            connect(&config).await?.seed().await?;
            println!("Seed data inserted.");
        }
        Commands::Serve {
            bind,
            port,
            in_memory,
        } => {
            let store: Arc<dyn StudentStore> = if in_memory {
                info!("using in-memory store, data will not survive a restart");
                Arc::new(InMemoryStore::new())
            } else {
                Arc::new(connect(&config).await?)
            };
            let engine = StudentStateEngine::new(store, notifier(&config)?);
            let state = api::AppState::new(Arc::new(engine), config.expose_error_details());
            let app = api::router(state);

            let addr: SocketAddr = format!("{bind}:{port}")
                .parse()
                .context("invalid bind address")?;
            info!(%addr, app_env = %config.app_env, "listening");

            let listener = tokio::net::TcpListener::bind(addr).await?;
            axum::serve(listener, app).await?;
        }
        Commands::Report { out } => {
            let store = Arc::new(connect(&config).await?);
            let engine = StudentStateEngine::new(store, notifier(&config)?);

            let mut details = Vec::new();
            for student in engine.list_students().await? {
                details.push(engine.student_detail(student.id).await?);
            }

            let cutoff = stats::cutoff(Utc::now(), stats::ROLLING_WINDOW_DAYS);
            let report = report::build_report(stats::ROLLING_WINDOW_DAYS, cutoff, &details);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
