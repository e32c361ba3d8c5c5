use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use courier_core::{
    config::Config,
    crypto::{CredentialVault, EncryptionKey},
    domain::{Attachment, ConnectionInput, ContentType, EmailAddress, EmailRequest, ProviderKind},
    email::{factory, DefaultEmailProviderFactory},
    repository::JsonFileConnectionRepository,
    service::{DeliveryOptions, DeliveryOrchestrator, TracingDeliveryLog},
    telemetry, ConnectionRegistry,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "courier-core", about = "Send transactional email through prioritized providers")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print every provider's options as JSON
    Providers,
    /// List stored connections with credentials masked
    List,
    /// Create or replace a connection from a JSON file
    Save {
        #[arg(long, value_name = "FILE")]
        input: PathBuf,
    },
    /// Delete a stored connection
    Delete {
        #[arg(long)]
        connection: Uuid,
    },
    /// Authenticate one stored connection against its provider
    Verify {
        #[arg(long)]
        connection: Uuid,
    },
    /// Deliver an email
    Send {
        #[arg(long, required = true)]
        to: Vec<String>,
        #[arg(long)]
        from: Option<String>,
        #[arg(long)]
        subject: String,
        #[arg(long)]
        body: String,
        #[arg(long, default_value_t = false)]
        html: bool,
        #[arg(long = "attach", value_name = "PATH")]
        attachments: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    let metrics_handle = telemetry::init(&config.telemetry);

    let result = run(cli.command, &config).await;

    if let Some(handle) = metrics_handle {
        eprintln!("{}", handle.render());
    }
    result
}

type Orchestrator = DeliveryOrchestrator<JsonFileConnectionRepository>;

/// Open the JSON connection store and wire the orchestrator around it
async fn open(config: &Config) -> Result<Orchestrator> {
    let key = config
        .encryption_key
        .as_deref()
        .context("SETTINGS_ENCRYPTION_KEY must be set")?;
    let vault = CredentialVault::new(
        EncryptionKey::from_base64(key).context("Invalid SETTINGS_ENCRYPTION_KEY")?,
    );
    let repo = Arc::new(JsonFileConnectionRepository::new(&config.connections_file));
    let registry = Arc::new(ConnectionRegistry::load(repo, vault).await?);

    let factory = DefaultEmailProviderFactory::new(
        config.delivery.http_timeout(),
        config.mailgun.clone(),
    )?;

    Ok(DeliveryOrchestrator::new(
        registry,
        Arc::new(factory),
        Arc::new(TracingDeliveryLog),
        DeliveryOptions::from(&config.delivery),
    ))
}

async fn run(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Providers => {
            let mut catalogue = serde_json::Map::new();
            for kind in ProviderKind::ALL {
                catalogue.insert(kind.to_string(), serde_json::to_value(factory::describe(kind))?);
            }
            println!("{}", serde_json::to_string_pretty(&catalogue)?);
        }
        Commands::List => {
            let orchestrator = open(config).await?;
            let registry = orchestrator.registry();
            let masked = registry
                .snapshot()
                .iter()
                .map(|c| registry.masked(c.id))
                .collect::<courier_core::Result<Vec<_>>>()?;
            println!("{}", serde_json::to_string_pretty(&masked)?);
        }
        Commands::Save { input } => {
            let raw = tokio::fs::read(&input)
                .await
                .with_context(|| format!("Failed to read {}", input.display()))?;
            let input: ConnectionInput =
                serde_json::from_slice(&raw).context("Malformed connection input")?;
            let saved = open(config).await?.registry().save(input).await?;
            info!(connection_id = %saved.id, "Connection stored");
            println!("{}", saved.id);
        }
        Commands::Delete { connection } => {
            open(config).await?.registry().delete(connection).await?;
        }
        Commands::Verify { connection } => {
            let auth = open(config).await?.verify(connection).await?;
            println!("{}", serde_json::to_string_pretty(&auth)?);
        }
        Commands::Send {
            to,
            from,
            subject,
            body,
            html,
            attachments,
        } => {
            let request = EmailRequest {
                from: from.map(EmailAddress::new),
                to: to.into_iter().map(EmailAddress::new).collect(),
                subject,
                body,
                content_type: if html {
                    ContentType::Html
                } else {
                    ContentType::Text
                },
                attachments: attachments.into_iter().map(Attachment::Path).collect(),
                ..Default::default()
            };

            let orchestrator = open(config).await?;
            let outcome = orchestrator
                .deliver_until(&request, async {
                    tokio::signal::ctrl_c().await.ok();
                })
                .await;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            if !outcome.success {
                anyhow::bail!("{}", outcome.message);
            }
        }
    }

    Ok(())
}
