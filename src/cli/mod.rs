//! Command-line interface for snapforge.
//!
//! Provides commands for building a snapshot, validating a config file,
//! and previewing which source image a build would use.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::warn;

use crate::adapters::{IonosClient, ResourceClient};
use crate::config::{load_config, BuildConfig};
use crate::core::{Builder, CancelToken};
use crate::steps::select_image;

/// snapforge - build IONOS Cloud snapshots from a disposable server
#[derive(Parser, Debug)]
#[command(name = "snapforge")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Where the config comes from and credential overrides
#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Config file (searches for snapforge.yaml if not provided)
    pub config: Option<PathBuf>,

    /// IONOS Cloud username
    #[arg(long, env = "IONOS_USERNAME")]
    pub username: Option<String>,

    /// IONOS Cloud password
    #[arg(long, env = "IONOS_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
}

impl ConfigArgs {
    fn load(self) -> Result<BuildConfig> {
        let mut config = load_config(self.config.as_deref())?;
        if let Some(username) = self.username {
            config.username = username;
        }
        if let Some(password) = self.password {
            config.password = password;
        }
        Ok(config)
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build a snapshot
    Build {
        #[command(flatten)]
        args: ConfigArgs,

        /// Name of the snapshot to create
        #[arg(long)]
        snapshot_name: Option<String>,
    },

    /// Validate a config file and print it with secrets masked
    Validate {
        #[command(flatten)]
        args: ConfigArgs,
    },

    /// List images in the configured location and mark the one a build would use
    Images {
        #[command(flatten)]
        args: ConfigArgs,
    },
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Build {
                args,
                snapshot_name,
            } => build(args, snapshot_name).await,
            Commands::Validate { args } => validate(args),
            Commands::Images { args } => list_images(args).await,
        }
    }
}

async fn build(args: ConfigArgs, snapshot_name: Option<String>) -> Result<()> {
    let mut config = args.load()?;
    if let Some(name) = snapshot_name {
        config.snapshot_name = name;
    }
    config.validate()?;

    let client = Arc::new(IonosClient::from_config(&config).context("Failed to create API client")?);
    let builder = Builder::new(config, client);

    let cancel = CancelToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling build and cleaning up");
            on_interrupt.cancel();
        }
    });

    let artifact = builder.run(cancel).await?;
    println!(
        "{}",
        serde_json::to_string_pretty(&artifact).context("Failed to serialize artifact")?
    );
    Ok(())
}

fn validate(args: ConfigArgs) -> Result<()> {
    let config = args.load()?;
    config.validate()?;

    print!("{}", serde_yaml::to_string(&config.redacted())?);
    eprintln!("\n[Config is valid]");
    Ok(())
}

async fn list_images(args: ConfigArgs) -> Result<()> {
    let config = args.load()?;
    let client = IonosClient::from_config(&config).context("Failed to create API client")?;

    let images = client
        .list_images()
        .await
        .context("Failed to list images")?;
    let selected = select_image(&images, &config.image, &config.disk_type, &config.location)
        .map(|image| image.id.clone());

    let local: Vec<_> = images
        .iter()
        .filter(|image| image.properties.location.as_deref() == Some(config.location.as_str()))
        .collect();
    if local.is_empty() {
        println!("No images found in {}", config.location);
        return Ok(());
    }

    println!("  {:<38} {:<40} {:<8} {:<6}", "IMAGE ID", "NAME", "TYPE", "PUBLIC");
    println!("{}", "-".repeat(96));
    for image in local {
        let marker = if selected.as_deref() == Some(image.id.as_str()) { "*" } else { " " };
        println!(
            "{} {:<38} {:<40} {:<8} {:<6}",
            marker,
            image.id,
            image.properties.name.as_deref().unwrap_or("-"),
            image.properties.image_type.as_deref().unwrap_or("-"),
            image.properties.public
        );
    }

    if selected.is_none() {
        eprintln!(
            "\n[No image matches '{}' ({} in {}); the volume would be created without one]",
            config.image,
            config.disk_type,
            config.location
        );
    }
    Ok(())
}
