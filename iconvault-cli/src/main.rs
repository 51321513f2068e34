//! Iconvault - versioned icon assets kept consistent between a relational
//! catalog and a git tree
//!
//! Main entry point: subcommands over the core coordinator, wired to the
//! persistent adapters (SQLite catalog + git tree) from configuration.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tabled::{settings::Style, Table, Tabled};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use iconvault_core::catalog::SqliteCatalog;
use iconvault_core::config::VaultConfig;
use iconvault_core::domain::{Iconfile, IconfileDescriptor};
use iconvault_core::sync::SyncCoordinator;
use iconvault_core::tree::GitTree;

/// Log levels
#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_filter_directive(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Parser, Debug)]
#[clap(
    name = "iconvault",
    about = "Versioned icon assets, kept consistent between a relational catalog and a git tree",
    version
)]
struct Cli {
    #[clap(subcommand)]
    command: Command,

    /// Override configuration file path
    #[clap(long, global = true)]
    config: Option<PathBuf>,

    /// Set log level (overrides the configured level)
    #[clap(long, global = true)]
    log_level: Option<LogLevel>,

    /// Acting user recorded in catalog metadata and commit messages
    #[clap(long, global = true, default_value = "local")]
    user: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Initialize the data directories and write the default configuration
    Init,

    /// Create an icon from a file
    Create {
        /// Icon name
        name: String,
        /// File holding the rendition bytes
        file: PathBuf,
        /// Rendition format, e.g. svg
        #[clap(long)]
        format: String,
        /// Rendition size, e.g. 24px
        #[clap(long)]
        size: String,
    },

    /// Add a rendition to an existing icon
    Add {
        name: String,
        file: PathBuf,
        #[clap(long)]
        format: String,
        #[clap(long)]
        size: String,
    },

    /// Remove one rendition (removing the last one deletes the icon)
    Remove {
        name: String,
        #[clap(long)]
        format: String,
        #[clap(long)]
        size: String,
    },

    /// Delete an icon with all its renditions
    Delete { name: String },

    /// Attach a tag to an icon
    Tag { name: String, tag: String },

    /// Detach a tag from an icon
    Untag { name: String, tag: String },

    /// List all icons
    List {
        /// Emit JSON instead of a table
        #[clap(long)]
        json: bool,
    },

    /// Show one icon
    Show {
        name: String,
        #[clap(long)]
        json: bool,
    },

    /// Write a rendition's bytes to a file or stdout
    Export {
        name: String,
        #[clap(long)]
        format: String,
        #[clap(long)]
        size: String,
        /// Output file (stdout if omitted)
        #[clap(long)]
        out: Option<PathBuf>,
    },

    /// List the tag vocabulary
    Tags,

    /// Verify both stores agree and the tree is clean
    Audit {
        #[clap(long)]
        json: bool,
    },
}

#[derive(Tabled)]
struct IconRow {
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "RENDITIONS")]
    renditions: String,
    #[tabled(rename = "TAGS")]
    tags: String,
    #[tabled(rename = "MODIFIED BY")]
    modified_by: String,
}

fn init_logging(directive: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(directive.to_string()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn open_coordinator(
    config: &VaultConfig,
) -> Result<SyncCoordinator<SqliteCatalog, GitTree>> {
    if let Some(parent) = config.catalog_location.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let catalog = SqliteCatalog::open(&config.catalog_location).with_context(|| {
        format!(
            "failed to open catalog at {}",
            config.catalog_location.display()
        )
    })?;
    let tree = GitTree::init(&config.tree_location)
        .await
        .with_context(|| format!("failed to open tree at {}", config.tree_location.display()))?;
    Ok(
        SyncCoordinator::new(Arc::new(catalog), Arc::new(tree), config.path_mapper())
            .with_call_timeout(config.store_timeout()),
    )
}

async fn read_rendition(file: &PathBuf, format: &str, size: &str) -> Result<Iconfile> {
    let content = tokio::fs::read(file)
        .await
        .with_context(|| format!("failed to read {}", file.display()))?;
    Ok(Iconfile::new(IconfileDescriptor::new(format, size), content))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(VaultConfig::config_file_path);
    let config = VaultConfig::load_or_default(&config_path).await?;

    let directive = cli
        .log_level
        .as_ref()
        .map(|level| level.to_filter_directive().to_string())
        .unwrap_or_else(|| config.log_level.clone());
    init_logging(&directive);
    debug!("configuration loaded from {}", config_path.display());

    if let Command::Init = cli.command {
        if !config_path.exists() {
            config.save_to_path(&config_path).await?;
            println!("wrote {}", config_path.display());
        }
        open_coordinator(&config).await?;
        println!("catalog: {}", config.catalog_location.display());
        println!("tree:    {}", config.tree_location.display());
        return Ok(());
    }

    let coordinator = open_coordinator(&config).await?;

    match cli.command {
        Command::Init => unreachable!("handled above"),

        Command::Create {
            name,
            file,
            format,
            size,
        } => {
            let iconfile = read_rendition(&file, &format, &size).await?;
            coordinator.create_icon(&name, iconfile, &cli.user).await?;
            println!("created \"{name}\" with {format}@{size}");
        }

        Command::Add {
            name,
            file,
            format,
            size,
        } => {
            let iconfile = read_rendition(&file, &format, &size).await?;
            let path = coordinator.add_iconfile(&name, iconfile, &cli.user).await?;
            println!("added {format}@{size} to \"{name}\" at {path}");
        }

        Command::Remove { name, format, size } => {
            let descriptor = IconfileDescriptor::new(format, size);
            coordinator
                .delete_iconfile(&name, &descriptor, &cli.user)
                .await?;
            println!("removed {descriptor} from \"{name}\"");
        }

        Command::Delete { name } => {
            coordinator.delete_icon(&name, &cli.user).await?;
            println!("deleted \"{name}\"");
        }

        Command::Tag { name, tag } => {
            coordinator.add_tag(&name, &tag).await?;
            println!("tagged \"{name}\" with \"{tag}\"");
        }

        Command::Untag { name, tag } => {
            coordinator.remove_tag(&name, &tag).await?;
            println!("removed tag \"{tag}\" from \"{name}\"");
        }

        Command::List { json } => {
            let icons = coordinator.describe_all_icons().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&icons)?);
            } else if icons.is_empty() {
                println!("no icons");
            } else {
                let rows: Vec<IconRow> = icons
                    .iter()
                    .map(|icon| IconRow {
                        name: icon.attributes.name.clone(),
                        renditions: icon
                            .iconfiles
                            .iter()
                            .map(ToString::to_string)
                            .collect::<Vec<_>>()
                            .join(", "),
                        tags: icon
                            .attributes
                            .tags
                            .iter()
                            .cloned()
                            .collect::<Vec<_>>()
                            .join(", "),
                        modified_by: icon.attributes.modified_by.clone(),
                    })
                    .collect();
                let mut table = Table::new(rows);
                table.with(Style::sharp());
                println!("{table}");
            }
        }

        Command::Show { name, json } => {
            let icon = coordinator.describe_icon(&name).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&icon)?);
            } else {
                println!("name:        {}", icon.attributes.name);
                println!("modified by: {}", icon.attributes.modified_by);
                println!(
                    "tags:        {}",
                    icon.attributes
                        .tags
                        .iter()
                        .cloned()
                        .collect::<Vec<_>>()
                        .join(", ")
                );
                for descriptor in &icon.iconfiles {
                    let path = coordinator.mapper().to_path(&name, descriptor)?;
                    println!("  {descriptor}  ->  {path}");
                }
            }
        }

        Command::Export {
            name,
            format,
            size,
            out,
        } => {
            let descriptor = IconfileDescriptor::new(format, size);
            let content = coordinator.get_iconfile_content(&name, &descriptor).await?;
            match out {
                Some(path) => {
                    tokio::fs::write(&path, &content)
                        .await
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    println!("wrote {} bytes to {}", content.len(), path.display());
                }
                None => {
                    use tokio::io::AsyncWriteExt;
                    tokio::io::stdout().write_all(&content).await?;
                }
            }
        }

        Command::Tags => {
            for tag in coordinator.list_tags().await? {
                println!("{tag}");
            }
        }

        Command::Audit { json } => {
            let report = coordinator.run_consistency_audit().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else if report.is_consistent() {
                println!("consistent: {} files checked, tree clean", report.files_checked);
            } else {
                println!(
                    "{} divergences ({} files checked):",
                    report.divergences.len(),
                    report.files_checked
                );
                for divergence in &report.divergences {
                    println!("  {divergence}");
                }
            }
            if !report.is_consistent() {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
