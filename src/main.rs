use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use feature_tree::{
    api,
    config::ServerConfig,
    db::Database,
    mcp,
    models::BulkCreateInput,
    serialize::{self, ExportFormat, ImportFormat},
};

#[derive(Parser)]
#[command(name = "ftree")]
#[command(about = "Hierarchical work-decomposition trees with automatic status rollup")]
struct Cli {
    /// SQLite database file (overrides FEATURE_TREE_DB)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Port for HTTP API (overrides FEATURE_TREE_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Start MCP server via stdio
    Mcp,
    /// Print a project's tree to stdout
    Export {
        /// Project UUID
        #[arg(long)]
        project: Uuid,
        /// structured, outline, or tabular
        #[arg(short, long, default_value = "structured")]
        format: String,
        /// Include node descriptions
        #[arg(long)]
        descriptions: bool,
    },
    /// Parse an exported file and print the resulting batch
    Import {
        /// structured or tabular
        #[arg(short, long, default_value = "structured")]
        format: String,
        /// File to read
        file: PathBuf,
        /// Project to create the nodes in (with --confirm)
        #[arg(long)]
        project: Option<Uuid>,
        /// Create the nodes instead of only previewing them
        #[arg(long, requires = "project")]
        confirm: bool,
    },
}

/// Initialize tracing with output to stderr (for MCP and piped output) or stdout
fn init_tracing(use_stderr: bool) {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG")
            .unwrap_or_else(|_| "feature_tree=debug,tower_http=debug".into()),
    );

    if use_stderr {
        // stdout carries the protocol or the exported document
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

fn open_database(config: &ServerConfig) -> anyhow::Result<Database> {
    let db = match &config.db_path {
        Some(path) => Database::open(path.clone())
            .with_context(|| format!("Failed to open database at {}", path.display()))?,
        None => Database::open_default().context("Failed to open default database")?,
    };
    db.migrate().context("Failed to run migrations")?;
    Ok(db)
}

async fn serve(config: ServerConfig) -> anyhow::Result<()> {
    tracing::info!("Starting feature tree server on port {}", config.port);

    let db = open_database(&config)?;
    let app = api::create_router_with_config(db, &config);

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", config.port)).await?;
    tracing::info!(
        "Feature tree server listening on http://127.0.0.1:{}",
        config.port
    );

    axum::serve(listener, app).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let use_stderr = !matches!(cli.command, None | Some(Commands::Serve { .. }));
    init_tracing(use_stderr);

    let mut config = ServerConfig::from_env();
    if let Some(path) = cli.db {
        config.db_path = Some(path);
    }

    match cli.command {
        Some(Commands::Serve { port }) => {
            if let Some(port) = port {
                config.port = port;
            }
            serve(config).await?;
        }
        Some(Commands::Mcp) => {
            let db = open_database(&config)?;
            mcp::run_stdio_server(db).await?;
        }
        Some(Commands::Export {
            project,
            format,
            descriptions,
        }) => {
            let format = ExportFormat::from_str(&format)
                .with_context(|| format!("Unknown export format '{}'", format))?;
            let db = open_database(&config)?;
            let document = db.export(project, format, descriptions)?;
            print!("{}", document);
        }
        Some(Commands::Import {
            format,
            file,
            project,
            confirm,
        }) => {
            let format = ImportFormat::from_str(&format)
                .with_context(|| format!("Unknown import format '{}'", format))?;
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let nodes = serialize::import(&content, format)?;

            match project.filter(|_| confirm) {
                Some(project_id) => {
                    let db = open_database(&config)?;
                    let result = db.bulk_create(
                        project_id,
                        BulkCreateInput {
                            nodes,
                            created_by: Some("cli".to_string()),
                        },
                    )?;
                    tracing::info!("Imported {} nodes", result.created_count);
                    println!("{}", serde_json::to_string_pretty(&result)?);
                }
                None => println!("{}", serde_json::to_string_pretty(&nodes)?),
            }
        }
        None => serve(config).await?,
    }

    Ok(())
}
