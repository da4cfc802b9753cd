//! stixgraph server and terminal dashboard.
//!
//! Usage:
//!   stixgraph serve --config stixgraph.toml
//!   stixgraph radar --url http://127.0.0.1:4000 --token T --entity ID

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use stixgraph_dashboard::{GraphqlClient, RadarProps, RadarView, RadarWidget};
use stixgraph_domain::StixDomainEntityService;
use stixgraph_server::App;
use stixgraph_server::config::{LogFormat, ServerConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "stixgraph")]
#[command(about = "Threat intelligence knowledge graph server")]
struct Cli {
    /// Enable verbose debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the GraphQL server
    Serve(ServeArgs),
    /// Render the relation distribution radar of an entity
    Radar(RadarArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on
    #[arg(long, env = "STIXGRAPH_LISTEN")]
    listen: Option<SocketAddr>,

    /// SQLite database path, or `:memory:`
    #[arg(long, env = "STIXGRAPH_DATABASE")]
    database: Option<String>,
}

#[derive(Args, Debug)]
struct RadarArgs {
    #[arg(long, env = "STIXGRAPH_URL", default_value = "http://127.0.0.1:4000")]
    url: String,

    #[arg(long, env = "STIXGRAPH_TOKEN")]
    token: Option<String>,

    /// Entity the relations start from
    #[arg(long)]
    entity: String,

    /// Only count relations to entities of this type
    #[arg(long)]
    entity_type: Option<String>,

    #[arg(long)]
    relation_type: Option<String>,

    /// Field of the other end to group by
    #[arg(long, default_value = "entity_type")]
    field: String,

    /// Also count relations inferred through this relation type
    #[arg(long)]
    resolve_relation_type: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Serve(args) => serve(args, cli.verbose).await,
        Command::Radar(args) => {
            init_logging(cli.verbose, LogFormat::Compact);
            radar(args).await
        }
    }
}

fn init_logging(verbose: bool, format: LogFormat) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);
    match format {
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn serve(args: ServeArgs, verbose: bool) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => ServerConfig::default(),
    };
    if let Some(listen) = args.listen {
        config.listen = listen;
    }
    if let Some(database) = args.database {
        config.database = database;
    }
    init_logging(verbose, config.log_format);

    info!("stixgraph starting...");
    let generated_admin = config.ensure_admin().cloned();

    let app = App::build(&config).context("Failed to open the database")?;
    if let Some(worker) = app.exporter {
        worker.spawn();
        info!("export worker running");
    }

    let listener = tokio::net::TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen))?;
    let address = listener.local_addr()?;
    info!(%address, database = %config.database, "listening");

    println!("\n========================================");
    println!("  stixgraph running");
    println!("========================================");
    println!("  GraphQL:   http://{address}/graphql");
    println!("  WebSocket: ws://{address}/graphql/ws");
    println!("  Database:  {}", config.database);
    if let Some(admin) = generated_admin {
        println!("\n  No users configured; generated admin token:");
        println!("  {}", admin.token);
    }
    println!("========================================\n");

    let router = stixgraph_server::build_router(app.state);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(app.service))
        .await
        .context("HTTP server failed")?;
    info!("stixgraph stopped");
    Ok(())
}

/// Waits for Ctrl-C, then ends every open subscription.
async fn shutdown_signal(service: StixDomainEntityService) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
    service.backends().bus.shutdown();
}

async fn radar(args: RadarArgs) -> Result<()> {
    let mut client = GraphqlClient::new(&args.url).context("Failed to build HTTP client")?;
    if let Some(token) = args.token {
        client = client.with_token(token);
    }

    let mut props = RadarProps::new(args.entity, args.field);
    if let Some(entity_type) = args.entity_type {
        props = props.with_entity_type(entity_type);
    }
    if let Some(relation_type) = args.relation_type {
        props = props.with_relation_type(relation_type);
    }
    if let Some(resolve) = args.resolve_relation_type {
        props = props.resolving(resolve);
    }

    let mut widget = RadarWidget::new(props);
    widget.load(&client).await;
    print!("{}", widget.render_text());
    if let RadarView::Error { message } = widget.view() {
        anyhow::bail!("radar query failed: {message}");
    }
    Ok(())
}
