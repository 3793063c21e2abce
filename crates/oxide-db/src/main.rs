//! oxide-db CLI
//!
//! Command-line tool for schema snapshots, upgrades and backups.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use oxide_db::prelude::*;

/// Schema snapshots, snapshot-driven upgrades and SQL backups.
#[derive(Parser)]
#[command(name = "oxide-db")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON configuration file. Flags override its values.
    #[arg(short, long, env = "DB_CONFIG")]
    config: Option<PathBuf>,

    /// Backend (`mysql` or `sqlite`).
    #[arg(long, env = "DB_BACKEND")]
    backend: Option<Backend>,

    /// Database host.
    #[arg(long, env = "DB_HOST")]
    host: Option<String>,

    /// Database port.
    #[arg(long, env = "DB_PORT")]
    port: Option<u16>,

    /// User name.
    #[arg(short, long, env = "DB_USERNAME")]
    username: Option<String>,

    /// Password.
    #[arg(short, long, env = "DB_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Database name (file path or `:memory:` for SQLite).
    #[arg(short, long, env = "DB_DATABASE_NAME")]
    database: Option<String>,

    /// Directory holding `schema/` and `backup/`.
    #[arg(short, long, env = "DB_ROOT")]
    root: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the version table if it is missing.
    Install {
        /// Version stored when the table is empty.
        #[arg(long, default_value_t = 1)]
        initial: i64,
    },

    /// List tables.
    Tables,

    /// Store a snapshot of the live schema under its current version.
    Snapshot,

    /// Show the steps between two stored snapshots without touching the
    /// database.
    Plan {
        /// Version to migrate from.
        #[arg(long)]
        from: i64,

        /// Version to migrate to (latest snapshot if not specified).
        #[arg(long)]
        to: Option<i64>,
    },

    /// Upgrade the live schema to a stored snapshot.
    Upgrade {
        /// Target version (latest snapshot if not specified).
        #[arg(long)]
        to: Option<i64>,
    },

    /// Write a backup of every table.
    Backup,

    /// Drop every table and replay a backup.
    Restore {
        /// Backup file (latest backup if not specified).
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Run a query and print its rows as JSON.
    Query {
        /// SQL text with `?` placeholders.
        sql: String,

        /// Parameters, bound as text.
        params: Vec<String>,
    },

    /// Run a statement or a multi-statement script.
    Exec {
        /// SQL text.
        sql: String,
    },
}

impl Cli {
    fn database_config(&self) -> anyhow::Result<DatabaseConfig> {
        let mut config = match &self.config {
            Some(path) => DatabaseConfig::load(path)?,
            None => DatabaseConfig::default(),
        };
        if let Some(backend) = self.backend {
            config.backend = backend;
        }
        if let Some(host) = &self.host {
            config.host.clone_from(host);
        }
        if let Some(port) = self.port {
            config.port = Some(port);
        }
        if let Some(username) = &self.username {
            config.username.clone_from(username);
        }
        if let Some(password) = &self.password {
            config.password.clone_from(password);
        }
        if let Some(database) = &self.database {
            config.database.clone_from(database);
        }
        if let Some(root) = &self.root {
            config.root.clone_from(root);
        }
        Ok(config)
    }
}

fn print_plan(db: &Database, from: i64, to: Option<i64>) -> anyhow::Result<()> {
    let store = db.layout().snapshots();
    let current = store.load(from)?;
    let target = match to {
        Some(version) => store.load(version)?,
        None => store.latest()?,
    };
    let plan = plan(&current, &target);
    if plan.is_empty() {
        info!("Snapshots {} and {} match.", plan.from, plan.to);
    } else {
        println!("\nPlan {} -> {}:", plan.from, plan.to);
        println!("{:-<60}", "");
        for step in &plan.steps {
            println!(" {step}");
        }
        println!();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = cli.database_config()?;
    let mut db = Database::new(config);

    // Planning only reads snapshot files
    if let Commands::Plan { from, to } = cli.command {
        return print_plan(&db, from, to);
    }

    db.connect().await?;

    match cli.command {
        Commands::Install { initial } => {
            let version = db.install_version_table(initial).await?;
            info!("Version table ready at version {version}.");
        }

        Commands::Tables => {
            for table in db.tables().await? {
                println!("{table}");
            }
        }

        Commands::Snapshot => {
            let snapshot = db.capture().await?;
            info!(
                "Stored snapshot {} with {} tables.",
                snapshot.version,
                snapshot.tables.len()
            );
        }

        Commands::Plan { .. } => {}

        Commands::Upgrade { to } => match db.upgrade(to).await {
            Ok(plan) => {
                for step in &plan.steps {
                    println!(" [X] {step}");
                }
                info!("Upgraded from version {} to {}.", plan.from, plan.to);
            }
            Err(err) if err.is_no_op() => info!("{err}"),
            Err(err) => return Err(err.into()),
        },

        Commands::Backup => {
            let path = db.backup().await?;
            println!("{}", path.display());
        }

        Commands::Restore { file } => {
            let path = db.restore(file.as_deref()).await?;
            info!("Restored {}.", path.display());
        }

        Commands::Query { sql, params } => {
            let params: Vec<Value> = params.into_iter().map(Value::from).collect();
            let rows = db.select(&sql, &params).await?;
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }

        Commands::Exec { sql } => {
            let affected = db.execute_script(&sql).await?;
            info!("{affected} rows affected.");
        }
    }

    db.disconnect().await?;
    Ok(())
}
