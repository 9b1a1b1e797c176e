use anyhow::Context;
use clap::{Args as ClapArgs, Parser, Subcommand};
use logistics_ingest::runner::{
    ConnectionStatus, ConsistencyReport, Entity, LoadOptions, LoadSummary, PoolArgsBuilder, Store,
    TableNulls, TableStats,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(version, about = "Load logistics data files into a relational store")]
struct Args {
    #[command(flatten)]
    connection: ConnectionArgs,

    /// Quiet mode - minimal output, only show summary
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(ClapArgs)]
struct ConnectionArgs {
    /// Database host
    #[arg(long, env = "LOGISTICS_DB_HOST", default_value = "localhost")]
    host: String,

    /// Database port
    #[arg(long, env = "LOGISTICS_DB_PORT", default_value = "5432")]
    port: u16,

    /// Database username
    #[arg(short, long, env = "LOGISTICS_DB_USER", default_value = "postgres")]
    username: String,

    /// Database password
    #[arg(long, env = "LOGISTICS_DB_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Database name
    #[arg(short, long, env = "LOGISTICS_DB_NAME", default_value = "logistics")]
    database: String,

    /// Maximum pooled connections
    #[arg(long, default_value = "5")]
    max_connections: u32,
}

#[derive(Subcommand)]
enum Command {
    /// Create all tables and indexes (idempotent)
    Init,
    /// Drop every table and recreate the schema
    Reset {
        /// Confirm that all loaded data should be destroyed
        #[arg(long)]
        yes: bool,
    },
    /// Load every entity from its conventional file under a directory
    Load {
        /// Directory holding courier_staff.csv, routes.csv, warehouses.json,
        /// shipments.json, costs.csv and shipment_tracking.csv
        #[arg(short, long, default_value = "data")]
        base_path: PathBuf,

        /// Records per upsert statement
        #[arg(short = 'n', long, default_value = "500")]
        batch_size: usize,
    },
    /// Load a single entity from an explicit file
    LoadEntity {
        /// Entity to load (courier, route, warehouse, shipment, cost, tracking)
        #[arg(short, long, value_parser = parse_entity)]
        entity: Entity,

        /// Source file (.csv, .tsv or .json)
        #[arg(short, long)]
        file: PathBuf,

        /// Records per upsert statement
        #[arg(short = 'n', long, default_value = "500")]
        batch_size: usize,
    },
    /// Report orphaned rows and unknown references
    Check {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show row counts per table
    Stats {
        /// Print the statistics as JSON
        #[arg(long)]
        json: bool,
    },
    /// Count NULLs in every column of every table
    MissingValues {
        /// Print the counts as JSON
        #[arg(long)]
        json: bool,
    },
    /// Verify the store is reachable and list which tables exist
    CheckConnection,
}

fn parse_entity(s: &str) -> Result<Entity, String> {
    Entity::parse(s).ok_or_else(|| {
        format!("unknown entity '{s}'. Valid entities: courier, route, warehouse, shipment, cost, tracking")
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing based on quiet mode
    use tracing_subscriber::{EnvFilter, FmtSubscriber};
    let filter = if args.quiet {
        EnvFilter::new("logistics_ingest=warn,sqlx=off")
    } else {
        EnvFilter::new("logistics_ingest=info,sqlx=off")
    };
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    let store = connect(&args.connection).await?;

    match args.command {
        Command::Init => {
            store.init_schema().await?;
            println!("Schema initialized");
        }
        Command::Reset { yes } => {
            if !yes {
                anyhow::bail!("reset drops every table and its data; pass --yes to confirm");
            }
            store.reset_schema().await?;
            println!("Schema reset");
        }
        Command::Load {
            base_path,
            batch_size,
        } => {
            let options = LoadOptions {
                batch_size,
                quiet: args.quiet,
            };
            let summary = store
                .load_all(&base_path, &options)
                .await
                .with_context(|| format!("failed to load data from {}", base_path.display()))?;
            print_summary(&summary);
        }
        Command::LoadEntity {
            entity,
            file,
            batch_size,
        } => {
            let options = LoadOptions {
                batch_size,
                quiet: args.quiet,
            };
            let summary = store
                .load_entity(entity, &file, &options)
                .await
                .with_context(|| format!("failed to load {} data from {}", entity, file.display()))?;
            print_summary(&summary);
        }
        Command::Check { json } => {
            let report = store.check_consistency().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
        }
        Command::Stats { json } => {
            let stats = store.table_statistics().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                print_stats(&stats);
            }
        }
        Command::MissingValues { json } => {
            let report = store.missing_values().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_missing_values(&report);
            }
        }
        Command::CheckConnection => {
            let status = store.check_connection().await?;
            print_connection_status(&status);
        }
    }

    Ok(())
}

async fn connect(connection: &ConnectionArgs) -> anyhow::Result<Store> {
    let mut builder = PoolArgsBuilder::default();
    builder
        .host(&connection.host)
        .port(connection.port)
        .username(&connection.username)
        .database(&connection.database)
        .max_pool_size(connection.max_connections);
    if let Some(password) = &connection.password {
        builder.password(password);
    }
    let pool_args = builder.build()?;

    Store::connect(pool_args).await.with_context(|| {
        format!(
            "could not connect to {}:{}/{}",
            connection.host, connection.port, connection.database
        )
    })
}

fn print_summary(summary: &LoadSummary) {
    println!();
    println!("Load Summary");
    println!("============");
    for result in &summary.entities {
        println!(
            "{:<16} {:>8} records {:>5} batches",
            result.entity.to_string(),
            result.records,
            result.batches
        );
    }
    println!("Records loaded: {}", summary.records_loaded());
    println!("Duration: {:.2}s", summary.duration.as_secs_f64());
}

fn print_report(report: &ConsistencyReport) {
    println!("Consistency Check");
    println!("=================");
    println!("Orphaned tracking events:   {}", report.orphaned_tracking_events);
    println!("Orphaned costs:             {}", report.orphaned_costs);
    println!("Unknown courier references: {}", report.unknown_courier_references);
    println!();
    if report.is_consistent() {
        println!("No issues found");
    } else {
        println!("Issues found; rows above reference records that do not exist");
    }
}

fn print_stats(stats: &[TableStats]) {
    println!("Table Statistics");
    println!("================");
    for table in stats {
        println!("{:<20} {:>10}", table.table, table.rows);
    }
}

fn print_missing_values(report: &[TableNulls]) {
    println!("Missing Values");
    println!("==============");
    for table in report {
        println!("{} ({} rows)", table.table, table.rows);
        let mut clean = true;
        for column in table.with_nulls() {
            println!("  {:<20} {:>10}", column.column, column.nulls);
            clean = false;
        }
        if clean {
            println!("  no missing values");
        }
    }
}

fn print_connection_status(status: &ConnectionStatus) {
    println!("Connection OK");
    println!(
        "Tables present: {}/{}",
        status.present.len(),
        status.present.len() + status.missing.len()
    );
    if !status.missing.is_empty() {
        println!("Missing tables: {} (run `init`)", status.missing.join(", "));
    }
}
