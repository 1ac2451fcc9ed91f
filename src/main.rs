use clap::{Parser, Subcommand};
use forum_api::db::connect_with_retry;
use forum_api::migration::{InitDbOutcome, MigrationSource, Migrator};
use forum_api::{shutdown_signal, Bootstrap, BootstrapError, Settings};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Forum REST API with versioned PostgreSQL migrations.")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Migrate the database, then serve HTTP until SIGINT/SIGTERM (default).
    Serve,
    /// Validate and register the migration source, and print the plan.
    Init,
    /// Create the bookkeeping table and apply the initial schema.
    InitDb,
    /// Apply pending migrations.
    Upgrade,
    /// Show applied and pending migrations.
    Status,
    /// Print the declared model graph as JSON.
    Schema,
}

fn init_logger() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("forum_api=info,tower_http=info")),
        )
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logger();

    let result = match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => Bootstrap::new().run(Settings::from_env(), shutdown_signal()).await,
        other => run_command(other).await,
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn registered_migrator() -> Result<Migrator, BootstrapError> {
    let mut migrator = Migrator::new();
    migrator.init(MigrationSource::forum())?;
    Ok(migrator)
}

async fn run_command(command: Command) -> Result<(), BootstrapError> {
    match command {
        Command::Schema => {
            let graph = forum_api::models::model_graph();
            println!("{}", serde_json::to_string_pretty(&graph).unwrap_or_default());
            Ok(())
        }
        Command::Init => {
            let migrator = registered_migrator()?;
            let source = migrator.source()?;
            println!("migration source '{}' is valid", source.app);
            for m in &source.migrations {
                println!("{}  checksum {}", m.id(), m.checksum());
                for step in &m.steps {
                    println!("    {}", step.describe());
                }
            }
            Ok(())
        }
        Command::InitDb | Command::Upgrade | Command::Status => {
            let settings = Settings::from_env()?;
            let migrator = registered_migrator()?;
            let pool = connect_with_retry(&settings.database).await?;
            match command {
                Command::InitDb => match migrator.init_db(&pool).await? {
                    InitDbOutcome::Initialized { applied } => println!("initialized, applied {}", applied),
                    InitDbOutcome::AlreadyInitialized => println!("already initialized, nothing to do"),
                },
                Command::Upgrade => {
                    let applied = migrator.upgrade(&pool).await?;
                    if applied.is_empty() {
                        println!("up to date");
                    }
                    for id in applied {
                        println!("applied {}", id);
                    }
                }
                _ => {
                    for s in migrator.status(&pool).await? {
                        match s.applied_at {
                            Some(at) => println!("{}  applied {}", s.id, at.to_rfc3339()),
                            None => println!("{}  pending", s.id),
                        }
                    }
                }
            }
            pool.close().await;
            Ok(())
        }
        Command::Serve => Bootstrap::new().run(Settings::from_env(), shutdown_signal()).await,
    }
}
