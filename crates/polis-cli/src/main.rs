use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::admin::AdminCmd;
use commands::game::GameCmd;

#[derive(Parser)]
#[command(name = "polis")]
#[command(about = "Operator CLI for the game event backbone", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Domain commands against a chat's game session
    Game {
        #[command(subcommand)]
        cmd: GameCmd,
    },

    /// Read-only views over read model, audit and outbox
    Admin {
        #[command(subcommand)]
        cmd: AdminCmd,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => {
            let pool = polis_db::connect_from_env().await?;
            match cmd {
                DbCmd::Status => {
                    let s = polis_db::status(&pool).await?;
                    println!("db_ok={} has_game_sessions_table={}", s.ok, s.has_game_sessions_table);
                }
                DbCmd::Migrate => {
                    polis_db::migrate(&pool).await?;
                    println!("migrations_applied=true");
                }
            }
        }

        Commands::Game { cmd } => {
            let pool = polis_db::connect_from_env().await?;
            commands::game::run(&pool, cmd).await?;
        }

        Commands::Admin { cmd } => {
            let pool = polis_db::connect_from_env().await?;
            commands::admin::run(&pool, cmd).await?;
        }
    }

    Ok(())
}
