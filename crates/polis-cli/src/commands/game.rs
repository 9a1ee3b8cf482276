use anyhow::Result;
use clap::Subcommand;
use sqlx::PgPool;

use polis_commands::CommandOutcome;

#[derive(Subcommand)]
pub enum GameCmd {
    /// Open a new lobby (archives any running game for the chat).
    Create {
        #[arg(long)]
        chat: i64,
        #[arg(long)]
        owner: Option<i64>,
        #[arg(long, default_value_t = 300)]
        afk_timeout: i32,
    },
    /// Join the lobby and claim a country.
    Join {
        #[arg(long)]
        chat: i64,
        #[arg(long)]
        user: i64,
        #[arg(long)]
        country_code: String,
        #[arg(long)]
        country_name: String,
    },
    /// Confirm readiness for the current phase.
    Ready {
        #[arg(long)]
        chat: i64,
        #[arg(long)]
        user: i64,
    },
    /// Advance to the next phase (requires all active players ready).
    Advance {
        #[arg(long)]
        chat: i64,
        #[arg(long)]
        actor: Option<i64>,
        /// Skip the ready-threshold check (operator override).
        #[arg(long)]
        force: bool,
    },
    /// Resolve the current round (resolve phase only).
    Resolve {
        #[arg(long)]
        chat: i64,
        #[arg(long)]
        actor: Option<i64>,
    },
    /// Store a state snapshot of the current session.
    Snapshot {
        #[arg(long)]
        chat: i64,
        #[arg(long)]
        actor: Option<i64>,
    },
    /// End the game.
    Finish {
        #[arg(long)]
        chat: i64,
        #[arg(long)]
        actor: Option<i64>,
    },
    /// Archive the game without a result.
    Archive {
        #[arg(long)]
        chat: i64,
        #[arg(long)]
        actor: Option<i64>,
    },
    /// Flag a player AFK (or bring them back with --clear).
    Afk {
        #[arg(long)]
        chat: i64,
        #[arg(long)]
        user: i64,
        #[arg(long)]
        clear: bool,
    },
}

pub async fn run(pool: &PgPool, cmd: GameCmd) -> Result<()> {
    let outcome = match cmd {
        GameCmd::Create {
            chat,
            owner,
            afk_timeout,
        } => polis_commands::create_game(pool, chat, owner, afk_timeout).await?,
        GameCmd::Join {
            chat,
            user,
            country_code,
            country_name,
        } => polis_commands::join_game(pool, chat, user, &country_code, &country_name).await?,
        GameCmd::Ready { chat, user } => polis_commands::set_ready(pool, chat, user).await?,
        GameCmd::Advance { chat, actor, force } => {
            polis_commands::advance_phase(pool, chat, actor, force).await?
        }
        GameCmd::Resolve { chat, actor } => {
            polis_commands::resolve_round(pool, chat, actor).await?
        }
        GameCmd::Snapshot { chat, actor } => {
            polis_commands::snapshot_game(pool, chat, actor).await?
        }
        GameCmd::Finish { chat, actor } => polis_commands::finish_game(pool, chat, actor).await?,
        GameCmd::Archive { chat, actor } => {
            polis_commands::archive_game(pool, chat, actor).await?
        }
        GameCmd::Afk { chat, user, clear } => {
            polis_commands::mark_afk(pool, chat, user, !clear).await?
        }
    };

    print_outcome(&outcome);
    if !outcome.ok() {
        std::process::exit(1);
    }
    Ok(())
}

fn print_outcome(outcome: &CommandOutcome) {
    match outcome {
        CommandOutcome::Applied { message, game_id } => {
            println!("ok=true");
            println!("game_id={game_id}");
            println!("message={message}");
        }
        CommandOutcome::Rejected { reason } => {
            println!("ok=false");
            println!("message={reason}");
        }
    }
}
