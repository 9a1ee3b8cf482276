use anyhow::Result;
use clap::Subcommand;
use serde_json::json;
use sqlx::PgPool;

#[derive(Subcommand)]
pub enum AdminCmd {
    /// Current game view for a chat (read model row).
    View {
        #[arg(long)]
        chat: i64,
    },
    /// Ready detail for the chat's current phase.
    Ready {
        #[arg(long)]
        chat: i64,
    },
    /// Oldest unpublished outbox rows (relay backlog).
    OutboxPending {
        #[arg(long, default_value_t = 200)]
        limit: i64,
    },
    /// Outbox history of the chat's current game.
    Outbox {
        #[arg(long)]
        chat: i64,
        #[arg(long, default_value_t = 200)]
        limit: i64,
    },
    /// Events parked on the dead-letter path.
    OutboxDead {
        #[arg(long, default_value_t = 200)]
        limit: i64,
    },
    /// Recent audit entries for a chat.
    Audit {
        #[arg(long)]
        chat: i64,
        #[arg(long, default_value_t = 50)]
        limit: i64,
    },
    /// Latest stored snapshot for a chat.
    Snapshot {
        #[arg(long)]
        chat: i64,
    },
}

pub async fn run(pool: &PgPool, cmd: AdminCmd) -> Result<()> {
    let out = match cmd {
        AdminCmd::View { chat } => {
            let row = polis_admin::current_game_by_chat(pool, chat).await?;
            json!({"chat_id": chat, "view": row})
        }
        AdminCmd::Ready { chat } => {
            let summary = polis_admin::ready_status(pool, chat).await?;
            json!({"chat_id": chat, "ready": summary})
        }
        AdminCmd::OutboxPending { limit } => {
            let items = polis_admin::outbox_unpublished(pool, limit).await?;
            json!({"count": items.len(), "items": items})
        }
        AdminCmd::Outbox { chat, limit } => match polis_admin::outbox_by_chat(pool, chat, limit).await? {
            Some((game_id, items)) => {
                json!({"chat_id": chat, "game_id": game_id, "count": items.len(), "items": items})
            }
            None => json!({"chat_id": chat, "game_id": null, "items": []}),
        },
        AdminCmd::OutboxDead { limit } => {
            let items = polis_admin::outbox_dead(pool, limit).await?;
            json!({"count": items.len(), "items": items})
        }
        AdminCmd::Audit { chat, limit } => {
            let items = polis_admin::audit_by_chat(pool, chat, limit).await?;
            json!({"chat_id": chat, "count": items.len(), "items": items})
        }
        AdminCmd::Snapshot { chat } => {
            let snap = polis_admin::latest_snapshot(pool, chat).await?;
            json!({"chat_id": chat, "snapshot": snap})
        }
    };

    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
