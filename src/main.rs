//! Lorehall - campaign content tree and real-time room service

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lorehall::room::spawn_sweeper;
use lorehall::store::{EntityRow, PlayerRow};
use lorehall::{server, AppState, Args};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    // Parse command line arguments
    let args = Args::parse();

    // Initialize tracing/logging
    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("lorehall={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Validate configuration
    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    // Print startup banner
    info!("======================================");
    info!("  Lorehall - campaign table service");
    info!("======================================");
    info!("Node ID: {}", args.node_id);
    info!("Listen: {}", args.listen);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!(
        "Room sweeper: every {}s, idle timeout {}s",
        args.room_sweep_interval_secs, args.room_idle_timeout_secs
    );
    info!("======================================");

    let state = Arc::new(AppState::new(args));

    if state.args.dev_mode {
        seed_demo_data(&state).await;
        info!("Demo campaign data seeded");
    }

    // Background eviction of idle, unwatched rooms
    spawn_sweeper(
        Arc::clone(&state.registry),
        Arc::clone(&state.transport),
        state.args.sweeper_config(),
    );

    server::run(state).await?;

    Ok(())
}

/// A small campaign to poke at in dev mode: one party folder, a player
/// character and a couple of monsters.
async fn seed_demo_data(state: &AppState) {
    state
        .store
        .seed(|tables| {
            let hero = tables.allocate_id();
            tables.entities.insert(
                hero,
                EntityRow {
                    id: hero,
                    created_by: 1,
                    entity_type: "player".into(),
                    name: "Mira Dawnblade".into(),
                    hp: 24,
                    max_hp: 30,
                    temp_hp: 0,
                    ac: 16,
                    speed: 30,
                    passive_perception: 13,
                    stats: serde_json::json!({
                        "str": 10, "dex": 16, "con": 12, "int": 14, "wis": 11, "cha": 13
                    }),
                    spellcasting: None,
                },
            );
            tables.players.insert(
                hero,
                PlayerRow {
                    id: hero,
                    player_name: "sam".into(),
                    level: 5,
                    character_class: "rogue".into(),
                },
            );

            for (name, hp, ac) in [("Goblin", 7, 15), ("Owlbear", 59, 13)] {
                let id = tables.allocate_id();
                tables.entities.insert(
                    id,
                    EntityRow {
                        id,
                        created_by: 1,
                        entity_type: "npc".into(),
                        name: name.into(),
                        hp,
                        max_hp: hp,
                        temp_hp: 0,
                        ac,
                        speed: 30,
                        passive_perception: 10,
                        stats: serde_json::json!({}),
                        spellcasting: None,
                    },
                );
            }
        })
        .await;
}
