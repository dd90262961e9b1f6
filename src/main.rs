//! Discord bot entry point.
//!
//! Transport details live in `gateway` (WebSocket) and `http` (REST); the pet
//! itself lives in `pet` + `store`. This file is wiring: configuration, the
//! background decay ticker, and the gateway event loop.

mod commands;
mod events;
mod gateway;
mod http;
mod pet;
mod sprites;
mod store;
mod ticker;
mod types;

use tracing::{error, info, warn};

use crate::events::GatewayEvent;
use crate::gateway::GatewayConfig;
use crate::http::DiscordHttpClient;
use crate::store::PetStore;

const DEFAULT_DATABASE_URL: &str = "sqlite:pet_store.db";

/// Gateway intents bitmask: GUILDS(1). Slash-command interactions arrive
/// regardless of intents.
const INTENTS: u32 = 1;

#[tokio::main]
async fn main() {
    // Initialise tracing (respects RUST_LOG env, defaults to info).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    dotenv::dotenv().ok();

    let token = match std::env::var("DISCORD_TOKEN") {
        Ok(t) => t,
        Err(_) => {
            error!("DISCORD_TOKEN environment variable not set");
            std::process::exit(1);
        }
    };

    // Optional: a development guild for instant command registration.
    let dev_guild_id = std::env::var("GUILD_ID").ok();

    let database_url =
        std::env::var("PET_DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string());
    let store = match PetStore::connect(&database_url).await {
        Ok(store) => store,
        Err(e) => {
            error!(url = %database_url, error = %e, "failed to open the pet database");
            std::process::exit(1);
        }
    };
    info!(url = %database_url, "pet store ready");

    let http = DiscordHttpClient::new(&token);

    // Decay progresses independently of command traffic.
    tokio::spawn(ticker::run(store.clone(), http.clone()));

    let config = GatewayConfig {
        token,
        intents: INTENTS,
    };
    let mut gw = match gateway::connect(config).await {
        Ok(handle) => handle,
        Err(e) => {
            error!(error = %e, "failed to start gateway");
            std::process::exit(1);
        }
    };

    // Track which application we've registered commands for, to avoid
    // re-registering on every reconnect.
    let mut commands_registered_for_app: Option<String> = None;

    // Main event loop: fully typed, no raw serde_json in sight.
    while let Some(event) = gw.events.recv().await {
        match event {
            GatewayEvent::Ready(ready) => {
                info!(
                    user = %ready.user.tag(),
                    guilds = ready.guilds.len(),
                    "bot is ready!"
                );

                let app_id = ready.application.id;
                if commands_registered_for_app.as_deref() != Some(app_id.as_str()) {
                    let cmds = commands::slash_commands();
                    let result = match &dev_guild_id {
                        Some(guild_id) => {
                            http.bulk_overwrite_guild_commands(&app_id, guild_id, &cmds)
                                .await
                        }
                        None => http.bulk_overwrite_global_commands(&app_id, &cmds).await,
                    };
                    match result {
                        Ok(registered) => {
                            info!(
                                count = registered.len(),
                                scope = dev_guild_id.as_deref().unwrap_or("global"),
                                "registered slash commands"
                            );
                            commands_registered_for_app = Some(app_id);
                        }
                        Err(e) => {
                            warn!(error = %e, "failed to register slash commands");
                        }
                    }
                }
            }

            GatewayEvent::GuildCreate(guild) => {
                info!(guild = %guild.name, guild_id = %guild.id, "guild available");
            }

            GatewayEvent::InteractionCreate(interaction) => {
                if let Err(e) = commands::handle_interaction(&http, &store, &interaction).await {
                    error!(error = %e, "failed to handle interaction");
                }
            }

            GatewayEvent::Unknown {
                event_name: Some(ref name),
                op,
            } => {
                tracing::trace!(event = %name, op, "unhandled gateway event");
            }

            // Control events are consumed inside the gateway driver.
            _ => {}
        }
    }

    info!("event stream ended, bot shutting down");
}
