//! The `/pet` slash command: definitions, dispatch, and reply rendering.
//!
//! Every handler follows the same shape: resolve the guild, fetch the ticked
//! record from the store, apply the command's effect, persist, reply with an
//! embed or a short line of copy.

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::http::{DiscordHttpClient, HttpError};
use crate::pet::{self, PetRecord};
use crate::sprites::{self, TimeOfDay};
use crate::store::{CareAction, CaretakerTotal, PetStore, StoreError};
use crate::types::*;

/// How many caretakers the leaderboard shows.
pub const LEADERBOARD_SIZE: i64 = 5;

const COLOR_MASCOT: u32 = 0x77DD77;
const COLOR_RESTING: u32 = 0x95A5A6;

// ---------------------------------------------------------------------------
// Command definitions
// ---------------------------------------------------------------------------

/// The command set to register with Discord: a single `/pet` command with one
/// subcommand per action.
pub fn slash_commands() -> Vec<ApplicationCommand> {
    vec![ApplicationCommand {
        id: None,
        name: "pet".to_string(),
        description: "Interact with the server mascot".to_string(),
        kind: 1,
        options: vec![
            ApplicationCommandOption::subcommand("status", "Check the mascot's status"),
            ApplicationCommandOption::subcommand("feed", "Feed the mascot"),
            ApplicationCommandOption::subcommand("play", "Play with the mascot"),
            ApplicationCommandOption::subcommand("rename", "Rename the mascot").option(
                ApplicationCommandOption::string("name", "The mascot's new name", true)
                    .length(1, pet::NAME_MAX_CHARS as u32),
            ),
            ApplicationCommandOption::subcommand("leaderboard", "Top caretakers for today"),
        ],
    }]
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Handle one INTERACTION_CREATE event end to end.
pub async fn handle_interaction(
    http: &DiscordHttpClient,
    store: &PetStore,
    interaction: &Interaction,
) -> Result<(), HttpError> {
    let response = match interaction.kind {
        InteractionType::Ping => InteractionResponse::pong(),
        InteractionType::ApplicationCommand => command_response(store, interaction).await,
        _ => return Ok(()),
    };

    http.create_interaction_response(&interaction.id, &interaction.token, &response)
        .await
}

/// Build the reply for a slash command invocation. Storage failures collapse
/// into a generic apology rather than an error the user can't act on.
async fn command_response(store: &PetStore, interaction: &Interaction) -> InteractionResponse {
    let Some(guild_id) = interaction.guild_id.clone() else {
        return InteractionResponse::message("Pets only live in servers.");
    };

    let Some((sub, opts)) = interaction.data.as_ref().and_then(|d| d.subcommand()) else {
        return InteractionResponse::ephemeral("That's not a pet command I know.");
    };

    let now = Utc::now();
    match run_command(store, interaction, &guild_id, sub, opts, now).await {
        Ok(response) => response,
        Err(e) => {
            warn!(guild_id = %guild_id, command = sub, error = %e, "command failed against the store");
            InteractionResponse::message(
                "The pet store is napping. Please try again in a moment.",
            )
        }
    }
}

async fn run_command(
    store: &PetStore,
    interaction: &Interaction,
    guild_id: &str,
    sub: &str,
    opts: &[CommandOption],
    now: DateTime<Utc>,
) -> Result<InteractionResponse, StoreError> {
    let mut pet = store.get_or_create(guild_id, now).await?;

    // Remember where the guild talks to the pet; reminders go there.
    if let Some(channel) = &interaction.channel_id {
        if pet.home_channel_id.as_ref() != Some(channel) {
            pet.home_channel_id = Some(channel.clone());
            store.save(&pet).await?;
        }
    }

    match sub {
        "status" => Ok(InteractionResponse::embed(status_embed(&pet, now))),

        "feed" => {
            if pet.is_resting() {
                return Ok(resting_reply(&pet));
            }
            pet.feed(now);
            store.save(&pet).await?;
            credit(store, interaction, guild_id, CareAction::Feed, now).await?;
            Ok(InteractionResponse::message(format!(
                "{} happily munches! Hunger is now {}/100.",
                pet.name, pet.hunger
            )))
        }

        "play" => {
            if pet.is_resting() {
                return Ok(resting_reply(&pet));
            }
            pet.play(now);
            store.save(&pet).await?;
            credit(store, interaction, guild_id, CareAction::Play, now).await?;
            Ok(InteractionResponse::message(format!(
                "{} plays along! Happiness is now {}/100.",
                pet.name, pet.happiness
            )))
        }

        "rename" => {
            let input = opts
                .iter()
                .find(|o| o.name == "name")
                .and_then(|o| o.as_str())
                .unwrap_or("");
            match pet::normalize_name(input) {
                Some(name) => {
                    pet.name = name;
                    store.save(&pet).await?;
                    Ok(InteractionResponse::message(format!(
                        "Mascot renamed to {}.",
                        pet.name
                    )))
                }
                None => Ok(InteractionResponse::ephemeral(format!(
                    "Names must be 1 to {} characters.",
                    pet::NAME_MAX_CHARS
                ))),
            }
        }

        "leaderboard" => {
            let top = store.top_caretakers(guild_id, LEADERBOARD_SIZE).await?;
            if top.is_empty() {
                Ok(InteractionResponse::message("No caretakers yet today."))
            } else {
                Ok(InteractionResponse::embed(
                    Embed::new()
                        .title("Top Caretakers (Today)")
                        .color(COLOR_MASCOT)
                        .description(leaderboard_lines(&top)),
                ))
            }
        }

        other => {
            warn!(command = other, "unknown pet subcommand");
            Ok(InteractionResponse::ephemeral(
                "That's not a pet command I know.",
            ))
        }
    }
}

async fn credit(
    store: &PetStore,
    interaction: &Interaction,
    guild_id: &str,
    action: CareAction,
    now: DateTime<Utc>,
) -> Result<(), StoreError> {
    if let Some(user) = interaction.author() {
        store.record_care(guild_id, &user.id, action, now).await?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn status_embed(pet: &PetRecord, now: DateTime<Utc>) -> Embed {
    if pet.is_resting() {
        let sprite = sprites::resting_sprite();
        return Embed::new()
            .title(format!("{} is resting...", pet.name))
            .color(COLOR_RESTING)
            .description("A pixel gravestone marks the spot. Check back in an hour.")
            .field("Says", "...zzz...", false)
            .thumbnail(sprite.url);
    }

    let stage = pet.stage(now);
    let path = pet.care_path(now);
    let sprite = sprites::sprite(stage, path, TimeOfDay::at(now));

    Embed::new()
        .title(format!("{} the Mascot", pet.name))
        .color(COLOR_MASCOT)
        .description(sprite.caption)
        .field("Day", stage.label(), true)
        .field(
            "Path",
            path.map(|p| p.label()).unwrap_or("N/A"),
            true,
        )
        .field("Love Today", pet.love_today.to_string(), true)
        .field("Hunger", format!("{}/100", pet.hunger), true)
        .field("Happiness", format!("{}/100", pet.happiness), true)
        .field("Says", say_line(), false)
        .thumbnail(sprite.url)
        .footer(format!("Last updated: {}", pet.updated_at.to_rfc3339()))
}

fn resting_reply(pet: &PetRecord) -> InteractionResponse {
    InteractionResponse::message(format!(
        "{} is resting under a pixel gravestone. Check back in an hour.",
        pet.name
    ))
}

fn leaderboard_lines(top: &[CaretakerTotal]) -> String {
    top.iter()
        .enumerate()
        .map(|(index, row)| {
            format!(
                "{}. <@{}> with {} care actions",
                index + 1,
                row.user_id,
                row.total()
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

const SAY_LINES: [&str; 7] = [
    "Zzz... snuggly snooze mode!",
    "I found a shiny pebble!",
    "Do you think I can fly today?",
    "I love head pats.",
    "Beep boop! Snack please.",
    "Let's go on an adventure!",
    "I'm rooting for you!",
];

fn say_line() -> &'static str {
    SAY_LINES[rand::random::<u32>() as usize % SAY_LINES.len()]
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn command_set_is_one_command_with_five_subcommands() {
        let cmds = slash_commands();
        assert_eq!(cmds.len(), 1);

        let pet = &cmds[0];
        assert_eq!(pet.name, "pet");
        let subs: Vec<&str> = pet.options.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(subs, vec!["status", "feed", "play", "rename", "leaderboard"]);
        assert!(pet
            .options
            .iter()
            .all(|o| o.kind == option_kind::SUB_COMMAND));
    }

    #[test]
    fn rename_takes_a_bounded_required_string() {
        let cmds = slash_commands();
        let rename = cmds[0]
            .options
            .iter()
            .find(|o| o.name == "rename")
            .unwrap();
        let name = &rename.options[0];
        assert_eq!(name.kind, option_kind::STRING);
        assert!(name.required);
        assert_eq!(name.min_length, Some(1));
        assert_eq!(name.max_length, Some(pet::NAME_MAX_CHARS as u32));
    }

    #[test]
    fn status_embed_shows_the_derived_state() {
        let now = t0();
        let mut pet = PetRecord::hatch("g1", now);
        pet.birth_time = now - Duration::days(2);
        pet.name = "Pebble".to_string();
        pet.love_today = 4;
        pet.hunger = 63;

        let embed = status_embed(&pet, now);
        assert_eq!(embed.title.as_deref(), Some("Pebble the Mascot"));

        let field = |name: &str| {
            embed
                .fields
                .iter()
                .find(|f| f.name == name)
                .map(|f| f.value.as_str())
                .unwrap()
        };
        assert_eq!(field("Day"), "Day 2");
        assert_eq!(field("Path"), "Good");
        assert_eq!(field("Love Today"), "4");
        assert_eq!(field("Hunger"), "63/100");

        let thumb = embed.thumbnail.unwrap().url;
        assert!(thumb.contains("Day2+Good"));
    }

    #[test]
    fn resting_status_uses_the_gravestone_embed() {
        let now = t0();
        let mut pet = PetRecord::hatch("g1", now);
        pet.name = "Pebble".to_string();
        pet.resting_since = Some(now);

        let embed = status_embed(&pet, now);
        assert_eq!(embed.title.as_deref(), Some("Pebble is resting..."));
        assert!(embed.thumbnail.unwrap().url.contains("Gravestone"));
    }

    #[test]
    fn leaderboard_lines_are_ranked_mentions() {
        let top = vec![
            CaretakerTotal {
                user_id: "9".into(),
                feeds: 6,
                plays: 3,
            },
            CaretakerTotal {
                user_id: "4".into(),
                feeds: 1,
                plays: 1,
            },
        ];
        assert_eq!(
            leaderboard_lines(&top),
            "1. <@9> with 9 care actions\n2. <@4> with 2 care actions"
        );
    }

    #[test]
    fn say_line_comes_from_the_fixed_set() {
        for _ in 0..50 {
            assert!(SAY_LINES.contains(&say_line()));
        }
    }

    // -- End-to-end command flows against an in-memory store --------------

    fn interaction(guild: &str, user: &str, sub: &str, opts: Vec<CommandOption>) -> Interaction {
        serde_json::from_value(serde_json::json!({
            "id": "i-1",
            "application_id": "app-1",
            "type": 2,
            "token": "tok",
            "guild_id": guild,
            "channel_id": "chan-1",
            "member": { "user": { "id": user, "username": "alice" }, "nick": null },
            "data": {
                "name": "pet",
                "options": [{ "type": 1, "name": sub, "options": opts }]
            }
        }))
        .expect("test interaction")
    }

    fn string_opt(name: &str, value: &str) -> CommandOption {
        CommandOption {
            name: name.to_string(),
            kind: option_kind::STRING,
            value: Some(serde_json::json!(value)),
            options: Vec::new(),
        }
    }

    async fn run(
        store: &PetStore,
        interaction: &Interaction,
        now: DateTime<Utc>,
    ) -> InteractionResponse {
        let guild_id = interaction.guild_id.clone().unwrap();
        let (sub, opts) = interaction.data.as_ref().unwrap().subcommand().unwrap();
        run_command(store, interaction, &guild_id, sub, opts, now)
            .await
            .expect("command against in-memory store")
    }

    fn content(response: &InteractionResponse) -> String {
        response
            .data
            .as_ref()
            .and_then(|d| d.content.clone())
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn feed_restores_hunger_and_credits_the_caller() {
        let store = PetStore::in_memory().await.unwrap();
        let now = t0();

        // Let some hunger drain first.
        store.get_or_create("g1", now - Duration::hours(2)).await.unwrap();

        let reply = run(&store, &interaction("g1", "42", "feed", vec![]), now).await;
        assert!(content(&reply).contains("happily munches"));

        let top = store.top_caretakers("g1", 5).await.unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].user_id, "42");
        assert_eq!(top[0].feeds, 1);

        let pet = store.get_or_create("g1", now).await.unwrap();
        assert_eq!(pet.love_today, 1);
        assert_eq!(pet.last_fed_at, now);
        assert_eq!(pet.home_channel_id.as_deref(), Some("chan-1"));
    }

    #[tokio::test]
    async fn rename_validates_before_mutating() {
        let store = PetStore::in_memory().await.unwrap();
        let now = t0();

        let too_long = "x".repeat(pet::NAME_MAX_CHARS + 1);
        let reply = run(
            &store,
            &interaction("g1", "42", "rename", vec![string_opt("name", &too_long)]),
            now,
        )
        .await;
        assert!(content(&reply).contains("1 to 32"));
        let pet = store.get_or_create("g1", now).await.unwrap();
        assert_eq!(pet.name, pet::DEFAULT_NAME);

        let reply = run(
            &store,
            &interaction("g1", "42", "rename", vec![string_opt("name", "  Pebble ")]),
            now,
        )
        .await;
        assert_eq!(content(&reply), "Mascot renamed to Pebble.");
        let pet = store.get_or_create("g1", now).await.unwrap();
        assert_eq!(pet.name, "Pebble");
    }

    #[tokio::test]
    async fn resting_pet_rejects_feeding() {
        let store = PetStore::in_memory().await.unwrap();
        let born = t0();

        store.get_or_create("g1", born).await.unwrap();

        // 25 h without feeding puts the pet to rest; the feed bounces.
        let later = born + Duration::hours(25);
        let reply = run(&store, &interaction("g1", "42", "feed", vec![]), later).await;
        assert!(content(&reply).contains("resting"));

        let pet = store.get_or_create("g1", later).await.unwrap();
        assert!(pet.is_resting());
        assert_eq!(pet.love_today, 0);
    }

    #[tokio::test]
    async fn leaderboard_is_empty_until_someone_cares() {
        let store = PetStore::in_memory().await.unwrap();
        let now = t0();

        let reply = run(&store, &interaction("g1", "42", "leaderboard", vec![]), now).await;
        assert_eq!(content(&reply), "No caretakers yet today.");

        run(&store, &interaction("g1", "42", "play", vec![]), now).await;
        let reply = run(&store, &interaction("g1", "42", "leaderboard", vec![]), now).await;
        let embed = &reply.data.as_ref().unwrap().embeds.as_ref().unwrap()[0];
        assert_eq!(
            embed.description.as_deref(),
            Some("1. <@42> with 1 care actions")
        );
    }
}
