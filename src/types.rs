//! Typed representations of the Discord API objects this bot touches.
//!
//! These mirror the Discord API docs so gateway events and REST responses can
//! be deserialized without `serde_json::Value` leaking into the rest of the
//! codebase. Only the surface the pet bot actually uses is modeled: users,
//! guilds, embeds, slash commands with subcommands, and interaction
//! request/response payloads.

use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

// ---------------------------------------------------------------------------
// Primitives
// ---------------------------------------------------------------------------

/// Discord IDs are snowflakes transmitted as strings in JSON.
pub type Snowflake = String;

/// Message flag marking an interaction reply as ephemeral (only the invoking
/// user sees it).
pub const EPHEMERAL: u32 = 64;

// ---------------------------------------------------------------------------
// Gateway payload (the envelope that wraps every WS message)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewayPayload {
    pub op: u8,
    pub d: Option<serde_json::Value>,
    pub s: Option<u64>,
    pub t: Option<String>,
}

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct User {
    pub id: Snowflake,
    pub username: String,
    pub discriminator: Option<String>,
    #[serde(default)]
    pub bot: bool,
    pub global_name: Option<String>,
}

impl User {
    /// `Username#Discriminator`, or just `Username` under the new username
    /// system.
    pub fn tag(&self) -> String {
        match self.discriminator.as_deref() {
            Some("0") | None => self.username.clone(),
            Some(disc) => format!("{}#{}", self.username, disc),
        }
    }
}

/// Partial member object carried inside guild interactions.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GuildMember {
    pub user: Option<User>,
    pub nick: Option<String>,
}

// ---------------------------------------------------------------------------
// Guild
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Guild {
    pub id: Snowflake,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UnavailableGuild {
    pub id: Snowflake,
    #[serde(default)]
    pub unavailable: bool,
}

// ---------------------------------------------------------------------------
// Message (only what comes back from POST /channels/{id}/messages)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Message {
    pub id: Snowflake,
    pub channel_id: Snowflake,
    #[serde(default)]
    pub content: String,
    pub timestamp: Option<String>,
}

// ---------------------------------------------------------------------------
// Embed
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Embed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<EmbedMedia>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
}

impl Embed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn color(mut self, color: u32) -> Self {
        self.color = Some(color);
        self
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>, inline: bool) -> Self {
        self.fields.push(EmbedField {
            name: name.into(),
            value: value.into(),
            inline,
        });
        self
    }

    pub fn footer(mut self, text: impl Into<String>) -> Self {
        self.footer = Some(EmbedFooter { text: text.into() });
        self
    }

    pub fn thumbnail(mut self, url: impl Into<String>) -> Self {
        self.thumbnail = Some(EmbedMedia { url: url.into() });
        self
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbedFooter {
    pub text: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbedMedia {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub inline: bool,
}

// ---------------------------------------------------------------------------
// READY event payload
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReadyEvent {
    pub v: u8,
    pub user: User,
    pub session_id: String,
    pub resume_gateway_url: String,
    #[serde(default)]
    pub guilds: Vec<UnavailableGuild>,
    pub application: ReadyApplication,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReadyApplication {
    pub id: Snowflake,
}

// ---------------------------------------------------------------------------
// Interactions (slash commands)
// ---------------------------------------------------------------------------

/// Top-level interaction received via INTERACTION_CREATE.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Interaction {
    pub id: Snowflake,
    pub application_id: Snowflake,
    #[serde(rename = "type")]
    pub kind: InteractionType,
    pub data: Option<InteractionData>,
    pub guild_id: Option<Snowflake>,
    pub channel_id: Option<Snowflake>,
    pub member: Option<GuildMember>,
    pub user: Option<User>,
    pub token: String,
}

impl Interaction {
    /// The user who triggered the interaction (member in guilds, bare user
    /// in DMs).
    pub fn author(&self) -> Option<&User> {
        self.member
            .as_ref()
            .and_then(|m| m.user.as_ref())
            .or(self.user.as_ref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize_repr, Serialize_repr)]
#[repr(u8)]
pub enum InteractionType {
    Ping = 1,
    ApplicationCommand = 2,
    MessageComponent = 3,
    ApplicationCommandAutocomplete = 4,
    ModalSubmit = 5,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InteractionData {
    pub id: Option<Snowflake>,
    pub name: Option<String>,
    #[serde(default)]
    pub options: Vec<CommandOption>,
}

impl InteractionData {
    /// For a command registered with subcommands, the invoked subcommand name
    /// and its own options.
    pub fn subcommand(&self) -> Option<(&str, &[CommandOption])> {
        let first = self.options.first()?;
        if first.kind == option_kind::SUB_COMMAND {
            Some((first.name.as_str(), first.options.as_slice()))
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CommandOption {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: u8,
    pub value: Option<serde_json::Value>,
    #[serde(default)]
    pub options: Vec<CommandOption>,
}

impl CommandOption {
    pub fn as_str(&self) -> Option<&str> {
        self.value.as_ref().and_then(|v| v.as_str())
    }
}

// ---------------------------------------------------------------------------
// Interaction responses (what we send back)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct InteractionResponse {
    #[serde(rename = "type")]
    pub kind: InteractionCallbackType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<InteractionCallbackData>,
}

impl InteractionResponse {
    /// Reply with a plain text message.
    pub fn message(text: impl Into<String>) -> Self {
        Self {
            kind: InteractionCallbackType::ChannelMessageWithSource,
            data: Some(InteractionCallbackData {
                content: Some(text.into()),
                ..Default::default()
            }),
        }
    }

    /// Reply with a single embed.
    pub fn embed(embed: Embed) -> Self {
        Self {
            kind: InteractionCallbackType::ChannelMessageWithSource,
            data: Some(InteractionCallbackData {
                embeds: Some(vec![embed]),
                ..Default::default()
            }),
        }
    }

    /// Ephemeral text reply (validation errors and the like).
    pub fn ephemeral(text: impl Into<String>) -> Self {
        Self {
            kind: InteractionCallbackType::ChannelMessageWithSource,
            data: Some(InteractionCallbackData {
                content: Some(text.into()),
                flags: Some(EPHEMERAL),
                ..Default::default()
            }),
        }
    }

    pub fn pong() -> Self {
        Self {
            kind: InteractionCallbackType::Pong,
            data: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr)]
#[repr(u8)]
pub enum InteractionCallbackType {
    Pong = 1,
    ChannelMessageWithSource = 4,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct InteractionCallbackData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embeds: Option<Vec<Embed>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flags: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_mentions: Option<AllowedMentions>,
}

// ---------------------------------------------------------------------------
// Allowed mentions (reminder pings must opt in to mentioning users)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AllowedMentions {
    /// Explicit list of user ids this message may ping.
    #[serde(default)]
    pub users: Vec<Snowflake>,
}

impl AllowedMentions {
    pub fn users(ids: Vec<Snowflake>) -> Self {
        Self { users: ids }
    }
}

// ---------------------------------------------------------------------------
// Slash command registration payloads
// ---------------------------------------------------------------------------

/// Option type constants (the subset this bot registers).
pub mod option_kind {
    pub const SUB_COMMAND: u8 = 1;
    pub const STRING: u8 = 3;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationCommand {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Snowflake>,
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<ApplicationCommandOption>,
    /// 1 = CHAT_INPUT (slash command).
    #[serde(rename = "type", default = "default_command_type")]
    pub kind: u8,
}

fn default_command_type() -> u8 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationCommandOption {
    pub name: String,
    pub description: String,
    /// 1 = SUB_COMMAND, 3 = STRING (see [`option_kind`]).
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(default)]
    pub required: bool,
    /// Nested options, used for a subcommand's own parameters.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<ApplicationCommandOption>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u32>,
}

impl ApplicationCommandOption {
    pub fn subcommand(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            kind: option_kind::SUB_COMMAND,
            required: false,
            options: Vec::new(),
            min_length: None,
            max_length: None,
        }
    }

    pub fn string(
        name: impl Into<String>,
        description: impl Into<String>,
        required: bool,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            kind: option_kind::STRING,
            required,
            options: Vec::new(),
            min_length: None,
            max_length: None,
        }
    }

    pub fn length(mut self, min: u32, max: u32) -> Self {
        self.min_length = Some(min);
        self.max_length = Some(max);
        self
    }

    pub fn option(mut self, option: ApplicationCommandOption) -> Self {
        self.options.push(option);
        self
    }
}

// ---------------------------------------------------------------------------
// Outbound message body (for REST POST /channels/{id}/messages)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize)]
pub struct CreateMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_mentions: Option<AllowedMentions>,
}

impl CreateMessage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content(mut self, text: impl Into<String>) -> Self {
        self.content = Some(text.into());
        self
    }

    pub fn allowed_mentions(mut self, mentions: AllowedMentions) -> Self {
        self.allowed_mentions = Some(mentions);
        self
    }
}

// ---------------------------------------------------------------------------
// Rate-limit info parsed from response headers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RateLimitInfo {
    pub remaining: Option<u32>,
    pub reset_after: Option<f64>,
    pub bucket: Option<String>,
    pub is_global: bool,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_tag_handles_both_username_systems() {
        let legacy = User {
            id: "1".into(),
            username: "keeper".into(),
            discriminator: Some("0420".into()),
            bot: false,
            global_name: None,
        };
        assert_eq!(legacy.tag(), "keeper#0420");

        let modern = User {
            discriminator: Some("0".into()),
            ..legacy.clone()
        };
        assert_eq!(modern.tag(), "keeper");
    }

    #[test]
    fn subcommand_interaction_parses() {
        let raw = serde_json::json!({
            "id": "123",
            "application_id": "456",
            "type": 2,
            "token": "tok",
            "guild_id": "789",
            "channel_id": "1000",
            "member": { "user": { "id": "42", "username": "alice" }, "nick": null },
            "data": {
                "id": "555",
                "name": "pet",
                "options": [{
                    "type": 1,
                    "name": "rename",
                    "options": [{ "type": 3, "name": "name", "value": "Pebble" }]
                }]
            }
        });

        let interaction: Interaction = serde_json::from_value(raw).unwrap();
        assert_eq!(interaction.kind, InteractionType::ApplicationCommand);
        assert_eq!(interaction.author().unwrap().username, "alice");

        let data = interaction.data.unwrap();
        let (sub, opts) = data.subcommand().unwrap();
        assert_eq!(sub, "rename");
        assert_eq!(opts[0].as_str(), Some("Pebble"));
    }

    #[test]
    fn subcommand_is_none_for_plain_options() {
        let data = InteractionData {
            id: None,
            name: Some("pet".into()),
            options: vec![CommandOption {
                name: "name".into(),
                kind: option_kind::STRING,
                value: Some(serde_json::json!("x")),
                options: Vec::new(),
            }],
        };
        assert!(data.subcommand().is_none());
    }

    #[test]
    fn embed_serialization_skips_unset_fields() {
        let embed = Embed::new().title("Mascot").color(0x77DD77);
        let json = serde_json::to_value(&embed).unwrap();
        assert_eq!(json["title"], "Mascot");
        assert!(json.get("description").is_none());
        assert!(json.get("thumbnail").is_none());
        assert!(json.get("fields").is_none());
    }

    #[test]
    fn ephemeral_response_sets_flag() {
        let resp = InteractionResponse::ephemeral("nope");
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["type"], 4);
        assert_eq!(json["data"]["flags"], 64);
    }

    #[test]
    fn create_message_carries_allowed_mentions() {
        let msg = CreateMessage::new()
            .content("<@1> <@2> the mascot misses you!")
            .allowed_mentions(AllowedMentions::users(vec!["1".into(), "2".into()]));
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["allowed_mentions"]["users"][0], "1");
        assert_eq!(json["content"], "<@1> <@2> the mascot misses you!");
    }

    #[test]
    fn application_command_defaults_to_chat_input() {
        let cmd: ApplicationCommand = serde_json::from_value(serde_json::json!({
            "name": "pet",
            "description": "Interact with the server mascot"
        }))
        .unwrap();
        assert_eq!(cmd.kind, 1);
    }
}
