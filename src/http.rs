//! HTTP client for the Discord REST API.
//!
//! All outbound calls go through [`DiscordHttpClient`] so auth headers,
//! rate-limit back-off, and error handling live in one place. The underlying
//! transport is `reqwest`; only this module touches it. Endpoints are limited
//! to what the pet bot needs: channel messages (reminders), interaction
//! callbacks (command replies), and slash-command registration.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::types::*;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const BASE_URL: &str = "https://discord.com/api/v10";
const USER_AGENT: &str = "DiscordBot (mascot-bot, 0.1)";

// ---------------------------------------------------------------------------
// Rate-limit tracker (per-bucket)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct BucketState {
    remaining: u32,
    resets_at: Instant,
}

#[derive(Debug)]
struct RateLimiter {
    /// Route-key to bucket id mapping.
    route_buckets: HashMap<String, String>,
    /// Bucket id to state.
    buckets: HashMap<String, BucketState>,
    /// Global rate limit: no requests may be sent until this instant.
    global_until: Option<Instant>,
}

impl RateLimiter {
    fn new() -> Self {
        Self {
            route_buckets: HashMap::new(),
            buckets: HashMap::new(),
            global_until: None,
        }
    }

    /// How long we should wait before sending a request on `route_key`, or
    /// `None` if we can send immediately.
    fn delay_for(&self, route_key: &str) -> Option<Duration> {
        if let Some(until) = self.global_until {
            let now = Instant::now();
            if until > now {
                return Some(until - now);
            }
        }

        let bucket_id = self.route_buckets.get(route_key)?;
        let state = self.buckets.get(bucket_id)?;

        if state.remaining == 0 {
            let now = Instant::now();
            if state.resets_at > now {
                return Some(state.resets_at - now);
            }
        }

        None
    }

    /// Update internal state from response headers.
    fn update(&mut self, route_key: &str, info: &RateLimitInfo) {
        if info.is_global {
            if let Some(reset_after) = info.reset_after {
                self.global_until = Some(Instant::now() + Duration::from_secs_f64(reset_after));
            }
        }

        if let Some(ref bucket) = info.bucket {
            self.route_buckets
                .insert(route_key.to_string(), bucket.clone());

            let reset_instant = match info.reset_after {
                Some(reset_after) => Instant::now() + Duration::from_secs_f64(reset_after),
                None => Instant::now() + Duration::from_secs(1),
            };

            self.buckets.insert(
                bucket.clone(),
                BucketState {
                    remaining: info.remaining.unwrap_or(1),
                    resets_at: reset_instant,
                },
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Parse rate-limit headers
// ---------------------------------------------------------------------------

fn parse_rate_limit_headers(headers: &reqwest::header::HeaderMap) -> RateLimitInfo {
    fn header<T: std::str::FromStr>(
        headers: &reqwest::header::HeaderMap,
        name: &str,
    ) -> Option<T> {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse().ok())
    }

    RateLimitInfo {
        remaining: header(headers, "x-ratelimit-remaining"),
        reset_after: header(headers, "x-ratelimit-reset-after"),
        bucket: headers
            .get("x-ratelimit-bucket")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string()),
        is_global: headers
            .get("x-ratelimit-global")
            .and_then(|v| v.to_str().ok())
            .map(|s| s == "true")
            .unwrap_or(false),
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum HttpError {
    /// Non-success status from Discord.
    Api {
        status: u16,
        body: String,
        route: String,
    },
    /// Transport / network error.
    Transport(String),
    /// Serialization error.
    Serde(String),
}

impl std::fmt::Display for HttpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HttpError::Api {
                status,
                body,
                route,
            } => write!(f, "Discord API error {} on {}: {}", status, route, body),
            HttpError::Transport(e) => write!(f, "HTTP transport error: {}", e),
            HttpError::Serde(e) => write!(f, "Serialization error: {}", e),
        }
    }
}

impl std::error::Error for HttpError {}

// ---------------------------------------------------------------------------
// DiscordHttpClient
// ---------------------------------------------------------------------------

/// A thin, rate-limit-aware HTTP client for the Discord REST API.
///
/// Cheap to clone (internals are behind `Arc`).
#[derive(Clone)]
pub struct DiscordHttpClient {
    token: String,
    client: reqwest::Client,
    limiter: Arc<Mutex<RateLimiter>>,
}

impl DiscordHttpClient {
    /// Create a new client with the given bot token.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            client: reqwest::Client::new(),
            limiter: Arc::new(Mutex::new(RateLimiter::new())),
        }
    }

    // ------------------------------------------------------------------
    // Low-level: the single request method everything funnels through
    // ------------------------------------------------------------------

    /// Send a request to `{BASE_URL}/{path}`.
    ///
    /// `route_key` is used for per-route rate-limit bucketing; it should be a
    /// template like `POST /channels/{channel_id}/messages`.
    ///
    /// Returns the raw response body on success.
    async fn request(
        &self,
        method: reqwest::Method,
        path: &str,
        route_key: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<Vec<u8>, HttpError> {
        let max_retries = 5;
        for attempt in 0..=max_retries {
            // Pre-request: wait if the rate limiter says so.
            {
                let limiter = self.limiter.lock().await;
                if let Some(delay) = limiter.delay_for(route_key) {
                    let delay = delay.min(Duration::from_secs(60));
                    drop(limiter);
                    debug!(
                        route = route_key,
                        delay_ms = delay.as_millis() as u64,
                        "rate-limit pre-emptive backoff"
                    );
                    tokio::time::sleep(delay).await;
                }
            }

            let url = format!("{}/{}", BASE_URL, path.trim_start_matches('/'));

            let mut req = self
                .client
                .request(method.clone(), &url)
                .header("authorization", format!("Bot {}", self.token))
                .header("user-agent", USER_AGENT);
            if let Some(json) = body {
                req = req.json(json);
            }

            let resp = req
                .send()
                .await
                .map_err(|e| HttpError::Transport(e.to_string()))?;

            let status = resp.status();
            let rl_info = parse_rate_limit_headers(resp.headers());

            // Update the limiter regardless of status.
            {
                let mut limiter = self.limiter.lock().await;
                limiter.update(route_key, &rl_info);
            }

            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                let retry_after = rl_info.reset_after.unwrap_or(1.0);
                let delay = Duration::from_secs_f64(retry_after.min(60.0));
                warn!(
                    route = route_key,
                    attempt,
                    retry_after_s = retry_after,
                    global = rl_info.is_global,
                    "rate-limited by Discord, backing off"
                );

                if rl_info.is_global {
                    let mut limiter = self.limiter.lock().await;
                    limiter.global_until = Some(Instant::now() + delay);
                }

                if attempt < max_retries {
                    tokio::time::sleep(delay).await;
                    continue;
                }
            }

            let resp_bytes = resp
                .bytes()
                .await
                .map_err(|e| HttpError::Transport(e.to_string()))?;

            if status.is_success() {
                return Ok(resp_bytes.to_vec());
            }

            return Err(HttpError::Api {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&resp_bytes).to_string(),
                route: route_key.to_string(),
            });
        }

        Err(HttpError::Api {
            status: 429,
            body: "rate-limited after max retries".to_string(),
            route: route_key.to_string(),
        })
    }

    /// Like [`Self::request`] but deserializes the response body as JSON.
    async fn request_json<T: serde::de::DeserializeOwned>(
        &self,
        method: reqwest::Method,
        path: &str,
        route_key: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<T, HttpError> {
        let bytes = self.request(method, path, route_key, body).await?;
        serde_json::from_slice(&bytes).map_err(|e| {
            let raw = String::from_utf8_lossy(&bytes);
            HttpError::Serde(format!("{}: {}", e, &raw[..raw.len().min(200)]))
        })
    }

    // ------------------------------------------------------------------
    // Messages
    // ------------------------------------------------------------------

    /// Send a rich message (content, embeds, allowed mentions) to a channel.
    pub async fn create_message(
        &self,
        channel_id: &str,
        msg: &CreateMessage,
    ) -> Result<Message, HttpError> {
        let path = format!("channels/{}/messages", channel_id);
        let route_key = format!("POST /channels/{}/messages", channel_id);
        let body = serde_json::to_value(msg).map_err(|e| HttpError::Serde(e.to_string()))?;
        self.request_json(reqwest::Method::POST, &path, &route_key, Some(&body))
            .await
    }

    // ------------------------------------------------------------------
    // Interactions
    // ------------------------------------------------------------------

    /// Respond to an interaction (initial response).
    pub async fn create_interaction_response(
        &self,
        interaction_id: &str,
        interaction_token: &str,
        response: &InteractionResponse,
    ) -> Result<(), HttpError> {
        let path = format!(
            "interactions/{}/{}/callback",
            interaction_id, interaction_token
        );
        let route_key = "POST /interactions/callback";
        let body = serde_json::to_value(response).map_err(|e| HttpError::Serde(e.to_string()))?;
        // Discord returns 204 No Content on success, don't parse JSON.
        self.request(reqwest::Method::POST, &path, route_key, Some(&body))
            .await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Slash command registration
    // ------------------------------------------------------------------

    /// Register (or overwrite) guild-scoped application commands. Guild
    /// commands propagate instantly, which makes them the right choice for
    /// development servers.
    pub async fn bulk_overwrite_guild_commands(
        &self,
        application_id: &str,
        guild_id: &str,
        commands: &[ApplicationCommand],
    ) -> Result<Vec<ApplicationCommand>, HttpError> {
        let path = format!(
            "applications/{}/guilds/{}/commands",
            application_id, guild_id
        );
        let route_key = format!(
            "PUT /applications/{}/guilds/{}/commands",
            application_id, guild_id
        );
        let body = serde_json::to_value(commands).map_err(|e| HttpError::Serde(e.to_string()))?;
        self.request_json(reqwest::Method::PUT, &path, &route_key, Some(&body))
            .await
    }

    /// Register (or overwrite) global application commands (may take up to an
    /// hour to propagate).
    pub async fn bulk_overwrite_global_commands(
        &self,
        application_id: &str,
        commands: &[ApplicationCommand],
    ) -> Result<Vec<ApplicationCommand>, HttpError> {
        let path = format!("applications/{}/commands", application_id);
        let route_key = format!("PUT /applications/{}/commands", application_id);
        let body = serde_json::to_value(commands).map_err(|e| HttpError::Serde(e.to_string()))?;
        self.request_json(reqwest::Method::PUT, &path, &route_key, Some(&body))
            .await
    }
}

impl std::fmt::Debug for DiscordHttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordHttpClient")
            .field("token", &"<redacted>")
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn info(remaining: u32, reset_after: f64, bucket: &str) -> RateLimitInfo {
        RateLimitInfo {
            remaining: Some(remaining),
            reset_after: Some(reset_after),
            bucket: Some(bucket.to_string()),
            is_global: false,
        }
    }

    #[test]
    fn limiter_allows_unknown_routes() {
        let limiter = RateLimiter::new();
        assert!(limiter.delay_for("GET /anything").is_none());
    }

    #[test]
    fn limiter_delays_exhausted_bucket() {
        let mut limiter = RateLimiter::new();
        limiter.update("POST /channels/1/messages", &info(0, 2.0, "bucket-a"));

        let delay = limiter.delay_for("POST /channels/1/messages");
        assert!(delay.is_some());
        assert!(delay.unwrap() <= Duration::from_secs_f64(2.0));
    }

    #[test]
    fn limiter_clears_after_remaining_budget() {
        let mut limiter = RateLimiter::new();
        limiter.update("POST /channels/1/messages", &info(3, 2.0, "bucket-a"));
        assert!(limiter.delay_for("POST /channels/1/messages").is_none());
    }

    #[test]
    fn limiter_shares_buckets_between_routes() {
        let mut limiter = RateLimiter::new();
        limiter.update("POST /channels/1/messages", &info(0, 5.0, "shared"));
        limiter.update("POST /channels/2/messages", &info(0, 5.0, "shared"));
        assert!(limiter.delay_for("POST /channels/1/messages").is_some());
        assert!(limiter.delay_for("POST /channels/2/messages").is_some());
    }

    #[test]
    fn global_limit_applies_to_every_route() {
        let mut limiter = RateLimiter::new();
        limiter.update(
            "POST /channels/1/messages",
            &RateLimitInfo {
                remaining: None,
                reset_after: Some(3.0),
                bucket: None,
                is_global: true,
            },
        );
        assert!(limiter.delay_for("GET /never/seen/before").is_some());
    }

    #[test]
    fn rate_limit_headers_parse() {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("x-ratelimit-remaining", "4".parse().unwrap());
        headers.insert("x-ratelimit-reset-after", "1.5".parse().unwrap());
        headers.insert("x-ratelimit-bucket", "abcd1234".parse().unwrap());

        let info = parse_rate_limit_headers(&headers);
        assert_eq!(info.remaining, Some(4));
        assert_eq!(info.reset_after, Some(1.5));
        assert_eq!(info.bucket.as_deref(), Some("abcd1234"));
        assert!(!info.is_global);
    }

    #[test]
    fn debug_redacts_token() {
        let client = DiscordHttpClient::new("very-secret");
        let rendered = format!("{:?}", client);
        assert!(!rendered.contains("very-secret"));
        assert!(rendered.contains("redacted"));
    }
}
