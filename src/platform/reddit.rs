//! Reddit OAuth API client
//!
//! Uses the script-app password grant. The bearer token is cached until
//! shortly before it expires.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

use super::{InboundItem, ItemKind, Platform, PlatformError, ReplyTarget};
use crate::common::RedditConfig;

const TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";
const API_BASE_URL: &str = "https://oauth.reddit.com";
const LISTING_LIMIT: u32 = 100;
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

struct CachedToken {
    token: String,
    expires_at: Instant,
}

/// Reddit HTTP client
pub struct RedditClient {
    client: Client,
    config: RedditConfig,
    token: Mutex<Option<CachedToken>>,
}

impl RedditClient {
    pub fn new(config: RedditConfig) -> Result<Self, PlatformError> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            config,
            token: Mutex::new(None),
        })
    }

    async fn access_token(&self) -> Result<String, PlatformError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.expires_at {
                return Ok(token.token.clone());
            }
        }

        let resp = self
            .client
            .post(TOKEN_URL)
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(&[
                ("grant_type", "password"),
                ("username", self.config.username.as_str()),
                ("password", self.config.password.as_str()),
            ])
            .send()
            .await?;

        let body: TokenResponse = parse_json(check_status(resp).await?).await?;
        let token = match (body.access_token, body.error) {
            (Some(token), _) => token,
            (None, error) => {
                return Err(PlatformError::Auth(
                    error.unwrap_or_else(|| "no access token returned".to_string()),
                ))
            }
        };

        let lifetime = Duration::from_secs(body.expires_in.unwrap_or(3600));
        debug!(target: "tipbot::platform", "refreshed access token");
        *cached = Some(CachedToken {
            token: token.clone(),
            expires_at: Instant::now() + lifetime.saturating_sub(TOKEN_REFRESH_MARGIN),
        });

        Ok(token)
    }

    async fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder, PlatformError> {
        Ok(request.bearer_auth(self.access_token().await?))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, PlatformError> {
        let url = format!("{}{}", API_BASE_URL, path);
        let resp = self.authorized(self.client.get(&url)).await?.send().await?;
        parse_json(check_status(resp).await?).await
    }

    async fn post_form(&self, path: &str, form: &[(&str, &str)]) -> Result<(), PlatformError> {
        let url = format!("{}{}", API_BASE_URL, path);
        let resp = self
            .authorized(self.client.post(&url))
            .await?
            .form(form)
            .send()
            .await?;
        check_status(resp).await?;
        Ok(())
    }

    fn contains_trigger(&self, body: &str) -> bool {
        self.config.triggers.iter().any(|t| body.contains(t.as_str()))
    }
}

async fn check_status(resp: Response) -> Result<Response, PlatformError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let message = resp.text().await.unwrap_or_default();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(PlatformError::Auth(message)),
        s if s.is_server_error() => Err(PlatformError::Unavailable(format!("{}: {}", s, message))),
        s => Err(PlatformError::Api {
            status: s.as_u16(),
            message,
        }),
    }
}

async fn parse_json<T: DeserializeOwned>(resp: Response) -> Result<T, PlatformError> {
    let body = resp.text().await?;
    serde_json::from_str(&body).map_err(|e| PlatformError::Parse(e.to_string()))
}

#[async_trait]
impl Platform for RedditClient {
    async fn fetch_unread(&self) -> Result<Vec<InboundItem>, PlatformError> {
        let listing: Listing = self
            .get_json(&format!("/message/unread?limit={}", LISTING_LIMIT))
            .await?;
        Ok(listing.into_items())
    }

    async fn fetch_triggered_comments(&self) -> Result<Vec<InboundItem>, PlatformError> {
        if self.config.subreddits.is_empty() {
            return Ok(Vec::new());
        }

        let listing: Listing = self
            .get_json(&format!(
                "/r/{}/comments?limit={}",
                self.config.subreddits.join("+"),
                LISTING_LIMIT
            ))
            .await?;

        Ok(listing
            .into_items()
            .into_iter()
            .filter(|item| self.contains_trigger(&item.body))
            .collect())
    }

    async fn parent_author(&self, item: &InboundItem) -> Result<Option<String>, PlatformError> {
        let parent_id = match &item.parent_id {
            Some(id) => id,
            None => return Ok(None),
        };

        let listing: Listing = self.get_json(&format!("/api/info?id={}", parent_id)).await?;
        Ok(listing
            .data
            .children
            .into_iter()
            .next()
            .and_then(|child| child.data.author)
            .filter(|author| author != "[deleted]"))
    }

    async fn reply(&self, target: &ReplyTarget, text: &str) -> Result<(), PlatformError> {
        self.post_form(
            "/api/comment",
            &[
                ("api_type", "json"),
                ("thing_id", target.item_id.as_str()),
                ("text", text),
            ],
        )
        .await
    }

    async fn mark_read(&self, items: &[InboundItem]) -> Result<(), PlatformError> {
        if items.is_empty() {
            return Ok(());
        }
        let ids = items
            .iter()
            .map(|item| item.id.as_str())
            .collect::<Vec<_>>()
            .join(",");
        self.post_form("/api/read_message", &[("id", ids.as_str())])
            .await
    }

    async fn user_exists(&self, username: &str) -> Result<bool, PlatformError> {
        let url = format!("{}/user/{}/about", API_BASE_URL, username);
        let resp = self.authorized(self.client.get(&url)).await?.send().await?;

        // Suspended and deleted accounts come back as 404 as well
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        check_status(resp).await?;
        Ok(true)
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<Thing>,
}

#[derive(Debug, Deserialize)]
struct Thing {
    kind: String,
    data: ThingData,
}

#[derive(Debug, Deserialize)]
struct ThingData {
    name: String,
    author: Option<String>,
    body: Option<String>,
    parent_id: Option<String>,
}

impl Listing {
    fn into_items(self) -> Vec<InboundItem> {
        self.data
            .children
            .into_iter()
            .filter_map(|thing| {
                let kind = match thing.kind.as_str() {
                    "t1" => ItemKind::Comment,
                    "t4" => ItemKind::Message,
                    _ => return None,
                };
                Some(InboundItem {
                    id: thing.data.name,
                    kind,
                    author: thing.data.author?,
                    body: thing.data.body.unwrap_or_default(),
                    parent_id: thing.data.parent_id,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_to_items() {
        let raw = r#"{
            "kind": "Listing",
            "data": {
                "children": [
                    {"kind": "t4", "data": {"name": "t4_a1", "author": "Alice", "body": "wallet"}},
                    {"kind": "t1", "data": {"name": "t1_b2", "author": "Bob", "body": "!asatip 1", "parent_id": "t1_c3"}},
                    {"kind": "t4", "data": {"name": "t4_d4", "author": null, "body": "system"}},
                    {"kind": "t3", "data": {"name": "t3_e5", "author": "Carol"}}
                ]
            }
        }"#;

        let items = serde_json::from_str::<Listing>(raw).unwrap().into_items();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0], InboundItem::message("t4_a1", "Alice", "wallet"));
        assert_eq!(items[1], InboundItem::comment("t1_b2", "Bob", "!asatip 1", "t1_c3"));
    }
}
