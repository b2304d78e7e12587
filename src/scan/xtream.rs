// src/scan/xtream.rs
//! Minimal Xtream Codes client: enough to pull the full live stream list
//! and build playable URLs. Category iteration is deliberately not
//! implemented; one full-list call per panel keeps scans fast.

use anyhow::{anyhow, Context, Result};
use reqwest::Url;
use serde::Deserialize;

/// One live stream as reported by player_api.php.
#[derive(Debug, Clone, Deserialize)]
pub struct LiveStream {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub stream_id: serde_json::Value,
    #[serde(default)]
    pub category_id: Option<serde_json::Value>,
}

impl LiveStream {
    /// Panels report stream_id as either a number or a string.
    pub fn stream_id(&self) -> Option<i64> {
        match &self.stream_id {
            serde_json::Value::Number(n) => n.as_i64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct XtreamApi {
    base_url: String,
    username: String,
    password: String,
}

impl XtreamApi {
    /// Extract panel credentials from a playlist URL: query parameters
    /// first, then the get.php-style /username/password/ path layout.
    pub fn from_url(raw_url: &str) -> Result<Self> {
        let url = Url::parse(raw_url).with_context(|| format!("parsing panel URL {raw_url}"))?;
        let host = url
            .host_str()
            .ok_or_else(|| anyhow!("panel URL has no host: {raw_url}"))?;

        let mut username = None;
        let mut password = None;
        for (k, v) in url.query_pairs() {
            match k.as_ref() {
                "username" => username = Some(v.to_string()),
                "password" => password = Some(v.to_string()),
                _ => {}
            }
        }
        let (username, password) = match (username, password) {
            (Some(u), Some(p)) => (u, p),
            _ => {
                let segments: Vec<&str> = url
                    .path_segments()
                    .map(|s| s.filter(|p| !p.is_empty()).collect())
                    .unwrap_or_default();
                match segments.as_slice() {
                    [user, pass, ..] => (user.to_string(), pass.to_string()),
                    _ => return Err(anyhow!("cannot extract credentials from {raw_url}")),
                }
            }
        };

        let mut base_url = format!("{}://{}", url.scheme(), host);
        if let Some(port) = url.port() {
            base_url.push_str(&format!(":{port}"));
        }
        Ok(Self {
            base_url,
            username,
            password,
        })
    }

    fn api_url(&self, action: &str) -> String {
        format!(
            "{}/player_api.php?username={}&password={}&action={}",
            self.base_url, self.username, self.password, action
        )
    }

    /// Fetch the panel's complete live stream list.
    pub async fn get_live_streams(&self, client: &reqwest::Client) -> Result<Vec<LiveStream>> {
        let url = self.api_url("get_live_streams");
        let response = client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("querying panel {}", self.base_url))?
            .error_for_status()
            .with_context(|| format!("panel {} rejected the request", self.base_url))?;
        // Panels answer with a JSON list, or an auth-error object.
        let value: serde_json::Value = response
            .json()
            .await
            .with_context(|| format!("decoding stream list from {}", self.base_url))?;
        match value {
            serde_json::Value::Array(_) => {
                serde_json::from_value(value).context("deserializing stream list")
            }
            _ => Ok(Vec::new()),
        }
    }

    /// Live streams are exposed at /live/username/password/stream_id.ts.
    pub fn stream_url(&self, stream_id: i64) -> String {
        format!(
            "{}/live/{}/{}/{stream_id}.ts",
            self.base_url, self.username, self.password
        )
    }
}
