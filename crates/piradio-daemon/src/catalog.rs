//! TV Headend channel catalog client.
use anyhow::{Context, Result};
use piradio_proto::channels::ChannelMap;
use piradio_proto::config::{AuthMode, ServerConfig};
use serde::Deserialize;
use tracing::{debug, info, warn};

const CHANNEL_GRID_PATH: &str = "api/channel/grid";
const STREAM_PATH: &str = "stream/channel";
const PASSWD_GRID_PATH: &str = "api/passwd/entry/grid";

#[derive(Debug, Deserialize, Default)]
pub struct ChannelGrid {
    #[serde(default)]
    pub entries: Vec<GridEntry>,
}

#[derive(Debug, Deserialize)]
pub struct GridEntry {
    #[serde(default)]
    pub uuid: String,
    pub name: Option<String>,
}

pub struct TvhClient {
    http: reqwest::Client,
    server: ServerConfig,
}

impl TvhClient {
    pub fn new(server: ServerConfig) -> Result<Self> {
        if server.auth == AuthMode::Digest {
            warn!("catalog: digest auth is not supported, sending credentials as basic auth");
        }
        let http = reqwest::Client::builder()
            .build()
            .context("Failed to build catalog http client")?;
        Ok(Self { http, server })
    }

    /// Channel name → stream URL.  Any failure leaves the catalog empty.
    pub async fn fetch_channels(&self) -> ChannelMap {
        match self.fetch_grid().await {
            Ok(grid) => {
                let channels = channels_from_grid(&self.server, &grid);
                info!("catalog: {} channels from {}", channels.len(), self.server.url);
                channels
            }
            Err(e) => {
                warn!("catalog: channel list unavailable: {:#}", e);
                ChannelMap::new()
            }
        }
    }

    /// Dump of the password-entry grid, pretty printed.
    pub async fn api_probe(&self) -> Result<String> {
        let url = format!("{}/{}", self.server.url, PASSWD_GRID_PATH);
        debug!("catalog: probing {}", url);
        let value: serde_json::Value = self.get_json(&url).await?;
        serde_json::to_string_pretty(&value).context("Failed to format API response")
    }

    async fn fetch_grid(&self) -> Result<ChannelGrid> {
        let url = format!(
            "{}/{}?limit={}",
            self.server.url, CHANNEL_GRID_PATH, self.server.channel_limit
        );
        debug!("catalog: fetching {}", url);
        self.get_json(&url).await
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self
            .http
            .get(url)
            .basic_auth(&self.server.user, Some(&self.server.pass))
            .header("Accept", "application/json")
            .send()
            .await
            .context("Failed to reach TV Headend")?;

        if !response.status().is_success() {
            anyhow::bail!("TV Headend returned status: {}", response.status());
        }

        response
            .json()
            .await
            .context("Failed to parse TV Headend response")
    }
}

pub fn stream_url(server: &ServerConfig, uuid: &str) -> String {
    let mut url = format!("{}/{}/{}?profile=audio-only", server.url, STREAM_PATH, uuid);
    if !server.token.is_empty() {
        url.push_str("&AUTH=");
        url.push_str(&server.token);
    }
    url
}

pub fn channels_from_grid(server: &ServerConfig, grid: &ChannelGrid) -> ChannelMap {
    let mut unnamed = 0;
    let mut channels = ChannelMap::new();
    for entry in &grid.entries {
        let name = match &entry.name {
            Some(name) if name.contains("name-not-set") => format!("uuid-{}", entry.uuid),
            Some(name) => name.clone(),
            None => {
                let name = format!("unknown {}", unnamed);
                unnamed += 1;
                name
            }
        };
        channels.insert(name, stream_url(server, &entry.uuid));
    }
    channels
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::Router;

    fn server(url: &str, token: &str) -> ServerConfig {
        ServerConfig {
            url: url.to_string(),
            token: token.to_string(),
            ..ServerConfig::default()
        }
    }

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    const GRID: &str = r#"{
        "entries": [
            {"uuid": "aaa", "name": "Radio 2"},
            {"uuid": "bbb", "name": "{name-not-set}"},
            {"uuid": "ccc"},
            {"uuid": "ddd", "name": "Jazz"},
            {"uuid": "eee"}
        ],
        "total": 5
    }"#;

    #[test]
    fn test_grid_entry_naming() {
        let grid: ChannelGrid = serde_json::from_str(GRID).unwrap();
        let map = channels_from_grid(&server("http://tvh:9981", ""), &grid);
        let names: Vec<&str> = map.names().collect();
        assert_eq!(names, vec!["Jazz", "Radio 2", "unknown 0", "unknown 1", "uuid-bbb"]);
        assert_eq!(
            map.get("Radio 2"),
            Some("http://tvh:9981/stream/channel/aaa?profile=audio-only")
        );
        assert_eq!(
            map.get("unknown 1"),
            Some("http://tvh:9981/stream/channel/eee?profile=audio-only")
        );
    }

    #[test]
    fn test_stream_url_carries_token() {
        assert_eq!(
            stream_url(&server("http://tvh:9981", "s3cret"), "abc"),
            "http://tvh:9981/stream/channel/abc?profile=audio-only&AUTH=s3cret"
        );
    }

    #[test]
    fn test_grid_without_entries_is_empty() {
        let grid: ChannelGrid = serde_json::from_str(r#"{"total": 0}"#).unwrap();
        assert!(channels_from_grid(&ServerConfig::default(), &grid).is_empty());
    }

    #[tokio::test]
    async fn test_fetch_channels_from_server() {
        let app = Router::new().route("/api/channel/grid", get(|| async { GRID }));
        let base = serve(app).await;
        let client = TvhClient::new(server(&base, "")).unwrap();
        let map = client.fetch_channels().await;
        assert_eq!(map.len(), 5);
        assert_eq!(
            map.get("Jazz"),
            Some(format!("{}/stream/channel/ddd?profile=audio-only", base).as_str())
        );
    }

    #[tokio::test]
    async fn test_fetch_channels_error_status_is_empty() {
        let app = Router::new().route(
            "/api/channel/grid",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        );
        let base = serve(app).await;
        let client = TvhClient::new(server(&base, "")).unwrap();
        assert!(client.fetch_channels().await.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_channels_malformed_json_is_empty() {
        let app = Router::new().route("/api/channel/grid", get(|| async { "not json" }));
        let base = serve(app).await;
        let client = TvhClient::new(server(&base, "")).unwrap();
        assert!(client.fetch_channels().await.is_empty());
    }

    #[tokio::test]
    async fn test_api_probe_pretty_prints() {
        let app = Router::new().route(
            "/api/passwd/entry/grid",
            get(|| async { r#"{"entries":[{"auth":["enabled"]}]}"# }),
        );
        let base = serve(app).await;
        let client = TvhClient::new(server(&base, "")).unwrap();
        let dump = client.api_probe().await.unwrap();
        assert!(dump.contains("\n"));
        assert!(dump.contains("\"auth\""));
    }
}
