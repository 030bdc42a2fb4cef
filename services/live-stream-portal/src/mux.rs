//! Minimal client for the live stream part of the Mux Video API.

use std::{sync::Arc, time::Duration};

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use url::Url;

const LIVE_STREAMS_PATH: &str = "video/v1/live-streams";

#[derive(Debug, thiserror::Error)]
pub enum MuxError {
    #[error("unable to reach the Mux API: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unable to decode the Mux API response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid Mux API URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("({status}) {message}")]
    Api { status: StatusCode, message: String },
    #[error("the live stream {0} has no playback ids")]
    MissingPlaybackId(String),
    #[error("the live stream {0} was returned without a stream key")]
    MissingStreamKey(String),
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackPolicy {
    Public,
    Signed,
    /// Any policy this client does not know, e.g. `drm`. Only read, never sent.
    #[serde(other)]
    Unknown,
}

#[derive(Serialize, Debug, Clone)]
pub struct CreateAssetRequest {
    pub playback_policy: Vec<PlaybackPolicy>,
}

#[derive(Serialize, Debug, Clone)]
pub struct CreateLiveStreamRequest {
    pub playback_policy: Vec<PlaybackPolicy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_asset_settings: Option<CreateAssetRequest>,
}

impl CreateLiveStreamRequest {
    /// A stream that is publicly playable, and whose recording is published
    /// as a public asset.
    pub fn public() -> Self {
        Self {
            playback_policy: vec![PlaybackPolicy::Public],
            new_asset_settings: Some(CreateAssetRequest {
                playback_policy: vec![PlaybackPolicy::Public],
            }),
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PlaybackId {
    pub id: String,
    pub policy: PlaybackPolicy,
}

#[derive(Deserialize, Debug, Clone)]
pub struct LiveStream {
    pub id: String,
    #[serde(default)]
    pub stream_key: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub playback_ids: Vec<PlaybackId>,
}

impl LiveStream {
    pub fn first_playback_id(&self) -> Option<&str> {
        self.playback_ids.first().map(|p| p.id.as_str())
    }
}

#[derive(Serialize, Debug, Default, Clone, Copy)]
pub struct ListLiveStreams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
}

#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    messages: Vec<String>,
}

fn decode_data<T: serde::de::DeserializeOwned>(body: &[u8]) -> Result<T, MuxError> {
    let envelope: Envelope<T> = serde_json::from_slice(body)?;
    Ok(envelope.data)
}

/// Turn the body of an unsuccessful response into a readable message.
fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(ErrorEnvelope { error }) if !error.messages.is_empty() => error.messages.join(" "),
        Ok(ErrorEnvelope {
            error: ErrorBody {
                kind: Some(kind), ..
            },
        }) => kind,
        _ if body.trim().is_empty() => "no response body".into(),
        _ => body.trim().to_string(),
    }
}

#[derive(Clone, Debug)]
pub struct MuxClient {
    http: reqwest::Client,
    base_url: Arc<Url>,
    token_id: Arc<str>,
    token_secret: Arc<str>,
}

impl MuxClient {
    pub fn new(
        base_url: Url,
        token_id: &str,
        token_secret: &str,
        request_timeout: Duration,
    ) -> reqwest::Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(request_timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base_url: Arc::new(base_url),
            token_id: token_id.into(),
            token_secret: token_secret.into(),
        })
    }

    fn live_streams_url(&self) -> Result<Url, MuxError> {
        // `Url::join` drops the last path segment unless it ends in a slash.
        let mut base = self.base_url.as_ref().clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(base.join(LIVE_STREAMS_PATH)?)
    }

    async fn read<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, MuxError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MuxError::Api {
                status,
                message: error_message(&body),
            });
        }
        let body = response.bytes().await?;
        decode_data(&body)
    }

    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn create_live_stream(
        &self,
        request: &CreateLiveStreamRequest,
    ) -> Result<LiveStream, MuxError> {
        let response = self
            .http
            .post(self.live_streams_url()?)
            .basic_auth(&*self.token_id, Some(&*self.token_secret))
            .json(request)
            .send()
            .await?;
        let stream: LiveStream = Self::read(response).await?;
        tracing::info!(stream_id = %stream.id, "Created live stream.");
        Ok(stream)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn list_live_streams(
        &self,
        params: ListLiveStreams,
    ) -> Result<Vec<LiveStream>, MuxError> {
        let response = self
            .http
            .get(self.live_streams_url()?)
            .basic_auth(&*self.token_id, Some(&*self.token_secret))
            .query(&params)
            .send()
            .await?;
        Self::read(response).await
    }
}

/// HLS playback URL of a playback id, `<base>/<id>.m3u8`.
pub fn playback_url(base: &Url, playback_id: &str) -> String {
    format!("{}/{playback_id}.m3u8", base.as_str().trim_end_matches('/'))
}
