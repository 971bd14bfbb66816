//! HTTP clients for the writing service and the discovery backend.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use pubscout_core::config::{DiscoveryConfig, WriterConfig};
use pubscout_core::error::{Result, ScoutError};
use pubscout_core::traits::writer::{
    CreateSessionRequest, DraftResult, PublishRequest, PublishResult, WritingSession,
};
use pubscout_core::traits::{Discoverer, WriterService};
use pubscout_core::types::{IdeaBrief, PublicationContext, Topic};

/// Map a transport failure. Connect errors and timeouts are worth retrying.
fn transport_err(what: &str, e: reqwest::Error) -> ScoutError {
    if e.is_connect() || e.is_timeout() {
        ScoutError::Unavailable(format!("{what}: {e}"))
    } else {
        ScoutError::Http(format!("{what}: {e}"))
    }
}

fn build_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ScoutError::Http(format!("client init: {e}")))
}

/// Writing service reached over its REST API.
pub struct HttpWriterClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl HttpWriterClient {
    pub fn new(config: &WriterConfig) -> Result<Self> {
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            client: build_client(config.timeout_secs)?,
        })
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<reqwest::Response> {
        let url = format!("{}{path}", self.base_url);
        self.client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| transport_err(&url, e))
    }

    async fn parse<T: for<'de> Deserialize<'de>>(what: &str, resp: reqwest::Response) -> Result<T> {
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ScoutError::writer(format!("{what} failed ({status}): {text}")));
        }
        resp.json::<T>()
            .await
            .map_err(|e| ScoutError::writer(format!("{what}: bad response: {e}")))
    }
}

#[derive(Serialize)]
struct ChatBody<'a> {
    message: &'a str,
}

#[async_trait]
impl WriterService for HttpWriterClient {
    async fn create_session(&self, request: &CreateSessionRequest) -> Result<WritingSession> {
        let resp = self.post("/api/sessions", request).await?;
        // The id is ours; a conflict means a previous attempt already created it.
        if resp.status() == reqwest::StatusCode::CONFLICT {
            tracing::info!("[auto-write] session {} already exists, reusing", request.id);
            return Ok(WritingSession {
                id: request.id.clone(),
            });
        }
        Self::parse("create session", resp).await
    }

    async fn auto_write(&self, session_id: &str, instruction: &str) -> Result<DraftResult> {
        let resp = self
            .post(
                &format!("/api/sessions/{session_id}/auto-write"),
                &ChatBody {
                    message: instruction,
                },
            )
            .await?;
        Self::parse("auto-write", resp).await
    }

    async fn publish(&self, session_id: &str, request: &PublishRequest) -> Result<PublishResult> {
        let resp = self
            .post(&format!("/api/sessions/{session_id}/publish"), request)
            .await?;
        Self::parse("publish", resp).await
    }
}

/// Request body sent to the discovery backend.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryRequest<'a> {
    pub publication_id: &'a str,
    pub publication_name: &'a str,
    pub writing_tone: Option<&'a str>,
    pub topics: &'a [Topic],
    pub recent_ideas: Vec<RecentIdea<'a>>,
}

#[derive(Debug, Serialize)]
pub struct RecentIdea<'a> {
    pub id: &'a str,
    pub title: &'a str,
    pub angle: &'a str,
}

impl<'a> DiscoveryRequest<'a> {
    pub fn from_context(context: &'a PublicationContext) -> Self {
        Self {
            publication_id: &context.publication.id,
            publication_name: &context.publication.name,
            writing_tone: context.publication.writing_tone.as_deref(),
            topics: &context.topics,
            recent_ideas: context
                .recent_ideas
                .iter()
                .map(|idea| RecentIdea {
                    id: &idea.id,
                    title: &idea.title,
                    angle: &idea.angle,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct DiscoveryResponse {
    #[serde(default)]
    ideas: Vec<IdeaBrief>,
}

/// Discovery backend (search + ranking) behind a single POST endpoint.
pub struct HttpDiscoverer {
    url: String,
    api_key: String,
    client: reqwest::Client,
}

impl HttpDiscoverer {
    pub fn new(config: &DiscoveryConfig) -> Result<Self> {
        Ok(Self {
            url: config.url.clone(),
            api_key: config.api_key.clone(),
            client: build_client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl Discoverer for HttpDiscoverer {
    async fn discover(&self, context: &PublicationContext) -> Result<Vec<IdeaBrief>> {
        if context.topics.is_empty() {
            tracing::info!("[workflow] {}: no active topics, nothing to discover", context.publication.id);
            return Ok(Vec::new());
        }

        let resp = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&DiscoveryRequest::from_context(context))
            .send()
            .await
            .map_err(|e| transport_err(&self.url, e))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ScoutError::Discovery(format!("{status}: {text}")));
        }
        let body: DiscoveryResponse = resp
            .json()
            .await
            .map_err(|e| ScoutError::Discovery(format!("bad response: {e}")))?;
        Ok(body.ideas)
    }
}
