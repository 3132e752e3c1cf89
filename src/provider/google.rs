//! Google's Generative Language API (Gemini).

use std::time::Duration;

use futures::StreamExt;
use futures::future::ready;
use serde::{Deserialize, Serialize};
use url::Url;

use super::{
    DEFAULT_CONNECT_TIMEOUT, FragmentStream, ModelProvider, Part, build_http_client, parts,
    send_streaming, sendable, until_cancelled,
};
use crate::cancellation::CancellationToken;
use crate::sse::process_sse;
use crate::types::Message;
use crate::{Error, Result};

/// Default endpoint of the Generative Language API.
pub const GOOGLE_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/";

/// A provider for Gemini models.
#[derive(Debug, Clone)]
pub struct GoogleGenerativeAi {
    endpoint: Url,
    api_key: String,
    model: String,
    client: reqwest::Client,
    connect_timeout: Duration,
}

impl GoogleGenerativeAi {
    /// Create a provider for `model` on the public endpoint.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        Self::with_base_url(GOOGLE_BASE_URL, api_key, model, DEFAULT_CONNECT_TIMEOUT)
    }

    /// Create a provider talking to `base_url` instead of the public endpoint.
    pub fn with_base_url(
        base_url: &str,
        api_key: impl Into<String>,
        model: impl Into<String>,
        connect_timeout: Duration,
    ) -> Result<Self> {
        let model = model.into();
        let mut base = base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let mut endpoint =
            Url::parse(&base)?.join(&format!("models/{model}:streamGenerateContent"))?;
        endpoint.query_pairs_mut().append_pair("alt", "sse");
        Ok(Self {
            endpoint,
            api_key: api_key.into(),
            model,
            client: build_http_client(connect_timeout)?,
            connect_timeout,
        })
    }

    /// The model requested on every call.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// The full streaming URL.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait::async_trait]
impl ModelProvider for GoogleGenerativeAi {
    fn name(&self) -> &str {
        "google"
    }

    async fn stream(
        &self,
        history: &[Message],
        cancellation: &CancellationToken,
    ) -> Result<FragmentStream> {
        let body = GenerateRequest::new(history);
        let request = self
            .client
            .post(self.endpoint.clone())
            .header("x-goog-api-key", &self.api_key)
            .json(&body);
        tracing::debug!(model = %self.model, contents = body.contents.len(), "starting gemini stream");

        let response = send_streaming(request, cancellation, self.connect_timeout).await?;
        let fragments = process_sse(response.bytes_stream()).filter_map(|event| {
            ready(match event {
                Ok(event) => parse_chunk(&event.data).transpose(),
                Err(err) => Some(Err(err)),
            })
        });
        Ok(until_cancelled(fragments, cancellation))
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

impl<'a> GenerateRequest<'a> {
    fn new(history: &'a [Message]) -> Self {
        Self {
            contents: sendable(history).map(Content::from).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
enum RequestPart<'a> {
    Text(&'a str),
    InlineData { mime_type: &'a str, data: &'a str },
    FileData { file_uri: &'a str },
}

impl<'a> From<&'a Message> for Content<'a> {
    fn from(message: &'a Message) -> Self {
        match message {
            Message::Assistant { content, .. } => Content {
                role: "model",
                parts: vec![RequestPart::Text(content)],
            },
            Message::User { content } => Content {
                role: "user",
                parts: parts(content)
                    .map(|part| match part {
                        Part::Text(text) => RequestPart::Text(text),
                        Part::Image(data) => RequestPart::InlineData {
                            mime_type: data.media_type,
                            data: data.data,
                        },
                        Part::ImageUrl(uri) => RequestPart::FileData { file_uri: uri },
                    })
                    .collect(),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

fn parse_chunk(data: &str) -> Result<Option<String>> {
    let chunk: GenerateChunk = serde_json::from_str(data).map_err(|e| {
        Error::serialization(
            format!("Failed to parse event JSON: {e}"),
            Some(Box::new(e)),
        )
    })?;
    if let Some(error) = chunk.error {
        return Err(Error::streaming(
            format!("provider reported an error mid-stream: {error}"),
            None,
        ));
    }
    let text: String = chunk
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();
    Ok(if text.is_empty() { None } else { Some(text) })
}
