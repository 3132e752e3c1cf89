//! OpenAI-compatible chat completions, as served by Ollama, Groq and others.

use std::time::Duration;

use futures::StreamExt;
use futures::future::ready;
use serde::{Deserialize, Serialize};
use url::Url;

use super::{
    DEFAULT_CONNECT_TIMEOUT, FragmentStream, ModelProvider, build_http_client, send_streaming,
    sendable, until_cancelled,
};
use crate::cancellation::CancellationToken;
use crate::sse::process_sse;
use crate::types::{ContentItem, Message, Role};
use crate::{Error, Result};

/// Default endpoint of a local Ollama server.
pub const OLLAMA_BASE_URL: &str = "http://localhost:11434/v1/";

/// Endpoint of Groq's OpenAI-compatible API.
pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1/";

/// A provider speaking the OpenAI chat-completions streaming protocol.
#[derive(Debug, Clone)]
pub struct OpenAiCompatible {
    name: String,
    endpoint: Url,
    api_key: Option<String>,
    model: String,
    client: reqwest::Client,
    connect_timeout: Duration,
}

impl OpenAiCompatible {
    /// Create a provider posting to `{base_url}chat/completions`.
    pub fn new(
        name: impl Into<String>,
        base_url: &str,
        api_key: Option<String>,
        model: impl Into<String>,
    ) -> Result<Self> {
        Self::with_connect_timeout(name, base_url, api_key, model, DEFAULT_CONNECT_TIMEOUT)
    }

    /// Like [`OpenAiCompatible::new`] with a custom connect timeout.
    pub fn with_connect_timeout(
        name: impl Into<String>,
        base_url: &str,
        api_key: Option<String>,
        model: impl Into<String>,
        connect_timeout: Duration,
    ) -> Result<Self> {
        let endpoint = endpoint(base_url)?;
        Ok(Self {
            name: name.into(),
            endpoint,
            api_key: api_key.filter(|key| !key.is_empty()),
            model: model.into(),
            client: build_http_client(connect_timeout)?,
            connect_timeout,
        })
    }

    /// A provider for a local Ollama server.
    pub fn ollama(base_url: &str, model: impl Into<String>) -> Result<Self> {
        Self::new("ollama", base_url, None, model)
    }

    /// A provider for Groq.
    pub fn groq(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        Self::new("groq", GROQ_BASE_URL, Some(api_key.into()), model)
    }

    /// The model requested on every call.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// The full chat-completions URL.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait::async_trait]
impl ModelProvider for OpenAiCompatible {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stream(
        &self,
        history: &[Message],
        cancellation: &CancellationToken,
    ) -> Result<FragmentStream> {
        let body = ChatRequest::new(&self.model, history);
        let mut request = self.client.post(self.endpoint.clone()).json(&body);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }
        tracing::debug!(provider = %self.name, model = %self.model, messages = body.messages.len(), "starting chat completion stream");

        let response = send_streaming(request, cancellation, self.connect_timeout).await?;
        let fragments = process_sse(response.bytes_stream())
            .take_while(|event| ready(!matches!(event, Ok(event) if event.data.trim() == "[DONE]")))
            .filter_map(|event| {
                ready(match event {
                    Ok(event) => parse_chunk(&event.data).transpose(),
                    Err(err) => Some(Err(err)),
                })
            });
        Ok(until_cancelled(fragments, cancellation))
    }
}

fn endpoint(base_url: &str) -> Result<Url> {
    let mut base = base_url.trim().to_string();
    if !base.ends_with('/') {
        base.push('/');
    }
    Ok(Url::parse(&base)?.join("chat/completions")?)
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
}

impl<'a> ChatRequest<'a> {
    fn new(model: &'a str, history: &'a [Message]) -> Self {
        Self {
            model,
            messages: sendable(history).map(ChatMessage::from).collect(),
            stream: true,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: Role,
    content: ChatContent<'a>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ChatContent<'a> {
    Text(&'a str),
    Parts(Vec<ChatPart<'a>>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ChatPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl<'a> },
}

#[derive(Debug, Serialize)]
struct ImageUrl<'a> {
    url: &'a str,
}

impl<'a> From<&'a Message> for ChatMessage<'a> {
    fn from(message: &'a Message) -> Self {
        match message {
            Message::Assistant { content, .. } => ChatMessage {
                role: Role::Assistant,
                content: ChatContent::Text(content),
            },
            Message::User { content } => {
                let content = match content.as_slice() {
                    [ContentItem::Text { value }] => ChatContent::Text(value),
                    items => ChatContent::Parts(
                        items
                            .iter()
                            .map(|item| match item {
                                ContentItem::Text { value } => ChatPart::Text { text: value },
                                ContentItem::ImageRef { uri } => ChatPart::ImageUrl {
                                    image_url: ImageUrl { url: uri },
                                },
                            })
                            .collect(),
                    ),
                };
                ChatMessage {
                    role: Role::User,
                    content,
                }
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

/// The text carried by one `data:` payload, if any.
fn parse_chunk(data: &str) -> Result<Option<String>> {
    let chunk: ChatChunk = serde_json::from_str(data).map_err(|e| {
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
        .choices
        .into_iter()
        .filter_map(|choice| choice.delta.content)
        .collect();
    Ok(if text.is_empty() { None } else { Some(text) })
}
