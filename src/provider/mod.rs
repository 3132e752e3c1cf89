//! Model providers.
//!
//! A [`ModelProvider`] turns a conversation history into a stream of text
//! fragments. The controller never sees credentials or endpoints; it is handed
//! an already-configured provider (see [`crate::settings::ProviderResolver`]).

mod google;
mod openai;
#[cfg(test)]
mod testing;

use std::pin::Pin;
use std::time::Duration;

use futures::{Stream, StreamExt};
use reqwest::{RequestBuilder, Response, header};

use crate::cancellation::CancellationToken;
use crate::observability::{PROVIDER_ERRORS, PROVIDER_REQUESTS};
use crate::{Error, Result};
use crate::types::{ContentItem, DataUri, Message};

pub use google::{GOOGLE_BASE_URL, GoogleGenerativeAi};
pub use openai::{GROQ_BASE_URL, OLLAMA_BASE_URL, OpenAiCompatible};

/// A lazily produced sequence of reply fragments.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// The capability of streaming a reply for a conversation.
#[async_trait::async_trait]
pub trait ModelProvider: Send + Sync {
    /// A short name for logs, e.g. `ollama`.
    fn name(&self) -> &str;

    /// Start streaming a reply to `history`.
    ///
    /// Fails with [`crate::Error::Api`] when the service answers with a
    /// non-success status and with a connection-class error when no response
    /// arrives. Implementations must stop yielding fragments soon after
    /// `cancellation` is cancelled.
    async fn stream(
        &self,
        history: &[Message],
        cancellation: &CancellationToken,
    ) -> Result<FragmentStream>;
}

/// Ends `stream` as soon as `cancellation` fires.
pub fn until_cancelled<S>(stream: S, cancellation: &CancellationToken) -> FragmentStream
where
    S: Stream<Item = Result<String>> + Send + 'static,
{
    Box::pin(stream.take_until(cancellation.cancelled_owned()))
}

/// Default time allowed for establishing a connection to a provider.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

pub(crate) fn build_http_client(connect_timeout: Duration) -> Result<reqwest::Client> {
    // Only the connect phase is bounded; a reply may legitimately stream for minutes.
    reqwest::Client::builder()
        .connect_timeout(connect_timeout)
        .build()
        .map_err(|e| {
            Error::http_client(
                format!("Failed to build HTTP client: {e}"),
                Some(Box::new(e)),
            )
        })
}

/// Send a streaming request, racing it against `cancellation`.
///
/// A non-success status is turned into [`Error::Api`] carrying the raw body.
pub(crate) async fn send_streaming(
    request: RequestBuilder,
    cancellation: &CancellationToken,
    connect_timeout: Duration,
) -> Result<Response> {
    PROVIDER_REQUESTS.click();
    let request = request.header(header::ACCEPT, "text/event-stream");
    let response = tokio::select! {
        _ = cancellation.cancelled() => {
            return Err(Error::abort("cancelled before the provider responded"));
        }
        response = request.send() => response
            .map_err(|e| Error::from_send_failure(e, Some(connect_timeout.as_secs_f64()))),
    };
    let response = match response {
        Ok(response) => response,
        Err(err) => {
            PROVIDER_ERRORS.click();
            return Err(err);
        }
    };
    if response.status().is_success() {
        return Ok(response);
    }
    PROVIDER_ERRORS.click();
    Err(process_error_response(response).await)
}

async fn process_error_response(response: Response) -> Error {
    let status_code = response.status().as_u16();
    let request_id = response
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .map(String::from);
    let body = match response.text().await {
        Ok(body) => body,
        Err(e) => format!("(failed to read error response: {e})"),
    };
    Error::api(status_code, body, request_id)
}

/// A piece of user content as providers need it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Part<'a> {
    Text(&'a str),
    Image(DataUri<'a>),
    /// An image URI that is not a base64 `data:` URI, passed through untouched.
    ImageUrl(&'a str),
}

pub(crate) fn parts(items: &[ContentItem]) -> impl Iterator<Item = Part<'_>> {
    items.iter().map(|item| match item {
        ContentItem::Text { value } => Part::Text(value),
        ContentItem::ImageRef { uri } => match DataUri::parse(uri) {
            Some(data) => Part::Image(data),
            None => Part::ImageUrl(uri),
        },
    })
}

/// Messages worth sending: empty assistant turns (failed or aborted replies) are dropped.
pub(crate) fn sendable(history: &[Message]) -> impl Iterator<Item = &Message> {
    history.iter().filter(|message| match message {
        Message::Assistant { content, .. } => !content.is_empty(),
        Message::User { content } => !content.is_empty(),
    })
}
