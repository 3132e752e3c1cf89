//! End-to-end behavior of the chat controller against a scripted provider.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::channel::mpsc::{UnboundedReceiver, UnboundedSender, unbounded};
use futures::channel::oneshot;
use tokio_test::{assert_err, assert_ok};

use colloquy::provider::until_cancelled;
use colloquy::{
    Attachment, CancellationToken, ChatController, ContentItem, Error, ErrorKind, FragmentStream,
    Message, ModelProvider, Result, SendOutcome, SessionState,
};

/////////////////////////////////////////// ScriptedProvider ///////////////////////////////////////////

enum Script {
    Reply(UnboundedReceiver<Result<String>>),
    Fail(Error),
    FailWhen(oneshot::Receiver<Error>),
}

#[derive(Clone)]
struct Call {
    history: Vec<Message>,
    token: CancellationToken,
}

/// Replies to each call with the next queued script, in order.
#[derive(Default)]
struct ScriptedProvider {
    scripts: Mutex<VecDeque<Script>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedProvider {
    /// Queue a streamed reply; fragments are pushed through the returned sender.
    fn reply(&self) -> UnboundedSender<Result<String>> {
        let (tx, rx) = unbounded();
        self.scripts.lock().unwrap().push_back(Script::Reply(rx));
        tx
    }

    /// Queue a reply made of `fragments` that ends right away.
    fn canned(&self, fragments: &[&str]) {
        let tx = self.reply();
        for fragment in fragments {
            tx.unbounded_send(Ok(fragment.to_string())).unwrap();
        }
    }

    /// Queue a call that fails before streaming.
    fn fail(&self, err: Error) {
        self.scripts.lock().unwrap().push_back(Script::Fail(err));
    }

    /// Queue a call that fails, without streaming, once an error is sent.
    fn fail_when(&self) -> oneshot::Sender<Error> {
        let (tx, rx) = oneshot::channel();
        self.scripts.lock().unwrap().push_back(Script::FailWhen(rx));
        tx
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ModelProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn stream(
        &self,
        history: &[Message],
        cancellation: &CancellationToken,
    ) -> Result<FragmentStream> {
        self.calls.lock().unwrap().push(Call {
            history: history.to_vec(),
            token: cancellation.clone(),
        });
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .expect("no scripted reply left");
        match script {
            Script::Reply(rx) => Ok(until_cancelled(rx, cancellation)),
            Script::Fail(err) => Err(err),
            Script::FailWhen(rx) => Err(rx
                .await
                .unwrap_or_else(|_| Error::streaming("script dropped", None))),
        }
    }
}

fn setup() -> (Arc<ScriptedProvider>, Arc<ChatController>) {
    let provider = Arc::new(ScriptedProvider::default());
    let controller = Arc::new(ChatController::new(
        Arc::clone(&provider) as Arc<dyn ModelProvider>
    ));
    (provider, controller)
}

fn spawn_send(
    controller: &Arc<ChatController>,
    text: &str,
) -> tokio::task::JoinHandle<Result<SendOutcome>> {
    let controller = Arc::clone(controller);
    let text = text.to_string();
    tokio::spawn(async move { controller.send(&text, &[]).await })
}

async fn wait_until<F>(controller: &ChatController, condition: F) -> SessionState
where
    F: FnMut(&SessionState) -> bool,
{
    let mut rx = controller.subscribe();
    let state = tokio::time::timeout(Duration::from_secs(5), rx.wait_for(condition))
        .await
        .expect("timed out waiting for state")
        .expect("state channel closed")
        .clone();
    state
}

const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";
const GIF: &[u8] = b"GIF89a\x01\0\x01\0";
const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];

//////////////////////////////////////////////// Sending ///////////////////////////////////////////////

#[tokio::test]
async fn each_send_appends_user_then_assistant() {
    let (provider, controller) = setup();
    for (turn, text) in ["hello", "  padded  ", "a\nmulti-line\nmessage"].iter().enumerate() {
        provider.canned(&["ok"]);
        let outcome = assert_ok!(controller.send(text, &[]).await);
        assert_eq!(outcome, SendOutcome::Completed);

        let state = controller.snapshot();
        assert_eq!(state.log.len(), 2 * (turn + 1));
        assert_eq!(state.log[2 * turn], Message::user_text(*text));
        assert_eq!(state.log[2 * turn + 1], Message::assistant("ok"));
    }
}

#[tokio::test]
async fn blank_send_is_rejected_without_touching_the_log() {
    let (provider, controller) = setup();
    provider.canned(&["first"]);
    controller.send("first", &[]).await.unwrap();
    let before = controller.snapshot();

    for text in ["", "   ", "\n\t"] {
        let err = assert_err!(controller.send(text, &[]).await);
        assert!(err.is_validation());
        assert_eq!(ErrorKind::classify(&err).session_message(), None);
    }
    assert_eq!(controller.snapshot(), before);
    assert_eq!(provider.calls().len(), 1);
}

#[tokio::test]
async fn fragments_fold_in_order() {
    let (provider, controller) = setup();
    provider.canned(&["Hi", " there"]);
    controller.send("hello", &[]).await.unwrap();

    let state = controller.snapshot();
    assert_eq!(state.last_assistant_content(), Some("Hi there"));
    assert!(!state.log[1].is_loading());
    assert!(!state.loading);
    assert!(state.error.is_none());
}

#[tokio::test]
async fn provider_sees_history_without_placeholder() {
    let (provider, controller) = setup();
    provider.canned(&["one"]);
    provider.canned(&["two"]);
    controller.send("first", &[]).await.unwrap();
    controller.send("second", &[]).await.unwrap();

    let calls = provider.calls();
    assert_eq!(calls[0].history, vec![Message::user_text("first")]);
    assert_eq!(
        calls[1].history,
        vec![
            Message::user_text("first"),
            Message::assistant("one"),
            Message::user_text("second"),
        ]
    );
}

#[tokio::test]
async fn loading_is_set_while_streaming() {
    let (provider, controller) = setup();
    let tx = provider.reply();
    let send = spawn_send(&controller, "hello");

    tx.unbounded_send(Ok("partial".to_string())).unwrap();
    let state = wait_until(&controller, |s| s.last_assistant_content() == Some("partial")).await;
    assert!(state.loading);
    assert!(state.log[1].is_loading());
    assert!(controller.is_busy());

    drop(tx);
    assert_eq!(send.await.unwrap().unwrap(), SendOutcome::Completed);
    assert!(!controller.snapshot().loading);
    assert!(!controller.is_busy());
}

/////////////////////////////////////////////// Cancelling /////////////////////////////////////////////

#[tokio::test]
async fn abort_keeps_exactly_the_applied_fragments() {
    let (provider, controller) = setup();
    let tx = provider.reply();
    let send = spawn_send(&controller, "count to five");

    tx.unbounded_send(Ok("one ".to_string())).unwrap();
    tx.unbounded_send(Ok("two ".to_string())).unwrap();
    wait_until(&controller, |s| s.last_assistant_content() == Some("one two ")).await;

    controller.abort();
    assert!(!controller.snapshot().loading);
    assert!(provider.calls()[0].token.is_cancelled());

    for late in ["three ", "four ", "five"] {
        let _ = tx.unbounded_send(Ok(late.to_string()));
    }
    assert_eq!(send.await.unwrap().unwrap(), SendOutcome::Aborted);

    let state = controller.snapshot();
    assert_eq!(state.last_assistant_content(), Some("one two "));
    assert!(!state.log[1].is_loading());
    assert!(!state.loading);
    assert!(state.error.is_none());
}

#[tokio::test]
async fn abort_when_idle_is_harmless() {
    let (provider, controller) = setup();
    controller.abort();
    provider.canned(&["fine"]);
    assert_eq!(
        controller.send("hello", &[]).await.unwrap(),
        SendOutcome::Completed
    );
    controller.abort();
    assert_eq!(controller.snapshot().last_assistant_content(), Some("fine"));
}

#[tokio::test]
async fn second_send_supersedes_first() {
    let (provider, controller) = setup();
    let first_tx = provider.reply();
    let second_tx = provider.reply();

    let first = spawn_send(&controller, "first");
    first_tx.unbounded_send(Ok("x".to_string())).unwrap();
    wait_until(&controller, |s| s.last_assistant_content() == Some("x")).await;
    let first_token = provider.calls()[0].token.clone();
    assert!(!first_token.is_cancelled());

    let second = spawn_send(&controller, "second");
    wait_until(&controller, |s| {
        if s.log.len() == 4 {
            assert!(first_token.is_cancelled(), "placeholder appended before cancel");
        }
        s.log.len() == 4
    })
    .await;

    let _ = first_tx.unbounded_send(Ok("late".to_string()));
    assert_eq!(first.await.unwrap().unwrap(), SendOutcome::Superseded);
    assert!(controller.snapshot().loading, "superseded send cleared loading");

    second_tx.unbounded_send(Ok("new".to_string())).unwrap();
    drop(second_tx);
    assert_eq!(second.await.unwrap().unwrap(), SendOutcome::Completed);

    let state = controller.snapshot();
    assert_eq!(
        state.log,
        vec![
            Message::user_text("first"),
            Message::assistant("x"),
            Message::user_text("second"),
            Message::assistant("new"),
        ]
    );
    assert!(!state.loading);
    assert!(!provider.calls()[1].token.is_cancelled());
}

#[tokio::test]
async fn errors_after_abort_are_not_recorded() {
    let (provider, controller) = setup();
    let tx = provider.reply();
    let send = spawn_send(&controller, "hello");
    tx.unbounded_send(Ok("part".to_string())).unwrap();
    wait_until(&controller, |s| s.last_assistant_content() == Some("part")).await;

    controller.abort();
    let _ = tx.unbounded_send(Err(Error::streaming("connection reset", None)));
    drop(tx);
    assert_eq!(send.await.unwrap().unwrap(), SendOutcome::Aborted);

    let state = controller.snapshot();
    assert!(state.error.is_none());
    assert!(!state.loading);
    assert_eq!(state.log[1], Message::assistant("part"));
}

#[tokio::test]
async fn provider_failure_after_abort_is_not_recorded() {
    let (provider, controller) = setup();
    let failure = provider.fail_when();
    let send = spawn_send(&controller, "hello");
    wait_until(&controller, |s| s.log.len() == 2).await;

    controller.abort();
    let _ = failure.send(Error::api(500, "boom", None));
    assert_eq!(send.await.unwrap().unwrap(), SendOutcome::Aborted);

    let state = controller.snapshot();
    assert!(state.error.is_none());
    assert!(!state.loading);
    assert_eq!(state.log[1], Message::assistant(""));
}

#[tokio::test]
async fn superseded_failure_leaves_newer_send_alone() {
    let (provider, controller) = setup();
    let failure = provider.fail_when();
    let second_tx = provider.reply();

    let first = spawn_send(&controller, "first");
    wait_until(&controller, |s| s.log.len() == 2).await;
    let second = spawn_send(&controller, "second");
    wait_until(&controller, |s| s.log.len() == 4).await;

    let _ = failure.send(Error::api(503, "unavailable", None));
    assert_eq!(first.await.unwrap().unwrap(), SendOutcome::Superseded);

    let state = controller.snapshot();
    assert!(state.loading, "superseded failure cleared loading");
    assert!(state.error.is_none(), "superseded failure wrote an error");
    assert!(state.log[3].is_loading());

    second_tx.unbounded_send(Ok("fine".to_string())).unwrap();
    drop(second_tx);
    assert_eq!(second.await.unwrap().unwrap(), SendOutcome::Completed);
    let state = controller.snapshot();
    assert!(state.error.is_none());
    assert_eq!(state.log[3], Message::assistant("fine"));
}

#[tokio::test]
async fn reset_during_stream_clears_the_session() {
    let (provider, controller) = setup();
    let tx = provider.reply();
    let send = spawn_send(&controller, "hello");
    tx.unbounded_send(Ok("partial".to_string())).unwrap();
    wait_until(&controller, |s| s.last_assistant_content() == Some("partial")).await;

    controller.reset();
    let _ = tx.unbounded_send(Ok("late".to_string()));
    assert_eq!(send.await.unwrap().unwrap(), SendOutcome::Aborted);
    assert_eq!(controller.snapshot(), SessionState::default());
}

////////////////////////////////////////////// Attachments /////////////////////////////////////////////

#[tokio::test]
async fn attachments_become_ordered_image_refs() {
    let (provider, controller) = setup();
    provider.canned(&["three pictures"]);
    let attachments = vec![
        Attachment::from_bytes(PNG.to_vec()),
        Attachment::from_bytes(GIF.to_vec()),
        Attachment::from_bytes(JPEG.to_vec()),
    ];
    controller.send("what are these?", &attachments).await.unwrap();

    let state = controller.snapshot();
    let Message::User { content } = &state.log[0] else {
        panic!("expected a user message, got {:?}", state.log[0]);
    };
    assert_eq!(content.len(), 4);
    assert_eq!(content[0], ContentItem::text("what are these?"));
    let prefixes: Vec<_> = content[1..]
        .iter()
        .map(|item| item.as_image_uri().unwrap().split(',').next().unwrap())
        .collect();
    assert_eq!(
        prefixes,
        vec![
            "data:image/png;base64",
            "data:image/gif;base64",
            "data:image/jpeg;base64"
        ]
    );
}

#[tokio::test]
async fn attachments_alone_are_a_valid_send() {
    let (provider, controller) = setup();
    provider.canned(&["a picture"]);
    let attachments = [Attachment::from_bytes(PNG.to_vec()).with_media_type("image/png")];
    controller.send("   ", &attachments).await.unwrap();

    let state = controller.snapshot();
    let Message::User { content } = &state.log[0] else {
        panic!("expected a user message");
    };
    assert_eq!(content.len(), 1);
    assert!(content[0].is_image());
}

#[tokio::test]
async fn failed_attachment_appends_nothing() {
    let (provider, controller) = setup();
    let attachments = vec![
        Attachment::from_bytes(PNG.to_vec()),
        Attachment::from_path("/nonexistent/colloquy/picture.png"),
        Attachment::from_bytes(GIF.to_vec()),
    ];
    let outcome = controller.send("look", &attachments).await.unwrap();
    assert!(matches!(
        outcome,
        SendOutcome::Failed(ErrorKind::EncodingError { .. })
    ));

    let state = controller.snapshot();
    assert!(state.log.is_empty());
    assert!(!state.loading);
    let error = state.error.unwrap();
    assert!(error.starts_with("Encoding Error: attachment 2"), "{error}");
    assert!(provider.calls().is_empty());
}

#[cfg(unix)]
#[tokio::test]
async fn abort_while_encoding_appends_nothing() {
    let (provider, controller) = setup();
    let dir = std::env::temp_dir().join(format!("colloquy-encoding-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let fifo = dir.join("picture.png");
    let _ = std::fs::remove_file(&fifo);
    let status = std::process::Command::new("mkfifo")
        .arg(&fifo)
        .status()
        .unwrap();
    assert!(status.success());

    // Reading a FIFO blocks until a writer shows up, so encoding stalls here.
    let sender = Arc::clone(&controller);
    let attachments = vec![Attachment::from_path(&fifo)];
    let send = tokio::spawn(async move { sender.send("look", &attachments).await });
    wait_until(&controller, |s| s.loading).await;

    controller.abort();
    let writer = fifo.clone();
    tokio::task::spawn_blocking(move || std::fs::write(writer, PNG))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(send.await.unwrap().unwrap(), SendOutcome::Aborted);

    let state = controller.snapshot();
    assert!(state.log.is_empty());
    assert!(!state.loading);
    assert!(state.error.is_none());
    assert!(provider.calls().is_empty());
    std::fs::remove_dir_all(dir).unwrap();
}

//////////////////////////////////////////////// Failures //////////////////////////////////////////////

#[tokio::test]
async fn api_failure_leaves_empty_finalized_reply() {
    let (provider, controller) = setup();
    provider.fail(Error::api(503, "service unavailable", None));
    let outcome = controller.send("hello", &[]).await.unwrap();
    assert_eq!(
        outcome,
        SendOutcome::Failed(ErrorKind::ApiError {
            status: 503,
            body: "service unavailable".to_string()
        })
    );

    let state = controller.snapshot();
    assert_eq!(state.log.len(), 2);
    assert_eq!(state.log[1], Message::assistant(""));
    assert_eq!(
        state.error.as_deref(),
        Some("API Error: 503 - service unavailable")
    );
    assert!(!state.loading);
}

#[tokio::test]
async fn network_failure_uses_fixed_message() {
    let (provider, controller) = setup();
    provider.fail(Error::connection("connection refused", None));
    controller.send("hello", &[]).await.unwrap();
    assert_eq!(
        controller.snapshot().error.as_deref(),
        Some("Network Error: No response received from the server")
    );
}

#[tokio::test]
async fn mid_stream_failure_keeps_partial_content() {
    let (provider, controller) = setup();
    let tx = provider.reply();
    tx.unbounded_send(Ok("par".to_string())).unwrap();
    tx.unbounded_send(Err(Error::streaming("connection reset", None)))
        .unwrap();
    let outcome = controller.send("hello", &[]).await.unwrap();
    assert!(matches!(
        outcome,
        SendOutcome::Failed(ErrorKind::UnknownError { .. })
    ));

    let state = controller.snapshot();
    assert_eq!(state.log[1], Message::assistant("par"));
    assert!(state.error.unwrap().starts_with("Error: "));
}

#[tokio::test]
async fn next_send_clears_previous_error() {
    let (provider, controller) = setup();
    provider.fail(Error::api(500, "boom", None));
    provider.canned(&["recovered"]);
    controller.send("one", &[]).await.unwrap();
    assert!(controller.snapshot().error.is_some());

    controller.send("two", &[]).await.unwrap();
    let state = controller.snapshot();
    assert!(state.error.is_none());
    assert_eq!(state.last_assistant_content(), Some("recovered"));
}
