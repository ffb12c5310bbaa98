//! End-to-end session tests: turn intake, barge-in and translation commits.
//!
//! Barge-in tests drive a backend whose reply streams are fed by hand, so
//! the order of user turns and reply events is fully controlled. The
//! translation test runs the real HTTP backend against a mock server.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use parley::llm::{
    CompletionBackend, CompletionRequest, PunctuationBackend, ReplyEvent, ReplyStream,
};
use parley::memory::Role;
use parley::prompts::TRANSLATION_PREFILL;
use parley::{
    ChatInput, Downstream, ParleyConfig, ReplyOutcome, SegmentUnit, Session, SessionMode,
    TranscriptUpdate,
};
use serde_json::json;
use tokio::sync::mpsc;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Hands out one pre-created event channel per streamed request.
struct HandFedBackend {
    streams: Mutex<Vec<mpsc::UnboundedReceiver<ReplyEvent>>>,
}

impl HandFedBackend {
    fn with_streams(count: usize) -> (Arc<Self>, Vec<mpsc::UnboundedSender<ReplyEvent>>) {
        let (senders, receivers): (Vec<_>, Vec<_>) =
            (0..count).map(|_| mpsc::unbounded_channel()).unzip();
        let backend = Arc::new(Self {
            streams: Mutex::new(receivers),
        });
        (backend, senders)
    }
}

#[async_trait]
impl CompletionBackend for HandFedBackend {
    fn name(&self) -> &str {
        "hand-fed"
    }

    async fn complete(&self, _request: &CompletionRequest) -> parley::Result<String> {
        Ok(String::new())
    }

    async fn stream(&self, _request: &CompletionRequest) -> parley::Result<ReplyStream> {
        let rx = {
            let mut streams = self.streams.lock().expect("lock");
            assert!(!streams.is_empty(), "more replies requested than scripted");
            streams.remove(0)
        };
        Ok(Box::pin(futures_util::stream::unfold(
            rx,
            |mut rx| async move { rx.recv().await.map(|event| (event, rx)) },
        )))
    }
}

struct NoPunctuation;

#[async_trait]
impl PunctuationBackend for NoPunctuation {
    async fn punctuate(&self, _prior: &str, _text: &str) -> parley::Result<String> {
        Ok(String::new())
    }
}

fn delta(text: &str) -> ReplyEvent {
    ReplyEvent::TextDelta {
        text: text.to_owned(),
    }
}

async fn next_unit(rx: &mut mpsc::Receiver<Downstream>) -> Downstream {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for downstream")
        .expect("downstream closed")
}

/// Chat session whose grace window is short enough for tests to step past.
fn chat_session(backend: Arc<HandFedBackend>, tx: mpsc::Sender<Downstream>) -> Session {
    let mut config = ParleyConfig::default();
    config.cancel.grace_ms = 1;
    Session::new(config, backend, Arc::new(NoPunctuation), tx).expect("session")
}

#[tokio::test]
async fn newer_turn_supersedes_reply_in_flight() {
    let (backend, feeds) = HandFedBackend::with_streams(2);
    let (tx, mut rx) = mpsc::channel(32);
    let session = chat_session(backend, tx);

    let first = session
        .on_chat_input(ChatInput::final_text("tell me a story"))
        .await
        .expect("first reply");
    feeds[0].send(delta("Once upon a time. There")).expect("feed");
    assert_eq!(
        next_unit(&mut rx).await,
        Downstream::Segment(SegmentUnit::sentence("Once upon a time."))
    );

    tokio::time::sleep(Duration::from_millis(10)).await;
    let second = session
        .on_chat_input(ChatInput::final_text("actually, stop"))
        .await
        .expect("second reply");

    // The old stream keeps producing, but nothing more of it is emitted.
    feeds[0].send(delta(" was a dragon.")).expect("feed");
    feeds[0].send(ReplyEvent::End).expect("feed");
    assert_eq!(first.await.expect("join"), ReplyOutcome::Cancelled);

    feeds[1].send(delta("Okay.")).expect("feed");
    feeds[1].send(ReplyEvent::End).expect("feed");
    assert_eq!(second.await.expect("join"), ReplyOutcome::Completed);

    assert_eq!(
        next_unit(&mut rx).await,
        Downstream::Segment(SegmentUnit::sentence("Okay."))
    );
    assert_eq!(
        next_unit(&mut rx).await,
        Downstream::Segment(SegmentUnit::closing(""))
    );

    // The unanswered first turn was merged with the second.
    let memory = session.memory_snapshot();
    assert_eq!(memory.len(), 2);
    assert_eq!(memory[0].role, Role::User);
    assert_eq!(memory[0].content, vec!["tell me a story", "actually, stop"]);
    assert_eq!(memory[1].role, Role::Assistant);
    assert_eq!(memory[1].content, vec!["Okay."]);
}

#[tokio::test]
async fn flush_interrupts_reply_and_is_forwarded() {
    let (backend, feeds) = HandFedBackend::with_streams(1);
    let (tx, mut rx) = mpsc::channel(32);
    let session = chat_session(backend, tx);

    let reply = session
        .on_chat_input(ChatInput::final_text("hello"))
        .await
        .expect("reply");
    feeds[0].send(delta("Hi! I")).expect("feed");
    assert_eq!(
        next_unit(&mut rx).await,
        Downstream::Segment(SegmentUnit::sentence("Hi!"))
    );

    tokio::time::sleep(Duration::from_millis(10)).await;
    session.flush().await.expect("flush");
    assert_eq!(next_unit(&mut rx).await, Downstream::Flush);

    feeds[0].send(delta(" was saying.")).expect("feed");
    assert_eq!(reply.await.expect("join"), ReplyOutcome::Cancelled);
    assert!(rx.try_recv().is_err());
    assert_eq!(session.memory_snapshot().len(), 1);
}

#[tokio::test]
async fn shutdown_abandons_running_replies() {
    let (backend, _feeds) = HandFedBackend::with_streams(1);
    let (tx, _rx) = mpsc::channel(32);
    let session = chat_session(backend, tx);

    let reply = session
        .on_chat_input(ChatInput::final_text("hello"))
        .await
        .expect("reply");
    tokio::time::timeout(Duration::from_secs(5), session.shutdown())
        .await
        .expect("shutdown should not hang");
    assert_eq!(reply.await.expect("join"), ReplyOutcome::Cancelled);
}

fn completion_body(content: &str) -> serde_json::Value {
    json!({
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }]
    })
}

#[tokio::test]
async fn translation_over_http_commits_and_translates() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({"stream": false, "max_tokens": 100})))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body(
            "so we went home, and then we ate dinner.",
        )))
        .expect(1)
        .mount(&server)
        .await;
    let sse_body = concat!(
        "data: {\"choices\":[{\"delta\":{\"content\":\"Alors nous sommes rentrés, \"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"puis nous avons dîné\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
        "data: [DONE]\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({"stream": true, "stop": ["</translation>"]})))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(sse_body),
        )
        .expect(1)
        .mount(&server)
        .await;

    let mut config = ParleyConfig::default();
    config.session.mode = SessionMode::Translate;
    config.session.input_language = "en-US".to_owned();
    config.session.output_language = "fr-FR".to_owned();
    config.llm.api_url = server.uri();

    let (tx, mut rx) = mpsc::channel(32);
    let session = Session::with_api(config, tx).expect("session");

    // Too short for the punctuation service: nothing happens.
    assert!(
        session
            .on_transcript(TranscriptUpdate::partial("en-US", "so we went", " home"))
            .await
            .is_none()
    );

    let reply = session
        .on_transcript(TranscriptUpdate::partial(
            "en-US",
            "so we went home and then we ate dinner",
            " to",
        ))
        .await
        .expect("translation");
    assert_eq!(reply.await.expect("join"), ReplyOutcome::Completed);

    assert_eq!(
        next_unit(&mut rx).await,
        Downstream::Segment(SegmentUnit::sentence("Alors nous sommes rentrés,"))
    );
    assert_eq!(
        next_unit(&mut rx).await,
        Downstream::Segment(SegmentUnit::closing(" puis nous avons dîné"))
    );

    let memory = session.memory_snapshot();
    assert_eq!(memory.len(), 2);
    assert!(memory[0].content[0].contains("<text>so we went home, and then we ate dinner</text>"));
    assert!(memory[0].content[0].contains(r#"from "en-US" into "fr-FR""#));
    assert_eq!(memory[1].content[0], TRANSLATION_PREFILL);
    assert_eq!(
        memory[1].content[1],
        "Alors nous sommes rentrés, puis nous avons dîné"
    );
}
