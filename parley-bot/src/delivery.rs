//! Response delivery.
//!
//! A model response travels through a fixed sequence of phases:
//!
//! ```text
//! AwaitingSource → Streaming | Complete → Chunking → Delivering
//!                → HistoryUpdate → NotifyIfMilestone → Done
//! ```
//!
//! Any error during source consumption or delivery moves to `Failed`: the
//! error goes to the [`ErrorReporter`](crate::traits::ErrorReporter), history
//! is left untouched and the remaining chunks are not sent. The caller's
//! typing indicator is stopped exactly once whichever way it ends.

use crate::engine::ConversationEngine;
use crate::format;
use crate::message::ChannelMessage;
use crate::split::split_response;
use crate::traits::ChannelError;
use futures_util::future::BoxFuture;
use futures_util::stream::BoxStream;
use futures_util::{FutureExt, Stream, StreamExt};
use parley_common::logging::generate_trace_id;
use std::future::Future;
use tracing::Instrument;

/// Error raised by an AI backend.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("Backend request failed: {0}")]
    Request(String),

    #[error("Backend stream failed: {0}")]
    Stream(String),
}

/// Stream of text fragments from a streaming backend.
pub type FragmentStream = BoxStream<'static, Result<String, BackendError>>;

/// Pending call that yields a fragment stream once the backend answers.
pub type StreamProducer = BoxFuture<'static, Result<FragmentStream, BackendError>>;

/// Where a response comes from, decided by the caller.
pub enum ResponseSource {
    /// Fragments are concatenated in order until the stream ends.
    Streaming(StreamProducer),
    /// The full text is already available.
    Complete(String),
}

impl ResponseSource {
    /// Wrap a backend call that resolves to a fragment stream.
    pub fn streaming<Fut, S>(producer: Fut) -> Self
    where
        Fut: Future<Output = Result<S, BackendError>> + Send + 'static,
        S: Stream<Item = Result<String, BackendError>> + Send + 'static,
    {
        Self::Streaming(
            async move { producer.await.map(|stream| -> FragmentStream { stream.boxed() }) }
                .boxed(),
        )
    }

    /// A streaming source replaying fixed fragments.
    pub fn from_fragments<I, T>(fragments: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let fragments: Vec<Result<String, BackendError>> =
            fragments.into_iter().map(|f| Ok(f.into())).collect();
        Self::streaming(async move { Ok(futures_util::stream::iter(fragments)) })
    }

    pub fn complete(text: impl Into<String>) -> Self {
        Self::Complete(text.into())
    }

    fn phase(&self) -> DeliveryPhase {
        match self {
            Self::Streaming(_) => DeliveryPhase::Streaming,
            Self::Complete(_) => DeliveryPhase::Complete,
        }
    }

    /// Consume the source into the final response text.
    pub async fn into_text(self) -> Result<String, BackendError> {
        match self {
            Self::Complete(text) => Ok(text),
            Self::Streaming(producer) => {
                let mut stream = producer.await?;
                let mut text = String::new();
                while let Some(fragment) = stream.next().await {
                    text.push_str(&fragment?);
                }
                Ok(text)
            }
        }
    }
}

impl std::fmt::Debug for ResponseSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Streaming(_) => f.write_str("Streaming(..)"),
            Self::Complete(text) => f.debug_tuple("Complete").field(&text.len()).finish(),
        }
    }
}

/// Delivery failure.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// The backend failed or streamed bad data.
    #[error("Response source failed: {0}")]
    Source(#[from] BackendError),

    /// The transport rejected a chunk or its typing indicator.
    #[error("Delivery of chunk {index} failed: {source}")]
    Transport {
        index: usize,
        #[source]
        source: ChannelError,
    },
}

/// Delivery state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryPhase {
    AwaitingSource,
    Streaming,
    Complete,
    Chunking,
    Delivering,
    HistoryUpdate,
    NotifyIfMilestone,
    Done,
    Failed,
}

/// What a delivery did.
#[derive(Debug, Clone)]
pub struct DeliveryOutcome {
    /// Final phase: `Done` or `Failed`
    pub phase: DeliveryPhase,
    /// Chunks acknowledged by the transport
    pub chunks_sent: usize,
    /// Whether the milestone notice went out
    pub milestone_sent: bool,
    /// History length after the update, if it happened
    pub history_len: Option<usize>,
    /// Failure description, if any
    pub error: Option<String>,
}

impl DeliveryOutcome {
    fn new() -> Self {
        Self {
            phase: DeliveryPhase::AwaitingSource,
            chunks_sent: 0,
            milestone_sent: false,
            history_len: None,
            error: None,
        }
    }

    fn advance(&mut self, phase: DeliveryPhase) {
        tracing::trace!(from = ?self.phase, to = ?phase, "Delivery phase");
        self.phase = phase;
    }

    pub fn is_done(&self) -> bool {
        self.phase == DeliveryPhase::Done
    }
}

impl ConversationEngine {
    /// Deliver a model response to `channel_id` in reply to `original`.
    ///
    /// `stop_typing` is called exactly once when delivery ends.
    pub async fn deliver_response<F>(
        &self,
        channel_id: &str,
        source: ResponseSource,
        original: &ChannelMessage,
        stop_typing: F,
    ) -> DeliveryOutcome
    where
        F: FnOnce() + Send,
    {
        let span = tracing::info_span!(
            "deliver_response",
            trace_id = %generate_trace_id(),
            user_id = %original.user_id,
            channel_id = %channel_id,
        );

        let outcome = self
            .run_delivery(channel_id, source, original)
            .instrument(span)
            .await;
        stop_typing();
        outcome
    }

    async fn run_delivery(
        &self,
        channel_id: &str,
        source: ResponseSource,
        original: &ChannelMessage,
    ) -> DeliveryOutcome {
        let mut outcome = DeliveryOutcome::new();

        outcome.advance(source.phase());
        let text = match source.into_text().await {
            Ok(text) => text,
            Err(e) => return self.fail(outcome, e.into(), original).await,
        };

        outcome.advance(DeliveryPhase::Chunking);
        let chunks = split_response(&text, self.config.max_message_length);

        outcome.advance(DeliveryPhase::Delivering);
        for (index, chunk) in chunks.iter().enumerate() {
            if let Err(source) = self.send_chunk(channel_id, chunk).await {
                let error = DeliveryError::Transport { index, source };
                return self.fail(outcome, error, original).await;
            }
            outcome.chunks_sent += 1;
        }

        outcome.advance(DeliveryPhase::HistoryUpdate);
        let len = self.update_history(&original.user_id, &original.content, &text);
        outcome.history_len = Some(len);

        outcome.advance(DeliveryPhase::NotifyIfMilestone);
        if self.is_milestone(len) {
            outcome.milestone_sent = self.send_milestone_notice(channel_id, &original.user_id).await;
        }

        outcome.advance(DeliveryPhase::Done);
        tracing::info!(
            chunks = outcome.chunks_sent,
            response_chars = text.chars().count(),
            history_len = len,
            "Response delivered"
        );
        outcome
    }

    async fn send_chunk(&self, channel_id: &str, chunk: &str) -> Result<(), ChannelError> {
        self.transport.send_typing(channel_id).await?;
        self.transport.send_text(channel_id, chunk).await?;
        Ok(())
    }

    /// Milestones fall on positive multiples of the configured interval.
    pub(crate) fn is_milestone(&self, history_len: usize) -> bool {
        let interval = self.config.milestone_interval;
        interval > 0 && history_len > 0 && history_len % interval == 0
    }

    /// The notice is a courtesy; failing to send it is not a delivery failure.
    async fn send_milestone_notice(&self, channel_id: &str, user_id: &str) -> bool {
        let prefs = self.user_preferences(user_id).await;
        match self
            .transport
            .send_text(channel_id, &format::milestone_notice(&prefs.model))
            .await
        {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Milestone notice not sent");
                false
            }
        }
    }

    async fn fail(
        &self,
        mut outcome: DeliveryOutcome,
        error: DeliveryError,
        original: &ChannelMessage,
    ) -> DeliveryOutcome {
        tracing::warn!(
            error = %error,
            during = ?outcome.phase,
            chunks_sent = outcome.chunks_sent,
            "Delivery failed; history left unchanged"
        );
        outcome.advance(DeliveryPhase::Failed);
        outcome.error = Some(error.to_string());
        self.reporter.report(&error, original).await;
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ChannelType;
    use crate::store::MemoryHashStore;
    use crate::testing::{RecordingErrorReporter, RecordingTransport, Sent};
    use parley_common::config::ConversationConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Fixture {
        engine: ConversationEngine,
        transport: Arc<RecordingTransport>,
        reporter: Arc<RecordingErrorReporter>,
    }

    fn fixture_with(transport: RecordingTransport) -> Fixture {
        let transport = Arc::new(transport);
        let reporter = Arc::new(RecordingErrorReporter::default());
        let engine = ConversationEngine::new(
            ConversationConfig::with_default_model("gemini-pro"),
            Arc::new(MemoryHashStore::new()),
            transport.clone(),
        )
        .with_reporter(reporter.clone());
        Fixture {
            engine,
            transport,
            reporter,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(RecordingTransport::new())
    }

    fn msg(content: &str) -> ChannelMessage {
        ChannelMessage::text(ChannelType::Discord, "chan", "user", content)
    }

    #[tokio::test]
    async fn test_streamed_fragments_are_concatenated() {
        let f = fixture();
        let calls = AtomicUsize::new(0);

        let outcome = f
            .engine
            .deliver_response(
                "chan",
                ResponseSource::from_fragments(["Hel", "lo!"]),
                &msg("hi"),
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                },
            )
            .await;

        assert!(outcome.is_done());
        assert_eq!(outcome.chunks_sent, 1);
        assert!(!outcome.milestone_sent);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            f.transport.sent(),
            vec![
                Sent::Typing {
                    channel_id: "chan".into()
                },
                Sent::Text {
                    channel_id: "chan".into(),
                    text: "Hello!".into()
                },
            ]
        );
        let history: Vec<String> = f
            .engine
            .history("user")
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(history, vec!["hi", "Hello!"]);
    }

    #[tokio::test]
    async fn test_complete_source_long_text_is_chunked_with_typing() {
        let f = fixture();
        let text = format!("{} {}", "a".repeat(1990), "b".repeat(509));

        let outcome = f
            .engine
            .deliver_response("chan", ResponseSource::complete(text.clone()), &msg("q"), || {})
            .await;

        assert_eq!(outcome.chunks_sent, 2);
        let sent = f.transport.sent();
        assert!(matches!(sent[0], Sent::Typing { .. }));
        assert!(matches!(sent[1], Sent::Text { ref text, .. } if text.len() == 1990));
        assert!(matches!(sent[2], Sent::Typing { .. }));
        assert!(matches!(sent[3], Sent::Text { ref text, .. } if text.len() == 509));
        // Full text is recorded, not the chunks.
        assert_eq!(f.engine.history("user")[1].content, text);
    }

    #[tokio::test]
    async fn test_source_failure_reports_and_keeps_history() {
        let f = fixture();
        let stopped = AtomicUsize::new(0);
        let source = ResponseSource::streaming(async {
            Ok(futures_util::stream::iter(vec![
                Ok("partial".to_string()),
                Err(BackendError::Stream("malformed chunk".into())),
            ]))
        });

        let outcome = f
            .engine
            .deliver_response("chan", source, &msg("hi"), || {
                stopped.fetch_add(1, Ordering::SeqCst);
            })
            .await;

        assert_eq!(outcome.phase, DeliveryPhase::Failed);
        assert_eq!(stopped.load(Ordering::SeqCst), 1);
        assert!(f.transport.sent().is_empty());
        assert!(f.engine.is_new_conversation("user"));
        assert_eq!(f.reporter.reports(), vec![("user".to_string(), outcome.error.unwrap())]);
    }

    #[tokio::test]
    async fn test_producer_failure_is_source_error() {
        let f = fixture();
        let source = ResponseSource::streaming(async {
            Err::<futures_util::stream::Empty<Result<String, BackendError>>, _>(
                BackendError::Request("503".into()),
            )
        });

        let outcome = f.engine.deliver_response("chan", source, &msg("hi"), || {}).await;

        assert_eq!(outcome.phase, DeliveryPhase::Failed);
        assert!(outcome.error.unwrap().contains("503"));
        assert_eq!(f.reporter.reports().len(), 1);
    }

    #[tokio::test]
    async fn test_transport_failure_stops_remaining_chunks() {
        let f = fixture_with(RecordingTransport::new().fail_text_after(1));
        let text = "word ".repeat(1000);

        let outcome = f
            .engine
            .deliver_response("chan", ResponseSource::complete(text), &msg("q"), || {})
            .await;

        assert_eq!(outcome.phase, DeliveryPhase::Failed);
        assert_eq!(outcome.chunks_sent, 1);
        assert_eq!(f.transport.texts().len(), 1);
        assert!(f.engine.is_new_conversation("user"));
        assert_eq!(f.reporter.reports().len(), 1);
    }

    #[tokio::test]
    async fn test_milestone_fires_at_multiples_of_three() {
        let f = fixture();
        let mut fired_at = Vec::new();

        for _ in 0..6 {
            let outcome = f
                .engine
                .deliver_response("chan", ResponseSource::complete("ok"), &msg("q"), || {})
                .await;
            if outcome.milestone_sent {
                fired_at.push(outcome.history_len.unwrap());
            }
        }

        assert_eq!(fired_at, vec![6, 12]);
        let notices: Vec<String> = f
            .transport
            .texts()
            .into_iter()
            .filter(|t| t.contains("/clear"))
            .collect();
        assert_eq!(notices.len(), 2);
        assert!(notices[0].contains("`gemini-pro`"));
    }

    #[tokio::test]
    async fn test_milestone_send_failure_is_not_an_error() {
        // Chunk succeeds, the notice (second text) fails.
        let f = fixture_with(RecordingTransport::new().fail_text_after(3));
        for _ in 0..3 {
            let outcome = f
                .engine
                .deliver_response("chan", ResponseSource::complete("ok"), &msg("q"), || {})
                .await;
            assert!(outcome.is_done());
        }
        // Third exchange reached length 6 but the notice could not be sent.
        assert_eq!(f.engine.history("user").len(), 6);
        assert!(f.reporter.reports().is_empty());
    }

    #[tokio::test]
    async fn test_empty_response_records_history_without_chunks() {
        let f = fixture();
        let outcome = f
            .engine
            .deliver_response("chan", ResponseSource::complete(""), &msg("q"), || {})
            .await;
        assert!(outcome.is_done());
        assert_eq!(outcome.chunks_sent, 0);
        assert_eq!(f.engine.history("user").len(), 2);
    }

    #[tokio::test]
    async fn test_blank_response_sends_no_chunks() {
        let f = fixture();
        let outcome = f
            .engine
            .deliver_response(
                "chan",
                ResponseSource::complete(" ".repeat(2500)),
                &msg("q"),
                || {},
            )
            .await;
        assert!(outcome.is_done());
        assert_eq!(outcome.chunks_sent, 0);
        assert!(f.transport.sent().is_empty());
        assert!(f.reporter.reports().is_empty());
        assert_eq!(f.engine.history("user").len(), 2);
    }

    #[test]
    fn test_is_milestone() {
        let f = fixture();
        assert!(!f.engine.is_milestone(0));
        assert!(!f.engine.is_milestone(2));
        assert!(f.engine.is_milestone(6));
        assert!(!f.engine.is_milestone(8));
        assert!(f.engine.is_milestone(12));
    }

    #[tokio::test]
    async fn test_zero_milestone_interval_disables_notices() {
        let transport = Arc::new(RecordingTransport::new());
        let config = ConversationConfig {
            milestone_interval: 0,
            ..ConversationConfig::with_default_model("gemini-pro")
        };
        let engine =
            ConversationEngine::new(config, Arc::new(MemoryHashStore::new()), transport.clone());

        for _ in 0..3 {
            let outcome = engine
                .deliver_response("chan", ResponseSource::complete("ok"), &msg("q"), || {})
                .await;
            assert!(!outcome.milestone_sent);
        }
        assert!(!engine.is_milestone(6));
        assert_eq!(transport.texts(), vec!["ok", "ok", "ok"]);
    }
}
