//! Test doubles for the transport, store and error reporter.

use crate::delivery::DeliveryError;
use crate::message::{ChannelMessage, CommandInvocation};
use crate::store::{HashStore, StoreError, StoreResult};
use crate::traits::{ChannelError, ChannelResult, ErrorReporter, Transport};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Something a [`RecordingTransport`] was asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Text { channel_id: String, text: String },
    Typing { channel_id: String },
    Direct { user_id: String, text: String },
    Reply { invocation_id: String, text: String },
    FollowUp { invocation_id: String, text: String },
}

/// Transport that records successful calls and can be told to fail.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<Sent>>,
    texts_sent: AtomicUsize,
    fail_text_after: Option<usize>,
    reject_direct: bool,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Let `n` text sends succeed, then fail every later one.
    pub fn fail_text_after(mut self, n: usize) -> Self {
        self.fail_text_after = Some(n);
        self
    }

    /// Reject direct messages as a user with closed DMs would.
    pub fn reject_direct(mut self) -> Self {
        self.reject_direct = true;
        self
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Texts posted to channels, in order.
    pub fn texts(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Text { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    /// Direct messages, in order.
    pub fn directs(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Direct { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    /// Replies and follow-ups, in order.
    pub fn acknowledgments(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Reply { text, .. } | Sent::FollowUp { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    fn record(&self, sent: Sent) {
        if let Ok(mut log) = self.sent.lock() {
            log.push(sent);
        }
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn send_text(&self, channel_id: &str, text: &str) -> ChannelResult<String> {
        let n = self.texts_sent.fetch_add(1, Ordering::SeqCst);
        if self.fail_text_after.is_some_and(|limit| n >= limit) {
            return Err(ChannelError::SendFailed("simulated send failure".into()));
        }
        self.record(Sent::Text {
            channel_id: channel_id.to_string(),
            text: text.to_string(),
        });
        Ok(format!("msg-{n}"))
    }

    async fn send_typing(&self, channel_id: &str) -> ChannelResult<()> {
        self.record(Sent::Typing {
            channel_id: channel_id.to_string(),
        });
        Ok(())
    }

    async fn send_direct(&self, user_id: &str, text: &str) -> ChannelResult<()> {
        if self.reject_direct {
            return Err(ChannelError::DirectMessageRejected(
                "Cannot send messages to this user".into(),
            ));
        }
        self.record(Sent::Direct {
            user_id: user_id.to_string(),
            text: text.to_string(),
        });
        Ok(())
    }

    async fn reply(&self, invocation: &CommandInvocation, text: &str) -> ChannelResult<()> {
        self.record(Sent::Reply {
            invocation_id: invocation.id.clone(),
            text: text.to_string(),
        });
        Ok(())
    }

    async fn follow_up(&self, invocation: &CommandInvocation, text: &str) -> ChannelResult<()> {
        self.record(Sent::FollowUp {
            invocation_id: invocation.id.clone(),
            text: text.to_string(),
        });
        Ok(())
    }
}

/// Store whose every operation fails.
pub struct FailingHashStore;

#[async_trait]
impl HashStore for FailingHashStore {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn get_all(&self, _key: &str) -> StoreResult<HashMap<String, String>> {
        Err(StoreError::Unavailable("store is down".into()))
    }

    async fn set_fields(&self, _key: &str, _fields: &[(String, String)]) -> StoreResult<()> {
        Err(StoreError::Unavailable("store is down".into()))
    }

    async fn delete(&self, _key: &str) -> StoreResult<()> {
        Err(StoreError::Unavailable("store is down".into()))
    }
}

/// Reporter that keeps `(user_id, error)` pairs.
#[derive(Default)]
pub struct RecordingErrorReporter {
    reports: Mutex<Vec<(String, String)>>,
}

impl RecordingErrorReporter {
    pub fn reports(&self) -> Vec<(String, String)> {
        self.reports.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ErrorReporter for RecordingErrorReporter {
    async fn report(&self, error: &DeliveryError, original: &ChannelMessage) {
        if let Ok(mut reports) = self.reports.lock() {
            reports.push((original.user_id.clone(), error.to_string()));
        }
    }
}
