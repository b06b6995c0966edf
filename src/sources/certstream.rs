//! Certificate-transparency stream source.
//!
//! Keeps one WebSocket subscription to a certstream-compatible feed open and
//! turns matching certificate updates into events.
//!
//! Connection lifecycle:
//!
//! ```text
//!   Disconnected ──▶ Connecting ──▶ Streaming
//!        ▲                │              │
//!        └── fixed delay ─┴── I/O error ─┘
//! ```
//!
//! Cancellation (the shared signal or `stop()`) leaves the loop from any
//! state. Errors never escape the loop: every failure waits the reconnect
//! delay and tries again, indefinitely, with no backoff growth.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tokio_tungstenite::{connect_async, tungstenite, tungstenite::Message};

use super::domains::{extract_domains, KeywordFilter};
use crate::comms::{shutdown, EventPublisher, PublishError, Shutdown, ShutdownTrigger};
use crate::config::CertstreamSettings;
use crate::model::{Event, CERTIFICATE_UPDATE};
use crate::stages::{Source, StageError};

pub const SOURCE_NAME: &str = "certstream";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Streaming,
}

/// Transient failures; handled by the reconnect loop, never surfaced.
#[derive(Debug, Error)]
pub enum CertstreamError {
    #[error("failed to connect to certstream: {0}")]
    Connect(#[source] tungstenite::Error),

    #[error("failed to read from certstream: {0}")]
    Read(#[source] tungstenite::Error),

    #[error("no message received for {0:?}")]
    IdleTimeout(Duration),

    #[error("connection closed by peer")]
    Closed,
}

/// How a streaming session ended without an I/O error.
#[derive(Debug, PartialEq, Eq)]
enum StreamEnd {
    Cancelled,
    QueueClosed,
}

// ───── wire format ──────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CertstreamMessage {
    message_type: String,
    data: CertUpdate,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CertUpdate {
    update_type: String,
    leaf_cert: LeafCert,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LeafCert {
    subject: Subject,
    extensions: Extensions,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Subject {
    #[serde(rename = "CN")]
    cn: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Extensions {
    #[serde(rename = "subjectAltName")]
    subject_alt_name: Option<String>,
}

// ───── source ───────────────────────────────────────────────────────────────

pub struct CertstreamSource {
    settings: CertstreamSettings,
    filter: KeywordFilter,
    state: Mutex<ConnectionState>,
    sequence: AtomicU64,
    stop: ShutdownTrigger,
    stopped: Shutdown,
}

impl CertstreamSource {
    pub fn new(settings: CertstreamSettings) -> Self {
        let filter = KeywordFilter::new(settings.keywords.iter().cloned());
        let (stop, stopped) = shutdown::channel();
        Self {
            settings,
            filter,
            state: Mutex::new(ConnectionState::Disconnected),
            sequence: AtomicU64::new(0),
            stop,
            stopped,
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, next: ConnectionState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state != next {
            log::debug!("certstream: {:?} -> {:?}", *state, next);
            *state = next;
        }
    }

    fn next_id(&self) -> String {
        let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        format!("cert_{nanos}_{seq}")
    }

    fn is_halted(&self, shutdown: &Shutdown) -> bool {
        shutdown.is_cancelled() || self.stopped.is_cancelled()
    }

    async fn halted(&self, shutdown: &Shutdown) {
        tokio::select! {
            _ = shutdown.cancelled() => {}
            _ = self.stopped.cancelled() => {}
        }
    }

    /// Decode one feed message into the events it yields.
    ///
    /// Messages other than certificate updates yield nothing.
    pub fn events_from_message(&self, text: &str) -> Result<Vec<Event>, serde_json::Error> {
        let msg: CertstreamMessage = serde_json::from_str(text)?;
        if msg.message_type != CERTIFICATE_UPDATE {
            return Ok(Vec::new());
        }

        let cn = msg.data.leaf_cert.subject.cn.unwrap_or_default();
        let sans = msg.data.leaf_cert.extensions.subject_alt_name.unwrap_or_default();

        let events = extract_domains(&cn, &sans)
            .into_iter()
            .filter_map(|domain| {
                let matched = self.filter.accept(&domain)?;
                Some(
                    Event::new(SOURCE_NAME, CERTIFICATE_UPDATE, &domain)
                        .with_id(self.next_id())
                        .with_data("cn", cn.as_str())
                        .with_data("sans", sans.as_str())
                        .with_data("update_type", msg.data.update_type.as_str())
                        .with_metadata("matched_keywords", json!(matched)),
                )
            })
            .collect();
        Ok(events)
    }

    /// One Connecting → Streaming session. Returns on cancellation, queue
    /// closure, or the first I/O error.
    async fn stream(
        &self,
        shutdown: &Shutdown,
        publisher: &EventPublisher,
    ) -> Result<StreamEnd, CertstreamError> {
        let idle = self.settings.idle_timeout;
        self.set_state(ConnectionState::Connecting);

        let connect = tokio::time::timeout(idle, connect_async(self.settings.url.as_str()));
        let (mut ws, _) = tokio::select! {
            _ = self.halted(shutdown) => return Ok(StreamEnd::Cancelled),
            res = connect => res
                .map_err(|_| CertstreamError::IdleTimeout(idle))?
                .map_err(CertstreamError::Connect)?,
        };

        self.set_state(ConnectionState::Streaming);
        log::info!("Connected to certstream");
        log::info!("Monitoring keywords: {:?}", self.filter.keywords());

        loop {
            let next = tokio::select! {
                _ = self.halted(shutdown) => None,
                next = tokio::time::timeout(idle, ws.next()) => Some(next),
            };
            let Some(next) = next else {
                let _ = ws.close(None).await;
                return Ok(StreamEnd::Cancelled);
            };

            let text = match next {
                Err(_) => return Err(CertstreamError::IdleTimeout(idle)),
                Ok(None) => return Err(CertstreamError::Closed),
                Ok(Some(Err(e))) => return Err(CertstreamError::Read(e)),
                Ok(Some(Ok(Message::Text(text)))) => text,
                Ok(Some(Ok(Message::Binary(bytes)))) => match String::from_utf8(bytes) {
                    Ok(text) => text,
                    Err(_) => {
                        log::debug!("ignoring non-UTF-8 binary frame");
                        continue;
                    }
                },
                Ok(Some(Ok(Message::Ping(payload)))) => {
                    ws.send(Message::Pong(payload))
                        .await
                        .map_err(CertstreamError::Read)?;
                    continue;
                }
                Ok(Some(Ok(Message::Close(_)))) => return Err(CertstreamError::Closed),
                Ok(Some(Ok(_))) => continue,
            };

            let events = match self.events_from_message(&text) {
                Ok(events) => events,
                Err(e) => {
                    log::warn!("Failed to process cert entry: {e}");
                    continue;
                }
            };

            for event in events {
                let domain = event.domain().to_owned();
                let matched = event.metadata_strings("matched_keywords");
                let outcome = tokio::select! {
                    _ = self.halted(shutdown) => return Ok(StreamEnd::Cancelled),
                    outcome = publisher.publish(event) => outcome,
                };
                match outcome {
                    Ok(()) => log::info!("New certificate: {domain} (matched: {matched:?})"),
                    Err(PublishError::Dropped(_)) => {
                        log::warn!("Event queue full, dropping certificate: {domain}")
                    }
                    Err(PublishError::Closed) => return Ok(StreamEnd::QueueClosed),
                }
            }
        }
    }
}

#[async_trait]
impl Source for CertstreamSource {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    async fn start(&self, shutdown: Shutdown, publisher: EventPublisher) -> Result<(), StageError> {
        log::info!("Connecting to certstream: {}", self.settings.url);

        while !self.is_halted(&shutdown) {
            match self.stream(&shutdown, &publisher).await {
                Ok(StreamEnd::Cancelled) => break,
                Ok(StreamEnd::QueueClosed) => {
                    log::info!("Event queue closed, certstream source exiting");
                    break;
                }
                Err(e) => {
                    self.set_state(ConnectionState::Disconnected);
                    metrics::counter!("certstream_reconnects_total").increment(1);
                    log::warn!("Certstream connection failed: {e}");
                    log::info!(
                        "Reconnecting in {}...",
                        humantime::format_duration(self.settings.reconnect_delay)
                    );
                    tokio::select! {
                        _ = self.halted(&shutdown) => break,
                        _ = tokio::time::sleep(self.settings.reconnect_delay) => {}
                    }
                }
            }
        }

        self.set_state(ConnectionState::Disconnected);
        log::info!("Certstream source stopped");
        Ok(())
    }

    async fn stop(&self) -> Result<(), StageError> {
        self.stop.trigger();
        Ok(())
    }
}
