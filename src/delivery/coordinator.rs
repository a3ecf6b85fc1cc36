// Copyright 2026 The Cortex Relay Authors
// SPDX-License-Identifier: Apache-2.0

// Stream delivery coordinator
//
// Owns the accumulation buffer for one request. Provider deltas are
// forwarded as `chunk` events and appended to the buffer; the extractor
// runs only when a new end marker could have pushed the section count
// over the early-batch threshold, and once more at stream end.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

use super::types::{DeliveryEvent, DeliveryPhase, DeliveryPolicy};
use crate::provider::{CompletionProvider, CompletionRequest};
use crate::sections::{extract, EndMarkerTracker, ExtractedSection, SectionCatalog};
use crate::store::Transcript;

/// Capacity of the event channel between the coordinator task and the
/// response body.
const EVENT_CHANNEL_CAPACITY: usize = 64;

pub struct StreamCoordinator {
    catalog: Arc<SectionCatalog>,
    policy: DeliveryPolicy,
    buffer: String,
    initial_batch_sent: bool,
    /// Number of sections delivered so far; the next `startIndex`.
    sent_sections: usize,
    /// Delivered flags indexed by ordinal.
    delivered: Vec<bool>,
    tracker: EndMarkerTracker,
    phase: DeliveryPhase,
    extraction_passes: usize,
}

impl StreamCoordinator {
    pub fn new(catalog: Arc<SectionCatalog>, policy: DeliveryPolicy) -> Self {
        let tracker = EndMarkerTracker::new(&catalog);
        let delivered = vec![false; catalog.len()];
        Self {
            catalog,
            policy,
            buffer: String::new(),
            initial_batch_sent: false,
            sent_sections: 0,
            delivered,
            tracker,
            phase: DeliveryPhase::Streaming,
            extraction_passes: 0,
        }
    }

    pub fn phase(&self) -> DeliveryPhase {
        self.phase
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn initial_batch_sent(&self) -> bool {
        self.initial_batch_sent
    }

    /// Number of full extraction passes run so far.
    pub fn extraction_passes(&self) -> usize {
        self.extraction_passes
    }

    // -----------------------------------------------------------------------
    // State machine
    // -----------------------------------------------------------------------

    /// Accept one provider delta and return the events it produces.
    ///
    /// Always a `chunk` for non-empty input, possibly followed by the early
    /// `sectionsReady` batch. Ignored once the coordinator has left
    /// `Streaming`.
    pub fn push_delta(&mut self, delta: &str) -> Vec<DeliveryEvent> {
        if self.phase != DeliveryPhase::Streaming || delta.is_empty() {
            return Vec::new();
        }

        let mut events = vec![DeliveryEvent::Chunk {
            content: delta.to_string(),
        }];
        self.buffer.push_str(delta);

        if self.initial_batch_sent {
            return events;
        }

        let threshold = self.policy.early_batch_threshold;
        let new_marker = self.tracker.observe(&self.catalog, &self.buffer);
        if new_marker && self.tracker.seen() >= threshold {
            let sections = self.extract_pass();
            if sections.len() >= threshold {
                events.push(self.early_batch(sections));
            }
        }

        events
    }

    /// Provider exhausted: run the final pass and emit the closing events.
    ///
    /// Ends in `Done`. Calling it from a terminal phase yields nothing.
    pub fn finish(&mut self) -> Vec<DeliveryEvent> {
        if self.phase.is_terminal() {
            return Vec::new();
        }
        self.phase = DeliveryPhase::Finalizing;

        let sections = self.extract_pass();
        let total = sections.len();
        let threshold = self.policy.early_batch_threshold;
        let mut events = Vec::with_capacity(3);

        // The stream can end before the throttled check ever fired
        if !self.initial_batch_sent && total >= threshold {
            events.push(self.early_batch(sections[..threshold].to_vec()));
        }

        // Sections are never lost once complete, so the undelivered ones are
        // exactly the surplus.
        let remaining: Vec<ExtractedSection> = sections
            .into_iter()
            .filter(|s| !self.delivered[s.ordinal])
            .collect();
        if !remaining.is_empty() {
            let start_index = self.sent_sections;
            self.mark_delivered(&remaining);
            events.push(DeliveryEvent::RemainingSections {
                sections: remaining,
                start_index,
            });
        }

        events.push(DeliveryEvent::Done {
            total_sections: total,
        });
        self.phase = DeliveryPhase::Done;
        events
    }

    /// Move to `Failed` and return the opaque client-facing error.
    pub fn fail(&mut self) -> DeliveryEvent {
        self.phase = DeliveryPhase::Failed;
        DeliveryEvent::public_error()
    }

    fn extract_pass(&mut self) -> Vec<ExtractedSection> {
        self.extraction_passes += 1;
        extract(&self.catalog, &self.buffer)
    }

    fn early_batch(&mut self, mut sections: Vec<ExtractedSection>) -> DeliveryEvent {
        let threshold = self.policy.early_batch_threshold;
        sections.truncate(threshold);
        self.initial_batch_sent = true;
        self.mark_delivered(&sections);
        DeliveryEvent::SectionsReady { sections }
    }

    fn mark_delivered(&mut self, sections: &[ExtractedSection]) {
        for section in sections {
            self.delivered[section.ordinal] = true;
        }
        self.sent_sections += sections.len();
    }

    // -----------------------------------------------------------------------
    // Task driver
    // -----------------------------------------------------------------------

    /// Run the whole exchange on a background task.
    ///
    /// The returned stream yields heartbeats, chunks, section batches and
    /// exactly one terminal event. Dropping it stops the provider stream and
    /// the heartbeat. When `transcript` is given, the user message and the
    /// full response are saved after a successful `done`.
    pub fn spawn(
        self,
        provider: Arc<dyn CompletionProvider>,
        request: CompletionRequest,
        transcript: Option<Transcript>,
    ) -> ReceiverStream<DeliveryEvent> {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        tokio::spawn(self.run(provider, request, transcript, tx));
        ReceiverStream::new(rx)
    }

    async fn run(
        mut self,
        provider: Arc<dyn CompletionProvider>,
        request: CompletionRequest,
        transcript: Option<Transcript>,
        tx: mpsc::Sender<DeliveryEvent>,
    ) {
        let request_id = Uuid::new_v4();
        let started = Instant::now();
        let user_message = request.message.clone();

        tracing::info!(
            request_id = %request_id,
            images = request.images.len(),
            threshold = self.policy.early_batch_threshold,
            "stream started"
        );

        let period = self.policy.heartbeat_interval;
        let mut heartbeat = time::interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // Heartbeats also cover the wait for the provider's first byte.
        let mut opening = provider.complete(request);
        let completion = loop {
            tokio::select! {
                _ = tx.closed() => {
                    tracing::info!(request_id = %request_id, "client disconnected before provider responded");
                    return;
                }
                _ = heartbeat.tick() => {
                    if tx.send(DeliveryEvent::Heartbeat).await.is_err() {
                        return;
                    }
                }
                result = &mut opening => break result,
            }
        };
        drop(opening);

        let mut deltas = match completion {
            Ok(completion) => completion.into_deltas(),
            Err(e) => {
                tracing::error!(request_id = %request_id, error = %e, "provider request failed");
                let _ = tx.send(self.fail()).await;
                return;
            }
        };

        let mut chunks = 0usize;
        loop {
            tokio::select! {
                _ = tx.closed() => {
                    tracing::info!(
                        request_id = %request_id,
                        chunks,
                        "client disconnected, stopping provider stream"
                    );
                    return;
                }
                _ = heartbeat.tick() => {
                    if tx.send(DeliveryEvent::Heartbeat).await.is_err() {
                        return;
                    }
                }
                next = deltas.next() => match next {
                    Some(Ok(delta)) => {
                        chunks += 1;
                        for event in self.push_delta(&delta) {
                            if let DeliveryEvent::SectionsReady { sections } = &event {
                                tracing::info!(
                                    request_id = %request_id,
                                    sections = sections.len(),
                                    elapsed_ms = started.elapsed().as_millis() as u64,
                                    "early sections delivered"
                                );
                            }
                            if tx.send(event).await.is_err() {
                                return;
                            }
                        }
                    }
                    Some(Err(e)) => {
                        tracing::error!(
                            request_id = %request_id,
                            error = %e,
                            chunks,
                            "provider stream failed"
                        );
                        let _ = tx.send(self.fail()).await;
                        return;
                    }
                    None => break,
                }
            }
        }
        drop(deltas);

        for event in self.finish() {
            if let DeliveryEvent::Done { total_sections } = &event {
                tracing::info!(
                    request_id = %request_id,
                    total_sections,
                    chunks,
                    extraction_passes = self.extraction_passes,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "stream complete"
                );
            }
            if tx.send(event).await.is_err() {
                return;
            }
        }
        // The client stream ends here; persistence runs after it.
        drop(tx);

        if let Some(transcript) = transcript {
            if let Err(e) = transcript.save_exchange(&user_message, &self.buffer).await {
                tracing::warn!(
                    request_id = %request_id,
                    session_id = transcript.session_id(),
                    error = %e,
                    "failed to save transcript"
                );
            }
        }
    }
}
