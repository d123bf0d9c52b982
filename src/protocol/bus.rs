//! Channel-Addressed Message Bus
//!
//! An in-process stand-in for a host-wide message queue. Every channel owns a
//! FIFO mailbox of encoded frames; consumers block on a channel until a frame
//! arrives, optionally selecting only the frames they care about.
//!
//! ## Delivery Rules
//! - **At-least-once**: a frame is removed only by the consumer that takes it.
//! - **Non-destructive filtering**: `receive_where` skips frames that do not
//!   match, leaving them queued in arrival order for other consumers.
//! - **Closing**: once closed, every send and receive fails with a channel
//!   error, and blocked receivers are woken.

use super::types::{Channel, Envelope};
use crate::error::{ClusterError, Result};

use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

/// One channel's queue of encoded frames.
struct Mailbox {
    frames: Mutex<VecDeque<Vec<u8>>>,
    notify: Notify,
}

impl Mailbox {
    fn new() -> Self {
        Self {
            frames: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        }
    }
}

pub struct MessageBus {
    /// Structure: `Channel -> Mailbox`, created on first use.
    mailboxes: DashMap<Channel, Arc<Mailbox>>,
    closed: AtomicBool,
}

impl MessageBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            mailboxes: DashMap::new(),
            closed: AtomicBool::new(false),
        })
    }

    fn mailbox(&self, channel: Channel) -> Arc<Mailbox> {
        self.mailboxes
            .entry(channel)
            .or_insert_with(|| Arc::new(Mailbox::new()))
            .value()
            .clone()
    }

    fn ensure_open(&self, channel: Channel) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ClusterError::Channel {
                channel,
                reason: "message bus closed".to_string(),
            });
        }
        Ok(())
    }

    /// Enqueues an envelope on its destination channel.
    pub async fn send(&self, envelope: &Envelope) -> Result<()> {
        let frame = envelope.encode()?;
        self.send_frame(envelope.channel, frame).await?;
        tracing::trace!(
            "Sent {:?} for session {} on channel {}",
            envelope.operation,
            envelope.session,
            envelope.channel
        );
        Ok(())
    }

    /// Enqueues a raw frame. Frames are only validated when received.
    pub async fn send_frame(&self, channel: Channel, frame: Vec<u8>) -> Result<()> {
        self.ensure_open(channel)?;
        let mailbox = self.mailbox(channel);
        mailbox.frames.lock().await.push_back(frame);
        mailbox.notify.notify_waiters();
        Ok(())
    }

    /// Takes the oldest envelope on `channel`.
    ///
    /// Returns `Ok(None)` when nothing arrived within `timeout`. A frame that
    /// fails to decode is consumed and reported as a protocol violation.
    pub async fn receive(&self, channel: Channel, timeout: Duration) -> Result<Option<Envelope>> {
        let deadline = Instant::now() + timeout;
        let mailbox = self.mailbox(channel);

        loop {
            let notified = mailbox.notify.notified();
            tokio::pin!(notified);
            // Register before checking the queue so a send in between is not missed
            notified.as_mut().enable();

            self.ensure_open(channel)?;

            let frame = mailbox.frames.lock().await.pop_front();
            if let Some(frame) = frame {
                return Envelope::decode(&frame).map(Some);
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    /// Takes the oldest envelope on `channel` that satisfies `accept`.
    ///
    /// Frames that do not match, including ones that fail to decode, stay
    /// queued in order.
    pub async fn receive_where<F>(
        &self,
        channel: Channel,
        timeout: Duration,
        accept: F,
    ) -> Result<Option<Envelope>>
    where
        F: Fn(&Envelope) -> bool,
    {
        let deadline = Instant::now() + timeout;
        let mailbox = self.mailbox(channel);

        loop {
            let notified = mailbox.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            self.ensure_open(channel)?;

            {
                let mut frames = mailbox.frames.lock().await;
                let found = frames.iter().enumerate().find_map(|(idx, frame)| {
                    match Envelope::decode(frame) {
                        Ok(envelope) if accept(&envelope) => Some((idx, envelope)),
                        _ => None,
                    }
                });

                if let Some((idx, envelope)) = found {
                    frames.remove(idx);
                    return Ok(Some(envelope));
                }
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    /// Number of frames waiting on `channel`.
    pub async fn pending(&self, channel: Channel) -> usize {
        let mailbox = match self.mailboxes.get(&channel) {
            Some(entry) => entry.value().clone(),
            None => return 0,
        };
        let len = mailbox.frames.lock().await.len();
        len
    }

    /// Closes the bus and wakes every blocked receiver.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        for entry in self.mailboxes.iter() {
            entry.value().notify.notify_waiters();
        }
        tracing::info!("Message bus closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
