//! Weighted progress reporting.
//!
//! Every step reports one increment when it resolves. Increments are derived
//! from the cumulative completed weight, so once the whole plan weight has
//! been reported the increments add up to exactly 100.

use std::sync::Arc;

use tokio::sync::mpsc;

/// One progress update: a percentage increment and an optional message.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    pub increment: f64,
    pub message: Option<String>,
}

pub trait ProgressSink: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Forwards events over an unbounded channel to a UI task.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelSink {
    fn report(&self, event: ProgressEvent) {
        // A closed receiver only means nobody is watching anymore.
        let _ = self.tx.send(event);
    }
}

/// Logs progress messages.
#[derive(Debug, Clone, Default)]
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn report(&self, event: ProgressEvent) {
        if let Some(message) = event.message {
            tracing::info!(target: "hoist::progress", increment = event.increment, "{}", message);
        }
    }
}

/// Converts resolved step weights into percentage increments.
pub struct ProgressReporter {
    sink: Arc<dyn ProgressSink>,
    total_weight: u32,
    completed: u32,
    reported: f64,
}

impl ProgressReporter {
    pub fn new(sink: Arc<dyn ProgressSink>, total_weight: u32) -> Self {
        Self {
            sink,
            total_weight,
            completed: 0,
            reported: 0.0,
        }
    }

    /// Mark `weight` units of the plan as resolved.
    pub fn advance(&mut self, weight: u32, message: Option<String>) {
        if self.total_weight == 0 {
            return;
        }
        self.completed = (self.completed + weight).min(self.total_weight);
        let target = if self.completed == self.total_weight {
            100.0
        } else {
            f64::from(self.completed) * 100.0 / f64::from(self.total_weight)
        };
        let increment = target - self.reported;
        self.reported = target;
        self.sink.report(ProgressEvent { increment, message });
    }

    /// Emit a message without moving the bar.
    pub fn note(&self, message: impl Into<String>) {
        self.sink.report(ProgressEvent {
            increment: 0.0,
            message: Some(message.into()),
        });
    }

    pub fn total_weight(&self) -> u32 {
        self.total_weight
    }

    pub fn completed_weight(&self) -> u32 {
        self.completed
    }

    /// Percentage reported so far.
    pub fn reported(&self) -> f64 {
        self.reported
    }
}
