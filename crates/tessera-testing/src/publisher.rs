use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tessera::{DomainEvent, EventPublisher};

/// Publisher that records every event it receives.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<DomainEvent>>,
    delay: Option<Duration>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep before recording each event, to make concurrent publishes
    /// observable.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn published(&self) -> Vec<DomainEvent> {
        self.published.lock().clone()
    }

    /// Names of the published events, in completion order.
    pub fn names(&self) -> Vec<String> {
        self.published
            .lock()
            .iter()
            .map(|e| e.name().to_string())
            .collect()
    }

    pub fn count(&self) -> usize {
        self.published.lock().len()
    }

    pub fn clear(&self) {
        self.published.lock().clear();
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, event: &DomainEvent) -> anyhow::Result<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.published.lock().push(event.clone());
        Ok(())
    }
}

/// Publisher that fails selected events and records the rest.
#[derive(Debug, Default)]
pub struct FailingPublisher {
    fail_all: bool,
    fail_names: HashSet<String>,
    attempts: Mutex<Vec<String>>,
    delivered: Mutex<Vec<DomainEvent>>,
}

impl FailingPublisher {
    /// Fails every event.
    pub fn all() -> Self {
        Self {
            fail_all: true,
            ..Self::default()
        }
    }

    /// Fails only events with one of `names`.
    pub fn named<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fail_names: names.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Names of every event handed to the publisher.
    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().clone()
    }

    pub fn delivered(&self) -> Vec<DomainEvent> {
        self.delivered.lock().clone()
    }
}

#[async_trait]
impl EventPublisher for FailingPublisher {
    async fn publish(&self, event: &DomainEvent) -> anyhow::Result<()> {
        self.attempts.lock().push(event.name().to_string());
        if self.fail_all || self.fail_names.contains(event.name()) {
            anyhow::bail!("publish rejected: {}", event.name());
        }
        self.delivered.lock().push(event.clone());
        Ok(())
    }
}
