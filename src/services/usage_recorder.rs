//! Fire-and-forget usage logging.
//!
//! The quota gate hands each finished request to [`UsageRecorder::record`],
//! which only enqueues it. A background worker drains the queue and inserts
//! `api_usage` rows, so a slow or failing database never delays or alters a
//! response that has already been produced.
//!
//! # Shutdown
//!
//! The worker exits once every `UsageRecorder` clone has been dropped and the
//! queue is empty. Awaiting the returned `JoinHandle` flushes queued records.

use std::sync::Arc;

use tokio::{
    sync::mpsc::{self, error::TrySendError},
    task::JoinHandle,
};

use crate::{models::usage::NewApiUsage, store::KeyStore};

#[derive(Clone)]
pub struct UsageRecorder {
    tx: mpsc::Sender<NewApiUsage>,
}

impl UsageRecorder {
    /// Start the writer task. `capacity` bounds the number of queued records.
    pub fn spawn(store: Arc<dyn KeyStore>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(run_writer(store, rx));

        (Self { tx }, handle)
    }

    /// Queue a usage record. Never blocks and never fails the caller.
    pub fn record(&self, usage: NewApiUsage) {
        match self.tx.try_send(usage) {
            Ok(()) => {}
            Err(TrySendError::Full(usage)) => {
                tracing::warn!(
                    api_key_id = %usage.api_key_id,
                    endpoint = %usage.endpoint,
                    "Usage queue full, dropping usage record"
                );
            }
            Err(TrySendError::Closed(usage)) => {
                tracing::warn!(
                    api_key_id = %usage.api_key_id,
                    "Usage writer stopped, dropping usage record"
                );
            }
        }
    }
}

async fn run_writer(store: Arc<dyn KeyStore>, mut rx: mpsc::Receiver<NewApiUsage>) {
    tracing::info!("Usage recorder started");

    while let Some(usage) = rx.recv().await {
        let api_key_id = usage.api_key_id;
        if let Err(e) = store.insert_usage(usage).await {
            tracing::error!(%api_key_id, error = %e, "Failed to log API usage");
        }
    }

    tracing::info!("Usage recorder stopped");
}
