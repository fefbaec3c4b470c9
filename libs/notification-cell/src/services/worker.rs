use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

use shared_database::Database;

use crate::error::NotificationError;
use crate::models::{DeliveryReport, NotificationEvent, OutboxStatus, WorkerConfig};
use crate::services::mailer::Mailer;
use crate::services::{outbox, templates};

pub struct NotificationWorker {
    db: Arc<Database>,
    mailer: Arc<dyn Mailer>,
    config: WorkerConfig,
}

impl NotificationWorker {
    pub fn new(db: Arc<Database>, mailer: Arc<dyn Mailer>, config: WorkerConfig) -> Self {
        Self { db, mailer, config }
    }

    /// Runs until every dispatcher handle is dropped, then flushes once more.
    #[instrument(skip(self, events))]
    pub async fn run(self, mut events: UnboundedReceiver<NotificationEvent>) {
        info!(
            "Notification worker started (poll every {:?}, max {} attempts)",
            self.config.poll_interval, self.config.max_attempts
        );

        let mut ticker = interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => {
                        if let Err(e) = self.store_event(event).await {
                            error!("Failed to store notification: {}", e);
                        }
                    }
                    None => {
                        debug!("All dispatchers dropped, flushing outbox");
                        self.log_delivery(self.deliver_pending().await);
                        break;
                    }
                },
                _ = ticker.tick() => {
                    self.log_delivery(self.deliver_pending().await);
                }
            }
        }

        info!("Notification worker stopped");
    }

    /// Renders the event and writes its messages to the outbox as pending.
    pub async fn store_event(&self, event: NotificationEvent) -> Result<usize, NotificationError> {
        let messages = templates::render(&event);
        let count = messages.len();

        self.db
            .transaction(move |tx| {
                for message in &messages {
                    outbox::enqueue(tx, message)?;
                }
                Ok::<_, NotificationError>(())
            })
            .await?;

        debug!(
            "Stored {} message(s) for {} on appointment {}",
            count,
            event.kind(),
            event.appointment_id()
        );
        Ok(count)
    }

    /// Delivers one batch of pending messages, oldest first.
    pub async fn deliver_pending(&self) -> Result<DeliveryReport, NotificationError> {
        let batch_size = self.config.batch_size;
        let batch = self
            .db
            .read(move |conn| outbox::pending_batch(conn, batch_size))
            .await?;

        let mut report = DeliveryReport::default();
        if batch.is_empty() {
            return Ok(report);
        }

        debug!("Delivering {} pending notification(s)", batch.len());

        for entry in batch {
            let outcome = match timeout(self.config.delivery_timeout, self.mailer.send(&entry.message)).await {
                Ok(result) => result,
                Err(_) => Err(NotificationError::Delivery("delivery timed out".to_string())),
            };

            let id = entry.id;
            match outcome {
                Ok(()) => {
                    self.db
                        .transaction(move |tx| outbox::mark_sent(tx, id))
                        .await?;
                    report.sent += 1;
                }
                Err(e) => {
                    let reason = e.to_string();
                    let max_attempts = self.config.max_attempts;
                    let status = self
                        .db
                        .transaction(move |tx| outbox::record_failure(tx, id, &reason, max_attempts))
                        .await?;

                    match status {
                        OutboxStatus::Failed => {
                            warn!("Giving up on email {} to {}: {}", id, entry.message.to, e);
                            report.failed += 1;
                        }
                        _ => {
                            debug!("Email {} to {} will be retried: {}", id, entry.message.to, e);
                            report.retrying += 1;
                        }
                    }
                }
            }
        }

        Ok(report)
    }

    fn log_delivery(&self, result: Result<DeliveryReport, NotificationError>) {
        match result {
            Ok(report) if report == DeliveryReport::default() => {}
            Ok(report) => info!(
                "Notification delivery: {} sent, {} retrying, {} failed",
                report.sent, report.retrying, report.failed
            ),
            Err(e) => error!("Notification delivery pass failed: {}", e),
        }
    }
}
