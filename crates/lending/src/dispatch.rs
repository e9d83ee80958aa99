//! Background delivery of investor notifications.

use std::sync::Arc;

use common::LoanId;
use loan_store::LoanRepository;
use tokio::sync::{Mutex, RwLock, mpsc};
use tokio::task::JoinHandle;

use crate::notifier::{Email, Notifier};

/// A request to notify every investor of a funded loan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationJob {
    pub loan_id: LoanId,
    pub agreement_letter_url: String,
}

/// Queues notification jobs and drains them on a background task.
///
/// Submission never blocks and never fails the caller: a full or closed
/// queue drops the job with a warning. Delivery is at most once.
pub struct NotificationDispatcher {
    queue: RwLock<Option<mpsc::Sender<NotificationJob>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl NotificationDispatcher {
    /// Starts the worker task. Must be called within a Tokio runtime.
    pub fn spawn<R>(
        repository: Arc<R>,
        notifier: Arc<dyn Notifier>,
        sender: String,
        capacity: usize,
    ) -> Self
    where
        R: LoanRepository + 'static,
    {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let worker = tokio::spawn(run_worker(rx, repository, notifier, sender));

        Self {
            queue: RwLock::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Queues a job without waiting for room.
    pub async fn submit(&self, job: NotificationJob) {
        let queue = self.queue.read().await;
        let Some(tx) = queue.as_ref() else {
            tracing::warn!(loan_id = %job.loan_id, "notification queue closed, dropping job");
            metrics::counter!("loan_notifications_dropped_total").increment(1);
            return;
        };

        if let Err(e) = tx.try_send(job) {
            let job = match e {
                mpsc::error::TrySendError::Full(job) | mpsc::error::TrySendError::Closed(job) => {
                    job
                }
            };
            tracing::warn!(loan_id = %job.loan_id, "notification queue full, dropping job");
            metrics::counter!("loan_notifications_dropped_total").increment(1);
        }
    }

    /// Closes the queue and waits until every queued job is delivered.
    ///
    /// Jobs submitted afterwards are dropped. Calling this twice is a no-op.
    pub async fn shutdown(&self) {
        self.queue.write().await.take();

        if let Some(worker) = self.worker.lock().await.take()
            && let Err(e) = worker.await
        {
            tracing::error!(error = %e, "notification worker panicked");
        }
    }
}

async fn run_worker<R>(
    mut rx: mpsc::Receiver<NotificationJob>,
    repository: Arc<R>,
    notifier: Arc<dyn Notifier>,
    sender: String,
) where
    R: LoanRepository + 'static,
{
    while let Some(job) = rx.recv().await {
        deliver(&job, repository.as_ref(), notifier.as_ref(), &sender).await;
    }
    tracing::debug!("notification worker stopped");
}

#[tracing::instrument(skip(repository, notifier, sender), fields(loan_id = %job.loan_id))]
async fn deliver<R>(job: &NotificationJob, repository: &R, notifier: &dyn Notifier, sender: &str)
where
    R: LoanRepository + ?Sized,
{
    let investors = match repository.investors_by_loan(job.loan_id).await {
        Ok(investors) => investors,
        Err(e) => {
            tracing::warn!(error = %e, "failed to load investors for notification");
            metrics::counter!("loan_notifications_failed_total").increment(1);
            return;
        }
    };

    for investor in investors {
        let email = Email::loan_invested(sender, &investor, job.loan_id, &job.agreement_letter_url);
        match notifier.send(email).await {
            Ok(()) => {
                metrics::counter!("loan_notifications_sent_total").increment(1);
            }
            Err(e) => {
                tracing::warn!(investor_id = %investor.id, error = %e, "failed to notify investor");
                metrics::counter!("loan_notifications_failed_total").increment(1);
            }
        }
    }
}
