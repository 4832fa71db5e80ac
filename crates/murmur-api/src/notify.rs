//! Background jobs: verification email delivery.
//!
//! Request handlers only call [`JobQueue::schedule`]; sending happens on a
//! worker task so a slow mail transport never holds up a request.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Sends running concurrently per worker.
const MAIL_CONCURRENCY: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Job {
    VerificationEmail { email: String, token: String },
}

pub trait JobQueue: Send + Sync {
    /// Fire-and-forget submission. Errors only if the queue is gone.
    fn schedule(&self, job: Job) -> anyhow::Result<()>;
}

/// Outbound email transport.
pub trait Mailer: Send + Sync + 'static {
    fn send_verification(
        &self,
        email: &str,
        link: &str,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;
}

/// Writes verification links to the log instead of sending mail.
#[derive(Default)]
pub struct LogMailer;

impl Mailer for LogMailer {
    async fn send_verification(&self, email: &str, link: &str) -> anyhow::Result<()> {
        info!("Verification email for {}: {}", email, link);
        Ok(())
    }
}

#[derive(Clone)]
pub struct MailQueue {
    tx: mpsc::UnboundedSender<Job>,
}

impl MailQueue {
    /// Spawn the worker. It stops when `cancel` fires or every queue handle is dropped.
    pub fn start<M: Mailer>(
        mailer: M,
        public_url: String,
        cancel: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_worker(Arc::new(mailer), public_url, rx, cancel));
        (Self { tx }, worker)
    }
}

impl JobQueue for MailQueue {
    fn schedule(&self, job: Job) -> anyhow::Result<()> {
        self.tx
            .send(job)
            .map_err(|_| anyhow::anyhow!("mail queue has stopped"))
    }
}

pub fn verification_link(public_url: &str, token: &str) -> String {
    format!("{}/api/user/verify/{}", public_url.trim_end_matches('/'), token)
}

async fn run_worker<M: Mailer>(
    mailer: Arc<M>,
    public_url: String,
    mut rx: mpsc::UnboundedReceiver<Job>,
    cancel: CancellationToken,
) {
    let permits = Arc::new(Semaphore::new(MAIL_CONCURRENCY));

    loop {
        let job = tokio::select! {
            _ = cancel.cancelled() => break,
            job = rx.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };

        let Ok(permit) = permits.clone().acquire_owned().await else {
            break;
        };
        let mailer = mailer.clone();
        let public_url = public_url.clone();

        tokio::spawn(async move {
            let _permit = permit;
            match job {
                Job::VerificationEmail { email, token } => {
                    let link = verification_link(&public_url, &token);
                    if let Err(e) = mailer.send_verification(&email, &link).await {
                        warn!("Verification email to {} failed: {}", email, e);
                    }
                }
            }
        });
    }

    info!("Mail worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Clone, Default)]
    struct RecordingMailer {
        sent: Arc<Mutex<Vec<(String, String)>>>,
    }

    impl Mailer for RecordingMailer {
        async fn send_verification(&self, email: &str, link: &str) -> anyhow::Result<()> {
            self.sent.lock().unwrap().push((email.to_string(), link.to_string()));
            Ok(())
        }
    }

    #[test]
    fn link_joins_without_double_slash() {
        assert_eq!(
            verification_link("http://localhost:3000/", "abc"),
            "http://localhost:3000/api/user/verify/abc"
        );
    }

    #[tokio::test]
    async fn scheduled_jobs_reach_the_mailer() {
        let mailer = RecordingMailer::default();
        let cancel = CancellationToken::new();
        let (queue, worker) = MailQueue::start(mailer.clone(), "http://chat.test".into(), cancel.clone());

        queue
            .schedule(Job::VerificationEmail {
                email: "a@x.com".into(),
                token: "tok".into(),
            })
            .unwrap();

        for _ in 0..100 {
            if !mailer.sent.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(
            mailer.sent.lock().unwrap().as_slice(),
            [("a@x.com".to_string(), "http://chat.test/api/user/verify/tok".to_string())]
        );

        cancel.cancel();
        worker.await.unwrap();
        assert!(queue.schedule(Job::VerificationEmail {
            email: "b@y.com".into(),
            token: "tok2".into(),
        })
        .is_err());
    }
}
