//! Email delivery for triggered alerts
//!
//! The evaluator hands notifications to a [`Dispatcher`]: a bounded queue
//! drained by a fixed pool of workers, which caps the number of concurrent
//! SMTP sessions. Delivery is fire-and-forget. A failed send is logged and
//! dropped, and a full queue drops the notification at submission.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::{Credentials, Mechanism};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::config::SmtpConfig;
use crate::rules::AlertRule;

pub const SUBJECT_PREFIX: &str = "[fleetwatch alert]";

/// A composed, ready-to-send alert email
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub rule_id: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl Notification {
    /// Compose the plain-text email for `rule` observed at `value`
    pub fn compose(rule: &AlertRule, value: f64, at: DateTime<Utc>) -> Self {
        let body = format!(
            "ALERT NOTIFICATION\n\
             ==================\n\
             Time: {time}\n\
             Device: {device}\n\
             Metric: {metric}\n\
             Condition: {operator} {threshold:.2}\n\
             Current Value: {value:.2}\n\
             \n\
             Message:\n\
             {message}\n\
             \n\
             --\n\
             fleetwatch monitoring\n",
            time = at.format("%Y-%m-%d %H:%M:%S"),
            device = rule.device_id,
            metric = rule.metric,
            operator = rule.operator,
            threshold = rule.threshold,
            value = value,
            message = rule.notify_body,
        );

        Self {
            rule_id: rule.id.clone(),
            to: rule.notify_to.clone(),
            subject: format!("{} {}", SUBJECT_PREFIX, rule.notify_subject),
            body,
        }
    }
}

/// Mail submission backend
#[async_trait]
pub trait Mailer: Send + Sync {
    fn name(&self) -> &str;
    async fn send(&self, notification: &Notification) -> Result<(), NotifierError>;
}

/// SMTP submission over STARTTLS with PLAIN authentication
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    host: String,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Result<Self, NotifierError> {
        let from_addr = config.from.as_deref().unwrap_or(&config.username);
        let from: Mailbox = from_addr
            .parse()
            .map_err(|e: lettre::address::AddressError| {
                NotifierError::Address(format!("{}: {}", from_addr, e))
            })?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?
            .port(config.port)
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .authentication(vec![Mechanism::Plain])
            .timeout(Some(config.timeout))
            .build();

        Ok(Self {
            transport,
            from,
            host: config.host.clone(),
        })
    }

    /// Connect, upgrade to TLS and authenticate once
    pub async fn verify(&self) -> Result<(), NotifierError> {
        if self.transport.test_connection().await? {
            Ok(())
        } else {
            Err(NotifierError::Email(format!(
                "SMTP server {} did not accept the connection",
                self.host
            )))
        }
    }

    /// Startup check: a failure only logs a warning
    pub async fn verify_or_warn(&self) {
        match self.verify().await {
            Ok(()) => tracing::info!(host = %self.host, "SMTP configuration verified"),
            Err(e) => tracing::warn!(
                host = %self.host,
                error = %e,
                "SMTP verification failed, alert emails may not be delivered"
            ),
        }
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    fn name(&self) -> &str {
        "smtp"
    }

    async fn send(&self, notification: &Notification) -> Result<(), NotifierError> {
        let to: Mailbox = notification
            .to
            .parse()
            .map_err(|e: lettre::address::AddressError| {
                NotifierError::Address(format!("{}: {}", notification.to, e))
            })?;

        let email = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(notification.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(notification.body.clone())
            .map_err(|e| NotifierError::Email(e.to_string()))?;

        self.transport.send(email).await?;
        Ok(())
    }
}

/// Used when SMTP is not configured: notifications only reach the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, notification: &Notification) -> Result<(), NotifierError> {
        tracing::warn!(
            rule_id = %notification.rule_id,
            to = %notification.to,
            subject = %notification.subject,
            "Alert triggered (email delivery disabled)"
        );
        Ok(())
    }
}

/// Bounded hand-off from evaluation to mail delivery
pub struct Dispatcher {
    tx: parking_lot::RwLock<Option<mpsc::Sender<Notification>>>,
    workers: parking_lot::Mutex<Vec<JoinHandle<()>>>,
}

impl Dispatcher {
    /// Spawn `workers` delivery tasks behind a queue of `capacity` slots.
    ///
    /// Must be called inside a tokio runtime.
    pub fn start(mailer: Arc<dyn Mailer>, workers: usize, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel::<Notification>(capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let worker_count = workers.max(1);

        let workers = (0..worker_count)
            .map(|worker| {
                let rx = Arc::clone(&rx);
                let mailer = Arc::clone(&mailer);
                tokio::spawn(async move {
                    loop {
                        let next = rx.lock().await.recv().await;
                        match next {
                            Some(notification) => deliver(mailer.as_ref(), &notification).await,
                            None => break,
                        }
                    }
                    tracing::debug!(worker, "Dispatch worker stopped");
                })
            })
            .collect();

        tracing::info!(
            mailer = mailer.name(),
            workers = worker_count,
            capacity,
            "Notification dispatcher started"
        );

        Self {
            tx: parking_lot::RwLock::new(Some(tx)),
            workers: parking_lot::Mutex::new(workers),
        }
    }

    /// Queue a notification without waiting. Returns false if it was dropped.
    pub fn submit(&self, notification: Notification) -> bool {
        let tx = self.tx.read();
        let Some(tx) = tx.as_ref() else {
            tracing::error!(
                rule_id = %notification.rule_id,
                "Notification dispatcher stopped, dropping alert email"
            );
            return false;
        };

        match tx.try_send(notification) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(n)) => {
                tracing::error!(
                    rule_id = %n.rule_id,
                    to = %n.to,
                    "Notification queue full, dropping alert email"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(n)) => {
                tracing::error!(
                    rule_id = %n.rule_id,
                    "Notification dispatcher stopped, dropping alert email"
                );
                false
            }
        }
    }

    /// Stop accepting work and wait for queued notifications to drain
    pub async fn shutdown(&self) {
        self.tx.write().take();
        let workers = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            let _ = worker.await;
        }
    }
}

async fn deliver(mailer: &dyn Mailer, notification: &Notification) {
    match mailer.send(notification).await {
        Ok(()) => tracing::info!(
            rule_id = %notification.rule_id,
            to = %notification.to,
            "Alert email sent"
        ),
        Err(e) => tracing::error!(
            rule_id = %notification.rule_id,
            to = %notification.to,
            error = %e,
            "Failed to send alert email"
        ),
    }
}

/// Notifier errors
#[derive(Debug, thiserror::Error)]
pub enum NotifierError {
    #[error("Invalid address: {0}")]
    Address(String),

    #[error("Email error: {0}")]
    Email(String),

    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

/// Mailer that keeps every notification in memory
#[cfg(test)]
#[derive(Default)]
pub(crate) struct RecordingMailer {
    pub sent: parking_lot::Mutex<Vec<Notification>>,
    pub fail: bool,
}

#[cfg(test)]
impl RecordingMailer {
    pub fn failing() -> Self {
        Self {
            sent: Default::default(),
            fail: true,
        }
    }

    pub fn count(&self) -> usize {
        self.sent.lock().len()
    }

    /// Poll until `n` notifications arrived or a second passes
    pub async fn wait_for(&self, n: usize) -> usize {
        for _ in 0..100 {
            if self.count() >= n {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        self.count()
    }
}

#[cfg(test)]
#[async_trait]
impl Mailer for RecordingMailer {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send(&self, notification: &Notification) -> Result<(), NotifierError> {
        self.sent.lock().push(notification.clone());
        if self.fail {
            Err(NotifierError::Email("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{MetricKind, Operator};
    use chrono::TimeZone;
    use std::time::Duration;

    fn rule() -> AlertRule {
        AlertRule {
            id: "act-1".to_string(),
            topology_id: 1,
            device_id: "srv1".to_string(),
            metric: MetricKind::Cpu,
            operator: Operator::GreaterOrEqual,
            threshold: 70.0,
            notify_to: "ops@x.com".to_string(),
            notify_subject: "CPU high".to_string(),
            notify_body: "Please investigate".to_string(),
            cooldown: Duration::from_secs(300),
            last_triggered_at: None,
        }
    }

    #[test]
    fn test_compose_message() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 8, 15, 0).unwrap();
        let n = Notification::compose(&rule(), 75.456, at);

        assert_eq!(n.to, "ops@x.com");
        assert_eq!(n.subject, "[fleetwatch alert] CPU high");
        assert!(n.body.contains("Time: 2024-03-09 08:15:00"));
        assert!(n.body.contains("Device: srv1"));
        assert!(n.body.contains("Metric: cpu"));
        assert!(n.body.contains("Condition: >= 70.00"));
        assert!(n.body.contains("Current Value: 75.46"));
        assert!(n.body.contains("Please investigate"));
    }

    #[tokio::test]
    async fn test_log_mailer_succeeds() {
        let n = Notification::compose(&rule(), 80.0, Utc::now());
        assert!(LogMailer.send(&n).await.is_ok());
    }

    #[tokio::test]
    async fn test_dispatcher_delivers() {
        let mailer = Arc::new(RecordingMailer::default());
        let dispatcher = Dispatcher::start(mailer.clone(), 2, 8);

        for _ in 0..3 {
            assert!(dispatcher.submit(Notification::compose(&rule(), 80.0, Utc::now())));
        }
        dispatcher.shutdown().await;

        assert_eq!(mailer.count(), 3);
    }

    #[tokio::test]
    async fn test_failed_send_is_dropped() {
        let mailer = Arc::new(RecordingMailer::failing());
        let dispatcher = Dispatcher::start(mailer.clone(), 1, 4);

        assert!(dispatcher.submit(Notification::compose(&rule(), 80.0, Utc::now())));
        assert!(dispatcher.submit(Notification::compose(&rule(), 81.0, Utc::now())));
        dispatcher.shutdown().await;

        // one attempt each, no retries
        assert_eq!(mailer.count(), 2);
    }

    /// Mailer whose sends park until released
    #[derive(Default)]
    struct GatedMailer {
        started: std::sync::atomic::AtomicUsize,
        release: tokio::sync::Notify,
    }

    #[async_trait]
    impl Mailer for GatedMailer {
        fn name(&self) -> &str {
            "gated"
        }

        async fn send(&self, _notification: &Notification) -> Result<(), NotifierError> {
            self.started
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            self.release.notified().await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_full_queue_drops_notification() {
        use std::sync::atomic::Ordering;

        let mailer = Arc::new(GatedMailer::default());
        let dispatcher = Dispatcher::start(mailer.clone(), 1, 1);

        // first one occupies the only worker
        assert!(dispatcher.submit(Notification::compose(&rule(), 80.0, Utc::now())));
        for _ in 0..100 {
            if mailer.started.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(mailer.started.load(Ordering::SeqCst), 1);

        // second fills the queue, third has nowhere to go
        assert!(dispatcher.submit(Notification::compose(&rule(), 81.0, Utc::now())));
        assert!(!dispatcher.submit(Notification::compose(&rule(), 82.0, Utc::now())));

        mailer.release.notify_one();
        mailer.release.notify_one();
        dispatcher.shutdown().await;
        assert_eq!(mailer.started.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_smtp_verification_failure_is_not_fatal() {
        let config = SmtpConfig {
            host: "localhost".to_string(),
            port: 1,
            username: "alerts@example.com".to_string(),
            password: "secret".to_string(),
            from: None,
            timeout: Duration::from_secs(2),
        };
        let mailer = SmtpMailer::new(&config).unwrap();

        assert!(mailer.verify().await.is_err());
        mailer.verify_or_warn().await;
    }

    #[test]
    fn test_smtp_mailer_rejects_bad_sender() {
        let config = SmtpConfig {
            host: "smtp.example.com".to_string(),
            port: 587,
            username: "not an address".to_string(),
            password: "secret".to_string(),
            from: None,
            timeout: Duration::from_secs(5),
        };
        assert!(matches!(
            SmtpMailer::new(&config),
            Err(NotifierError::Address(_))
        ));
    }
}
