//! Threshold alerting for incoming metric samples
//!
//! Evaluates samples against the active rules, gates repeats with a per-rule
//! cooldown and hands permitted alerts to the email dispatcher.

pub mod cooldown;
pub mod evaluator;
pub mod notifier;
pub mod recent;

pub use cooldown::CooldownGate;
pub use evaluator::ThresholdEvaluator;
pub use notifier::{Dispatcher, LogMailer, Mailer, Notification, NotifierError, SmtpMailer};
pub use recent::{FiredAlert, RecentAlerts, DEFAULT_RECENT_WINDOW};
