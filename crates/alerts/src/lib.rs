//! Alert rules: periodic evaluation over the event window, cooldown,
//! notification fan-out and the acknowledge/resolve lifecycle.

pub mod error;
pub mod evaluator;
pub mod notify;

pub use error::AlertError;
pub use evaluator::{DEFAULT_EVAL_INTERVAL, Evaluator, spawn_evaluator};
pub use notify::{EmailBackend, Notifier, SmtpBackend, SmtpConfig};
