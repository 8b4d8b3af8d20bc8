//! Scenario testing with mandatory oracles.
//!
//! A scenario describes one negotiation (device identity, what the service
//! offers, how the credential pipeline behaves), runs it end to end and
//! hands the [`NegotiationRecord`] to an oracle. A scenario cannot run
//! without an oracle.
//!
//! ```ignore
//! Scenario::new("happy path")
//!     .token_delay(Duration::from_millis(10))
//!     .oracle(oracle::all_of(vec![oracle::succeeded(), oracle::nonce_delivered_once()]))
//!     .run()?;
//! ```

mod builder;
pub mod oracle;
mod record;

pub use builder::{RunnableScenario, Scenario};
pub use record::NegotiationRecord;

/// Verifies a finished negotiation.
pub type OracleFn = Box<dyn Fn(&NegotiationRecord) -> Result<(), String>>;
