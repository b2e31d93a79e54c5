pub mod enums;
pub mod identity;
pub mod message;
pub mod profile;
pub mod session;
pub mod ticket;

pub use identity::*;
pub use message::*;
pub use profile::*;
pub use session::*;
pub use ticket::*;

use chrono::{DateTime, Utc};

/// Convert store microseconds to a UTC timestamp.
///
/// Out-of-range values clamp to the Unix epoch rather than failing a read.
pub fn micros_to_utc(micros: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(micros).unwrap_or_default()
}
