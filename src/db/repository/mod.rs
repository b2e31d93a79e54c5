//! Repository layer: entity-scoped database operations.
//!
//! Every function takes a borrowed `Connection`; locking and change
//! notification live one level up in `crate::store`.

mod messages;
mod profiles;
mod sessions;
mod tickets;

use uuid::Uuid;

use super::DatabaseError;

pub use messages::*;
pub use profiles::*;
pub use sessions::*;
pub use tickets::*;

/// Parse a TEXT id column back into a `Uuid`.
pub(crate) fn parse_uuid(column: &'static str, value: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(value).map_err(|_| DatabaseError::InvalidId {
        column,
        value: value.to_string(),
    })
}
