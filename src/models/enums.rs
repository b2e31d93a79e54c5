use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(MessageRole {
    Patient => "patient",
    Assistant => "assistant",
    Clinician => "clinician",
});

str_enum!(TicketStatus {
    Pending => "pending",
    Completed => "completed",
});

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn message_role_parses_store_values() {
        assert_eq!(MessageRole::from_str("clinician").unwrap(), MessageRole::Clinician);
        assert_eq!(MessageRole::Assistant.as_str(), "assistant");
    }

    #[test]
    fn unknown_role_is_rejected() {
        let err = MessageRole::from_str("ai").unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidEnum { .. }));
    }

    #[test]
    fn ticket_status_serializes_lowercase() {
        let json = serde_json::to_string(&TicketStatus::Completed).unwrap();
        assert_eq!(json, "\"completed\"");
    }
}
