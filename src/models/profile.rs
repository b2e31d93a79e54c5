use serde::{Deserialize, Serialize};

/// Per-patient emergency settings. Every field is optional at rest;
/// the escalation coordinator decides which ones are required.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmergencyProfile {
    pub contact_name: Option<String>,
    pub contact_phone: Option<String>,
    pub hospital_name: Option<String>,
    pub hospital_email: Option<String>,
    pub home_address: Option<String>,
    pub medical_conditions: Option<String>,
}

impl EmergencyProfile {
    /// Trim every field and turn blank strings into `None`.
    pub fn normalized(self) -> Self {
        fn clean(value: Option<String>) -> Option<String> {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        }
        Self {
            contact_name: clean(self.contact_name),
            contact_phone: clean(self.contact_phone),
            hospital_name: clean(self.hospital_name),
            hospital_email: clean(self.hospital_email),
            home_address: clean(self.home_address),
            medical_conditions: clean(self.medical_conditions),
        }
    }
}
