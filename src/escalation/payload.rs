//! Hospital notification payload and the manual fallback channel.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::models::EmergencyProfile;

pub const UNKNOWN_CONTACT: &str = "Unknown Contact";
pub const NO_PHONE: &str = "No Phone Provided";
pub const NO_ADDRESS: &str = "Address Not Provided";
pub const NO_CONDITIONS: &str = "None Reported";

/// Body of `POST /emergency-email`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyPayload {
    pub patient_email: String,
    pub hospital_email: String,
    pub contact_name: String,
    pub contact_phone: String,
    pub home_address: String,
    pub medical_conditions: String,
}

impl EmergencyPayload {
    /// Compose the payload from the patient's profile.
    ///
    /// A hospital email is mandatory; every other blank field gets a
    /// readable placeholder.
    pub fn compose(
        patient_email: &str,
        profile: Option<&EmergencyProfile>,
    ) -> Result<Self, ValidationError> {
        let profile = profile.cloned().unwrap_or_default().normalized();
        let hospital_email = profile
            .hospital_email
            .ok_or(ValidationError::MissingHospitalEmail)?;

        Ok(Self {
            patient_email: patient_email.to_string(),
            hospital_email,
            contact_name: profile
                .contact_name
                .unwrap_or_else(|| UNKNOWN_CONTACT.to_string()),
            contact_phone: profile.contact_phone.unwrap_or_else(|| NO_PHONE.to_string()),
            home_address: profile.home_address.unwrap_or_else(|| NO_ADDRESS.to_string()),
            medical_conditions: profile
                .medical_conditions
                .unwrap_or_else(|| NO_CONDITIONS.to_string()),
        })
    }
}

/// Pre-addressed message the patient can send by hand when dispatch fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualChannel {
    pub hospital_email: String,
    pub subject: String,
    pub body: String,
    /// `mailto:` link with subject and body pre-filled.
    pub mailto: String,
}

impl ManualChannel {
    pub fn for_payload(payload: &EmergencyPayload) -> Self {
        let subject = "EMERGENCY: Remedi patient needs assistance".to_string();
        let body = format!(
            "A Remedi patient has reported an emergency.\n\n\
             Patient email: {}\n\
             Emergency contact: {}\n\
             Contact phone: {}\n\
             Home address: {}\n\
             Known conditions: {}\n",
            payload.patient_email,
            payload.contact_name,
            payload.contact_phone,
            payload.home_address,
            payload.medical_conditions,
        );
        let mailto = mailto_link(&payload.hospital_email, &subject, &body);
        Self {
            hospital_email: payload.hospital_email.clone(),
            subject,
            body,
            mailto,
        }
    }
}

/// RFC 6068 escaping: spaces become `%20`, never `+`.
const MAILTO_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');
const MAILTO_ADDRESS: &AsciiSet = &MAILTO_VALUE.remove(b'@');

fn mailto_link(to: &str, subject: &str, body: &str) -> String {
    format!(
        "mailto:{}?subject={}&body={}",
        utf8_percent_encode(to.trim(), MAILTO_ADDRESS),
        utf8_percent_encode(subject, MAILTO_VALUE),
        utf8_percent_encode(body, MAILTO_VALUE),
    )
}
