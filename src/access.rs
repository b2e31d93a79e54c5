//! Access control gate.
//!
//! Resolves an identity on a surface into a role. The clinician console
//! is default-deny: only emails in the configured allow-set pass, and a
//! pass is represented by a `ClinicianGrant` value that every privileged
//! operation requires.

use std::collections::BTreeSet;

use crate::error::AuthorizationError;
use crate::models::Identity;

/// Which client surface the request comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    Patient,
    Clinician,
}

/// Outcome of the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Not logged in. The caller is told to authenticate.
    Anonymous,
    Patient,
    /// Logged in but not on the allow-set. Terminal; never retried.
    ClinicianDenied,
    ClinicianAuthorized,
}

/// Proof that the gate admitted a clinician. Only `AccessGate` creates it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClinicianGrant {
    email: String,
}

impl ClinicianGrant {
    /// Normalized email of the admitted clinician.
    pub fn email(&self) -> &str {
        &self.email
    }
}

#[derive(Debug, Clone, Default)]
pub struct AccessGate {
    allowlist: BTreeSet<String>,
}

impl AccessGate {
    pub fn new<I, S>(emails: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            allowlist: emails
                .into_iter()
                .map(|e| normalize_email(e.as_ref()))
                .filter(|e| !e.is_empty())
                .collect(),
        }
    }

    pub fn is_allowed(&self, email: &str) -> bool {
        self.allowlist.contains(&normalize_email(email))
    }

    pub fn resolve_role(&self, identity: Option<&Identity>, surface: Surface) -> Role {
        match (identity, surface) {
            (None, _) => Role::Anonymous,
            (Some(_), Surface::Patient) => Role::Patient,
            (Some(id), Surface::Clinician) if self.is_allowed(&id.email) => {
                Role::ClinicianAuthorized
            }
            (Some(_), Surface::Clinician) => Role::ClinicianDenied,
        }
    }

    /// Admit a clinician or explain why not.
    pub fn grant(&self, identity: Option<&Identity>) -> Result<ClinicianGrant, AuthorizationError> {
        match self.resolve_role(identity, Surface::Clinician) {
            Role::ClinicianAuthorized => Ok(ClinicianGrant {
                email: identity.map(|i| normalize_email(&i.email)).unwrap_or_default(),
            }),
            Role::Anonymous => Err(AuthorizationError::Anonymous),
            _ => {
                let email = identity.map(|i| i.email.clone()).unwrap_or_default();
                tracing::warn!(email = %email, "Clinician console access denied");
                Err(AuthorizationError::NotClinician { email })
            }
        }
    }

    /// Require any logged-in identity on the patient surface.
    pub fn patient<'a>(&self, identity: Option<&'a Identity>) -> Result<&'a Identity, AuthorizationError> {
        identity.ok_or(AuthorizationError::Anonymous)
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
pub(crate) fn test_grant(email: &str) -> ClinicianGrant {
    ClinicianGrant {
        email: normalize_email(email),
    }
}
