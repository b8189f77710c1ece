//! Certificate handling policy.
//!
//! The cryptographic stack is external; the core only reads certificate
//! subjects and makes two kinds of decisions: the application's own
//! identity certificate must be valid at startup (fatal otherwise), and
//! untrusted peer certificates are accepted or rejected per connection
//! according to the auto-accept switch.

use thiserror::Error;
use tracing::info;

/// The slice of a certificate the core reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    /// Certificate subject.
    pub subject: String,
}

impl Certificate {
    /// Create a certificate view with the given subject.
    #[must_use]
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
        }
    }
}

/// Identity errors; fatal to startup.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// The application instance certificate is missing or invalid.
    #[error("application instance certificate invalid: {0}")]
    Invalid(String),

    /// The certificate store could not be read.
    #[error("certificate store unavailable: {0}")]
    StoreUnavailable(String),
}

/// Provides the application's own identity certificate.
pub trait IdentityProvider: Send + Sync {
    /// Obtain and validate the application instance certificate.
    ///
    /// # Errors
    ///
    /// Returns an [`IdentityError`] if the certificate cannot be obtained
    /// or does not validate.
    fn application_certificate(&self) -> Result<Certificate, IdentityError>;
}

/// Identity provider with a fixed subject, for hosts whose stack manages
/// certificates elsewhere.
#[derive(Debug, Clone)]
pub struct FixedIdentity {
    certificate: Certificate,
}

impl FixedIdentity {
    /// Create a provider returning a certificate with the given subject.
    #[must_use]
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            certificate: Certificate::new(subject),
        }
    }
}

impl IdentityProvider for FixedIdentity {
    fn application_certificate(&self) -> Result<Certificate, IdentityError> {
        Ok(self.certificate.clone())
    }
}

/// Outcome of reviewing an untrusted peer certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accepted,
    Rejected,
}

/// Per-connection policy for untrusted peer certificates.
///
/// Not an error path either way: the decision is logged with the subject
/// and the connection proceeds or is refused accordingly.
#[derive(Debug, Clone)]
pub struct CertificatePolicy {
    auto_accept: bool,
}

impl CertificatePolicy {
    /// Create a policy with the given auto-accept switch.
    #[must_use]
    pub fn new(auto_accept: bool) -> Self {
        Self { auto_accept }
    }

    /// Decide on an untrusted peer certificate.
    #[must_use]
    pub fn review_untrusted(&self, certificate: &Certificate) -> Decision {
        if self.auto_accept {
            info!("Accepted certificate: {}", certificate.subject);
            Decision::Accepted
        } else {
            info!("Rejected certificate: {}", certificate.subject);
            Decision::Rejected
        }
    }
}
