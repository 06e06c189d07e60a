//! Certificate handling: renewal timing and CSR generation.
//!
//! The lifecycle engine consumes both concerns through traits so tests can
//! substitute deterministic doubles:
//!
//! - [`CertUtil`] turns an issued certificate into the delay before renewal.
//! - [`CsrGenerator`] produces a fresh private key and CSR for every attempt.

mod csr;
mod error;
pub(crate) mod parsing;

pub use csr::{CsrGenerator, CsrOptions, GeneratedCsr, RsaCsrGenerator};
pub use error::{CertError, CsrError};

use std::time::{Duration, SystemTime};
use time::OffsetDateTime;

/// Computes how long to wait before renewing a certificate.
pub trait CertUtil: Send + Sync + 'static {
    /// Returns the time from `now` until the certificate should be renewed.
    ///
    /// # Errors
    ///
    /// Returns a [`CertError`] if the certificate cannot be parsed, is already
    /// expired at `now`, or is already due for renewal.
    fn wait_time(&self, cert_pem: &[u8], now: SystemTime) -> Result<Duration, CertError>;
}

/// [`CertUtil`] backed by `x509-parser`.
///
/// The renewal point is the certificate's not-after time minus a grace period.
/// The grace period is `grace_period_percentage` of the certificate lifetime,
/// raised to `min_grace_period` when that is larger. Both default to zero, so
/// by default the wait is exactly `not_after - now`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct X509CertUtil {
    grace_period_percentage: u8,
    min_grace_period: Duration,
}

impl X509CertUtil {
    /// A cert util with no grace period.
    pub fn new() -> Self {
        Self::default()
    }

    /// Renews once only `percentage`% of the certificate lifetime remains.
    ///
    /// Values above 100 are clamped to 100.
    #[must_use]
    pub fn with_grace_period_percentage(mut self, percentage: u8) -> Self {
        self.grace_period_percentage = percentage.min(100);
        self
    }

    /// Lower bound for the grace period.
    #[must_use]
    pub fn with_min_grace_period(mut self, min_grace_period: Duration) -> Self {
        self.min_grace_period = min_grace_period;
        self
    }
}

impl CertUtil for X509CertUtil {
    fn wait_time(&self, cert_pem: &[u8], now: SystemTime) -> Result<Duration, CertError> {
        let cert = parsing::parse_pem_certificate(cert_pem)?;
        let now = OffsetDateTime::from(now);

        let time_to_expire = cert.not_after - now;
        if !time_to_expire.is_positive() {
            return Err(CertError::Expired {
                not_after: cert.not_after,
                now,
            });
        }

        let lifetime = cert.not_after - cert.not_before;
        let grace = lifetime * (f64::from(self.grace_period_percentage) / 100.0);
        let min_grace =
            time::Duration::try_from(self.min_grace_period).unwrap_or(time::Duration::MAX);
        let grace = grace.max(min_grace);

        let wait = time_to_expire - grace;
        if wait.is_negative() {
            return Err(CertError::RenewNow);
        }
        Duration::try_from(wait).map_err(|_| CertError::RenewNow)
    }
}
