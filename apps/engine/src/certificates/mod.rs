//! TLS certificate expiry tracking for HTTPS monitors

pub mod monitor;
pub mod prober;

pub use monitor::{CertificateMonitor, SslCheckTrigger, SweepSummary};
pub use prober::{CertificateError, CertificateInfo, CertificateProber, TlsProber, days_until_expiry};
