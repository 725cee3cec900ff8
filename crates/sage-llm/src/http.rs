//! Shared HTTP client construction for consistent timeout configuration.

use std::time::Duration;

/// Create a shared HTTP client with standard sage configuration.
///
/// Config: 30s connect timeout, 60s request timeout, rustls TLS,
/// `sage/{version}` user-agent, redirect limit 10. Provider calls are the
/// only suspension points in the pipeline, so a hung request surfaces as a
/// timeout error rather than stalling a tenant forever.
#[must_use]
pub fn default_client() -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(30))
        .timeout(Duration::from_secs(60))
        .user_agent(concat!("sage/", env!("CARGO_PKG_VERSION")))
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .expect("default HTTP client construction must not fail")
}
