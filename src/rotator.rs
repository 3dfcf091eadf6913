//! Credential rotation across interchangeable provider keys.
//!
//! A [`CredentialRotator`] owns the ordered key list for one provider (the
//! news search API, the generative model) together with its cursor. Each
//! operation is tried once per key starting at the cursor; the cursor only
//! moves when a key fails, so later calls keep using a recently good key.
//!
//! # Backoff Strategy
//!
//! - Rate-limit class failures (HTTP 429, quota messages) sleep for
//!   `rate_limit_delay` plus random jitter (0-250ms) before the next key
//! - A full pass with no success starts a cooldown of `exhausted_cooldown`
//!   that later callers wait out before trying again
//!
//! Each call walks its own lap of the keys starting from a snapshot of the
//! cursor. The shared cursor is an atomic advanced with compare-and-swap
//! from the index that actually failed, so two concurrent failures on the
//! same key move it once rather than skipping the next key.

use crate::error::{Error, Result};
use rand::{Rng, rng};
use std::fmt;
use std::future::Future;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::{Instant, sleep, sleep_until};
use tracing::{debug, error, info, instrument, warn};

/// Delays applied while rotating.
#[derive(Debug, Clone, Copy)]
pub struct RotationPolicy {
    /// Pause before the next key after a rate-limit class failure.
    pub rate_limit_delay: Duration,
    /// Pause imposed on the whole set after every key failed in one pass.
    pub exhausted_cooldown: Duration,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            rate_limit_delay: Duration::from_millis(750),
            exhausted_cooldown: Duration::from_secs(2),
        }
    }
}

impl RotationPolicy {
    /// No sleeping at all. Used by tests.
    pub fn immediate() -> Self {
        Self {
            rate_limit_delay: Duration::ZERO,
            exhausted_cooldown: Duration::ZERO,
        }
    }
}

pub struct CredentialRotator {
    provider: String,
    credentials: Vec<String>,
    cursor: AtomicUsize,
    cooldown_until: Mutex<Option<Instant>>,
    policy: RotationPolicy,
}

impl CredentialRotator {
    /// Build a rotator whose starting key is chosen at random, spreading
    /// load across keys between process restarts.
    pub fn new(
        provider: impl Into<String>,
        credentials: Vec<String>,
        policy: RotationPolicy,
    ) -> Result<Self> {
        let start = match credentials.len() {
            0 => 0,
            n => rng().random_range(0..n),
        };
        Self::with_start(provider, credentials, policy, start)
    }

    /// Build a rotator starting at a fixed index (taken modulo the key count).
    pub fn with_start(
        provider: impl Into<String>,
        credentials: Vec<String>,
        policy: RotationPolicy,
        start: usize,
    ) -> Result<Self> {
        let provider = provider.into();
        let credentials: Vec<String> = credentials
            .into_iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
        if credentials.is_empty() {
            return Err(Error::Config(format!(
                "no credentials configured for {provider}"
            )));
        }
        let start = start % credentials.len();
        info!(%provider, keys = credentials.len(), start, "Credential rotator ready");
        Ok(Self {
            provider,
            cursor: AtomicUsize::new(start),
            credentials,
            cooldown_until: Mutex::new(None),
            policy,
        })
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn credential_count(&self) -> usize {
        self.credentials.len()
    }

    /// Index of the key the next call will try first.
    pub fn cursor(&self) -> usize {
        self.cursor.load(Ordering::Acquire)
    }

    /// Run `operation` with each key in turn until one succeeds.
    ///
    /// Returns the first success without moving the cursor further. After
    /// one failed attempt per key, fails with
    /// [`Error::ExhaustedCredentials`].
    #[instrument(level = "info", skip_all, fields(provider = %self.provider))]
    pub async fn with_fallback<T, F, Fut>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.wait_out_cooldown().await;

        let total = self.credential_count();
        // Walk a local lap from a snapshot so each key is tried exactly once,
        // even while other callers move the shared cursor.
        let start = self.cursor();
        for attempt in 1..=total {
            let index = (start + attempt - 1) % total;
            let credential = self.credentials[index].clone();
            let t0 = Instant::now();

            match operation(credential).await {
                Ok(value) => {
                    debug!(
                        attempt,
                        index,
                        elapsed_ms = t0.elapsed().as_millis() as u64,
                        "credential succeeded"
                    );
                    return Ok(value);
                }
                Err(e) => {
                    let rate_limited = e.is_rate_limited();
                    warn!(
                        attempt,
                        max = total,
                        key = %mask(&self.credentials[index]),
                        rate_limited,
                        elapsed_ms = t0.elapsed().as_millis() as u64,
                        error = %e,
                        "credential failed; rotating"
                    );
                    self.advance_from(index);

                    if rate_limited && attempt < total {
                        let delay = self.rate_limit_backoff();
                        if !delay.is_zero() {
                            debug!(?delay, "backing off after rate limit");
                            sleep(delay).await;
                        }
                    }
                }
            }
        }

        self.start_cooldown();
        error!(attempts = total, "every credential failed");
        Err(Error::ExhaustedCredentials {
            provider: self.provider().to_string(),
            attempts: total,
        })
    }

    /// Move the cursor past `failed`, unless another caller already did.
    fn advance_from(&self, failed: usize) {
        let next = (failed + 1) % self.credential_count();
        let _ = self
            .cursor
            .compare_exchange(failed, next, Ordering::AcqRel, Ordering::Acquire);
    }

    fn rate_limit_backoff(&self) -> Duration {
        if self.policy.rate_limit_delay.is_zero() {
            return Duration::ZERO;
        }
        let jitter_ms: u64 = rng().random_range(0..=250);
        self.policy.rate_limit_delay + Duration::from_millis(jitter_ms)
    }

    fn start_cooldown(&self) {
        if self.policy.exhausted_cooldown.is_zero() {
            return;
        }
        let until = Instant::now() + self.policy.exhausted_cooldown;
        let mut slot = self
            .cooldown_until
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = Some(slot.map_or(until, |current| current.max(until)));
    }

    async fn wait_out_cooldown(&self) {
        let until = {
            let mut slot = self
                .cooldown_until
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            match *slot {
                Some(t) if t > Instant::now() => Some(t),
                Some(_) => {
                    *slot = None;
                    None
                }
                None => None,
            }
        };
        if let Some(until) = until {
            info!(
                wait_ms = until.saturating_duration_since(Instant::now()).as_millis() as u64,
                "credential set cooling down"
            );
            sleep_until(until).await;
        }
    }
}

impl fmt::Debug for CredentialRotator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialRotator")
            .field("provider", &self.provider)
            .field(
                "credentials",
                &self.credentials.iter().map(|c| mask(c)).collect::<Vec<_>>(),
            )
            .field("cursor", &self.cursor())
            .field("policy", &self.policy)
            .finish()
    }
}

/// Show only the last four characters of a key.
pub fn mask(credential: &str) -> String {
    let count = credential.chars().count();
    if count <= 4 {
        return "****".to_string();
    }
    let tail: String = credential.chars().skip(count - 4).collect();
    format!("****{tail}")
}
