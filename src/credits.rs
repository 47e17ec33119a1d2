//! Credit reconciliation
//!
//! The payment contract is the system of record for minting credits. Reads
//! can still disagree: the primary RPC may be briefly unavailable or lag
//! behind a transaction that just landed. The reconciler reads the primary
//! path, falls back to a second endpoint pinned to its latest block, and
//! surfaces one answer from a short-lived per-address cache of observations.
//!
//! ```text
//! reconcile(addr)
//!   primary.read ──ok──────────────► observe(authoritative)
//!        │ none / error                        │
//!        ▼                                     ▼
//!   fallback.read ──ok──► observe(fallback)  surface
//!        │ none / error                 (newest non-zero, else newest;
//!        ▼                               ties favour authoritative)
//!   CreditError::Unavailable
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::chain::{format_address, Address, BlockTag, ChainError, CreditRecord, PaymentReads};
use crate::metrics::CREDIT_READS_TOTAL;

/// Which read path produced an observation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadSource {
    Authoritative,
    Fallback,
}

impl ReadSource {
    pub fn as_str(self) -> &'static str {
        match self {
            ReadSource::Authoritative => "authoritative",
            ReadSource::Fallback => "fallback",
        }
    }
}

/// One way of reading a user's credits
#[async_trait]
pub trait CreditReader: Send + Sync {
    /// `Ok(None)` means the path answered but had no value
    async fn read(&self, user: &Address) -> Result<Option<CreditRecord>, ChainError>;
}

/// Primary path: direct contract read at the latest block
pub struct ContractCreditReader {
    payment: Arc<dyn PaymentReads>,
}

impl ContractCreditReader {
    pub fn new(payment: Arc<dyn PaymentReads>) -> Self {
        Self { payment }
    }
}

#[async_trait]
impl CreditReader for ContractCreditReader {
    async fn read(&self, user: &Address) -> Result<Option<CreditRecord>, ChainError> {
        self.payment
            .credit_record(user, BlockTag::Latest)
            .await
            .map(Some)
    }
}

/// Fallback path: second endpoint, reads pinned to the block number it reports
pub struct PinnedBlockCreditReader {
    payment: Arc<dyn PaymentReads>,
}

impl PinnedBlockCreditReader {
    pub fn new(payment: Arc<dyn PaymentReads>) -> Self {
        Self { payment }
    }
}

#[async_trait]
impl CreditReader for PinnedBlockCreditReader {
    async fn read(&self, user: &Address) -> Result<Option<CreditRecord>, ChainError> {
        let block = self.payment.block_number().await?;
        debug!(block, "Fallback credit read pinned to block");
        self.payment
            .credit_record(user, BlockTag::Number(block))
            .await
            .map(Some)
    }
}

/// Error type for reconciliation
#[derive(Debug)]
pub enum CreditError {
    /// Neither read path produced a value
    Unavailable { primary: String, fallback: String },
}

impl std::fmt::Display for CreditError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CreditError::Unavailable { primary, fallback } => write!(
                f,
                "Credit state unavailable (primary: {}; fallback: {})",
                primary, fallback
            ),
        }
    }
}

impl std::error::Error for CreditError {}

/// Configuration for the reconciler
#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    /// Attempts made by `reconcile_after_mint`
    pub attempts: u32,
    /// Backoff unit; after attempt n the wait is n * 2 units
    pub backoff_unit: Duration,
    /// Observations older than this are dropped before surfacing
    pub freshness: Duration,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff_unit: Duration::from_secs(1),
            freshness: Duration::from_secs(30),
        }
    }
}

/// Surfaced credit state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditView {
    pub can_mint: bool,
    #[serde(with = "crate::codec::decimal")]
    pub credits: u64,
    pub source: ReadSource,
}

#[derive(Debug, Clone, Copy)]
struct Observation {
    record: CreditRecord,
    source: ReadSource,
    observed_at: Instant,
}

/// Latest observation per source for one address
#[derive(Debug, Default)]
struct ObservedCredits {
    authoritative: Option<Observation>,
    fallback: Option<Observation>,
}

impl ObservedCredits {
    fn insert(&mut self, observation: Observation) {
        match observation.source {
            ReadSource::Authoritative => self.authoritative = Some(observation),
            ReadSource::Fallback => self.fallback = Some(observation),
        }
    }

    fn evict_older_than(&mut self, freshness: Duration, now: Instant) {
        let fresh = |o: &Observation| now.saturating_duration_since(o.observed_at) <= freshness;
        self.authoritative = self.authoritative.filter(fresh);
        self.fallback = self.fallback.filter(fresh);
    }

    /// Newest non-zero observation, else newest; ties favour authoritative
    fn surface(&self) -> Option<Observation> {
        let candidates = [self.authoritative, self.fallback];
        let pick = |require_credits: bool| {
            candidates
                .iter()
                .flatten()
                .filter(|o| !require_credits || o.record.paid_token_count > 0)
                .copied()
                // max_by_key keeps the last maximum, so iterate authoritative last
                .rev()
                .max_by_key(|o| o.observed_at)
        };
        pick(true).or_else(|| pick(false))
    }
}

/// Reads credits through primary and fallback paths and reconciles them
pub struct CreditReconciler {
    primary: Arc<dyn CreditReader>,
    fallback: Arc<dyn CreditReader>,
    config: ReconcileConfig,
    cache: Mutex<HashMap<Address, ObservedCredits>>,
}

impl CreditReconciler {
    /// Create a new reconciler
    ///
    /// # Arguments
    /// * `primary` - Authoritative read path
    /// * `fallback` - Read path used when the primary has no value
    /// * `config` - Retry and freshness settings
    pub fn new(
        primary: Arc<dyn CreditReader>,
        fallback: Arc<dyn CreditReader>,
        config: ReconcileConfig,
    ) -> Self {
        Self {
            primary,
            fallback,
            config,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Read once and surface the reconciled view
    pub async fn reconcile(&self, user: &Address) -> Result<CreditView, CreditError> {
        let (record, source) = self.read_once(user).await?;
        let observation = Observation {
            record,
            source,
            observed_at: Instant::now(),
        };

        let mut cache = self.cache.lock().await;
        let observed = cache.entry(*user).or_default();
        observed.insert(observation);
        observed.evict_older_than(self.config.freshness, Instant::now());
        let surfaced = observed.surface().unwrap_or(observation);

        Ok(CreditView {
            can_mint: surfaced.record.can_mint,
            credits: surfaced.record.paid_token_count,
            source: surfaced.source,
        })
    }

    /// Re-read after a state-changing transaction until credits show up
    ///
    /// Clears the cached observations first so pre-transaction readings
    /// cannot mask the new state.
    pub async fn reconcile_after_mint(&self, user: &Address) -> Result<CreditView, CreditError> {
        self.invalidate(user).await;

        let mut last = None;
        for attempt in 1..=self.config.attempts.max(1) {
            match self.reconcile(user).await {
                Ok(view) if view.credits > 0 => {
                    info!(attempt, credits = view.credits, "Credits reconciled after mint");
                    return Ok(view);
                }
                Ok(view) => {
                    debug!(attempt, "No credits observed yet");
                    last = Some(Ok(view));
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Credit read failed after mint");
                    last = Some(Err(e));
                }
            }

            if attempt < self.config.attempts {
                tokio::time::sleep(self.config.backoff_unit * 2 * attempt).await;
            }
        }

        last.unwrap_or_else(|| {
            Err(CreditError::Unavailable {
                primary: "no attempts made".to_string(),
                fallback: "no attempts made".to_string(),
            })
        })
    }

    /// Drop every cached observation for `user`
    pub async fn invalidate(&self, user: &Address) {
        self.cache.lock().await.remove(user);
    }

    async fn read_once(&self, user: &Address) -> Result<(CreditRecord, ReadSource), CreditError> {
        let primary_error = match self.primary.read(user).await {
            Ok(Some(record)) => {
                CREDIT_READS_TOTAL
                    .with_label_values(&[ReadSource::Authoritative.as_str(), "ok"])
                    .inc();
                return Ok((record, ReadSource::Authoritative));
            }
            Ok(None) => "no value".to_string(),
            Err(e) => e.to_string(),
        };
        CREDIT_READS_TOTAL
            .with_label_values(&[ReadSource::Authoritative.as_str(), "unavailable"])
            .inc();
        warn!(
            user = %format_address(user),
            error = %primary_error,
            "Primary credit read unavailable, using fallback"
        );

        let fallback_error = match self.fallback.read(user).await {
            Ok(Some(record)) => {
                CREDIT_READS_TOTAL
                    .with_label_values(&[ReadSource::Fallback.as_str(), "ok"])
                    .inc();
                return Ok((record, ReadSource::Fallback));
            }
            Ok(None) => "no value".to_string(),
            Err(e) => e.to_string(),
        };
        CREDIT_READS_TOTAL
            .with_label_values(&[ReadSource::Fallback.as_str(), "unavailable"])
            .inc();

        Err(CreditError::Unavailable {
            primary: primary_error,
            fallback: fallback_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observation(credits: u64, source: ReadSource, observed_at: Instant) -> Observation {
        Observation {
            record: CreditRecord {
                can_mint: credits > 0,
                paid_token_count: credits,
            },
            source,
            observed_at,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_surface_prefers_non_zero() {
        let earlier = Instant::now();
        tokio::time::advance(Duration::from_secs(1)).await;
        let later = Instant::now();

        let observed = ObservedCredits {
            authoritative: Some(observation(0, ReadSource::Authoritative, later)),
            fallback: Some(observation(2, ReadSource::Fallback, earlier)),
        };
        let surfaced = observed.surface().unwrap();
        assert_eq!(surfaced.source, ReadSource::Fallback);
        assert_eq!(surfaced.record.paid_token_count, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_surface_ties_favour_authoritative() {
        let now = Instant::now();
        let both_zero = ObservedCredits {
            authoritative: Some(observation(0, ReadSource::Authoritative, now)),
            fallback: Some(observation(0, ReadSource::Fallback, now)),
        };
        assert_eq!(both_zero.surface().unwrap().source, ReadSource::Authoritative);

        let both_set = ObservedCredits {
            authoritative: Some(observation(1, ReadSource::Authoritative, now)),
            fallback: Some(observation(3, ReadSource::Fallback, now)),
        };
        assert_eq!(both_set.surface().unwrap().source, ReadSource::Authoritative);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_observations_are_evicted() {
        let start = Instant::now();
        let mut observed = ObservedCredits {
            authoritative: None,
            fallback: Some(observation(5, ReadSource::Fallback, start)),
        };
        tokio::time::advance(Duration::from_secs(31)).await;
        observed.evict_older_than(Duration::from_secs(30), Instant::now());
        assert!(observed.surface().is_none());
    }

    #[test]
    fn test_view_serialization() {
        let view = CreditView {
            can_mint: true,
            credits: 4,
            source: ReadSource::Fallback,
        };
        assert_eq!(
            serde_json::to_value(view).unwrap(),
            serde_json::json!({"canMint": true, "credits": "4", "source": "fallback"})
        );
    }
}
