//! Egress identity rotation.
//!
//! Tracks the health of every named egress path (e.g. region-scoped proxy
//! exits) and decides which one the next request should use. Each key
//! carries its own circuit breaker; a global backoff multiplier reacts to
//! the overall block rate and decays during quiet periods.
//!
//! All mutation goes through one internally synchronized manager so the
//! breaker logic is testable in isolation and concurrent `report()` calls
//! are safe.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::error::AppError;
use crate::models::FetchOutcome;
use crate::util::{rand_below, rand_choice};

/// Default rotation keys: region-scoped exits, rotated for diversity.
const DEFAULT_KEYS: &[&str] = &[
    "us_florida",
    "us_california",
    "us_massachusetts",
    "us_north_carolina",
    "us_south_carolina",
    "us_nevada",
    "us_new_york",
    "us_texas",
    "us_washington",
    "us_illinois",
    "us_arizona",
    "us_colorado",
    "us_georgia",
    "us_michigan",
    "us_ohio",
    "us_pennsylvania",
];

/// Configuration for the rotation manager.
#[derive(Debug, Clone)]
pub struct RotationConfig {
    /// Named egress keys to rotate across.
    pub keys: Vec<String>,
    /// Rotation interval bounds; the effective interval is drawn from
    /// this range, then shrunk while blocks are accumulating.
    pub min_interval: Duration,
    pub max_interval: Duration,
    /// Breaker settings applied to every key.
    pub breaker: CircuitBreakerConfig,
    /// Proxy URL template. `{key}` and `{session}` are substituted per
    /// acquisition; `None` rotates request identities only.
    pub proxy_template: Option<String>,
    /// Global backoff multiplier growth per block, and its cap.
    pub backoff_growth: f64,
    pub backoff_cap: f64,
    /// Multiplier decay applied after this long without a block.
    pub backoff_decay: f64,
    pub decay_window: Duration,
    /// Full block-count/backoff reset after this long without a block.
    pub quiet_reset_window: Duration,
    /// Per-key delay factor growth per block, and its cap.
    pub delay_growth: f64,
    pub delay_cap: f64,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            keys: DEFAULT_KEYS.iter().map(|s| s.to_string()).collect(),
            min_interval: Duration::from_secs(60),
            max_interval: Duration::from_secs(120),
            breaker: CircuitBreakerConfig::default(),
            proxy_template: None,
            backoff_growth: 1.5,
            backoff_cap: 8.0,
            backoff_decay: 0.8,
            decay_window: Duration::from_secs(600),
            quiet_reset_window: Duration::from_secs(1800),
            delay_growth: 1.5,
            delay_cap: 120.0,
        }
    }
}

/// Snapshot handed to the fetcher: which egress to use for one request.
#[derive(Debug, Clone)]
pub struct Egress {
    pub key: String,
    pub proxy: Option<String>,
}

/// Per-key health tracking. Mutated only by the rotation manager.
#[derive(Debug)]
struct EgressState {
    key: String,
    breaker: CircuitBreaker,
    block_count: u32,
    delay_factor: f64,
    last_used_at: Option<Instant>,
}

#[derive(Debug)]
struct RotationInner {
    states: Vec<EgressState>,
    current: Option<usize>,
    last_rotation: Option<Instant>,
    force_rotation: bool,
    global_backoff: f64,
    block_count: u32,
    last_block_time: Option<Instant>,
}

/// Tracks egress health and selects the next identity to use.
#[derive(Debug, Clone)]
pub struct RotationManager {
    config: RotationConfig,
    inner: Arc<Mutex<RotationInner>>,
}

impl RotationManager {
    pub fn new(config: RotationConfig) -> Result<Self, AppError> {
        if config.keys.is_empty() {
            return Err(AppError::ConfigError(
                "rotation requires at least one egress key".into(),
            ));
        }

        let states = config
            .keys
            .iter()
            .map(|key| EgressState {
                key: key.clone(),
                breaker: CircuitBreaker::new(key.clone(), config.breaker.clone()),
                block_count: 0,
                delay_factor: 1.0,
                last_used_at: None,
            })
            .collect();

        Ok(Self {
            config,
            inner: Arc::new(Mutex::new(RotationInner {
                states,
                current: None,
                last_rotation: None,
                force_rotation: false,
                global_backoff: 1.0,
                block_count: 0,
                last_block_time: None,
            })),
        })
    }

    fn lock_inner(&self) -> std::sync::MutexGuard<'_, RotationInner> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Recovered from poisoned rotation mutex");
            poisoned.into_inner()
        })
    }

    /// Current global backoff multiplier (1.0 when healthy).
    pub fn global_backoff(&self) -> f64 {
        self.lock_inner().global_backoff
    }

    /// Select the egress for the next request.
    ///
    /// Keeps the current selection while the rotation interval has not
    /// elapsed (unless `force`, or its breaker opened in the meantime);
    /// otherwise rotates to the healthiest candidate. Returns `None`
    /// never in practice — construction requires at least one key — but
    /// the contract allows it.
    pub fn acquire(&self, force: bool) -> Option<Egress> {
        let mut inner = self.lock_inner();
        self.decay_backoff(&mut inner);

        let interval = self.effective_interval(&inner);
        let rotation_due = match inner.last_rotation {
            None => true,
            Some(at) => at.elapsed() >= interval,
        };

        if !force && !inner.force_rotation && !rotation_due {
            if let Some(idx) = inner.current {
                // An open breaker on the current key forces rotation even
                // mid-interval.
                if inner.states[idx].breaker.allows_request() {
                    inner.states[idx].last_used_at = Some(Instant::now());
                    return Some(self.egress_for(&inner.states[idx]));
                }
            }
        }

        let idx = self.select(&mut inner)?;
        inner.current = Some(idx);
        inner.last_rotation = Some(Instant::now());
        inner.force_rotation = false;
        inner.states[idx].last_used_at = Some(Instant::now());

        let state = &inner.states[idx];
        tracing::info!(
            egress = %state.key,
            blocks = state.block_count,
            delay_factor = state.delay_factor,
            "Rotated egress identity"
        );
        Some(self.egress_for(state))
    }

    /// Feed a fetch outcome back into the egress health state.
    pub fn report(&self, key: &str, outcome: &FetchOutcome) {
        let mut inner = self.lock_inner();
        let Some(idx) = inner.states.iter().position(|s| s.key == key) else {
            tracing::warn!(egress = %key, "Report for unknown egress key");
            return;
        };

        match outcome {
            FetchOutcome::Success { .. } => {
                inner.states[idx].breaker.record_success();
            }
            FetchOutcome::SoftBlock { reason } => {
                self.record_block(&mut inner, idx, reason);
            }
            FetchOutcome::HardFailure { error } => {
                self.record_block(&mut inner, idx, &error.to_string());
            }
        }
    }

    fn record_block(&self, inner: &mut RotationInner, idx: usize, reason: &str) {
        {
            let state = &mut inner.states[idx];
            state.breaker.record_failure(reason);
            state.block_count += 1;
            state.delay_factor =
                (state.delay_factor * self.config.delay_growth).min(self.config.delay_cap);
        }

        inner.block_count += 1;
        inner.last_block_time = Some(Instant::now());
        inner.global_backoff =
            (inner.global_backoff * self.config.backoff_growth).min(self.config.backoff_cap);
        inner.force_rotation = true;

        tracing::warn!(
            egress = %inner.states[idx].key,
            reason = %reason,
            global_backoff = inner.global_backoff,
            "Egress reported blocked; forcing rotation"
        );
    }

    /// Pick the healthiest candidate: skip open breakers (unless their
    /// timeout elapsed — the Half-Open trial), prefer low block counts,
    /// choose randomly among the best three. All open ⇒ reset every
    /// breaker rather than deadlock.
    fn select(&self, inner: &mut RotationInner) -> Option<usize> {
        let mut candidates: Vec<usize> = (0..inner.states.len())
            .filter(|&i| inner.states[i].breaker.allows_request())
            .collect();

        if candidates.is_empty() {
            tracing::warn!("All egress breakers open; resetting all as last resort");
            for state in &mut inner.states {
                state.breaker.reset();
            }
            candidates = (0..inner.states.len()).collect();
        }

        candidates.sort_by(|&a, &b| {
            let sa = &inner.states[a];
            let sb = &inner.states[b];
            (sa.block_count, sa.delay_factor.to_bits())
                .cmp(&(sb.block_count, sb.delay_factor.to_bits()))
        });

        let pool = &candidates[..candidates.len().min(3)];
        Some(*rand_choice(pool))
    }

    fn egress_for(&self, state: &EgressState) -> Egress {
        let proxy = self.config.proxy_template.as_ref().map(|template| {
            let session = Uuid::new_v4().simple().to_string()[..12].to_string();
            template
                .replace("{key}", &state.key)
                .replace("{session}", &session)
        });
        Egress {
            key: state.key.clone(),
            proxy,
        }
    }

    /// Effective rotation interval: random in the configured bounds,
    /// shrunk while recent blocks accumulate so rotation speeds up under
    /// pressure.
    fn effective_interval(&self, inner: &RotationInner) -> Duration {
        let min = self.config.min_interval.as_millis() as u64;
        let max = self.config.max_interval.as_millis() as u64;
        let base = if max > min {
            min + rand_below(max - min)
        } else {
            min
        };

        if inner.block_count == 0 {
            return Duration::from_millis(base);
        }
        let reduction = (0.2 * f64::from(inner.block_count)).min(0.9);
        Duration::from_millis((base as f64 * (1.0 - reduction)) as u64)
    }

    /// Decay the global backoff multiplier during quiet periods, with a
    /// full reset after a long block-free window.
    fn decay_backoff(&self, inner: &mut RotationInner) {
        let Some(last_block) = inner.last_block_time else {
            return;
        };
        let quiet = last_block.elapsed();

        if quiet >= self.config.quiet_reset_window {
            if inner.block_count > 0 || inner.global_backoff > 1.0 {
                tracing::info!("Quiet window elapsed; resetting block count and global backoff");
            }
            inner.block_count = 0;
            inner.global_backoff = 1.0;
        } else if quiet >= self.config.decay_window && inner.global_backoff > 1.0 {
            inner.global_backoff = (inner.global_backoff * self.config.backoff_decay).max(1.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;

    fn test_config(keys: &[&str]) -> RotationConfig {
        RotationConfig {
            keys: keys.iter().map(|s| s.to_string()).collect(),
            // Immediate rotation in tests.
            min_interval: Duration::ZERO,
            max_interval: Duration::ZERO,
            breaker: CircuitBreakerConfig {
                reset_timeout: Duration::from_secs(300),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn soft_block() -> FetchOutcome {
        FetchOutcome::SoftBlock {
            reason: "captcha".into(),
        }
    }

    #[test]
    fn requires_at_least_one_key() {
        let err = RotationManager::new(test_config(&[])).unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));
    }

    #[test]
    fn acquire_returns_a_configured_key() {
        let mgr = RotationManager::new(test_config(&["us_ohio", "us_texas"])).unwrap();
        let egress = mgr.acquire(false).unwrap();
        assert!(["us_ohio", "us_texas"].contains(&egress.key.as_str()));
        assert!(egress.proxy.is_none());
    }

    #[test]
    fn tripped_breaker_is_not_acquired_until_timeout() {
        let mgr = RotationManager::new(test_config(&["us_ohio", "us_texas"])).unwrap();

        // Trip us_ohio: threshold is 2.
        mgr.report("us_ohio", &soft_block());
        mgr.report("us_ohio", &soft_block());

        for _ in 0..20 {
            let egress = mgr.acquire(true).unwrap();
            assert_eq!(egress.key, "us_texas");
        }
    }

    #[test]
    fn half_open_trial_after_timeout_and_success_resets() {
        let mut config = test_config(&["us_ohio"]);
        config.breaker.reset_timeout = Duration::from_millis(10);
        let mgr = RotationManager::new(config).unwrap();

        mgr.report("us_ohio", &soft_block());
        mgr.report("us_ohio", &soft_block());
        std::thread::sleep(Duration::from_millis(20));

        // Timeout elapsed: the sole key is eligible again as a trial.
        let egress = mgr.acquire(true).unwrap();
        assert_eq!(egress.key, "us_ohio");

        mgr.report(
            "us_ohio",
            &FetchOutcome::Success {
                html: "<html></html>".into(),
                status: 200,
            },
        );
        let inner = mgr.lock_inner();
        assert_eq!(inner.states[0].breaker.stats().failure_count, 0);
    }

    #[test]
    fn all_open_resets_every_breaker() {
        let mgr = RotationManager::new(test_config(&["us_ohio", "us_texas"])).unwrap();
        for key in ["us_ohio", "us_texas"] {
            mgr.report(key, &soft_block());
            mgr.report(key, &soft_block());
        }

        // Deadlock would mean None here; last-resort reset keeps rotating.
        assert!(mgr.acquire(true).is_some());
    }

    #[test]
    fn blocks_grow_global_backoff_and_success_leaves_it() {
        let mgr = RotationManager::new(test_config(&["us_ohio", "us_texas"])).unwrap();
        assert_eq!(mgr.global_backoff(), 1.0);

        mgr.report("us_ohio", &soft_block());
        let after_one = mgr.global_backoff();
        assert!(after_one > 1.0);

        mgr.report("us_texas", &soft_block());
        assert!(mgr.global_backoff() > after_one);
    }

    #[test]
    fn backoff_is_capped() {
        let mgr = RotationManager::new(test_config(&["us_ohio"])).unwrap();
        for _ in 0..50 {
            mgr.report("us_ohio", &soft_block());
        }
        assert!(mgr.global_backoff() <= 8.0);
    }

    #[test]
    fn hard_failure_also_counts_against_the_key() {
        let mgr = RotationManager::new(test_config(&["us_ohio", "us_texas"])).unwrap();
        mgr.report(
            "us_ohio",
            &FetchOutcome::HardFailure {
                error: AppError::Timeout(10),
            },
        );
        mgr.report(
            "us_ohio",
            &FetchOutcome::HardFailure {
                error: AppError::Timeout(10),
            },
        );

        let egress = mgr.acquire(true).unwrap();
        assert_eq!(egress.key, "us_texas");
    }

    #[test]
    fn proxy_template_substitutes_key_and_session() {
        let mut config = test_config(&["us_ohio"]);
        config.proxy_template =
            Some("http://customer-acme-st-{key}-sessid-{session}:pw@pr.example.io:7777".into());
        let mgr = RotationManager::new(config).unwrap();

        let egress = mgr.acquire(false).unwrap();
        let proxy = egress.proxy.unwrap();
        assert!(proxy.contains("-st-us_ohio-"));
        assert!(!proxy.contains("{session}"));
    }

    #[test]
    fn sticky_selection_inside_interval() {
        let mut config = test_config(&["us_ohio", "us_texas"]);
        config.min_interval = Duration::from_secs(60);
        config.max_interval = Duration::from_secs(60);
        let mgr = RotationManager::new(config).unwrap();

        let first = mgr.acquire(false).unwrap();
        for _ in 0..10 {
            assert_eq!(mgr.acquire(false).unwrap().key, first.key);
        }
    }
}
