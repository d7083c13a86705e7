//! §4.9: the adaptive-quota backoff table and ATR (Adaptive Timeout
//! Ratio) blending math, lifted from the source's `maybe_adjust_quota`.

use std::sync::OnceLock;

const QUOTA_ADJ_SIZE: usize = 100;

fn quota_adj_table() -> &'static [u32; QUOTA_ADJ_SIZE] {
    static TABLE: OnceLock<[u32; QUOTA_ADJ_SIZE]> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = [0u32; QUOTA_ADJ_SIZE];
        for (n, slot) in table.iter_mut().enumerate() {
            let base = (10 + n) as f64 / 10.0;
            *slot = (10_000.0 / base.powf(1.5)) as u32;
        }
        table
    })
}

/// Tunables for the adaptive quota system, set via `setquota`.
#[derive(Debug, Clone, Copy)]
pub struct QuotaConfig {
    pub quota: u32,
    pub atr_freq: u32,
    pub atr_low: f64,
    pub atr_high: f64,
    pub atr_discount: f64,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        QuotaConfig {
            quota: 0,
            atr_freq: 20,
            atr_low: 0.3,
            atr_high: 0.5,
            atr_discount: 0.7,
        }
    }
}

/// Rolling state used to drive `mode` up or down the backoff table.
#[derive(Debug, Clone, Copy, Default)]
pub struct AtrState {
    pub completed: u32,
    pub timeouts: u32,
    pub atr: f64,
    pub mode: usize,
}

impl AtrState {
    /// Record one completed fetch; `timed_out` marks whether it timed
    /// out. Every `atr_freq` completions, recompute the blended ratio
    /// and step `mode` up or down the `quota_adj` table. Returns the
    /// new effective quota, or `None` if quotas are disabled
    /// (`config.quota == 0`).
    pub fn record_completion(&mut self, timed_out: bool, config: &QuotaConfig) -> Option<u32> {
        if config.quota == 0 {
            return None;
        }

        self.completed += 1;
        if timed_out {
            self.timeouts += 1;
        }

        if self.completed < config.atr_freq {
            return Some(self.effective_quota(config));
        }

        let ratio = self.timeouts as f64 / self.completed as f64;
        self.atr = self.atr * config.atr_discount + ratio * (1.0 - config.atr_discount);
        self.completed = 0;
        self.timeouts = 0;

        let last = QUOTA_ADJ_SIZE - 1;
        if self.atr < config.atr_low && self.mode > 0 {
            self.mode -= 1;
        } else if self.atr > config.atr_high && self.mode < last {
            self.mode += 1;
        }

        Some(self.effective_quota(config))
    }

    pub fn effective_quota(&self, config: &QuotaConfig) -> u32 {
        let adj = quota_adj_table()[self.mode.min(QUOTA_ADJ_SIZE - 1)];
        ((config.quota as u64 * adj as u64) / 10_000).max(1) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_adj_table_decreases_monotonically() {
        let table = quota_adj_table();
        for window in table.windows(2) {
            assert!(window[0] >= window[1]);
        }
        assert_eq!(10_000, table[0]);
    }

    #[test]
    fn high_timeout_ratio_shrinks_effective_quota() {
        let config = QuotaConfig {
            quota: 100,
            atr_freq: 4,
            atr_low: 0.1,
            atr_high: 0.2,
            atr_discount: 0.0,
        };
        let mut state = AtrState::default();
        let baseline = state.effective_quota(&config);
        for _ in 0..4 {
            state.record_completion(true, &config);
        }
        assert!(state.effective_quota(&config) < baseline);
    }

    #[test]
    fn quotas_disabled_when_configured_zero() {
        let config = QuotaConfig::default();
        let mut state = AtrState::default();
        assert_eq!(None, state.record_completion(false, &config));
    }
}
