//! Sampling pipeline: logits to one chosen token.
//!
//! Stages run in a fixed order on the surviving candidates:
//! repetition penalty, top-k, top-p, min-p, temperature, then one draw
//! from a seeded RNG. Probabilities are recomputed by softmax before every
//! probability-threshold stage and after temperature.

use std::collections::HashSet;

use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::SeedableRng;

use super::config::SamplingConfig;
use super::error::SessionError;
use super::TokenId;

/// Minimum number of candidates every filter keeps.
const MIN_KEEP: usize = 1;

/// One vocabulary entry under consideration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub id: TokenId,
    pub logit: f32,
    /// Probability; `0.0` until the first softmax.
    pub p: f32,
}

/// Candidates for a single sampling call.
#[derive(Debug, Clone)]
pub struct CandidateSet {
    data: Vec<Candidate>,
    sorted: bool,
}

impl CandidateSet {
    /// One candidate per vocabulary id, in id order.
    pub fn from_logits(logits: &[f32]) -> Self {
        let data = logits
            .iter()
            .enumerate()
            .map(|(id, &logit)| Candidate { id: id as TokenId, logit, p: 0.0 })
            .collect();
        Self { data, sorted: false }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[Candidate] {
        &self.data
    }

    pub fn ids(&self) -> Vec<TokenId> {
        self.data.iter().map(|c| c.id).collect()
    }

    /// Sum of candidate probabilities (1.0 right after a softmax).
    pub fn total_probability(&self) -> f32 {
        self.data.iter().map(|c| c.p).sum()
    }

    /// Penalize every candidate that appears in `recent`.
    pub fn apply_repetition_penalty(&mut self, recent: &[TokenId], penalty: f32) {
        if recent.is_empty() || penalty == 1.0 {
            return;
        }
        let seen: HashSet<TokenId> = recent.iter().copied().collect();
        for c in self.data.iter_mut().filter(|c| seen.contains(&c.id)) {
            if c.logit <= 0.0 {
                c.logit *= penalty;
            } else {
                c.logit /= penalty;
            }
        }
        self.sorted = false;
    }

    /// Keep the `k` highest logits. Equal logits keep ascending id order.
    pub fn top_k(&mut self, k: usize) {
        if k == 0 {
            return;
        }
        let k = k.max(MIN_KEEP).min(self.data.len());
        self.sort_by_logit();
        self.data.truncate(k);
    }

    /// Keep the smallest most-probable prefix whose mass reaches `p`.
    pub fn top_p(&mut self, p: f32) {
        if p >= 1.0 || self.data.is_empty() {
            return;
        }
        self.softmax();
        let mut cumulative = 0.0f32;
        let mut keep = self.data.len();
        for (i, c) in self.data.iter().enumerate() {
            cumulative += c.p;
            if cumulative >= p && i + 1 >= MIN_KEEP {
                keep = i + 1;
                break;
            }
        }
        self.data.truncate(keep);
    }

    /// Drop candidates whose probability is below `threshold` times the maximum.
    pub fn min_p(&mut self, threshold: f32) {
        if threshold <= 0.0 || self.data.is_empty() {
            return;
        }
        self.softmax();
        let cutoff = self.data[0].p * threshold;
        // Sorted by descending probability: survivors form a prefix.
        let keep = self.data.iter().take_while(|c| c.p >= cutoff).count();
        self.data.truncate(keep.max(MIN_KEEP));
    }

    /// Divide every logit by `temperature` and recompute probabilities.
    pub fn temperature(&mut self, temperature: f32) {
        for c in &mut self.data {
            c.logit /= temperature;
        }
        self.softmax();
    }

    /// Recompute probabilities from logits, leaving candidates sorted by logit.
    pub fn softmax(&mut self) {
        if self.data.is_empty() {
            return;
        }
        self.sort_by_logit();
        let max = self.data[0].logit;
        let mut sum = 0.0f32;
        for c in &mut self.data {
            c.p = (c.logit - max).exp();
            sum += c.p;
        }
        for c in &mut self.data {
            c.p /= sum;
        }
    }

    /// Highest-logit candidate.
    pub fn greedy(&mut self) -> Option<TokenId> {
        self.sort_by_logit();
        self.data.first().map(|c| c.id)
    }

    /// Draw one candidate from the current distribution.
    pub fn draw(&mut self, rng: &mut StdRng) -> Result<TokenId, SessionError> {
        self.softmax();
        let dist = WeightedIndex::new(self.data.iter().map(|c| c.p))
            .map_err(|e| SessionError::Sampling(e.to_string()))?;
        Ok(self.data[dist.sample(rng)].id)
    }

    fn sort_by_logit(&mut self) {
        if !self.sorted {
            // Stable: ties stay in ascending id order.
            self.data.sort_by(|a, b| b.logit.total_cmp(&a.logit));
            self.sorted = true;
        }
    }
}

/// Configured pipeline plus its RNG state.
#[derive(Debug, Clone)]
pub struct Sampler {
    config: SamplingConfig,
    rng: StdRng,
}

impl Sampler {
    pub fn new(config: SamplingConfig, seed: u64) -> Self {
        Self { config, rng: StdRng::seed_from_u64(seed) }
    }

    pub fn config(&self) -> &SamplingConfig {
        &self.config
    }

    /// Reseed the draw.
    pub fn reseed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    /// Current RNG state, for undoing a draw whose step did not commit.
    pub fn checkpoint(&self) -> StdRng {
        self.rng.clone()
    }

    pub fn restore(&mut self, checkpoint: StdRng) {
        self.rng = checkpoint;
    }

    /// Run the full pipeline over one logits row.
    ///
    /// `history` feeds the repetition penalty and is ignored when it is disabled.
    pub fn sample(&mut self, logits: &[f32], history: &[TokenId]) -> Result<TokenId, SessionError> {
        if logits.is_empty() {
            return Err(SessionError::Sampling("empty logits".into()));
        }
        if let Some(id) = logits.iter().position(|l| !l.is_finite()) {
            return Err(SessionError::Sampling(format!("non-finite logit for token {id}")));
        }
        let cfg = &self.config;
        let mut candidates = CandidateSet::from_logits(logits);
        if cfg.repeat_penalty > 1.0 {
            let start = history.len().saturating_sub(cfg.penalty_last_n);
            candidates.apply_repetition_penalty(&history[start..], cfg.repeat_penalty);
        }
        candidates.top_k(cfg.top_k as usize);
        candidates.top_p(cfg.top_p);
        candidates.min_p(cfg.min_p);
        if cfg.temperature <= 0.0 {
            return candidates
                .greedy()
                .ok_or_else(|| SessionError::Sampling("no candidates".into()));
        }
        candidates.temperature(cfg.temperature);
        candidates.draw(&mut self.rng)
    }
}
