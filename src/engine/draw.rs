//! Draw Engine
//!
//! Weighted selection over a catalog version. The cumulative table is built
//! once per version and cached by fingerprint; each draw is one uniform
//! sample in `[0, total)` and a binary search.

use dashmap::DashMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::domain::RewardCatalogVersion;
use crate::error::{EconomyError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CumulativeTable {
    cumulative: Vec<u64>,
    total: u64,
}

impl CumulativeTable {
    pub fn build(version: &RewardCatalogVersion) -> Result<Self> {
        let mut running = 0u64;
        let cumulative: Vec<u64> = version
            .rewards
            .iter()
            .map(|r| {
                running += r.weight as u64;
                running
            })
            .collect();

        if running == 0 {
            return Err(EconomyError::WeightSumError {
                expected: crate::domain::WEIGHT_TOTAL,
                actual: 0,
            });
        }

        Ok(Self {
            cumulative,
            total: running,
        })
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// Position of the first entry whose cumulative weight exceeds `u`
    pub fn pick(&self, u: u64) -> usize {
        self.cumulative.partition_point(|&c| c <= u)
    }
}

#[derive(Default)]
pub struct DrawEngine {
    tables: DashMap<String, Arc<CumulativeTable>>,
}

impl DrawEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Draw one segment index from `version`
    pub fn draw<R: Rng>(
        &self,
        version: &RewardCatalogVersion,
        rng: &mut R,
    ) -> Result<u32> {
        let table = self.table(version)?;
        let u = rng.gen_range(0..table.total());
        let position = table.pick(u);

        let segment = version
            .rewards
            .get(position)
            .map(|r| r.segment_index)
            .ok_or_else(|| {
                EconomyError::Internal(format!(
                    "draw landed past the end of {} catalog v{}",
                    version.game_type, version.version
                ))
            })?;

        debug!(
            game = %version.game_type,
            version = version.version,
            u,
            segment,
            "segment drawn"
        );
        Ok(segment)
    }

    fn table(&self, version: &RewardCatalogVersion) -> Result<Arc<CumulativeTable>> {
        if let Some(table) = self.tables.get(&version.fingerprint) {
            return Ok(table.value().clone());
        }
        let table = Arc::new(CumulativeTable::build(version)?);
        self.tables
            .insert(version.fingerprint.clone(), table.clone());
        Ok(table)
    }

    pub fn cached_tables(&self) -> usize {
        self.tables.len()
    }
}

/// Shared PRNG for request handlers. Seeded for reproducible runs,
/// otherwise from OS entropy.
pub struct DrawRng {
    inner: Mutex<StdRng>,
}

impl DrawRng {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            inner: Mutex::new(rng),
        }
    }

    pub fn draw(&self, engine: &DrawEngine, version: &RewardCatalogVersion) -> Result<u32> {
        let mut rng = self
            .inner
            .lock()
            .map_err(|_| EconomyError::Internal("draw rng poisoned".to_string()))?;
        engine.draw(version, &mut *rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{GameType, RewardDefinition};

    fn version(weights: &[u32]) -> RewardCatalogVersion {
        let rewards = weights
            .iter()
            .enumerate()
            .map(|(i, w)| RewardDefinition {
                segment_index: i as u32,
                label: format!("S{}", i),
                point_value: 100 * i as i64,
                xp_value: 0,
                weight: *w,
            })
            .collect();
        RewardCatalogVersion::new(GameType::SpinWheel, 1, rewards)
    }

    #[test]
    fn test_pick_boundaries() {
        let table = CumulativeTable::build(&version(&[50, 30, 20])).unwrap();
        assert_eq!(table.total(), 100);
        assert_eq!(table.pick(0), 0);
        assert_eq!(table.pick(49), 0);
        assert_eq!(table.pick(50), 1);
        assert_eq!(table.pick(79), 1);
        assert_eq!(table.pick(80), 2);
        assert_eq!(table.pick(99), 2);
    }

    #[test]
    fn test_zero_weight_segment_never_drawn() {
        let v = version(&[0, 100, 0]);
        let engine = DrawEngine::new();
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..1_000 {
            assert_eq!(engine.draw(&v, &mut rng).unwrap(), 1);
        }
    }

    #[test]
    fn test_all_zero_weights_rejected() {
        let err = CumulativeTable::build(&version(&[0, 0])).unwrap_err();
        assert!(matches!(err, EconomyError::WeightSumError { actual: 0, .. }));
    }

    #[test]
    fn test_frequencies_match_weights() {
        let v = version(&[50, 30, 20]);
        let engine = DrawEngine::new();
        let mut rng = StdRng::seed_from_u64(42);
        let draws = 100_000;

        let mut counts = [0u32; 3];
        for _ in 0..draws {
            counts[engine.draw(&v, &mut rng).unwrap() as usize] += 1;
        }

        for (count, expected) in counts.iter().zip([0.50, 0.30, 0.20]) {
            let observed = *count as f64 / draws as f64;
            assert!(
                (observed - expected).abs() < 0.01,
                "observed {} expected {}",
                observed,
                expected
            );
        }
        assert_eq!(engine.cached_tables(), 1);
    }

    #[test]
    fn test_same_seed_same_sequence() {
        let v = version(&[25, 25, 25, 25]);
        let engine = DrawEngine::new();
        let a = DrawRng::new(Some(7));
        let b = DrawRng::new(Some(7));
        let first: Vec<u32> = (0..50).map(|_| a.draw(&engine, &v).unwrap()).collect();
        let second: Vec<u32> = (0..50).map(|_| b.draw(&engine, &v).unwrap()).collect();
        assert_eq!(first, second);
    }
}
