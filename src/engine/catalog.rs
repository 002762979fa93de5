//! Reward Catalog
//!
//! Versioned prize tables per game type. A published version is never
//! modified; new odds mean a new version. Readers get an `Arc` snapshot so
//! a publish can never be observed half-applied.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::adapters::EconomyStore;
use crate::domain::{validate_rewards, GameType, RewardCatalogVersion, RewardDefinition};
use crate::error::{EconomyError, Result};

/// Catalog seed file, one segment array per game type.
///
/// ```toml
/// [[spin_wheel]]
/// segment_index = 0
/// label = "50 Points"
/// point_value = 50
/// xp_value = 5
/// weight = 30
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogFile {
    #[serde(default)]
    pub spin_wheel: Vec<RewardDefinition>,
    #[serde(default)]
    pub scratch_card: Vec<RewardDefinition>,
}

impl CatalogFile {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn rewards(&self, game_type: GameType) -> &[RewardDefinition] {
        match game_type {
            GameType::SpinWheel => &self.spin_wheel,
            GameType::ScratchCard => &self.scratch_card,
        }
    }

    /// Validate every non-empty table, collecting all failures
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let errors: Vec<String> = GameType::all()
            .into_iter()
            .filter(|game| !self.rewards(*game).is_empty())
            .filter_map(|game| {
                validate_rewards(self.rewards(game))
                    .err()
                    .map(|e| format!("{}: {}", game, e))
            })
            .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Prize tables used when no catalog file is configured
    pub fn builtin() -> Self {
        fn seg(index: u32, label: &str, points: i64, xp: i64, weight: u32) -> RewardDefinition {
            RewardDefinition {
                segment_index: index,
                label: label.to_string(),
                point_value: points,
                xp_value: xp,
                weight,
            }
        }

        Self {
            spin_wheel: vec![
                seg(0, "10 Points", 10, 1, 25),
                seg(1, "25 Points", 25, 2, 20),
                seg(2, "50 Points", 50, 5, 18),
                seg(3, "Try Again", 0, 0, 15),
                seg(4, "100 Points", 100, 10, 10),
                seg(5, "200 Points", 200, 20, 6),
                seg(6, "500 Points", 500, 50, 4),
                seg(7, "Jackpot 1000", 1000, 100, 2),
            ],
            scratch_card: vec![
                seg(0, "No Prize", 0, 0, 40),
                seg(1, "20 Points", 20, 2, 30),
                seg(2, "75 Points", 75, 8, 20),
                seg(3, "250 Points", 250, 25, 8),
                seg(4, "Golden Ticket", 750, 75, 2),
            ],
        }
    }
}

pub struct RewardCatalog {
    store: Arc<dyn EconomyStore>,
    active: DashMap<GameType, Arc<RewardCatalogVersion>>,
    history: DashMap<(GameType, u32), Arc<RewardCatalogVersion>>,
    publish_lock: Mutex<()>,
}

impl RewardCatalog {
    pub fn new(store: Arc<dyn EconomyStore>) -> Self {
        Self {
            store,
            active: DashMap::new(),
            history: DashMap::new(),
            publish_lock: Mutex::new(()),
        }
    }

    /// Load every stored version; the highest becomes active.
    pub async fn load(&self) -> Result<usize> {
        let mut loaded = 0;
        for game in GameType::all() {
            for version in self.store.catalog_versions(game).await? {
                let version = Arc::new(version);
                self.history
                    .insert((game, version.version), version.clone());
                let newer = self
                    .active
                    .get(&game)
                    .map_or(true, |current| current.version < version.version);
                if newer {
                    self.active.insert(game, version);
                }
                loaded += 1;
            }
        }
        Ok(loaded)
    }

    /// Publish the file's tables for any game type that has no active version
    pub async fn seed(&self, file: &CatalogFile) -> Result<()> {
        for game in GameType::all() {
            let rewards = file.rewards(game);
            if rewards.is_empty() || self.active.contains_key(&game) {
                continue;
            }
            self.publish(game, rewards.to_vec()).await?;
        }
        Ok(())
    }

    pub fn validate(&self, version: &RewardCatalogVersion) -> Result<()> {
        version.validate()
    }

    /// Currently active version
    pub fn get_version(&self, game_type: GameType) -> Result<Arc<RewardCatalogVersion>> {
        self.active
            .get(&game_type)
            .map(|v| v.value().clone())
            .ok_or_else(|| EconomyError::NotFound(format!("no active {} catalog", game_type)))
    }

    /// A specific, possibly superseded, version
    pub async fn version(
        &self,
        game_type: GameType,
        version: u32,
    ) -> Result<Arc<RewardCatalogVersion>> {
        if let Some(found) = self.history.get(&(game_type, version)) {
            return Ok(found.value().clone());
        }
        let stored = self
            .store
            .catalog_versions(game_type)
            .await?
            .into_iter()
            .find(|v| v.version == version)
            .ok_or_else(|| {
                EconomyError::NotFound(format!("{} catalog version {}", game_type, version))
            })?;
        let stored = Arc::new(stored);
        self.history.insert((game_type, version), stored.clone());
        Ok(stored)
    }

    pub async fn history(&self, game_type: GameType) -> Result<Vec<RewardCatalogVersion>> {
        self.store.catalog_versions(game_type).await
    }

    /// Validate and append a new version, which becomes active.
    pub async fn publish(
        &self,
        game_type: GameType,
        rewards: Vec<RewardDefinition>,
    ) -> Result<Arc<RewardCatalogVersion>> {
        if let Err(e) = validate_rewards(&rewards) {
            warn!(game = %game_type, error = %e, "catalog publish rejected");
            return Err(e);
        }

        let _publishing = self.publish_lock.lock().await;
        let next = self
            .store
            .catalog_versions(game_type)
            .await?
            .iter()
            .map(|v| v.version)
            .max()
            .unwrap_or(0)
            + 1;

        let version = RewardCatalogVersion::new(game_type, next, rewards);
        self.store.insert_catalog_version(&version).await?;

        let version = Arc::new(version);
        self.history.insert((game_type, next), version.clone());
        self.active.insert(game_type, version.clone());

        info!(
            game = %game_type,
            version = next,
            segments = version.rewards.len(),
            fingerprint = %version.fingerprint,
            "catalog version published"
        );
        Ok(version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MemoryStore;

    fn catalog() -> RewardCatalog {
        RewardCatalog::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn test_builtin_tables_are_valid() {
        assert!(CatalogFile::builtin().validate().is_ok());
    }

    #[test]
    fn test_parse_catalog_file() {
        let raw = r#"
            [[scratch_card]]
            segment_index = 0
            label = "Nothing"
            point_value = 0
            xp_value = 0
            weight = 60

            [[scratch_card]]
            segment_index = 1
            label = "40 Points"
            point_value = 40
            xp_value = 4
            weight = 40
        "#;
        let file = CatalogFile::parse(raw).unwrap();
        assert!(file.spin_wheel.is_empty());
        assert_eq!(file.scratch_card.len(), 2);
        assert!(file.validate().is_ok());
    }

    #[test]
    fn test_file_validation_reports_each_game() {
        let mut file = CatalogFile::builtin();
        file.spin_wheel[0].weight += 1;
        file.scratch_card[1].segment_index = 0;
        let errors = file.validate().unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[tokio::test]
    async fn test_publish_appends_versions() {
        let catalog = catalog();
        let rewards = CatalogFile::builtin().spin_wheel;

        let v1 = catalog
            .publish(GameType::SpinWheel, rewards.clone())
            .await
            .unwrap();
        let mut reweighted = rewards;
        reweighted[0].weight -= 1;
        reweighted[1].weight += 1;
        let v2 = catalog
            .publish(GameType::SpinWheel, reweighted)
            .await
            .unwrap();

        assert_eq!(v1.version, 1);
        assert_eq!(v2.version, 2);
        assert_ne!(v1.fingerprint, v2.fingerprint);
        assert_eq!(catalog.get_version(GameType::SpinWheel).unwrap().version, 2);

        // Superseded version is still readable and unchanged
        let old = catalog.version(GameType::SpinWheel, 1).await.unwrap();
        assert_eq!(old.rewards, v1.rewards);
    }

    #[tokio::test]
    async fn test_invalid_publish_keeps_active_version() {
        let catalog = catalog();
        catalog
            .seed(&CatalogFile::builtin())
            .await
            .unwrap();

        let mut broken = CatalogFile::builtin().scratch_card;
        broken[0].weight = 0;
        let err = catalog
            .publish(GameType::ScratchCard, broken)
            .await
            .unwrap_err();
        assert!(matches!(err, EconomyError::WeightSumError { .. }));
        assert_eq!(catalog.get_version(GameType::ScratchCard).unwrap().version, 1);
    }

    #[tokio::test]
    async fn test_load_restores_latest() {
        let store: Arc<dyn EconomyStore> = Arc::new(MemoryStore::new());
        let first = RewardCatalog::new(store.clone());
        first.seed(&CatalogFile::builtin()).await.unwrap();
        first
            .publish(GameType::SpinWheel, CatalogFile::builtin().spin_wheel)
            .await
            .unwrap();

        let restarted = RewardCatalog::new(store);
        assert_eq!(restarted.load().await.unwrap(), 3);
        assert_eq!(restarted.get_version(GameType::SpinWheel).unwrap().version, 2);
        assert_eq!(restarted.get_version(GameType::ScratchCard).unwrap().version, 1);
    }

    #[test]
    fn test_missing_catalog_is_not_found() {
        let err = catalog().get_version(GameType::SpinWheel).unwrap_err();
        assert!(matches!(err, EconomyError::NotFound(_)));
    }
}
