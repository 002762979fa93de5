use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

use crate::domain::{Currency, GameType, PeriodKind};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub caps: CapsConfig,
    #[serde(default)]
    pub games: GamesConfig,
    #[serde(default)]
    pub tiers: TierConfig,
    #[serde(default)]
    pub claims: ClaimConfig,
    #[serde(default)]
    pub sweeper: SweeperConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub challenges: Vec<ChallengeConfig>,
    /// Fixed PRNG seed; draws are reproducible when set
    #[serde(default)]
    pub rng_seed: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Shared secret for `/admin` routes. Unset leaves them open.
    #[serde(default)]
    pub admin_token: Option<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            admin_token: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL. Without one the in-memory store is used.
    #[serde(default)]
    pub url: Option<String>,
    /// Maximum connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
    /// Directory for daily-rolling log files
    #[serde(default)]
    pub dir: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            dir: None,
        }
    }
}

/// One earning cap. A disabled cap always allows and tracks nothing.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct CapLimit {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub cap: i64,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct CapsConfig {
    pub daily: CapLimit,
    pub weekly: CapLimit,
    pub monthly: CapLimit,
}

impl Default for CapsConfig {
    fn default() -> Self {
        Self {
            daily: CapLimit {
                enabled: true,
                cap: 500,
            },
            weekly: CapLimit {
                enabled: true,
                cap: 2500,
            },
            monthly: CapLimit {
                enabled: false,
                cap: 10_000,
            },
        }
    }
}

impl CapsConfig {
    pub fn limit(&self, period: PeriodKind) -> CapLimit {
        match period {
            PeriodKind::Daily => self.daily,
            PeriodKind::Weekly => self.weekly,
            PeriodKind::Monthly => self.monthly,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GameConfig {
    /// Currency the entry fee is paid in
    pub entry_currency: Currency,
    /// Entry fee; 0 makes the game free
    pub entry_fee: i64,
    /// How long a drawn outcome stays claimable
    #[serde(default = "default_claim_ttl")]
    pub claim_ttl_secs: u64,
}

fn default_claim_ttl() -> u64 {
    24 * 60 * 60
}

#[derive(Debug, Clone, Deserialize)]
pub struct GamesConfig {
    pub spin_wheel: GameConfig,
    pub scratch_card: GameConfig,
}

impl Default for GamesConfig {
    fn default() -> Self {
        Self {
            spin_wheel: GameConfig {
                entry_currency: Currency::Tokens,
                entry_fee: 100,
                claim_ttl_secs: default_claim_ttl(),
            },
            scratch_card: GameConfig {
                entry_currency: Currency::Tokens,
                entry_fee: 50,
                claim_ttl_secs: default_claim_ttl(),
            },
        }
    }
}

impl GamesConfig {
    pub fn game(&self, game_type: GameType) -> &GameConfig {
        match game_type {
            GameType::SpinWheel => &self.spin_wheel,
            GameType::ScratchCard => &self.scratch_card,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TierConfig {
    /// Points that make one XP
    #[serde(default = "default_points_per_xp")]
    pub points_per_xp: i64,
    /// Top share of the ranked population that is promoted
    #[serde(default = "default_promoted_pct")]
    pub promoted_pct: u32,
    /// Share below the promoted band that is safe
    #[serde(default = "default_safe_pct")]
    pub safe_pct: u32,
    /// Tier names, lowest first
    #[serde(default = "default_ladder")]
    pub ladder: Vec<String>,
    #[serde(default = "default_xp_per_level")]
    pub xp_per_level: i64,
    /// Cycle length used for promotion/demotion
    #[serde(default = "default_ranking_cycle")]
    pub ranking_cycle: PeriodKind,
    /// Period after which the displayed period XP restarts at zero
    #[serde(default = "default_xp_reset_period")]
    pub xp_reset_period: PeriodKind,
}

fn default_points_per_xp() -> i64 {
    10
}

fn default_promoted_pct() -> u32 {
    20
}

fn default_safe_pct() -> u32 {
    25
}

fn default_ladder() -> Vec<String> {
    ["Bronze", "Silver", "Gold", "Platinum", "Diamond"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_xp_per_level() -> i64 {
    100
}

fn default_ranking_cycle() -> PeriodKind {
    PeriodKind::Weekly
}

fn default_xp_reset_period() -> PeriodKind {
    PeriodKind::Monthly
}

impl Default for TierConfig {
    fn default() -> Self {
        Self {
            points_per_xp: default_points_per_xp(),
            promoted_pct: default_promoted_pct(),
            safe_pct: default_safe_pct(),
            ladder: default_ladder(),
            xp_per_level: default_xp_per_level(),
            ranking_cycle: default_ranking_cycle(),
            xp_reset_period: default_xp_reset_period(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClaimConfig {
    /// Attempts for a claim that hits contention
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// How long to wait for another request on the same agent
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    25
}

fn default_lock_timeout_ms() -> u64 {
    2000
}

impl Default for ClaimConfig {
    fn default() -> Self {
        Self {
            retry_attempts: default_retry_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SweeperConfig {
    /// Interval between expiry sweeps
    #[serde(default = "default_sweep_interval")]
    pub interval_secs: u64,
    /// Maximum outcomes expired per sweep
    #[serde(default = "default_sweep_batch")]
    pub batch_size: usize,
    /// Interval between leaderboard rebuilds
    #[serde(default = "default_leaderboard_refresh")]
    pub leaderboard_refresh_secs: u64,
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_sweep_batch() -> usize {
    500
}

fn default_leaderboard_refresh() -> u64 {
    30
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_sweep_interval(),
            batch_size: default_sweep_batch(),
            leaderboard_refresh_secs: default_leaderboard_refresh(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogConfig {
    /// TOML catalog file published at startup
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChallengeConfig {
    pub id: String,
    pub title: String,
    pub bonus_points: i64,
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with default values
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .set_default("database.max_connections", 5)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("PLAYZONE_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (PLAYZONE__CAPS__DAILY__CAP, etc.)
            .add_source(
                Environment::with_prefix("PLAYZONE")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        for period in PeriodKind::all() {
            let limit = self.caps.limit(period);
            if limit.enabled && limit.cap <= 0 {
                errors.push(format!("{} cap must be positive when enabled", period));
            }
        }

        for game_type in GameType::all() {
            let game = self.games.game(game_type);
            if game.entry_fee < 0 {
                errors.push(format!("{} entry_fee must not be negative", game_type));
            }
            if game.entry_currency == Currency::Xp {
                errors.push(format!("{} entry fee cannot be paid in xp", game_type));
            }
            if game.claim_ttl_secs == 0 {
                errors.push(format!("{} claim_ttl_secs must be positive", game_type));
            }
        }

        if self.tiers.points_per_xp <= 0 {
            errors.push("points_per_xp must be positive".to_string());
        }
        if self.tiers.promoted_pct + self.tiers.safe_pct > 100 {
            errors.push("promoted_pct + safe_pct must not exceed 100".to_string());
        }
        if self.tiers.ladder.is_empty() {
            errors.push("tier ladder must name at least one tier".to_string());
        }
        if self.tiers.xp_per_level <= 0 {
            errors.push("xp_per_level must be positive".to_string());
        }
        if self.tiers.ranking_cycle == PeriodKind::Daily {
            errors.push("ranking_cycle must be weekly or monthly".to_string());
        }

        if self.claims.retry_attempts == 0 {
            errors.push("claims.retry_attempts must be at least 1".to_string());
        }
        if self.sweeper.interval_secs == 0 {
            errors.push("sweeper.interval_secs must be positive".to_string());
        }

        let mut ids = HashSet::new();
        for challenge in &self.challenges {
            if !ids.insert(challenge.id.as_str()) {
                errors.push(format!("duplicate challenge id {}", challenge.id));
            }
            if challenge.bonus_points <= 0 {
                errors.push(format!("challenge {} bonus must be positive", challenge.id));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tiers.points_per_xp, 10);
        assert_eq!(config.tiers.promoted_pct, 20);
        assert_eq!(config.tiers.safe_pct, 25);
        assert_eq!(config.games.spin_wheel.entry_fee, 100);
    }

    #[test]
    fn test_validate_reports_every_problem() {
        let mut config = AppConfig::default();
        config.tiers.promoted_pct = 80;
        config.tiers.safe_pct = 30;
        config.tiers.points_per_xp = 0;
        config.caps.daily.cap = 0;

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn test_disabled_cap_may_be_zero() {
        let mut config = AppConfig::default();
        config.caps.monthly = CapLimit {
            enabled: false,
            cap: 0,
        };
        assert!(config.validate().is_ok());
    }
}
