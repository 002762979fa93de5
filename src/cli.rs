use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::Path;
use tabled::{Table, Tabled};

use crate::domain::{GameType, TierAssignment};
use crate::engine::CatalogFile;
use crate::error::{EconomyError, Result};

#[derive(Parser)]
#[command(name = "playzone")]
#[command(author = "Playzone Team")]
#[command(version = "0.1.0")]
#[command(about = "Gamified points and rewards economy engine", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Config directory
    #[arg(short, long, default_value = "config")]
    pub config: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP API with the sweeper and cycle scheduler
    Serve {
        /// Override the configured port
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Apply database migrations
    Migrate,
    /// Inspect catalog files
    #[command(subcommand)]
    Catalog(CatalogCommands),
    /// Tier maintenance
    #[command(subcommand)]
    Tiers(TierCommands),
}

#[derive(Subcommand)]
pub enum CatalogCommands {
    /// Check a catalog file without publishing it
    Validate {
        file: String,
    },
    /// Print a catalog file's segments
    Show {
        file: String,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum TierCommands {
    /// Rank a finished cycle, e.g. 2026-W42 or 2026-09
    Recompute {
        cycle: String,
    },
}

#[derive(Debug, Serialize, Tabled)]
pub struct SegmentRow {
    pub game: String,
    pub index: u32,
    pub label: String,
    pub points: i64,
    pub xp: i64,
    pub weight: u32,
}

#[derive(Debug, Serialize, Tabled)]
pub struct AssignmentRow {
    pub rank: u32,
    pub agent: String,
    pub cycle_xp: i64,
    pub percentile: String,
    pub band: String,
    pub tier: String,
}

impl From<&TierAssignment> for AssignmentRow {
    fn from(a: &TierAssignment) -> Self {
        Self {
            rank: a.rank,
            agent: a.agent_id.clone(),
            cycle_xp: a.cycle_xp,
            percentile: a.percentile.to_string(),
            band: a.transition.as_str().to_string(),
            tier: a.tier_name.clone(),
        }
    }
}

pub fn segment_rows(file: &CatalogFile) -> Vec<SegmentRow> {
    GameType::all()
        .into_iter()
        .flat_map(|game| {
            file.rewards(game).iter().map(move |r| SegmentRow {
                game: game.to_string(),
                index: r.segment_index,
                label: r.label.clone(),
                points: r.point_value,
                xp: r.xp_value,
                weight: r.weight,
            })
        })
        .collect()
}

/// Parse and validate a catalog file, returning the segment count
pub fn validate_catalog<P: AsRef<Path>>(path: P) -> Result<usize> {
    let file = CatalogFile::from_path(path)?;
    file.validate()
        .map_err(|errors| EconomyError::Validation(errors.join("; ")))?;
    Ok(GameType::all()
        .into_iter()
        .map(|game| file.rewards(game).len())
        .sum())
}

pub fn show_catalog<P: AsRef<Path>>(path: P, json: bool) -> Result<()> {
    let file = CatalogFile::from_path(path)?;
    let rows = segment_rows(&file);
    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else if rows.is_empty() {
        println!("(no segments)");
    } else {
        println!("{}", Table::new(&rows));
    }
    Ok(())
}

pub fn print_assignments(assignments: &[TierAssignment]) {
    if assignments.is_empty() {
        println!("(no ranked agents)");
        return;
    }
    let rows: Vec<AssignmentRow> = assignments.iter().map(AssignmentRow::from).collect();
    println!("{}", Table::new(&rows));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_rows_cover_both_games() {
        let rows = segment_rows(&CatalogFile::builtin());
        assert_eq!(rows.len(), 13);
        assert_eq!(rows[0].game, "spin-wheel");
        assert_eq!(rows[8].game, "scratch-card");
    }

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::parse_from(["playzone", "catalog", "show", "config/catalog.toml", "--json"]);
        assert!(matches!(
            cli.command,
            Some(Commands::Catalog(CatalogCommands::Show { json: true, .. }))
        ));

        let cli = Cli::parse_from(["playzone", "tiers", "recompute", "2026-W42"]);
        match cli.command {
            Some(Commands::Tiers(TierCommands::Recompute { cycle })) => {
                assert_eq!(cycle, "2026-W42")
            }
            _ => panic!("expected tiers recompute"),
        }
    }

    #[test]
    fn test_validate_missing_file_is_io_error() {
        assert!(matches!(
            validate_catalog("does/not/exist.toml"),
            Err(EconomyError::Io(_))
        ));
    }
}
