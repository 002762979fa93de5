//! Playzone: a gamified points and rewards economy.
//!
//! Agents earn points from metrics and challenges, spend tokens on spin
//! wheels and scratch cards, and are ranked into tiers each cycle.

pub mod adapters;
pub mod api;
pub mod cli;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod services;

pub use config::AppConfig;
pub use engine::Economy;
pub use error::{EconomyError, Result};
