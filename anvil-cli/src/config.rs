//! Configuration module
//!
//! Gathers the CLI settings and the environment-driven runner and fleet
//! configuration.

use anvil_fleet::FleetConfig;
use anvil_runner::RunnerConfig;
use anyhow::{Context, Result};
use std::path::PathBuf;

/// CLI configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path of the inventory file
    pub inventory: PathBuf,

    pub runner: RunnerConfig,

    pub fleet: FleetConfig,
}

impl Config {
    /// Reads runner and fleet settings from the environment and validates them
    pub fn load(inventory: PathBuf) -> Result<Self> {
        let runner = RunnerConfig::from_env();
        runner.validate().context("Invalid runner configuration")?;

        let fleet = FleetConfig::from_env();
        fleet.validate().context("Invalid fleet configuration")?;

        Ok(Self {
            inventory,
            runner,
            fleet,
        })
    }
}
