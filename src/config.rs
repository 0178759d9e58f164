//! Run configuration.
//!
//! Everything that tunes a run (which engine, how long it may search, how
//! chatty validation is) lives here and is passed explicitly into the
//! components that need it. Load from TOML or YAML; every field has a default.
//!
//! ```
//! use linebalance::config::{Config, EngineKind};
//!
//! let config = Config::from_toml_str(r#"
//!     log_level = "debug"
//!
//!     [solver]
//!     engine = "cbc"
//!     time_limit_seconds = 30
//! "#).unwrap();
//!
//! assert_eq!(config.solver.engine, EngineKind::Cbc);
//! assert_eq!(config.solver.time_limit_seconds, Some(30.0));
//! assert!(config.validation.check_colocation);
//! ```

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default `tracing` filter directive used by the binary when `RUST_LOG` is unset.
    pub log_level: String,
    pub solver: SolverSettings,
    pub validation: ValidationSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            solver: SolverSettings::default(),
            validation: ValidationSettings::default(),
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml_str(&contents),
            _ => Self::from_toml_str(&contents),
        }
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn from_yaml_str(s: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(s)?)
    }
}

/// Engine selection and tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverSettings {
    pub engine: EngineKind,
    pub time_limit_seconds: Option<f64>,
    /// Relative optimality gap at which the engine may stop.
    pub mip_gap: Option<f64>,
    pub heuristics: bool,
    pub focus: Focus,
    pub threads: Option<u32>,
    /// Let the engine print its own log.
    pub engine_log: bool,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            engine: EngineKind::default(),
            time_limit_seconds: None,
            mip_gap: None,
            heuristics: true,
            focus: Focus::Balanced,
            threads: None,
            engine_log: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    #[default]
    Cbc,
    Highs,
    Scip,
    Microlp,
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EngineKind::Cbc => "cbc",
            EngineKind::Highs => "highs",
            EngineKind::Scip => "scip",
            EngineKind::Microlp => "microlp",
        };
        f.write_str(name)
    }
}

/// What the engine should spend its effort on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Focus {
    #[default]
    Balanced,
    Feasibility,
    Optimality,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationSettings {
    /// Log every passed check, not only failures.
    pub verbose: bool,
    /// Run the co-location analysis before formulating.
    pub check_colocation: bool,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            verbose: false,
            check_colocation: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_gives_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.solver.engine, EngineKind::Cbc);
        assert_eq!(config.solver.focus, Focus::Balanced);
        assert!(config.solver.heuristics);
        assert!(!config.validation.verbose);
    }

    #[test]
    fn yaml_overrides() {
        let config = Config::from_yaml_str(
            "solver:\n  engine: highs\n  mip_gap: 0.01\n  focus: feasibility\nvalidation:\n  verbose: true\n",
        )
        .unwrap();
        assert_eq!(config.solver.engine, EngineKind::Highs);
        assert_eq!(config.solver.mip_gap, Some(0.01));
        assert_eq!(config.solver.focus, Focus::Feasibility);
        assert!(config.validation.verbose);
        assert!(config.validation.check_colocation);
    }

    #[test]
    fn rejects_unknown_engine() {
        assert!(Config::from_toml_str("[solver]\nengine = \"gurobi\"\n").is_err());
    }
}
