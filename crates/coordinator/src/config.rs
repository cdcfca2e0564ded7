// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use std::path::Path;

use anyhow::{bail, Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const ENV_PREFIX: &str = "EG_";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoordinatorConfig {
    /// Size of the pool that validates ballot batches
    pub worker_threads: usize,
    /// Upper bound for the discrete log search when decoding counts
    pub max_tally: u64,
    /// Reject a resubmitted ballot id even when the ballot is identical
    pub reject_duplicate_ballots: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            worker_threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            max_tally: 1_000_000,
            reject_duplicate_ballots: true,
        }
    }
}

impl CoordinatorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.worker_threads == 0 {
            bail!("worker_threads must be at least 1");
        }
        if self.max_tally == 0 {
            bail!("max_tally must be at least 1");
        }
        Ok(())
    }
}

/// Defaults, then the YAML file if one is given, then `EG_*` environment variables.
pub fn load_config(path: Option<&Path>) -> Result<CoordinatorConfig> {
    let mut figment = Figment::from(Serialized::defaults(CoordinatorConfig::default()));
    if let Some(path) = path {
        let yaml = std::fs::read_to_string(path)
            .with_context(|| format!("Could not read configuration file {}", path.display()))?;
        figment = figment.merge(Yaml::string(&yaml));
    }
    let config: CoordinatorConfig = figment
        .merge(Env::prefixed(ENV_PREFIX))
        .extract()
        .context("Could not parse configuration")?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn defaults_without_file() {
        Jail::expect_with(|_| {
            let config = load_config(None).map_err(|e| e.to_string())?;
            assert_eq!(config.max_tally, 1_000_000);
            assert!(config.reject_duplicate_ballots);
            assert!(config.worker_threads >= 1);
            Ok(())
        });
    }

    #[test]
    fn env_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "coordinator.yaml",
                r#"
worker_threads: 2
max_tally: 500
"#,
            )?;
            jail.set_env("EG_MAX_TALLY", "750");
            let config =
                load_config(Some(Path::new("coordinator.yaml"))).map_err(|e| e.to_string())?;
            assert_eq!(config.worker_threads, 2);
            assert_eq!(config.max_tally, 750);
            assert!(config.reject_duplicate_ballots);
            Ok(())
        });
    }

    #[test]
    fn unknown_keys_and_zero_bounds_are_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file("typo.yaml", "max_talley: 10\n")?;
            assert!(load_config(Some(Path::new("typo.yaml"))).is_err());

            jail.create_file("zero.yaml", "worker_threads: 0\n")?;
            assert!(load_config(Some(Path::new("zero.yaml"))).is_err());
            Ok(())
        });
    }

    #[test]
    fn missing_file_is_an_io_not_found() -> Result<()> {
        let Err(err) = load_config(Some(Path::new("/nope/coordinator.yaml"))) else {
            bail!("error expected");
        };
        let Some(e) = err.downcast_ref::<std::io::Error>() else {
            bail!("io error expected");
        };
        assert_eq!(e.kind(), std::io::ErrorKind::NotFound);
        Ok(())
    }
}
