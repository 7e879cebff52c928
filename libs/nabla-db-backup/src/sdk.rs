//! Single entry point bundling every SDK service

use crate::config::Config;
use crate::service::NablaDbBackup;
use crate::Result;

pub struct MoontowerSdk {
    /// Database backups
    pub db_backup: NablaDbBackup,
}

impl MoontowerSdk {
    pub fn new(config: Config) -> Result<Self> {
        Ok(Self {
            db_backup: NablaDbBackup::new(config)?,
        })
    }

    /// Load `Config` from the environment, validate it and build the SDK.
    pub fn from_env() -> Result<Self> {
        let config = Config::load()?;
        config.validate()?;
        Self::new(config)
    }
}
