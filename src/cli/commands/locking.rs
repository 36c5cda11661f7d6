//! cli::commands::locking
//!
//! `lock`, `unlock` and `lock-status`.
//!
//! Lock records print as JSON so scripts can pick up the holder that was
//! generated for them.

use anyhow::{Context as _, Result};

use super::{open_backend, runtime, state_path};
use crate::core::config::BackendConfig;
use crate::core::types::HolderId;

/// Run the lock command.
pub fn lock(config: &BackendConfig, path: &str, holder: Option<&str>) -> Result<()> {
    let path = state_path(path)?;
    let holder = match holder {
        Some(raw) => {
            HolderId::new(raw).with_context(|| format!("invalid holder '{}'", raw))?
        }
        None => HolderId::generate(),
    };

    let rt = runtime()?;
    rt.block_on(async {
        let backend = open_backend(config).await?;
        let record = backend.lock(&path, &holder).await?;
        println!("{}", serde_json::to_string_pretty(&record)?);
        Ok::<(), anyhow::Error>(())
    })
}

/// Run the unlock command.
pub fn unlock(config: &BackendConfig, path: &str, holder: &str) -> Result<()> {
    let path = state_path(path)?;
    let holder = HolderId::new(holder).with_context(|| format!("invalid holder '{}'", holder))?;

    let rt = runtime()?;
    rt.block_on(async {
        let backend = open_backend(config).await?;
        backend.unlock(&path, &holder).await?;
        println!("Unlocked {}", path);
        Ok::<(), anyhow::Error>(())
    })
}

/// Run the lock-status command.
pub fn lock_status(config: &BackendConfig, path: &str) -> Result<()> {
    let path = state_path(path)?;

    let rt = runtime()?;
    rt.block_on(async {
        let backend = open_backend(config).await?;
        match backend.lock_status(&path).await? {
            Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
            None => println!("{} is not locked", path),
        }
        Ok::<(), anyhow::Error>(())
    })
}
