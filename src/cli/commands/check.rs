//! check command - Validate configuration and report what was found
//!
//! Opens the backend exactly as the other commands do, so every startup
//! check runs: key material is parsed, the repository is opened, the remote
//! is ensured and the lock store is connected.

use anyhow::Result;

use super::{open_backend, runtime};
use crate::core::config::BackendConfig;
use crate::git::RemoteSetup;

/// Run the check command.
pub fn check(config: &BackendConfig) -> Result<()> {
    let rt = runtime()?;
    rt.block_on(check_async(config))
}

async fn check_async(config: &BackendConfig) -> Result<()> {
    let backend = open_backend(config).await?;

    println!("State root: {}", backend.root().display());
    println!("Encryption: {}", backend.codec().name());
    println!("Lock store: {}", backend.locks().store_name());

    match backend.durability() {
        Some(durability) => {
            let remote = durability.config();
            let setup = match durability.remote_setup() {
                RemoteSetup::Created => "created".to_string(),
                RemoteSetup::Unchanged => "ok".to_string(),
                RemoteSetup::Replaced { previous } => format!("replaced {}", previous),
            };
            println!(
                "Git remote: {} {} ({})",
                remote.remote_name, remote.url, setup
            );
            println!("Git branch: {}", remote.branch);
            println!("Auto push:  {}", if remote.auto_push { "yes" } else { "no" });
            println!(
                "Push tries: {} (base delay {}s)",
                durability.policy().max_attempts(),
                durability.policy().base_delay().as_secs()
            );
            match durability.head().await? {
                Some(head) => println!("Git HEAD:   {}", head.short(7)),
                None => println!("Git HEAD:   (no commits yet)"),
            }
        }
        None => println!("Git remote: disabled"),
    }

    println!("OK");
    Ok(())
}
