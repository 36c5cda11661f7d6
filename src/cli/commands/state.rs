//! cli::commands::state
//!
//! `apply` and `get`: write and read state documents.
//!
//! # Example
//!
//! ```bash
//! gitstate apply envs/dev/terraform.tfstate --file terraform.tfstate
//! gitstate get envs/dev/terraform.tfstate > terraform.tfstate
//! ```

use std::io::Read;
use std::path::Path;

use anyhow::{Context as _, Result};
use tokio_util::sync::CancellationToken;

use super::{open_backend, runtime, state_path};
use crate::core::config::BackendConfig;

/// Run the apply command.
///
/// The body comes from `file`, or stdin when no file is given. The
/// acknowledgement is printed as JSON.
pub fn apply(config: &BackendConfig, path: &str, file: Option<&Path>) -> Result<()> {
    let path = state_path(path)?;
    let body = match file {
        Some(file) => std::fs::read(file)
            .with_context(|| format!("cannot read {}", file.display()))?,
        None => {
            let mut buf = Vec::new();
            std::io::stdin()
                .read_to_end(&mut buf)
                .context("cannot read state from stdin")?;
            buf
        }
    };

    let rt = runtime()?;
    rt.block_on(async {
        let backend = open_backend(config).await?;
        let ack = backend
            .apply(&path, &body, &CancellationToken::new())
            .await
            .with_context(|| format!("apply {} failed", path))?;
        println!("{}", serde_json::to_string_pretty(&ack)?);
        Ok::<(), anyhow::Error>(())
    })
}

/// Run the get command. Prints the stored document.
pub fn get(config: &BackendConfig, path: &str) -> Result<()> {
    let path = state_path(path)?;

    let rt = runtime()?;
    rt.block_on(async {
        let backend = open_backend(config).await?;
        let value = backend
            .get(&path)
            .await
            .with_context(|| format!("get {} failed", path))?;
        println!("{}", serde_json::to_string_pretty(&value)?);
        Ok::<(), anyhow::Error>(())
    })
}
