//! keygen command - Generate an age identity
//!
//! The key file goes to stdout (or `--output`), the public key to stderr,
//! matching `age-keygen`. Put the public key in `encryption.recipient` and
//! the file path in `encryption.identity_file`.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use anyhow::{bail, Context as _, Result};

use crate::crypto::generate_keypair;

/// Run the keygen command.
pub fn keygen(output: Option<&Path>) -> Result<()> {
    let key = generate_keypair();

    match output {
        Some(path) => {
            if path.exists() {
                bail!("{} already exists; refusing to overwrite", path.display());
            }
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .with_context(|| format!("cannot create {}", parent.display()))?;
            }
            write_private(path, key.key_file.as_bytes())?;
            eprintln!("Public key: {}", key.recipient);
            eprintln!("Identity written to {}", path.display());
        }
        None => {
            print!("{}", key.key_file);
            eprintln!("Public key: {}", key.recipient);
        }
    }
    Ok(())
}

fn write_private(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options
        .open(path)
        .with_context(|| format!("cannot create {}", path.display()))?;
    file.write_all(bytes)
        .with_context(|| format!("cannot write {}", path.display()))?;
    Ok(())
}
