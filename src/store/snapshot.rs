//! JSON snapshot files backing the in-process stores.
//!
//! Dev-grade durability: the whole store is read at boot and rewritten
//! (atomic temp + rename) after mutations. Failures to persist are logged
//! and never fail the request that triggered them.

use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub fn load<T: DeserializeOwned + Default>(path: &Path) -> T {
    match std::fs::read(path) {
        Ok(bytes) => match serde_json::from_slice(&bytes) {
            Ok(value) => {
                info!(path = %path.display(), "Loaded store snapshot");
                value
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Snapshot unreadable, starting empty");
                T::default()
            }
        },
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => T::default(),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "Snapshot unreadable, starting empty");
            T::default()
        }
    }
}

/// Serialize on the caller's task, write on the blocking pool.
pub fn save<T: Serialize>(path: &PathBuf, value: &T) {
    let bytes = match serde_json::to_vec(value) {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "Snapshot serialization failed");
            return;
        }
    };
    let path = path.clone();
    tokio::task::spawn_blocking(move || {
        let tmp = path.with_extension("tmp");
        let result = std::fs::write(&tmp, &bytes).and_then(|()| std::fs::rename(&tmp, &path));
        if let Err(err) = result {
            warn!(path = %path.display(), error = %err, "Snapshot write failed");
        }
    });
}
