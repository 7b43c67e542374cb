//! JSON snapshot persistence for alert configuration.
//!
//! Rules and notification settings are dumped field-for-field on
//! shutdown and reloaded on startup; enum values serialize as their
//! lowercase string names.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::info;

use crate::alerts::AlertRule;
use crate::config::NotificationSettings;
use crate::error::MonitorError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfigSnapshot {
    pub saved_at: DateTime<Utc>,
    pub rules: Vec<AlertRule>,
    pub notifications: NotificationSettings,
}

pub async fn save_snapshot(
    path: &Path,
    snapshot: &AlertConfigSnapshot,
) -> Result<(), MonitorError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| MonitorError::Io(format!("Failed to create snapshot directory: {e}")))?;
    }
    let raw = serde_json::to_vec_pretty(snapshot)
        .map_err(|e| MonitorError::Serialization(e.to_string()))?;
    fs::write(path, raw)
        .await
        .map_err(|e| MonitorError::Io(format!("Failed to write snapshot: {e}")))?;
    info!(path = %path.display(), "Alert configuration snapshot persisted");
    Ok(())
}

/// Load a previously persisted snapshot. A missing file is not an
/// error; it simply means first startup.
pub async fn load_snapshot(path: &Path) -> Result<Option<AlertConfigSnapshot>, MonitorError> {
    match fs::read_to_string(path).await {
        Ok(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| MonitorError::Serialization(e.to_string())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(MonitorError::Io(format!("Failed to read snapshot: {e}"))),
    }
}
