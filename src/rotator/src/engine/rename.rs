use std::path::Path;

use tokio::fs::{self, OpenOptions};

use super::{Rotated, next_rotation_target};
use crate::error::RotateError;

/// Move the live file to its next suffix and put an empty file with the same
/// permissions in its place.
pub(crate) async fn rotate_by_rename(path: &Path) -> Result<Rotated, RotateError> {
    let target = next_rotation_target(path).await?;
    let metadata = fs::metadata(path)
        .await
        .map_err(RotateError::io("stat", path))?;

    fs::rename(path, &target)
        .await
        .map_err(RotateError::io("rename", path))?;

    // No truncate: a writer that already reopened the path keeps its data.
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(RotateError::io("recreate", path))?;
    fs::set_permissions(path, metadata.permissions())
        .await
        .map_err(RotateError::io("chmod", path))?;

    Ok(Rotated {
        target,
        bytes: metadata.len(),
    })
}
