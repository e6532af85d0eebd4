use std::path::Path;

use tokio::fs::{self, OpenOptions};
use tracing::debug;

use super::{Rotated, next_rotation_target};
use crate::error::RotateError;

/// Copy the live file to its next suffix, then truncate it in place.
///
/// Writers keep their descriptor. Bytes appended between the copy and the
/// truncate are lost.
pub(crate) async fn rotate_by_copy_truncate(path: &Path) -> Result<Rotated, RotateError> {
    let target = next_rotation_target(path).await?;

    let bytes = match fs::copy(path, &target).await {
        Ok(bytes) => bytes,
        Err(e) => {
            if let Err(cleanup) = fs::remove_file(&target).await {
                debug!(target = %target.display(), error = %cleanup, "No partial copy to remove");
            }
            return Err(RotateError::io("copy", path)(e));
        }
    };

    let file = OpenOptions::new()
        .write(true)
        .open(path)
        .await
        .map_err(RotateError::io("open", path))?;
    file.set_len(0)
        .await
        .map_err(RotateError::io("truncate", path))?;

    Ok(Rotated { target, bytes })
}
