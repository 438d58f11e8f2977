//! Executable-permission fix-up before first launch

use std::path::Path;

use sidecar_core::prelude::*;

/// Mark a file executable with `chmod +x` (no-op outside Unix).
///
/// Runs synchronously to completion before returning.
pub async fn make_executable(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        debug!("chmod +x {}", path.display());
        let status = tokio::process::Command::new("chmod")
            .arg("+x")
            .arg(path)
            .status()
            .await
            .map_err(|e| Error::process(format!("failed to run chmod: {}", e)))?;

        if !status.success() {
            return Err(Error::process(format!(
                "chmod +x {} exited with {:?}",
                path.display(),
                status.code()
            )));
        }
        Ok(())
    }

    #[cfg(not(unix))]
    {
        let _ = path;
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    #[tokio::test]
    async fn test_make_executable_sets_mode() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("tool");
        std::fs::write(&file, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&file, std::fs::Permissions::from_mode(0o644)).unwrap();

        make_executable(&file).await.unwrap();

        let mode = std::fs::metadata(&file).unwrap().permissions().mode();
        assert_ne!(mode & 0o111, 0);
    }

    #[tokio::test]
    async fn test_make_executable_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = make_executable(&dir.path().join("missing")).await;
        assert!(matches!(result, Err(Error::Process { .. })));
    }
}
