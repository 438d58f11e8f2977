//! Native installer execution

use std::path::PathBuf;
use std::process::Stdio;

use crate::launch::LaunchSpec;
use sidecar_core::prelude::*;
use sidecar_core::StartWindowState;

/// An extracted installer to run unattended
#[derive(Debug, Clone)]
pub struct InstallerCommand {
    pub path: PathBuf,
    /// Flag requesting a silent/unattended install (e.g. `/S`)
    pub silent_flag: Option<String>,
    pub elevated: bool,
}

impl InstallerCommand {
    fn launch_spec(&self) -> LaunchSpec {
        LaunchSpec::new(&self.path)
            .args(self.silent_flag.iter().cloned().collect())
            .run_as_admin(self.elevated)
            .window_state(StartWindowState::Hidden)
    }

    /// Run the installer and wait for it to finish.
    ///
    /// Returns the exit code (`None` when terminated by a signal). A failure
    /// to start at all is an error.
    pub async fn run(&self) -> Result<Option<i32>> {
        let spec = self.launch_spec();
        info!("Running installer: {}", spec.display());

        let status = spec
            .command()
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| Error::ProcessSpawn {
                reason: format!("installer {}: {}", self.path.display(), e),
            })?;

        info!("Installer finished with {:?}", status.code());
        Ok(status.code())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::test_utils::write_script;

    #[tokio::test]
    async fn test_installer_exit_codes() {
        let dir = tempfile::tempdir().unwrap();
        let ok = write_script(dir.path(), "ok.sh", "[ \"$1\" = \"/S\" ] || exit 9\nexit 0");
        let failing = write_script(dir.path(), "fail.sh", "exit 1");

        let installer = InstallerCommand {
            path: ok,
            silent_flag: Some("/S".into()),
            elevated: false,
        };
        assert_eq!(installer.run().await.unwrap(), Some(0));

        let installer = InstallerCommand {
            path: failing,
            silent_flag: None,
            elevated: false,
        };
        assert_eq!(installer.run().await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_missing_installer_is_spawn_error() {
        let installer = InstallerCommand {
            path: PathBuf::from("/no/such/setup"),
            silent_flag: None,
            elevated: false,
        };
        assert!(matches!(
            installer.run().await,
            Err(Error::ProcessSpawn { .. })
        ));
    }
}
