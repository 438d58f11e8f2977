//! Launch descriptions and OS-specific command construction

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;

use sidecar_core::prelude::*;
use sidecar_core::StartWindowState;

/// Everything needed to start one child process
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Defaults to the program's directory when unset
    pub working_dir: Option<PathBuf>,
    pub run_as_admin: bool,
    pub window_state: StartWindowState,
}

impl LaunchSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            run_as_admin: false,
            window_state: StartWindowState::Normal,
        }
    }

    pub fn args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn run_as_admin(mut self, elevated: bool) -> Self {
        self.run_as_admin = elevated;
        self
    }

    pub fn window_state(mut self, state: StartWindowState) -> Self {
        self.window_state = state;
        self
    }

    /// Working directory the process will start in
    pub fn effective_working_dir(&self) -> Option<PathBuf> {
        self.working_dir.clone().or_else(|| {
            self.program
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf)
        })
    }

    /// Program and argv actually handed to the OS, after elevation wrapping
    pub fn invocation(&self) -> (PathBuf, Vec<String>) {
        if !self.run_as_admin {
            return (self.program.clone(), self.args.clone());
        }
        elevated_invocation(self)
    }

    /// Build the (unspawned) command with stdio left to the caller
    pub fn command(&self) -> Command {
        let (program, args) = self.invocation();
        let mut cmd = Command::new(program);
        cmd.args(args).stdin(Stdio::null());

        if let Some(dir) = self.effective_working_dir() {
            cmd.current_dir(dir);
        }

        #[cfg(windows)]
        if self.window_state == StartWindowState::Hidden && !self.run_as_admin {
            const CREATE_NO_WINDOW: u32 = 0x0800_0000;
            cmd.creation_flags(CREATE_NO_WINDOW);
        }

        cmd
    }

    /// One-line rendering for logs
    pub fn display(&self) -> String {
        let (program, args) = self.invocation();
        if args.is_empty() {
            program.display().to_string()
        } else {
            format!("{} {}", program.display(), args.join(" "))
        }
    }
}

#[cfg(not(windows))]
fn elevated_invocation(spec: &LaunchSpec) -> (PathBuf, Vec<String>) {
    let mut args = vec![spec.program.display().to_string()];
    args.extend(spec.args.iter().cloned());
    (PathBuf::from("pkexec"), args)
}

#[cfg(windows)]
fn elevated_invocation(spec: &LaunchSpec) -> (PathBuf, Vec<String>) {
    (
        PathBuf::from("powershell"),
        vec![
            "-NoProfile".to_string(),
            "-NonInteractive".to_string(),
            "-Command".to_string(),
            elevated_script(spec),
        ],
    )
}

/// `Start-Process -Verb RunAs` wrapper that exits with the child's code.
///
/// Without `-PassThru` and an explicit `exit`, PowerShell reports 0 no
/// matter how the elevated process ended.
#[cfg(any(windows, test))]
fn elevated_script(spec: &LaunchSpec) -> String {
    let style = match spec.window_state {
        StartWindowState::Normal => "Normal",
        StartWindowState::Minimized => "Minimized",
        StartWindowState::Maximized => "Maximized",
        StartWindowState::Hidden => "Hidden",
    };
    let mut start = format!(
        "Start-Process -FilePath {} -Verb RunAs -PassThru -Wait -WindowStyle {}",
        ps_quote(&spec.program.display().to_string()),
        style
    );
    if !spec.args.is_empty() {
        let list: Vec<String> = spec.args.iter().map(|a| ps_quote(a)).collect();
        start.push_str(&format!(" -ArgumentList {}", list.join(",")));
    }
    if let Some(dir) = spec.effective_working_dir() {
        start.push_str(&format!(
            " -WorkingDirectory {}",
            ps_quote(&dir.display().to_string())
        ));
    }
    format!("$p = {}; exit $p.ExitCode", start)
}

#[cfg(any(windows, test))]
fn ps_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Whether a launch target is a network resource rather than a local path.
///
/// Single-letter schemes are Windows drive letters, not URIs.
pub fn is_uri(target: &str) -> bool {
    match url::Url::parse(target) {
        Ok(parsed) => parsed.scheme().len() > 1 && parsed.scheme() != "file",
        Err(_) => false,
    }
}

/// Hand a URI or document to the OS default handler (fire-and-forget).
pub fn open_target(target: &str) -> Result<()> {
    info!("Opening {}", target);
    open::that_detached(target).map_err(|e| Error::ProcessSpawn {
        reason: format!("failed to open {}: {}", target, e),
    })
}

/// Resolve a bare command name through `PATH`; paths are returned as-is.
pub fn resolve_program(program: &Path) -> Option<PathBuf> {
    if program.exists() {
        return Some(program.to_path_buf());
    }
    if program.components().count() == 1 {
        return which::which(program).ok();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_working_dir_defaults_to_program_dir() {
        let spec = LaunchSpec::new("/opt/tools/bridge");
        assert_eq!(
            spec.effective_working_dir(),
            Some(PathBuf::from("/opt/tools"))
        );

        let spec = LaunchSpec::new("bridge");
        assert_eq!(spec.effective_working_dir(), None);

        let spec = LaunchSpec::new("/opt/tools/bridge").working_dir("/tmp");
        assert_eq!(spec.effective_working_dir(), Some(PathBuf::from("/tmp")));
    }

    #[test]
    fn test_plain_invocation() {
        let spec = LaunchSpec::new("/bin/tool").args(vec!["-a".into(), "b c".into()]);
        let (program, args) = spec.invocation();
        assert_eq!(program, PathBuf::from("/bin/tool"));
        assert_eq!(args, vec!["-a", "b c"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_elevated_invocation_uses_pkexec() {
        let spec = LaunchSpec::new("/bin/tool")
            .args(vec!["-a".into()])
            .run_as_admin(true);
        let (program, args) = spec.invocation();
        assert_eq!(program, PathBuf::from("pkexec"));
        assert_eq!(args, vec!["/bin/tool", "-a"]);
    }

    #[test]
    fn test_elevated_script_propagates_exit_code() {
        let spec = LaunchSpec::new("/opt/setup/installer.exe")
            .args(vec!["/S".to_string()])
            .run_as_admin(true)
            .window_state(StartWindowState::Hidden);

        let script = elevated_script(&spec);
        assert!(script.starts_with("$p = Start-Process -FilePath "));
        assert!(script.contains("-Verb RunAs -PassThru -Wait -WindowStyle Hidden"));
        assert!(script.contains("-ArgumentList '/S'"));
        assert!(script.ends_with("; exit $p.ExitCode"));
    }

    #[test]
    fn test_is_uri() {
        assert!(is_uri("https://example.com/dash"));
        assert!(is_uri("steam://run/123"));
        assert!(!is_uri("file:///tmp/a.txt"));
        assert!(!is_uri("C:\\Tools\\app.exe"));
        assert!(!is_uri("/usr/bin/app"));
        assert!(!is_uri("relative/app"));
    }

    #[test]
    fn test_resolve_program_missing_path() {
        assert_eq!(
            resolve_program(Path::new("/definitely/not/here/tool")),
            None
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_program_via_path() {
        assert!(resolve_program(Path::new("sh")).is_some());
    }
}
