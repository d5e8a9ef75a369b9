// ── Command results ─────────────────────────────────────────────────

/// Captured result of one external command.
///
/// The runner never decides whether a non-zero exit is a failure; that is
/// up to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Rendered command line, for logs and error messages.
    pub command: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

// ── Containers ──────────────────────────────────────────────────────

/// Arguments for `lxc init`.
#[derive(Debug, Clone, Default)]
pub struct InitRequest {
    pub image: String,
    pub name: String,
    pub profile: Option<String>,
    pub config: Option<String>,
}

impl InitRequest {
    pub(crate) fn args(&self) -> Vec<String> {
        let mut args = vec!["init".to_string(), self.image.clone(), self.name.clone()];
        if let Some(profile) = &self.profile {
            args.push("-p".into());
            args.push(profile.clone());
        }
        if let Some(config) = &self.config {
            args.push("-c".into());
            args.push(config.clone());
        }
        args
    }
}
