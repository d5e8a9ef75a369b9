use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Infra(#[from] kl_infra::Error),

    #[error("state file {}: {source}", path.display())]
    StateIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("state file {}: {source}", path.display())]
    StateFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("interrupted")]
    Interrupted,
}

impl CliError {
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Infra(kl_infra::Error::Config(_)))
    }
}
