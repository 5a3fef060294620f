use thiserror::Error;

/// Failures raised by the infrastructure layer: the asset roots on
/// disk, the Postgres pool, and process setup.
#[derive(Debug, Error)]
pub enum InfraError {
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("database unavailable: {0}")]
    Database(String),
    #[error("asset root `{path}` unusable: {reason}")]
    AssetRoot { path: String, reason: String },
    #[error("telemetry setup failed: {0}")]
    Telemetry(String),
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl InfraError {
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database(message.into())
    }

    pub fn asset_root(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::AssetRoot {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn telemetry(message: impl Into<String>) -> Self {
        Self::Telemetry(message.into())
    }
}
