//! Error types for the relay.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),
}

/// Configuration-related errors. All of these are fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("OWNER_DID is set to the bot account itself ({did}); use a different account")]
    OwnerIsSelf { did: String },

    #[error("Session has no access to direct messages; use an app password with DM access")]
    NoChatAccess,
}

/// Runtime state persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("Cannot read state file, potentially corrupted: {reason}")]
    Corrupt { reason: String },

    #[error("Failed to serialize state: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the remote messaging/publishing service.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Request {method} failed: {reason}")]
    Request { method: String, reason: String },

    #[error("Request {method} returned {status}: {error} {message}")]
    Status {
        method: String,
        status: u16,
        error: String,
        message: String,
    },

    #[error("Invalid response from {method}: {reason}")]
    InvalidResponse { method: String, reason: String },

    #[error("Authentication failed: {reason}")]
    AuthFailed { reason: String },
}

impl GatewayError {
    /// Whether the service rejected the call because the access token expired.
    pub fn is_expired_token(&self) -> bool {
        matches!(self, Self::Status { error, .. } if error == "ExpiredToken")
    }
}
