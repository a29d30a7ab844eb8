//! @acp:module "Errors"
//! @acp:summary "Crate-wide error type for Azure calls and tool dispatch"
//! @acp:domain azure
//! @acp:layer utility

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("AZURE_SUBSCRIPTION_ID is not set")]
    MissingSubscription,

    #[error("Credential unavailable: {0}")]
    CredentialUnavailable(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("No credential in the chain could provide a token:\n{0}")]
    CredentialChainExhausted(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Azure API returned {status} {code}: {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid invocation envelope: {0}")]
    InvalidEnvelope(String),

    #[error("Malformed resource type: '{0}'")]
    MalformedResourceType(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Invalid endpoint URL: {0}")]
    InvalidEndpoint(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
