use thiserror::Error;

/// Boxed error used at the storage boundary so backends can surface their own
/// failure types without this crate depending on them.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("not configured")]
    NotConfigured,

    #[error("no such provider: {0}")]
    UnknownProvider(String),

    #[error("no provider with version {0}")]
    UnsupportedProviderVersion(i32),

    #[error("option {option}: {message}")]
    InvalidOption { option: String, message: String },

    #[error("authorization is required by this provider")]
    AuthorizationRequired,

    #[error("this provider does not support writing credentials; read the credential to mint a token")]
    AuthorizationNotRequired,

    #[error("invalid credential name: {0}")]
    InvalidCredentialName(String),

    #[error("cannot use both code and refresh_token")]
    CodeAndRefreshToken,

    #[error("missing code or refresh_token")]
    MissingCodeOrRefreshToken,

    #[error("missing state")]
    MissingState,

    #[error("invalid code")]
    InvalidCode,

    #[error("invalid refresh_token")]
    InvalidRefreshToken,

    #[error("provider rejected request: {code}{}", .description.as_deref().map(|d| format!(" ({d})")).unwrap_or_default())]
    Rejected {
        code: String,
        description: Option<String>,
    },

    #[error("malformed token response: {message}")]
    InvalidResponse { message: String, body: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("storage error: {0}")]
    Storage(#[source] BoxError),
}

impl Error {
    /// True when the error was caused by caller input or a provider-side
    /// rejection of that input, and is safe to show verbatim as a diagnostic.
    /// Everything else is an internal fault.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Error::NotConfigured
                | Error::UnknownProvider(_)
                | Error::UnsupportedProviderVersion(_)
                | Error::InvalidOption { .. }
                | Error::AuthorizationRequired
                | Error::AuthorizationNotRequired
                | Error::InvalidCredentialName(_)
                | Error::CodeAndRefreshToken
                | Error::MissingCodeOrRefreshToken
                | Error::MissingState
                | Error::InvalidCode
                | Error::InvalidRefreshToken
                | Error::Rejected { .. }
        )
    }
}
