use serde::{Deserialize, Serialize};

use crate::{AuthCodeUrlBuilder, Error, ExchangeBuilder, TokenBuilder};

/// How client credentials are presented to the token endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthStyle {
    /// Try the Authorization header first; fall back to body parameters if
    /// the provider rejects the request.
    #[default]
    Auto,
    InHeader,
    InParams,
}

impl AuthStyle {
    /// Parses the configuration-option spelling (`in_header` / `in_params`).
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "in_header" => Some(AuthStyle::InHeader),
            "in_params" => Some(AuthStyle::InParams),
            _ => None,
        }
    }
}

/// One OAuth 2.0 endpoint pair. `auth_url` is empty for providers that only
/// support the client-credentials grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub auth_url: String,
    pub token_url: String,
    pub auth_style: AuthStyle,
}

impl Endpoint {
    pub fn new(auth_url: impl Into<String>, token_url: impl Into<String>) -> Self {
        Self {
            auth_url: auth_url.into(),
            token_url: token_url.into(),
            auth_style: AuthStyle::Auto,
        }
    }

    pub fn with_auth_style(mut self, auth_style: AuthStyle) -> Self {
        self.auth_style = auth_style;
        self
    }
}

/// A resolved provider instance. Which builders are legal depends on the
/// capability flag: 3-legged providers hand out authorization URLs and
/// code/refresh-token exchanges, 2-legged providers hand out
/// client-credentials token fetchers.
pub trait Provider: Send + Sync + std::fmt::Debug {
    /// The schema version this instance was constructed under. Stored with
    /// the configuration so a later read reconstructs identical behavior even
    /// after the registry's current version advances.
    fn version(&self) -> i32;

    /// True for authorization-code (3-legged) flows, false for
    /// client-credentials (2-legged) flows.
    fn is_authorization_required(&self) -> bool;

    /// Builder for the resource-owner redirect URL. Callers must gate on
    /// `is_authorization_required` before offering this operation.
    fn auth_code_url_builder(&self, client_id: &str) -> AuthCodeUrlBuilder;

    /// Builder for exchanging an authorization code or an externally supplied
    /// refresh token.
    fn exchange_builder(&self, client_id: &str, client_secret: &str) -> ExchangeBuilder;

    /// Builder for the client-credentials grant. Errors with
    /// [`Error::AuthorizationRequired`] on 3-legged providers.
    fn token_builder(&self, client_id: &str, client_secret: &str)
    -> Result<TokenBuilder, Error>;
}
