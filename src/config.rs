use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::registry::LATEST_VERSION;
use crate::{Broker, Error, Provider};

pub(crate) const CONFIG_KEY: &str = "config";

fn latest_version() -> i32 {
    LATEST_VERSION
}

/// The single active provider configuration. The client secret is write-only:
/// it is persisted, used for exchanges, and never surfaced on read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub provider: String,
    #[serde(default = "latest_version")]
    pub provider_version: i32,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub provider_options: HashMap<String, String>,
    #[serde(default)]
    pub auth_url_params: HashMap<String, String>,
}

/// Secret-free projection of [`Config`] returned by reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigView {
    pub provider: String,
    pub provider_version: i32,
    pub client_id: String,
    pub provider_options: HashMap<String, String>,
    pub auth_url_params: HashMap<String, String>,
}

impl From<&Config> for ConfigView {
    fn from(config: &Config) -> Self {
        Self {
            provider: config.provider.clone(),
            provider_version: config.provider_version,
            client_id: config.client_id.clone(),
            provider_options: config.provider_options.clone(),
            auth_url_params: config.auth_url_params.clone(),
        }
    }
}

/// Inputs for building a resource-owner redirect URL.
#[derive(Debug, Clone, Default)]
pub struct AuthCodeUrlRequest {
    pub state: String,
    pub redirect_url: Option<String>,
    pub scopes: Vec<String>,
    pub params: Vec<(String, String)>,
}

impl Broker {
    /// Returns the stored configuration without the client secret, or `None`
    /// when nothing is configured.
    pub async fn config(&self) -> Result<Option<ConfigView>, Error> {
        Ok(self.read_config().await?.as_ref().map(ConfigView::from))
    }

    /// Replaces the configuration wholesale. The provider name, version, and
    /// options are validated through the registry first, so an invalid
    /// configuration is never durably stored. The version actually
    /// constructed is what gets persisted, pinning future reads to the same
    /// construction logic.
    pub async fn write_config(&self, mut config: Config) -> Result<(), Error> {
        let provider = self
            .registry()
            .resolve(
                &config.provider,
                config.provider_version,
                &config.provider_options,
                &self.factory_context(),
            )
            .await?;
        config.provider_version = provider.version();

        let bytes = serde_json::to_vec(&config)?;
        self.storage()
            .put(CONFIG_KEY, bytes)
            .await
            .map_err(Error::Storage)
    }

    /// Removes the configuration. Stored credentials are left in place; they
    /// simply cannot be exchanged or refreshed until a new configuration is
    /// written.
    pub async fn delete_config(&self) -> Result<(), Error> {
        self.storage()
            .delete(CONFIG_KEY)
            .await
            .map_err(Error::Storage)
    }

    /// Builds the URL to redirect a resource owner to. Configured
    /// `auth_url_params` win over per-request parameters on key collision.
    pub async fn auth_code_url(&self, request: AuthCodeUrlRequest) -> Result<String, Error> {
        let Some((config, provider)) = self.provider().await? else {
            return Err(Error::NotConfigured);
        };
        if !provider.is_authorization_required() {
            return Err(Error::AuthorizationNotRequired);
        }
        if request.state.is_empty() {
            return Err(Error::MissingState);
        }

        let mut builder = provider
            .auth_code_url_builder(&config.client_id)
            .with_scopes(request.scopes);
        if let Some(redirect_url) = request.redirect_url {
            builder = builder.with_redirect_url(redirect_url);
        }
        for (key, value) in request.params {
            builder = builder.with_param(key, value);
        }
        for (key, value) in &config.auth_url_params {
            builder = builder.with_param(key.clone(), value.clone());
        }
        builder.build(&request.state)
    }

    pub(crate) async fn read_config(&self) -> Result<Option<Config>, Error> {
        let Some(bytes) = self
            .storage()
            .get(CONFIG_KEY)
            .await
            .map_err(Error::Storage)?
        else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    /// Resolves the stored configuration to a live provider, or `None` when
    /// not configured. Configs are persisted with a concrete version, so this
    /// reconstructs exactly the behavior they were written under.
    pub(crate) async fn provider(
        &self,
    ) -> Result<Option<(Config, Arc<dyn Provider>)>, Error> {
        let Some(config) = self.read_config().await? else {
            return Ok(None);
        };
        let provider = self
            .registry()
            .resolve(
                &config.provider,
                config.provider_version,
                &config.provider_options,
                &self.factory_context(),
            )
            .await?;
        Ok(Some((config, provider)))
    }
}
