use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::registry::{FactoryContext, LATEST_VERSION, ProviderFactory};
use crate::{AuthCodeUrlBuilder, Endpoint, Error, ExchangeBuilder, Provider, TokenBuilder};

/// A provider backed by a static endpoint pair. Every variant in this crate
/// bottoms out here: named well-known services, the tenant-parameterized
/// Azure AD provider, and the fully custom provider all construct one of
/// these with a different endpoint.
#[derive(Debug, Clone)]
pub struct BasicProvider {
    version: i32,
    endpoint: Endpoint,
    authorization_required: bool,
}

impl BasicProvider {
    pub fn new(version: i32, endpoint: Endpoint, authorization_required: bool) -> Self {
        Self {
            version,
            endpoint,
            authorization_required,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}

impl Provider for BasicProvider {
    fn version(&self) -> i32 {
        self.version
    }

    fn is_authorization_required(&self) -> bool {
        self.authorization_required
    }

    fn auth_code_url_builder(&self, client_id: &str) -> AuthCodeUrlBuilder {
        AuthCodeUrlBuilder::new(self.endpoint.clone(), client_id)
    }

    fn exchange_builder(&self, client_id: &str, client_secret: &str) -> ExchangeBuilder {
        ExchangeBuilder::new(self.endpoint.clone(), client_id, client_secret)
    }

    fn token_builder(
        &self,
        client_id: &str,
        client_secret: &str,
    ) -> Result<TokenBuilder, Error> {
        if self.authorization_required {
            return Err(Error::AuthorizationRequired);
        }
        Ok(TokenBuilder::new(&self.endpoint, client_id, client_secret))
    }
}

/// Only one schema version exists so far for every shipped factory.
pub(crate) fn check_version(version: i32) -> Result<(), Error> {
    match version {
        LATEST_VERSION | 1 => Ok(()),
        other => Err(Error::UnsupportedProviderVersion(other)),
    }
}

pub(crate) fn reject_options(options: &HashMap<String, String>) -> Result<(), Error> {
    if let Some(option) = options.keys().next() {
        return Err(Error::InvalidOption {
            option: option.clone(),
            message: "this provider does not take options".to_string(),
        });
    }
    Ok(())
}

/// Factory for services whose endpoints are fixed at registration time.
/// Always 3-legged.
#[derive(Debug, Clone)]
pub struct BasicFactory {
    endpoint: Endpoint,
}

impl BasicFactory {
    pub fn new(endpoint: Endpoint) -> Self {
        Self { endpoint }
    }
}

#[async_trait]
impl ProviderFactory for BasicFactory {
    async fn create(
        &self,
        version: i32,
        options: &HashMap<String, String>,
        _ctx: &FactoryContext<'_>,
    ) -> Result<Arc<dyn Provider>, Error> {
        check_version(version)?;
        reject_options(options)?;
        Ok(Arc::new(BasicProvider::new(1, self.endpoint.clone(), true)))
    }
}
