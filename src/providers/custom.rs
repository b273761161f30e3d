use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use super::basic::{BasicProvider, check_version};
use crate::discovery::discover;
use crate::registry::{FactoryContext, ProviderFactory};
use crate::{AuthStyle, Endpoint, Error, Provider};

/// Factory for manually configured endpoints. Accepts either explicit
/// `auth_code_url`/`token_url` options or a `discovery_url` resolved through
/// OIDC metadata once, at configuration-write time. Registered twice: as
/// `custom` (3-legged) and `custom_client_credentials` (2-legged).
#[derive(Debug, Clone, Copy)]
pub struct CustomFactory {
    authorization_required: bool,
}

impl CustomFactory {
    pub fn new(authorization_required: bool) -> Self {
        Self {
            authorization_required,
        }
    }
}

#[async_trait]
impl ProviderFactory for CustomFactory {
    async fn create(
        &self,
        version: i32,
        options: &HashMap<String, String>,
        ctx: &FactoryContext<'_>,
    ) -> Result<Arc<dyn Provider>, Error> {
        check_version(version)?;

        let opt = |name: &str| options.get(name).map(String::as_str).unwrap_or_default();

        let (auth_url, token_url) = match opt("discovery_url") {
            "" => (opt("auth_code_url").to_string(), opt("token_url").to_string()),
            discovery_url => {
                let doc = discover(ctx.http, discovery_url).await.map_err(|err| {
                    Error::InvalidOption {
                        option: "discovery_url".to_string(),
                        message: format!("error fetching provider metadata: {err}"),
                    }
                })?;
                (
                    doc.authorization_endpoint.unwrap_or_default(),
                    doc.token_endpoint.unwrap_or_default(),
                )
            }
        };

        if self.authorization_required && auth_url.is_empty() {
            return Err(Error::InvalidOption {
                option: "auth_code_url".to_string(),
                message: "authorization code URL is required".to_string(),
            });
        }
        if token_url.is_empty() {
            return Err(Error::InvalidOption {
                option: "token_url".to_string(),
                message: "token URL is required".to_string(),
            });
        }

        let auth_style = match opt("auth_style") {
            "" => AuthStyle::Auto,
            value => AuthStyle::parse(value).ok_or_else(|| Error::InvalidOption {
                option: "auth_style".to_string(),
                message: r#"unknown authentication style; expected one of "in_header" or "in_params""#
                    .to_string(),
            })?,
        };

        let endpoint = Endpoint {
            auth_url,
            token_url,
            auth_style,
        };
        Ok(Arc::new(BasicProvider::new(
            1,
            endpoint,
            self.authorization_required,
        )))
    }
}
