use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use super::basic::{BasicProvider, check_version};
use crate::registry::{FactoryContext, ProviderFactory};
use crate::{Endpoint, Error, Provider};

/// Azure AD endpoints are parameterized by the directory tenant; otherwise
/// the provider behaves exactly like a basic one.
#[derive(Debug, Clone, Copy, Default)]
pub struct AzureAdFactory;

fn azure_endpoint(tenant: &str) -> Endpoint {
    Endpoint::new(
        format!("https://login.microsoftonline.com/{tenant}/oauth2/v2.0/authorize"),
        format!("https://login.microsoftonline.com/{tenant}/oauth2/v2.0/token"),
    )
}

#[async_trait]
impl ProviderFactory for AzureAdFactory {
    async fn create(
        &self,
        version: i32,
        options: &HashMap<String, String>,
        _ctx: &FactoryContext<'_>,
    ) -> Result<Arc<dyn Provider>, Error> {
        check_version(version)?;

        let tenant = options.get("tenant").map(String::as_str).unwrap_or_default();
        if tenant.is_empty() {
            return Err(Error::InvalidOption {
                option: "tenant".to_string(),
                message: "tenant is required".to_string(),
            });
        }

        Ok(Arc::new(BasicProvider::new(1, azure_endpoint(tenant), true)))
    }
}
