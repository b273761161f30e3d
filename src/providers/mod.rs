mod azure;
mod basic;
mod custom;

pub use azure::AzureAdFactory;
pub use basic::{BasicFactory, BasicProvider};
pub use custom::CustomFactory;

use crate::Registry;

/// The registry most embedders want: the fully custom provider in both its
/// 3-legged and 2-legged forms, plus Azure AD. Endpoints for other named
/// services are data; add them with [`Registry::register_basic`].
pub fn standard_registry() -> Registry {
    let mut registry = Registry::new();
    registry.register("custom", Box::new(CustomFactory::new(true)));
    registry.register(
        "custom_client_credentials",
        Box::new(CustomFactory::new(false)),
    );
    registry.register("microsoft_azure_ad", Box::new(AzureAdFactory));
    registry
}
