//! Server-side OAuth 2.0 credential brokering.
//!
//! Configure one provider, then exchange authorization codes or refresh
//! tokens through it and hand callers short-lived access tokens. Secrets and
//! refresh tokens stay in the storage backend; expired access tokens are
//! refreshed transparently on read.

mod broker;
mod config;
mod creds;
mod discovery;
mod error;
mod exchange;
mod provider;
mod providers;
mod registry;
mod storage;
mod token;

pub use broker::Broker;
pub use config::{AuthCodeUrlRequest, Config, ConfigView};
pub use creds::{CredentialStatus, WriteCredential};
pub use discovery::{DiscoveryDocument, discover};
pub use error::{BoxError, Error};
pub use exchange::{
    AuthCodeUrlBuilder, ClientCredentials, Exchange, ExchangeBuilder, TokenBuilder,
};
pub use provider::{AuthStyle, Endpoint, Provider};
pub use providers::{AzureAdFactory, BasicFactory, BasicProvider, CustomFactory, standard_registry};
pub use registry::{FactoryContext, LATEST_VERSION, ProviderFactory, Registry};
pub use storage::{MemoryStorage, Storage};
pub use token::{StoredToken, TokenResponse};
