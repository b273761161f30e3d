use std::sync::Arc;

use reqwest::Client;
use tokio::sync::Mutex;

use crate::registry::{FactoryContext, Registry};
use crate::{Error, Storage};

/// The credential broker: one configuration, many named credentials, one
/// shared HTTP client for every exchange and refresh.
///
/// Mutating credential operations serialize on a single store-wide lock so
/// two refreshes can never race to overwrite each other with divergent
/// refresh-token rotations. Reads that find a still-valid token take no lock
/// and make no network call.
///
/// Dropping an operation's future cancels any in-flight exchange and releases
/// the lock; the stored record is only ever replaced by a completed exchange.
pub struct Broker {
    storage: Arc<dyn Storage>,
    registry: Registry,
    http: Client,
    pub(crate) cred_lock: Mutex<()>,
}

impl Broker {
    pub fn new(storage: Arc<dyn Storage>, registry: Registry) -> Result<Self, Error> {
        let http = Client::builder().build()?;
        Ok(Self::with_http_client(storage, registry, http))
    }

    /// Like [`Broker::new`] with a caller-supplied HTTP client, e.g. one with
    /// custom timeouts or an interception layer for tests.
    pub fn with_http_client(storage: Arc<dyn Storage>, registry: Registry, http: Client) -> Self {
        Self {
            storage,
            registry,
            http,
            cred_lock: Mutex::new(()),
        }
    }

    pub(crate) fn storage(&self) -> &dyn Storage {
        self.storage.as_ref()
    }

    pub(crate) fn registry(&self) -> &Registry {
        &self.registry
    }

    pub(crate) fn http(&self) -> &Client {
        &self.http
    }

    pub(crate) fn factory_context(&self) -> FactoryContext<'_> {
        FactoryContext { http: &self.http }
    }
}
