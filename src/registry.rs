use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::providers::BasicFactory;
use crate::{Endpoint, Error, Provider};

/// Sentinel version meaning "whatever is current". Stored configurations
/// always record the concrete version the constructed provider reports, so
/// this never ends up persisted.
pub const LATEST_VERSION: i32 = -1;

/// Shared resources factories may need at construction time. Discovery-based
/// providers fetch metadata here, once, at configuration-write time.
pub struct FactoryContext<'a> {
    pub http: &'a reqwest::Client,
}

/// Constructs provider instances from a version and an option map. Option
/// violations must name the offending option via
/// [`Error::InvalidOption`]; unsupported versions must return
/// [`Error::UnsupportedProviderVersion`] so old stored configurations keep
/// resolving to the construction logic they were written under.
#[async_trait]
pub trait ProviderFactory: Send + Sync {
    async fn create(
        &self,
        version: i32,
        options: &HashMap<String, String>,
        ctx: &FactoryContext<'_>,
    ) -> Result<Arc<dyn Provider>, Error>;
}

/// Process-wide catalog of provider types. Populated during startup and
/// read-only afterwards, so lookups need no locking.
#[derive(Default)]
pub struct Registry {
    factories: HashMap<String, Box<dyn ProviderFactory>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory under a provider-type name.
    ///
    /// # Panics
    ///
    /// Panics on duplicate registration. Registration happens once during
    /// process initialization; a duplicate is a programming error, not a
    /// runtime condition.
    pub fn register(&mut self, name: impl Into<String>, factory: Box<dyn ProviderFactory>) {
        let name = name.into();
        if self.factories.contains_key(&name) {
            panic!("provider already registered: {name}");
        }
        self.factories.insert(name, factory);
    }

    /// Registers a well-known service as a static endpoint pair. The
    /// endpoints are data; the construction logic is [`BasicFactory`].
    pub fn register_basic(&mut self, name: impl Into<String>, endpoint: Endpoint) {
        self.register(name, Box::new(BasicFactory::new(endpoint)));
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Resolves a provider type to a live instance. `version` of
    /// [`LATEST_VERSION`] selects the current construction logic; any other
    /// value must match a version the factory still supports.
    pub async fn resolve(
        &self,
        name: &str,
        version: i32,
        options: &HashMap<String, String>,
        ctx: &FactoryContext<'_>,
    ) -> Result<Arc<dyn Provider>, Error> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| Error::UnknownProvider(name.to_string()))?;
        factory.create(version, options, ctx).await
    }
}
