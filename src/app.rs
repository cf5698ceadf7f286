//! Service graph shared by the HTTP modules, the CLI and the tests.

use std::sync::Arc;

use bookloop_db::DocumentStore;
use bookloop_kernel::{settings::Settings, InitCtx, ModuleRegistry};

use crate::modules::{
    self,
    auth::{IdentityProvider, MemoryIdentityProvider},
    books::catalog::Catalog,
    notifications::mailbox::Mailbox,
};
use crate::workflow::Workflow;

#[derive(Clone)]
pub struct Services {
    pub store: Arc<dyn DocumentStore>,
    pub identity: Arc<dyn IdentityProvider>,
    pub catalog: Catalog,
    pub mailbox: Mailbox,
    pub workflow: Workflow,
}

impl Services {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        identity: Arc<dyn IdentityProvider>,
        settings: &Settings,
    ) -> Self {
        let catalog = Catalog::new(store.clone());
        let mailbox = Mailbox::new(store.clone(), settings.notifications.mailbox_capacity);
        let workflow = Workflow::new(store.clone(), catalog.clone(), mailbox.clone());
        Self {
            store,
            identity,
            catalog,
            mailbox,
            workflow,
        }
    }

    /// Services backed by the configured store and the in-process identity
    /// provider.
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let store = bookloop_db::connect(&settings.store)?;
        let identity = Arc::new(MemoryIdentityProvider::new(settings.auth.clone()));
        Ok(Self::new(store, identity, settings))
    }

    /// A registry holding every feature module wired to these services.
    pub fn registry(&self) -> ModuleRegistry {
        let mut registry = ModuleRegistry::new();
        modules::register_all(&mut registry, self);
        registry
    }
}

/// Run the HTTP server until `shutdown` resolves, driving the module
/// lifecycle around it.
pub async fn serve<F>(settings: &Settings, shutdown: F) -> anyhow::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let services = Services::from_settings(settings)?;
    let registry = services.registry();
    tracing::info!(modules = registry.module_count(), "modules registered");

    let ctx = InitCtx { settings };
    registry.init_modules(&ctx).await?;
    registry.start_modules(&ctx).await?;

    let served = bookloop_http::start_server(&registry, settings, shutdown).await;

    registry.stop_modules().await?;
    served
}
