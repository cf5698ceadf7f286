pub mod auth;
pub mod books;
pub mod notifications;

use bookloop_kernel::ModuleRegistry;

use crate::app::Services;

/// Register all feature modules with the registry
pub fn register_all(registry: &mut ModuleRegistry, services: &Services) {
    registry.register(auth::create_module(services.identity.clone()));
    registry.register(books::create_module(books::routes::BooksState {
        identity: services.identity.clone(),
        catalog: services.catalog.clone(),
        workflow: services.workflow.clone(),
    }));
    registry.register(notifications::create_module(
        notifications::NotificationsState {
            identity: services.identity.clone(),
            mailbox: services.mailbox.clone(),
        },
    ));
}
