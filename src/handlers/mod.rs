pub mod checkout;
pub mod health;
pub mod orders;
pub mod payment_webhooks;

use crate::events::EventSender;
use crate::payments::PaymentProvider;
use crate::services::notifications::Notifier;
use sea_orm::DatabaseConnection;
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub checkout: Arc<crate::services::checkout::CheckoutService>,
    pub reconciliation: Arc<crate::services::reconciliation::ReconciliationService>,
}

impl AppServices {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: EventSender,
        provider: Arc<dyn PaymentProvider>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let checkout = Arc::new(crate::services::checkout::CheckoutService::new(
            db.clone(),
            provider,
            event_sender.clone(),
        ));
        let reconciliation = Arc::new(crate::services::reconciliation::ReconciliationService::new(
            db,
            notifier,
            event_sender,
        ));

        Self {
            checkout,
            reconciliation,
        }
    }
}
