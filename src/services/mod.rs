//! Application services. Each owns a handle to the store and the notifier.

pub mod catalog;
pub mod ledger;
pub mod orders;
pub mod payments;
pub mod pricing;

use std::sync::Arc;

use crate::config::Config;
use crate::domain::value_objects::Money;
use crate::notify::Notifier;
use crate::store::Store;

pub use catalog::{CatalogService, ProductListing};
pub use ledger::SellerLedger;
pub use orders::{CartLine, Checkout, OrderService};
pub use payments::{CallbackStatus, PaymentGateway, PaymentInit};
pub use pricing::PricingEngine;

#[derive(Clone)]
pub struct Services {
    pub catalog: CatalogService,
    pub pricing: PricingEngine,
    pub orders: OrderService,
    pub payments: PaymentGateway,
    pub ledger: SellerLedger,
}

impl Services {
    pub fn new(store: Arc<dyn Store>, notifier: Arc<dyn Notifier>, config: &Config) -> Self {
        let pricing = PricingEngine::new(store.clone(), notifier.clone());
        let ledger = SellerLedger::new(store.clone(), notifier.clone(), Money::new(config.min_withdrawal), config.default_commission);
        let orders = OrderService::new(store.clone(), notifier.clone(), pricing.clone(), ledger.clone(), Money::new(config.shipping_price));
        Self {
            catalog: CatalogService::new(store.clone()),
            payments: PaymentGateway::new(store, notifier, config.payments.clone()),
            pricing,
            orders,
            ledger,
        }
    }
}
