//! Premium entitlement lookup.
//!
//! The session engine never decides entitlement itself; it asks an injected
//! provider. Development builds use [`FixedPremium`] through config instead
//! of a compile-time switch.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::storage::{Config, KeyValueStore};

/// Key holding the purchase flag written by the store front.
pub const PREMIUM_KEY: &str = "isPremium";

#[async_trait]
pub trait PremiumStatusProvider: Send + Sync {
    async fn is_premium(&self) -> bool;
}

/// Constant answer.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedPremium(pub bool);

#[async_trait]
impl PremiumStatusProvider for FixedPremium {
    async fn is_premium(&self) -> bool {
        self.0
    }
}

/// Reads the persisted purchase flag. Anything but `"true"` is free tier,
/// including read failures.
pub struct StoredPremium {
    store: Arc<dyn KeyValueStore>,
}

impl StoredPremium {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl PremiumStatusProvider for StoredPremium {
    async fn is_premium(&self) -> bool {
        match self.store.get_item(PREMIUM_KEY).await {
            Ok(value) => value.as_deref() == Some("true"),
            Err(e) => {
                warn!(error = %e, "premium flag unreadable, assuming free tier");
                false
            }
        }
    }
}

/// Pick the provider the config asks for.
pub fn provider_from_config(
    config: &Config,
    store: Arc<dyn KeyValueStore>,
) -> Arc<dyn PremiumStatusProvider> {
    if config.premium.always_premium {
        Arc::new(FixedPremium(true))
    } else {
        Arc::new(StoredPremium::new(store))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[tokio::test]
    async fn stored_flag_must_be_literal_true() {
        let store = Arc::new(MemoryStore::new());
        let provider = StoredPremium::new(store.clone());
        assert!(!provider.is_premium().await);

        store.set_item(PREMIUM_KEY, "yes").await.unwrap();
        assert!(!provider.is_premium().await);

        store.set_item(PREMIUM_KEY, "true").await.unwrap();
        assert!(provider.is_premium().await);
    }

    #[tokio::test]
    async fn config_override_wins() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let mut config = Config::default();
        assert!(!provider_from_config(&config, store.clone()).is_premium().await);

        config.premium.always_premium = true;
        assert!(provider_from_config(&config, store).is_premium().await);
    }
}
