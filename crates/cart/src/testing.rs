//! In-memory collaborators for unit tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use cartsync_core::{PersistedCart, ProductId, ProductSnapshot, UserId};

use crate::cms::{CmsError, ProductCatalog, UserCartStore};

/// Catalog serving fixed products priced in cents.
#[derive(Default)]
pub struct StubCatalog {
    products: HashMap<ProductId, ProductSnapshot>,
    fetches: AtomicUsize,
}

impl StubCatalog {
    pub fn with_products<'a>(products: impl IntoIterator<Item = (&'a str, i64)>) -> Self {
        let products = products
            .into_iter()
            .filter_map(|(id, cents)| {
                let id = ProductId::parse(id).ok()?;
                let price = format!(r#"{{"data":[{{"unit_amount":{cents}}}]}}"#);
                Some((id.clone(), ProductSnapshot::new(id, Some(price))))
            })
            .collect();
        Self {
            products,
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProductCatalog for StubCatalog {
    async fn fetch_product(&self, id: &ProductId) -> Result<ProductSnapshot, CmsError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.products
            .get(id)
            .cloned()
            .ok_or_else(|| CmsError::NotFound(format!("product {id}")))
    }
}

/// User cart store that records every call.
#[derive(Default)]
pub struct RecordingUserCarts {
    calls: Mutex<Vec<(UserId, PersistedCart)>>,
    fail: bool,
    delay: Duration,
}

impl RecordingUserCarts {
    /// A store that records calls and then rejects them.
    pub fn failing() -> Self {
        Self {
            calls: Mutex::default(),
            fail: true,
            delay: Duration::ZERO,
        }
    }

    /// A store that records each call, then takes `delay` to succeed.
    pub fn slow(delay: Duration) -> Self {
        Self {
            calls: Mutex::default(),
            fail: false,
            delay,
        }
    }

    pub fn calls(&self) -> Vec<(UserId, PersistedCart)> {
        self.calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl UserCartStore for RecordingUserCarts {
    async fn persist_user_cart(
        &self,
        user: &UserId,
        cart: &PersistedCart,
    ) -> Result<(), CmsError> {
        self.calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push((user.clone(), cart.clone()));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            return Err(CmsError::Api {
                status: 500,
                message: "unavailable".to_string(),
            });
        }
        Ok(())
    }
}
