//! Unified error handling with Sentry integration.
//!
//! Cart operations never surface errors to their callers; failures are
//! absorbed and reported here instead. [`report`] captures an error to Sentry
//! and logs it with the event id so the two can be correlated.

use thiserror::Error;

use crate::cms::CmsError;
use crate::config::ConfigError;
use crate::storage::StoreError;

/// Crate-level error type.
#[derive(Debug, Error)]
pub enum CartError {
    /// CMS backend operation failed.
    #[error("CMS error: {0}")]
    Cms(#[from] CmsError),

    /// Local storage operation failed.
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Cart payload could not be serialized.
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Result type alias for `CartError`.
pub type Result<T> = std::result::Result<T, CartError>;

/// Capture an error to Sentry and log it.
///
/// Returns the Sentry event id (nil when Sentry is not initialized).
pub fn report(err: &CartError, context: &str) -> sentry::types::Uuid {
    let event_id = sentry::capture_error(err);
    tracing::error!(
        error = %err,
        sentry_event_id = %event_id,
        "{context}"
    );
    event_id
}

/// Set the Sentry user context from a user ID.
///
/// Call this after a login is applied to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
///
/// Call this on logout to stop associating errors with the user.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for cart actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of cart
/// mutations leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("cart", "ADD_ITEM", Some(&[("product_id", "64f0c2")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}
