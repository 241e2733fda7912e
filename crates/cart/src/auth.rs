//! Authentication state and the cart transitions it triggers.
//!
//! Auth is driven from outside the cart (a session check, a login form). The
//! provider only needs to know who, if anyone, is signed in and what cart the
//! backend has stored for them.

use serde::Deserialize;

use cartsync_core::{AuthStatus, Cart, UserId};

use crate::reducer::CartAction;

/// A signed-in user as seen by the cart.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AuthUser {
    /// Backend user id.
    pub id: UserId,
    /// Email, used only for error-tracking context.
    #[serde(default)]
    pub email: Option<String>,
    /// Cart stored on the user record.
    #[serde(default)]
    pub cart: Cart,
}

impl AuthUser {
    /// Create a user with an empty stored cart.
    #[must_use]
    pub const fn new(id: UserId) -> Self {
        Self {
            id,
            email: None,
            cart: Cart::new(),
        }
    }

    /// Attach the remotely stored cart.
    #[must_use]
    pub fn with_cart(mut self, cart: Cart) -> Self {
        self.cart = cart;
        self
    }
}

/// Current authentication state.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum AuthState {
    /// Not resolved yet.
    #[default]
    Unknown,
    /// Resolved to a guest.
    Unauthenticated,
    /// A user is signed in.
    LoggedIn(AuthUser),
    /// The user signed out.
    LoggedOut,
}

impl AuthState {
    /// The status without user data.
    #[must_use]
    pub const fn status(&self) -> AuthStatus {
        match self {
            Self::Unknown => AuthStatus::Unknown,
            Self::Unauthenticated => AuthStatus::Unauthenticated,
            Self::LoggedIn(_) => AuthStatus::LoggedIn,
            Self::LoggedOut => AuthStatus::LoggedOut,
        }
    }

    /// The signed-in user, if any.
    #[must_use]
    pub const fn user(&self) -> Option<&AuthUser> {
        match self {
            Self::LoggedIn(user) => Some(user),
            _ => None,
        }
    }

    /// The signed-in user's id, if any.
    #[must_use]
    pub fn user_id(&self) -> Option<&UserId> {
        self.user().map(|u| &u.id)
    }
}

impl From<Option<AuthUser>> for AuthState {
    fn from(user: Option<AuthUser>) -> Self {
        user.map_or(Self::Unauthenticated, Self::LoggedIn)
    }
}

/// The cart action implied by moving from `previous` to `next`.
///
/// - into `LoggedIn`: merge the user's stored cart, unless the same user was
///   already signed in (re-reporting a user must not merge twice)
/// - into `LoggedOut`: clear the cart
/// - anything else: nothing
#[must_use]
pub fn transition(previous: &AuthState, next: &AuthState) -> Option<CartAction> {
    match next {
        AuthState::LoggedIn(user) => {
            if previous.user_id() == Some(&user.id) {
                None
            } else {
                Some(CartAction::MergeCart(Some(user.cart.clone())))
            }
        }
        AuthState::LoggedOut if !matches!(previous, AuthState::LoggedOut) => {
            Some(CartAction::ClearCart)
        }
        _ => None,
    }
}
