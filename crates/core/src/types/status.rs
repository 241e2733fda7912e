//! Status enums for cart synchronization.

use serde::{Deserialize, Serialize};

/// Hydration progress of a cart provider.
///
/// Transitions only move forward: `Uninitialized -> Hydrating -> Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    /// Nothing loaded yet.
    #[default]
    Uninitialized,
    /// Local cart is being read and resolved.
    Hydrating,
    /// Local hydration finished; auth transitions and persistence may run.
    Ready,
}

impl SyncPhase {
    /// Whether hydration has completed.
    #[must_use]
    pub const fn is_ready(self) -> bool {
        matches!(self, Self::Ready)
    }
}

/// Authentication status as reported by the auth collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum AuthStatus {
    /// Auth has not resolved yet.
    #[default]
    Unknown,
    /// Resolved, no user (guest).
    Unauthenticated,
    /// A user is signed in.
    LoggedIn,
    /// The user just signed out.
    LoggedOut,
}

impl AuthStatus {
    /// Whether auth has resolved one way or the other.
    #[must_use]
    pub const fn is_known(self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

impl std::fmt::Display for AuthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Unauthenticated => write!(f, "unauthenticated"),
            Self::LoggedIn => write!(f, "loggedIn"),
            Self::LoggedOut => write!(f, "loggedOut"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_default_is_uninitialized() {
        assert_eq!(SyncPhase::default(), SyncPhase::Uninitialized);
        assert!(!SyncPhase::Hydrating.is_ready());
        assert!(SyncPhase::Ready.is_ready());
    }

    #[test]
    fn test_auth_status_known() {
        assert!(!AuthStatus::Unknown.is_known());
        assert!(AuthStatus::Unauthenticated.is_known());
        assert!(AuthStatus::LoggedOut.is_known());
    }

    #[test]
    fn test_auth_status_display_matches_wire_names() {
        for status in [
            AuthStatus::Unknown,
            AuthStatus::Unauthenticated,
            AuthStatus::LoggedIn,
            AuthStatus::LoggedOut,
        ] {
            let wire = serde_json::to_string(&status).unwrap_or_default();
            assert_eq!(wire, format!("\"{status}\""));
        }
    }
}
