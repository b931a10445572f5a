//! The identity context supplying the current principal.
//!
//! The engine never reads ambient global state to find out who is signed
//! in; it asks an injected [`Identity`] at each refresh point, which keeps
//! behavior deterministic under test. "No principal" means signed out: the
//! engine skips every remote operation and keeps serving local data.

use std::fmt;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

/// The authenticated identity associated with the current session.
///
/// Guaranteed non-empty; the identifier doubles as the remote namespace
/// under which the principal's notes live.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Principal(String);

impl Principal {
    /// Construct a principal from a non-empty identifier.
    pub fn new(id: impl Into<String>) -> Option<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            None
        } else {
            Some(Self(id))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Supplies the current principal, if any.
pub trait Identity: Send + Sync {
    /// The signed-in principal, or `None` when unauthenticated.
    fn current_principal(&self) -> Option<Principal>;
}

/// A mutable, in-process identity context.
///
/// Authentication itself happens elsewhere (an external provider); this is
/// the seam through which its outcome reaches the engine.
#[derive(Debug, Default)]
pub struct SessionIdentity {
    current: RwLock<Option<Principal>>,
}

impl SessionIdentity {
    /// Start signed out.
    pub fn signed_out() -> Self {
        Self::default()
    }

    /// Start signed in as the given principal.
    pub fn signed_in(principal: Principal) -> Self {
        Self {
            current: RwLock::new(Some(principal)),
        }
    }

    pub fn sign_in(&self, principal: Principal) {
        *self.current.write().expect("identity lock poisoned") = Some(principal);
    }

    pub fn sign_out(&self) {
        *self.current.write().expect("identity lock poisoned") = None;
    }
}

impl Identity for SessionIdentity {
    fn current_principal(&self) -> Option<Principal> {
        self.current.read().expect("identity lock poisoned").clone()
    }
}
