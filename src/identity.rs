//! Device identity collaborators.

use std::sync::RwLock;

use uuid::Uuid;

/// Source of the opaque, per-session device identity.
pub trait IdentityProvider: Send + Sync {
    /// Identity of the signed-in device, if any.
    fn current_id(&self) -> Option<String>;
}

/// Anonymous identity issued locally, mirroring an anonymous sign-in.
#[derive(Debug, Default)]
pub struct AnonymousIdentity {
    id: RwLock<Option<String>>,
}

impl AnonymousIdentity {
    /// Identity provider with nobody signed in.
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider already signed in under a fresh random id.
    pub fn signed_in() -> Self {
        let identity = Self::new();
        identity.sign_in();
        identity
    }

    /// Provider signed in under a fixed id.
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: RwLock::new(Some(id.into())),
        }
    }

    /// Issue a new identity (replacing any previous one) and return it.
    pub fn sign_in(&self) -> String {
        let id = Uuid::new_v4().simple().to_string();
        if let Ok(mut guard) = self.id.write() {
            *guard = Some(id.clone());
        }
        id
    }
}

impl IdentityProvider for AnonymousIdentity {
    fn current_id(&self) -> Option<String> {
        self.id.read().ok().and_then(|guard| guard.clone())
    }
}
