//! The signed-in identity.

use super::{State, StoreName};
use crate::error::StoreError;
use serde::{Deserialize, Serialize};

/// Slot holding the signed-in identity.
pub const AUTH_KEY: &str = "eaders-auth";

/// A reader identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl Identity {
    /// The local demo reader.
    pub fn demo() -> Self {
        Self {
            id: "currentUser".to_string(),
            name: "Manga Fan".to_string(),
            email: "fan@example.com".to_string(),
            image_url: Some("https://placehold.co/40x40.png".to_string()),
        }
    }

    /// Two-letter avatar fallback.
    pub fn initials(&self) -> String {
        self.name.chars().take(2).collect::<String>().to_uppercase()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct AuthRecord {
    user: Identity,
}

/// Repository for the auth slot.
#[derive(Clone)]
pub struct AuthStore {
    state: State,
}

impl AuthStore {
    pub fn new(state: State) -> Self {
        Self { state }
    }

    /// The signed-in identity, if any. Blank ids count as signed out.
    pub fn current(&self) -> Result<Option<Identity>, StoreError> {
        let record: Option<AuthRecord> = self.state.load(AUTH_KEY)?;
        Ok(record
            .map(|r| r.user)
            .filter(|user| !user.id.trim().is_empty()))
    }

    pub fn login(&self, identity: Identity) -> Result<(), StoreError> {
        self.state
            .save(StoreName::Auth, AUTH_KEY, &AuthRecord { user: identity })
    }

    pub fn logout(&self) -> Result<(), StoreError> {
        self.state.clear(StoreName::Auth, AUTH_KEY)
    }
}
