use std::{collections::HashMap, fmt::Debug, sync::Arc};

use async_trait::async_trait;
use shared::models::{Identity, PublicProfile, UpsertProfileRequest};
use tokio::sync::RwLock;

use super::message_store::{StoreError, StoreResult};

/// Public profile lookup used to address recipients and to snapshot senders
/// into push frames.
#[async_trait]
pub trait ProfileDirectory: Debug + Send + Sync {
    async fn get(&self, identity: &Identity) -> StoreResult<Option<PublicProfile>>;

    async fn upsert(
        &self,
        identity: &Identity,
        request: UpsertProfileRequest,
    ) -> StoreResult<PublicProfile>;

    /// Returns the identity's profile, creating a placeholder when absent.
    async fn ensure(&self, identity: &Identity) -> StoreResult<PublicProfile>;
}

pub type SharedDirectory = Arc<dyn ProfileDirectory>;

/// Normalises an upsert request into a stored profile.
pub(crate) fn profile_from_request(
    identity: &Identity,
    request: UpsertProfileRequest,
) -> StoreResult<PublicProfile> {
    let display_name = request.display_name.trim().to_string();
    if display_name.is_empty() {
        return Err(StoreError::Validation("display_name is required".into()));
    }

    Ok(PublicProfile {
        identity: identity.clone(),
        display_name,
        username: request
            .username
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty()),
        avatar_url: request
            .avatar_url
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty()),
    })
}

#[derive(Debug, Default)]
pub struct InMemoryProfileDirectory {
    profiles: RwLock<HashMap<Identity, PublicProfile>>,
}

impl InMemoryProfileDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProfileDirectory for InMemoryProfileDirectory {
    async fn get(&self, identity: &Identity) -> StoreResult<Option<PublicProfile>> {
        Ok(self.profiles.read().await.get(identity).cloned())
    }

    async fn upsert(
        &self,
        identity: &Identity,
        request: UpsertProfileRequest,
    ) -> StoreResult<PublicProfile> {
        if identity.is_blank() {
            return Err(StoreError::Validation("identity is required".into()));
        }
        let profile = profile_from_request(identity, request)?;
        self.profiles
            .write()
            .await
            .insert(identity.clone(), profile.clone());
        Ok(profile)
    }

    async fn ensure(&self, identity: &Identity) -> StoreResult<PublicProfile> {
        if identity.is_blank() {
            return Err(StoreError::Validation("identity is required".into()));
        }
        let mut guard = self.profiles.write().await;
        Ok(guard
            .entry(identity.clone())
            .or_insert_with(|| PublicProfile::placeholder(identity))
            .clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(name: &str) -> UpsertProfileRequest {
        UpsertProfileRequest {
            display_name: name.into(),
            username: Some(" ali ".into()),
            avatar_url: Some(String::new()),
        }
    }

    #[tokio::test]
    async fn upsert_then_get() {
        let directory = InMemoryProfileDirectory::new();
        let alice = Identity::from("alice");

        assert!(directory.get(&alice).await.unwrap().is_none());
        let stored = directory.upsert(&alice, request("Alice")).await.unwrap();

        assert_eq!(stored.username.as_deref(), Some("ali"));
        assert!(stored.avatar_url.is_none());
        assert_eq!(directory.get(&alice).await.unwrap(), Some(stored));
    }

    #[tokio::test]
    async fn blank_display_name_is_rejected() {
        let directory = InMemoryProfileDirectory::new();
        let err = directory
            .upsert(&Identity::from("alice"), request("  "))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[tokio::test]
    async fn ensure_keeps_existing_profile() {
        let directory = InMemoryProfileDirectory::new();
        let alice = Identity::from("alice");

        let placeholder = directory.ensure(&alice).await.unwrap();
        assert_eq!(placeholder.display_name, "alice");

        directory.upsert(&alice, request("Alice")).await.unwrap();
        assert_eq!(directory.ensure(&alice).await.unwrap().display_name, "Alice");
    }
}
