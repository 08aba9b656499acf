// Credential persistence in the key-value store

use super::types::{
    STORED_ACCESS_TOKEN_KEY, STORED_REFRESH_TOKEN_KEY, STORED_SESSION_KEYS, STORED_USERNAME_KEY,
};
use crate::error::StoreError;
use crate::store::KeyValueStore;

/// Credential triple as read back from the store
#[derive(Debug, Clone, PartialEq)]
pub struct StoredCredentials {
    pub username: String,
    pub access_token: String,
    pub refresh_token: String,
}

/// Write all three session entries in one store transaction
pub async fn persist(
    store: &dyn KeyValueStore,
    username: &str,
    access_token: &str,
    refresh_token: &str,
) -> Result<(), StoreError> {
    store
        .set_many(&[
            (STORED_USERNAME_KEY, username),
            (STORED_ACCESS_TOKEN_KEY, access_token),
            (STORED_REFRESH_TOKEN_KEY, refresh_token),
        ])
        .await?;

    tracing::debug!(username = %username, "Session credentials persisted");
    Ok(())
}

/// Load the stored triple; `None` unless all three entries are present and non-empty
pub async fn load(store: &dyn KeyValueStore) -> Result<Option<StoredCredentials>, StoreError> {
    let username = non_empty(store.get(STORED_USERNAME_KEY).await?);
    let access_token = non_empty(store.get(STORED_ACCESS_TOKEN_KEY).await?);
    let refresh_token = non_empty(store.get(STORED_REFRESH_TOKEN_KEY).await?);

    match (username, access_token, refresh_token) {
        (Some(username), Some(access_token), Some(refresh_token)) => Ok(Some(StoredCredentials {
            username,
            access_token,
            refresh_token,
        })),
        (None, None, None) => Ok(None),
        _ => {
            tracing::warn!("Stored session is incomplete, ignoring it");
            Ok(None)
        }
    }
}

/// Last stored username, even when the tokens are gone
pub async fn load_username(store: &dyn KeyValueStore) -> Result<Option<String>, StoreError> {
    Ok(non_empty(store.get(STORED_USERNAME_KEY).await?))
}

/// Remove every session entry in one store transaction
pub async fn erase(store: &dyn KeyValueStore) -> Result<(), StoreError> {
    store.remove_many(&STORED_SESSION_KEYS).await
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, SqliteStore};

    #[tokio::test]
    async fn test_persist_and_load() {
        let store = MemoryStore::new();
        persist(&store, "alice", "A1", "R1").await.unwrap();

        let loaded = load(&store).await.unwrap().unwrap();
        assert_eq!(
            loaded,
            StoredCredentials {
                username: "alice".to_string(),
                access_token: "A1".to_string(),
                refresh_token: "R1".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_load_incomplete_is_none() {
        let store = MemoryStore::new();
        store.set(STORED_USERNAME_KEY, "alice").await.unwrap();
        store.set(STORED_ACCESS_TOKEN_KEY, "A1").await.unwrap();

        assert!(load(&store).await.unwrap().is_none());
        assert_eq!(
            load_username(&store).await.unwrap().as_deref(),
            Some("alice")
        );
    }

    #[tokio::test]
    async fn test_load_empty_value_is_none() {
        let store = MemoryStore::new();
        persist(&store, "alice", "", "R1").await.unwrap();
        assert!(load(&store).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_erase_sqlite() {
        let store = SqliteStore::open_in_memory().unwrap();
        persist(&store, "alice", "A1", "R1").await.unwrap();

        erase(&store).await.unwrap();
        assert!(load(&store).await.unwrap().is_none());
        assert!(load_username(&store).await.unwrap().is_none());
    }
}
