//! Mirrors OAuth users into the BosBase users collection.

use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use super::identity::OAuthProfile;
use crate::bosbase::{RecordStore, StoreError, quote_filter_literal};

#[derive(Error, Debug)]
pub enum AuthSyncError {
    #[error("failed to look up user {email}: {source}")]
    Lookup {
        email: String,
        #[source]
        source: StoreError,
    },

    #[error("failed to update user {email}: {source}")]
    Update {
        email: String,
        #[source]
        source: StoreError,
    },

    #[error("failed to create user {email}: {source}")]
    Create {
        email: String,
        #[source]
        source: StoreError,
    },
}

/// Local part of an email address, used as a display name fallback.
fn email_local_part(email: &str) -> &str {
    email.split('@').next().unwrap_or(email)
}

fn create_body(profile: &OAuthProfile) -> Map<String, Value> {
    let mut body = Map::new();
    body.insert("email".into(), json!(profile.email));
    body.insert("emailVisibility".into(), json!(true));
    let name = profile
        .name
        .as_deref()
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| email_local_part(&profile.email));
    body.insert("name".into(), json!(name));
    body.insert("google_id".into(), json!(profile.id));
    body.insert("verified".into(), json!(true));
    if let Some(image) = profile.image.as_deref().filter(|i| !i.is_empty()) {
        body.insert("avatar_url".into(), json!(image));
    }
    body
}

/// Upsert `profile` into `collection` keyed by email. Returns the user record id.
///
/// A lookup that fails with 400 is treated like "not found": collections without an `email`
/// field reject the filter rather than returning an empty list.
#[instrument(skip(store, profile), fields(email = %profile.email), err)]
pub async fn sync_user(store: &dyn RecordStore, collection: &str, profile: &OAuthProfile) -> Result<String, AuthSyncError> {
    let filter = format!("email = {}", quote_filter_literal(&profile.email));

    match store.first_list_item(collection, &filter).await {
        Ok(existing) => {
            let mut body = Map::new();
            let name = profile
                .name
                .as_deref()
                .filter(|n| !n.is_empty())
                .or_else(|| existing.str_field("name"));
            body.insert("name".into(), name.map_or(Value::Null, |n| json!(n)));
            if let Some(image) = profile.image.as_deref().filter(|i| !i.is_empty()) {
                body.insert("avatar_url".into(), json!(image));
            }
            body.insert("google_id".into(), json!(profile.id));
            body.insert("verified".into(), json!(true));

            let updated = store
                .update_record(collection, &existing.id, &body)
                .await
                .map_err(|source| AuthSyncError::Update {
                    email: profile.email.clone(),
                    source,
                })?;
            info!("Updated user {} in {}", profile.email, collection);
            Ok(updated.id)
        }
        Err(e) if e.is_not_found() || e.status() == Some(400) => {
            debug!("User {} not found ({}), creating", profile.email, e);
            create_user(store, collection, profile).await
        }
        Err(source) => Err(AuthSyncError::Lookup {
            email: profile.email.clone(),
            source,
        }),
    }
}

async fn create_user(store: &dyn RecordStore, collection: &str, profile: &OAuthProfile) -> Result<String, AuthSyncError> {
    let body = create_body(profile);
    let first = match store.create_record(collection, &body).await {
        Ok(created) => {
            info!("Created user {} in {}", profile.email, collection);
            return Ok(created.id);
        }
        Err(e) => e,
    };

    // Auth collections may insist on password fields even for OAuth accounts
    if first.status() != Some(400) && !first.mentions_field("password") {
        return Err(AuthSyncError::Create {
            email: profile.email.clone(),
            source: first,
        });
    }
    warn!("Creating user {} failed ({}), retrying with empty password", profile.email, first);

    let mut body = body;
    body.insert("password".into(), json!(""));
    body.insert("passwordConfirm".into(), json!(""));
    let created = store
        .create_record(collection, &body)
        .await
        .map_err(|source| AuthSyncError::Create {
            email: profile.email.clone(),
            source,
        })?;
    info!("Created user {} in {} with empty password", profile.email, collection);
    Ok(created.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bosbase::in_memory::InMemoryStore;

    fn profile() -> OAuthProfile {
        OAuthProfile {
            id: "109876543210".to_string(),
            email: "ada@example.com".to_string(),
            name: None,
            image: Some("https://lh3.example.com/ada.png".to_string()),
        }
    }

    #[tokio::test]
    async fn test_creates_missing_user() {
        let store = InMemoryStore::new();
        store.insert_empty_collection("users", "auth");

        let id = sync_user(&store, "users", &profile()).await.unwrap();

        let record = store.record("users", &id).unwrap();
        assert_eq!(record.str_field("email"), Some("ada@example.com"));
        assert_eq!(record.str_field("name"), Some("ada"));
        assert_eq!(record.str_field("google_id"), Some("109876543210"));
        assert_eq!(record.str_field("avatar_url"), Some("https://lh3.example.com/ada.png"));
        assert_eq!(record.get("verified"), Some(&json!(true)));
        assert_eq!(record.get("emailVisibility"), Some(&json!(true)));
    }

    #[tokio::test]
    async fn test_updates_existing_user_by_email() {
        let store = InMemoryStore::new();
        store.insert_empty_collection("users", "auth");
        let existing = store.insert_raw("users", json!({"email": "ada@example.com", "name": "Ada Lovelace"}));

        let id = sync_user(&store, "users", &profile()).await.unwrap();

        assert_eq!(id, existing);
        assert_eq!(store.records("users").len(), 1);
        let record = store.record("users", &id).unwrap();
        // Keeps the stored name when the provider sends none
        assert_eq!(record.str_field("name"), Some("Ada Lovelace"));
        assert_eq!(record.str_field("google_id"), Some("109876543210"));
        assert_eq!(record.get("verified"), Some(&json!(true)));
    }

    #[tokio::test]
    async fn test_retries_with_empty_password() {
        let store = InMemoryStore::new();
        store.insert_empty_collection("users", "auth");
        store.require_password("users");

        let id = sync_user(&store, "users", &profile()).await.unwrap();

        let record = store.record("users", &id).unwrap();
        assert!(record.get("password").is_none());
        assert_eq!(store.record_writes(), 1);
    }

    #[tokio::test]
    async fn test_lookup_failure_is_reported() {
        let store = InMemoryStore::new();
        store.insert_empty_collection("users", "auth");
        store.set_fail_reads(true);

        let err = sync_user(&store, "users", &profile()).await.unwrap_err();
        assert!(matches!(err, AuthSyncError::Lookup { .. }));
        assert_eq!(store.record_writes(), 0);
    }

    #[tokio::test]
    async fn test_missing_collection_fails_create() {
        let store = InMemoryStore::new();

        let err = sync_user(&store, "users", &profile()).await.unwrap_err();
        assert!(matches!(err, AuthSyncError::Create { source: StoreError::NotFound { .. }, .. }));
    }

    #[test]
    fn test_email_local_part() {
        assert_eq!(email_local_part("ada@example.com"), "ada");
        assert_eq!(email_local_part("no-at-sign"), "no-at-sign");
    }
}
