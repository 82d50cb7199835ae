//! Idempotent provisioning of the usage-event collection.
//!
//! [`Provisioner::ensure_schema`] runs before every usage write. It either confirms the
//! collection exists (patching it toward the canonical layout when needed) or creates it.
//! Patching only ever appends missing fields and relaxes `success.required`; it never removes,
//! reorders or tightens anything else.

use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use super::schema::{SUCCESS_FIELD, SchemaDescriptor};
use crate::bosbase::{Collection, CollectionField, CollectionPatch, ListQuery, RecordStore, StoreError};

/// Which path [`Provisioner::ensure_schema`] took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ready {
    /// Collection existed and needed no changes (or a best-effort patch failed)
    Existing,
    /// Collection existed and was patched toward the canonical layout
    Patched,
    /// Collection did not exist and was created
    Created,
}

impl Ready {
    pub fn as_str(&self) -> &'static str {
        match self {
            Ready::Existing => "existing",
            Ready::Patched => "patched",
            Ready::Created => "created",
        }
    }
}

#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("failed to check collection {collection}: {source}")]
    Check {
        collection: String,
        #[source]
        source: StoreError,
    },

    #[error("failed to create collection {collection}: {source}")]
    Create {
        collection: String,
        #[source]
        source: StoreError,
    },
}

/// Difference between a live collection and its canonical descriptor.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Reconciliation {
    /// Canonical fields absent from the live collection, in canonical order
    pub missing: Vec<CollectionField>,
    /// Names of live fields whose `required` flag must be relaxed
    pub corrected: Vec<String>,
}

impl Reconciliation {
    pub fn is_noop(&self) -> bool {
        self.missing.is_empty() && self.corrected.is_empty()
    }

    /// Live fields in their order with corrections applied, followed by the missing fields.
    pub fn merged_fields(&self, live: &Collection) -> Vec<CollectionField> {
        live.fields
            .iter()
            .cloned()
            .map(|mut field| {
                if self.corrected.contains(&field.name) {
                    field.required = false;
                }
                field
            })
            .chain(self.missing.iter().cloned())
            .collect()
    }
}

/// Work out what must change in `live` to satisfy `descriptor`.
pub fn plan_reconciliation(live: &Collection, descriptor: &SchemaDescriptor<'_>) -> Reconciliation {
    let missing = descriptor
        .fields
        .iter()
        .filter(|spec| live.field(spec.name).is_none())
        .map(|spec| spec.to_field())
        .collect();

    let corrected = live
        .field(SUCCESS_FIELD)
        .filter(|field| field.required)
        .map(|field| vec![field.name.clone()])
        .unwrap_or_default();

    Reconciliation { missing, corrected }
}

#[derive(Debug, Clone)]
pub struct Provisioner {
    settle_delay: Duration,
}

impl Provisioner {
    /// `settle_delay` is slept after creating a collection, before the first write to it.
    pub fn new(settle_delay: Duration) -> Self {
        Self { settle_delay }
    }

    #[instrument(skip_all, fields(collection = descriptor.collection), err)]
    pub async fn ensure_schema(
        &self,
        store: &dyn RecordStore,
        descriptor: &SchemaDescriptor<'_>,
    ) -> Result<Ready, ProvisionError> {
        let probe = ListQuery::new(1, 1).sort("-@rowid");
        match store.list_records(descriptor.collection, &probe).await {
            Ok(_) => Ok(self.reconcile(store, descriptor).await),
            Err(e) if e.is_not_found() => self.create(store, descriptor).await,
            Err(source) => Err(ProvisionError::Check {
                collection: descriptor.collection.to_string(),
                source,
            }),
        }
    }

    /// Best effort: failures are logged and the collection is reported as existing.
    async fn reconcile(&self, store: &dyn RecordStore, descriptor: &SchemaDescriptor<'_>) -> Ready {
        let live = match store.find_collection(descriptor.collection).await {
            Ok(live) => live,
            Err(e) => {
                warn!(error = %e, "Could not read collection schema, skipping reconciliation");
                return Ready::Existing;
            }
        };

        let plan = plan_reconciliation(&live, descriptor);
        if plan.is_noop() {
            debug!("Collection schema is up to date");
            return Ready::Existing;
        }

        let Some(id) = live.id.as_deref() else {
            warn!("Live collection has no id, skipping reconciliation");
            return Ready::Existing;
        };

        let patch = CollectionPatch::with_fields(&live, plan.merged_fields(&live));
        match store.update_collection(id, &patch).await {
            Ok(_) => {
                let missing: Vec<_> = plan.missing.iter().map(|f| f.name.as_str()).collect();
                info!(?missing, corrected = ?plan.corrected, "Patched collection schema");
                Ready::Patched
            }
            Err(e) => {
                warn!(error = %e, "Failed to patch collection schema");
                Ready::Existing
            }
        }
    }

    async fn create(&self, store: &dyn RecordStore, descriptor: &SchemaDescriptor<'_>) -> Result<Ready, ProvisionError> {
        store
            .create_collection(&descriptor.to_collection())
            .await
            .map_err(|source| ProvisionError::Create {
                collection: descriptor.collection.to_string(),
                source,
            })?;
        info!("Created collection");

        // Give the store time to register the new collection before the first write.
        tokio::time::sleep(self.settle_delay).await;
        Ok(Ready::Created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bosbase::in_memory::InMemoryStore;
    use crate::bosbase::{BosBaseConnector, StoreConnector};
    use crate::config::BosBaseConfig;
    use serde_json::{Map, json};
    use url::Url;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const COLLECTION: &str = "api_calls";

    fn provisioner() -> Provisioner {
        Provisioner::new(Duration::ZERO)
    }

    fn descriptor() -> SchemaDescriptor<'static> {
        SchemaDescriptor::api_calls(COLLECTION)
    }

    fn field(name: &str, kind: &str, required: bool) -> CollectionField {
        CollectionField {
            id: Some(format!("f_{name}")),
            name: name.to_string(),
            kind: kind.to_string(),
            required,
            options: None,
            on_create: None,
            on_update: None,
            extra: Map::new(),
        }
    }

    /// A hand-made collection from an older deployment: `success` required, no `timestamp`.
    fn legacy_collection() -> Collection {
        let mut endpoint = field("endpoint", "text", true);
        endpoint.extra.insert("presentable".to_string(), json!(true));
        let mut collection = descriptor().to_collection();
        collection.fields = vec![
            endpoint,
            field("method", "text", true),
            field("prompt", "text", false),
            field("success", "bool", true),
            field("notes", "editor", false),
        ];
        collection.indexes = vec!["CREATE INDEX idx_endpoint ON api_calls (endpoint)".to_string()];
        collection.list_rule = Some("@request.auth.id != ''".to_string());
        collection
    }

    #[test]
    fn test_plan_for_canonical_collection_is_noop() {
        let plan = plan_reconciliation(&descriptor().to_collection(), &descriptor());
        assert!(plan.is_noop());
    }

    #[test]
    fn test_plan_appends_missing_and_relaxes_success() {
        let live = legacy_collection();
        let plan = plan_reconciliation(&live, &descriptor());

        let missing: Vec<_> = plan.missing.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(
            missing,
            vec!["model", "numImages", "width", "height", "error", "timestamp", "created", "updated"]
        );
        assert_eq!(plan.corrected, vec!["success".to_string()]);

        let merged = plan.merged_fields(&live);
        let names: Vec<_> = merged.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(&names[..5], &["endpoint", "method", "prompt", "success", "notes"]);
        assert!(!merged[3].required);
        // Untouched fields keep their flags and unknown properties.
        assert!(merged[0].required);
        assert_eq!(merged[0].extra.get("presentable"), Some(&json!(true)));
    }

    #[tokio::test]
    async fn test_creates_missing_collection() {
        let store = InMemoryStore::new();
        let ready = provisioner().ensure_schema(&store, &descriptor()).await.unwrap();
        assert_eq!(ready, Ready::Created);

        let created = store.collection(COLLECTION).unwrap();
        assert_eq!(created.fields.len(), descriptor().fields.len());
        assert_eq!(created.create_rule.as_deref(), Some(""));
        assert!(!created.field("success").unwrap().required);
    }

    #[tokio::test]
    async fn test_second_run_performs_no_writes() {
        let store = InMemoryStore::new();
        provisioner().ensure_schema(&store, &descriptor()).await.unwrap();
        let writes = store.collection_writes();

        let ready = provisioner().ensure_schema(&store, &descriptor()).await.unwrap();
        assert_eq!(ready, Ready::Existing);
        assert_eq!(store.collection_writes(), writes);
        assert_eq!(store.record_writes(), 0);
    }

    #[tokio::test]
    async fn test_relaxes_required_success_and_keeps_rest() {
        let store = InMemoryStore::new();
        store.insert_collection(legacy_collection());

        let ready = provisioner().ensure_schema(&store, &descriptor()).await.unwrap();
        assert_eq!(ready, Ready::Patched);

        let live = store.collection(COLLECTION).unwrap();
        assert!(!live.field("success").unwrap().required);
        assert!(live.field("endpoint").unwrap().required);
        assert!(live.field("notes").is_some());
        assert!(live.field("timestamp").is_some());
        assert_eq!(live.indexes, legacy_collection().indexes);
        assert_eq!(live.list_rule, legacy_collection().list_rule);

        // Converged: nothing left to do.
        let ready = provisioner().ensure_schema(&store, &descriptor()).await.unwrap();
        assert_eq!(ready, Ready::Existing);
    }

    #[test_log::test(tokio::test)]
    async fn test_patch_failure_is_swallowed() {
        let store = InMemoryStore::new();
        store.insert_collection(legacy_collection());
        store.reject_collection_updates(usize::MAX);

        let ready = provisioner().ensure_schema(&store, &descriptor()).await.unwrap();
        assert_eq!(ready, Ready::Existing);
        assert!(store.collection(COLLECTION).unwrap().field("success").unwrap().required);
    }

    async fn connect_mock(server: &MockServer) -> std::sync::Arc<dyn RecordStore> {
        Mock::given(method("POST"))
            .and(path("/api/collections/_superusers/auth-with-password"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "tok"})))
            .mount(server)
            .await;
        let config = BosBaseConfig {
            url: Url::parse(&server.uri()).unwrap(),
            admin_email: "admin@example.com".to_string(),
            admin_password: Some("secret".to_string()),
            ..Default::default()
        };
        BosBaseConnector::new(&config).unwrap().connect().await.unwrap()
    }

    #[tokio::test]
    async fn test_probe_failure_is_check_error() {
        let server = MockServer::start().await;
        let store = connect_mock(&server).await;
        Mock::given(method("GET"))
            .and(path("/api/collections/api_calls/records"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({"status": 500, "message": "boom", "data": {}})))
            .mount(&server)
            .await;

        let err = provisioner().ensure_schema(store.as_ref(), &descriptor()).await.unwrap_err();
        assert!(matches!(err, ProvisionError::Check { .. }));
    }

    #[tokio::test]
    async fn test_create_failure_is_create_error() {
        let server = MockServer::start().await;
        let store = connect_mock(&server).await;
        Mock::given(method("GET"))
            .and(path("/api/collections/api_calls/records"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"status": 404, "message": "Missing collection context.", "data": {}})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/collections"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({"status": 403, "message": "Only superusers can perform this action.", "data": {}})))
            .expect(1)
            .mount(&server)
            .await;

        let err = provisioner().ensure_schema(store.as_ref(), &descriptor()).await.unwrap_err();
        assert!(matches!(err, ProvisionError::Create { source: StoreError::Forbidden { .. }, .. }));
    }
}
