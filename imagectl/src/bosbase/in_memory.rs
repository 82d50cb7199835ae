//! In-memory implementation of [`RecordStore`] for testing.
//!
//! It mimics the BosBase behaviours usage tracking depends on: 404 for unknown collections,
//! rejection of `false` in a required bool field, autodate stamping, `-@rowid` sorting and
//! simple `field = "value"` filters.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value, json};

use super::errors::StoreError;
use super::models::{Collection, CollectionPatch, ListQuery, ListResult, Record};
use super::store::{RecordStore, StoreConnector};

#[derive(Debug, Default)]
struct State {
    collections: Vec<Collection>,
    records: HashMap<String, Vec<Record>>,
    next_id: u64,
    record_writes: usize,
    collection_writes: usize,
    unreachable: bool,
    fail_reads: bool,
    fail_scans: bool,
    largest_page: usize,
    rejected_collection_updates: usize,
    require_password: Vec<String>,
}

/// Shared, cloneable in-memory BosBase.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a collection as-is, bypassing the create endpoint.
    pub fn insert_collection(&self, mut collection: Collection) -> String {
        let mut state = self.state.lock().unwrap();
        let id = collection.id.clone().unwrap_or_else(|| next_id(&mut state, "pbc"));
        collection.id = Some(id.clone());
        state.records.entry(collection.name.clone()).or_default();
        state.collections.push(collection);
        id
    }

    /// Register an empty collection with no fields (like the built-in `users` auth collection).
    pub fn insert_empty_collection(&self, name: &str, kind: &str) -> String {
        self.insert_collection(Collection {
            id: None,
            name: name.to_string(),
            kind: kind.to_string(),
            fields: Vec::new(),
            indexes: Vec::new(),
            list_rule: None,
            view_rule: None,
            create_rule: None,
            update_rule: None,
            delete_rule: None,
            extra: Map::new(),
        })
    }

    /// Store a record verbatim, without validation or autodate stamping.
    pub fn insert_raw(&self, collection: &str, fields: Value) -> String {
        let mut state = self.state.lock().unwrap();
        let id = next_id(&mut state, "rec");
        let fields = match fields {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        state.records.entry(collection.to_string()).or_default().push(Record { id: id.clone(), fields });
        id
    }

    pub fn collection(&self, name: &str) -> Option<Collection> {
        self.state.lock().unwrap().collections.iter().find(|c| c.name == name).cloned()
    }

    pub fn record(&self, collection: &str, id: &str) -> Option<Record> {
        let state = self.state.lock().unwrap();
        state.records.get(collection)?.iter().find(|r| r.id == id).cloned()
    }

    pub fn records(&self, collection: &str) -> Vec<Record> {
        self.state.lock().unwrap().records.get(collection).cloned().unwrap_or_default()
    }

    /// Number of record creates and updates accepted so far.
    pub fn record_writes(&self) -> usize {
        self.state.lock().unwrap().record_writes
    }

    /// Number of collection creates and updates accepted so far.
    pub fn collection_writes(&self) -> usize {
        self.state.lock().unwrap().collection_writes
    }

    /// Most records returned by a single list request so far.
    pub fn largest_page(&self) -> usize {
        self.state.lock().unwrap().largest_page
    }

    /// Make [`StoreConnector::connect`] fail as if the server were down.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().unwrap().unreachable = unreachable;
    }

    /// Make every record list request fail with a server error.
    pub fn set_fail_reads(&self, fail: bool) {
        self.state.lock().unwrap().fail_reads = fail;
    }

    /// Make multi-record list requests fail while single-record reads keep working.
    pub fn set_fail_scans(&self, fail: bool) {
        self.state.lock().unwrap().fail_scans = fail;
    }

    /// Reject the next `count` collection updates.
    pub fn reject_collection_updates(&self, count: usize) {
        self.state.lock().unwrap().rejected_collection_updates = count;
    }

    /// Reject record creation in `collection` unless a `password` property is supplied.
    pub fn require_password(&self, collection: &str) {
        self.state.lock().unwrap().require_password.push(collection.to_string());
    }
}

fn next_id(state: &mut State, prefix: &str) -> String {
    state.next_id += 1;
    format!("{prefix}{:012}", state.next_id)
}

fn not_found(message: &str) -> StoreError {
    StoreError::NotFound {
        message: message.to_string(),
    }
}

fn store_timestamp() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S%.3fZ").to_string()
}

/// Reject values BosBase would consider blank for required fields.
fn validate(collection: &Collection, fields: &Map<String, Value>) -> Result<(), StoreError> {
    let mut errors = Map::new();
    for field in collection.fields.iter().filter(|f| f.required) {
        let blank = match fields.get(&field.name) {
            None | Some(Value::Null) => true,
            Some(Value::Bool(b)) => !b,
            Some(Value::String(s)) => s.is_empty(),
            Some(Value::Number(n)) => n.as_f64() == Some(0.0),
            Some(_) => false,
        };
        if blank {
            errors.insert(
                field.name.clone(),
                json!({"code": "validation_required", "message": "Cannot be blank."}),
            );
        }
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(StoreError::BadRequest {
            message: "Failed to create record.".to_string(),
            data: Value::Object(errors),
        })
    }
}

/// Evaluate the `field = "literal"` filter shape; anything else matches everything.
fn matches_filter(record: &Record, filter: &str) -> Result<bool, StoreError> {
    let Some((field, literal)) = filter.split_once('=') else {
        return Ok(true);
    };
    let literal = literal.trim();
    let Some(inner) = literal.strip_prefix('"').and_then(|l| l.strip_suffix('"')) else {
        return Err(StoreError::BadRequest {
            message: "Invalid filter parameters.".to_string(),
            data: Value::Null,
        });
    };
    let expected = inner.replace("\\\"", "\"").replace("\\\\", "\\");
    Ok(record.str_field(field.trim()) == Some(expected.as_str()))
}

fn page_of<T: Clone>(items: &[T], query: &ListQuery) -> ListResult<T> {
    let per_page = query.per_page.max(1);
    let page = query.page.max(1);
    let total_items = items.len() as u64;
    let total_pages = total_items.div_ceil(u64::from(per_page));
    let start = ((page - 1) * per_page) as usize;
    let items = items.iter().skip(start).take(per_page as usize).cloned().collect();
    ListResult {
        page,
        per_page,
        total_items,
        total_pages,
        items,
    }
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn list_records(&self, collection: &str, query: &ListQuery) -> Result<ListResult<Record>, StoreError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_reads || (state.fail_scans && query.per_page > 1) {
            return Err(StoreError::Status {
                status: 500,
                message: "Something went wrong while processing your request.".to_string(),
            });
        }
        let records = state
            .records
            .get(collection)
            .ok_or_else(|| not_found("Missing collection context."))?;

        let mut selected = Vec::new();
        for record in records {
            let keep = match &query.filter {
                Some(filter) => matches_filter(record, filter)?,
                None => true,
            };
            if keep {
                selected.push(record.clone());
            }
        }
        if query.sort.as_deref() == Some("-@rowid") {
            selected.reverse();
        }
        let page = page_of(&selected, query);
        state.largest_page = state.largest_page.max(page.items.len());
        Ok(page)
    }

    async fn create_record(&self, collection: &str, body: &Map<String, Value>) -> Result<Record, StoreError> {
        let mut state = self.state.lock().unwrap();
        let schema = state
            .collections
            .iter()
            .find(|c| c.name == collection)
            .cloned()
            .ok_or_else(|| not_found("Missing collection context."))?;
        validate(&schema, body)?;
        if state.require_password.iter().any(|c| c == collection) && !body.contains_key("password") {
            return Err(StoreError::BadRequest {
                message: "Failed to create record.".to_string(),
                data: json!({"password": {"code": "validation_required", "message": "Cannot be blank."}}),
            });
        }

        let mut fields = body.clone();
        fields.remove("password");
        fields.remove("passwordConfirm");
        let now = store_timestamp();
        for field in schema.fields.iter().filter(|f| f.kind == "autodate") {
            if field.on_create == Some(true) {
                fields.insert(field.name.clone(), json!(now));
            }
        }

        let id = next_id(&mut state, "rec");
        let record = Record { id, fields };
        state.records.entry(collection.to_string()).or_default().push(record.clone());
        state.record_writes += 1;
        Ok(record)
    }

    async fn update_record(&self, collection: &str, id: &str, body: &Map<String, Value>) -> Result<Record, StoreError> {
        let mut state = self.state.lock().unwrap();
        let schema = state
            .collections
            .iter()
            .find(|c| c.name == collection)
            .cloned()
            .ok_or_else(|| not_found("Missing collection context."))?;
        let record = state
            .records
            .get(collection)
            .and_then(|records| records.iter().find(|r| r.id == id))
            .cloned()
            .ok_or_else(|| not_found("The requested resource wasn't found."))?;

        let mut merged = record.fields.clone();
        for (key, value) in body {
            merged.insert(key.clone(), value.clone());
        }
        validate(&schema, &merged)?;
        let now = store_timestamp();
        for field in schema.fields.iter().filter(|f| f.kind == "autodate") {
            if field.on_update == Some(true) {
                merged.insert(field.name.clone(), json!(now));
            }
        }

        let updated = Record {
            id: id.to_string(),
            fields: merged,
        };
        if let Some(slot) = state
            .records
            .get_mut(collection)
            .and_then(|records| records.iter_mut().find(|r| r.id == id))
        {
            *slot = updated.clone();
        }
        state.record_writes += 1;
        Ok(updated)
    }

    async fn list_collections(&self, query: &ListQuery) -> Result<ListResult<Collection>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(page_of(&state.collections, query))
    }

    async fn create_collection(&self, collection: &Collection) -> Result<Collection, StoreError> {
        let mut state = self.state.lock().unwrap();
        if state.collections.iter().any(|c| c.name == collection.name) {
            return Err(StoreError::BadRequest {
                message: "Failed to create the collection.".to_string(),
                data: json!({"name": {"code": "validation_collection_name_exists", "message": "Collection name must be unique."}}),
            });
        }
        let mut created = collection.clone();
        created.id = Some(next_id(&mut state, "pbc"));
        for field in created.fields.iter_mut().filter(|f| f.id.is_none()) {
            field.id = Some(format!("{}{}", field.kind, field.name));
        }
        state.records.entry(created.name.clone()).or_default();
        state.collections.push(created.clone());
        state.collection_writes += 1;
        Ok(created)
    }

    async fn update_collection(&self, id: &str, patch: &CollectionPatch) -> Result<Collection, StoreError> {
        let mut state = self.state.lock().unwrap();
        if state.rejected_collection_updates > 0 {
            state.rejected_collection_updates -= 1;
            return Err(StoreError::Forbidden {
                message: "Only superusers can perform this action.".to_string(),
            });
        }
        let collection = state
            .collections
            .iter_mut()
            .find(|c| c.id.as_deref() == Some(id))
            .ok_or_else(|| not_found("The requested resource wasn't found."))?;

        collection.fields = patch.fields.clone();
        collection.indexes = patch.indexes.clone();
        collection.list_rule = patch.list_rule.clone();
        collection.view_rule = patch.view_rule.clone();
        collection.create_rule = patch.create_rule.clone();
        collection.update_rule = patch.update_rule.clone();
        collection.delete_rule = patch.delete_rule.clone();
        let updated = collection.clone();
        state.collection_writes += 1;
        Ok(updated)
    }
}

#[async_trait]
impl StoreConnector for InMemoryStore {
    async fn connect(&self) -> Result<Arc<dyn RecordStore>, StoreError> {
        if self.state.lock().unwrap().unreachable {
            return Err(StoreError::Unavailable("connection refused".to_string()));
        }
        Ok(Arc::new(self.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_collection_is_not_found() {
        let store = InMemoryStore::new();
        let err = store.list_records("api_calls", &ListQuery::new(1, 1)).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_rowid_sort_and_pagination() {
        let store = InMemoryStore::new();
        store.insert_empty_collection("things", "base");
        for n in 0..5 {
            store.insert_raw("things", json!({ "n": n }));
        }

        let newest = store
            .list_records("things", &ListQuery::new(1, 1).sort("-@rowid"))
            .await
            .unwrap();
        assert_eq!(newest.total_items, 5);
        assert_eq!(newest.items[0].get("n"), Some(&json!(4)));

        let second_page = store.list_records("things", &ListQuery::new(2, 2)).await.unwrap();
        assert_eq!(second_page.total_pages, 3);
        assert_eq!(second_page.items.len(), 2);
        assert_eq!(second_page.items[0].get("n"), Some(&json!(2)));
    }

    #[tokio::test]
    async fn test_filter_by_quoted_literal() {
        let store = InMemoryStore::new();
        store.insert_empty_collection("users", "auth");
        store.insert_raw("users", json!({"email": "a@example.com"}));
        let wanted = store.insert_raw("users", json!({"email": "b@example.com"}));

        let found = store.first_list_item("users", r#"email = "b@example.com""#).await.unwrap();
        assert_eq!(found.id, wanted);

        let err = store.first_list_item("users", r#"email = "c@example.com""#).await.unwrap_err();
        assert!(err.is_not_found());
    }
}
