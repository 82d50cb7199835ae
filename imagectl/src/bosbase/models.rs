//! Wire types for the BosBase REST API.
//!
//! BosBase collections and records carry more properties than this crate cares about. Unknown
//! properties are captured in flattened `extra` maps so that a read-modify-write cycle (for
//! example patching a collection's field list) never drops them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One page of a list endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ListResult<T> {
    pub page: u32,
    pub per_page: u32,
    pub total_items: u64,
    pub total_pages: u64,
    pub items: Vec<T>,
}

/// A stored record: its id plus every other property as raw JSON.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Record {
    pub id: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Record {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// String property, treating empty strings as absent.
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
    }
}

/// A collection definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(rename = "type", default = "default_collection_kind")]
    pub kind: String,
    #[serde(default)]
    pub fields: Vec<CollectionField>,
    #[serde(default)]
    pub indexes: Vec<String>,
    // `None` serializes as `null` (superusers only); `Some("")` opens the rule to everyone.
    #[serde(default)]
    pub list_rule: Option<String>,
    #[serde(default)]
    pub view_rule: Option<String>,
    #[serde(default)]
    pub create_rule: Option<String>,
    #[serde(default)]
    pub update_rule: Option<String>,
    #[serde(default)]
    pub delete_rule: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_collection_kind() -> String {
    "base".to_string()
}

impl Collection {
    pub fn field(&self, name: &str) -> Option<&CollectionField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// A single field of a collection schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CollectionField {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_create: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_update: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Body of a collection update. Everything except `fields` is copied from the live collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CollectionPatch {
    pub fields: Vec<CollectionField>,
    pub indexes: Vec<String>,
    pub list_rule: Option<String>,
    pub view_rule: Option<String>,
    pub create_rule: Option<String>,
    pub update_rule: Option<String>,
    pub delete_rule: Option<String>,
}

impl CollectionPatch {
    /// Patch that replaces the field list and keeps indexes and rules as they are.
    pub fn with_fields(live: &Collection, fields: Vec<CollectionField>) -> Self {
        Self {
            fields,
            indexes: live.indexes.clone(),
            list_rule: live.list_rule.clone(),
            view_rule: live.view_rule.clone(),
            create_rule: live.create_rule.clone(),
            update_rule: live.update_rule.clone(),
            delete_rule: live.delete_rule.clone(),
        }
    }
}

/// Query parameters for list endpoints.
#[derive(Debug, Clone, PartialEq)]
pub struct ListQuery {
    pub page: u32,
    pub per_page: u32,
    pub sort: Option<String>,
    pub filter: Option<String>,
}

impl ListQuery {
    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page,
            per_page,
            sort: None,
            filter: None,
        }
    }

    pub fn sort(mut self, sort: impl Into<String>) -> Self {
        self.sort = Some(sort.into());
        self
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub(crate) fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![("page", self.page.to_string()), ("perPage", self.per_page.to_string())];
        if let Some(sort) = &self.sort {
            pairs.push(("sort", sort.clone()));
        }
        if let Some(filter) = &self.filter {
            pairs.push(("filter", filter.clone()));
        }
        pairs
    }
}

/// Quote a string literal for use inside a BosBase filter expression.
pub fn quote_filter_literal(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_collection_round_trip_keeps_unknown_properties() {
        let raw = json!({
            "id": "pbc_123",
            "name": "api_calls",
            "type": "base",
            "system": false,
            "fields": [
                {"id": "text1", "name": "endpoint", "type": "text", "required": true, "presentable": false, "max": 0},
                {"id": "auto1", "name": "created", "type": "autodate", "required": false, "onCreate": true, "onUpdate": false}
            ],
            "indexes": ["CREATE INDEX idx ON api_calls (endpoint)"],
            "listRule": null,
            "viewRule": null,
            "createRule": "",
            "updateRule": null,
            "deleteRule": null
        });

        let collection: Collection = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(collection.kind, "base");
        assert_eq!(collection.create_rule.as_deref(), Some(""));
        assert!(collection.list_rule.is_none());
        assert_eq!(collection.extra.get("system"), Some(&json!(false)));

        let endpoint = collection.field("endpoint").unwrap();
        assert!(endpoint.required);
        assert_eq!(endpoint.extra.get("presentable"), Some(&json!(false)));
        assert_eq!(collection.field("created").unwrap().on_create, Some(true));

        assert_eq!(serde_json::to_value(&collection).unwrap(), raw);
    }

    #[test]
    fn test_record_flattens_fields() {
        let record: Record = serde_json::from_value(json!({
            "id": "abc",
            "collectionName": "api_calls",
            "success": true,
            "error": ""
        }))
        .unwrap();

        assert_eq!(record.id, "abc");
        assert_eq!(record.get("success"), Some(&json!(true)));
        assert_eq!(record.str_field("collectionName"), Some("api_calls"));
        assert_eq!(record.str_field("error"), None);
    }

    #[test]
    fn test_list_query_pairs() {
        let query = ListQuery::new(1, 1).sort("-@rowid");
        assert_eq!(
            query.to_pairs(),
            vec![
                ("page", "1".to_string()),
                ("perPage", "1".to_string()),
                ("sort", "-@rowid".to_string())
            ]
        );
    }

    #[test]
    fn test_quote_filter_literal_escapes_quotes() {
        assert_eq!(quote_filter_literal("a@b.com"), r#""a@b.com""#);
        assert_eq!(quote_filter_literal(r#"x"y"#), r#""x\"y""#);
    }
}
