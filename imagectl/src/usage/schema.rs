//! Canonical field layout of the usage-event collection.
//!
//! [`API_CALLS_FIELDS`] is the single source of truth used both when the collection is created
//! and when a live collection is reconciled against it.

use serde_json::{Map, Value, json};

use crate::bosbase::{Collection, CollectionField};

/// Maximum number of characters stored for a prompt.
pub const PROMPT_MAX_CHARS: usize = 1000;

/// Name of the outcome flag. Must never be `required` in the live schema, otherwise the store
/// rejects `false` as blank.
pub const SUCCESS_FIELD: &str = "success";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Number,
    Bool,
    Autodate,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Number => "number",
            FieldKind::Bool => "bool",
            FieldKind::Autodate => "autodate",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Constraints {
    None,
    Text {
        min: Option<u32>,
        max: Option<u32>,
        pattern: &'static str,
    },
    Number {
        min: Option<f64>,
        max: Option<f64>,
    },
    Autodate {
        on_create: bool,
        on_update: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    pub constraints: Constraints,
}

const fn text(name: &'static str, required: bool, max: Option<u32>) -> FieldSpec {
    FieldSpec {
        name,
        kind: FieldKind::Text,
        required,
        constraints: Constraints::Text { min: None, max, pattern: "" },
    }
}

const fn number(name: &'static str) -> FieldSpec {
    FieldSpec {
        name,
        kind: FieldKind::Number,
        required: false,
        constraints: Constraints::Number { min: None, max: None },
    }
}

const fn autodate(name: &'static str, on_update: bool) -> FieldSpec {
    FieldSpec {
        name,
        kind: FieldKind::Autodate,
        required: false,
        constraints: Constraints::Autodate {
            on_create: true,
            on_update,
        },
    }
}

pub const API_CALLS_FIELDS: &[FieldSpec] = &[
    text("endpoint", true, None),
    text("method", true, None),
    text("model", false, None),
    text("prompt", false, Some(PROMPT_MAX_CHARS as u32)),
    number("numImages"),
    number("width"),
    number("height"),
    FieldSpec {
        name: SUCCESS_FIELD,
        kind: FieldKind::Bool,
        required: false,
        constraints: Constraints::None,
    },
    text("error", false, None),
    text("timestamp", false, None),
    autodate("created", false),
    autodate("updated", true),
];

impl FieldSpec {
    /// The field as BosBase expects it in a collection payload.
    pub fn to_field(&self) -> CollectionField {
        let (options, on_create, on_update) = match self.constraints {
            Constraints::None => (Some(json!({})), None, None),
            Constraints::Text { min, max, pattern } => {
                (Some(json!({ "min": min, "max": max, "pattern": pattern })), None, None)
            }
            Constraints::Number { min, max } => (Some(json!({ "min": min, "max": max })), None, None),
            Constraints::Autodate { on_create, on_update } => (None, Some(on_create), Some(on_update)),
        };

        CollectionField {
            id: None,
            name: self.name.to_string(),
            kind: self.kind.as_str().to_string(),
            required: self.required,
            options,
            on_create,
            on_update,
            extra: Map::new(),
        }
    }
}

/// A collection name paired with its canonical field table.
#[derive(Debug, Clone, Copy)]
pub struct SchemaDescriptor<'a> {
    pub collection: &'a str,
    pub fields: &'a [FieldSpec],
}

impl<'a> SchemaDescriptor<'a> {
    pub fn api_calls(collection: &'a str) -> Self {
        Self {
            collection,
            fields: API_CALLS_FIELDS,
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Create payload: a base collection writable by anyone, everything else superuser-only.
    pub fn to_collection(&self) -> Collection {
        Collection {
            id: None,
            name: self.collection.to_string(),
            kind: "base".to_string(),
            fields: self.fields.iter().map(FieldSpec::to_field).collect(),
            indexes: Vec::new(),
            list_rule: None,
            view_rule: None,
            create_rule: Some(String::new()),
            update_rule: None,
            delete_rule: None,
            extra: Map::<String, Value>::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_is_optional_bool() {
        let descriptor = SchemaDescriptor::api_calls("api_calls");
        let success = descriptor.field(SUCCESS_FIELD).unwrap();
        assert_eq!(success.kind, FieldKind::Bool);
        assert!(!success.required);
    }

    #[test]
    fn test_create_payload_shape() {
        let collection = SchemaDescriptor::api_calls("api_calls").to_collection();
        let payload = serde_json::to_value(&collection).unwrap();

        assert_eq!(payload["name"], "api_calls");
        assert_eq!(payload["type"], "base");
        assert_eq!(payload["indexes"], json!([]));
        assert_eq!(payload["createRule"], "");
        assert!(payload["listRule"].is_null());
        assert!(payload["deleteRule"].is_null());

        let names: Vec<_> = collection.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "endpoint", "method", "model", "prompt", "numImages", "width", "height", "success", "error", "timestamp",
                "created", "updated"
            ]
        );

        let fields = payload["fields"].as_array().unwrap();
        assert_eq!(fields[0]["options"], json!({"min": null, "max": null, "pattern": ""}));
        assert_eq!(fields[3]["options"]["max"], 1000);
        assert_eq!(fields[4]["options"], json!({"min": null, "max": null}));
        assert_eq!(fields[7]["required"], false);
        assert_eq!(fields[10]["onCreate"], true);
        assert_eq!(fields[10]["onUpdate"], false);
        assert_eq!(fields[11]["onUpdate"], true);
        assert!(fields[11].get("options").is_none());
    }
}
