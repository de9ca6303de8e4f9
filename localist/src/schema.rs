use crate::relations::ReverseRel;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

/// One field as declared in a model's configuration.
///
/// A field carrying `foreign_key` references another model and is stored on
/// records under the `<name>_id` column; `type = "repeat"` marks the inline
/// array under which a nested child model's rows arrive and leave.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormField {
    pub name: String,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub field_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreign_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_name: Option<String>,
}

impl FormField {
    pub fn attr(name: impl Into<String>) -> Self {
        FormField { name: name.into(), ..FormField::default() }
    }

    pub fn repeat(name: impl Into<String>) -> Self {
        FormField { name: name.into(), field_type: Some("repeat".to_string()), ..FormField::default() }
    }

    pub fn fk(name: impl Into<String>, to: impl Into<String>) -> Self {
        FormField { name: name.into(), foreign_key: Some(to.into()), ..FormField::default() }
    }

    pub fn with_related_name(mut self, related_name: impl Into<String>) -> Self {
        self.related_name = Some(related_name.into());
        self
    }

    pub fn is_repeat(&self) -> bool {
        self.field_type.as_deref() == Some("repeat")
    }
}

/// Resolved field of a registered model.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    pub name: String,
    pub kind: FieldKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Attr,
    ForeignKey { to: String, related_name: String },
    Repeat,
}

impl FieldDef {
    pub fn attr(name: impl Into<String>) -> Self {
        FieldDef { name: name.into(), kind: FieldKind::Attr }
    }

    pub fn foreign_key(name: impl Into<String>, to: impl Into<String>, related_name: impl Into<String>) -> Self {
        FieldDef {
            name: name.into(),
            kind: FieldKind::ForeignKey { to: to.into(), related_name: related_name.into() },
        }
    }

    pub fn repeat(name: impl Into<String>) -> Self {
        FieldDef { name: name.into(), kind: FieldKind::Repeat }
    }

    /// Column name this field occupies on stored records.
    pub fn column(&self) -> String {
        match self.kind {
            FieldKind::ForeignKey { .. } => format!("{}_id", self.name),
            _ => self.name.clone(),
        }
    }
}

/// Static schema of one registered model: its name, identifier column and
/// resolved field list.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelDef {
    pub name: String,
    pub id_col: String,
    pub fields: Vec<FieldDef>,
}

impl ModelDef {
    pub fn new(name: impl Into<String>) -> Self {
        ModelDef { name: name.into(), id_col: "id".to_string(), fields: Vec::new() }
    }

    pub fn with_id_col(mut self, id_col: impl Into<String>) -> Self {
        self.id_col = id_col.into();
        self
    }

    pub fn with_field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }
}

/// Registry of model schemas for one store.
///
/// Constructed per store instance and passed by reference, never held in a
/// process-wide static, so isolated instances can coexist in tests.
/// Registration is idempotent: re-registering a name returns the definition
/// registered first. The reverse-relation index is computed lazily on first
/// use and covers the models registered up to that point.
#[derive(Default)]
pub struct Registry {
    pub(crate) models: Mutex<BTreeMap<String, Arc<ModelDef>>>,
    pub(crate) rrels: OnceCell<HashMap<String, Vec<ReverseRel>>>,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    pub fn register(&self, def: ModelDef) -> Arc<ModelDef> {
        let mut models = self.models.lock().unwrap();
        models.entry(def.name.clone()).or_insert_with(|| Arc::new(def)).clone()
    }

    pub fn get(&self, name: &str) -> Option<Arc<ModelDef>> {
        self.models.lock().unwrap().get(name).cloned()
    }

    pub fn model_names(&self) -> Vec<String> {
        self.models.lock().unwrap().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_is_idempotent() {
        let registry = Registry::new();
        let first = registry.register(ModelDef::new("site").with_field(FieldDef::attr("name")));
        let second = registry.register(ModelDef::new("site"));
        assert_eq!(first.fields.len(), 1);
        assert_eq!(second.fields.len(), 1, "re-registering must return the original definition");
        assert_eq!(registry.model_names(), vec!["site".to_string()]);
    }

    #[test]
    fn foreign_key_fields_map_to_id_columns() {
        let field = FieldDef::foreign_key("site", "site", "observations");
        assert_eq!(field.column(), "site_id");
        assert_eq!(FieldDef::attr("notes").column(), "notes");
    }
}
