use crate::schema::{FieldKind, ModelDef, Registry};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Reverse side of a foreign key: for a target model, one referencing model
/// together with the column holding the reference.
///
/// A relation is nested when the target model declares a repeat field named
/// after the reverse relation; nested rows are owned by their parent, arrive
/// inline under `related_name` and are cascade-deleted with the parent.
#[derive(Debug, Clone, PartialEq)]
pub struct ReverseRel {
    pub model: String,
    pub fk_name: String,
    pub related_name: String,
    pub nested: bool,
}

impl Registry {
    /// All models referencing `name` through a foreign key. Unknown or
    /// unreferenced models yield an empty slice, not an error.
    pub fn reverse_rels(&self, name: &str) -> &[ReverseRel] {
        let rrels = self.rrels.get_or_init(|| {
            let models = self.models.lock().unwrap().clone();
            compute_reverse_rels(&models)
        });
        rrels.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The nested subset of [`reverse_rels`](Registry::reverse_rels).
    pub fn nested_rels(&self, name: &str) -> Vec<&ReverseRel> {
        self.reverse_rels(name).iter().filter(|rel| rel.nested).collect()
    }
}

fn compute_reverse_rels(models: &BTreeMap<String, Arc<ModelDef>>) -> HashMap<String, Vec<ReverseRel>> {
    let mut rrels: HashMap<String, Vec<ReverseRel>> = HashMap::new();
    for (name, def) in models {
        for field in &def.fields {
            let FieldKind::ForeignKey { to, related_name } = &field.kind else {
                continue;
            };
            let Some(target) = models.get(to) else {
                continue;
            };
            let nested = target
                .fields
                .iter()
                .any(|f| matches!(f.kind, FieldKind::Repeat) && f.name == *related_name);
            rrels.entry(to.clone()).or_default().push(ReverseRel {
                model: name.clone(),
                fk_name: field.column(),
                related_name: related_name.clone(),
                nested,
            });
        }
    }
    rrels
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldDef;

    fn survey_registry() -> Registry {
        let registry = Registry::new();
        registry.register(
            ModelDef::new("observation")
                .with_field(FieldDef::attr("notes"))
                .with_field(FieldDef::repeat("readings"))
                .with_field(FieldDef::foreign_key("site", "site", "observations")),
        );
        registry.register(
            ModelDef::new("reading")
                .with_field(FieldDef::attr("value"))
                .with_field(FieldDef::foreign_key("observation", "observation", "readings")),
        );
        registry.register(ModelDef::new("site").with_field(FieldDef::attr("name")));
        registry
    }

    #[test]
    fn reverse_rels_distinguish_nested_from_plain() {
        let registry = survey_registry();

        let obs_rels = registry.reverse_rels("observation").to_vec();
        assert_eq!(
            obs_rels,
            vec![ReverseRel {
                model: "reading".to_string(),
                fk_name: "observation_id".to_string(),
                related_name: "readings".to_string(),
                nested: true,
            }]
        );

        let site_rels = registry.reverse_rels("site");
        assert_eq!(site_rels.len(), 1);
        assert!(!site_rels[0].nested, "site has no repeat field, so the relation is plain");
        assert_eq!(site_rels[0].fk_name, "site_id");
    }

    #[test]
    fn nested_rels_filter_to_owned_relations() {
        let registry = survey_registry();
        let nested = registry.nested_rels("observation");
        assert_eq!(nested.len(), 1);
        assert_eq!(nested[0].model, "reading");
        assert!(registry.nested_rels("site").is_empty());
    }

    #[test]
    fn unknown_models_have_no_reverse_rels() {
        let registry = survey_registry();
        assert!(registry.reverse_rels("nonexistent").is_empty());
    }

    #[test]
    fn models_registered_after_first_use_are_not_indexed() {
        let registry = survey_registry();
        assert_eq!(registry.reverse_rels("observation").len(), 1);
        registry.register(
            ModelDef::new("photo")
                .with_field(FieldDef::foreign_key("observation", "observation", "photos")),
        );
        assert_eq!(registry.reverse_rels("observation").len(), 1);
    }
}
