//! Federation directive helpers for types backed by loadable fields.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A directive application, e.g. `@key(fields: "id")`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Directive {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Map<String, Value>>,
}

impl Directive {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), args: None }
    }

    pub fn with_arg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.args.get_or_insert_with(Map::new).insert(name.into(), value.into());
        self
    }
}

/// A field selection set used as an entity key, e.g. `"id"` or `"organization { id } slug"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Selection(pub String);

impl From<&str> for Selection {
    fn from(selection: &str) -> Self {
        Selection(selection.to_owned())
    }
}

impl From<String> for Selection {
    fn from(selection: String) -> Self {
        Selection(selection)
    }
}

/// Directives as users write them on a type: either a list of applications or a map from
/// directive name to its arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DirectiveOption {
    List(Vec<Directive>),
    Map(Map<String, Value>),
}

/// One `@key` directive per selection.
pub fn key_directive(keys: &[Selection]) -> Vec<Directive> {
    keys.iter().map(|key| Directive::new("key").with_arg("fields", key.0.clone())).collect()
}

/// Appends `add` to the directives already configured. Nothing is deduplicated.
pub fn merge_directives(existing: Option<DirectiveOption>, add: Vec<Directive>) -> Vec<Directive> {
    let mut merged = match existing {
        None => Vec::with_capacity(add.len()),
        Some(DirectiveOption::List(list)) => list,
        Some(DirectiveOption::Map(map)) => map
            .into_iter()
            .map(|(name, args)| Directive {
                name,
                args: match args {
                    Value::Object(args) => Some(args),
                    _ => None,
                },
            })
            .collect(),
    };
    merged.extend(add);
    merged
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn one_key_directive_per_selection() {
        let directives = key_directive(&["id".into(), "email".into()]);
        assert_eq!(
            serde_json::to_value(&directives).unwrap(),
            json!([
                { "name": "key", "args": { "fields": "id" } },
                { "name": "key", "args": { "fields": "email" } },
            ])
        );
    }

    #[test]
    fn merge_keeps_existing_list_first() {
        let existing = DirectiveOption::List(vec![Directive::new("shareable")]);
        let merged = merge_directives(Some(existing), key_directive(&["id".into()]));

        let names = merged.iter().map(|d| d.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["shareable", "key"]);
    }

    #[test]
    fn merge_expands_directive_map() {
        let existing: DirectiveOption =
            serde_json::from_value(json!({ "tag": { "name": "public" }, "inaccessible": {} }))
                .unwrap();
        let merged = merge_directives(Some(existing), vec![Directive::new("external")]);

        assert_eq!(merged.len(), 3);
        assert!(merged.contains(&Directive::new("tag").with_arg("name", "public")));
        let inaccessible = Directive { name: "inaccessible".to_owned(), args: Some(Map::new()) };
        assert!(merged.contains(&inaccessible));
        assert_eq!(merged[2], Directive::new("external"));
    }

    #[test]
    fn merge_without_existing_is_the_addition() {
        let merged = merge_directives(None, key_directive(&["id".into()]));
        assert_eq!(merged, key_directive(&["id".into()]));
    }
}
