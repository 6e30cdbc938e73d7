//! Per-step MongoDB stage generators
//!
//! Row-order dependent steps follow one emulation shape: `$group` the rows
//! into an array, rebuild it with `$map`/`$reduce`, then `$unwind` and
//! `$replaceRoot` back to one document per row.

use serde_json::{json, Map, Value as Document};

use crate::expr::field;

pub mod aggregate;
pub mod columns;
pub mod combine;
pub mod compute;
pub mod dates;
pub mod reshape;
pub mod source;
pub mod strings;
pub mod window;

/// Array field holding the grouped rows during an emulation
pub const ROWS: &str = "__pql_rows";

/// Name of a user column inside `$group` documents, where `_id` is taken by
/// the group key
pub fn group_field(name: &str) -> String {
    if name == "_id" {
        "__pql_id".to_string()
    } else {
        name.to_string()
    }
}

/// `$group` key: null without groups, else one entry per group column
pub fn group_id(groups: &[String]) -> Document {
    if groups.is_empty() {
        return Document::Null;
    }
    let key: Map<String, Document> = groups.iter().map(|g| (group_field(g), field(g))).collect();
    Document::Object(key)
}

/// Projection entries restoring group columns from the `$group` key
pub fn group_key_fields(groups: &[String]) -> Map<String, Document> {
    groups
        .iter()
        .map(|g| (g.clone(), Document::String(format!("$_id.{}", group_field(g)))))
        .collect()
}

/// `$project` with `_id` excluded unless an entry restores it
pub fn project_without_id(fields: Map<String, Document>) -> Document {
    let mut projection = Map::new();
    if !fields.contains_key("_id") {
        projection.insert("_id".to_string(), json!(0));
    }
    projection.extend(fields);
    json!({ "$project": projection })
}

pub fn add_fields(fields: Map<String, Document>) -> Document {
    json!({ "$addFields": fields })
}

/// `$addFields` setting a single column
pub fn set_field(name: &str, value: Document) -> Document {
    let mut fields = Map::new();
    fields.insert(name.to_string(), value);
    add_fields(fields)
}

/// `$project` dropping the given fields
pub fn exclude<'a>(columns: impl IntoIterator<Item = &'a str>) -> Document {
    let fields: Map<String, Document> = columns.into_iter().map(|c| (c.to_string(), json!(0))).collect();
    json!({ "$project": fields })
}

/// `$group` collecting every row of each group into [`ROWS`]
pub fn push_rows(groups: &[String], mut accumulators: Map<String, Document>) -> Document {
    let mut group = Map::new();
    group.insert("_id".to_string(), group_id(groups));
    group.insert(ROWS.to_string(), json!({ "$push": "$$ROOT" }));
    group.append(&mut accumulators);
    json!({ "$group": group })
}

/// Back to one document per element of [`ROWS`]
pub fn unwind_rows() -> [Document; 2] {
    [
        json!({ "$unwind": format!("${}", ROWS) }),
        json!({ "$replaceRoot": { "newRoot": format!("${}", ROWS) } }),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_key_remaps_reserved_id() {
        let groups = vec!["_id".to_string(), "city".to_string()];
        assert_eq!(group_id(&groups), json!({"__pql_id": "$_id", "city": "$city"}));
        assert_eq!(
            project_without_id(group_key_fields(&groups)),
            json!({"$project": {"_id": "$_id.__pql_id", "city": "$_id.city"}})
        );
        assert_eq!(group_id(&[]), Document::Null);
    }
}
