use std::collections::HashMap;

use crate::model::{Dataset, Item};

/// Site whose ids key the identifier index.
pub const INDEX_SITE: &str = "bangumi";

/// Derived lookup from a bangumi subject id to the position of its item in
/// the dataset it was built from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentifierIndex {
    by_id: HashMap<String, usize>,
}

impl IdentifierIndex {
    pub fn position(&self, id: &str) -> Option<usize> {
        self.by_id.get(id).copied()
    }

    /// Resolve an id against the dataset this index was built from.
    pub fn lookup<'a>(&self, dataset: &'a Dataset, id: &str) -> Option<&'a Item> {
        self.position(id).and_then(|pos| dataset.items().get(pos))
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

/// Build the index for a dataset.
///
/// Only the first `bangumi` association of each item counts. When two items
/// claim the same id, the later item wins.
pub fn build_index(dataset: &Dataset) -> IdentifierIndex {
    let mut by_id = HashMap::with_capacity(dataset.items().len());
    for (pos, item) in dataset.items().iter().enumerate() {
        if let Some(id) = item.site(INDEX_SITE).and_then(|s| s.id()) {
            by_id.insert(id.to_string(), pos);
        }
    }
    IdentifierIndex { by_id }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tests::sample_json;

    fn dataset_with_sites(sites: serde_json::Value) -> Dataset {
        let mut json = sample_json();
        json["items"][1]["sites"] = sites;
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn indexes_items_with_bangumi_association() {
        let dataset: Dataset = serde_json::from_value(sample_json()).unwrap();
        let index = build_index(&dataset);

        assert_eq!(index.len(), 1);
        assert_eq!(index.lookup(&dataset, "55770").unwrap().title, "進撃の巨人");
        assert!(index.lookup(&dataset, "999999").is_none());
    }

    #[test]
    fn first_bangumi_association_wins() {
        let dataset = dataset_with_sites(serde_json::json!([
            { "site": "bangumi", "id": "100" },
            { "site": "bangumi", "id": "200" }
        ]));
        let index = build_index(&dataset);

        assert_eq!(index.position("100"), Some(1));
        assert_eq!(index.position("200"), None);
    }

    #[test]
    fn association_without_id_contributes_nothing() {
        let dataset = dataset_with_sites(serde_json::json!([
            { "site": "bangumi" },
            { "site": "bangumi", "id": "300" }
        ]));
        let index = build_index(&dataset);

        assert_eq!(index.position("300"), None);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn items_without_bangumi_are_absent() {
        let dataset = dataset_with_sites(serde_json::json!([{ "site": "dmhy", "id": "Example" }]));
        let index = build_index(&dataset);

        assert_eq!(index.position("Example"), None);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn later_item_claiming_same_id_wins() {
        let dataset = dataset_with_sites(serde_json::json!([{ "site": "bangumi", "id": "55770" }]));
        let index = build_index(&dataset);

        assert_eq!(index.lookup(&dataset, "55770").unwrap().title, "Example");
    }
}
