use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEMO_ITEM_ID: &str = "0000-0000";
pub const DEMO_ITEM_CATEGORY: &str = "Azure Cosmos DB for NoSQL";
pub const DEMO_ITEM_NAME: &str = "Distributed NoSQL database service";

/// The document the demo writes and reads back. `category` is the
/// container's partition key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub category: String,
    pub name: String,
}

impl Item {
    pub fn new(
        id: impl Into<String>,
        category: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            category: category.into(),
            name: name.into(),
        }
    }

    /// The fixed item written on every run.
    pub fn demo() -> Self {
        Self::new(DEMO_ITEM_ID, DEMO_ITEM_CATEGORY, DEMO_ITEM_NAME)
    }

    pub fn partition_key(&self) -> &str {
        &self.category
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Item {{ id = {}, category = {}, name = {} }}",
            self.id, self.category, self.name
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_item_is_fixed() {
        let item = Item::demo();
        assert_eq!(item.id, "0000-0000");
        assert_eq!(item.partition_key(), "Azure Cosmos DB for NoSQL");
        assert_eq!(item, Item::demo());
    }

    #[test]
    fn display_lists_every_field() {
        assert_eq!(
            Item::demo().to_string(),
            "Item { id = 0000-0000, category = Azure Cosmos DB for NoSQL, \
             name = Distributed NoSQL database service }"
        );
    }

    #[test]
    fn ignores_system_properties_when_deserializing() {
        let json = serde_json::json!({
            "id": "0000-0000",
            "category": "Azure Cosmos DB for NoSQL",
            "name": "Distributed NoSQL database service",
            "_rid": "abc==",
            "_etag": "\"00000000-0000\"",
            "_ts": 1700000000
        });
        let item: Item = serde_json::from_value(json).unwrap();
        assert_eq!(item, Item::demo());
    }
}
