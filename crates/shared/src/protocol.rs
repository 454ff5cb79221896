use serde::{Deserialize, Serialize};

use crate::domain::{Item, ItemId, ItemName, NameError};

/// Items collection path, relative to the server root.
pub const ITEMS_PATH: &str = "api/items";

/// A listed item as sent by the server. The name is validated separately so
/// one bad entry does not fail the whole listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListedItem {
    pub id: ItemId,
    pub name: String,
    #[serde(default)]
    pub checked: bool,
}

impl TryFrom<ListedItem> for Item {
    type Error = NameError;

    fn try_from(value: ListedItem) -> Result<Self, Self::Error> {
        Ok(Item {
            id: value.id,
            name: ItemName::try_from(value.name)?,
            checked: value.checked,
        })
    }
}

impl From<Item> for ListedItem {
    fn from(value: Item) -> Self {
        Self {
            id: value.id,
            name: value.name.into(),
            checked: value.checked,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListItemsResponse {
    #[serde(default)]
    pub items: Vec<ListedItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateItemRequest {
    pub name: ItemName,
}

/// Servers answer a create with either `{ "id": .. }` or the full item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateItemResponse {
    pub id: ItemId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<ItemName>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checked: Option<bool>,
}

impl CreateItemResponse {
    /// Completes the created item from the submitted name when the server
    /// only echoed the id.
    pub fn into_item(self, submitted: ItemName) -> Item {
        Item {
            id: self.id,
            name: self.name.unwrap_or(submitted),
            checked: self.checked.unwrap_or(false),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateItemRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<ItemName>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checked: Option<bool>,
}

impl UpdateItemRequest {
    pub fn checked(checked: bool) -> Self {
        Self {
            name: None,
            checked: Some(checked),
        }
    }
}
