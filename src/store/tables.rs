//! Row types and the in-transaction table view
//!
//! `Tables` is the handle a transaction closure receives: typed row sets with
//! insert/select/update/delete helpers. The contiguous-position invariant on
//! folder items is maintained by the tree operations, not here; this layer
//! only moves rows.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::StoreError;

/// Row identifier, shared across all tables
pub type Id = i64;

/// Marker for the `"player"` entity type, which carries an extension row
pub const PLAYER_TYPE: &str = "player";

/// What a folder item points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Note,
    Folder,
    Entity,
    Player,
    Item,
    Spell,
}

/// A positioned reference inside a folder.
///
/// `ref_id` is non-owning: removing the item never cascades to the referent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderItemRow {
    pub id: Id,
    pub folder_id: Id,
    #[serde(rename = "type")]
    pub kind: ItemKind,
    pub ref_id: Id,
    pub position: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderRow {
    pub id: Id,
    pub name: String,
    pub is_campaign: bool,
    /// Opaque per-folder settings, passed through untouched
    pub settings: Value,
    pub created_by: Id,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteRow {
    pub id: Id,
    pub title: String,
    pub body: String,
    pub created_by: Id,
}

/// Base entity attributes shared by every entity type
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityRow {
    pub id: Id,
    pub created_by: Id,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub name: String,
    pub hp: i32,
    pub max_hp: i32,
    pub temp_hp: i32,
    pub ac: i32,
    pub speed: i32,
    pub passive_perception: i32,
    pub stats: Value,
    pub spellcasting: Option<Value>,
}

impl EntityRow {
    pub fn is_player(&self) -> bool {
        self.entity_type == PLAYER_TYPE
    }
}

/// Player-specific extension row.
///
/// Shared primary key with its owning entity: `id` always equals the entity's
/// id, and the row is deleted whenever the entity is deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRow {
    pub id: Id,
    pub player_name: String,
    pub level: i32,
    pub character_class: String,
}

/// The full table set visible to a transaction closure
#[derive(Debug, Clone, Default)]
pub struct Tables {
    next_id: Id,
    pub folders: BTreeMap<Id, FolderRow>,
    pub folder_items: BTreeMap<Id, FolderItemRow>,
    pub notes: BTreeMap<Id, NoteRow>,
    pub entities: BTreeMap<Id, EntityRow>,
    pub players: BTreeMap<Id, PlayerRow>,
}

impl Tables {
    /// Allocate the next row id (monotonic, never reused)
    pub fn allocate_id(&mut self) -> Id {
        self.next_id += 1;
        self.next_id
    }

    // ------------------------------------------------------------------
    // Folder items
    // ------------------------------------------------------------------

    /// Items of one folder, ordered by position
    pub fn items_in_folder(&self, folder_id: Id) -> Vec<FolderItemRow> {
        let mut items: Vec<FolderItemRow> = self
            .folder_items
            .values()
            .filter(|i| i.folder_id == folder_id)
            .cloned()
            .collect();
        items.sort_by_key(|i| i.position);
        items
    }

    /// Number of items in a folder (the append position for insert-at-end)
    pub fn item_count(&self, folder_id: Id) -> u32 {
        self.folder_items
            .values()
            .filter(|i| i.folder_id == folder_id)
            .count() as u32
    }

    pub fn folder_item(&self, item_id: Id) -> Option<&FolderItemRow> {
        self.folder_items.get(&item_id)
    }

    pub fn folder_item_mut(&mut self, item_id: Id) -> Result<&mut FolderItemRow, StoreError> {
        self.folder_items
            .get_mut(&item_id)
            .ok_or(StoreError::MissingRow { table: "folder_items" })
    }

    /// The folder item that references `ref_id` with the given kind, if any.
    /// Used to find a folder's attachment point in its parent.
    pub fn item_referencing(&self, kind: ItemKind, ref_id: Id) -> Option<&FolderItemRow> {
        self.folder_items
            .values()
            .find(|i| i.kind == kind && i.ref_id == ref_id)
    }

    /// Shift positions within one folder by `delta` for every item whose
    /// position satisfies `pred`. Mirrors the range updates of a SQL
    /// `UPDATE ... SET position = position + delta WHERE ...`.
    pub fn shift_positions<F>(&mut self, folder_id: Id, pred: F, delta: i64)
    where
        F: Fn(u32) -> bool,
    {
        for item in self.folder_items.values_mut() {
            if item.folder_id == folder_id && pred(item.position) {
                item.position = (i64::from(item.position) + delta) as u32;
            }
        }
    }

    // ------------------------------------------------------------------
    // Folders / notes / entities
    // ------------------------------------------------------------------

    pub fn folder(&self, folder_id: Id) -> Option<&FolderRow> {
        self.folders.get(&folder_id)
    }

    pub fn entity(&self, entity_id: Id) -> Option<&EntityRow> {
        self.entities.get(&entity_id)
    }

    pub fn entity_mut(&mut self, entity_id: Id) -> Result<&mut EntityRow, StoreError> {
        self.entities
            .get_mut(&entity_id)
            .ok_or(StoreError::MissingRow { table: "entities" })
    }

    pub fn player(&self, entity_id: Id) -> Option<&PlayerRow> {
        self.players.get(&entity_id)
    }

    pub fn player_mut(&mut self, entity_id: Id) -> Result<&mut PlayerRow, StoreError> {
        self.players
            .get_mut(&entity_id)
            .ok_or(StoreError::MissingRow { table: "players" })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: Id, folder_id: Id, position: u32) -> FolderItemRow {
        FolderItemRow {
            id,
            folder_id,
            kind: ItemKind::Note,
            ref_id: id + 100,
            position,
        }
    }

    #[test]
    fn test_items_in_folder_ordered_by_position() {
        let mut tables = Tables::default();
        tables.folder_items.insert(1, item(1, 10, 2));
        tables.folder_items.insert(2, item(2, 10, 0));
        tables.folder_items.insert(3, item(3, 10, 1));
        tables.folder_items.insert(4, item(4, 99, 0));

        let items = tables.items_in_folder(10);
        assert_eq!(items.iter().map(|i| i.id).collect::<Vec<_>>(), vec![2, 3, 1]);
        assert_eq!(tables.item_count(10), 3);
        assert_eq!(tables.item_count(99), 1);
    }

    #[test]
    fn test_shift_positions_scoped_to_folder() {
        let mut tables = Tables::default();
        tables.folder_items.insert(1, item(1, 10, 0));
        tables.folder_items.insert(2, item(2, 10, 1));
        tables.folder_items.insert(3, item(3, 20, 1));

        tables.shift_positions(10, |p| p >= 1, 1);

        assert_eq!(tables.folder_item(1).unwrap().position, 0);
        assert_eq!(tables.folder_item(2).unwrap().position, 2);
        // Other folder untouched
        assert_eq!(tables.folder_item(3).unwrap().position, 1);
    }

    #[test]
    fn test_item_kind_wire_names() {
        let json = serde_json::to_string(&ItemKind::Folder).unwrap();
        assert_eq!(json, r#""folder""#);
        let row = item(1, 10, 0);
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["type"], "note");
        assert_eq!(json["folderId"], 10);
        assert_eq!(json["refId"], 101);
    }
}
