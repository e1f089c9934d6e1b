//! Ordered content tree
//!
//! Folders own positioned items (notes, sub-folders, game entities). Within
//! one folder the positions always form the contiguous sequence `0..n` —
//! every mutation here runs as a single transaction so the invariant is never
//! externally observable in a broken state.
//!
//! Folder containment is a directed edge set (a folder item of kind
//! `folder`). Inserting or moving a folder reference verifies the target is
//! not an ancestor of the destination, rejecting cycles as a conflict rather
//! than guessing a correction.

use std::collections::VecDeque;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::store::{FolderItemRow, FolderRow, Id, ItemKind, Store, Tables};
use crate::types::{AppError, Result};

/// A folder item hydrated with its referent's data.
///
/// `data` is `None` when the referent lives in an external store (items,
/// spells) or no longer resolves — never an implicit missing field.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HydratedItem {
    pub id: Id,
    #[serde(rename = "type")]
    pub kind: ItemKind,
    pub ref_id: Id,
    pub position: u32,
    pub data: Option<Value>,
}

/// A folder plus its position-ordered, hydrated contents
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderView {
    pub id: Id,
    pub name: String,
    pub settings: Value,
    pub items: Vec<HydratedItem>,
}

/// Ordered tree store over a transactional backing store
#[derive(Debug)]
pub struct TreeStore<S> {
    store: Arc<S>,
}

impl<S> Clone for TreeStore<S> {
    fn clone(&self) -> Self {
        Self { store: Arc::clone(&self.store) }
    }
}

impl<S: Store> TreeStore<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Create a folder, optionally appending it to a parent folder
    pub async fn create_folder(
        &self,
        name: String,
        created_by: Id,
        settings: Option<Value>,
        parent_folder_id: Option<Id>,
    ) -> Result<FolderRow> {
        self.store
            .transaction(move |tables| {
                if let Some(parent_id) = parent_folder_id {
                    if tables.folder(parent_id).is_none() {
                        return Err(AppError::NotFound(format!("folder {parent_id}")));
                    }
                }

                let folder_id = tables.allocate_id();
                let folder = FolderRow {
                    id: folder_id,
                    name,
                    is_campaign: false,
                    settings: settings.unwrap_or_else(|| Value::Object(Default::default())),
                    created_by,
                };
                tables.folders.insert(folder_id, folder.clone());

                if let Some(parent_id) = parent_folder_id {
                    insert_item_at_end(tables, parent_id, ItemKind::Folder, folder_id)?;
                }

                Ok(folder)
            })
            .await
    }

    /// Append a reference to the end of a folder. O(1): the new position is
    /// the current item count, so no sibling is renumbered.
    pub async fn insert_at_end(
        &self,
        folder_id: Id,
        kind: ItemKind,
        ref_id: Id,
    ) -> Result<FolderItemRow> {
        self.store
            .transaction(move |tables| {
                if tables.folder(folder_id).is_none() {
                    return Err(AppError::NotFound(format!("folder {folder_id}")));
                }
                ensure_referent_exists(tables, kind, ref_id)?;
                if kind == ItemKind::Folder {
                    ensure_not_ancestor(tables, ref_id, folder_id)?;
                }
                insert_item_at_end(tables, folder_id, kind, ref_id)
            })
            .await
    }

    /// Attach an existing entity to a folder, detecting the item kind from
    /// the entity's type.
    pub async fn attach_entity(&self, folder_id: Id, entity_id: Id) -> Result<FolderItemRow> {
        self.store
            .transaction(move |tables| {
                if tables.folder(folder_id).is_none() {
                    return Err(AppError::NotFound(format!("folder {folder_id}")));
                }
                let kind = match tables.entity(entity_id) {
                    Some(e) if e.is_player() => ItemKind::Player,
                    Some(_) => ItemKind::Entity,
                    None => return Err(AppError::NotFound(format!("entity {entity_id}"))),
                };
                insert_item_at_end(tables, folder_id, kind, entity_id)
            })
            .await
    }

    /// Move an item to `new_position` in `to_folder_id`, renumbering every
    /// displaced sibling in the same transaction.
    pub async fn move_item(&self, item_id: Id, to_folder_id: Id, new_position: u32) -> Result<()> {
        self.store
            .transaction(move |tables| {
                let item = tables
                    .folder_item(item_id)
                    .cloned()
                    .ok_or_else(|| AppError::NotFound(format!("item {item_id}")))?;
                if tables.folder(to_folder_id).is_none() {
                    return Err(AppError::NotFound(format!("folder {to_folder_id}")));
                }

                let from_folder_id = item.folder_id;
                let from_position = item.position;
                let same_folder = from_folder_id == to_folder_id;

                // Moving a sub-folder under its own subtree would close a cycle
                if item.kind == ItemKind::Folder && !same_folder {
                    ensure_not_ancestor(tables, item.ref_id, to_folder_id)?;
                }

                let limit = if same_folder {
                    tables.item_count(to_folder_id).saturating_sub(1)
                } else {
                    tables.item_count(to_folder_id)
                };
                if new_position > limit {
                    return Err(AppError::InvalidArgument(format!(
                        "position {new_position} out of range (max {limit})"
                    )));
                }

                if same_folder && new_position == from_position {
                    // Move to own position: no sibling changes
                    return Ok(());
                }

                if same_folder {
                    if new_position > from_position {
                        // Moving forward: pull the in-between items back
                        tables.shift_positions(
                            from_folder_id,
                            |p| p > from_position && p <= new_position,
                            -1,
                        );
                    } else {
                        // Moving backward: push the in-between items forward
                        tables.shift_positions(
                            from_folder_id,
                            |p| p >= new_position && p < from_position,
                            1,
                        );
                    }
                } else {
                    // Close the gap in the source folder
                    tables.shift_positions(from_folder_id, |p| p > from_position, -1);
                    // Open a slot in the destination folder
                    tables.shift_positions(to_folder_id, |p| p >= new_position, 1);
                }

                // Lookups above cloned the row; it vanishing here means a
                // concurrent writer raced us
                let moved = tables
                    .folder_item_mut(item_id)
                    .map_err(|_| AppError::Conflict(format!("item {item_id} disappeared during move")))?;
                moved.folder_id = to_folder_id;
                moved.position = new_position;

                debug!(
                    item = item_id,
                    from = from_folder_id,
                    to = to_folder_id,
                    position = new_position,
                    "moved folder item"
                );
                Ok(())
            })
            .await
    }

    /// Remove an item from its folder and close the position gap. The
    /// referent is not touched.
    pub async fn remove_item(&self, item_id: Id) -> Result<()> {
        self.store
            .transaction(move |tables| {
                let item = tables
                    .folder_items
                    .remove(&item_id)
                    .ok_or_else(|| AppError::NotFound(format!("item {item_id}")))?;
                tables.shift_positions(item.folder_id, |p| p > item.position, -1);
                Ok(())
            })
            .await
    }

    /// Delete a folder and everything beneath it in one transaction.
    ///
    /// Walks the subtree with an explicit work queue rather than recursion,
    /// so arbitrarily deep trees cannot exhaust the stack. Note referents are
    /// owned by their folder and are deleted; entity/item/spell referents are
    /// non-owning references and survive.
    pub async fn delete_folder_recursive(&self, folder_id: Id) -> Result<()> {
        self.store
            .transaction(move |tables| {
                if tables.folder(folder_id).is_none() {
                    return Err(AppError::NotFound(format!("folder {folder_id}")));
                }

                // Detach from the parent first, renumbering the siblings
                if let Some(parent_item) = tables.item_referencing(ItemKind::Folder, folder_id) {
                    let parent_item = parent_item.clone();
                    tables.folder_items.remove(&parent_item.id);
                    tables.shift_positions(parent_item.folder_id, |p| p > parent_item.position, -1);
                }

                let mut queue = VecDeque::from([folder_id]);
                let mut deleted_items = 0usize;
                while let Some(current) = queue.pop_front() {
                    for item in tables.items_in_folder(current) {
                        match item.kind {
                            ItemKind::Note => {
                                tables.notes.remove(&item.ref_id);
                            }
                            ItemKind::Folder => {
                                queue.push_back(item.ref_id);
                            }
                            // Non-owning references: the referent survives
                            ItemKind::Entity | ItemKind::Player | ItemKind::Item | ItemKind::Spell => {}
                        }
                        tables.folder_items.remove(&item.id);
                        deleted_items += 1;
                    }
                    tables.folders.remove(&current);
                }

                debug!(folder = folder_id, items = deleted_items, "deleted folder subtree");
                Ok(())
            })
            .await
    }

    /// A folder with its items in position order, each hydrated with the
    /// referent's data where this store owns the referent.
    pub async fn folder_contents(&self, folder_id: Id) -> Result<FolderView> {
        self.store
            .read(move |tables| {
                let folder = tables
                    .folder(folder_id)
                    .ok_or_else(|| AppError::NotFound(format!("folder {folder_id}")))?;

                let items = tables
                    .items_in_folder(folder_id)
                    .into_iter()
                    .map(|item| {
                        let data = hydrate(tables, &item);
                        HydratedItem {
                            id: item.id,
                            kind: item.kind,
                            ref_id: item.ref_id,
                            position: item.position,
                            data,
                        }
                    })
                    .collect();

                Ok(FolderView {
                    id: folder.id,
                    name: folder.name.clone(),
                    settings: folder.settings.clone(),
                    items,
                })
            })
            .await
    }
}

/// Resolve an item's referent to JSON, one explicit case per tag.
/// Items and spells live in an external store; their data is `None` here.
fn hydrate(tables: &Tables, item: &FolderItemRow) -> Option<Value> {
    match item.kind {
        ItemKind::Note => tables
            .notes
            .get(&item.ref_id)
            .and_then(|n| serde_json::to_value(n).ok()),
        ItemKind::Folder => tables
            .folders
            .get(&item.ref_id)
            .and_then(|f| serde_json::to_value(f).ok()),
        ItemKind::Entity | ItemKind::Player => tables
            .entity(item.ref_id)
            .and_then(|e| serde_json::to_value(e).ok()),
        ItemKind::Item | ItemKind::Spell => None,
    }
}

fn insert_item_at_end(
    tables: &mut Tables,
    folder_id: Id,
    kind: ItemKind,
    ref_id: Id,
) -> Result<FolderItemRow> {
    let position = tables.item_count(folder_id);
    let id = tables.allocate_id();
    let row = FolderItemRow { id, folder_id, kind, ref_id, position };
    tables.folder_items.insert(id, row.clone());
    Ok(row)
}

/// Verify the referent of a new item exists in the tables this store owns.
/// Item and spell referents belong to an external store and are taken on
/// trust.
fn ensure_referent_exists(tables: &Tables, kind: ItemKind, ref_id: Id) -> Result<()> {
    let exists = match kind {
        ItemKind::Note => tables.notes.contains_key(&ref_id),
        ItemKind::Folder => tables.folders.contains_key(&ref_id),
        ItemKind::Entity | ItemKind::Player => tables.entities.contains_key(&ref_id),
        ItemKind::Item | ItemKind::Spell => true,
    };
    if exists {
        Ok(())
    } else {
        Err(AppError::NotFound(format!("{kind:?} {ref_id}").to_lowercase()))
    }
}

/// Reject containment that would make `candidate` an ancestor of itself:
/// `candidate` must not be `container` nor any ancestor of it.
fn ensure_not_ancestor(tables: &Tables, candidate: Id, container: Id) -> Result<()> {
    let mut current = container;
    let mut hops = 0u32;
    loop {
        if current == candidate {
            return Err(AppError::Conflict(format!(
                "folder {candidate} is an ancestor of folder {container}"
            )));
        }
        match tables.item_referencing(ItemKind::Folder, current) {
            Some(edge) => {
                current = edge.folder_id;
                hops += 1;
                // A walk this long means the edge set is already cyclic
                if hops > 10_000 {
                    return Err(AppError::Conflict("containment cycle detected".into()));
                }
            }
            None => return Ok(()),
        }
    }
}
