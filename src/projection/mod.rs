//! Entity projections
//!
//! A projection is the flattened, client-facing view of one entity: the base
//! combat attributes merged with the player extension (level, class) when the
//! entity is a player character. The internal `type` tag never leaves this
//! layer.

use std::sync::Arc;

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::store::{Id, Store};
use crate::types::{AppError, Result};

/// Client-facing entity view.
///
/// `level` and `character_class` are present only for player characters;
/// they are omitted from the serialized form otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Projection {
    pub id: Id,
    pub name: String,
    pub hp: i32,
    pub max_hp: i32,
    pub temp_hp: i32,
    pub ac: i32,
    pub speed: i32,
    pub passive_perception: i32,
    pub stats: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spellcasting: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub character_class: Option<String>,
}

/// Partial update to an entity's base attributes. Absent fields are left
/// untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hp: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_hp: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_hp: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ac: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passive_perception: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spellcasting: Option<Value>,
}

impl EntityPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.hp.is_none()
            && self.max_hp.is_none()
            && self.temp_hp.is_none()
            && self.ac.is_none()
            && self.speed.is_none()
            && self.passive_perception.is_none()
            && self.stats.is_none()
            && self.spellcasting.is_none()
    }
}

/// Partial update to a player extension row
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub character_class: Option<String>,
}

impl PlayerPatch {
    pub fn is_empty(&self) -> bool {
        self.player_name.is_none() && self.level.is_none() && self.character_class.is_none()
    }
}

/// Builds projections and applies partial updates over the backing store
#[derive(Debug)]
pub struct ProjectionService<S> {
    store: Arc<S>,
}

impl<S> Clone for ProjectionService<S> {
    fn clone(&self) -> Self {
        Self { store: Arc::clone(&self.store) }
    }
}

impl<S: Store> ProjectionService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Project one entity, merging the player extension when present
    pub async fn get_summary(&self, entity_id: Id) -> Result<Projection> {
        self.store
            .read(move |tables| {
                let entity = tables
                    .entity(entity_id)
                    .ok_or_else(|| AppError::NotFound(format!("entity {entity_id}")))?;
                let player = if entity.is_player() {
                    Some(tables.player(entity_id).cloned().ok_or_else(|| {
                        AppError::Conflict(format!(
                            "entity {entity_id} is a player but has no player record"
                        ))
                    })?)
                } else {
                    None
                };

                Ok(Projection {
                    id: entity.id,
                    name: entity.name.clone(),
                    hp: entity.hp,
                    max_hp: entity.max_hp,
                    temp_hp: entity.temp_hp,
                    ac: entity.ac,
                    speed: entity.speed,
                    passive_perception: entity.passive_perception,
                    stats: entity.stats.clone(),
                    spellcasting: entity.spellcasting.clone(),
                    level: player.as_ref().map(|p| p.level),
                    character_class: player.map(|p| p.character_class),
                })
            })
            .await
    }

    /// Project a batch of entities concurrently. Entities that fail to
    /// resolve are logged and omitted rather than failing the batch.
    pub async fn batch_fetch(&self, entity_ids: &[Id]) -> Vec<Projection> {
        let results = join_all(entity_ids.iter().map(|&id| self.get_summary(id))).await;
        results
            .into_iter()
            .zip(entity_ids)
            .filter_map(|(result, id)| match result {
                Ok(projection) => Some(projection),
                Err(e) => {
                    warn!(entity = id, error = %e, "dropping unresolvable entity from batch");
                    None
                }
            })
            .collect()
    }

    /// Apply a partial update to an entity's base attributes and, when given,
    /// its player extension. One transaction: either both rows update or
    /// neither does. Returns the post-update projection.
    pub async fn apply_partial_update(
        &self,
        entity_id: Id,
        entity_patch: EntityPatch,
        player_patch: Option<PlayerPatch>,
    ) -> Result<Projection> {
        let no_player_fields = player_patch.as_ref().map(|p| p.is_empty()).unwrap_or(true);
        if entity_patch.is_empty() && no_player_fields {
            return Err(AppError::InvalidArgument("no fields to update".into()));
        }

        self.store
            .transaction(move |tables| {
                let entity = tables
                    .entities
                    .get_mut(&entity_id)
                    .ok_or_else(|| AppError::NotFound(format!("entity {entity_id}")))?;

                if let Some(name) = entity_patch.name {
                    entity.name = name;
                }
                if let Some(hp) = entity_patch.hp {
                    entity.hp = hp;
                }
                if let Some(max_hp) = entity_patch.max_hp {
                    entity.max_hp = max_hp;
                }
                if let Some(temp_hp) = entity_patch.temp_hp {
                    entity.temp_hp = temp_hp;
                }
                if let Some(ac) = entity_patch.ac {
                    entity.ac = ac;
                }
                if let Some(speed) = entity_patch.speed {
                    entity.speed = speed;
                }
                if let Some(pp) = entity_patch.passive_perception {
                    entity.passive_perception = pp;
                }
                if let Some(stats) = entity_patch.stats {
                    entity.stats = stats;
                }
                if let Some(spellcasting) = entity_patch.spellcasting {
                    entity.spellcasting = Some(spellcasting);
                }

                let is_player = entity.is_player();
                let entity = entity.clone();

                let player = match (player_patch, is_player) {
                    (Some(patch), true) if !patch.is_empty() => {
                        let player = tables.players.get_mut(&entity_id).ok_or_else(|| {
                            AppError::Conflict(format!(
                                "entity {entity_id} is a player but has no player record"
                            ))
                        })?;
                        if let Some(player_name) = patch.player_name {
                            player.player_name = player_name;
                        }
                        if let Some(level) = patch.level {
                            player.level = level;
                        }
                        if let Some(character_class) = patch.character_class {
                            player.character_class = character_class;
                        }
                        Some(player.clone())
                    }
                    (Some(patch), false) if !patch.is_empty() => {
                        // Player fields against a non-player entity mean the
                        // caller's view of this entity is stale
                        return Err(AppError::Conflict(format!(
                            "entity {entity_id} is not a player character"
                        )));
                    }
                    _ => {
                        if is_player {
                            tables.player(entity_id).cloned()
                        } else {
                            None
                        }
                    }
                };

                Ok(Projection {
                    id: entity.id,
                    name: entity.name,
                    hp: entity.hp,
                    max_hp: entity.max_hp,
                    temp_hp: entity.temp_hp,
                    ac: entity.ac,
                    speed: entity.speed,
                    passive_perception: entity.passive_perception,
                    stats: entity.stats,
                    spellcasting: entity.spellcasting,
                    level: player.as_ref().map(|p| p.level),
                    character_class: player.map(|p| p.character_class),
                })
            })
            .await
    }
}
