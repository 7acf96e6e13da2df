use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::resource::{FieldDef, FieldKind, Resource, ResourceDescriptor};

/// Example game model: integer primary key generated by the store, plus a
/// free-text-filterable username.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Player {
    pub id: Option<i32>,
    pub username: String,
}

#[derive(Debug, Serialize)]
pub struct PlayerRead {
    pub id: i32,
    pub username: String,
}

impl From<Player> for PlayerRead {
    fn from(player: Player) -> Self {
        Self {
            // id is always populated once the row has been persisted
            id: player.id.unwrap_or_default(),
            username: player.username,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PlayerCreate {
    pub username: String,
}

#[derive(Debug, Deserialize)]
pub struct PlayerUpdate {
    pub username: String,
}

static DESCRIPTOR: Lazy<ResourceDescriptor> = Lazy::new(|| {
    ResourceDescriptor::new(
        "player",
        vec![
            FieldDef::primary_key("id", FieldKind::Integer),
            FieldDef::new("username", FieldKind::Text),
        ],
    )
    .expect("invalid player descriptor")
});

impl Resource for Player {
    type Read = PlayerRead;
    type Create = PlayerCreate;
    type Update = PlayerUpdate;

    fn descriptor() -> &'static ResourceDescriptor {
        &DESCRIPTOR
    }

    fn from_create(input: PlayerCreate) -> Self {
        Self {
            id: None,
            username: input.username,
        }
    }

    fn apply_update(&mut self, input: PlayerUpdate) {
        self.username = input.username;
    }

    fn validate(&self) -> Result<(), String> {
        if self.username.trim().is_empty() {
            return Err("username must not be empty".to_string());
        }
        Ok(())
    }
}
