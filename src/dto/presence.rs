use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::{Validate, ValidationErrors};

use crate::dto::validation::{validate_identifier, validate_text};

const MAX_NAME_LENGTH: usize = 40;

/// Viewer entering a room.
#[derive(Debug, Deserialize, ToSchema)]
pub struct JoinRequest {
    pub client_id: String,
    pub name: String,
}

impl Validate for JoinRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if let Err(e) = validate_identifier(&self.client_id) {
            errors.add("client_id", e);
        }
        if let Err(e) = validate_text(&self.name, MAX_NAME_LENGTH) {
            errors.add("name", e);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Optional viewer identity on a room stream. With both fields set the
/// connection itself keeps the viewer counted until it closes.
#[derive(Debug, Default, Deserialize)]
pub struct RoomStreamQuery {
    pub client_id: Option<String>,
    pub name: Option<String>,
}

impl RoomStreamQuery {
    /// The viewer to attach, when both fields are present.
    pub fn viewer(self) -> Option<JoinRequest> {
        match (self.client_id, self.name) {
            (Some(client_id), Some(name)) => Some(JoinRequest { client_id, name }),
            _ => None,
        }
    }
}

/// Active viewers of a room.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PresenceCount {
    pub room_id: String,
    pub active: usize,
}
