//! Room directory: resolves the rooms visible to a user into display-ready
//! summaries.
//!
//! Membership rows union the well-known general room; direct-message rooms
//! overlay the counterpart's name and avatar. A missing general room is
//! created on the spot (a missing shared resource must not be fatal for any
//! caller), and a failed per-room enrichment degrades that one room to a
//! placeholder instead of failing the whole listing.

use std::sync::Arc;

use chat_core::{
    ChatStore, LastMessage, Profile, Result, Room, RoomSummary, GENERAL_ROOM_ID,
};
use tracing::{error, info, warn};

/// Label shown for a direct room whose counterpart could not be resolved.
const DM_PLACEHOLDER: &str = "Direct message";

/// Fallback author label for previews when the profile row is missing.
const UNKNOWN_SENDER: &str = "Unknown";

pub struct RoomDirectory {
    store: Arc<dyn ChatStore>,
}

impl RoomDirectory {
    pub fn new(store: Arc<dyn ChatStore>) -> Self {
        Self { store }
    }

    /// Lists the user's rooms, last activity first.
    pub async fn list_rooms(&self, user: &Profile) -> Result<Vec<RoomSummary>> {
        let mut room_ids = self.store.participant_room_ids(user.id).await?;
        if !room_ids.contains(&GENERAL_ROOM_ID) {
            room_ids.push(GENERAL_ROOM_ID);
        }

        let mut rooms = self.store.rooms_by_ids(&room_ids).await?;

        // Self-heal: the general room must exist for everybody.
        if !rooms.iter().any(|r| r.id == GENERAL_ROOM_ID) {
            info!("General room missing, attempting to create");
            let general = Room::general(user.id);
            match self.store.insert_room(&general).await {
                Ok(()) => rooms.push(general),
                // Likely lost a race with another client's self-heal; the
                // next listing will see the winner's row.
                Err(e) => error!(error = %e, "Failed to auto-create general room"),
            }
        }

        let mut summaries = Vec::with_capacity(rooms.len());
        for room in rooms {
            summaries.push(self.summarize(user, room).await);
        }
        summaries.sort_by(|a, b| b.room.updated_at.cmp(&a.room.updated_at));

        info!(user_id = %user.id, rooms = summaries.len(), "Room directory listed");
        Ok(summaries)
    }

    /// Builds one display-ready summary. Enrichment failures degrade the row,
    /// never the listing.
    async fn summarize(&self, user: &Profile, room: Room) -> RoomSummary {
        let mut display_name = room
            .name
            .clone()
            .unwrap_or_else(|| DM_PLACEHOLDER.to_string());
        let mut image_url = room.image_url.clone();

        if !room.is_group {
            match self.store.other_participant(room.id, user.id).await {
                Ok(Some(counterpart)) => {
                    display_name = counterpart.full_name;
                    image_url = counterpart.avatar_url;
                }
                Ok(None) => {
                    warn!(room_id = %room.id, "Direct room has no counterpart, using placeholder");
                }
                Err(e) => {
                    warn!(room_id = %room.id, error = %e, "Counterpart lookup failed, using placeholder");
                }
            }
        }

        let last_message = match self.store.last_message_in_room(room.id).await {
            Ok(found) => found.map(|m| LastMessage {
                content: m.content,
                sender: m
                    .sender
                    .map(|p| p.full_name)
                    .unwrap_or_else(|| UNKNOWN_SENDER.to_string()),
                sent_at: m.created_at,
            }),
            Err(e) => {
                warn!(room_id = %room.id, error = %e, "Preview lookup failed");
                None
            }
        };

        RoomSummary {
            room,
            display_name,
            image_url,
            last_message,
        }
    }
}
