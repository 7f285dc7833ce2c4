use std::io;
use std::path::Path;

use serde::Deserialize;
use ulid::Ulid;

use crate::engine::{Engine, EngineError};

/// Initial directory contents, read from JSON.
///
/// ```json
/// { "rooms": [{ "name": "Lecture Theatre", "capacity": 120 }],
///   "organisers": [{ "name": "Ada", "username": "ada" }],
///   "attendees": [{ "name": "Grace", "username": "grace" }] }
/// ```
#[derive(Debug, Default, Deserialize)]
pub struct Seed {
    #[serde(default)]
    pub rooms: Vec<SeedRoom>,
    #[serde(default)]
    pub organisers: Vec<SeedUser>,
    #[serde(default)]
    pub attendees: Vec<SeedUser>,
}

#[derive(Debug, Deserialize)]
pub struct SeedRoom {
    pub name: String,
    pub capacity: u32,
}

#[derive(Debug, Deserialize)]
pub struct SeedUser {
    pub name: String,
    pub username: String,
}

impl Seed {
    pub fn load(path: &Path) -> io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> io::Result<Self> {
        serde_json::from_str(text).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// Create every record with a fresh id. Stops at the first rejection.
    pub async fn apply(&self, engine: &Engine) -> Result<usize, EngineError> {
        for room in &self.rooms {
            engine
                .create_room(Ulid::new(), room.name.clone(), room.capacity)
                .await?;
        }
        for user in &self.organisers {
            engine
                .create_organiser(Ulid::new(), user.name.clone(), user.username.clone())
                .await?;
        }
        for user in &self.attendees {
            engine
                .create_attendee(Ulid::new(), user.name.clone(), user.username.clone())
                .await?;
        }
        Ok(self.rooms.len() + self.organisers.len() + self.attendees.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::User;

    fn test_wal_path(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join("roombook_test_seed");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    #[test]
    fn missing_sections_default_to_empty() {
        let seed = Seed::parse(r#"{ "rooms": [{ "name": "A", "capacity": 3 }] }"#).unwrap();
        assert_eq!(seed.rooms.len(), 1);
        assert!(seed.organisers.is_empty());
        assert!(seed.attendees.is_empty());
    }

    #[test]
    fn malformed_json_is_invalid_data() {
        let err = Seed::parse("{ rooms: ").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn apply_populates_directory() {
        let engine = Engine::open(&test_wal_path("apply.wal")).unwrap();
        let seed = Seed::parse(
            r#"{
                "rooms": [{ "name": "Main Hall", "capacity": 50 }, { "name": "Lab", "capacity": 2 }],
                "organisers": [{ "name": "Ada Lovelace", "username": "ada" }],
                "attendees": [{ "name": "Grace Hopper", "username": "grace" }]
            }"#,
        )
        .unwrap();

        assert_eq!(seed.apply(&engine).await.unwrap(), 4);
        assert_eq!(engine.list_rooms().await.len(), 2);
        assert!(matches!(engine.find_user_by_username("ada"), Some(User::Organiser(_))));
        assert!(matches!(engine.find_user_by_username("grace"), Some(User::Attendee(_))));
    }

    #[tokio::test]
    async fn apply_rejects_zero_capacity_room() {
        let engine = Engine::open(&test_wal_path("zero_cap.wal")).unwrap();
        let seed = Seed::parse(r#"{ "rooms": [{ "name": "Closet", "capacity": 0 }] }"#).unwrap();
        assert!(matches!(seed.apply(&engine).await, Err(EngineError::InvalidInput(_))));
    }
}
