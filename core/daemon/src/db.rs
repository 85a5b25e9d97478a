//! SQLite persistence for pawlink-daemon.
//!
//! The daemon is the single writer, so the schema stays small: a tag
//! registry, owner and pet documents stored as JSON, and an append-only
//! scan log. The claim flip is a conditional UPDATE, which is the
//! compare-and-set the claim protocol needs from its store.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use pawlink_core::{
    CoreError, OwnerProfile, OwnerStore, PetRecord, PetStore, Result, ScanEvent, ScanLogStore,
    Tag, TagStatus, TagStore,
};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Db {
    path: PathBuf,
}

impl Db {
    pub fn new(path: PathBuf) -> std::result::Result<Self, String> {
        let db = Self { path };
        db.init_schema()?;
        Ok(db)
    }

    fn with_connection<T>(
        &self,
        f: impl FnOnce(&Connection) -> std::result::Result<T, String>,
    ) -> std::result::Result<T, String> {
        let conn = Connection::open(&self.path)
            .map_err(|err| format!("Failed to open database: {}", err))?;
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|err| format!("Failed to set busy timeout: {}", err))?;
        f(&conn)
    }

    fn init_schema(&self) -> std::result::Result<(), String> {
        self.with_connection(|conn| {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS tags (
                     code TEXT PRIMARY KEY,
                     secret TEXT NOT NULL,
                     status TEXT NOT NULL DEFAULT 'empty'
                 );
                 CREATE TABLE IF NOT EXISTS owners (
                     code TEXT PRIMARY KEY,
                     profile TEXT NOT NULL
                 );
                 CREATE TABLE IF NOT EXISTS pets (
                     code TEXT PRIMARY KEY,
                     record TEXT NOT NULL
                 );
                 CREATE TABLE IF NOT EXISTS scan_log (
                     id TEXT PRIMARY KEY,
                     tag_code TEXT NOT NULL,
                     scanned_at TEXT NOT NULL,
                     payload TEXT NOT NULL
                 );
                 CREATE INDEX IF NOT EXISTS idx_scan_log_code_time
                     ON scan_log (tag_code, scanned_at DESC);",
            )
            .map_err(|err| format!("Failed to initialize schema: {}", err))
        })
    }

    /// Provisioning helper: registers a tag with its packaged PIN,
    /// unclaimed. Existing rows are left alone.
    pub fn insert_tag(&self, code: &str, secret: &str) -> std::result::Result<(), String> {
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO tags (code, secret, status) VALUES (?1, ?2, 'empty')
                 ON CONFLICT(code) DO NOTHING",
                params![code, secret],
            )
            .map_err(|err| format!("Failed to insert tag: {}", err))?;
            Ok(())
        })
    }
}

fn store_err(context: &'static str) -> impl Fn(String) -> CoreError {
    move |details| CoreError::store(context, details)
}

fn parse_status(raw: &str) -> TagStatus {
    match raw {
        "claimed" => TagStatus::Claimed,
        _ => TagStatus::Empty,
    }
}

#[async_trait]
impl TagStore for Db {
    async fn get(&self, code: &str) -> Result<Option<Tag>> {
        self.with_connection(|conn| {
            conn.query_row(
                "SELECT code, secret, status FROM tags WHERE code = ?1",
                params![code],
                |row| {
                    Ok(Tag {
                        code: row.get(0)?,
                        secret: row.get(1)?,
                        status: parse_status(&row.get::<_, String>(2)?),
                    })
                },
            )
            .optional()
            .map_err(|err| format!("Failed to query tag: {}", err))
        })
        .map_err(store_err("tags.get"))
    }

    async fn try_set_claimed(&self, code: &str) -> Result<bool> {
        let changed = self
            .with_connection(|conn| {
                conn.execute(
                    "UPDATE tags SET status = 'claimed' WHERE code = ?1 AND status = 'empty'",
                    params![code],
                )
                .map_err(|err| format!("Failed to claim tag: {}", err))
            })
            .map_err(store_err("tags.claim"))?;

        if changed == 1 {
            return Ok(true);
        }

        // Zero rows means either a lost race or an unknown code; the two
        // are different answers.
        match TagStore::get(self, code).await? {
            Some(_) => Ok(false),
            None => Err(CoreError::InvalidCode(code.to_string())),
        }
    }

    async fn reset_to_empty(&self, code: &str) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute(
                "UPDATE tags SET status = 'empty' WHERE code = ?1",
                params![code],
            )
            .map_err(|err| format!("Failed to reset tag: {}", err))?;
            Ok(())
        })
        .map_err(store_err("tags.reset"))
    }

    async fn set_secret(&self, code: &str, secret: &str) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute(
                "UPDATE tags SET secret = ?2 WHERE code = ?1",
                params![code, secret],
            )
            .map_err(|err| format!("Failed to rotate tag secret: {}", err))?;
            Ok(())
        })
        .map_err(store_err("tags.set_secret"))
    }
}

#[async_trait]
impl OwnerStore for Db {
    async fn get(&self, code: &str) -> Result<Option<OwnerProfile>> {
        self.with_connection(|conn| {
            let profile: Option<String> = conn
                .query_row(
                    "SELECT profile FROM owners WHERE code = ?1",
                    params![code],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|err| format!("Failed to query owner: {}", err))?;

            profile
                .map(|raw| {
                    serde_json::from_str(&raw)
                        .map_err(|err| format!("Failed to parse owner profile: {}", err))
                })
                .transpose()
        })
        .map_err(store_err("owners.get"))
    }

    async fn upsert(&self, owner: &OwnerProfile) -> Result<()> {
        self.with_connection(|conn| {
            let profile = serde_json::to_string(owner)
                .map_err(|err| format!("Failed to serialize owner profile: {}", err))?;
            conn.execute(
                "INSERT INTO owners (code, profile) VALUES (?1, ?2)
                 ON CONFLICT(code) DO UPDATE SET profile = excluded.profile",
                params![owner.username, profile],
            )
            .map_err(|err| format!("Failed to upsert owner: {}", err))?;
            Ok(())
        })
        .map_err(store_err("owners.upsert"))
    }
}

#[async_trait]
impl PetStore for Db {
    async fn get(&self, code: &str) -> Result<Option<PetRecord>> {
        self.with_connection(|conn| {
            let record: Option<String> = conn
                .query_row(
                    "SELECT record FROM pets WHERE code = ?1",
                    params![code],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|err| format!("Failed to query pet: {}", err))?;

            record
                .map(|raw| {
                    serde_json::from_str(&raw)
                        .map_err(|err| format!("Failed to parse pet record: {}", err))
                })
                .transpose()
        })
        .map_err(store_err("pets.get"))
    }

    async fn upsert(&self, pet: &PetRecord) -> Result<()> {
        self.with_connection(|conn| {
            let record = serde_json::to_string(pet)
                .map_err(|err| format!("Failed to serialize pet record: {}", err))?;
            conn.execute(
                "INSERT INTO pets (code, record) VALUES (?1, ?2)
                 ON CONFLICT(code) DO UPDATE SET record = excluded.record",
                params![pet.code, record],
            )
            .map_err(|err| format!("Failed to upsert pet: {}", err))?;
            Ok(())
        })
        .map_err(store_err("pets.upsert"))
    }
}

#[async_trait]
impl ScanLogStore for Db {
    async fn append(&self, event: &ScanEvent) -> Result<String> {
        self.with_connection(|conn| {
            let payload = serde_json::to_string(event)
                .map_err(|err| format!("Failed to serialize scan event: {}", err))?;
            conn.execute(
                "INSERT INTO scan_log (id, tag_code, scanned_at, payload)
                 VALUES (?1, ?2, ?3, ?4)",
                params![event.id, event.tag_code, event.timestamp.to_rfc3339(), payload],
            )
            .map_err(|err| format!("Failed to append scan event: {}", err))?;
            Ok(event.id.clone())
        })
        .map_err(store_err("scan_log.append"))
    }

    async fn list_recent(&self, code: &str, limit: usize) -> Result<Vec<ScanEvent>> {
        self.with_connection(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT payload FROM scan_log WHERE tag_code = ?1
                     ORDER BY scanned_at DESC, id DESC LIMIT ?2",
                )
                .map_err(|err| format!("Failed to prepare scan query: {}", err))?;

            let rows = stmt
                .query_map(params![code, limit as i64], |row| {
                    row.get::<_, String>(0)
                })
                .map_err(|err| format!("Failed to read scan rows: {}", err))?;

            let mut events = Vec::new();
            for row in rows {
                let payload = row.map_err(|err| format!("Failed to decode scan row: {}", err))?;
                let event: ScanEvent = serde_json::from_str(&payload)
                    .map_err(|err| format!("Failed to parse scan payload: {}", err))?;
                events.push(event);
            }
            Ok(events)
        })
        .map_err(store_err("scan_log.list"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, Utc};
    use pawlink_core::{DeviceMeta, Visible};
    use std::sync::Arc;
    use tokio::task::JoinSet;

    fn temp_db() -> (tempfile::TempDir, Db) {
        let temp = tempfile::tempdir().unwrap();
        let db = Db::new(temp.path().join("state.db")).unwrap();
        (temp, db)
    }

    fn scan(code: &str, id: &str, age_secs: i64) -> ScanEvent {
        ScanEvent {
            id: id.to_string(),
            tag_code: code.to_string(),
            timestamp: Utc::now() - ChronoDuration::seconds(age_secs),
            ip_address: None,
            device: DeviceMeta::default(),
            location: None,
            consent_given: false,
        }
    }

    #[tokio::test]
    async fn test_tag_roundtrip() {
        let (_temp, db) = temp_db();
        db.insert_tag("S1A2B3", "482913").unwrap();

        let tag = TagStore::get(&db, "S1A2B3").await.unwrap().unwrap();
        assert_eq!(tag.secret, "482913");
        assert_eq!(tag.status, TagStatus::Empty);
        assert!(TagStore::get(&db, "NOPE").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_insert_tag_does_not_clobber_existing_rows() {
        let (_temp, db) = temp_db();
        db.insert_tag("S1A2B3", "482913").unwrap();
        db.try_set_claimed("S1A2B3").await.unwrap();

        db.insert_tag("S1A2B3", "999999").unwrap();
        let tag = TagStore::get(&db, "S1A2B3").await.unwrap().unwrap();
        assert_eq!(tag.secret, "482913");
        assert_eq!(tag.status, TagStatus::Claimed);
    }

    #[tokio::test]
    async fn test_cas_first_writer_wins() {
        let (_temp, db) = temp_db();
        db.insert_tag("S1A2B3", "482913").unwrap();

        assert!(db.try_set_claimed("S1A2B3").await.unwrap());
        assert!(!db.try_set_claimed("S1A2B3").await.unwrap());
    }

    #[tokio::test]
    async fn test_cas_unknown_code_is_invalid_code() {
        let (_temp, db) = temp_db();
        let err = db.try_set_claimed("NOPE").await.unwrap_err();
        assert_eq!(err.code(), "invalid_code");
    }

    #[tokio::test]
    async fn test_concurrent_cas_has_exactly_one_winner() {
        let (_temp, db) = temp_db();
        db.insert_tag("S1A2B3", "482913").unwrap();
        let db = Arc::new(db);

        let mut tasks = JoinSet::new();
        for _ in 0..8 {
            let db = db.clone();
            tasks.spawn(async move { db.try_set_claimed("S1A2B3").await });
        }

        let mut wins = 0;
        while let Some(result) = tasks.join_next().await {
            if result.unwrap().unwrap() {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);
    }

    #[tokio::test]
    async fn test_owner_and_pet_documents_roundtrip() {
        let (_temp, db) = temp_db();

        let mut owner = OwnerProfile::skeleton("S1A2B3", "482913");
        owner.city = Some("Istanbul".to_string());
        OwnerStore::upsert(&db, &owner).await.unwrap();
        let back = OwnerStore::get(&db, "S1A2B3").await.unwrap().unwrap();
        assert_eq!(back, owner);

        let pet = PetRecord::new("S1A2B3", Visible::public("Pamuk".into()), "cat");
        PetStore::upsert(&db, &pet).await.unwrap();
        let back = PetStore::get(&db, "S1A2B3").await.unwrap().unwrap();
        assert_eq!(back, pet);
    }

    #[tokio::test]
    async fn test_scan_log_is_newest_first_and_limited() {
        let (_temp, db) = temp_db();
        db.append(&scan("S1A2B3", "older", 60)).await.unwrap();
        db.append(&scan("S1A2B3", "newest", 1)).await.unwrap();
        db.append(&scan("S1A2B3", "middle", 30)).await.unwrap();
        db.append(&scan("OTHER1", "foreign", 2)).await.unwrap();

        let events = db.list_recent("S1A2B3", 2).await.unwrap();
        let ids: Vec<&str> = events.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["newest", "middle"]);
    }
}
