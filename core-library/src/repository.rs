//! Library repository trait and SQLite implementation

use async_trait::async_trait;
use sqlx::{FromRow, SqlitePool};
use std::collections::BTreeMap;

use crate::error::{LibraryError, Result};
use crate::models::{ServerLibrary, TrackRecord};

/// A set of track mutations applied together with a version change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LibraryChange {
    /// Drop every stored track and store exactly these
    Replace(Vec<TrackRecord>),
    /// Upsert and delete individual tracks
    Patch {
        upserts: Vec<TrackRecord>,
        deletes: Vec<String>,
    },
}

/// Persistence for per-user libraries.
#[async_trait]
pub trait LibraryRepository: Send + Sync {
    /// Load a user's library.
    ///
    /// # Returns
    /// - `Ok(None)` if the user never submitted anything
    async fn load(&self, user_id: &str) -> Result<Option<ServerLibrary>>;

    /// Apply `change` and set the stored version to `version` atomically.
    ///
    /// Either everything is persisted or nothing is.
    async fn commit(&self, user_id: &str, version: u64, change: &LibraryChange) -> Result<()>;

    /// Whether `version` was accepted for `user_id` at any point.
    async fn was_accepted(&self, user_id: &str, version: u64) -> Result<bool>;

    /// Number of users with a library.
    async fn count_libraries(&self) -> Result<i64>;
}

/// SQLite implementation of [`LibraryRepository`]
pub struct SqliteLibraryRepository {
    pool: SqlitePool,
}

impl SqliteLibraryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct TrackRow {
    track_id: String,
    rel_path: String,
    stream_path: String,
    title: String,
    artist: String,
    album: String,
    duration_ms: Option<i64>,
    file_size: i64,
    mtime_ms: i64,
    content_hash: String,
}

impl From<TrackRow> for TrackRecord {
    fn from(row: TrackRow) -> Self {
        Self {
            track_id: row.track_id,
            rel_path: row.rel_path,
            stream_path: row.stream_path,
            title: row.title,
            artist: row.artist,
            album: row.album,
            duration_ms: row.duration_ms.map(|d| d.max(0) as u64),
            file_size: row.file_size.max(0) as u64,
            mtime_ms: row.mtime_ms,
            content_hash: row.content_hash,
        }
    }
}

fn to_db_int(field: &str, value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| LibraryError::InvalidInput {
        field: field.to_string(),
        message: format!("{} does not fit in storage", value),
    })
}

async fn upsert_track(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    user_id: &str,
    track: &TrackRecord,
) -> Result<()> {
    let duration_ms = track
        .duration_ms
        .map(|d| to_db_int("duration_ms", d))
        .transpose()?;

    sqlx::query(
        r#"
        INSERT INTO library_tracks (
            user_id, track_id, rel_path, stream_path, title, artist, album,
            duration_ms, file_size, mtime_ms, content_hash
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(user_id, track_id) DO UPDATE SET
            rel_path = excluded.rel_path,
            stream_path = excluded.stream_path,
            title = excluded.title,
            artist = excluded.artist,
            album = excluded.album,
            duration_ms = excluded.duration_ms,
            file_size = excluded.file_size,
            mtime_ms = excluded.mtime_ms,
            content_hash = excluded.content_hash
        "#,
    )
    .bind(user_id)
    .bind(&track.track_id)
    .bind(&track.rel_path)
    .bind(&track.stream_path)
    .bind(&track.title)
    .bind(&track.artist)
    .bind(&track.album)
    .bind(duration_ms)
    .bind(to_db_int("file_size", track.file_size)?)
    .bind(track.mtime_ms)
    .bind(&track.content_hash)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

#[async_trait]
impl LibraryRepository for SqliteLibraryRepository {
    async fn load(&self, user_id: &str) -> Result<Option<ServerLibrary>> {
        let version: Option<(i64,)> =
            sqlx::query_as("SELECT version FROM libraries WHERE user_id = ?")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        let Some((version,)) = version else {
            return Ok(None);
        };

        let rows = sqlx::query_as::<_, TrackRow>(
            r#"
            SELECT track_id, rel_path, stream_path, title, artist, album,
                   duration_ms, file_size, mtime_ms, content_hash
            FROM library_tracks
            WHERE user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let tracks: BTreeMap<String, TrackRecord> = rows
            .into_iter()
            .map(TrackRecord::from)
            .map(|track| (track.track_id.clone(), track))
            .collect();

        Ok(Some(ServerLibrary {
            user_id: user_id.to_string(),
            version: version.max(0) as u64,
            tracks,
        }))
    }

    async fn commit(&self, user_id: &str, version: u64, change: &LibraryChange) -> Result<()> {
        let version = to_db_int("library_version", version)?;
        let now = chrono::Utc::now().timestamp_millis();

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO libraries (user_id, version, updated_at) VALUES (?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                version = excluded.version,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(user_id)
        .bind(version)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO library_versions (user_id, version, is_replace, accepted_at) VALUES (?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(version)
        .bind(matches!(change, LibraryChange::Replace(_)))
        .bind(now)
        .execute(&mut *tx)
        .await?;

        match change {
            LibraryChange::Replace(tracks) => {
                sqlx::query("DELETE FROM library_tracks WHERE user_id = ?")
                    .bind(user_id)
                    .execute(&mut *tx)
                    .await?;
                for track in tracks {
                    upsert_track(&mut tx, user_id, track).await?;
                }
            }
            LibraryChange::Patch { upserts, deletes } => {
                for track in upserts {
                    upsert_track(&mut tx, user_id, track).await?;
                }
                for track_id in deletes {
                    sqlx::query("DELETE FROM library_tracks WHERE user_id = ? AND track_id = ?")
                        .bind(user_id)
                        .bind(track_id)
                        .execute(&mut *tx)
                        .await?;
                }
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn was_accepted(&self, user_id: &str, version: u64) -> Result<bool> {
        let Ok(version) = i64::try_from(version) else {
            return Ok(false);
        };
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM library_versions WHERE user_id = ? AND version = ?")
                .bind(user_id)
                .bind(version)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.is_some())
    }

    async fn count_libraries(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM libraries")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use crate::models::{encode_rel_path, track_id_for};

    fn record(rel_path: &str, hash: &str) -> TrackRecord {
        TrackRecord {
            track_id: track_id_for(rel_path),
            rel_path: rel_path.to_string(),
            stream_path: encode_rel_path(rel_path),
            title: rel_path.to_string(),
            artist: "Unknown".to_string(),
            album: "Unknown".to_string(),
            duration_ms: None,
            file_size: 3,
            mtime_ms: 42,
            content_hash: hash.to_string(),
        }
    }

    async fn repository() -> SqliteLibraryRepository {
        SqliteLibraryRepository::new(create_test_pool().await.unwrap())
    }

    #[tokio::test]
    async fn test_load_missing_library() {
        let repo = repository().await;
        assert!(repo.load("nobody").await.unwrap().is_none());
        assert_eq!(repo.count_libraries().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_replace_then_load() {
        let repo = repository().await;
        let tracks = vec![record("a.mp3", "h1"), record("b.mp3", "h2")];
        repo.commit("alice", 1000, &LibraryChange::Replace(tracks.clone()))
            .await
            .unwrap();

        let library = repo.load("alice").await.unwrap().unwrap();
        assert_eq!(library.version, 1000);
        assert_eq!(library.tracks.len(), 2);
        assert_eq!(library.tracks[&tracks[0].track_id], tracks[0]);
    }

    #[tokio::test]
    async fn test_patch_upserts_and_deletes() {
        let repo = repository().await;
        repo.commit(
            "alice",
            1000,
            &LibraryChange::Replace(vec![record("a.mp3", "h1"), record("b.mp3", "h2")]),
        )
        .await
        .unwrap();

        repo.commit(
            "alice",
            1001,
            &LibraryChange::Patch {
                upserts: vec![record("a.mp3", "h9"), record("c.mp3", "h3")],
                deletes: vec![track_id_for("b.mp3"), "missing".to_string()],
            },
        )
        .await
        .unwrap();

        let library = repo.load("alice").await.unwrap().unwrap();
        assert_eq!(library.version, 1001);
        let hashes: Vec<&str> = library
            .tracks_by_path()
            .iter()
            .map(|t| t.content_hash.as_str())
            .collect();
        assert_eq!(hashes, vec!["h9", "h3"]);
    }

    #[tokio::test]
    async fn test_empty_replace_keeps_library_row() {
        let repo = repository().await;
        repo.commit("alice", 5, &LibraryChange::Replace(vec![record("a.mp3", "h")]))
            .await
            .unwrap();
        repo.commit("alice", 6, &LibraryChange::Replace(vec![]))
            .await
            .unwrap();

        let library = repo.load("alice").await.unwrap().unwrap();
        assert_eq!(library.version, 6);
        assert!(library.tracks.is_empty());
    }

    #[tokio::test]
    async fn test_users_are_isolated() {
        let repo = repository().await;
        repo.commit("alice", 1, &LibraryChange::Replace(vec![record("a.mp3", "h")]))
            .await
            .unwrap();
        repo.commit("bob", 1, &LibraryChange::Replace(vec![]))
            .await
            .unwrap();

        assert_eq!(repo.load("bob").await.unwrap().unwrap().tracks.len(), 0);
        assert_eq!(repo.load("alice").await.unwrap().unwrap().tracks.len(), 1);
        assert_eq!(repo.count_libraries().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_accepted_versions_are_remembered() {
        let repo = repository().await;
        repo.commit("alice", 1000, &LibraryChange::Replace(vec![record("a.mp3", "h1")]))
            .await
            .unwrap();
        repo.commit(
            "alice",
            1001,
            &LibraryChange::Patch {
                upserts: vec![record("a.mp3", "h2")],
                deletes: vec![],
            },
        )
        .await
        .unwrap();

        assert!(repo.was_accepted("alice", 1000).await.unwrap());
        assert!(repo.was_accepted("alice", 1001).await.unwrap());
        assert!(!repo.was_accepted("alice", 999).await.unwrap());
        assert!(!repo.was_accepted("bob", 1000).await.unwrap());
        assert!(!repo.was_accepted("alice", u64::MAX).await.unwrap());
    }

    #[tokio::test]
    async fn test_failed_commit_changes_nothing() {
        let repo = repository().await;
        repo.commit("alice", 1, &LibraryChange::Replace(vec![record("a.mp3", "h")]))
            .await
            .unwrap();

        let mut oversized = record("b.mp3", "h");
        oversized.file_size = u64::MAX;
        let result = repo
            .commit("alice", 2, &LibraryChange::Replace(vec![oversized]))
            .await;
        assert!(matches!(result, Err(LibraryError::InvalidInput { .. })));

        let library = repo.load("alice").await.unwrap().unwrap();
        assert_eq!(library.version, 1);
        assert_eq!(library.tracks.len(), 1);
    }
}
