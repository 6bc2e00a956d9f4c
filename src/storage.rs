//! SQLite storage layer for DisasterZone.
//!
//! Holds incidents, user presence, the proximity alert log (the persisted
//! dedup set), comments, likes and interaction notifications.
//!
//! Two operations carry concurrency guarantees that the alerting layer
//! relies on:
//!
//! - [`Storage::mark_inactive`] is a compare-and-set on `status`, so only
//!   one caller can end a given incident.
//! - [`Storage::claim_alert`] inserts into a table keyed by
//!   `(incident_id, user_id)`, so each alert is claimed exactly once, and
//!   only while the stored incident is still active.

use std::collections::HashSet;

use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};

use crate::error::{Error, Result};
use crate::geo::GeoCoordinate;
use crate::lifecycle::EXPIRY_WINDOW_MS;
use crate::model::{
    AlertKey, Comment, DeliveredAlert, Incident, IncidentStatus, Notification, UserPresence,
};

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    /// Create a new storage instance and initialize the schema.
    ///
    /// # Arguments
    ///
    /// * `database_url` - SQLite connection string (e.g., "sqlite:disasterzone.db" or "sqlite::memory:")
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let mut options = SqlitePoolOptions::new().max_connections(5);
        if database_url.contains(":memory:") {
            // Every connection to an in-memory database sees its own empty
            // database, so the pool must hold exactly one and never recycle it.
            options = options
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }

        let pool = options.connect(database_url).await?;

        let storage = Self { pool };
        storage.initialize_schema().await?;

        Ok(storage)
    }

    /// Create the database schema if it doesn't exist.
    async fn initialize_schema(&self) -> anyhow::Result<()> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS incidents (
                id TEXT PRIMARY KEY,
                reporter_id TEXT NOT NULL,
                reporter_name TEXT NOT NULL,
                latitude REAL NOT NULL,
                longitude REAL NOT NULL,
                description TEXT NOT NULL,
                image_base64 TEXT,
                created_at INTEGER NOT NULL,
                status TEXT NOT NULL,
                ended_at INTEGER,
                ended_by TEXT
            )
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS idx_incidents_status_ended
            ON incidents(status, ended_at)
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS presence (
                user_id TEXT PRIMARY KEY,
                latitude REAL,
                longitude REAL,
                updated_at INTEGER NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS alert_log (
                incident_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                notified_at INTEGER NOT NULL,
                PRIMARY KEY (incident_id, user_id)
            )
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS idx_alert_log_user
            ON alert_log(user_id, notified_at)
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS comments (
                id TEXT PRIMARY KEY,
                incident_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                username TEXT NOT NULL,
                text TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS idx_comments_incident
            ON comments(incident_id, created_at)
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS likes (
                incident_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                PRIMARY KEY (incident_id, user_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS notifications (
                id TEXT PRIMARY KEY,
                recipient_id TEXT NOT NULL,
                sender_id TEXT NOT NULL,
                incident_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                message TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS idx_notifications_recipient
            ON notifications(recipient_id, created_at)
            "#,
        ];

        for statement in statements {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        Ok(())
    }

    // ------------------------------------------------------------------
    // Incidents
    // ------------------------------------------------------------------

    pub async fn insert_incident(&self, incident: &Incident) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO incidents (
                id, reporter_id, reporter_name, latitude, longitude, description,
                image_base64, created_at, status, ended_at, ended_by
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&incident.id)
        .bind(&incident.reporter_id)
        .bind(&incident.reporter_name)
        .bind(incident.location.latitude)
        .bind(incident.location.longitude)
        .bind(&incident.description)
        .bind(&incident.image_base64)
        .bind(incident.created_at)
        .bind(incident.status.as_str())
        .bind(incident.ended_at)
        .bind(&incident.ended_by)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn find_incident(&self, id: &str) -> Result<Option<Incident>> {
        let row = sqlx::query("SELECT * FROM incidents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(incident_from_row).transpose()
    }

    /// Fetch an incident, failing with [`Error::NotFound`] if it is absent.
    pub async fn get_incident(&self, id: &str) -> Result<Incident> {
        self.find_incident(id)
            .await?
            .ok_or_else(|| Error::not_found("Incident", id))
    }

    /// List incidents that have not expired as of `now`, newest first.
    pub async fn list_visible_incidents(
        &self,
        now: i64,
        active_only: bool,
    ) -> Result<Vec<Incident>> {
        let rows = if active_only {
            sqlx::query(
                r#"
                SELECT * FROM incidents
                WHERE status = 'active'
                ORDER BY created_at DESC
                "#,
            )
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query(
                r#"
                SELECT * FROM incidents
                WHERE status = 'active' OR ended_at >= ?
                ORDER BY created_at DESC
                "#,
            )
            .bind(now - EXPIRY_WINDOW_MS)
            .fetch_all(&self.pool)
            .await?
        };

        rows.iter().map(incident_from_row).collect()
    }

    pub async fn list_active_incidents(&self) -> Result<Vec<Incident>> {
        self.list_visible_incidents(0, true).await
    }

    /// Transition an incident from active to inactive.
    ///
    /// Returns `false` without writing anything if the incident is absent or
    /// already inactive, so concurrent callers cannot overwrite `ended_at`.
    pub async fn mark_inactive(&self, id: &str, ended_at: i64, ended_by: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE incidents
            SET status = 'inactive', ended_at = ?, ended_by = ?
            WHERE id = ? AND status = 'active'
            "#,
        )
        .bind(ended_at)
        .bind(ended_by)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Delete every incident that expired before `now`, with its comments,
    /// likes, notifications and alert log entries.
    ///
    /// Returns the ids of the deleted incidents. Running it again deletes
    /// nothing.
    pub async fn delete_expired_incidents(&self, now: i64) -> Result<Vec<String>> {
        let cutoff = now - EXPIRY_WINDOW_MS;
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query(
            r#"
            SELECT id FROM incidents
            WHERE status = 'inactive' AND ended_at < ?
            "#,
        )
        .bind(cutoff)
        .fetch_all(&mut *tx)
        .await?;
        let ids = rows
            .iter()
            .map(|r| r.try_get::<String, _>("id"))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        for table in ["alert_log", "comments", "likes", "notifications"] {
            let statement = format!(
                "DELETE FROM {table} WHERE incident_id IN \
                 (SELECT id FROM incidents WHERE status = 'inactive' AND ended_at < ?)"
            );
            sqlx::query(&statement).bind(cutoff).execute(&mut *tx).await?;
        }

        sqlx::query("DELETE FROM incidents WHERE status = 'inactive' AND ended_at < ?")
            .bind(cutoff)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(ids)
    }

    // ------------------------------------------------------------------
    // Presence
    // ------------------------------------------------------------------

    /// Replace the last-known location of a user.
    pub async fn upsert_presence(&self, presence: &UserPresence) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO presence (user_id, latitude, longitude, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                latitude = excluded.latitude,
                longitude = excluded.longitude,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&presence.user_id)
        .bind(presence.location.map(|l| l.latitude))
        .bind(presence.location.map(|l| l.longitude))
        .bind(presence.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_presence(&self, user_id: &str) -> Result<Option<UserPresence>> {
        let row = sqlx::query("SELECT * FROM presence WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(presence_from_row).transpose()
    }

    pub async fn list_presences(&self) -> Result<Vec<UserPresence>> {
        let rows = sqlx::query("SELECT * FROM presence")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(presence_from_row).collect()
    }

    // ------------------------------------------------------------------
    // Alert log
    // ------------------------------------------------------------------

    /// Keys of every user already alerted about `incident_id`.
    pub async fn notified_keys(&self, incident_id: &str) -> Result<HashSet<AlertKey>> {
        let rows = sqlx::query("SELECT user_id FROM alert_log WHERE incident_id = ?")
            .bind(incident_id)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|r| {
                let user_id: String = r.try_get("user_id")?;
                Ok::<_, Error>(AlertKey::new(incident_id, user_id))
            })
            .collect()
    }

    /// Record an alert if it has not been recorded before and the incident
    /// is still active in the store.
    ///
    /// Returns `true` only for the caller that inserted the key.
    pub async fn claim_alert(&self, key: &AlertKey, notified_at: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO alert_log (incident_id, user_id, notified_at)
            SELECT ?, ?, ?
            WHERE EXISTS (SELECT 1 FROM incidents WHERE id = ? AND status = 'active')
            "#,
        )
        .bind(&key.incident_id)
        .bind(&key.user_id)
        .bind(notified_at)
        .bind(&key.incident_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Proximity alerts delivered to a user, newest first.
    pub async fn list_alerts_for_user(&self, user_id: &str) -> Result<Vec<DeliveredAlert>> {
        let rows = sqlx::query(
            r#"
            SELECT a.incident_id, a.user_id, a.notified_at, i.description
            FROM alert_log a
            JOIN incidents i ON i.id = a.incident_id
            WHERE a.user_id = ?
            ORDER BY a.notified_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| {
                let description: String = r.try_get("description")?;
                Ok::<_, Error>(DeliveredAlert::new(
                    r.try_get("incident_id")?,
                    r.try_get("user_id")?,
                    &description,
                    r.try_get("notified_at")?,
                ))
            })
            .collect()
    }

    /// Drop alert log entries recorded before `older_than` whose incident is
    /// no longer active. Entries for active incidents are kept so a rescan
    /// cannot alert the same user twice.
    pub async fn prune_alert_log(&self, older_than: i64) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM alert_log
            WHERE notified_at < ?
              AND incident_id NOT IN (SELECT id FROM incidents WHERE status = 'active')
            "#,
        )
        .bind(older_than)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    // ------------------------------------------------------------------
    // Comments, likes and notifications
    // ------------------------------------------------------------------

    /// Store a comment on an incident that is still active.
    ///
    /// Fails with [`Error::NotActive`] if the incident has been ended or
    /// removed, even when it was active when the caller last read it.
    pub async fn insert_comment(&self, comment: &Comment) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO comments (id, incident_id, user_id, username, text, created_at)
            SELECT ?, ?, ?, ?, ?, ?
            WHERE EXISTS (SELECT 1 FROM incidents WHERE id = ? AND status = 'active')
            "#,
        )
        .bind(&comment.id)
        .bind(&comment.incident_id)
        .bind(&comment.user_id)
        .bind(&comment.username)
        .bind(&comment.text)
        .bind(comment.created_at)
        .bind(&comment.incident_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotActive {
                id: comment.incident_id.clone(),
            });
        }

        Ok(())
    }

    /// Comments on an incident, oldest first.
    pub async fn list_comments(&self, incident_id: &str) -> Result<Vec<Comment>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM comments
            WHERE incident_id = ?
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .bind(incident_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| {
                Ok::<_, Error>(Comment {
                    id: r.try_get("id")?,
                    incident_id: r.try_get("incident_id")?,
                    user_id: r.try_get("user_id")?,
                    username: r.try_get("username")?,
                    text: r.try_get("text")?,
                    created_at: r.try_get("created_at")?,
                })
            })
            .collect()
    }

    pub async fn count_comments(&self, incident_id: &str) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM comments WHERE incident_id = ?")
            .bind(incident_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(row.try_get("n")?)
    }

    /// Add the like if absent, remove it if present.
    ///
    /// Both writes only apply while the incident is active; otherwise the
    /// transaction is rolled back and [`Error::NotActive`] returned.
    ///
    /// Returns `true` if the user now likes the incident.
    pub async fn toggle_like(&self, incident_id: &str, user_id: &str, now: i64) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let removed = sqlx::query(
            r#"
            DELETE FROM likes
            WHERE incident_id = ? AND user_id = ?
              AND EXISTS (SELECT 1 FROM incidents WHERE id = ? AND status = 'active')
            "#,
        )
        .bind(incident_id)
        .bind(user_id)
        .bind(incident_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if removed == 0 {
            let inserted = sqlx::query(
                r#"
                INSERT INTO likes (incident_id, user_id, created_at)
                SELECT ?, ?, ?
                WHERE EXISTS (SELECT 1 FROM incidents WHERE id = ? AND status = 'active')
                "#,
            )
            .bind(incident_id)
            .bind(user_id)
            .bind(now)
            .bind(incident_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

            if inserted == 0 {
                tx.rollback().await?;
                return Err(Error::NotActive {
                    id: incident_id.to_string(),
                });
            }
        }

        tx.commit().await?;

        Ok(removed == 0)
    }

    pub async fn count_likes(&self, incident_id: &str) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM likes WHERE incident_id = ?")
            .bind(incident_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(row.try_get("n")?)
    }

    pub async fn insert_notification(&self, notification: &Notification) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO notifications (
                id, recipient_id, sender_id, incident_id, kind, message, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&notification.id)
        .bind(&notification.recipient_id)
        .bind(&notification.sender_id)
        .bind(&notification.incident_id)
        .bind(notification.kind.as_str())
        .bind(&notification.message)
        .bind(notification.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Interaction notifications for a user, newest first.
    pub async fn list_notifications(&self, recipient_id: &str) -> Result<Vec<Notification>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM notifications
            WHERE recipient_id = ?
            ORDER BY created_at DESC, rowid DESC
            "#,
        )
        .bind(recipient_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| {
                let kind: String = r.try_get("kind")?;
                Ok::<_, Error>(Notification {
                    id: r.try_get("id")?,
                    recipient_id: r.try_get("recipient_id")?,
                    sender_id: r.try_get("sender_id")?,
                    incident_id: r.try_get("incident_id")?,
                    kind: kind.parse()?,
                    message: r.try_get("message")?,
                    created_at: r.try_get("created_at")?,
                })
            })
            .collect()
    }
}

fn incident_from_row(row: &SqliteRow) -> Result<Incident> {
    let status: String = row.try_get("status")?;

    Ok(Incident {
        id: row.try_get("id")?,
        reporter_id: row.try_get("reporter_id")?,
        reporter_name: row.try_get("reporter_name")?,
        location: GeoCoordinate::new(row.try_get("latitude")?, row.try_get("longitude")?)?,
        description: row.try_get("description")?,
        image_base64: row.try_get("image_base64")?,
        created_at: row.try_get("created_at")?,
        status: status.parse::<IncidentStatus>()?,
        ended_at: row.try_get("ended_at")?,
        ended_by: row.try_get("ended_by")?,
    })
}

fn presence_from_row(row: &SqliteRow) -> Result<UserPresence> {
    let latitude: Option<f64> = row.try_get("latitude")?;
    let longitude: Option<f64> = row.try_get("longitude")?;

    let location = match (latitude, longitude) {
        (Some(lat), Some(lon)) => Some(GeoCoordinate::new(lat, lon)?),
        _ => None,
    };

    Ok(UserPresence {
        user_id: row.try_get("user_id")?,
        location,
        updated_at: row.try_get("updated_at")?,
    })
}
