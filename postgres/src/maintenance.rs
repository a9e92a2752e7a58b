//! Cross-table housekeeping for readiness checks and the orphan sweeper.

use crate::{PostgresStore, storage};
use chrono::{DateTime, NaiveDate, Utc};
use tracing::instrument;
use wedding_rsvp_core::{MaintenanceStore, Result, StoreFuture};

impl PostgresStore {
    async fn execute(&self, context: &'static str, sql: &'static str) -> Result<u64> {
        let result = sqlx::query(sql)
            .execute(&self.pool)
            .await
            .map_err(storage(context))?;
        Ok(result.rows_affected())
    }

    #[instrument(skip(self))]
    async fn expire_weddings(&self, today: NaiveDate, at: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r"
            UPDATE weddings
            SET status = 'expired',
                doc = doc || jsonb_build_object('status', 'expired', 'updated_at', $2::timestamptz)
            WHERE status = 'published'
              AND event_date < $1
            ",
        )
        .bind(today)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(storage("expire past weddings"))?;
        Ok(result.rows_affected())
    }

    async fn ping_database(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(storage("ping database"))?;
        Ok(())
    }
}

impl MaintenanceStore for PostgresStore {
    fn ping(&self) -> StoreFuture<'_, ()> {
        Box::pin(self.ping_database())
    }

    fn delete_orphaned_rsvps(&self) -> StoreFuture<'_, u64> {
        Box::pin(self.execute(
            "delete orphaned rsvps",
            r"
            DELETE FROM rsvps r
            WHERE NOT EXISTS (SELECT 1 FROM weddings w WHERE w.id = r.wedding_id)
            ",
        ))
    }

    fn delete_orphaned_guests(&self) -> StoreFuture<'_, u64> {
        Box::pin(self.execute(
            "delete orphaned guests",
            r"
            DELETE FROM guests g
            WHERE NOT EXISTS (SELECT 1 FROM weddings w WHERE w.id = g.wedding_id)
            ",
        ))
    }

    fn clear_dangling_guest_links(&self) -> StoreFuture<'_, u64> {
        Box::pin(self.execute(
            "clear dangling guest links",
            r#"
            UPDATE guests g
            SET rsvp_id = NULL,
                doc = g.doc || '{"rsvp_id": null, "rsvp_status": null, "rsvp_submitted_at": null}'::jsonb
            WHERE g.rsvp_id IS NOT NULL
              AND NOT EXISTS (SELECT 1 FROM rsvps r WHERE r.id = g.rsvp_id)
            "#,
        ))
    }

    fn clear_dangling_rsvp_links(&self) -> StoreFuture<'_, u64> {
        Box::pin(self.execute(
            "clear dangling rsvp links",
            r#"
            UPDATE rsvps r
            SET guest_id = NULL, doc = r.doc || '{"guest_id": null}'::jsonb
            WHERE r.guest_id IS NOT NULL
              AND NOT EXISTS (SELECT 1 FROM guests g WHERE g.id = r.guest_id)
            "#,
        ))
    }

    fn repair_guest_backrefs(&self) -> StoreFuture<'_, u64> {
        Box::pin(self.execute(
            "repair guest back-references",
            r"
            UPDATE guests g
            SET rsvp_id = r.id,
                doc = g.doc || jsonb_build_object(
                    'rsvp_id', r.id,
                    'rsvp_status', r.status,
                    'rsvp_submitted_at', r.doc -> 'submitted_at'
                )
            FROM rsvps r
            WHERE r.guest_id = g.id
              AND r.wedding_id = g.wedding_id
              AND g.rsvp_id IS DISTINCT FROM r.id
            ",
        ))
    }

    fn expire_past_weddings(&self, today: NaiveDate, at: DateTime<Utc>) -> StoreFuture<'_, u64> {
        Box::pin(self.expire_weddings(today, at))
    }
}
