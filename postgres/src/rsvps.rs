//! `rsvps` table.

use crate::{
    PostgresStore, RSVP_EMAIL_KEY, RSVP_GUEST_KEY, bind_len, count, searching, storage,
    violated_index,
};
use sqlx::types::Json;
use tracing::instrument;
use wedding_rsvp_core::{
    GuestId, Page, PageRequest, Result, Rsvp, RsvpError, RsvpFilter, RsvpId, RsvpStore, RsvpTally,
    StoreFuture, WeddingId,
};

const LISTED: &str = r"
    FROM rsvps
    WHERE wedding_id = $1
      AND ($2::text IS NULL OR status = $2)
      AND ($3::text IS NULL OR doc ->> 'source' = $3)
      AND ($4::timestamptz IS NULL OR submitted_at >= $4)
      AND ($5::timestamptz IS NULL OR submitted_at <= $5)
";
const LISTED_ORDER: &str = "ORDER BY submitted_at DESC, id DESC";

fn docs(rows: Vec<(Json<Rsvp>,)>) -> Vec<Rsvp> {
    rows.into_iter().map(|(Json(r),)| r).collect()
}

fn duplicate(err: sqlx::Error) -> RsvpError {
    match violated_index(&err) {
        Some(RSVP_EMAIL_KEY) => RsvpError::DuplicateRsvp("email".into()),
        Some(RSVP_GUEST_KEY) => RsvpError::DuplicateRsvp("guest".into()),
        _ => storage("insert rsvp")(err),
    }
}

impl PostgresStore {
    #[instrument(skip_all, fields(rsvp_id = %rsvp.id, wedding_id = %rsvp.wedding_id))]
    async fn insert_rsvp(&self, rsvp: Rsvp) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO rsvps
                (id, wedding_id, guest_id, email, status, attendance_count, submitted_at, doc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ",
        )
        .bind(rsvp.id.to_string())
        .bind(rsvp.wedding_id.to_string())
        .bind(rsvp.guest_id.map(|g| g.to_string()))
        .bind(rsvp.email.as_deref())
        .bind(rsvp.status.as_str())
        .bind(i32::try_from(rsvp.attendance_count).unwrap_or(i32::MAX))
        .bind(rsvp.submitted_at)
        .bind(Json(&rsvp))
        .execute(&self.pool)
        .await
        .map_err(duplicate)?;
        Ok(())
    }

    async fn rsvp_by_id(&self, id: RsvpId) -> Result<Option<Rsvp>> {
        let row: Option<(Json<Rsvp>,)> = sqlx::query_as("SELECT doc FROM rsvps WHERE id = $1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage("load rsvp"))?;
        Ok(row.map(|(Json(r),)| r))
    }

    /// The `guest_id` column is left alone and copied back into the document.
    #[instrument(skip_all, fields(rsvp_id = %rsvp.id))]
    async fn replace_rsvp(&self, rsvp: Rsvp) -> Result<Option<Rsvp>> {
        let row: Option<(Json<Rsvp>,)> = sqlx::query_as(
            r"
            UPDATE rsvps
            SET status = $2,
                attendance_count = $3,
                doc = jsonb_set($4::jsonb, '{guest_id}', COALESCE(to_jsonb(guest_id), 'null'::jsonb))
            WHERE id = $1
            RETURNING doc
            ",
        )
        .bind(rsvp.id.to_string())
        .bind(rsvp.status.as_str())
        .bind(i32::try_from(rsvp.attendance_count).unwrap_or(i32::MAX))
        .bind(Json(&rsvp))
        .fetch_optional(&self.pool)
        .await
        .map_err(storage("replace rsvp"))?;
        Ok(row.map(|(Json(r),)| r))
    }

    #[instrument(skip(self), fields(rsvp_id = %id))]
    async fn delete_rsvp(&self, id: RsvpId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM rsvps WHERE id = $1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(storage("delete rsvp"))?;
        Ok(result.rows_affected() > 0)
    }

    async fn rsvp_by_email(&self, wedding_id: WeddingId, email: String) -> Result<Option<Rsvp>> {
        let row: Option<(Json<Rsvp>,)> =
            sqlx::query_as("SELECT doc FROM rsvps WHERE wedding_id = $1 AND email = $2")
                .bind(wedding_id.to_string())
                .bind(email)
                .fetch_optional(&self.pool)
                .await
                .map_err(storage("find rsvp by email"))?;
        Ok(row.map(|(Json(r),)| r))
    }

    async fn rsvp_by_guest(&self, guest_id: GuestId) -> Result<Option<Rsvp>> {
        let row: Option<(Json<Rsvp>,)> = sqlx::query_as("SELECT doc FROM rsvps WHERE guest_id = $1")
            .bind(guest_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage("find rsvp by guest"))?;
        Ok(row.map(|(Json(r),)| r))
    }

    async fn matching_rsvps(
        &self,
        wedding_id: WeddingId,
        filter: &RsvpFilter,
        page: Option<PageRequest>,
    ) -> Result<Vec<Rsvp>> {
        let paging = if page.is_some() { " LIMIT $6 OFFSET $7" } else { "" };
        let sql = format!("SELECT doc {LISTED} {LISTED_ORDER}{paging}");
        let mut query = sqlx::query_as::<_, (Json<Rsvp>,)>(&sql)
            .bind(wedding_id.to_string())
            .bind(filter.status.map(|s| s.as_str()))
            .bind(filter.source.map(|s| s.as_str()))
            .bind(filter.submitted_after)
            .bind(filter.submitted_before);
        if let Some(page) = page {
            query = query.bind(bind_len(page.limit())).bind(bind_len(page.offset()));
        }
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(storage("list rsvps"))?;
        Ok(docs(rows))
    }

    #[instrument(skip_all, fields(wedding_id = %wedding_id, page = page.page))]
    async fn rsvps_of_wedding(
        &self,
        wedding_id: WeddingId,
        filter: RsvpFilter,
        page: PageRequest,
    ) -> Result<Page<Rsvp>> {
        if searching(filter.search.as_deref()) {
            let rows = self.matching_rsvps(wedding_id, &filter, None).await?;
            return Ok(page.slice(rows.into_iter().filter(|r| filter.matches(r)).collect()));
        }

        let count_sql = format!("SELECT COUNT(*) {LISTED}");
        let (total,): (i64,) = sqlx::query_as(&count_sql)
            .bind(wedding_id.to_string())
            .bind(filter.status.map(|s| s.as_str()))
            .bind(filter.source.map(|s| s.as_str()))
            .bind(filter.submitted_after)
            .bind(filter.submitted_before)
            .fetch_one(&self.pool)
            .await
            .map_err(storage("count rsvps"))?;
        let rows = self.matching_rsvps(wedding_id, &filter, Some(page)).await?;
        Ok(Page::new(rows, count(total), page))
    }

    #[instrument(skip_all, fields(wedding_id = %wedding_id))]
    async fn export_rsvps(&self, wedding_id: WeddingId, filter: RsvpFilter) -> Result<Vec<Rsvp>> {
        let rows = self.matching_rsvps(wedding_id, &filter, None).await?;
        Ok(rows.into_iter().filter(|r| filter.matches(r)).collect())
    }

    async fn tally_rsvps(&self, wedding_id: WeddingId) -> Result<RsvpTally> {
        let (rsvp_count, total_attending): (i64, i64) = sqlx::query_as(
            r"
            SELECT COUNT(*),
                   COALESCE(SUM(attendance_count) FILTER (WHERE status = 'attending'), 0)::BIGINT
            FROM rsvps
            WHERE wedding_id = $1
            ",
        )
        .bind(wedding_id.to_string())
        .fetch_one(&self.pool)
        .await
        .map_err(storage("tally rsvps"))?;
        Ok(RsvpTally {
            rsvp_count: count(rsvp_count),
            total_attending: count(total_attending),
        })
    }

    #[instrument(skip(self), fields(guest_id = %guest_id))]
    async fn unlink_guest(&self, guest_id: GuestId) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE rsvps
            SET guest_id = NULL, doc = doc || '{"guest_id": null}'::jsonb
            WHERE guest_id = $1
            "#,
        )
        .bind(guest_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(storage("unlink rsvps from guest"))?;
        Ok(result.rows_affected())
    }
}

impl RsvpStore for PostgresStore {
    fn insert(&self, rsvp: Rsvp) -> StoreFuture<'_, ()> {
        Box::pin(self.insert_rsvp(rsvp))
    }

    fn get(&self, id: RsvpId) -> StoreFuture<'_, Option<Rsvp>> {
        Box::pin(self.rsvp_by_id(id))
    }

    fn replace(&self, rsvp: Rsvp) -> StoreFuture<'_, Option<Rsvp>> {
        Box::pin(self.replace_rsvp(rsvp))
    }

    fn delete(&self, id: RsvpId) -> StoreFuture<'_, bool> {
        Box::pin(self.delete_rsvp(id))
    }

    fn find_by_email(&self, wedding_id: WeddingId, email: String) -> StoreFuture<'_, Option<Rsvp>> {
        Box::pin(self.rsvp_by_email(wedding_id, email))
    }

    fn find_by_guest(&self, guest_id: GuestId) -> StoreFuture<'_, Option<Rsvp>> {
        Box::pin(self.rsvp_by_guest(guest_id))
    }

    fn list_by_wedding(
        &self,
        wedding_id: WeddingId,
        filter: RsvpFilter,
        page: PageRequest,
    ) -> StoreFuture<'_, Page<Rsvp>> {
        Box::pin(self.rsvps_of_wedding(wedding_id, filter, page))
    }

    fn export(&self, wedding_id: WeddingId, filter: RsvpFilter) -> StoreFuture<'_, Vec<Rsvp>> {
        Box::pin(self.export_rsvps(wedding_id, filter))
    }

    fn tally(&self, wedding_id: WeddingId) -> StoreFuture<'_, RsvpTally> {
        Box::pin(self.tally_rsvps(wedding_id))
    }

    fn clear_guest(&self, guest_id: GuestId) -> StoreFuture<'_, u64> {
        Box::pin(self.unlink_guest(guest_id))
    }
}
