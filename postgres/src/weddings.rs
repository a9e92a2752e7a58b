//! `weddings` table.

use crate::{
    PostgresStore, WEDDING_SLUG_KEY, bind_len, count, searching, storage, violated_index,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::types::Json;
use tracing::instrument;
use wedding_rsvp_core::{
    CounterSnapshot, Couple, EventDetails, Page, PageRequest, Result, RsvpError, RsvpSettings,
    Slug, StoreFuture, Theme, UserId, Wedding, WeddingFilter, WeddingId, WeddingStatus,
    WeddingStore,
};

/// The owner-editable part of a wedding document.
#[derive(Serialize)]
struct Content<'a> {
    title: &'a str,
    slug: &'a Slug,
    couple: &'a Option<Couple>,
    event: &'a Option<EventDetails>,
    theme: &'a Theme,
    rsvp: &'a RsvpSettings,
    is_public: bool,
    updated_at: DateTime<Utc>,
}

const OWNED: &str = "FROM weddings WHERE user_id = $1 AND ($2::text IS NULL OR status = $2)";
const OWNED_ORDER: &str = "ORDER BY created_at DESC, id DESC";
const PUBLIC: &str = "FROM weddings WHERE status = 'published' AND is_public";
const PUBLIC_ORDER: &str = "ORDER BY event_date ASC NULLS LAST, id ASC";

fn slug_conflict<'a>(slug: &'a Slug, context: &'static str) -> impl FnOnce(sqlx::Error) -> RsvpError + 'a {
    move |err| {
        if violated_index(&err) == Some(WEDDING_SLUG_KEY) {
            RsvpError::SlugTaken(slug.to_string())
        } else {
            storage(context)(err)
        }
    }
}

impl PostgresStore {
    #[instrument(skip_all, fields(wedding_id = %wedding.id))]
    async fn insert_wedding(&self, wedding: Wedding) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO weddings (id, user_id, slug, status, is_public, event_date, created_at, doc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ",
        )
        .bind(wedding.id.to_string())
        .bind(wedding.user_id.as_str())
        .bind(wedding.slug.as_str())
        .bind(wedding.status.as_str())
        .bind(wedding.is_public)
        .bind(wedding.event.as_ref().map(|e| e.date))
        .bind(wedding.created_at)
        .bind(Json(&wedding))
        .execute(&self.pool)
        .await
        .map_err(slug_conflict(&wedding.slug, "insert wedding"))?;
        Ok(())
    }

    async fn wedding_by_id(&self, id: WeddingId) -> Result<Option<Wedding>> {
        let row: Option<(Json<Wedding>,)> = sqlx::query_as("SELECT doc FROM weddings WHERE id = $1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage("load wedding"))?;
        Ok(row.map(|(Json(w),)| w))
    }

    async fn wedding_by_slug(&self, slug: Slug) -> Result<Option<Wedding>> {
        let row: Option<(Json<Wedding>,)> = sqlx::query_as("SELECT doc FROM weddings WHERE slug = $1")
            .bind(slug.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage("load wedding by slug"))?;
        Ok(row.map(|(Json(w),)| w))
    }

    #[instrument(skip_all, fields(user_id = %owner, page = page.page))]
    async fn weddings_for_user(
        &self,
        owner: UserId,
        filter: WeddingFilter,
        page: PageRequest,
    ) -> Result<Page<Wedding>> {
        let status = filter.status.map(|s| s.as_str());

        if searching(filter.search.as_deref()) {
            let sql = format!("SELECT doc {OWNED} {OWNED_ORDER}");
            let rows: Vec<(Json<Wedding>,)> = sqlx::query_as(&sql)
                .bind(owner.as_str())
                .bind(status)
                .fetch_all(&self.pool)
                .await
                .map_err(storage("list weddings"))?;
            let matching = rows.into_iter().map(|(Json(w),)| w).filter(|w| filter.matches(w));
            return Ok(page.slice(matching.collect()));
        }

        let count_sql = format!("SELECT COUNT(*) {OWNED}");
        let (total,): (i64,) = sqlx::query_as(&count_sql)
            .bind(owner.as_str())
            .bind(status)
            .fetch_one(&self.pool)
            .await
            .map_err(storage("count weddings"))?;

        let sql = format!("SELECT doc {OWNED} {OWNED_ORDER} LIMIT $3 OFFSET $4");
        let rows: Vec<(Json<Wedding>,)> = sqlx::query_as(&sql)
            .bind(owner.as_str())
            .bind(status)
            .bind(bind_len(page.limit()))
            .bind(bind_len(page.offset()))
            .fetch_all(&self.pool)
            .await
            .map_err(storage("list weddings"))?;
        Ok(Page::new(rows.into_iter().map(|(Json(w),)| w).collect(), count(total), page))
    }

    #[instrument(skip_all, fields(page = page.page))]
    async fn public_weddings(&self, filter: WeddingFilter, page: PageRequest) -> Result<Page<Wedding>> {
        if searching(filter.search.as_deref()) {
            let filter = WeddingFilter { status: None, ..filter };
            let sql = format!("SELECT doc {PUBLIC} {PUBLIC_ORDER}");
            let rows: Vec<(Json<Wedding>,)> = sqlx::query_as(&sql)
                .fetch_all(&self.pool)
                .await
                .map_err(storage("list public weddings"))?;
            let matching = rows.into_iter().map(|(Json(w),)| w).filter(|w| filter.matches(w));
            return Ok(page.slice(matching.collect()));
        }

        let count_sql = format!("SELECT COUNT(*) {PUBLIC}");
        let (total,): (i64,) = sqlx::query_as(&count_sql)
            .fetch_one(&self.pool)
            .await
            .map_err(storage("count public weddings"))?;

        let sql = format!("SELECT doc {PUBLIC} {PUBLIC_ORDER} LIMIT $1 OFFSET $2");
        let rows: Vec<(Json<Wedding>,)> = sqlx::query_as(&sql)
            .bind(bind_len(page.limit()))
            .bind(bind_len(page.offset()))
            .fetch_all(&self.pool)
            .await
            .map_err(storage("list public weddings"))?;
        Ok(Page::new(rows.into_iter().map(|(Json(w),)| w).collect(), count(total), page))
    }

    #[instrument(skip_all, fields(wedding_id = %wedding.id))]
    async fn update_wedding_content(&self, wedding: Wedding) -> Result<bool> {
        let content = Content {
            title: &wedding.title,
            slug: &wedding.slug,
            couple: &wedding.couple,
            event: &wedding.event,
            theme: &wedding.theme,
            rsvp: &wedding.rsvp,
            is_public: wedding.is_public,
            updated_at: wedding.updated_at,
        };
        let result = sqlx::query(
            r"
            UPDATE weddings
            SET slug = $2, is_public = $3, event_date = $4, doc = doc || $5
            WHERE id = $1
            ",
        )
        .bind(wedding.id.to_string())
        .bind(wedding.slug.as_str())
        .bind(wedding.is_public)
        .bind(wedding.event.as_ref().map(|e| e.date))
        .bind(Json(&content))
        .execute(&self.pool)
        .await
        .map_err(slug_conflict(&wedding.slug, "update wedding"))?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), fields(wedding_id = %id, status = status.as_str()))]
    async fn update_wedding_status(
        &self,
        id: WeddingId,
        status: WeddingStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Wedding>> {
        let row: Option<(Json<Wedding>,)> = sqlx::query_as(
            r"
            UPDATE weddings
            SET status = $2,
                doc = doc
                    || jsonb_build_object('status', $2::text, 'updated_at', $3::jsonb)
                    || CASE
                        WHEN $2 = 'published'
                             AND COALESCE(doc -> 'published_at', 'null'::jsonb) = 'null'::jsonb
                        THEN jsonb_build_object('published_at', $3::jsonb)
                        ELSE '{}'::jsonb
                       END
            WHERE id = $1
            RETURNING doc
            ",
        )
        .bind(id.to_string())
        .bind(status.as_str())
        .bind(Json(at))
        .fetch_optional(&self.pool)
        .await
        .map_err(storage("update wedding status"))?;
        Ok(row.map(|(Json(w),)| w))
    }

    /// Cascade in one transaction so no child outlives a committed delete.
    #[instrument(skip(self), fields(wedding_id = %id))]
    async fn delete_wedding(&self, id: WeddingId) -> Result<bool> {
        let id = id.to_string();
        let mut tx = self.pool.begin().await.map_err(storage("begin wedding delete"))?;

        let rsvps = sqlx::query("DELETE FROM rsvps WHERE wedding_id = $1")
            .bind(&id)
            .execute(&mut *tx)
            .await
            .map_err(storage("delete wedding rsvps"))?;
        let guests = sqlx::query("DELETE FROM guests WHERE wedding_id = $1")
            .bind(&id)
            .execute(&mut *tx)
            .await
            .map_err(storage("delete wedding guests"))?;
        let wedding = sqlx::query("DELETE FROM weddings WHERE id = $1")
            .bind(&id)
            .execute(&mut *tx)
            .await
            .map_err(storage("delete wedding"))?;

        tx.commit().await.map_err(storage("commit wedding delete"))?;
        tracing::debug!(
            rsvps = rsvps.rows_affected(),
            guests = guests.rows_affected(),
            "Cascade delete committed"
        );
        Ok(wedding.rows_affected() > 0)
    }

    async fn bump_views(&self, id: WeddingId, at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r"
            UPDATE weddings
            SET doc = doc || jsonb_build_object(
                'view_count', COALESCE((doc ->> 'view_count')::bigint, 0) + 1,
                'last_viewed_at', $2::jsonb
            )
            WHERE id = $1
            ",
        )
        .bind(id.to_string())
        .bind(Json(at))
        .execute(&self.pool)
        .await
        .map_err(storage("increment views"))?;
        Ok(())
    }

    #[instrument(skip(self), fields(wedding_id = %id))]
    async fn write_counters(&self, id: WeddingId, counters: CounterSnapshot) -> Result<bool> {
        let result = sqlx::query("UPDATE weddings SET doc = doc || $2 WHERE id = $1")
            .bind(id.to_string())
            .bind(Json(counters))
            .execute(&self.pool)
            .await
            .map_err(storage("update counters"))?;
        Ok(result.rows_affected() > 0)
    }
}

impl WeddingStore for PostgresStore {
    fn insert(&self, wedding: Wedding) -> StoreFuture<'_, ()> {
        Box::pin(self.insert_wedding(wedding))
    }

    fn get(&self, id: WeddingId) -> StoreFuture<'_, Option<Wedding>> {
        Box::pin(self.wedding_by_id(id))
    }

    fn get_by_slug(&self, slug: Slug) -> StoreFuture<'_, Option<Wedding>> {
        Box::pin(self.wedding_by_slug(slug))
    }

    fn list_for_user(
        &self,
        owner: UserId,
        filter: WeddingFilter,
        page: PageRequest,
    ) -> StoreFuture<'_, Page<Wedding>> {
        Box::pin(self.weddings_for_user(owner, filter, page))
    }

    fn list_public(&self, filter: WeddingFilter, page: PageRequest) -> StoreFuture<'_, Page<Wedding>> {
        Box::pin(self.public_weddings(filter, page))
    }

    fn update_content(&self, wedding: Wedding) -> StoreFuture<'_, bool> {
        Box::pin(self.update_wedding_content(wedding))
    }

    fn update_status(
        &self,
        id: WeddingId,
        status: WeddingStatus,
        at: DateTime<Utc>,
    ) -> StoreFuture<'_, Option<Wedding>> {
        Box::pin(self.update_wedding_status(id, status, at))
    }

    fn delete(&self, id: WeddingId) -> StoreFuture<'_, bool> {
        Box::pin(self.delete_wedding(id))
    }

    fn increment_views(&self, id: WeddingId, at: DateTime<Utc>) -> StoreFuture<'_, ()> {
        Box::pin(self.bump_views(id, at))
    }

    fn set_counters(&self, id: WeddingId, counters: CounterSnapshot) -> StoreFuture<'_, bool> {
        Box::pin(self.write_counters(id, counters))
    }
}
