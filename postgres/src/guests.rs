//! `guests` table.

use crate::{
    GUEST_EMAIL_KEY, PostgresStore, bind_len, count, searching, storage, violated_index,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::types::Json;
use tracing::instrument;
use wedding_rsvp_core::{
    Guest, GuestFilter, GuestId, GuestStore, ImportBatchId, InvitationStatus, Page, PageRequest,
    Result, RsvpError, RsvpId, RsvpLink, RsvpStatus, Side, StoreFuture, WeddingId,
};

/// The owner-editable part of a guest document.
#[derive(Serialize)]
struct Profile<'a> {
    first_name: &'a str,
    last_name: &'a str,
    email: Option<&'a str>,
    phone: Option<&'a str>,
    side: Side,
    plus_one_allowed: bool,
    max_plus_ones: u8,
    invitation_status: InvitationStatus,
    updated_at: DateTime<Utc>,
}

/// The RSVP fields mirrored onto a guest; all null when unlinked.
#[derive(Serialize)]
struct LinkFields {
    rsvp_id: Option<RsvpId>,
    rsvp_status: Option<RsvpStatus>,
    rsvp_submitted_at: Option<DateTime<Utc>>,
}

impl From<Option<RsvpLink>> for LinkFields {
    fn from(link: Option<RsvpLink>) -> Self {
        Self {
            rsvp_id: link.map(|l| l.rsvp_id),
            rsvp_status: link.map(|l| l.rsvp_status),
            rsvp_submitted_at: link.map(|l| l.rsvp_submitted_at),
        }
    }
}

const LISTED: &str = r"
    FROM guests
    WHERE wedding_id = $1
      AND ($2::text IS NULL OR doc ->> 'side' = $2)
      AND ($3::text IS NULL OR doc ->> 'invitation_status' = $3)
      AND ($4::boolean IS NULL OR (rsvp_id IS NOT NULL) = $4)
";
const LISTED_ORDER: &str = "ORDER BY created_at ASC, id ASC";

fn email_conflict(guest: &Guest, context: &'static str) -> impl FnOnce(sqlx::Error) -> RsvpError {
    let email = guest.email.clone().unwrap_or_default();
    move |err| {
        if violated_index(&err) == Some(GUEST_EMAIL_KEY) {
            RsvpError::DuplicateGuest(email)
        } else {
            storage(context)(err)
        }
    }
}

fn docs(rows: Vec<(Json<Guest>,)>) -> Vec<Guest> {
    rows.into_iter().map(|(Json(g),)| g).collect()
}

impl PostgresStore {
    #[instrument(skip_all, fields(guest_id = %guest.id, wedding_id = %guest.wedding_id))]
    async fn insert_guest(&self, guest: Guest) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO guests (id, wedding_id, email, import_batch_id, rsvp_id, created_at, doc)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ",
        )
        .bind(guest.id.to_string())
        .bind(guest.wedding_id.to_string())
        .bind(guest.email.as_deref())
        .bind(guest.import_batch_id.map(|b| b.to_string()))
        .bind(guest.rsvp_id.map(|r| r.to_string()))
        .bind(guest.created_at)
        .bind(Json(&guest))
        .execute(&self.pool)
        .await
        .map_err(email_conflict(&guest, "insert guest"))?;
        Ok(())
    }

    async fn guest_by_id(&self, id: GuestId) -> Result<Option<Guest>> {
        let row: Option<(Json<Guest>,)> = sqlx::query_as("SELECT doc FROM guests WHERE id = $1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage("load guest"))?;
        Ok(row.map(|(Json(g),)| g))
    }

    #[instrument(skip_all, fields(guest_id = %guest.id))]
    async fn update_guest_profile(&self, guest: Guest) -> Result<bool> {
        let profile = Profile {
            first_name: &guest.first_name,
            last_name: &guest.last_name,
            email: guest.email.as_deref(),
            phone: guest.phone.as_deref(),
            side: guest.side,
            plus_one_allowed: guest.plus_one_allowed,
            max_plus_ones: guest.max_plus_ones,
            invitation_status: guest.invitation_status,
            updated_at: guest.updated_at,
        };
        let result = sqlx::query("UPDATE guests SET email = $2, doc = doc || $3 WHERE id = $1")
            .bind(guest.id.to_string())
            .bind(guest.email.as_deref())
            .bind(Json(&profile))
            .execute(&self.pool)
            .await
            .map_err(email_conflict(&guest, "update guest"))?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), fields(guest_id = %id))]
    async fn delete_guest(&self, id: GuestId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM guests WHERE id = $1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(storage("delete guest"))?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip_all, fields(wedding_id = %wedding_id, page = page.page))]
    async fn guests_of_wedding(
        &self,
        wedding_id: WeddingId,
        filter: GuestFilter,
        page: PageRequest,
    ) -> Result<Page<Guest>> {
        let wedding_id = wedding_id.to_string();
        let side = filter.side.map(|s| s.as_str());
        let invitation = filter.invitation_status.map(|s| s.as_str());

        if searching(filter.search.as_deref()) {
            let sql = format!("SELECT doc {LISTED} {LISTED_ORDER}");
            let rows: Vec<(Json<Guest>,)> = sqlx::query_as(&sql)
                .bind(&wedding_id)
                .bind(side)
                .bind(invitation)
                .bind(filter.has_rsvp)
                .fetch_all(&self.pool)
                .await
                .map_err(storage("list guests"))?;
            let matching = docs(rows).into_iter().filter(|g| filter.matches(g));
            return Ok(page.slice(matching.collect()));
        }

        let count_sql = format!("SELECT COUNT(*) {LISTED}");
        let (total,): (i64,) = sqlx::query_as(&count_sql)
            .bind(&wedding_id)
            .bind(side)
            .bind(invitation)
            .bind(filter.has_rsvp)
            .fetch_one(&self.pool)
            .await
            .map_err(storage("count guests"))?;

        let sql = format!("SELECT doc {LISTED} {LISTED_ORDER} LIMIT $5 OFFSET $6");
        let rows: Vec<(Json<Guest>,)> = sqlx::query_as(&sql)
            .bind(&wedding_id)
            .bind(side)
            .bind(invitation)
            .bind(filter.has_rsvp)
            .bind(bind_len(page.limit()))
            .bind(bind_len(page.offset()))
            .fetch_all(&self.pool)
            .await
            .map_err(storage("list guests"))?;
        Ok(Page::new(docs(rows), count(total), page))
    }

    async fn guests_of_batch(&self, wedding_id: WeddingId, batch: ImportBatchId) -> Result<Vec<Guest>> {
        let rows: Vec<(Json<Guest>,)> = sqlx::query_as(
            r"
            SELECT doc FROM guests
            WHERE wedding_id = $1 AND import_batch_id = $2
            ORDER BY created_at ASC, id ASC
            ",
        )
        .bind(wedding_id.to_string())
        .bind(batch.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(storage("list import batch"))?;
        Ok(docs(rows))
    }

    #[instrument(skip(self), fields(wedding_id = %wedding_id, import_batch_id = %batch))]
    async fn delete_guest_batch(&self, wedding_id: WeddingId, batch: ImportBatchId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM guests WHERE wedding_id = $1 AND import_batch_id = $2")
            .bind(wedding_id.to_string())
            .bind(batch.to_string())
            .execute(&self.pool)
            .await
            .map_err(storage("delete import batch"))?;
        Ok(result.rows_affected())
    }

    async fn guest_by_email(&self, wedding_id: WeddingId, email: String) -> Result<Option<Guest>> {
        let row: Option<(Json<Guest>,)> =
            sqlx::query_as("SELECT doc FROM guests WHERE wedding_id = $1 AND email = $2")
                .bind(wedding_id.to_string())
                .bind(email)
                .fetch_optional(&self.pool)
                .await
                .map_err(storage("find guest by email"))?;
        Ok(row.map(|(Json(g),)| g))
    }

    async fn count_guests(&self, wedding_id: WeddingId) -> Result<u64> {
        let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM guests WHERE wedding_id = $1")
            .bind(wedding_id.to_string())
            .fetch_one(&self.pool)
            .await
            .map_err(storage("count guests"))?;
        Ok(count(n))
    }

    #[instrument(skip(self, link), fields(guest_id = %id, linked = link.is_some()))]
    async fn link_guest(&self, id: GuestId, link: Option<RsvpLink>) -> Result<bool> {
        let result = sqlx::query("UPDATE guests SET rsvp_id = $2, doc = doc || $3 WHERE id = $1")
            .bind(id.to_string())
            .bind(link.map(|l| l.rsvp_id.to_string()))
            .bind(Json(LinkFields::from(link)))
            .execute(&self.pool)
            .await
            .map_err(storage("update guest rsvp link"))?;
        Ok(result.rows_affected() > 0)
    }
}

impl GuestStore for PostgresStore {
    fn insert(&self, guest: Guest) -> StoreFuture<'_, ()> {
        Box::pin(self.insert_guest(guest))
    }

    fn get(&self, id: GuestId) -> StoreFuture<'_, Option<Guest>> {
        Box::pin(self.guest_by_id(id))
    }

    fn update_profile(&self, guest: Guest) -> StoreFuture<'_, bool> {
        Box::pin(self.update_guest_profile(guest))
    }

    fn delete(&self, id: GuestId) -> StoreFuture<'_, bool> {
        Box::pin(self.delete_guest(id))
    }

    fn list_by_wedding(
        &self,
        wedding_id: WeddingId,
        filter: GuestFilter,
        page: PageRequest,
    ) -> StoreFuture<'_, Page<Guest>> {
        Box::pin(self.guests_of_wedding(wedding_id, filter, page))
    }

    fn list_by_import_batch(
        &self,
        wedding_id: WeddingId,
        batch: ImportBatchId,
    ) -> StoreFuture<'_, Vec<Guest>> {
        Box::pin(self.guests_of_batch(wedding_id, batch))
    }

    fn delete_by_import_batch(
        &self,
        wedding_id: WeddingId,
        batch: ImportBatchId,
    ) -> StoreFuture<'_, u64> {
        Box::pin(self.delete_guest_batch(wedding_id, batch))
    }

    fn find_by_email(&self, wedding_id: WeddingId, email: String) -> StoreFuture<'_, Option<Guest>> {
        Box::pin(self.guest_by_email(wedding_id, email))
    }

    fn count_by_wedding(&self, wedding_id: WeddingId) -> StoreFuture<'_, u64> {
        Box::pin(self.count_guests(wedding_id))
    }

    fn set_rsvp_link(&self, id: GuestId, link: Option<RsvpLink>) -> StoreFuture<'_, bool> {
        Box::pin(self.link_guest(id, link))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlinked_fields_serialize_as_nulls() {
        let value = serde_json::to_value(LinkFields::from(None)).unwrap_or_default();
        assert_eq!(
            value,
            serde_json::json!({"rsvp_id": null, "rsvp_status": null, "rsvp_submitted_at": null})
        );
    }
}
