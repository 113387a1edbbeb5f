use {
    crate::domain::{
        error::EngineError,
        id::{EventId, ProviderKey},
        webhook::{EventClaim, WebhookEvent, WebhookResult},
    },
    chrono::{DateTime, Utc},
    sqlx::{PgPool, types::Json},
    uuid::Uuid,
};

#[derive(Debug, sqlx::FromRow)]
struct WebhookEventRow {
    id: Uuid,
    provider: String,
    provider_event_id: Option<String>,
    event_type: Option<String>,
    payload: Vec<u8>,
    signature: String,
    verified: bool,
    processed: bool,
    result: Option<Json<WebhookResult>>,
    received_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
}

impl TryFrom<WebhookEventRow> for WebhookEvent {
    type Error = EngineError;

    fn try_from(row: WebhookEventRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            provider: ProviderKey::new(row.provider)?,
            provider_event_id: row.provider_event_id,
            event_type: row.event_type,
            payload: row.payload,
            signature: row.signature,
            verified: row.verified,
            processed: row.processed,
            result: row.result.map(|Json(r)| r),
            received_at: row.received_at,
            processed_at: row.processed_at,
        })
    }
}

fn require_row(rows_affected: u64, id: Uuid) -> Result<(), EngineError> {
    if rows_affected == 0 {
        return Err(EngineError::NotFound(format!("webhook event {id}")));
    }
    Ok(())
}

pub async fn insert(pool: &PgPool, event: &WebhookEvent) -> Result<(), EngineError> {
    sqlx::query(
        r#"
        INSERT INTO webhook_events (
            id, provider, provider_event_id, event_type, payload, signature,
            verified, processed, result, received_at, processed_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        "#,
    )
    .bind(event.id)
    .bind(event.provider.as_str())
    .bind(&event.provider_event_id)
    .bind(&event.event_type)
    .bind(&event.payload)
    .bind(&event.signature)
    .bind(event.verified)
    .bind(event.processed)
    .bind(event.result.as_ref().map(Json))
    .bind(event.received_at)
    .bind(event.processed_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get(pool: &PgPool, id: Uuid) -> Result<Option<WebhookEvent>, EngineError> {
    sqlx::query_as::<_, WebhookEventRow>("SELECT * FROM webhook_events WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .map(WebhookEvent::try_from)
        .transpose()
}

pub async fn mark_verified(pool: &PgPool, id: Uuid, verified: bool) -> Result<(), EngineError> {
    let done = sqlx::query("UPDATE webhook_events SET verified = $2 WHERE id = $1")
        .bind(id)
        .bind(verified)
        .execute(pool)
        .await?;
    require_row(done.rows_affected(), id)
}

pub async fn set_identity(
    pool: &PgPool,
    id: Uuid,
    event_id: &EventId,
    event_type: &str,
) -> Result<(), EngineError> {
    let done = sqlx::query(
        "UPDATE webhook_events SET provider_event_id = $2, event_type = $3 WHERE id = $1",
    )
    .bind(id)
    .bind(event_id.as_str())
    .bind(event_type)
    .execute(pool)
    .await?;
    require_row(done.rows_affected(), id)
}

/// `ON CONFLICT DO NOTHING` decides the owner; a second look tells the
/// owner apart from a later duplicate.
pub async fn claim(
    pool: &PgPool,
    provider: &ProviderKey,
    event_id: &EventId,
    row_id: Uuid,
) -> Result<EventClaim, EngineError> {
    let inserted = sqlx::query_scalar::<_, Uuid>(
        r#"
        INSERT INTO webhook_claims (provider, provider_event_id, event_row_id)
        VALUES ($1, $2, $3)
        ON CONFLICT (provider, provider_event_id) DO NOTHING
        RETURNING event_row_id
        "#,
    )
    .bind(provider.as_str())
    .bind(event_id.as_str())
    .bind(row_id)
    .fetch_optional(pool)
    .await?;

    if inserted.is_some() {
        return Ok(EventClaim::Acquired);
    }

    let owner = sqlx::query_scalar::<_, Uuid>(
        "SELECT event_row_id FROM webhook_claims WHERE provider = $1 AND provider_event_id = $2",
    )
    .bind(provider.as_str())
    .bind(event_id.as_str())
    .fetch_one(pool)
    .await?;

    if owner == row_id {
        Ok(EventClaim::Acquired)
    } else {
        Ok(EventClaim::HeldBy(owner))
    }
}

pub async fn finish(pool: &PgPool, id: Uuid, result: &WebhookResult) -> Result<(), EngineError> {
    let done = sqlx::query(
        r#"
        UPDATE webhook_events
        SET processed = TRUE, result = $2, processed_at = now()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(Json(result))
    .execute(pool)
    .await?;
    require_row(done.rows_affected(), id)
}

pub async fn list_unprocessed(
    pool: &PgPool,
    received_before: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<WebhookEvent>, EngineError> {
    sqlx::query_as::<_, WebhookEventRow>(
        r#"
        SELECT * FROM webhook_events
        WHERE verified AND NOT processed AND received_at < $1
        ORDER BY received_at, id
        LIMIT $2
        "#,
    )
    .bind(received_before)
    .bind(limit)
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(WebhookEvent::try_from)
    .collect()
}
