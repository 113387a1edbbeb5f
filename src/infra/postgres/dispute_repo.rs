use {
    crate::domain::{
        dispute::{Dispute, DisputeSnapshot, DisputeStatus},
        error::EngineError,
        money::MoneyAmount,
    },
    chrono::{DateTime, Utc},
    sqlx::PgPool,
    uuid::Uuid,
};

#[derive(Debug, sqlx::FromRow)]
struct DisputeRow {
    id: Uuid,
    transaction_id: Uuid,
    provider_dispute_id: String,
    amount: i64,
    reason: String,
    status: String,
    evidence_due_by: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<DisputeRow> for Dispute {
    type Error = EngineError;

    fn try_from(row: DisputeRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            transaction_id: row.transaction_id,
            provider_dispute_id: row.provider_dispute_id,
            amount: MoneyAmount::new(row.amount)?,
            reason: row.reason,
            status: DisputeStatus::try_from(row.status.as_str())?,
            evidence_due_by: row.evidence_due_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Latest snapshot wins; keyed on the provider's dispute id.
pub async fn upsert(
    pool: &PgPool,
    transaction_id: Uuid,
    snapshot: &DisputeSnapshot,
) -> Result<Dispute, EngineError> {
    sqlx::query_as::<_, DisputeRow>(
        r#"
        INSERT INTO disputes (
            id, transaction_id, provider_dispute_id, amount, reason, status,
            evidence_due_by, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, now(), now())
        ON CONFLICT (provider_dispute_id) DO UPDATE
        SET amount          = EXCLUDED.amount,
            reason          = EXCLUDED.reason,
            status          = EXCLUDED.status,
            evidence_due_by = EXCLUDED.evidence_due_by,
            updated_at      = now()
        RETURNING *
        "#,
    )
    .bind(Uuid::now_v7())
    .bind(transaction_id)
    .bind(&snapshot.provider_dispute_id)
    .bind(snapshot.amount.minor_units())
    .bind(&snapshot.reason)
    .bind(snapshot.status.as_str())
    .bind(snapshot.evidence_due_by)
    .fetch_one(pool)
    .await?
    .try_into()
}

pub async fn list(pool: &PgPool, transaction_id: Uuid) -> Result<Vec<Dispute>, EngineError> {
    sqlx::query_as::<_, DisputeRow>(
        "SELECT * FROM disputes WHERE transaction_id = $1 ORDER BY created_at, id",
    )
    .bind(transaction_id)
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(Dispute::try_from)
    .collect()
}
