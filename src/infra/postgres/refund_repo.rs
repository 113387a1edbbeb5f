use {
    super::transaction_repo::TransactionRow,
    crate::domain::{
        error::EngineError,
        money::MoneyAmount,
        refund::{Refund, RefundSettlement, RefundStatus},
        transaction::Transaction,
    },
    chrono::{DateTime, Utc},
    sqlx::{PgPool, Postgres},
    uuid::Uuid,
};

#[derive(Debug, sqlx::FromRow)]
struct RefundRow {
    id: Uuid,
    transaction_id: Uuid,
    provider_refund_id: Option<String>,
    amount: i64,
    reason: String,
    status: String,
    provider_payload: Option<Vec<u8>>,
    failure_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<RefundRow> for Refund {
    type Error = EngineError;

    fn try_from(row: RefundRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            transaction_id: row.transaction_id,
            provider_refund_id: row.provider_refund_id,
            amount: MoneyAmount::new(row.amount)?,
            reason: row.reason,
            status: RefundStatus::try_from(row.status.as_str())?,
            provider_payload: row.provider_payload,
            failure_reason: row.failure_reason,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

pub async fn insert<'e, E>(executor: E, refund: &Refund) -> Result<(), EngineError>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    sqlx::query(
        r#"
        INSERT INTO refunds (
            id, transaction_id, provider_refund_id, amount, reason, status,
            provider_payload, failure_reason, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(refund.id)
    .bind(refund.transaction_id)
    .bind(&refund.provider_refund_id)
    .bind(refund.amount.minor_units())
    .bind(&refund.reason)
    .bind(refund.status.as_str())
    .bind(&refund.provider_payload)
    .bind(&refund.failure_reason)
    .bind(refund.created_at)
    .bind(refund.updated_at)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn get(pool: &PgPool, id: Uuid) -> Result<Option<Refund>, EngineError> {
    sqlx::query_as::<_, RefundRow>("SELECT * FROM refunds WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .map(Refund::try_from)
        .transpose()
}

pub async fn find_by_provider_id(
    pool: &PgPool,
    transaction_id: Uuid,
    provider_refund_id: &str,
) -> Result<Option<Refund>, EngineError> {
    sqlx::query_as::<_, RefundRow>(
        "SELECT * FROM refunds WHERE transaction_id = $1 AND provider_refund_id = $2",
    )
    .bind(transaction_id)
    .bind(provider_refund_id)
    .fetch_optional(pool)
    .await?
    .map(Refund::try_from)
    .transpose()
}

pub async fn list(pool: &PgPool, transaction_id: Uuid) -> Result<Vec<Refund>, EngineError> {
    sqlx::query_as::<_, RefundRow>(
        "SELECT * FROM refunds WHERE transaction_id = $1 ORDER BY created_at, id",
    )
    .bind(transaction_id)
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(Refund::try_from)
    .collect()
}

/// Moves a refund out of `pending`. Only one caller ever sees the row come
/// back, so the balance update that follows runs at most once per refund.
async fn settle_row(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    refund_id: Uuid,
    status: RefundStatus,
    settlement: &RefundSettlement,
) -> Result<Option<Refund>, EngineError> {
    sqlx::query_as::<_, RefundRow>(
        r#"
        UPDATE refunds
        SET status             = $2,
            provider_refund_id = COALESCE($3, provider_refund_id),
            provider_payload   = COALESCE($4, provider_payload),
            failure_reason     = COALESCE($5, failure_reason),
            updated_at         = now()
        WHERE id = $1 AND status = 'pending'
        RETURNING *
        "#,
    )
    .bind(refund_id)
    .bind(status.as_str())
    .bind(&settlement.provider_refund_id)
    .bind(&settlement.provider_payload)
    .bind(&settlement.failure_reason)
    .fetch_optional(&mut **tx)
    .await?
    .map(Refund::try_from)
    .transpose()
}

pub async fn complete(
    pool: &PgPool,
    refund_id: Uuid,
    settlement: &RefundSettlement,
) -> Result<Option<(Refund, Transaction)>, EngineError> {
    let mut tx = pool.begin().await?;

    let Some(refund) = settle_row(&mut tx, refund_id, RefundStatus::Completed, settlement).await?
    else {
        tx.rollback().await?;
        return Ok(None);
    };

    // SET expressions see the pre-update row.
    let row = sqlx::query_as::<_, TransactionRow>(
        r#"
        UPDATE transactions
        SET refunded_amount = refunded_amount + $2,
            refund_reserved = GREATEST(refund_reserved - $2, 0),
            status          = CASE WHEN refunded_amount + $2 >= amount
                                   THEN 'refunded' ELSE 'partially_refunded' END,
            updated_at      = now()
        WHERE id = $1 AND refunded_amount + $2 <= amount
        RETURNING *
        "#,
    )
    .bind(refund.transaction_id)
    .bind(refund.amount.minor_units())
    .fetch_optional(&mut *tx)
    .await?;

    let Some(row) = row else {
        tx.rollback().await?;
        return Err(EngineError::Validation(format!(
            "refund {refund_id} would exceed transaction amount"
        )));
    };

    tx.commit().await?;
    Ok(Some((refund, row.try_into()?)))
}

pub async fn fail(
    pool: &PgPool,
    refund_id: Uuid,
    settlement: &RefundSettlement,
) -> Result<Option<Refund>, EngineError> {
    let mut tx = pool.begin().await?;

    let Some(refund) = settle_row(&mut tx, refund_id, RefundStatus::Failed, settlement).await?
    else {
        tx.rollback().await?;
        return Ok(None);
    };

    sqlx::query(
        r#"
        UPDATE transactions
        SET refund_reserved = GREATEST(refund_reserved - $2, 0),
            updated_at      = now()
        WHERE id = $1
        "#,
    )
    .bind(refund.transaction_id)
    .bind(refund.amount.minor_units())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(Some(refund))
}
