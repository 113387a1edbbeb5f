use {
    crate::domain::{
        error::EngineError,
        id::ProviderKey,
        money::{Currency, MoneyAmount},
        refund::Refund,
        store::{HistoryFilter, StatsRow},
        transaction::{StatusChange, Transaction, TransactionStatus},
    },
    chrono::{DateTime, Utc},
    sqlx::{PgPool, Postgres},
    uuid::Uuid,
};

#[derive(Debug, sqlx::FromRow)]
pub(super) struct TransactionRow {
    id: Uuid,
    order_id: String,
    user_id: Option<String>,
    method_id: String,
    provider: String,
    provider_txn_id: Option<String>,
    amount: i64,
    currency: String,
    status: String,
    fee: i64,
    net_amount: i64,
    refunded_amount: i64,
    refund_reserved: i64,
    provider_payload: Option<Vec<u8>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = EngineError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            order_id: row.order_id,
            user_id: row.user_id,
            method_id: row.method_id,
            provider: ProviderKey::new(row.provider)?,
            provider_txn_id: row.provider_txn_id,
            amount: MoneyAmount::new(row.amount)?,
            currency: Currency::try_from(row.currency.as_str())?,
            status: TransactionStatus::try_from(row.status.as_str())?,
            fee: MoneyAmount::new(row.fee)?,
            net_amount: MoneyAmount::new(row.net_amount)?,
            refunded_amount: MoneyAmount::new(row.refunded_amount)?,
            refund_reserved: MoneyAmount::new(row.refund_reserved)?,
            provider_payload: row.provider_payload,
            created_at: row.created_at,
            updated_at: row.updated_at,
            completed_at: row.completed_at,
        })
    }
}

pub(super) fn into_transaction(row: Option<TransactionRow>) -> Result<Option<Transaction>, EngineError> {
    row.map(Transaction::try_from).transpose()
}

pub async fn insert(pool: &PgPool, txn: &Transaction) -> Result<(), EngineError> {
    sqlx::query(
        r#"
        INSERT INTO transactions (
            id, order_id, user_id, method_id, provider, provider_txn_id,
            amount, currency, status, fee, net_amount, refunded_amount,
            refund_reserved, provider_payload, created_at, updated_at, completed_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
        "#,
    )
    .bind(txn.id)
    .bind(&txn.order_id)
    .bind(&txn.user_id)
    .bind(&txn.method_id)
    .bind(txn.provider.as_str())
    .bind(&txn.provider_txn_id)
    .bind(txn.amount.minor_units())
    .bind(txn.currency.as_str())
    .bind(txn.status.as_str())
    .bind(txn.fee.minor_units())
    .bind(txn.net_amount.minor_units())
    .bind(txn.refunded_amount.minor_units())
    .bind(txn.refund_reserved.minor_units())
    .bind(&txn.provider_payload)
    .bind(txn.created_at)
    .bind(txn.updated_at)
    .bind(txn.completed_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get<'e, E>(executor: E, id: Uuid) -> Result<Option<Transaction>, EngineError>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    let row = sqlx::query_as::<_, TransactionRow>("SELECT * FROM transactions WHERE id = $1")
        .bind(id)
        .fetch_optional(executor)
        .await?;
    into_transaction(row)
}

pub async fn find_by_provider_txn_id(
    pool: &PgPool,
    provider: &ProviderKey,
    provider_txn_id: &str,
) -> Result<Option<Transaction>, EngineError> {
    let row = sqlx::query_as::<_, TransactionRow>(
        "SELECT * FROM transactions WHERE provider = $1 AND provider_txn_id = $2",
    )
    .bind(provider.as_str())
    .bind(provider_txn_id)
    .fetch_optional(pool)
    .await?;
    into_transaction(row)
}

/// Compare-and-swap on `status`.
pub async fn transition(
    pool: &PgPool,
    id: Uuid,
    change: &StatusChange,
) -> Result<Option<Transaction>, EngineError> {
    let row = sqlx::query_as::<_, TransactionRow>(
        r#"
        UPDATE transactions
        SET status           = $3,
            provider_txn_id  = COALESCE($4, provider_txn_id),
            provider_payload = COALESCE($5, provider_payload),
            completed_at     = COALESCE($6, completed_at),
            updated_at       = now()
        WHERE id = $1 AND status = $2
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(change.expected.as_str())
    .bind(change.to.as_str())
    .bind(&change.provider_txn_id)
    .bind(&change.provider_payload)
    .bind(change.completed_at)
    .fetch_optional(pool)
    .await?;
    into_transaction(row)
}

/// Reservation and pending refund row in one database transaction. The
/// guard on the `UPDATE` is what serializes concurrent refunds.
pub async fn reserve_refund(
    pool: &PgPool,
    refund: &Refund,
) -> Result<Option<Transaction>, EngineError> {
    let mut tx = pool.begin().await?;

    let row = sqlx::query_as::<_, TransactionRow>(
        r#"
        UPDATE transactions
        SET refund_reserved = refund_reserved + $2,
            updated_at      = now()
        WHERE id = $1
          AND status IN ('completed', 'partially_refunded')
          AND refunded_amount + refund_reserved + $2 <= amount
        RETURNING *
        "#,
    )
    .bind(refund.transaction_id)
    .bind(refund.amount.minor_units())
    .fetch_optional(&mut *tx)
    .await?;

    let Some(row) = row else {
        tx.rollback().await?;
        return Ok(None);
    };

    super::refund_repo::insert(&mut *tx, refund).await?;
    tx.commit().await?;
    Ok(Some(row.try_into()?))
}

pub async fn list(pool: &PgPool, filter: &HistoryFilter) -> Result<Vec<Transaction>, EngineError> {
    let rows = sqlx::query_as::<_, TransactionRow>(
        r#"
        SELECT * FROM transactions
        WHERE ($1::text IS NULL OR user_id = $1)
          AND ($2::text IS NULL OR order_id = $2)
        ORDER BY created_at DESC, id DESC
        LIMIT $3
        "#,
    )
    .bind(&filter.user_id)
    .bind(&filter.order_id)
    .bind(filter.limit)
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(Transaction::try_from).collect()
}

#[derive(Debug, sqlx::FromRow)]
struct StatsDbRow {
    status: String,
    method_id: String,
    currency: String,
    count: i64,
    amount: i64,
    fee: i64,
    refunded: i64,
}

pub async fn stats(pool: &PgPool, since: DateTime<Utc>) -> Result<Vec<StatsRow>, EngineError> {
    let rows = sqlx::query_as::<_, StatsDbRow>(
        r#"
        SELECT status,
               method_id,
               currency,
               COUNT(*)::bigint                          AS count,
               COALESCE(SUM(amount), 0)::bigint          AS amount,
               COALESCE(SUM(fee), 0)::bigint             AS fee,
               COALESCE(SUM(refunded_amount), 0)::bigint AS refunded
        FROM transactions
        WHERE created_at >= $1
        GROUP BY status, method_id, currency
        "#,
    )
    .bind(since)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|r| {
            Ok(StatsRow {
                status: TransactionStatus::try_from(r.status.as_str())?,
                method_id: r.method_id,
                currency: Currency::try_from(r.currency.as_str())?,
                count: r.count,
                amount: r.amount,
                fee: r.fee,
                refunded: r.refunded,
            })
        })
        .collect()
}
