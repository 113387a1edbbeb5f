use {
    super::errors::ApiError,
    crate::{
        AppState,
        domain::{
            dispute::Dispute,
            fee::Fees,
            method::PaymentMethod,
            money::{Currency, MoneyAmount},
            refund::Refund,
            transaction::{Transaction, TransactionStatus},
        },
        services::{
            orchestrator::{CreateIntent, DEFAULT_HISTORY_LIMIT},
            stats::Stats,
        },
    },
    axum::{
        Json,
        body::Bytes,
        extract::{
            Path, Query, State,
            rejection::{PathRejection, QueryRejection},
        },
    },
    serde::{Deserialize, Serialize, de::DeserializeOwned},
    uuid::Uuid,
};

const DEFAULT_STATS_WINDOW_DAYS: i64 = 30;
const DEFAULT_REFUND_REASON: &str = "requested_by_customer";

#[derive(Debug, Serialize)]
pub struct ApiOk<T> {
    pub success: bool,
    pub data: T,
}

pub fn ok<T: Serialize>(data: T) -> Json<ApiOk<T>> {
    Json(ApiOk {
        success: true,
        data,
    })
}

type ApiResult<T> = Result<Json<ApiOk<T>>, ApiError>;

/// Body parsing that reports failures in the `{success: false}` shape.
fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::bad_request(format!("invalid body: {e}")))
}

fn transaction_id(path: Result<Path<Uuid>, PathRejection>) -> Result<Uuid, ApiError> {
    path.map(|Path(id)| id).map_err(ApiError::bad_request)
}

fn amount(minor_units: i64) -> Result<MoneyAmount, ApiError> {
    Ok(MoneyAmount::new(minor_units)?)
}

#[derive(Debug, Deserialize)]
pub struct MethodsQuery {
    pub currency: String,
    pub country: String,
    pub amount: Option<i64>,
}

pub async fn list_methods(
    State(state): State<AppState>,
    query: Result<Query<MethodsQuery>, QueryRejection>,
) -> ApiResult<Vec<PaymentMethod>> {
    let Query(query) = query.map_err(ApiError::bad_request)?;
    let currency = Currency::try_from(query.currency.as_str())?;
    let amount = query.amount.map(amount).transpose()?;

    let methods = state
        .orchestrator
        .list_methods(amount, currency, &query.country)
        .into_iter()
        .cloned()
        .collect();
    Ok(ok(methods))
}

#[derive(Debug, Deserialize)]
pub struct CreateIntentBody {
    pub order_id: String,
    pub user_id: Option<String>,
    pub method_id: String,
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub extra: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct IntentView {
    pub transaction_id: Uuid,
    pub status: TransactionStatus,
    pub provider_payload: serde_json::Value,
    pub fees: Fees,
    pub transaction: Transaction,
}

pub async fn create_intent(State(state): State<AppState>, body: Bytes) -> ApiResult<IntentView> {
    let body: CreateIntentBody = parse_body(&body)?;
    let request = CreateIntent {
        order_id: body.order_id,
        user_id: body.user_id,
        method_id: body.method_id,
        amount: amount(body.amount)?,
        currency: Currency::try_from(body.currency.as_str())?,
        extra: body.extra,
    };

    let created = state.orchestrator.create_intent(request).await?;
    Ok(ok(IntentView {
        transaction_id: created.transaction.id,
        status: created.transaction.status,
        provider_payload: created.transaction.payload_json(),
        fees: created.fees,
        transaction: created.transaction,
    }))
}

#[derive(Debug, Serialize)]
pub struct TransactionView {
    pub transaction: Transaction,
    pub provider_payload: serde_json::Value,
    pub refunds: Vec<Refund>,
    pub disputes: Vec<Dispute>,
}

pub async fn get_transaction(
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<TransactionView> {
    let id = transaction_id(path)?;
    let transaction = state.orchestrator.get_transaction(id).await?;
    let refunds = state.refunds.list_refunds(id).await?;
    let disputes = state.refunds.list_disputes(id).await?;
    Ok(ok(TransactionView {
        provider_payload: transaction.payload_json(),
        transaction,
        refunds,
        disputes,
    }))
}

pub async fn confirm(
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
    body: Bytes,
) -> ApiResult<Transaction> {
    let id = transaction_id(path)?;
    let confirmation = if body.is_empty() {
        serde_json::Value::Null
    } else {
        parse_body(&body)?
    };
    Ok(ok(state.orchestrator.confirm(id, confirmation).await?))
}

pub async fn cancel(
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Transaction> {
    let id = transaction_id(path)?;
    Ok(ok(state.orchestrator.cancel(id).await?))
}

pub async fn retry(
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Transaction> {
    let id = transaction_id(path)?;
    Ok(ok(state.orchestrator.retry_intent(id).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct RefundBody {
    pub amount: Option<i64>,
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RefundView {
    pub refund: Refund,
    pub transaction: Transaction,
}

pub async fn refund(
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
    body: Bytes,
) -> ApiResult<RefundView> {
    let id = transaction_id(path)?;
    let body: RefundBody = if body.is_empty() {
        RefundBody::default()
    } else {
        parse_body(&body)?
    };
    let amount = body.amount.map(amount).transpose()?;
    let reason = body
        .reason
        .unwrap_or_else(|| DEFAULT_REFUND_REASON.to_string());

    let outcome = state.refunds.refund(id, amount, reason).await?;
    Ok(ok(RefundView {
        refund: outcome.refund,
        transaction: outcome.transaction,
    }))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub user_id: Option<String>,
    pub order_id: Option<String>,
    pub limit: Option<i64>,
}

pub async fn history(
    State(state): State<AppState>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> ApiResult<Vec<Transaction>> {
    let Query(query) = query.map_err(ApiError::bad_request)?;
    let transactions = state
        .orchestrator
        .get_transaction_history(
            query.user_id,
            query.order_id,
            query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT),
        )
        .await?;
    Ok(ok(transactions))
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub window_days: Option<i64>,
}

pub async fn stats(
    State(state): State<AppState>,
    query: Result<Query<StatsQuery>, QueryRejection>,
) -> ApiResult<Stats> {
    let Query(query) = query.map_err(ApiError::bad_request)?;
    let stats = state
        .orchestrator
        .get_stats(query.window_days.unwrap_or(DEFAULT_STATS_WINDOW_DAYS))
        .await?;
    Ok(ok(stats))
}
