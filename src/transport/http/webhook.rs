use {
    super::{
        errors::ApiError,
        handlers::{ApiOk, ok},
    },
    crate::{
        AppState,
        domain::{error::EngineError, id::ProviderKey, webhook::WebhookReceipt},
    },
    axum::{
        Json,
        body::Bytes,
        extract::{Path, State},
        http::HeaderMap,
    },
};

/// `POST /webhooks/{provider}`. Answers 200 once the delivery is logged
/// and verified, whatever processing made of it.
#[tracing::instrument(
    name = "webhook",
    skip_all,
    fields(
        provider = tracing::field::Empty,
        event_id = tracing::field::Empty,
        event_type = tracing::field::Empty
    )
)]
pub async fn receive(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ApiOk<WebhookReceipt>>, ApiError> {
    tracing::Span::current().record("provider", tracing::field::display(&provider));

    let provider = ProviderKey::new(provider)
        .map_err(|_| EngineError::NotFound("unknown webhook provider".into()))?;
    let gateway = state.orchestrator.gateways().get(&provider)?;

    let signature = headers
        .get(gateway.signature_header())
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let receipt = state
        .webhooks
        .receive(&provider, body.to_vec(), signature)
        .await?;
    Ok(ok(receipt))
}
