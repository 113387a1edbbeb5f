use {
    crate::services::webhook_processor::WebhookProcessor,
    chrono::Utc,
    std::time::Duration,
    tokio::sync::watch,
};

const BATCH_SIZE: i64 = 50;

/// Events younger than this are still being handled inline by `receive`.
const GRACE_SECS: i64 = 10;

/// Periodically re-runs webhook events that were logged and verified but
/// never finished (crash mid-processing, database hiccup).
pub async fn run_reprocessor(
    processor: WebhookProcessor,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::info!(interval_secs = interval.as_secs(), "webhook reprocessor started");

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                tracing::info!("webhook reprocessor shutting down");
                return;
            }
            _ = tokio::time::sleep(interval) => {}
        }

        let cutoff = Utc::now() - chrono::Duration::seconds(GRACE_SECS);
        match processor.reprocess(cutoff, BATCH_SIZE).await {
            Ok(0) => {}
            Ok(n) => tracing::info!(count = n, "reprocessed webhook events"),
            Err(e) => tracing::error!(error = %e, "webhook reprocessor poll error"),
        }
    }
}
