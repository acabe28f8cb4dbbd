//! Async exchange logger that batches analytics records into the database.
//!
//! MPSC channel → batch INSERT. The request path only ever does a
//! non-blocking `try_send`; a full channel drops the record with a warning
//! rather than delaying a response.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tokio::sync::mpsc;

/// One prompt/response exchange, recorded for analytics.
#[derive(Debug, Clone)]
pub struct ExchangeRecord {
    pub request_id: String,
    pub endpoint: String,
    pub provider: String,
    pub model: String,
    pub prompt: String,
    pub response: String,
    pub rag_used: bool,
    pub mcp_used: bool,
    pub status: String,
    pub duration_ms: i32,
    pub timestamp: DateTime<Utc>,
}

pub struct ExchangeLogger {
    tx: mpsc::Sender<ExchangeRecord>,
}

impl ExchangeLogger {
    pub fn new(pool: PgPool) -> Self {
        let (tx, rx) = mpsc::channel(1000);
        tokio::spawn(Self::writer_task(rx, pool));
        Self { tx }
    }

    /// Queue a record for the background writer. Never blocks.
    pub fn log(&self, record: ExchangeRecord) {
        if let Err(e) = self.tx.try_send(record) {
            tracing::warn!("Exchange log channel full, dropping record: {}", e);
        }
    }

    async fn writer_task(mut rx: mpsc::Receiver<ExchangeRecord>, pool: PgPool) {
        let mut buffer: Vec<ExchangeRecord> = Vec::with_capacity(50);
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(2));

        loop {
            tokio::select! {
                maybe_record = rx.recv() => {
                    match maybe_record {
                        Some(record) => {
                            buffer.push(record);
                            if buffer.len() >= 50 {
                                Self::flush(&pool, &mut buffer).await;
                            }
                        }
                        None => {
                            // Channel closed — flush remaining records
                            if !buffer.is_empty() {
                                Self::flush(&pool, &mut buffer).await;
                            }
                            break;
                        }
                    }
                }
                _ = interval.tick() => {
                    if !buffer.is_empty() {
                        Self::flush(&pool, &mut buffer).await;
                    }
                }
            }
        }

        tracing::info!("Exchange logger writer task stopped");
    }

    async fn flush(pool: &PgPool, buffer: &mut Vec<ExchangeRecord>) {
        let mut builder = sqlx::QueryBuilder::<sqlx::Postgres>::new(
            "INSERT INTO ai_exchanges (request_id, endpoint, provider, model, prompt, response, \
             rag_used, mcp_used, status, duration_ms, created_at) ",
        );

        builder.push_values(buffer.iter(), |mut row, record| {
            row.push_bind(&record.request_id)
                .push_bind(&record.endpoint)
                .push_bind(&record.provider)
                .push_bind(&record.model)
                .push_bind(&record.prompt)
                .push_bind(&record.response)
                .push_bind(record.rag_used)
                .push_bind(record.mcp_used)
                .push_bind(&record.status)
                .push_bind(record.duration_ms)
                .push_bind(record.timestamp);
        });

        if let Err(e) = builder.build().execute(pool).await {
            tracing::warn!(
                count = buffer.len(),
                error = %e,
                "Failed to flush exchange log batch"
            );
        }

        buffer.clear();
    }
}
