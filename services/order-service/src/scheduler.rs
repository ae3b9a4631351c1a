use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::error::AppResult;
use crate::repositories::CommerceStore;
use crate::services::reconciliation::ReconciliationPipeline;

const SYNC_ATTEMPTS: u32 = 3;

// Jeda minimum sebelum transaksi yang sama di-sync ulang
const RESYNC_BACKOFF_MINUTES: i64 = 15;

/// Background sync untuk transaksi QRIS yang webhook-nya tidak pernah datang
/// atau settlement yang belum sampai ke payment
pub struct PaymentSyncScheduler {
    store: Arc<dyn CommerceStore>,
    pipeline: ReconciliationPipeline,
    interval: Duration,
}

impl PaymentSyncScheduler {
    pub fn new(store: Arc<dyn CommerceStore>, pipeline: ReconciliationPipeline, interval: Duration) -> Self {
        Self {
            store,
            pipeline,
            interval,
        }
    }

    pub fn start(self, disabled: bool) {
        if disabled {
            tracing::info!("💳 Payment sync scheduler disabled via DISABLE_SCHEDULER environment variable");
            return;
        }

        tracing::info!("💳 Starting payment sync scheduler (setiap {}s)...", self.interval.as_secs());

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);

            loop {
                interval.tick().await;

                match self.run_once().await {
                    Ok(0) => {}
                    Ok(synced) => tracing::info!("✅ Sinkronisasi {} transaksi QRIS", synced),
                    Err(e) => tracing::error!("❌ Gagal mengambil transaksi QRIS untuk sync: {}", e),
                }
            }
        });
    }

    /// Satu putaran sync, kembalikan jumlah transaksi yang berhasil disinkronkan
    pub async fn run_once(&self) -> AppResult<usize> {
        let now = Utc::now();
        let due = self
            .store
            .transactions_due_for_sync(now, now - chrono::Duration::minutes(RESYNC_BACKOFF_MINUTES))
            .await?;
        let mut synced = 0;

        for transaction in due {
            self.store.mark_sync_attempt(transaction.order_id, Utc::now()).await?;

            for attempt in 1..=SYNC_ATTEMPTS {
                match self.pipeline.sync_from_gateway(transaction.order_id).await {
                    Ok(outcome) => {
                        tracing::debug!("Sync order {}: {:?}", transaction.order_id, outcome);
                        synced += 1;
                        break;
                    }
                    Err(e) if attempt == SYNC_ATTEMPTS => {
                        tracing::error!(
                            "❌ Gagal sync order {} setelah {} percobaan: {}",
                            transaction.order_id,
                            SYNC_ATTEMPTS,
                            e
                        );
                    }
                    Err(_) => tokio::time::sleep(Duration::from_millis(1000)).await,
                }
            }
        }

        Ok(synced)
    }
}
