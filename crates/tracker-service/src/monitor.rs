use crate::account::AccountService;
use crate::swap::diff_swaps;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use tracker_core::types::WalletActivity;
use tracker_core::{Result, TokenDataProvider, TransactionSource};
use tracker_metrics::counters;
use tracker_ws::{Listener, Notification, SubscriptionChannel, Supervisor};

/// Notifications processed concurrently by the consumer
const MAX_IN_FLIGHT: usize = 16;

/// Consumes wallet log notifications and publishes decoded swap activity
pub struct ActivityMonitor {
    channel: Arc<SubscriptionChannel>,
    accounts: Arc<AccountService>,
    source: Arc<dyn TransactionSource>,
    provider: Arc<dyn TokenDataProvider>,
    activity: broadcast::Sender<WalletActivity>,
}

impl ActivityMonitor {
    pub fn new(
        channel: Arc<SubscriptionChannel>,
        accounts: Arc<AccountService>,
        source: Arc<dyn TransactionSource>,
        provider: Arc<dyn TokenDataProvider>,
        activity: broadcast::Sender<WalletActivity>,
    ) -> Self {
        Self {
            channel,
            accounts,
            source,
            provider,
            activity,
        }
    }

    /// Connect, restore stored subscriptions and start consuming.
    ///
    /// Returns once connected. The handle resolves when `cancel` fires, or with
    /// an error when the connection is lost for good.
    pub async fn start(self: &Arc<Self>, cancel: CancellationToken) -> Result<JoinHandle<Result<()>>> {
        // Listen before subscribing so the first notifications are not missed
        let listener = self.channel.listen();
        if let Err(e) = self.channel.connect().await {
            self.channel.stop_listening(listener.id());
            return Err(e);
        }
        if let Err(e) = self.accounts.restore_subscriptions().await {
            self.channel.stop_listening(listener.id());
            self.channel.disconnect();
            return Err(e);
        }

        let consumer = tokio::spawn(self.clone().consume(listener, cancel.clone()));
        let supervisor = Supervisor::new(self.channel.clone());
        let channel = self.channel.clone();

        Ok(tokio::spawn(async move {
            let result = supervisor.run(cancel.clone()).await;
            if let Err(e) = &result {
                warn!(error = %e, "Subscription feed stopped");
            }
            // Ends the consumer's listener; the channel can be connected again
            channel.disconnect();
            if let Err(e) = consumer.await {
                warn!(error = %e, "Activity consumer task failed");
            }
            info!("Activity monitor stopped");
            result
        }))
    }

    async fn consume(self: Arc<Self>, mut listener: Listener<Notification>, cancel: CancellationToken) {
        let mut in_flight = JoinSet::new();
        loop {
            let notification = tokio::select! {
                _ = cancel.cancelled() => break,
                next = listener.recv() => match next {
                    Some(notification) => notification,
                    None => break,
                },
            };

            while in_flight.len() >= MAX_IN_FLIGHT {
                in_flight.join_next().await;
            }

            let monitor = self.clone();
            in_flight.spawn(async move { monitor.handle(notification).await });
        }

        self.channel.stop_listening(listener.id());
        in_flight.shutdown().await;
        debug!("Notification consumer finished");
    }

    async fn handle(&self, notification: Notification) {
        let wallet = self.channel.wallet_for(notification.subscription);
        match decode_activity(
            self.source.as_ref(),
            self.provider.as_ref(),
            &notification,
            wallet,
        )
        .await
        {
            Ok(Some(activity)) => {
                counters::swaps_detected(activity.swaps.len() as u64);
                info!(
                    signature = %activity.signature,
                    wallet = activity.wallet.as_deref().unwrap_or("unknown"),
                    swaps = activity.swaps.len(),
                    "Swap activity detected"
                );
                // No receivers is fine
                let _ = self.activity.send(activity);
            }
            Ok(None) => {}
            Err(e) => {
                counters::errors(1, e.kind());
                warn!(subscription = notification.subscription, error = %e, "Failed to decode wallet activity");
            }
        }
    }
}

/// Turn one logs notification into swap activity.
///
/// Failed transactions and logs without a swap mention are skipped without a
/// lookup. The subscribed wallet owns the balances being diffed; when the
/// subscription is unknown the fee payer stands in.
pub async fn decode_activity(
    source: &dyn TransactionSource,
    provider: &dyn TokenDataProvider,
    notification: &Notification,
    wallet: Option<String>,
) -> Result<Option<WalletActivity>> {
    if notification.method != "logsNotification" {
        trace!(method = %notification.method, "Ignoring notification");
        return Ok(None);
    }
    let update = notification.logs()?;
    if update.failed() || !update.may_contain_swap() {
        return Ok(None);
    }

    let transaction = source.get_transaction(&update.signature).await?;
    if transaction.failed {
        return Ok(None);
    }
    let Some(owner) = wallet
        .clone()
        .or_else(|| transaction.fee_payer().map(str::to_string))
    else {
        return Ok(None);
    };

    let swaps = diff_swaps(
        &owner,
        &transaction.pre_token_balances,
        &transaction.post_token_balances,
        provider,
    )
    .await?;
    if swaps.is_empty() {
        return Ok(None);
    }

    Ok(Some(WalletActivity {
        signature: update.signature,
        wallet: Some(owner),
        subscription_id: update.subscription,
        slot: update.slot,
        swaps,
    }))
}
