use actix::prelude::*;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::messages::PublishStatus;
use crate::messages::telemetry::StatusUpdate;
use crate::services::{TelemetryChannel, TelemetryService};

const RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// TelemetryActor pushes the latest status to the remote backends on its
/// own cadence, decoupled from the capture loop.
///
/// Delivery is best effort: a failed flush keeps the update pending and
/// the fixed 1-second interval retries it indefinitely; a newer update
/// supersedes a pending one. Errors never leave this actor.
pub struct TelemetryActor {
    channels: Vec<TelemetryChannel>,
    pending: Option<StatusUpdate>,
    in_flight: bool,
}

impl Actor for TelemetryActor {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!("TelemetryActor started with {} channels", self.channels.len());

        ctx.run_interval(RETRY_INTERVAL, |actor, ctx| {
            actor.flush(ctx);
        });
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        info!("TelemetryActor stopped");
    }
}

impl TelemetryActor {
    pub fn new(channels: Vec<TelemetryChannel>) -> Self {
        Self {
            channels,
            pending: None,
            in_flight: false,
        }
    }

    fn flush(&mut self, ctx: &mut Context<Self>) {
        if self.in_flight || self.channels.is_empty() {
            return;
        }
        let Some(update) = self.pending.take() else {
            return;
        };
        self.in_flight = true;

        let channels = self.channels.clone();
        let attempt = update.clone();
        ctx.spawn(
            async move {
                let attempt = &attempt;
                let results =
                    futures::future::join_all(channels.iter().map(|channel| async move {
                        (channel.name(), channel.publish(attempt).await)
                    }))
                    .await;

                let mut failed = 0usize;
                for (name, result) in results {
                    if let Err(err) = result {
                        warn!("Telemetry push to {} failed: {}", name, err);
                        failed += 1;
                    }
                }
                failed
            }
            .into_actor(self)
            .map(move |failed, actor, _ctx| {
                actor.in_flight = false;
                if failed == 0 {
                    debug!("Telemetry update delivered");
                } else if actor.pending.is_none() {
                    // Nothing newer arrived meanwhile; keep this update for
                    // the next interval tick.
                    actor.pending = Some(update);
                }
            }),
        );
    }
}

impl Handler<PublishStatus> for TelemetryActor {
    type Result = ();

    fn handle(&mut self, msg: PublishStatus, ctx: &mut Self::Context) -> Self::Result {
        self.pending = Some(msg.update);
        // Try immediately; the interval only exists for retries.
        self.flush(ctx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::AlertStatus;
    use crate::services::generic::test_mocks::MockTelemetryService;
    use std::sync::Arc;

    fn update(status: AlertStatus, total: u64) -> PublishStatus {
        PublishStatus {
            update: StatusUpdate {
                status,
                total_confirmed: total,
                note: None,
            },
        }
    }

    #[actix::test]
    async fn publishes_to_every_channel() {
        let first = Arc::new(MockTelemetryService::new());
        let second = Arc::new(MockTelemetryService::new());
        let actor = TelemetryActor::new(vec![
            TelemetryChannel::MockedService(first.clone()),
            TelemetryChannel::MockedService(second.clone()),
        ])
        .start();

        actor.send(update(AlertStatus::Alert, 1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(first.publish_count(), 1);
        assert_eq!(second.publish_count(), 1);
        assert_eq!(first.last_update().unwrap().total_confirmed, 1);
    }

    #[actix::test]
    async fn failed_update_is_retried_until_it_lands() {
        let channel = Arc::new(MockTelemetryService::new());
        channel.set_failure(true);
        let actor = TelemetryActor::new(vec![TelemetryChannel::MockedService(channel.clone())]).start();

        actor.send(update(AlertStatus::Alert, 3)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(channel.publish_count(), 0);

        // Backend recovers; the pending update lands on a later interval
        // tick without being resent by the caller.
        channel.set_failure(false);
        tokio::time::sleep(Duration::from_millis(2_200)).await;
        assert_eq!(channel.publish_count(), 1);
        assert_eq!(channel.last_update().unwrap().total_confirmed, 3);
    }

    #[actix::test]
    async fn newer_update_supersedes_a_pending_one() {
        let channel = Arc::new(MockTelemetryService::new());
        channel.set_failure(true);
        let actor = TelemetryActor::new(vec![TelemetryChannel::MockedService(channel.clone())]).start();

        actor.send(update(AlertStatus::Alert, 1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        actor.send(update(AlertStatus::Normal, 2)).await.unwrap();
        channel.set_failure(false);
        tokio::time::sleep(Duration::from_millis(2_200)).await;

        assert!(channel.publish_count() >= 1);
        assert_eq!(channel.last_update().unwrap().total_confirmed, 2);
    }

    #[actix::test]
    async fn no_channels_is_a_quiet_no_op() {
        let actor = TelemetryActor::new(vec![]).start();
        actor.send(update(AlertStatus::Normal, 0)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
