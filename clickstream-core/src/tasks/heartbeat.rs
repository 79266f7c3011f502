//! Periodic session heartbeat.
//!
//! Every tick persists the live cart session (without re-arming its
//! inactivity timer) and applies the time-on-site funnel rules: an engaged
//! visit advances to `Interest`, a long one to `Consideration`. Both
//! advances go through the monotonic funnel, so repeated ticks are no-ops
//! once the stage has been passed.

use std::sync::Arc;
use std::time::Duration;

use clickstream_common::models::funnel::FunnelStage;
use serde_json::Map;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::config::SessionConfig;
use crate::services::cart_watcher::CartWatcher;
use crate::services::funnel_service::FunnelTracker;

pub fn spawn_session_heartbeat(
    cart: CartWatcher,
    funnel: Arc<FunnelTracker>,
    config: SessionConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let interval = Duration::from_secs(config.heartbeat_secs);
        // Engagement time is measured in whole ticks, so the rules stay on
        // the same clock as the sleep that drives them.
        let mut elapsed_secs: u64 = 0;
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        debug!("session heartbeat stopping");
                        break;
                    }
                    continue;
                }
            }
            elapsed_secs += config.heartbeat_secs;
            cart.heartbeat().await;

            if elapsed_secs >= config.deep_engaged_after_secs {
                funnel
                    .advance_to(
                        FunnelStage::Consideration,
                        "extended_engagement",
                        0.0,
                        Map::new(),
                    )
                    .await;
            } else if elapsed_secs >= config.engaged_after_secs {
                funnel
                    .advance_to(FunnelStage::Interest, "time_engagement", 0.0, Map::new())
                    .await;
            }
        }
    })
}
