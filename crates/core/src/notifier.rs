//! Live notifier: relays broadcast events to one attached observer.
//!
//! The transport (a WebSocket in the server) implements [`NotifierSession`].
//! Payloads are forwarded unmodified. A session that stops reading only
//! lags its own subscription; it never slows the publisher.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::events::{RecvError, Subscription};
use crate::metrics::{NOTIFIER_LAGGED, NOTIFIER_MESSAGES, NOTIFIER_PINGS};

#[derive(Debug, Error)]
pub enum NotifierError {
    #[error("session closed")]
    Closed,

    #[error("send failed: {0}")]
    Send(String),
}

/// One connected observer.
#[async_trait]
pub trait NotifierSession: Send {
    async fn send_text(&mut self, text: String) -> Result<(), NotifierError>;

    async fn send_ping(&mut self) -> Result<(), NotifierError>;
}

/// Why a relay ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayEnd {
    Cancelled,
    SessionFailed,
    SubscriptionClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayOutcome {
    pub end: RelayEnd,
    pub forwarded: u64,
    pub pings: u64,
    /// Messages this observer missed because it fell behind.
    pub lagged: u64,
}

/// Forward `subscription` to `session` until cancelled or either side ends.
///
/// A ping goes out every `ping_interval` regardless of traffic. The
/// subscription is always released on return.
pub async fn relay<S>(
    session: &mut S,
    mut subscription: Subscription,
    ping_interval: Duration,
    mut cancel: watch::Receiver<bool>,
) -> RelayOutcome
where
    S: NotifierSession + ?Sized,
{
    let mut ping = tokio::time::interval_at(Instant::now() + ping_interval, ping_interval);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut outcome = RelayOutcome {
        end: RelayEnd::Cancelled,
        forwarded: 0,
        pings: 0,
        lagged: 0,
    };

    loop {
        if *cancel.borrow() {
            break;
        }

        tokio::select! {
            biased;
            changed = cancel.changed() => {
                if changed.is_err() || *cancel.borrow() {
                    break;
                }
            }
            _ = ping.tick() => {
                if let Err(e) = session.send_ping().await {
                    debug!("Ping to observer of {} failed: {}", subscription.key(), e);
                    outcome.end = RelayEnd::SessionFailed;
                    break;
                }
                NOTIFIER_PINGS.inc();
                outcome.pings += 1;
            }
            received = subscription.recv() => {
                match received {
                    Ok(text) => {
                        if let Err(e) = session.send_text(text).await {
                            debug!("Send to observer of {} failed: {}", subscription.key(), e);
                            outcome.end = RelayEnd::SessionFailed;
                            break;
                        }
                        NOTIFIER_MESSAGES.inc();
                        outcome.forwarded += 1;
                    }
                    Err(RecvError::Lagged(n)) => {
                        warn!("Observer of {} lagged, skipped {} messages", subscription.key(), n);
                        NOTIFIER_LAGGED.inc_by(n);
                        outcome.lagged += n;
                    }
                    Err(RecvError::Closed) => {
                        outcome.end = RelayEnd::SubscriptionClosed;
                        break;
                    }
                }
            }
        }
    }

    subscription.unsubscribe();
    outcome
}
