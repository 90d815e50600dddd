//! The probe/resolve transmission scheduler.
//!
//! Multicast queries are retransmitted to compensate for packet loss,
//! which gets serious over WiFi. The scheduler emits two event kinds:
//!
//! - [`SchedEvent::NewMessage`]: prepare a fresh message (new
//!   MessageID),
//! - [`SchedEvent::Send`]: transmit the current message.
//!
//! Events are grouped as follows:
//!
//! ```text
//!  -- random pause, RETRANSMIT_DELAY_MIN..RETRANSMIT_DELAY_MAX
//!  |
//!  |      ------------------- FAST_SERIES_DELAY
//!  |      |             ----- INTER_SERIES_DELAY
//!  V      V             V
//! 1-1-1-1---2-2-2-2----------4-4-4-4---5-5-5-5----
//! <----->
//!    |
//!    `--- RETRANSMIT_SERIES_LEN sends of one message
//!
//! |<------->|
//!      |
//!      `--- FAST_SERIES_LEN retransmit series
//! ```
//!
//! In browse mode fast series repeat forever with the inter-series
//! delay between them. In resolve mode the fast series length is
//! unlimited, but the whole scheduler self-terminates after
//! [`RESOLVE_MAX_TIME`] and closes its event channel.

use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Sends per retransmit series.
pub const RETRANSMIT_SERIES_LEN: usize = 4;

/// Bounds of the random pause between retransmissions.
pub const RETRANSMIT_DELAY_MIN: Duration = Duration::from_millis(250);
pub const RETRANSMIT_DELAY_MAX: Duration = Duration::from_millis(500);

/// Retransmit series per fast series.
pub const FAST_SERIES_LEN: usize = 2;

/// Delay between retransmit series within a fast series.
pub const FAST_SERIES_DELAY: Duration = Duration::from_millis(1000);

/// Delay between fast series in browse mode.
pub const INTER_SERIES_DELAY: Duration = Duration::from_millis(5000);

/// Total lifetime of a resolve-mode scheduler.
pub const RESOLVE_MAX_TIME: Duration = Duration::from_millis(5000);

/// Events generated by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedEvent {
    /// Generate a new message.
    NewMessage,

    /// Send the current message.
    Send,
}

/// The multicast messaging scheduler.
///
/// Can be used either for continuous probing ("browse") or to chase a
/// particular peer ("resolve").
pub struct Sched {
    rx: async_channel::Receiver<SchedEvent>,
    cancel: std::sync::Arc<Notify>,
    task: JoinHandle<()>,
}

impl Sched {
    /// Creates a browse-mode scheduler.
    pub fn browse() -> Self {
        Self::new(false)
    }

    /// Creates a resolve-mode scheduler.
    pub fn resolve() -> Self {
        Self::new(true)
    }

    fn new(resolve: bool) -> Self {
        let (tx, rx) = async_channel::bounded(4);
        let cancel = std::sync::Arc::new(Notify::new());

        let task = {
            let cancel = std::sync::Arc::clone(&cancel);
            tokio::spawn(async move {
                proc(resolve, tx, cancel).await;
            })
        };

        Self { rx, cancel, task }
    }

    /// Receives the next scheduler event.
    ///
    /// Returns `None` once the scheduler is closed; a resolve-mode
    /// scheduler also closes the channel when its max time is reached.
    pub async fn next(&self) -> Option<SchedEvent> {
        self.rx.recv().await.ok()
    }

    /// Closes the scheduler: cancels the timer and drains pending
    /// events.
    pub fn close(&self) {
        self.cancel.notify_waiters();
        self.rx.close();
        while self.rx.try_recv().is_ok() {}
        self.task.abort();
    }
}

impl Drop for Sched {
    fn drop(&mut self) {
        self.close();
    }
}

async fn proc(
    resolve: bool,
    tx: async_channel::Sender<SchedEvent>,
    cancel: std::sync::Arc<Notify>,
) {
    let start = Instant::now();

    loop {
        // Fast series: in resolve mode its length is unlimited and
        // only the overall deadline stops it.
        let mut fast_count = 0;
        while fast_count < FAST_SERIES_LEN {
            if tx.send(SchedEvent::NewMessage).await.is_err() {
                return;
            }

            // Retransmit series.
            for _ in 0..RETRANSMIT_SERIES_LEN {
                if tx.send(SchedEvent::Send).await.is_err() {
                    return;
                }

                let delay = random_delay();
                if !sleep(delay, &cancel).await {
                    return;
                }
            }

            if !sleep(FAST_SERIES_DELAY, &cancel).await {
                return;
            }

            if !resolve {
                fast_count += 1;
            }

            if resolve && start.elapsed() >= RESOLVE_MAX_TIME {
                return;
            }
        }

        if !sleep(INTER_SERIES_DELAY, &cancel).await {
            return;
        }
    }
}

fn random_delay() -> Duration {
    let min = RETRANSMIT_DELAY_MIN.as_millis() as u64;
    let max = RETRANSMIT_DELAY_MAX.as_millis() as u64;
    Duration::from_millis(rand::random_range(min..=max))
}

// Cancelable sleep; false means the scheduler was closed.
async fn sleep(duration: Duration, cancel: &Notify) -> bool {
    tokio::select! {
        _ = cancel.notified() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}
