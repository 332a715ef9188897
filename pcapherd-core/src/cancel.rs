//! Cooperative cancellation for worker pools.
//!
//! A single [`Canceller`] governs one top-level operation (map, replay,
//! filter). Workers hold cloned [`CancelToken`]s and observe cancellation at
//! their next suspension point: a loop head check via
//! [`CancelToken::is_cancelled`], or mid-sleep via [`CancelToken::sleep`],
//! which wakes immediately when the scope is cancelled.
//!
//! Built on a zero-capacity crossbeam channel: dropping the inner sender is
//! the cancellation signal, so `select!` can race it against timers and
//! data channels without any polling.

use std::sync::Mutex;
use std::time::Duration;

use crossbeam_channel::{after, bounded, select, Receiver, Sender, TryRecvError};

/// Cancellation side of the pair. Cheap to share behind an `Arc`, safe to
/// trigger from a signal handler. Cancelling twice is a no-op.
pub struct Canceller {
    tx: Mutex<Option<Sender<()>>>,
}

impl Canceller {
    /// Cancel the scope. Every token wakes at its next suspension point.
    pub fn cancel(&self) {
        if let Ok(mut guard) = self.tx.lock() {
            guard.take();
        }
    }
}

/// Worker side of the pair.
#[derive(Clone)]
pub struct CancelToken {
    rx: Receiver<()>,
}

impl CancelToken {
    /// Non-blocking cancellation check for loop heads.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.rx.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Sleep for `dur`, waking immediately on cancellation. Returns `true`
    /// when the sleep was interrupted by cancellation.
    pub fn sleep(&self, dur: Duration) -> bool {
        select! {
            recv(self.rx) -> _ => true,
            recv(after(dur)) -> _ => false,
        }
    }

    /// The raw receiver, for composing into caller-side `select!` arms.
    pub fn receiver(&self) -> &Receiver<()> {
        &self.rx
    }

    /// A token that can never be cancelled. Useful for tests and for
    /// callers that do not need interrupt handling.
    pub fn never() -> Self {
        // Leak one sender so the channel stays open forever.
        let (tx, rx) = bounded(0);
        std::mem::forget(tx);
        CancelToken { rx }
    }
}

/// Create a linked canceller/token pair.
pub fn cancel_pair() -> (Canceller, CancelToken) {
    let (tx, rx) = bounded(0);
    (
        Canceller {
            tx: Mutex::new(Some(tx)),
        },
        CancelToken { rx },
    )
}
