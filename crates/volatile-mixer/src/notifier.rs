//! External-change notification for the mixer
//!
//! Two strategies share one interface: wake when one of the mixer's poll
//! descriptors becomes readable, or wake on a fixed interval when the mixer
//! has no descriptors to offer.

use futures_util::future::select_all;
use std::io;
use std::os::fd::{BorrowedFd, OwnedFd, RawFd};
use std::time::Duration;
use tokio::io::Interest;
use tokio::io::unix::AsyncFd;
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};

/// Register a duplicate of `fd` so the watch never outlives its descriptor
fn register(fd: RawFd) -> io::Result<AsyncFd<OwnedFd>> {
    // SAFETY: `fd` comes from an open mixer handle and is only used here to
    // duplicate it.
    let owned = unsafe { BorrowedFd::borrow_raw(fd) }.try_clone_to_owned()?;
    // SAFETY: the AsyncFd owns `owned`, so it stays open and unchanged for
    // the registration's whole lifetime.
    Ok(unsafe { AsyncFd::register_with_interest(owned, Interest::READABLE) }?)
}

#[derive(Debug)]
enum Strategy {
    Readiness(Vec<AsyncFd<OwnedFd>>),
    Timer(Interval),
}

/// Waits for the mixer to change underneath the applet.
///
/// Readiness watches hold duplicates of the mixer's descriptors, which keep
/// the underlying files open until the notifier is dropped.
#[derive(Debug)]
pub struct ChangeNotifier {
    strategy: Strategy,
}

impl ChangeNotifier {
    /// Prefer readiness on `fds`, falling back to a timer.
    ///
    /// Needs a running tokio runtime.
    pub fn watch(fds: &[RawFd], fallback: Duration) -> Self {
        if fds.is_empty() {
            tracing::debug!("Mixer offers no poll descriptors, polling every {:?}", fallback);
            return Self::timer(fallback);
        }

        match Self::readiness(fds) {
            Ok(notifier) => notifier,
            Err(e) => {
                tracing::warn!(
                    "Cannot watch mixer descriptors ({}), polling every {:?}",
                    e,
                    fallback
                );
                Self::timer(fallback)
            }
        }
    }

    /// Register `fds` with the event loop for read readiness
    pub fn readiness(fds: &[RawFd]) -> io::Result<Self> {
        if fds.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "no descriptors to watch",
            ));
        }

        let watched = fds
            .iter()
            .map(|&fd| register(fd))
            .collect::<io::Result<Vec<_>>>()?;

        tracing::debug!("Watching {} mixer descriptor(s)", watched.len());
        Ok(Self {
            strategy: Strategy::Readiness(watched),
        })
    }

    /// Wake every `period`, starting one period from now
    pub fn timer(period: Duration) -> Self {
        let mut timer = interval_at(Instant::now() + period, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            strategy: Strategy::Timer(timer),
        }
    }

    pub fn is_readiness(&self) -> bool {
        matches!(self.strategy, Strategy::Readiness(_))
    }

    /// Resolve on the next wake.
    ///
    /// For readiness the wake is consumed here; the caller still has to
    /// drain the mixer's event queue before reading state.
    pub async fn changed(&mut self) -> io::Result<()> {
        match &mut self.strategy {
            Strategy::Readiness(fds) => {
                let waits = fds.iter().map(|fd| Box::pin(fd.readable()));
                let (ready, _, _) = select_all(waits).await;
                let mut guard = ready?;
                guard.clear_ready();
                Ok(())
            }
            Strategy::Timer(timer) => {
                timer.tick().await;
                Ok(())
            }
        }
    }
}
