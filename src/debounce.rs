// debounce.rs — Latest-request-wins debouncing.
//
// Every call takes a ticket, waits out the quiet period, and only runs if no
// newer ticket was issued meanwhile. Work that already started is never
// cancelled; it re-checks its ticket before reporting so a superseded result
// is dropped instead of shown.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug)]
pub struct Debouncer {
    quiet_period: Duration,
    latest: Arc<AtomicU64>,
}

#[derive(Debug, Clone)]
pub struct Ticket {
    id: u64,
    latest: Arc<AtomicU64>,
}

impl Ticket {
    /// False once a newer ticket exists or the debouncer was invalidated.
    pub fn is_current(&self) -> bool {
        self.latest.load(Ordering::SeqCst) == self.id
    }
}

impl Debouncer {
    pub fn new(quiet_period: Duration) -> Self {
        Self {
            quiet_period,
            latest: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn issue(&self) -> Ticket {
        let id = self.latest.fetch_add(1, Ordering::SeqCst) + 1;
        Ticket {
            id,
            latest: self.latest.clone(),
        }
    }

    /// Block for the quiet period, then report whether `ticket` still wins.
    pub fn settle(&self, ticket: &Ticket) -> bool {
        if !self.quiet_period.is_zero() {
            std::thread::sleep(self.quiet_period);
        }
        ticket.is_current()
    }

    /// Make every outstanding ticket stale (owner is going away).
    pub fn invalidate(&self) {
        self.latest.fetch_add(1, Ordering::SeqCst);
    }
}
