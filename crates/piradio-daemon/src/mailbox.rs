/// Hand-off from the command sources to the control loop.
///
/// A bounded FIFO: commands are applied in arrival order.  When the loop is
/// busy (e.g. blocked waiting for a player to exit) and the queue is full,
/// further commands are dropped with a warning instead of blocking the
/// producer.
use std::fmt;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

pub const MAILBOX_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Keyboard,
    Http,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Keyboard => f.write_str("keyboard"),
            Origin::Http => f.write_str("http"),
        }
    }
}

#[derive(Debug)]
pub struct Envelope {
    pub token: char,
    pub origin: Origin,
    /// Completed by the control loop once the command has been applied and
    /// the new status published.
    pub ack: Option<oneshot::Sender<()>>,
}

/// Result of [`Mailbox::post_and_wait`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Applied,
    TimedOut,
    Dropped,
}

#[derive(Clone)]
pub struct Mailbox {
    tx: mpsc::Sender<Envelope>,
}

pub fn channel() -> (Mailbox, mpsc::Receiver<Envelope>) {
    let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
    (Mailbox { tx }, rx)
}

impl Mailbox {
    /// Fire and forget.  Never blocks, so it is safe from the keyboard thread.
    pub fn post(&self, token: char, origin: Origin) -> bool {
        self.deliver(Envelope {
            token,
            origin,
            ack: None,
        })
    }

    /// Post and wait until the control loop has applied the command, or
    /// `timeout` passes.
    pub async fn post_and_wait(&self, token: char, origin: Origin, timeout: Duration) -> Delivery {
        let (ack_tx, ack_rx) = oneshot::channel();
        let posted = self.deliver(Envelope {
            token,
            origin,
            ack: Some(ack_tx),
        });
        if !posted {
            return Delivery::Dropped;
        }
        match tokio::time::timeout(timeout, ack_rx).await {
            Ok(Ok(())) => Delivery::Applied,
            // Loop went away without answering.
            Ok(Err(_)) => Delivery::Dropped,
            Err(_) => Delivery::TimedOut,
        }
    }

    fn deliver(&self, envelope: Envelope) -> bool {
        let token = envelope.token;
        match self.tx.try_send(envelope) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(env)) => {
                warn!("Mailbox full, dropping {:?} from {}", token, env.origin);
                false
            }
            Err(mpsc::error::TrySendError::Closed(env)) => {
                debug!("Mailbox closed, dropping {:?} from {}", token, env.origin);
                false
            }
        }
    }
}
