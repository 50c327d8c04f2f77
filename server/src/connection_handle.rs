use classroom_system::uuid::Uuid;
use classroom_system::{ConnectionId, SessionId, User};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

/// A pre-serialized frame, shared between every queue it is broadcast to.
pub type Outgoing = Arc<str>;

/// Which session a connection currently owns.
///
/// `Closed` is terminal: once the hub has let go of the connection no new
/// session may be bound to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionSlot {
    Idle,
    Active(SessionId),
    Closed,
}

impl SessionSlot {
    pub fn take_active(&mut self) -> Option<SessionId> {
        match *self {
            SessionSlot::Active(session_id) => {
                *self = SessionSlot::Idle;
                Some(session_id)
            }
            _ => None,
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, SessionSlot::Closed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Queued,
    Full,
    Closed,
}

/// The hub's and the handlers' view of one connected peer.
#[derive(Clone)]
pub struct ConnectionHandle {
    pub id: ConnectionId,
    pub user: User,
    /// Set for the primary (teacher) device.
    pub is_main: bool,
    outbound: mpsc::Sender<Outgoing>,
    closed: CancellationToken,
    session: Arc<Mutex<SessionSlot>>,
}

/// Receiving end of a connection's outbound queue, owned by its outbound pump.
pub struct OutboundQueue {
    pub(crate) rx: mpsc::Receiver<Outgoing>,
    pub(crate) closed: CancellationToken,
}

impl ConnectionHandle {
    pub fn new(user: User, is_main: bool, capacity: usize) -> (Self, OutboundQueue) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let closed = CancellationToken::new();
        let handle = Self {
            id: Uuid::new_v4(),
            user,
            is_main,
            outbound: tx,
            closed: closed.clone(),
            session: Arc::new(Mutex::new(SessionSlot::Idle)),
        };
        (handle, OutboundQueue { rx, closed })
    }

    /// Enqueues without waiting. A full queue is reported, never awaited.
    pub fn deliver(&self, message: Outgoing) -> Delivery {
        if self.closed.is_cancelled() {
            return Delivery::Closed;
        }
        match self.outbound.try_send(message) {
            Ok(()) => Delivery::Queued,
            Err(TrySendError::Full(_)) => Delivery::Full,
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }

    /// Closes the outbound queue. Safe to call more than once.
    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    pub async fn session_slot(&self) -> MutexGuard<'_, SessionSlot> {
        self.session.lock().await
    }

    pub async fn active_session(&self) -> Option<SessionId> {
        match *self.session.lock().await {
            SessionSlot::Active(session_id) => Some(session_id),
            _ => None,
        }
    }

    /// Closes the slot for good, returning the session that was still active.
    pub async fn retire_session(&self) -> Option<SessionId> {
        let mut slot = self.session.lock().await;
        let active = slot.take_active();
        *slot = SessionSlot::Closed;
        active
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("user", &self.user.id)
            .field("is_main", &self.is_main)
            .field("closed", &self.is_closed())
            .finish()
    }
}
