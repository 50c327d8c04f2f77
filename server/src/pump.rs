use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::connection_handle::{ConnectionHandle, OutboundQueue};
use crate::dispatch::Dispatcher;

/// Frames written to a peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    Text(String),
    Ping,
    Close,
}

/// Frames read from a peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    Text(String),
    /// Ping or pong: proves the peer is alive, carries nothing.
    Alive,
    Close,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("write deadline of {0:?} elapsed")]
    Timeout(Duration),
    #[error("transport is closed")]
    Closed,
}

/// Write half of a connection's transport.
pub trait FrameSink: Send + 'static {
    fn write(
        &mut self,
        frame: OutboundFrame,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Tears the transport down without waiting.
    fn shutdown(&mut self);
}

#[derive(Debug, Clone, Copy)]
pub struct PumpSettings {
    /// Peer liveness timeout.
    pub pong_wait: Duration,
    /// Deadline for a single write.
    pub write_wait: Duration,
}

impl PumpSettings {
    pub fn ping_period(&self) -> Duration {
        self.pong_wait * 9 / 10
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboundExit {
    Closed,
    WriteFailed,
}

async fn write_with_deadline<S: FrameSink>(
    sink: &mut S,
    frame: OutboundFrame,
    deadline: Duration,
) -> Result<(), TransportError> {
    match time::timeout(deadline, sink.write(frame)).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::Timeout(deadline)),
    }
}

/// Drains the outbound queue into `sink` and pings the peer every
/// `ping_period`, whether or not text is flowing, so a listen-only peer has
/// something to answer before its liveness timeout runs out.
///
/// Ends with a close frame once the queue is closed, or right away when a
/// write fails.
pub async fn outbound_pump<S: FrameSink>(
    mut queue: OutboundQueue,
    mut sink: S,
    settings: PumpSettings,
) -> OutboundExit {
    let period = settings.ping_period();
    let mut keepalive = time::interval_at(Instant::now() + period, period);
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let frame = tokio::select! {
            biased;
            _ = queue.closed.cancelled() => break,
            message = queue.rx.recv() => match message {
                Some(text) => OutboundFrame::Text(text.to_string()),
                None => break,
            },
            _ = keepalive.tick() => OutboundFrame::Ping,
        };

        if let Err(err) = write_with_deadline(&mut sink, frame, settings.write_wait).await {
            log::warn!("Write failed, tearing connection down: {}", err);
            sink.shutdown();
            return OutboundExit::WriteFailed;
        }
    }

    let close = write_with_deadline(&mut sink, OutboundFrame::Close, settings.write_wait).await;
    if let Err(err) = close {
        log::debug!("Close frame not delivered: {}", err);
    }
    sink.shutdown();
    OutboundExit::Closed
}

/// Feeds inbound frames to the dispatcher one at a time until the peer
/// closes, the transport goes away or the peer stays silent for `pong_wait`.
/// Always ends by unregistering the connection.
pub async fn inbound_pump(
    connection: ConnectionHandle,
    mut frames: mpsc::Receiver<InboundFrame>,
    dispatcher: Dispatcher,
    pong_wait: Duration,
) {
    loop {
        let frame = match time::timeout(pong_wait, frames.recv()).await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                log::debug!("Transport of {} went away", connection.id);
                break;
            }
            Err(_) => {
                log::warn!("No frame from {} within {:?}", connection.id, pong_wait);
                break;
            }
        };

        match frame {
            InboundFrame::Text(text) => dispatcher.dispatch(&connection, &text).await,
            InboundFrame::Alive => {}
            InboundFrame::Close => {
                log::debug!("{} closed the connection", connection.id);
                break;
            }
        }
    }

    if let Err(err) = dispatcher.hub().unregister(connection.id).await {
        log::warn!("Cannot unregister {}: {}", connection.id, err);
    }
    connection.close();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::spawn_hub;
    use crate::server_state::ServerState;
    use classroom_system::{User, UserRole};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    struct ChannelSink {
        frames: mpsc::UnboundedSender<OutboundFrame>,
        fail_after: Option<usize>,
        written: usize,
        shut_down: Arc<AtomicBool>,
    }

    impl ChannelSink {
        fn new(
            fail_after: Option<usize>,
        ) -> (
            Self,
            mpsc::UnboundedReceiver<OutboundFrame>,
            Arc<AtomicBool>,
        ) {
            let (tx, rx) = mpsc::unbounded_channel();
            let shut_down = Arc::new(AtomicBool::new(false));
            let sink = Self {
                frames: tx,
                fail_after,
                written: 0,
                shut_down: shut_down.clone(),
            };
            (sink, rx, shut_down)
        }
    }

    impl FrameSink for ChannelSink {
        async fn write(&mut self, frame: OutboundFrame) -> Result<(), TransportError> {
            if self.fail_after == Some(self.written) {
                return Err(TransportError::Closed);
            }
            self.written += 1;
            self.frames.send(frame).map_err(|_| TransportError::Closed)
        }

        fn shutdown(&mut self) {
            self.shut_down.store(true, Ordering::SeqCst);
        }
    }

    fn settings() -> PumpSettings {
        PumpSettings {
            pong_wait: Duration::from_secs(60),
            write_wait: Duration::from_secs(10),
        }
    }

    fn connection(capacity: usize) -> (ConnectionHandle, OutboundQueue) {
        ConnectionHandle::new(User::new("d", "d", UserRole::Teacher), true, capacity)
    }

    #[tokio::test]
    async fn keepalive_period_is_nine_tenths_of_liveness_timeout() {
        assert_eq!(settings().ping_period(), Duration::from_secs(54));
    }

    #[tokio::test]
    async fn it_writes_queued_messages_in_order_then_closes() {
        let (conn, queue) = connection(8);
        let (sink, mut written, shut_down) = ChannelSink::new(None);
        conn.deliver("one".into());
        conn.deliver("two".into());

        let pump = tokio::spawn(outbound_pump(queue, sink, settings()));
        assert_eq!(written.recv().await, Some(OutboundFrame::Text("one".into())));
        assert_eq!(written.recv().await, Some(OutboundFrame::Text("two".into())));

        conn.close();
        assert_eq!(pump.await.expect(""), OutboundExit::Closed);
        assert_eq!(written.recv().await, Some(OutboundFrame::Close));
        assert!(shut_down.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn it_pings_an_idle_peer() {
        let (conn, queue) = connection(8);
        let (sink, mut written, _) = ChannelSink::new(None);
        let pump = tokio::spawn(outbound_pump(queue, sink, settings()));

        time::sleep(Duration::from_secs(55)).await;
        assert_eq!(written.recv().await, Some(OutboundFrame::Ping));

        conn.close();
        pump.await.expect("");
    }

    #[tokio::test]
    async fn failed_write_stops_the_pump() {
        let (conn, queue) = connection(8);
        let (sink, mut written, shut_down) = ChannelSink::new(Some(1));
        conn.deliver("one".into());
        conn.deliver("two".into());

        let exit = outbound_pump(queue, sink, settings()).await;
        assert_eq!(exit, OutboundExit::WriteFailed);
        assert!(shut_down.load(Ordering::SeqCst));
        assert_eq!(written.recv().await, Some(OutboundFrame::Text("one".into())));
        assert_eq!(written.recv().await, None);
    }

    struct StalledSink;

    impl FrameSink for StalledSink {
        async fn write(&mut self, _frame: OutboundFrame) -> Result<(), TransportError> {
            std::future::pending::<()>().await;
            Ok(())
        }

        fn shutdown(&mut self) {}
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_write_hits_the_deadline() {
        let (conn, queue) = connection(8);
        conn.deliver("one".into());
        let exit = outbound_pump(queue, StalledSink, settings()).await;
        assert_eq!(exit, OutboundExit::WriteFailed);
    }

    #[tokio::test]
    async fn inbound_pump_unregisters_on_close_and_skips_bad_frames() {
        let state = Arc::new(ServerState::new());
        let hub = spawn_hub(state.clone(), 16);
        let dispatcher = Dispatcher::new(state, hub.clone());
        let (conn, mut queue) = connection(8);
        hub.register(conn.clone()).await.expect("");

        let (tx, rx) = mpsc::channel(8);
        tx.send(InboundFrame::Text("garbage".into())).await.expect("");
        tx.send(InboundFrame::Alive).await.expect("");
        tx.send(InboundFrame::Text(r#"{"type":"heartbeat"}"#.into()))
            .await
            .expect("");
        tx.send(InboundFrame::Close).await.expect("");
        tx.send(InboundFrame::Text(r#"{"type":"heartbeat"}"#.into()))
            .await
            .expect("");

        inbound_pump(conn.clone(), rx, dispatcher, Duration::from_secs(60)).await;

        assert_eq!(hub.status().await.expect("").connections.len(), 0);
        assert!(conn.is_closed());
        let reply = queue.rx.try_recv().expect("");
        assert!(reply.contains("heartbeat_response"));
        assert!(queue.rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn silent_peer_is_unregistered() {
        let state = Arc::new(ServerState::new());
        let hub = spawn_hub(state.clone(), 16);
        let dispatcher = Dispatcher::new(state, hub.clone());
        let (conn, _queue) = connection(8);
        hub.register(conn.clone()).await.expect("");

        let (_tx, rx) = mpsc::channel::<InboundFrame>(8);
        inbound_pump(conn.clone(), rx, dispatcher, Duration::from_secs(60)).await;

        assert!(hub.status().await.expect("").connections.is_empty());
        assert!(conn.is_closed());
    }

    /// A peer that only listens: it answers every ping and never sends text.
    struct ListeningPeer {
        ingress: mpsc::Sender<InboundFrame>,
        pings: Arc<AtomicUsize>,
    }

    impl FrameSink for ListeningPeer {
        async fn write(&mut self, frame: OutboundFrame) -> Result<(), TransportError> {
            if frame == OutboundFrame::Ping {
                self.pings.fetch_add(1, Ordering::SeqCst);
                let _ = self.ingress.try_send(InboundFrame::Alive);
            }
            Ok(())
        }

        fn shutdown(&mut self) {}
    }

    #[tokio::test(start_paused = true)]
    async fn listening_peer_stays_registered_while_content_streams() {
        let state = Arc::new(ServerState::new());
        let hub = spawn_hub(state.clone(), 16);
        let dispatcher = Dispatcher::new(state, hub.clone());
        let (conn, queue) =
            ConnectionHandle::new(User::new("o", "o", UserRole::Observer), false, 8);
        hub.register(conn.clone()).await.expect("");

        let (ingress, frames) = mpsc::channel(8);
        let pings = Arc::new(AtomicUsize::new(0));
        let peer = ListeningPeer {
            ingress,
            pings: pings.clone(),
        };
        tokio::spawn(outbound_pump(queue, peer, settings()));
        tokio::spawn(inbound_pump(
            conn.clone(),
            frames,
            dispatcher,
            settings().pong_wait,
        ));

        for _ in 0..24 {
            let update = r#"{"type":"object_manipulation","data":{"dataAttachment":{}}}"#;
            hub.broadcast(update.into()).await.expect("");
            time::sleep(Duration::from_secs(5)).await;
        }

        assert!(pings.load(Ordering::SeqCst) >= 2);
        assert_eq!(hub.status().await.expect("").connections.len(), 1);
        assert!(!conn.is_closed());
    }
}
