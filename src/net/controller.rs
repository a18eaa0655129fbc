//! Connection lifecycle controller
//!
//! Owns a single logical connection to the streaming endpoint and hides
//! disconnect/retry churn behind a stable handle: `start()`, `stop()`,
//! `send(frame)` and a watched `ConnectionState`. All socket and state
//! mutation happens on one task; the handle only passes messages in.

use crate::net::reconnect::{ReconnectContext, ReconnectPolicy};
use crate::net::{ConnectionEvent, ConnectionState, StartSessionFrame, WireFrame};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, trace, warn};
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

const CONTROL_QUEUE: usize = 8;
const FRAME_QUEUE: usize = 64;
const EVENT_QUEUE: usize = 64;

#[derive(Debug)]
enum Control {
    Start,
    Stop,
}

/// Why the connected loop ended
enum Drive {
    Stopped,
    Lost,
    HandleDropped,
}

/// Why a session (start to terminal state) ended
enum SessionEnd {
    Stopped,
    Exhausted,
    HandleDropped,
}

/// Cloneable handle for controlling the connection from other tasks
#[derive(Clone)]
pub struct ConnectionHandle {
    control_tx: mpsc::Sender<Control>,
    frame_tx: mpsc::Sender<WireFrame>,
    state_rx: watch::Receiver<ConnectionState>,
}

impl ConnectionHandle {
    /// Open the connection; resets the retry budget
    pub async fn start(&self) {
        let _ = self.control_tx.send(Control::Start).await;
    }

    /// Close the connection with a normal-closure code and disable
    /// reconnection. Safe to call repeatedly and concurrently with an
    /// in-progress reconnect attempt.
    pub async fn stop(&self) {
        let _ = self.control_tx.send(Control::Stop).await;
    }

    /// Queue an outbound frame. Silently dropped unless the connection is
    /// currently established; never blocks and never errors.
    pub fn send(&self, frame: WireFrame) {
        if self.state() != ConnectionState::Connected {
            trace!("dropping outbound frame, not connected");
            return;
        }
        if self.frame_tx.try_send(frame).is_err() {
            debug!("outbound queue full, dropping frame");
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Watch receiver for observing state transitions
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }
}

pub struct ConnectionController {
    ws_url: Url,
    session_id: Option<String>,
    policy: ReconnectPolicy,
    reconnect: ReconnectContext,
    control_rx: mpsc::Receiver<Control>,
    frame_rx: mpsc::Receiver<WireFrame>,
    event_tx: mpsc::Sender<ConnectionEvent>,
    state_tx: watch::Sender<ConnectionState>,
}

impl ConnectionController {
    /// Spawn the controller task. Returns the handle and the inbound message
    /// stream; the task exits when every handle clone is dropped.
    pub fn spawn(
        ws_url: Url,
        session_id: Option<String>,
        policy: ReconnectPolicy,
    ) -> (ConnectionHandle, mpsc::Receiver<ConnectionEvent>) {
        let (control_tx, control_rx) = mpsc::channel(CONTROL_QUEUE);
        let (frame_tx, frame_rx) = mpsc::channel(FRAME_QUEUE);
        let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

        let controller = Self {
            ws_url,
            session_id,
            policy,
            reconnect: ReconnectContext::new(),
            control_rx,
            frame_rx,
            event_tx,
            state_tx,
        };
        tokio::spawn(controller.run());

        let handle = ConnectionHandle {
            control_tx,
            frame_tx,
            state_rx,
        };
        (handle, event_rx)
    }

    async fn run(mut self) {
        loop {
            // Disconnected: nothing happens until an explicit start
            match self.control_rx.recv().await {
                Some(Control::Start) => {}
                Some(Control::Stop) => {
                    debug!("stop while already disconnected, ignoring");
                    continue;
                }
                None => return,
            }

            self.reconnect.reset();
            if let SessionEnd::HandleDropped = self.run_session().await {
                return;
            }
        }
    }

    /// One session: connect, drive, and reconnect until stopped or the retry
    /// budget runs out.
    async fn run_session(&mut self) -> SessionEnd {
        loop {
            self.set_state(ConnectionState::Connecting);
            info!(
                url = %self.ws_url,
                attempt = self.reconnect.attempts() + 1,
                "connecting"
            );

            match connect_async(self.ws_url.as_str()).await {
                Ok((ws, _response)) => {
                    // Optimistic: the local open flips state and resets the
                    // retry budget; a rejected handshake surfaces later as a
                    // receive failure.
                    self.set_state(ConnectionState::Connected);
                    self.reconnect.reset();
                    self.drain_stale_frames();

                    let (mut ws_tx, mut ws_rx) = ws.split();
                    let outcome = if self.send_handshake(&mut ws_tx).await {
                        self.drive(&mut ws_tx, &mut ws_rx).await
                    } else {
                        Drive::Lost
                    };

                    match outcome {
                        Drive::Stopped => {
                            self.close_normally(&mut ws_tx).await;
                            self.set_state(ConnectionState::Disconnected);
                            info!("stopped");
                            return SessionEnd::Stopped;
                        }
                        Drive::HandleDropped => {
                            self.close_normally(&mut ws_tx).await;
                            self.set_state(ConnectionState::Disconnected);
                            return SessionEnd::HandleDropped;
                        }
                        Drive::Lost => {}
                    }
                }
                Err(e) => {
                    warn!(error = %e, "connection attempt failed");
                }
            }

            match self.reconnect.next_delay(&self.policy) {
                Some(delay) => {
                    self.set_state(ConnectionState::Reconnecting);
                    info!(
                        attempt = self.reconnect.attempts(),
                        max_attempts = self.policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "scheduling reconnect"
                    );
                    match self.backoff(delay).await {
                        Backoff::Fired => {}
                        Backoff::Stopped => {
                            self.set_state(ConnectionState::Disconnected);
                            return SessionEnd::Stopped;
                        }
                        Backoff::HandleDropped => {
                            self.set_state(ConnectionState::Disconnected);
                            return SessionEnd::HandleDropped;
                        }
                    }
                }
                None => {
                    error!(
                        max_attempts = self.policy.max_attempts,
                        "retry budget exhausted, giving up"
                    );
                    self.set_state(ConnectionState::Disconnected);
                    return SessionEnd::Exhausted;
                }
            }
        }
    }

    /// Connected loop: one pending receive at a time, control taking priority
    /// over outbound frames. Every send/receive failure funnels into the same
    /// connection-lost outcome.
    async fn drive(&mut self, ws_tx: &mut WsSink, ws_rx: &mut WsSource) -> Drive {
        loop {
            tokio::select! {
                biased;

                ctrl = self.control_rx.recv() => match ctrl {
                    Some(Control::Stop) => return Drive::Stopped,
                    Some(Control::Start) => debug!("already connected, ignoring start"),
                    None => return Drive::HandleDropped,
                },

                frame = self.frame_rx.recv() => match frame {
                    Some(frame) => {
                        let msg = match frame {
                            WireFrame::Text(text) => Message::Text(text),
                            WireFrame::Binary(data) => Message::Binary(data),
                        };
                        if let Err(e) = ws_tx.send(msg).await {
                            warn!(error = %e, "send failed");
                            return Drive::Lost;
                        }
                    }
                    None => return Drive::HandleDropped,
                },

                msg = ws_rx.next() => match msg {
                    Some(Ok(Message::Binary(data))) => {
                        trace!(bytes = data.len(), "received binary frame");
                        self.publish(ConnectionEvent::Binary(data));
                    }
                    Some(Ok(Message::Text(text))) => {
                        debug!(len = text.len(), "received text frame");
                        self.publish(ConnectionEvent::Text(text));
                    }
                    Some(Ok(Message::Close(frame))) => {
                        info!(frame = ?frame, "server closed the connection");
                        return Drive::Lost;
                    }
                    // Ping/pong and raw frames are handled by the protocol layer
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "receive failed");
                        return Drive::Lost;
                    }
                    None => {
                        info!("socket stream ended");
                        return Drive::Lost;
                    }
                },
            }
        }
    }

    /// Cancellable backoff wait. Outbound frames queued during the wait are
    /// already rejected by the handle, so only control traffic is watched.
    async fn backoff(&mut self, delay: Duration) -> Backoff {
        let deadline = tokio::time::Instant::now() + delay;
        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => return Backoff::Fired,
                ctrl = self.control_rx.recv() => match ctrl {
                    Some(Control::Stop) => {
                        info!("stop requested, cancelling pending reconnect");
                        return Backoff::Stopped;
                    }
                    Some(Control::Start) => debug!("start while reconnecting, ignoring"),
                    None => return Backoff::HandleDropped,
                },
            }
        }
    }

    /// Send the start_session handshake once, immediately after open.
    ///
    /// Returns false only on a transport failure; a missing session id or an
    /// encode failure skips the handshake and leaves the connection usable.
    async fn send_handshake(&mut self, ws_tx: &mut WsSink) -> bool {
        let session_id = match &self.session_id {
            Some(id) => id,
            None => {
                debug!("no session id, skipping start_session handshake");
                return true;
            }
        };

        let json = match serde_json::to_string(&StartSessionFrame::new(session_id)) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "failed to encode start_session handshake");
                return true;
            }
        };

        info!(session_id, "sending start_session handshake");
        match ws_tx.send(Message::Text(json)).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "handshake send failed");
                false
            }
        }
    }

    async fn close_normally(&mut self, ws_tx: &mut WsSink) {
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: "".into(),
        };
        if let Err(e) = ws_tx.send(Message::Close(Some(frame))).await {
            debug!(error = %e, "close frame not delivered");
        }
    }

    /// Frames accepted before a disconnect are dropped, never replayed
    fn drain_stale_frames(&mut self) {
        let mut dropped = 0usize;
        while self.frame_rx.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            debug!(dropped, "discarded frames queued across reconnect");
        }
    }

    fn publish(&self, event: ConnectionEvent) {
        use mpsc::error::TrySendError;
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => warn!("inbound queue full, dropping message"),
            Err(TrySendError::Closed(_)) => debug!("inbound consumer gone, dropping message"),
        }
    }

    fn set_state(&self, next: ConnectionState) {
        let prev = *self.state_tx.borrow();
        if prev != next {
            info!(
                from = prev.as_str(),
                to = next.as_str(),
                "connection state changed"
            );
            let _ = self.state_tx.send(next);
        }
    }
}

enum Backoff {
    Fired,
    Stopped,
    HandleDropped,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_url() -> Url {
        // Discard port; connections are refused immediately
        Url::parse("ws://127.0.0.1:9/ws").unwrap()
    }

    #[tokio::test]
    async fn test_send_while_disconnected_is_noop() {
        let (handle, _events) =
            ConnectionController::spawn(unreachable_url(), None, ReconnectPolicy::default());
        handle.send(WireFrame::Binary(vec![0u8; 16]));
        handle.send(WireFrame::Text("hello".to_string()));
        assert_eq!(handle.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_stop_before_start_is_noop() {
        let (handle, _events) =
            ConnectionController::spawn(unreachable_url(), None, ReconnectPolicy::default());
        handle.stop().await;
        handle.stop().await;
        assert_eq!(handle.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_exhausted_retries_go_terminal() {
        let policy = ReconnectPolicy {
            base_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(10),
            max_attempts: 2,
        };
        let (handle, _events) = ConnectionController::spawn(unreachable_url(), None, policy);
        handle.start().await;

        let mut states = handle.state_changes();
        let saw_terminal = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if states.changed().await.is_err() {
                    return false;
                }
                if *states.borrow() == ConnectionState::Disconnected {
                    return true;
                }
            }
        })
        .await
        .expect("controller did not go terminal in time");
        assert!(saw_terminal);

        // Terminal: no further attempts without an explicit start
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(handle.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_stop_cancels_pending_reconnect() {
        let policy = ReconnectPolicy {
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(5),
            max_attempts: 10,
        };
        let (handle, _events) = ConnectionController::spawn(unreachable_url(), None, policy);
        handle.start().await;

        let mut states = handle.state_changes();
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                states.changed().await.unwrap();
                if *states.borrow() == ConnectionState::Reconnecting {
                    break;
                }
            }
        })
        .await
        .expect("never entered reconnecting");

        handle.stop().await;
        tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                states.changed().await.unwrap();
                if *states.borrow() == ConnectionState::Disconnected {
                    break;
                }
            }
        })
        .await
        .expect("stop did not cancel the pending reconnect");
    }
}
