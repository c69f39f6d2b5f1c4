//! Reconnecting command channel
//!
//! The loop alternates between Disconnected and Connected forever. A
//! handshake resets the failure counter; a critical error drops back to
//! Disconnected and waits out the backoff; a recoverable error skips the
//! event. Only the cancellation signal ends the loop.

use curfew_config::ChannelConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::{
    BackoffPolicy, ChannelError, ChannelResult, ChatTransport, ErrorClass, EventHandler,
    FixedBackoff, classify,
};

/// Connection status shared with the rest of the service
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelState {
    pub connected: bool,
    pub consecutive_failures: u32,
}

/// Counters that survive reconnects
#[derive(Debug, Default)]
struct LoopState {
    /// Next update id to request
    offset: i64,
    failures: u32,
    cap_warned: bool,
}

pub struct CommandChannel {
    transport: Arc<dyn ChatTransport>,
    backoff: Box<dyn BackoffPolicy>,
    poll_timeout: Duration,
    /// Advisory only; the loop keeps going past it
    max_attempts: Option<u32>,
    state_tx: watch::Sender<ChannelState>,
}

impl CommandChannel {
    pub fn new(transport: Arc<dyn ChatTransport>, poll_timeout: Duration) -> Self {
        let (state_tx, _) = watch::channel(ChannelState::default());
        Self {
            transport,
            backoff: Box::new(FixedBackoff::default()),
            poll_timeout,
            max_attempts: None,
            state_tx,
        }
    }

    pub fn from_config(transport: Arc<dyn ChatTransport>, config: &ChannelConfig) -> Self {
        Self::new(transport, config.poll_timeout)
            .with_backoff(FixedBackoff::new(config.reconnect_interval))
            .with_max_attempts(config.max_reconnect_attempts)
    }

    pub fn with_backoff(mut self, backoff: impl BackoffPolicy + 'static) -> Self {
        self.backoff = Box::new(backoff);
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: Option<u32>) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Subscribe to connection state changes
    pub fn state(&self) -> watch::Receiver<ChannelState> {
        self.state_tx.subscribe()
    }

    fn publish(&self, connected: bool, consecutive_failures: u32) {
        self.state_tx.send_replace(ChannelState {
            connected,
            consecutive_failures,
        });
    }

    fn max_attempts_label(&self) -> String {
        self.max_attempts
            .map(|n| n.to_string())
            .unwrap_or_else(|| "unlimited".into())
    }

    /// Serve until `shutdown` becomes true or its sender is dropped.
    pub async fn run<H>(&self, handler: &mut H, mut shutdown: watch::Receiver<bool>)
    where
        H: EventHandler + ?Sized,
    {
        let mut state = LoopState::default();

        info!(
            poll_timeout_secs = self.poll_timeout.as_secs(),
            max_attempts = %self.max_attempts_label(),
            "Command channel starting"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            if state.failures > 0 {
                info!(attempt = state.failures, "Reconnecting command channel");
            }

            match self.connect_and_serve(handler, &mut state, &mut shutdown).await {
                Ok(()) => break,
                Err(e) => {
                    state.failures = state.failures.saturating_add(1);
                    self.publish(false, state.failures);
                    warn!(
                        error = %e,
                        attempt = state.failures,
                        max_attempts = %self.max_attempts_label(),
                        "Command channel disconnected"
                    );

                    if let Some(max) = self.max_attempts
                        && state.failures >= max
                        && !state.cap_warned
                    {
                        warn!(max, "Reconnect attempts exhausted, continuing anyway");
                        state.cap_warned = true;
                    }
                }
            }

            let delay = self.backoff.delay(state.failures);
            debug!(delay_ms = delay.as_millis() as u64, "Waiting before reconnect");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Cancelled during reconnect wait");
                        break;
                    }
                }
            }
        }

        self.publish(false, state.failures);
        info!("Command channel stopped");
    }

    /// Returns `Ok` only when cancelled.
    async fn connect_and_serve<H>(
        &self,
        handler: &mut H,
        state: &mut LoopState,
        shutdown: &mut watch::Receiver<bool>,
    ) -> ChannelResult<()>
    where
        H: EventHandler + ?Sized,
    {
        let identity = tokio::select! {
            result = self.transport.handshake() => result?,
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return Ok(());
                }
                return Err(ChannelError::Other("handshake interrupted".into()));
            }
        };

        state.failures = 0;
        state.cap_warned = false;
        self.publish(true, 0);
        info!(bot = %identity.username, bot_id = identity.id, "Command channel connected");

        loop {
            let batch = tokio::select! {
                result = self.transport.poll(state.offset, self.poll_timeout) => result?,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return Ok(());
                    }
                    continue;
                }
            };

            for polled in batch {
                // Acknowledge before dispatch so a poisoned update is not replayed.
                state.offset = state.offset.max(polled.update_id + 1);

                let event = match polled.event {
                    Ok(Some(event)) => event,
                    Ok(None) => continue,
                    Err(e) => {
                        absorb(e)?;
                        continue;
                    }
                };

                debug!(
                    update_id = polled.update_id,
                    kind = event.kind(),
                    operator = %event.operator(),
                    "Dispatching event"
                );

                if let Err(e) = handler.handle(event, self.transport.as_ref()).await {
                    absorb(e)?;
                }
            }
        }
    }
}

/// Swallow recoverable errors, pass critical ones up
fn absorb(error: ChannelError) -> ChannelResult<()> {
    match classify(&error) {
        ErrorClass::Critical => Err(error),
        ErrorClass::Recoverable => {
            warn!(error = %error, "Skipping event after recoverable error");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MockTransport, Polled};
    use async_trait::async_trait;
    use curfew_api::{Action, InboundEvent, OutboundMessage};
    use curfew_util::{ChatId, MessageId, OperatorId};

    /// Echoes every text back, fails on demand
    #[derive(Default)]
    struct Echo {
        seen: Vec<InboundEvent>,
        fail_with: Option<fn() -> ChannelError>,
    }

    #[async_trait]
    impl EventHandler for Echo {
        async fn handle(
            &mut self,
            event: InboundEvent,
            transport: &dyn ChatTransport,
        ) -> ChannelResult<()> {
            self.seen.push(event.clone());
            if let Some(fail) = self.fail_with {
                return Err(fail());
            }
            transport
                .send(&OutboundMessage::new(event.chat(), "ok"))
                .await?;
            Ok(())
        }
    }

    fn text(n: i64) -> InboundEvent {
        InboundEvent::Text {
            operator: OperatorId::new(42),
            chat: ChatId::new(42),
            message: MessageId::new(n),
            text: format!("msg {}", n),
        }
    }

    fn connection_reset() -> ChannelError {
        ChannelError::Other("connection reset by peer".into())
    }

    fn channel(transport: Arc<MockTransport>) -> CommandChannel {
        CommandChannel::new(transport, Duration::from_secs(8))
            .with_backoff(FixedBackoff::immediate())
    }

    async fn wait_for(mut check: impl FnMut() -> bool) {
        for _ in 0..1000 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test(start_paused = true)]
    async fn critical_errors_lead_to_one_more_handshake() {
        for n in [0u32, 1, 5] {
            let transport = Arc::new(MockTransport::new());
            transport.fail_handshakes(n);
            let channel = Arc::new(channel(transport.clone()));
            let (tx, rx) = watch::channel(false);

            let runner = channel.clone();
            let handle = tokio::spawn(async move {
                let mut handler = Echo::default();
                runner.run(&mut handler, rx).await;
            });

            let t = transport.clone();
            wait_for(move || t.handshakes() == n + 1).await;
            assert!(channel.state().borrow().connected);

            // Keeps serving without returning
            tokio::time::sleep(Duration::from_secs(60)).await;
            assert!(!handle.is_finished());
            assert_eq!(transport.handshakes(), n + 1);

            tx.send(true).unwrap();
            handle.await.unwrap();
            assert!(!channel.state().borrow().connected);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn advisory_cap_does_not_stop_the_loop() {
        let transport = Arc::new(MockTransport::new());
        transport.fail_handshakes(10);
        let channel = Arc::new(channel(transport.clone()).with_max_attempts(Some(3)));
        let (tx, rx) = watch::channel(false);

        let runner = channel.clone();
        let handle = tokio::spawn(async move {
            runner.run(&mut Echo::default(), rx).await;
        });

        let t = transport.clone();
        wait_for(move || t.handshakes() == 11).await;
        assert!(!handle.is_finished());

        tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn failure_counter_resets_on_connect() {
        let transport = Arc::new(MockTransport::new());
        transport.fail_handshakes(4);
        let channel = Arc::new(channel(transport.clone()));
        let mut state = channel.state();
        let (tx, rx) = watch::channel(false);

        let runner = channel.clone();
        let handle = tokio::spawn(async move {
            runner.run(&mut Echo::default(), rx).await;
        });

        state.wait_for(|s| s.connected).await.unwrap();
        assert_eq!(state.borrow().consecutive_failures, 0);
        assert_eq!(transport.handshakes(), 5);

        // A poll failure starts a fresh episode that reconnects on the first try
        transport.fail_next_poll(ChannelError::Timeout);
        let t = transport.clone();
        wait_for(move || t.handshakes() == 6).await;
        state.wait_for(|s| s.connected).await.unwrap();
        assert_eq!(state.borrow().consecutive_failures, 0);

        tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_backoff_exits_promptly() {
        let transport = Arc::new(MockTransport::new());
        transport.fail_handshakes(u32::MAX);
        let channel = Arc::new(
            CommandChannel::new(transport.clone(), Duration::from_secs(8))
                .with_backoff(FixedBackoff::new(Duration::from_secs(3600))),
        );
        let (tx, rx) = watch::channel(false);

        let runner = channel.clone();
        let handle = tokio::spawn(async move {
            runner.run(&mut Echo::default(), rx).await;
        });

        let t = transport.clone();
        wait_for(move || t.handshakes() == 1).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(transport.handshakes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn already_cancelled_never_connects() {
        let transport = Arc::new(MockTransport::new());
        let channel = channel(transport.clone());
        let (_tx, rx) = watch::channel(true);

        channel.run(&mut Echo::default(), rx).await;
        assert_eq!(transport.handshakes(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn events_are_dispatched_in_order() {
        let transport = Arc::new(MockTransport::new());
        transport.push_event(text(1));
        transport.push_event(text(2));
        let channel = Arc::new(channel(transport.clone()));
        let (tx, rx) = watch::channel(false);

        let runner = channel.clone();
        let handle = tokio::spawn(async move {
            let mut handler = Echo::default();
            runner.run(&mut handler, rx).await;
            handler.seen
        });

        let t = transport.clone();
        wait_for(move || t.sent().len() == 2 && t.last_offset() == Some(3)).await;
        tx.send(true).unwrap();

        let seen = handle.await.unwrap();
        assert_eq!(seen, vec![text(1), text(2)]);
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_update_is_skipped_without_reconnect() {
        let transport = Arc::new(MockTransport::new());
        transport.push_polled(Polled {
            update_id: 1,
            event: Err(ChannelError::Malformed {
                update_id: 1,
                reason: "missing data".into(),
            }),
        });
        transport.push_event(text(2));
        let channel = Arc::new(channel(transport.clone()));
        let (tx, rx) = watch::channel(false);

        let runner = channel.clone();
        let handle = tokio::spawn(async move {
            runner.run(&mut Echo::default(), rx).await;
        });

        let t = transport.clone();
        wait_for(move || t.sent().len() == 1).await;
        assert_eq!(transport.handshakes(), 1);

        tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn critical_handler_error_reconnects() {
        let transport = Arc::new(MockTransport::new());
        transport.push_event(InboundEvent::Button {
            operator: OperatorId::new(42),
            chat: ChatId::new(42),
            message: None,
            callback_id: "cb".into(),
            action: Action::MainMenu,
        });
        let channel = Arc::new(channel(transport.clone()));
        let (tx, rx) = watch::channel(false);

        let runner = channel.clone();
        let handle = tokio::spawn(async move {
            let mut handler = Echo {
                fail_with: Some(connection_reset as fn() -> ChannelError),
                ..Default::default()
            };
            runner.run(&mut handler, rx).await;
            handler.seen.len()
        });

        let t = transport.clone();
        wait_for(move || t.handshakes() == 2).await;
        tx.send(true).unwrap();

        // The event was acknowledged before dispatch, so it is not redelivered
        assert_eq!(handle.await.unwrap(), 1);
    }
}
