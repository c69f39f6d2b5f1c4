//! Relays core events to operators
//!
//! Delivery is best effort: while the channel is down, notifications are
//! logged and dropped, and send failures are never retried.

use curfew_channel::{ChannelState, ChatTransport};
use curfew_core::CoreEvent;
use curfew_util::{ChatId, OperatorId};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::menus::{self, Screen};

pub struct Notifier {
    transport: Arc<dyn ChatTransport>,
    operators: Vec<OperatorId>,
    channel_state: watch::Receiver<ChannelState>,
}

impl Notifier {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        operators: Vec<OperatorId>,
        channel_state: watch::Receiver<ChannelState>,
    ) -> Self {
        Self {
            transport,
            operators,
            channel_state,
        }
    }

    fn render(event: &CoreEvent) -> Screen {
        match event {
            CoreEvent::GrantExpired { display_name, .. } => menus::expired_notice(display_name),
            CoreEvent::EnforcementFailed {
                display_name,
                failures,
                ..
            } => menus::enforcement_failed_notice(display_name, failures),
        }
    }

    /// Send `event` to every operator. Returns how many deliveries succeeded.
    pub async fn notify(&self, event: &CoreEvent) -> usize {
        if !self.channel_state.borrow().connected {
            warn!(event = ?event, "Command channel disconnected, dropping notification");
            return 0;
        }

        let screen = Self::render(event);
        let mut delivered = 0;
        for operator in &self.operators {
            let message = screen.clone().into_message(ChatId::from(*operator), None);
            match self.transport.send(&message).await {
                Ok(_) => delivered += 1,
                Err(e) => {
                    warn!(operator = %operator, error = %e, "Failed to deliver notification");
                }
            }
        }

        debug!(delivered, operators = self.operators.len(), "Notification sent");
        delivered
    }

    /// Forward events until `shutdown` is set or the registry goes away.
    pub async fn run(
        self,
        mut events: mpsc::UnboundedReceiver<CoreEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(operators = self.operators.len(), "Notifier started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => {
                        self.notify(&event).await;
                    }
                    None => break,
                },
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("Notifier stopped");
    }
}
