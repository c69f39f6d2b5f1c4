//! Transport and handler seams

use async_trait::async_trait;
use curfew_api::{InboundEvent, OutboundMessage};
use curfew_util::MessageId;
use std::time::Duration;

use crate::ChannelResult;

/// Identity reported by a successful handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotIdentity {
    pub id: i64,
    pub username: String,
}

/// One update pulled from the platform
#[derive(Debug)]
pub struct Polled {
    pub update_id: i64,
    /// `Ok(None)` for updates the service does not act on
    pub event: ChannelResult<Option<InboundEvent>>,
}

impl Polled {
    pub fn event(update_id: i64, event: InboundEvent) -> Self {
        Self {
            update_id,
            event: Ok(Some(event)),
        }
    }
}

/// Chat platform connection
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Verify credentials and reachability
    async fn handshake(&self) -> ChannelResult<BotIdentity>;

    /// Fetch updates with id >= `offset`, waiting up to `timeout` for one to arrive
    async fn poll(&self, offset: i64, timeout: Duration) -> ChannelResult<Vec<Polled>>;

    /// Deliver a message, editing `message.replace` in place when set
    async fn send(&self, message: &OutboundMessage) -> ChannelResult<MessageId>;

    /// Acknowledge a button press
    async fn answer(&self, callback_id: &str, text: Option<&str>) -> ChannelResult<()>;
}

/// Consumer of inbound events, called sequentially from the channel loop
#[async_trait]
pub trait EventHandler: Send {
    async fn handle(
        &mut self,
        event: InboundEvent,
        transport: &dyn ChatTransport,
    ) -> ChannelResult<()>;
}
