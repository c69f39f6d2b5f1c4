//! Conversation dispatcher
//!
//! Every inbound event is authorized against the operator allow-list first;
//! rejected events get a fixed denial and never reach the state machine.
//! Button presses edit the message they came from, typed text gets a new
//! message.

use async_trait::async_trait;
use curfew_api::{Action, DurationChoice, InboundEvent, OutboundMessage};
use curfew_channel::{ChannelResult, ChatTransport, EventHandler};
use curfew_config::Policy;
use curfew_core::{RegistryError, SessionRegistry, ShutdownScheduler};
use curfew_util::{AccountId, ChatId, MessageId, OperatorId, RateLimiter, minutes};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::menus::{self, GrantLine, Screen};
use crate::{ConversationState, Conversations};

pub struct Dispatcher {
    registry: Arc<SessionRegistry>,
    shutdown: Arc<ShutdownScheduler>,
    operators: HashSet<OperatorId>,
    conversations: Conversations,
    rate_limiter: RateLimiter,
    extend_step: Duration,
    max_grant_minutes: u32,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<SessionRegistry>,
        shutdown: Arc<ShutdownScheduler>,
        policy: &Policy,
    ) -> Self {
        Self {
            registry,
            shutdown,
            operators: policy.channel.authorized_operators.iter().copied().collect(),
            conversations: Conversations::new(),
            rate_limiter: RateLimiter::new(
                policy.service.operator_rate_limit_per_minute,
                Duration::from_secs(60),
            ),
            extend_step: policy.service.extend_step,
            max_grant_minutes: policy.service.max_grant_minutes,
        }
    }

    pub fn conversation(&self, chat: ChatId) -> ConversationState {
        self.conversations.get(chat)
    }

    pub fn is_authorized(&self, operator: OperatorId) -> bool {
        self.operators.contains(&operator)
    }

    fn extend_minutes(&self) -> u32 {
        (self.extend_step.as_secs() / 60) as u32
    }

    fn display_name(&self, account: &AccountId) -> String {
        self.registry
            .resolve(account)
            .map(|a| a.display_name.clone())
            .unwrap_or_else(|| account.to_string())
    }

    async fn grant_lines(&self) -> Vec<GrantLine> {
        let now = tokio::time::Instant::now();
        self.registry
            .active_grants()
            .await
            .into_iter()
            .map(|g| GrantLine {
                display_name: self.display_name(&g.account),
                remaining: g.remaining(now),
                account: g.account,
            })
            .collect()
    }

    async fn show(
        &self,
        transport: &dyn ChatTransport,
        chat: ChatId,
        replace: Option<MessageId>,
        screen: Screen,
    ) -> ChannelResult<()> {
        transport.send(&screen.into_message(chat, replace)).await?;
        Ok(())
    }

    async fn on_text(
        &mut self,
        transport: &dyn ChatTransport,
        chat: ChatId,
        text: &str,
    ) -> ChannelResult<()> {
        if text == "/start" {
            self.conversations.take(chat);
            return self.show(transport, chat, None, menus::main_menu()).await;
        }

        if let ConversationState::AwaitingCustomDuration { account } = self.conversations.get(chat)
        {
            return match text.parse::<u32>() {
                Ok(m) if (1..=self.max_grant_minutes).contains(&m) => {
                    self.grant(transport, chat, None, account, m).await
                }
                _ => {
                    debug!(chat = %chat, input = text, "Rejected custom duration");
                    let reply = OutboundMessage::new(
                        chat,
                        menus::invalid_custom_duration(self.max_grant_minutes),
                    );
                    transport.send(&reply).await.map(|_| ())
                }
            };
        }

        let reply = OutboundMessage::new(chat, menus::UNKNOWN_COMMAND_TEXT);
        transport.send(&reply).await.map(|_| ())
    }

    async fn on_action(
        &mut self,
        transport: &dyn ChatTransport,
        chat: ChatId,
        message: Option<MessageId>,
        action: Action,
    ) -> ChannelResult<()> {
        // Any button outside the grant flow abandons a half-finished grant
        if !matches!(action, Action::SelectAccount(_) | Action::Duration(_)) {
            self.conversations.take(chat);
        }

        let screen = match action {
            Action::MainMenu => menus::main_menu(),

            Action::GrantMenu => menus::grant_menu(self.registry.accounts()),

            Action::SelectAccount(account) => {
                let Some(managed) = self.registry.resolve(&account) else {
                    warn!(account = %account, "Selected unknown account");
                    self.conversations.take(chat);
                    return self
                        .show(transport, chat, message, menus::grant_menu(self.registry.accounts()))
                        .await;
                };
                let screen = menus::duration_menu(&managed.display_name);
                self.conversations.set(
                    chat,
                    ConversationState::AccountSelected {
                        account: account.clone(),
                    },
                );
                self.show(transport, chat, message, screen).await?;
                self.conversations
                    .set(chat, ConversationState::AwaitingDuration { account });
                return Ok(());
            }

            Action::Duration(choice) => {
                let Some(account) = self.conversations.get(chat).account().cloned() else {
                    debug!(chat = %chat, "Duration chosen without an account");
                    self.conversations.take(chat);
                    return self
                        .show(
                            transport,
                            chat,
                            message,
                            menus::grant_menu_reprompt(self.registry.accounts()),
                        )
                        .await;
                };

                match choice {
                    DurationChoice::Custom => {
                        self.conversations
                            .set(chat, ConversationState::AwaitingCustomDuration { account });
                        menus::custom_duration_prompt(self.max_grant_minutes)
                    }
                    DurationChoice::Minutes(m) => {
                        let m = m.clamp(1, self.max_grant_minutes);
                        return self.grant(transport, chat, message, account, m).await;
                    }
                }
            }

            Action::LockMenu => menus::lock_menu(&self.grant_lines().await, self.extend_minutes()),

            Action::Lock(account) => {
                let name = self.display_name(&account);
                match self.registry.lock(&account).await {
                    Ok(outcome) => Screen::notice(format!(
                        "🔒 Locked\n\n{} is locked ({} session(s) closed) and the password restored.",
                        name, outcome.sessions_closed
                    )),
                    Err(e) => Screen::notice(format!("❌ Could not lock {}: {}", name, e)),
                }
            }

            Action::LockAll => {
                let report = self.registry.lock_all().await;
                if report.is_clean() {
                    Screen::notice(format!(
                        "🔒 All sessions locked\n\n{} session(s) closed, {} password(s) restored.",
                        report.sessions_closed,
                        report.restored.len()
                    ))
                } else {
                    Screen::notice(format!(
                        "⚠️ Lock all finished with errors\n\n{} session(s) closed, {} password(s) restored.\n• {}",
                        report.sessions_closed,
                        report.restored.len(),
                        report.failures.join("\n• ")
                    ))
                }
            }

            Action::Extend(account) => {
                let name = self.display_name(&account);
                match self.registry.extend(&account, self.extend_step).await {
                    Ok(deadline) => Screen::notice(format!(
                        "✅ {} extended by {} min, until {}.",
                        name,
                        self.extend_minutes(),
                        curfew_util::format_clock_time(&deadline)
                    )),
                    Err(RegistryError::NoGrant(_)) => {
                        Screen::notice(format!("❌ {} has no active session to extend.", name))
                    }
                    Err(e) => Screen::notice(format!("❌ Could not extend {}: {}", name, e)),
                }
            }

            Action::ResetSecretMenu => menus::reset_secret_menu(self.registry.accounts()),

            Action::ResetSecret(account) => {
                if self.registry.resolve(&account).is_none() {
                    // Unknown ids fall back to resetting every account
                    self.reset_all_screen().await
                } else {
                    let name = self.display_name(&account);
                    match self.registry.restore_secret(&account).await {
                        Ok(()) => Screen::notice(format!("✅ Password for {} restored.", name)),
                        Err(e) => Screen::notice(format!(
                            "❌ Could not restore the password for {}: {}",
                            name, e
                        )),
                    }
                }
            }

            Action::ResetAllSecrets => self.reset_all_screen().await,

            Action::ComputerMenu => menus::computer_menu(self.shutdown.is_scheduled().await),

            Action::ComputerStatus => {
                let at = self.shutdown.scheduled_at().await;
                menus::computer_status(&self.grant_lines().await, at.as_ref())
            }

            Action::ShutdownMenu => menus::shutdown_menu(),

            Action::ShutdownNow => self.schedule_shutdown(0).await,

            Action::ShutdownIn(m) => self.schedule_shutdown(m).await,

            Action::CancelShutdown => match self.shutdown.cancel_shutdown().await {
                Ok(true) => Screen::notice("✅ Shutdown cancelled."),
                Ok(false) => Screen::notice("ℹ️ No shutdown was scheduled."),
                Err(e) => Screen::notice(format!("❌ Could not cancel the shutdown: {}", e)),
            },
        };

        self.show(transport, chat, message, screen).await
    }

    async fn reset_all_screen(&self) -> Screen {
        let report = self.registry.restore_all_secrets().await;
        let total = self.registry.accounts().len();
        if report.failed.is_empty() {
            Screen::notice(format!(
                "✅ Passwords restored: {} of {}.",
                report.restored.len(),
                total
            ))
        } else {
            Screen::notice(format!(
                "⚠️ Passwords restored: {} of {}. Failed: {}.",
                report.restored.len(),
                total,
                report.failed.len()
            ))
        }
    }

    async fn schedule_shutdown(&self, delay_minutes: u32) -> Screen {
        match self.shutdown.schedule_shutdown(delay_minutes).await {
            Ok(at) => menus::shutdown_scheduled(delay_minutes, &at),
            Err(e) => Screen::notice(format!("❌ Could not shut down: {}", e)),
        }
    }

    /// Run a grant. The conversation returns to Idle whatever the outcome.
    async fn grant(
        &mut self,
        transport: &dyn ChatTransport,
        chat: ChatId,
        replace: Option<MessageId>,
        account: AccountId,
        grant_minutes: u32,
    ) -> ChannelResult<()> {
        self.conversations.take(chat);
        let name = self.display_name(&account);
        let extend = self.extend_minutes();

        let screen = match self.registry.grant(&account, minutes(grant_minutes)).await {
            Ok(receipt) => {
                info!(account = %account, minutes = grant_minutes, chat = %chat, "Access granted by operator");
                menus::grant_done(
                    &account,
                    &receipt.display_name,
                    grant_minutes,
                    &receipt.deadline,
                    receipt.secret.expose(),
                    extend,
                )
            }
            Err(RegistryError::SecretNotApplied {
                deadline, source, ..
            }) => {
                let reason = source.to_string();
                menus::grant_secret_failed(&account, &name, &deadline, &reason, extend)
            }
            Err(e) => Screen::notice(format!("❌ Could not grant access for {}: {}", name, e)),
        };

        self.show(transport, chat, replace, screen).await
    }
}

#[async_trait]
impl EventHandler for Dispatcher {
    async fn handle(
        &mut self,
        event: InboundEvent,
        transport: &dyn ChatTransport,
    ) -> ChannelResult<()> {
        let operator = event.operator();
        let chat = event.chat();

        if !self.is_authorized(operator) {
            warn!(operator = %operator, chat = %chat, kind = event.kind(), "Unauthorized operator");
            let denial = OutboundMessage::new(chat, menus::DENIED_TEXT);
            transport.send(&denial).await?;
            return Ok(());
        }

        if !self.rate_limiter.check(operator) {
            warn!(operator = %operator, "Operator rate limited, dropping event");
            return Ok(());
        }

        match event {
            InboundEvent::Text { text, .. } => self.on_text(transport, chat, text.trim()).await,
            InboundEvent::Button {
                message,
                callback_id,
                action,
                ..
            } => {
                transport.answer(&callback_id, None).await?;
                debug!(operator = %operator, action = %action, "Button pressed");
                self.on_action(transport, chat, message, action).await
            }
        }
    }
}
