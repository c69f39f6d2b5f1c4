//! Integration tests for curfewd
//!
//! These tests run the registry, sweeper, notifier, dispatcher and command
//! channel together against mock host and transport collaborators.

use curfew_api::{Action, DurationChoice, InboundEvent};
use curfew_bot::{Dispatcher, Notifier};
use curfew_channel::{ChannelState, CommandChannel, FixedBackoff, MockTransport};
use curfew_config::{Policy, parse_config};
use curfew_core::{ExpirySweeper, SessionRegistry, ShutdownScheduler};
use curfew_host_api::{MockBackend, MockShutdown};
use curfew_util::{AccountId, ChatId, MessageId, OperatorId, minutes};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

const CONFIG: &str = r#"
    config_version = 1

    [service]
    sweep_interval_seconds = 30

    [channel]
    bot_token = "123:abc"
    authorized_operators = [42]

    [[accounts]]
    id = "kid1"
    display_name = "Alice"
    fallback_secret = "locked-1"

    [[accounts]]
    id = "kid2"
    display_name = "Bob"
    fallback_secret = "locked-2"
"#;

const OPERATOR: OperatorId = OperatorId::new(42);
const CHAT: ChatId = ChatId::new(42);

fn policy() -> Policy {
    parse_config(CONFIG).unwrap()
}

fn press(action: Action) -> InboundEvent {
    InboundEvent::Button {
        operator: OPERATOR,
        chat: CHAT,
        message: Some(MessageId::new(7)),
        callback_id: "cb".into(),
        action,
    }
}

fn type_text(text: &str) -> InboundEvent {
    InboundEvent::Text {
        operator: OPERATOR,
        chat: CHAT,
        message: MessageId::new(8),
        text: text.into(),
    }
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
async fn one_minute_grant_expires_with_a_single_notification() {
    let policy = policy();
    let backend = Arc::new(MockBackend::new());
    let kid = AccountId::new("kid1");
    backend.login(&kid);

    let (registry, events) = SessionRegistry::new(backend.clone(), policy.accounts.clone());
    let transport = Arc::new(MockTransport::new());
    let (_state_tx, state_rx) = watch::channel(ChannelState {
        connected: true,
        consecutive_failures: 0,
    });
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let sweeper = ExpirySweeper::new(registry.clone(), policy.service.sweep_interval);
    let notifier = Notifier::new(
        transport.clone(),
        policy.channel.authorized_operators.clone(),
        state_rx,
    );
    let sweeper_task = tokio::spawn(sweeper.run(shutdown_rx.clone()));
    let notifier_task = tokio::spawn(notifier.run(events, shutdown_rx));

    registry.grant(&kid, minutes(1)).await.unwrap();
    assert_eq!(registry.active_grants().await.len(), 1);

    tokio::time::sleep(Duration::from_secs(61)).await;
    let t = transport.clone();
    wait_for(move || !t.sent().is_empty()).await;

    // Give a late duplicate every chance to show up
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert!(registry.active_grants().await.is_empty());
    assert!(backend.live_sessions().is_empty());
    assert_eq!(backend.secret_of(&kid).unwrap().expose(), "locked-1");

    let sent = transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].chat, CHAT);
    assert!(sent[0].text.contains("Time is up for Alice"));

    shutdown_tx.send(true).unwrap();
    sweeper_task.await.unwrap();
    notifier_task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn channel_recovers_and_serves_the_dispatcher() {
    for n in [0u32, 3] {
        let policy = policy();
        let backend = Arc::new(MockBackend::new());
        let (registry, _events) = SessionRegistry::new(backend, policy.accounts.clone());
        let scheduler = Arc::new(ShutdownScheduler::new(Arc::new(MockShutdown::new())));
        let mut dispatcher = Dispatcher::new(registry, scheduler, &policy);

        let transport = Arc::new(MockTransport::new());
        transport.fail_handshakes(n);
        let channel = Arc::new(
            CommandChannel::new(transport.clone(), policy.channel.poll_timeout)
                .with_backoff(FixedBackoff::new(Duration::from_secs(10))),
        );
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let runner = channel.clone();
        let handle = tokio::spawn(async move {
            runner.run(&mut dispatcher, shutdown_rx).await;
        });

        let t = transport.clone();
        wait_for(move || t.handshakes() == n + 1).await;
        assert!(channel.state().borrow().connected);

        transport.push_event(type_text("/start"));
        let t = transport.clone();
        wait_for(move || !t.sent().is_empty()).await;
        assert!(transport.sent()[0].text.contains("Parental control"));
        assert_eq!(transport.handshakes(), n + 1);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }
}

#[tokio::test(start_paused = true)]
async fn operator_grant_then_expiry_notifies_operator() {
    let policy = policy();
    let backend = Arc::new(MockBackend::new());
    let kid = AccountId::new("kid2");

    let (registry, events) = SessionRegistry::new(backend.clone(), policy.accounts.clone());
    let scheduler = Arc::new(ShutdownScheduler::new(Arc::new(MockShutdown::new())));
    let mut dispatcher = Dispatcher::new(registry.clone(), scheduler, &policy);

    let transport = Arc::new(MockTransport::new());
    let channel = CommandChannel::new(transport.clone(), policy.channel.poll_timeout)
        .with_backoff(FixedBackoff::immediate());
    let notifier = Notifier::new(
        transport.clone(),
        policy.channel.authorized_operators.clone(),
        channel.state(),
    );
    let sweeper = ExpirySweeper::new(registry.clone(), policy.service.sweep_interval);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let sweeper_task = tokio::spawn(sweeper.run(shutdown_rx.clone()));
    let notifier_task = tokio::spawn(notifier.run(events, shutdown_rx.clone()));
    let channel_task = tokio::spawn(async move {
        channel.run(&mut dispatcher, shutdown_rx).await;
    });

    transport.push_event(press(Action::SelectAccount(kid.clone())));
    transport.push_event(press(Action::Duration(DurationChoice::Custom)));
    transport.push_event(type_text("2"));

    let t = transport.clone();
    wait_for(move || t.sent().iter().any(|m| m.text.contains("Access granted"))).await;
    transport.take_sent();

    let grants = registry.active_grants().await;
    assert_eq!(grants.len(), 1);
    assert_eq!(grants[0].account, kid);
    assert_eq!(grants[0].duration, minutes(2));
    assert_ne!(backend.secret_of(&kid).unwrap().expose(), "locked-2");

    tokio::time::sleep(Duration::from_secs(121)).await;
    let t = transport.clone();
    wait_for(move || !t.sent().is_empty()).await;

    assert!(registry.active_grants().await.is_empty());
    assert_eq!(backend.secret_of(&kid).unwrap().expose(), "locked-2");
    let notices = transport.sent();
    assert_eq!(notices.len(), 1);
    assert!(notices[0].text.contains("Time is up for Bob"));

    shutdown_tx.send(true).unwrap();
    channel_task.await.unwrap();
    sweeper_task.await.unwrap();
    notifier_task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn unauthorized_operator_cannot_grant() {
    let policy = policy();
    let backend = Arc::new(MockBackend::new());
    let (registry, _events) = SessionRegistry::new(backend, policy.accounts.clone());
    let scheduler = Arc::new(ShutdownScheduler::new(Arc::new(MockShutdown::new())));
    let mut dispatcher = Dispatcher::new(registry.clone(), scheduler, &policy);

    let transport = Arc::new(MockTransport::new());
    let channel = CommandChannel::new(transport.clone(), policy.channel.poll_timeout)
        .with_backoff(FixedBackoff::immediate());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let channel_task = tokio::spawn(async move {
        channel.run(&mut dispatcher, shutdown_rx).await;
    });

    let stranger = OperatorId::new(7);
    transport.push_event(InboundEvent::Button {
        operator: stranger,
        chat: ChatId::new(7),
        message: Some(MessageId::new(1)),
        callback_id: "cb".into(),
        action: Action::SelectAccount(AccountId::new("kid1")),
    });
    transport.push_event(InboundEvent::Button {
        operator: stranger,
        chat: ChatId::new(7),
        message: Some(MessageId::new(1)),
        callback_id: "cb2".into(),
        action: Action::Duration(DurationChoice::Minutes(60)),
    });

    let t = transport.clone();
    wait_for(move || t.sent().len() == 2).await;

    assert!(registry.active_grants().await.is_empty());
    assert!(
        transport
            .sent()
            .iter()
            .all(|m| m.text.contains("Access denied"))
    );

    shutdown_tx.send(true).unwrap();
    channel_task.await.unwrap();
}
