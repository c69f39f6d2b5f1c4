//! Operator-facing text and keyboards

use chrono::{DateTime, Local};
use curfew_api::{Action, Button, DurationChoice, Keyboard, OutboundMessage};
use curfew_config::ManagedAccount;
use curfew_util::{AccountId, ChatId, MessageId, format_clock_time, format_minutes};
use std::time::Duration;

pub const DENIED_TEXT: &str = "⛔ Access denied. This bot is for authorized parents only.";
pub const UNKNOWN_COMMAND_TEXT: &str = "Unknown command. Use /start to open the main menu.";

/// Quick picks on the duration menu, in minutes
pub const QUICK_DURATIONS: &[u32] = &[15, 30, 60, 120];

/// Quick picks on the shutdown menu, in minutes
pub const SHUTDOWN_DELAYS: &[u32] = &[5, 15, 30, 60];

/// A rendered screen: text plus its keyboard
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Screen {
    pub text: String,
    pub keyboard: Keyboard,
}

impl Screen {
    pub fn new(text: impl Into<String>, keyboard: Keyboard) -> Self {
        Self {
            text: text.into(),
            keyboard,
        }
    }

    /// Text with only a way back to the main menu
    pub fn notice(text: impl Into<String>) -> Self {
        Self::new(text, back_to_main())
    }

    pub fn into_message(self, chat: ChatId, replace: Option<MessageId>) -> OutboundMessage {
        OutboundMessage::new(chat, self.text)
            .with_keyboard(self.keyboard)
            .replacing(replace)
    }
}

/// A grant as the menus show it
#[derive(Debug, Clone)]
pub struct GrantLine {
    pub account: AccountId,
    pub display_name: String,
    pub remaining: Duration,
}

fn back_to_main() -> Keyboard {
    Keyboard::new().button("🏠 Main menu", Action::MainMenu)
}

fn duration_label(minutes: u32) -> String {
    match minutes {
        60 => "1 hour".into(),
        m if m % 60 == 0 => format!("{} hours", m / 60),
        m => format!("{} minutes", m),
    }
}

pub fn main_menu() -> Screen {
    Screen::new(
        "🏠 Parental control\n\nChoose an action:",
        Keyboard::new()
            .button("🟢 Grant access", Action::GrantMenu)
            .button("⏱ Active sessions", Action::LockMenu)
            .button("🔒 Lock all sessions", Action::LockAll)
            .button("🔁 Reset password", Action::ResetSecretMenu)
            .button("⚙️ Computer", Action::ComputerMenu),
    )
}

pub fn grant_menu(accounts: &[ManagedAccount]) -> Screen {
    account_picker(
        "👤 Choose an account\n\nWho should get access?",
        accounts,
    )
}

/// Shown when a duration arrives with no account selected
pub fn grant_menu_reprompt(accounts: &[ManagedAccount]) -> Screen {
    account_picker(
        "👤 No account selected\n\nChoose who should get access first:",
        accounts,
    )
}

fn account_picker(text: &str, accounts: &[ManagedAccount]) -> Screen {
    let mut keyboard = Keyboard::new();
    for account in accounts {
        keyboard = keyboard.button(
            account.display_name.clone(),
            Action::SelectAccount(account.id.clone()),
        );
    }
    Screen::new(text, keyboard.button("🔙 Back", Action::MainMenu))
}

pub fn duration_menu(display_name: &str) -> Screen {
    let mut keyboard = Keyboard::new();
    for pair in QUICK_DURATIONS.chunks(2) {
        keyboard = keyboard.row(
            pair.iter()
                .map(|&m| {
                    Button::new(
                        duration_label(m),
                        Action::Duration(DurationChoice::Minutes(m)),
                    )
                })
                .collect(),
        );
    }

    Screen::new(
        format!("⏰ Choose a duration\n\nAccount: {}\n\nHow long?", display_name),
        keyboard
            .button("Other duration", Action::Duration(DurationChoice::Custom))
            .button("🔙 Back", Action::GrantMenu),
    )
}

pub fn custom_duration_prompt(max_minutes: u32) -> Screen {
    Screen::new(
        format!(
            "⌨️ Custom duration\n\nType the number of minutes (1-{}):",
            max_minutes
        ),
        Keyboard::new().button("🔙 Back", Action::GrantMenu),
    )
}

pub fn invalid_custom_duration(max_minutes: u32) -> String {
    format!(
        "❌ Invalid duration. Enter a number from 1 to {} minutes.",
        max_minutes
    )
}

pub fn grant_done(
    account: &AccountId,
    display_name: &str,
    minutes: u32,
    deadline: &DateTime<Local>,
    secret: &str,
    extend_minutes: u32,
) -> Screen {
    Screen::new(
        format!(
            "✅ Access granted\n\n👤 Account: {}\n⏰ Duration: {} min (until {})\n🔑 One-time password: {}\n\nWhen time runs out the session is closed and the password restored.",
            display_name,
            minutes,
            format_clock_time(deadline),
            secret
        ),
        grant_controls(account, extend_minutes),
    )
}

pub fn grant_secret_failed(
    account: &AccountId,
    display_name: &str,
    deadline: &DateTime<Local>,
    error: &str,
    extend_minutes: u32,
) -> Screen {
    Screen::new(
        format!(
            "⚠️ Access window for {} is open until {}, but the password could not be changed: {}",
            display_name,
            format_clock_time(deadline),
            error
        ),
        grant_controls(account, extend_minutes),
    )
}

fn grant_controls(account: &AccountId, extend_minutes: u32) -> Keyboard {
    Keyboard::new()
        .row(vec![
            Button::new("🔒 Lock now", Action::Lock(account.clone())),
            Button::new(
                format!("➕ +{} min", extend_minutes),
                Action::Extend(account.clone()),
            ),
        ])
        .button("🏠 Main menu", Action::MainMenu)
}

pub fn lock_menu(grants: &[GrantLine], extend_minutes: u32) -> Screen {
    if grants.is_empty() {
        return Screen::notice("⏱ Active sessions\n\nNo active sessions.");
    }

    let mut keyboard = Keyboard::new();
    for grant in grants {
        keyboard = keyboard.row(vec![
            Button::new(
                format!(
                    "🔒 {} ({} left)",
                    grant.display_name,
                    format_minutes(grant.remaining)
                ),
                Action::Lock(grant.account.clone()),
            ),
            Button::new(
                format!("➕ +{} min", extend_minutes),
                Action::Extend(grant.account.clone()),
            ),
        ]);
    }
    if grants.len() > 1 {
        keyboard = keyboard.button("🔒 Lock all", Action::LockAll);
    }

    Screen::new(
        "⏱ Active sessions\n\nChoose a session to lock or extend:",
        keyboard.button("🏠 Main menu", Action::MainMenu),
    )
}

pub fn reset_secret_menu(accounts: &[ManagedAccount]) -> Screen {
    let mut keyboard = Keyboard::new().button("🔁 Reset all passwords", Action::ResetAllSecrets);
    for account in accounts {
        keyboard = keyboard.button(
            account.display_name.clone(),
            Action::ResetSecret(account.id.clone()),
        );
    }
    Screen::new(
        "🔁 Reset password\n\nChoose an account to restore its configured password:",
        keyboard.button("🏠 Main menu", Action::MainMenu),
    )
}

pub fn computer_menu(shutdown_scheduled: bool) -> Screen {
    let mut keyboard = Keyboard::new()
        .button("💻 Status", Action::ComputerStatus)
        .button("🔴 Shut down now", Action::ShutdownNow)
        .button("⏰ Schedule shutdown", Action::ShutdownMenu);
    if shutdown_scheduled {
        keyboard = keyboard.button("❌ Cancel shutdown", Action::CancelShutdown);
    }
    Screen::new(
        "⚙️ Computer\n\nChoose an action:",
        keyboard.button("🏠 Main menu", Action::MainMenu),
    )
}

pub fn computer_status(grants: &[GrantLine], shutdown_at: Option<&DateTime<Local>>) -> Screen {
    let mut text = String::from("💻 Computer status\n\n");

    if grants.is_empty() {
        text.push_str("🔒 No active sessions\n");
    } else {
        text.push_str("🟢 Active sessions:\n");
        for grant in grants {
            text.push_str(&format!(
                "• {}: {} left\n",
                grant.display_name,
                format_minutes(grant.remaining)
            ));
        }
    }

    if let Some(at) = shutdown_at {
        text.push_str(&format!("\n⏰ Shutdown scheduled for {}", format_clock_time(at)));
    }

    Screen::new(
        text,
        Keyboard::new()
            .button("🔴 Shut down now", Action::ShutdownNow)
            .button("⏰ Schedule shutdown", Action::ShutdownMenu)
            .button("🏠 Main menu", Action::MainMenu),
    )
}

pub fn shutdown_menu() -> Screen {
    let mut keyboard = Keyboard::new();
    for pair in SHUTDOWN_DELAYS.chunks(2) {
        keyboard = keyboard.row(
            pair.iter()
                .map(|&m| Button::new(format!("In {} min", m), Action::ShutdownIn(m)))
                .collect(),
        );
    }
    Screen::new(
        "⏰ Schedule shutdown\n\nWhen should the computer shut down?",
        keyboard.button("🔙 Back", Action::ComputerMenu),
    )
}

pub fn shutdown_scheduled(minutes: u32, at: &DateTime<Local>) -> Screen {
    let text = if minutes == 0 {
        "🔴 Shutdown initiated\n\nThe computer is shutting down now.".to_string()
    } else {
        format!(
            "⏰ Shutdown scheduled\n\nThe computer will shut down in {} min, at {}.",
            minutes,
            format_clock_time(at)
        )
    };
    Screen::new(
        text,
        Keyboard::new()
            .button("❌ Cancel shutdown", Action::CancelShutdown)
            .button("🏠 Main menu", Action::MainMenu),
    )
}

pub fn expired_notice(display_name: &str) -> Screen {
    Screen::notice(format!(
        "⏰ Time is up for {}.\n\nThe session was closed and the password restored.",
        display_name
    ))
}

pub fn enforcement_failed_notice(display_name: &str, failures: &[String]) -> Screen {
    let mut text = format!(
        "⚠️ Time is up for {}, but locking the account hit errors:\n",
        display_name
    );
    for failure in failures {
        text.push_str(&format!("• {}\n", failure));
    }
    text.push_str("\nUse \"Lock all sessions\" to retry.");
    Screen::notice(text)
}
