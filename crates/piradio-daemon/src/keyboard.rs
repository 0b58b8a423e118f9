//! Single-key command input from the terminal.
use std::io::IsTerminal;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::mailbox::{Mailbox, Origin};

/// How long one poll waits before rechecking for shutdown.
pub const KEY_POLL_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyInput {
    Token(char),
    /// Ctrl-C.  Raw mode swallows SIGINT, so it arrives as a key.
    Interrupt,
    Ignored,
}

pub fn classify(key: &KeyEvent) -> KeyInput {
    if key.kind != KeyEventKind::Press {
        return KeyInput::Ignored;
    }
    match (key.code, key.modifiers) {
        (KeyCode::Char('c'), m) if m.contains(KeyModifiers::CONTROL) => KeyInput::Interrupt,
        (KeyCode::Char(c), m) if !m.intersects(KeyModifiers::CONTROL | KeyModifiers::ALT) => {
            KeyInput::Token(c)
        }
        _ => KeyInput::Ignored,
    }
}

/// Raw mode for as long as the guard lives.
pub struct RawModeGuard;

impl RawModeGuard {
    pub fn enable() -> std::io::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if let Err(e) = terminal::disable_raw_mode() {
            warn!("keyboard: failed to restore terminal: {}", e);
        }
    }
}

/// Start the keyboard reader.  Returns `None` when stdin is not a terminal
/// (service mode); the radio is then driven over HTTP only.
pub fn spawn(mailbox: Mailbox, cancel: CancellationToken) -> Option<JoinHandle<()>> {
    if !std::io::stdin().is_terminal() {
        debug!("keyboard: stdin is not a terminal, key input disabled");
        return None;
    }
    Some(tokio::task::spawn_blocking(move || {
        if let Err(e) = listen(&mailbox, &cancel) {
            warn!("keyboard: input stopped: {}", e);
        }
    }))
}

fn listen(mailbox: &Mailbox, cancel: &CancellationToken) -> std::io::Result<()> {
    let _raw = RawModeGuard::enable()?;
    while !cancel.is_cancelled() {
        if !event::poll(KEY_POLL_TIMEOUT)? {
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };
        match classify(&key) {
            KeyInput::Token(c) => {
                mailbox.post(c, Origin::Keyboard);
            }
            KeyInput::Interrupt => {
                crate::console::say("CTRL-C QUIT");
                cancel.cancel();
            }
            KeyInput::Ignored => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyEventState;

    fn key(code: KeyCode, modifiers: KeyModifiers) -> KeyEvent {
        KeyEvent {
            code,
            modifiers,
            kind: KeyEventKind::Press,
            state: KeyEventState::NONE,
        }
    }

    #[test]
    fn test_plain_and_shifted_letters_are_tokens() {
        assert_eq!(classify(&key(KeyCode::Char('p'), KeyModifiers::NONE)), KeyInput::Token('p'));
        assert_eq!(classify(&key(KeyCode::Char('F'), KeyModifiers::SHIFT)), KeyInput::Token('F'));
        // Unknown keys still reach the loop, which reports them.
        assert_eq!(classify(&key(KeyCode::Char('x'), KeyModifiers::NONE)), KeyInput::Token('x'));
    }

    #[test]
    fn test_ctrl_c_is_interrupt() {
        assert_eq!(
            classify(&key(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            KeyInput::Interrupt
        );
    }

    #[test]
    fn test_other_keys_ignored() {
        assert_eq!(classify(&key(KeyCode::Char('p'), KeyModifiers::ALT)), KeyInput::Ignored);
        assert_eq!(classify(&key(KeyCode::Up, KeyModifiers::NONE)), KeyInput::Ignored);
        let mut release = key(KeyCode::Char('p'), KeyModifiers::NONE);
        release.kind = KeyEventKind::Release;
        assert_eq!(classify(&release), KeyInput::Ignored);
    }
}
