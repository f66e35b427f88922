//! User-facing text of the chat protocol
//!
//! Everything on the wire is plain UTF-8 text. Content lines end in `\n`;
//! prompts do not, so the client's cursor stays after them.

use crate::current_timestamp;

/// Asks a connecting client for a username
pub const NAME_PROMPT: &str = "[ENTER YOUR NAME]: ";

/// Sent on connect, ends with [`NAME_PROMPT`]
pub const GREETING: &str = r#"Welcome to TCP-Chat!
         _nnnn_
        dGGGGMMb
       @p~qp~~qMb
       M|@||@) M|
       @,----.JM|
      JS^\__/  qKL
     dZP        qKRb
    dZP          qKKb
   fZP            SMMb
   HZM            MMMM
   FqM            MMMM
 __| ".        |\dS"qML
 |    `.       | `' \Zq
_)      \.___.,|     .'
\____   )MMMMMP|   .'
     `-'       `--'
[ENTER YOUR NAME]: "#;

/// Sent to a connection turned away at the door
pub const ROOM_FULL_NOTICE: &str = "Chat room is full, please try again later...\n";

/// Sent to every client when the server stops
pub const SHUTDOWN_NOTICE: &str = "\nServer is shutting down!\n";

// ANSI escape sequences
pub const COLOR_RESET: &str = "\u{1b}[0m";
pub const COLOR_RED: &str = "\u{1b}[31m";
pub const COLOR_YELLOW: &str = "\u{1b}[33m";

/// Kind of line a session publishes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageMode {
    Joined,
    Send,
    Left,
}

/// Format a line for broadcast.
///
/// Returns `None` for a `Send` whose text is blank; such lines are dropped.
pub fn format_message(mode: MessageMode, username: &str, text: &str, colored: bool) -> Option<String> {
    match mode {
        MessageMode::Send => {
            let text = text.trim_end_matches(['\r', '\n']);
            if text.trim().is_empty() {
                return None;
            }
            Some(format!("[{}][{}]: {}\n", current_timestamp(), username, text))
        }
        MessageMode::Joined => Some(paint(
            &format!("{} has joined our chat...\n", username),
            COLOR_YELLOW,
            colored,
        )),
        MessageMode::Left => Some(paint(
            &format!("{} has left our chat...\n", username),
            COLOR_YELLOW,
            colored,
        )),
    }
}

/// Per-recipient "ready for input" prompt
pub fn prompt(username: &str, timestamp: &str) -> String {
    format!("[{}][{}]: ", timestamp, username)
}

/// Content as written to a peer: starts on a fresh line after its pending prompt
pub fn peer_line(message: &str) -> String {
    format!("\n{}", message)
}

/// Text sent back after a failed registration attempt
pub fn registration_retry(error: &str) -> String {
    format!("{}\n{}", error, NAME_PROMPT)
}

/// Shutdown notice, red when colored
pub fn shutdown_notice(colored: bool) -> String {
    paint(SHUTDOWN_NOTICE, COLOR_RED, colored)
}

/// Wrap `text` in `color` unless coloring is off
pub fn paint(text: &str, color: &str, colored: bool) -> String {
    if colored {
        format!("{}{}{}", color, text, COLOR_RESET)
    } else {
        text.to_string()
    }
}
