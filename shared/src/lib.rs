//! Wire protocol shared by the chat server, the terminal client and the tests.
//!
//! The protocol is plain text: clients send newline-terminated lines and the
//! server answers with `[Server]:`-tagged replies terminated by `\r\n`.

pub mod codec;

pub const DEFAULT_PORT: u16 = 3000;
pub const SERVER_TAG: &str = "[Server]:";

pub const LIST_COMMAND: &str = "/list";
pub const QUIT_COMMAND: &str = "/quit";

/// Greeting written to a client before anything is read from it
pub fn welcome(address: &str) -> String {
    format!("{} Welcome {}!\r\n", SERVER_TAG, address)
}

pub fn goodbye(address: &str) -> String {
    format!("{} Goodbye, {}!\r\n", SERVER_TAG, address)
}

/// Acknowledgement for a line that was handed to the broadcast pipeline
pub fn acknowledgement(address: &str) -> String {
    format!("{} Thank you for your message, {}!\r\n", SERVER_TAG, address)
}

/// Reply to `/list`: a count header followed by one name per line
pub fn client_list(names: &[String]) -> String {
    let mut reply = format!("{} {} clients connected:\r\n", SERVER_TAG, names.len());
    for name in names {
        reply.push_str(name);
        reply.push_str("\r\n");
    }
    reply
}

/// Applies backspace editing to a received line and trims the result
///
/// Each `\b` removes the character buffered before it, the way a terminal
/// would have rendered the keystrokes. A backspace with nothing before it is
/// dropped. Surrounding whitespace is trimmed afterwards, so the output never
/// contains a backspace and cleaning it again is a no-op.
pub fn clean_input(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    for c in input.chars() {
        if c == '\u{8}' {
            result.pop();
        } else {
            result.push(c);
        }
    }
    result.trim().to_string()
}
