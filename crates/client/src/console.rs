// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Line-oriented terminal front end for the `roomlink` binary.

use serde_json::Value;

use crate::protocol::SessionEvent;

/// One parsed line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Message(String),
    Typing(bool),
    Info,
    Leave,
    Reconnect,
    Stats,
    Quit,
    Help,
    Empty,
    Unknown(String),
}

pub const HELP: &str = "\
commands:
  /typing on|off   toggle the typing indicator
  /info            request room info
  /leave           leave the room
  /reconnect       force a reconnect
  /stats           print connection stats
  /quit            leave and exit";

pub fn parse_line(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    let Some(command) = line.strip_prefix('/') else {
        return Input::Message(line.to_owned());
    };
    let mut parts = command.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some("typing"), Some("on"), None) => Input::Typing(true),
        (Some("typing"), Some("off"), None) => Input::Typing(false),
        (Some("info"), None, _) => Input::Info,
        (Some("leave"), None, _) => Input::Leave,
        (Some("reconnect"), None, _) => Input::Reconnect,
        (Some("stats"), None, _) => Input::Stats,
        (Some("quit" | "exit"), None, _) => Input::Quit,
        (Some("help"), None, _) => Input::Help,
        _ => Input::Unknown(line.to_owned()),
    }
}

fn field<'a>(payload: &'a Value, key: &str) -> Option<&'a str> {
    payload.get(key).and_then(Value::as_str)
}

/// Render a notification as a single display line.
pub fn render(event: &SessionEvent) -> String {
    match event {
        SessionEvent::NewMessage(p) => match (field(p, "userId"), field(p, "content")) {
            (Some(user), Some(content)) => format!("<{user}> {content}"),
            _ => format!("message: {p}"),
        },
        SessionEvent::UserJoined(p) => {
            format!("* {} joined", field(p, "userId").unwrap_or("someone"))
        }
        SessionEvent::UserLeft(p) => format!("* {} left", field(p, "userId").unwrap_or("someone")),
        SessionEvent::UserTyping(p) => {
            let user = field(p, "userId").unwrap_or("someone");
            match p.get("isTyping").and_then(Value::as_bool) {
                Some(false) => format!("* {user} stopped typing"),
                _ => format!("* {user} is typing"),
            }
        }
        SessionEvent::JoinedRoom(p) => {
            format!("* joined {}", field(p, "roomId").unwrap_or("room"))
        }
        SessionEvent::LeftRoom(p) => format!("* left {}", field(p, "roomId").unwrap_or("room")),
        SessionEvent::RoomInfo(p) => format!("room info: {p}"),
        SessionEvent::Error(p) => match (field(p, "code"), field(p, "message")) {
            (Some(code), Some(message)) => format!("! {code}: {message}"),
            _ => format!("! error: {p}"),
        },
        SessionEvent::ConnectionStateChange(change) => {
            format!("~ {} -> {}", change.previous, change.state)
        }
    }
}

#[cfg(test)]
#[path = "console_tests.rs"]
mod tests;
