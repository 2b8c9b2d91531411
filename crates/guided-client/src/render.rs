use std::fmt::Write;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};

use guided_sync::ChatView;
use guided_types::{Alignment, RoomId, UserId};

const WIDTH: usize = 72;

/// Draw the chat view: own messages on the right, everyone else's on the
/// left, numbered so `/ai n` can pick one.
pub fn render_history(view: &ChatView, me: &UserId) -> String {
    let mut out = String::new();

    let Some(room) = &view.room else {
        out.push_str("No room selected\n");
        return out;
    };

    let title = match &view.channel {
        Some(channel) => format!("[ {} / {} ]", room, channel),
        None => format!("[ {} ]", room),
    };
    let _ = writeln!(out, "{:-^WIDTH$}", title);

    if view.history.is_empty() {
        let _ = writeln!(out, "{:^WIDTH$}", "No Chat");
    }

    for (i, (side, message)) in view.entries(me).enumerate() {
        let n = i + 1;
        match side {
            Alignment::Mine => {
                let line = format!("{} [{}]", message.body, n);
                let _ = writeln!(out, "{:>WIDTH$}", line);
            }
            Alignment::Other => {
                let name = if message.sender_name.is_empty() {
                    message.sender.as_str()
                } else {
                    message.sender_name.as_str()
                };
                let _ = writeln!(out, "[{}] {}: {}", n, name, message.body);
            }
        }
    }

    if view.sending {
        let _ = writeln!(out, "{:>WIDTH$}", "sending...");
    }
    out
}

/// Track the room on screen. Returns a redraw when the view has left its
/// room; entering one is drawn once its history lands.
pub fn on_room_change(shown: &mut Option<RoomId>, view: &ChatView, me: &UserId) -> Option<String> {
    if view.room == *shown {
        return None;
    }
    *shown = view.room.clone();
    match shown {
        Some(_) => None,
        None => Some(render_history(view, me)),
    }
}

/// OSC 52 escape that asks the terminal to put `text` on the clipboard.
pub fn clipboard_sequence(text: &str) -> String {
    format!("\x1b]52;c;{}\x07", BASE64.encode(text))
}
