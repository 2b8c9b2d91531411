use guided_types::{ChannelId, RoomId};

/// One line typed by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// Plain text goes to the active room as-is.
    Send(String),
    /// `/room [id]`; no id leaves the room.
    Room(Option<RoomId>),
    /// `/channel [id]`
    Channel(Option<ChannelId>),
    /// `/refresh`
    Refresh,
    /// `/ai [n]`: hand message `n` (1-based, as numbered on screen) or nothing
    /// to the AI view.
    Ai(Option<usize>),
    /// `/copy n`: put message `n` on the terminal clipboard.
    Copy(usize),
    /// `/quit`
    Quit,
    /// A slash command we don't know; shown back as help.
    Unknown(String),
}

pub fn parse(line: &str) -> Input {
    let trimmed = line.trim();
    let Some(command) = trimmed.strip_prefix('/') else {
        return Input::Send(line.to_string());
    };

    let mut parts = command.split_whitespace();
    let name = parts.next().unwrap_or_default();
    let arg = parts.next();

    match name {
        "room" => Input::Room(arg.map(RoomId::from)),
        "leave" => Input::Room(None),
        "channel" => Input::Channel(arg.map(ChannelId::from)),
        "refresh" => Input::Refresh,
        "ai" => match arg.map(str::parse::<usize>) {
            None => Input::Ai(None),
            Some(Ok(n)) if n > 0 => Input::Ai(Some(n)),
            Some(_) => Input::Unknown(trimmed.to_string()),
        },
        "copy" => match arg.map(str::parse::<usize>) {
            Some(Ok(n)) if n > 0 => Input::Copy(n),
            _ => Input::Unknown(trimmed.to_string()),
        },
        "quit" | "exit" => Input::Quit,
        _ => Input::Unknown(trimmed.to_string()),
    }
}

pub const HELP: &str = "commands: /room <id>, /leave, /channel [id], /refresh, /ai [n], /copy <n>, /quit";
