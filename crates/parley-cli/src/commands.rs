use std::path::PathBuf;

/// A line typed at the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Say(String),
    Join(String),
    Leave,
    /// Attach a file; images are sent as image messages.
    File(PathBuf),
    /// Send a recorded voice clip.
    Voice(PathBuf),
    Connect,
    Disconnect,
    History,
    Help,
    Quit,
}

pub const HELP: &str = "\
/join <room>     join a room (leaves the current one)
/leave           leave the current room
/file <path>     send a file or image
/voice <path>    send a recorded voice clip
/connect         reconnect after losing the server
/disconnect      close the connection
/history         show messages seen in this room
/quit            leave and exit
Anything else is sent to the current room.";

/// Parse one input line. Blank lines yield `None`; `//text` sends `/text`.
pub fn parse(line: &str) -> Result<Option<Command>, String> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return Ok(None);
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Some(Command::Say(line.to_string())));
    };
    if rest.starts_with('/') {
        return Ok(Some(Command::Say(rest.to_string())));
    }

    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };
    let command = match name {
        "join" => Command::Join(required(name, arg)?.to_string()),
        "leave" => Command::Leave,
        "file" => Command::File(PathBuf::from(required(name, arg)?)),
        "voice" => Command::Voice(PathBuf::from(required(name, arg)?)),
        "connect" => Command::Connect,
        "disconnect" => Command::Disconnect,
        "history" => Command::History,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => return Err(format!("unknown command /{other}, try /help")),
    };
    Ok(Some(command))
}

fn required<'a>(name: &str, arg: &'a str) -> Result<&'a str, String> {
    if arg.is_empty() {
        Err(format!("/{name} needs an argument"))
    } else {
        Ok(arg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_said() {
        assert_eq!(parse("hello there\n"), Ok(Some(Command::Say("hello there".into()))));
    }

    #[test]
    fn test_blank_line_is_ignored() {
        assert_eq!(parse("   \n"), Ok(None));
    }

    #[test]
    fn test_double_slash_escapes() {
        assert_eq!(parse("//shrug"), Ok(Some(Command::Say("/shrug".into()))));
    }

    #[test]
    fn test_join_takes_room() {
        assert_eq!(parse("/join  lobby "), Ok(Some(Command::Join("lobby".into()))));
        assert!(parse("/join").is_err());
    }

    #[test]
    fn test_file_and_voice_paths() {
        assert_eq!(
            parse("/file ./cat picture.png"),
            Ok(Some(Command::File(PathBuf::from("./cat picture.png"))))
        );
        assert_eq!(
            parse("/voice clip.ogg"),
            Ok(Some(Command::Voice(PathBuf::from("clip.ogg"))))
        );
    }

    #[test]
    fn test_simple_commands() {
        assert_eq!(parse("/leave"), Ok(Some(Command::Leave)));
        assert_eq!(parse("/quit"), Ok(Some(Command::Quit)));
        assert_eq!(parse("/exit"), Ok(Some(Command::Quit)));
        assert_eq!(parse("/?"), Ok(Some(Command::Help)));
    }

    #[test]
    fn test_unknown_command() {
        let err = parse("/dance").unwrap_err();
        assert!(err.contains("/dance"));
    }
}
