/// One line of console input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Chats,
    Open(String),
    Send(String),
    Upload(String),
    Seen,
    Contacts,
    New(usize),
    Help,
    Quit,
}

pub const HELP: &str = "\
/chats            list chats
/open <n|id>      open a chat by list number or id
/send <text>      send text to the open chat (bare text works too)
/upload <path>    upload a file to the open chat
/seen             mark the open chat seen
/contacts         list contacts
/new <n>          start a chat with contact number n
/quit             exit";

pub fn parse(line: &str) -> Result<Option<Command>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    if !line.starts_with('/') {
        return Ok(Some(Command::Send(line.to_string())));
    }

    let (name, rest) = match line.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (line, ""),
    };
    let needs_arg = |usage: &str| {
        if rest.is_empty() {
            Err(format!("usage: {usage}"))
        } else {
            Ok(rest.to_string())
        }
    };

    let command = match name {
        "/chats" => Command::Chats,
        "/open" => Command::Open(needs_arg("/open <n|id>")?),
        "/send" => Command::Send(needs_arg("/send <text>")?),
        "/upload" => Command::Upload(needs_arg("/upload <path>")?),
        "/seen" => Command::Seen,
        "/contacts" => Command::Contacts,
        "/new" => {
            let index = needs_arg("/new <n>")?;
            let index = index
                .parse::<usize>()
                .map_err(|_| format!("not a contact number: {index}"))?;
            Command::New(index)
        }
        "/help" => Command::Help,
        "/quit" | "/exit" => Command::Quit,
        other => return Err(format!("unknown command {other}; try /help")),
    };
    Ok(Some(command))
}

/// Best-effort content type from a file extension.
pub fn mime_for(path: &str) -> Option<&'static str> {
    let extension = path.rsplit_once('.')?.1.to_ascii_lowercase();
    Some(match extension.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "mp3" => "audio/mpeg",
        "mp4" => "video/mp4",
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_text_is_sent() {
        assert_eq!(
            parse("  hello there ").expect("parse"),
            Some(Command::Send("hello there".into()))
        );
        assert_eq!(parse("   ").expect("parse"), None);
    }

    #[test]
    fn commands_with_arguments() {
        assert_eq!(
            parse("/open 2").expect("parse"),
            Some(Command::Open("2".into()))
        );
        assert_eq!(
            parse("/upload ./cat.png").expect("parse"),
            Some(Command::Upload("./cat.png".into()))
        );
        assert_eq!(parse("/new 3").expect("parse"), Some(Command::New(3)));
        assert!(parse("/open").is_err());
        assert!(parse("/new x").is_err());
        assert!(parse("/bogus").is_err());
    }

    #[test]
    fn mime_from_extension() {
        assert_eq!(mime_for("photo.JPG"), Some("image/jpeg"));
        assert_eq!(mime_for("notes.txt"), None);
        assert_eq!(mime_for("no_extension"), None);
    }
}
