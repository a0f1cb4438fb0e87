/// STOMP 1.2 frames carried over the push WebSocket
use std::fmt;

/// Frame commands this client sends or understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StompCommand {
    Connect,
    Stomp,
    Connected,
    Subscribe,
    Unsubscribe,
    Send,
    Message,
    Receipt,
    Error,
    Disconnect,
}

impl StompCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            StompCommand::Connect => "CONNECT",
            StompCommand::Stomp => "STOMP",
            StompCommand::Connected => "CONNECTED",
            StompCommand::Subscribe => "SUBSCRIBE",
            StompCommand::Unsubscribe => "UNSUBSCRIBE",
            StompCommand::Send => "SEND",
            StompCommand::Message => "MESSAGE",
            StompCommand::Receipt => "RECEIPT",
            StompCommand::Error => "ERROR",
            StompCommand::Disconnect => "DISCONNECT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CONNECT" => Some(StompCommand::Connect),
            "STOMP" => Some(StompCommand::Stomp),
            "CONNECTED" => Some(StompCommand::Connected),
            "SUBSCRIBE" => Some(StompCommand::Subscribe),
            "UNSUBSCRIBE" => Some(StompCommand::Unsubscribe),
            "SEND" => Some(StompCommand::Send),
            "MESSAGE" => Some(StompCommand::Message),
            "RECEIPT" => Some(StompCommand::Receipt),
            "ERROR" => Some(StompCommand::Error),
            "DISCONNECT" => Some(StompCommand::Disconnect),
            _ => None,
        }
    }

    /// CONNECT and CONNECTED headers are sent verbatim
    fn escapes_headers(&self) -> bool {
        !matches!(
            self,
            StompCommand::Connect | StompCommand::Stomp | StompCommand::Connected
        )
    }
}

impl fmt::Display for StompCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("frame ended before the header block was terminated")]
    Truncated,
    #[error("malformed header line: {0}")]
    MalformedHeader(String),
    #[error("invalid escape sequence in header: {0}")]
    InvalidEscape(String),
    #[error("content-length {0} does not match body")]
    ContentLength(String),
    #[error("frame body is not NUL-terminated")]
    MissingNull,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StompFrame {
    pub command: StompCommand,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl StompFrame {
    pub fn new(command: StompCommand) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// First occurrence wins, as STOMP requires for repeated headers
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Session opening frame; heart-beats are disabled in both directions
    pub fn connect(host: &str, bearer: Option<&str>) -> Self {
        let frame = StompFrame::new(StompCommand::Connect)
            .with_header("accept-version", "1.2")
            .with_header("host", host)
            .with_header("heart-beat", "0,0");

        match bearer {
            Some(bearer) => frame.with_header("Authorization", bearer),
            None => frame,
        }
    }

    pub fn subscribe(id: &str, destination: &str) -> Self {
        StompFrame::new(StompCommand::Subscribe)
            .with_header("id", id)
            .with_header("destination", destination)
            .with_header("ack", "auto")
    }

    pub fn unsubscribe(id: &str) -> Self {
        StompFrame::new(StompCommand::Unsubscribe).with_header("id", id)
    }

    pub fn disconnect() -> Self {
        StompFrame::new(StompCommand::Disconnect)
    }

    pub fn encode(&self) -> String {
        let escape = self.command.escapes_headers();
        let mut out = String::with_capacity(64 + self.body.len());

        out.push_str(self.command.as_str());
        out.push('\n');
        for (name, value) in &self.headers {
            if escape {
                out.push_str(&escape_header(name));
                out.push(':');
                out.push_str(&escape_header(value));
            } else {
                out.push_str(name);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }
        if !self.body.is_empty() && self.header("content-length").is_none() {
            out.push_str(&format!("content-length:{}\n", self.body.len()));
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }

    /// Parse one frame. `Ok(None)` means the payload was only a heart-beat.
    pub fn parse(raw: &str) -> Result<Option<Self>, FrameError> {
        let raw = raw.trim_start_matches(['\r', '\n']);
        if raw.is_empty() || raw == "\0" {
            return Ok(None);
        }

        let (command_line, mut rest) = raw.split_once('\n').ok_or(FrameError::Truncated)?;
        let command_line = command_line.trim_end_matches('\r');
        let command = StompCommand::parse(command_line)
            .ok_or_else(|| FrameError::UnknownCommand(command_line.to_string()))?;
        let escaped = command.escapes_headers();

        let mut headers = Vec::new();
        loop {
            let (line, remainder) = rest.split_once('\n').ok_or(FrameError::Truncated)?;
            rest = remainder;

            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                break;
            }

            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| FrameError::MalformedHeader(line.to_string()))?;
            if escaped {
                headers.push((unescape_header(name)?, unescape_header(value)?));
            } else {
                headers.push((name.to_string(), value.to_string()));
            }
        }

        let content_length = headers
            .iter()
            .find(|(k, _)| k == "content-length")
            .map(|(_, v)| v.clone());

        let body = match content_length {
            Some(len) => {
                let n: usize = len
                    .trim()
                    .parse()
                    .map_err(|_| FrameError::ContentLength(len.clone()))?;
                let body = rest.get(..n).ok_or_else(|| FrameError::ContentLength(len.clone()))?;
                if rest.as_bytes().get(n) != Some(&0) {
                    return Err(FrameError::MissingNull);
                }
                body
            }
            None => {
                let end = rest.find('\0').ok_or(FrameError::MissingNull)?;
                &rest[..end]
            }
        };

        Ok(Some(StompFrame {
            command,
            headers,
            body: body.to_string(),
        }))
    }
}

fn escape_header(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
    out
}

fn unescape_header(value: &str) -> Result<String, FrameError> {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some('c') => out.push(':'),
            _ => return Err(FrameError::InvalidEscape(value.to_string())),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_frame_carries_bearer_unescaped() {
        let encoded = StompFrame::connect("approvals.example.edu", Some("Bearer a:b")).encode();

        assert!(encoded.starts_with("CONNECT\n"));
        assert!(encoded.contains("accept-version:1.2\n"));
        assert!(encoded.contains("Authorization:Bearer a:b\n"));
        assert!(encoded.ends_with("\n\n\0"));
    }

    #[test]
    fn test_subscribe_frame_round_trip() {
        let frame = StompFrame::subscribe("sub-0", "/user/queue/notifications");
        let parsed = StompFrame::parse(&frame.encode()).unwrap().unwrap();

        assert_eq!(parsed, frame);
        assert_eq!(parsed.header("destination"), Some("/user/queue/notifications"));
    }

    #[test]
    fn test_parse_message_with_content_length() {
        let body = r#"{"id":"1","title":"Receipt","message":"approved","read":false}"#;
        let raw = format!(
            "MESSAGE\r\ndestination:/user/queue/notifications\r\nmessage-id:7\r\ncontent-length:{}\r\n\r\n{}\0\n",
            body.len(),
            body
        );

        let frame = StompFrame::parse(&raw).unwrap().unwrap();
        assert_eq!(frame.command, StompCommand::Message);
        assert_eq!(frame.header("message-id"), Some("7"));
        assert_eq!(frame.body, body);
    }

    #[test]
    fn test_heartbeat_is_not_a_frame() {
        assert_eq!(StompFrame::parse("\n").unwrap(), None);
        assert_eq!(StompFrame::parse("\r\n\r\n").unwrap(), None);
    }

    #[test]
    fn test_header_escaping() {
        let frame = StompFrame::new(StompCommand::Message)
            .with_header("note", "a:b\\c\nd")
            .with_body("x");
        let encoded = frame.encode();
        assert!(encoded.contains("note:a\\cb\\\\c\\nd\n"));

        let parsed = StompFrame::parse(&encoded).unwrap().unwrap();
        assert_eq!(parsed.header("note"), Some("a:b\\c\nd"));
    }

    #[test]
    fn test_repeated_header_first_wins() {
        let raw = "MESSAGE\nfoo:first\nfoo:second\n\n\0";
        let frame = StompFrame::parse(raw).unwrap().unwrap();
        assert_eq!(frame.header("foo"), Some("first"));
    }

    #[test]
    fn test_malformed_frames() {
        assert!(matches!(
            StompFrame::parse("HELLO\n\n\0"),
            Err(FrameError::UnknownCommand(_))
        ));
        assert_eq!(StompFrame::parse("MESSAGE\nfoo:bar\n\nbody"), Err(FrameError::MissingNull));
        assert_eq!(StompFrame::parse("MESSAGE\nfoo:bar"), Err(FrameError::Truncated));
        assert!(matches!(
            StompFrame::parse("MESSAGE\nnocolon\n\n\0"),
            Err(FrameError::MalformedHeader(_))
        ));
        assert!(matches!(
            StompFrame::parse("MESSAGE\nbad:\\t\n\n\0"),
            Err(FrameError::InvalidEscape(_))
        ));
        assert!(matches!(
            StompFrame::parse("MESSAGE\ncontent-length:99\n\nshort\0"),
            Err(FrameError::ContentLength(_))
        ));
    }

    #[test]
    fn test_error_frame_message_header() {
        let raw = "ERROR\nmessage:Invalid token\n\nDetails\0";
        let frame = StompFrame::parse(raw).unwrap().unwrap();
        assert_eq!(frame.command, StompCommand::Error);
        assert_eq!(frame.header("message"), Some("Invalid token"));
        assert_eq!(frame.body, "Details");
    }
}
