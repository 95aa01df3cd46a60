// STOMP 1.2 frame codec
// https://stomp.github.io/stomp-specification-1.2.html

use anyhow::{anyhow, Result};

const NUL: u8 = 0;

#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub command: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Frame {
    pub fn new(command: &str) -> Self {
        Frame {
            command: command.to_string(),
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// First value wins for repeated headers
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn connect(host: &str, token: &str) -> Self {
        Frame::new("CONNECT")
            .header("accept-version", "1.2")
            .header("host", host)
            .header("heart-beat", "0,0")
            .header("Authorization", &format!("Bearer {}", token))
    }

    pub fn subscribe(id: &str, destination: &str) -> Self {
        Frame::new("SUBSCRIBE")
            .header("id", id)
            .header("destination", destination)
            .header("ack", "auto")
    }

    pub fn send(destination: &str, json: String) -> Self {
        let length = json.len().to_string();
        Frame::new("SEND")
            .header("destination", destination)
            .header("content-type", "application/json")
            .header("content-length", &length)
            .body(json)
    }

    pub fn disconnect(receipt: &str) -> Self {
        Frame::new("DISCONNECT").header("receipt", receipt)
    }

    /// CONNECT and CONNECTED headers are sent verbatim
    fn escapes_headers(command: &str) -> bool {
        command != "CONNECT" && command != "CONNECTED"
    }

    pub fn encode(&self) -> String {
        let escape = Self::escapes_headers(&self.command);
        let mut out = String::with_capacity(self.body.len() + 64);
        out.push_str(&self.command);
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
        out.push('\n');
        out.push_str(&self.body);
        out.push(NUL as char);
        out
    }
}

/// Decode every frame in one WebSocket payload; bare EOLs are heart-beats
pub fn decode_all(payload: &str) -> Result<Vec<Frame>> {
    let bytes = payload.as_bytes();
    let mut frames = Vec::new();
    let mut pos = 0;

    loop {
        while pos < bytes.len() && (bytes[pos] == b'\n' || bytes[pos] == b'\r') {
            pos += 1;
        }
        if pos >= bytes.len() {
            break;
        }
        let (frame, next) = decode_one(bytes, pos)?;
        frames.push(frame);
        pos = next;
    }

    Ok(frames)
}

fn read_line(bytes: &[u8], pos: usize) -> Result<(&str, usize)> {
    let end = bytes[pos..]
        .iter()
        .position(|&b| b == b'\n')
        .map(|offset| pos + offset)
        .ok_or_else(|| anyhow!("Truncated STOMP frame: missing end of line"))?;
    let line = &bytes[pos..end];
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    let text = std::str::from_utf8(line).map_err(|e| anyhow!("Invalid UTF-8 in frame header: {}", e))?;
    Ok((text, end + 1))
}

fn decode_one(bytes: &[u8], start: usize) -> Result<(Frame, usize)> {
    let (command, mut pos) = read_line(bytes, start)?;
    if command.is_empty() {
        return Err(anyhow!("STOMP frame without a command"));
    }
    let escaped = Frame::escapes_headers(command);
    let mut frame = Frame::new(command);

    loop {
        let (line, next) = read_line(bytes, pos)?;
        pos = next;
        if line.is_empty() {
            break;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| anyhow!("Malformed STOMP header: '{}'", line))?;
        if escaped {
            frame.headers.push((unescape_header(name)?, unescape_header(value)?));
        } else {
            frame.headers.push((name.to_string(), value.to_string()));
        }
    }

    let body_end = match frame.get("content-length") {
        Some(len) => {
            let len: usize = len
                .trim()
                .parse()
                .map_err(|_| anyhow!("Invalid content-length '{}'", len))?;
            let end = pos
                .checked_add(len)
                .ok_or_else(|| anyhow!("content-length {} out of range", len))?;
            if end >= bytes.len() || bytes[end] != NUL {
                return Err(anyhow!("STOMP body shorter than content-length {}", len));
            }
            end
        }
        None => bytes[pos..]
            .iter()
            .position(|&b| b == NUL)
            .map(|offset| pos + offset)
            .ok_or_else(|| anyhow!("Truncated STOMP frame: missing NUL terminator"))?,
    };

    frame.body = std::str::from_utf8(&bytes[pos..body_end])
        .map_err(|e| anyhow!("Invalid UTF-8 in frame body: {}", e))?
        .to_string();

    Ok((frame, body_end + 1))
}

fn escape_header(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
    out
}

fn unescape_header(raw: &str) -> Result<String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            other => return Err(anyhow!("Undefined escape sequence in header: \\{:?}", other)),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_frame_layout() {
        let frame = Frame::send("/app/chat.send", r#"{"content":"hi"}"#.to_string());
        assert_eq!(
            frame.encode(),
            "SEND\ndestination:/app/chat.send\ncontent-type:application/json\ncontent-length:16\n\n{\"content\":\"hi\"}\0"
        );
    }

    #[test]
    fn connect_headers_are_not_escaped() {
        let encoded = Frame::connect("localhost", "abc").encode();
        assert!(encoded.starts_with("CONNECT\naccept-version:1.2\nhost:localhost\n"));
        assert!(encoded.contains("Authorization:Bearer abc\n"));
    }

    #[test]
    fn message_frame_with_heartbeats() {
        let payload = "\n\nMESSAGE\ndestination:/user/1/queue/messages\nsubscription:sub-0\nmessage-id:7\n\n{\"content\":\"hi\"}\0\n";
        let frames = decode_all(payload).unwrap();

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].command, "MESSAGE");
        assert_eq!(frames[0].get("subscription"), Some("sub-0"));
        assert_eq!(frames[0].body, "{\"content\":\"hi\"}");
    }

    #[test]
    fn several_frames_in_one_payload() {
        let payload = "CONNECTED\nversion:1.2\n\n\0MESSAGE\ndestination:/q\n\nfirst\0MESSAGE\ndestination:/q\n\nsecond\0";
        let frames = decode_all(payload).unwrap();
        let bodies: Vec<_> = frames.iter().map(|f| f.body.as_str()).collect();
        assert_eq!(bodies, vec!["", "first", "second"]);
        assert_eq!(frames[0].get("version"), Some("1.2"));
    }

    #[test]
    fn content_length_allows_nul_free_reading() {
        let payload = "MESSAGE\ncontent-length:5\n\nhello\0";
        let frames = decode_all(payload).unwrap();
        assert_eq!(frames[0].body, "hello");

        let short = "MESSAGE\ncontent-length:9\n\nhello\0";
        assert!(decode_all(short).is_err());
    }

    #[test]
    fn huge_content_length_is_an_error() {
        let payload = format!("MESSAGE\ncontent-length:{}\n\n\0", usize::MAX);
        assert!(decode_all(&payload).is_err());

        let payload = format!("MESSAGE\ncontent-length:{}\n\nhi\0", usize::MAX - 2);
        assert!(decode_all(&payload).is_err());
    }

    #[test]
    fn header_escaping() {
        let frame = Frame::new("MESSAGE").header("note", "a:b\nc\\d");
        let encoded = frame.encode();
        assert!(encoded.contains("note:a\\cb\\nc\\\\d\n"));

        let decoded = decode_all(&encoded).unwrap();
        assert_eq!(decoded[0].get("note"), Some("a:b\nc\\d"));
    }

    #[test]
    fn repeated_header_first_wins() {
        let payload = "MESSAGE\nfoo:first\nfoo:second\n\n\0";
        let frames = decode_all(payload).unwrap();
        assert_eq!(frames[0].get("foo"), Some("first"));
    }

    #[test]
    fn crlf_line_endings() {
        let payload = "ERROR\r\nmessage:bad auth\r\n\r\ndetails\0";
        let frames = decode_all(payload).unwrap();
        assert_eq!(frames[0].command, "ERROR");
        assert_eq!(frames[0].get("message"), Some("bad auth"));
        assert_eq!(frames[0].body, "details");
    }

    #[test]
    fn truncated_frames_are_errors() {
        assert!(decode_all("MESSAGE\ndestination:/q\n\nno terminator").is_err());
        assert!(decode_all("MESSAGE\nbroken header\n\n\0").is_err());
        assert!(decode_all("MESSAGE\nbad:\\x\n\n\0").is_err());
    }
}
