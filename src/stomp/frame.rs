use crate::error::{ChatError, Result};

use super::commands::{command, header};

/// One STOMP frame. Headers keep wire order; lookups return the first
/// occurrence of a repeated header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

/// CONNECT and CONNECTED predate header escaping and carry values raw.
fn escapes_headers(cmd: &str) -> bool {
    cmd != command::CONNECT && cmd != command::CONNECTED
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            c => out.push(c),
        }
    }
    out
}

fn unescape(value: &str) -> Result<String> {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
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
            other => {
                return Err(ChatError::Decode(format!(
                    "invalid header escape: \\{}",
                    other.map(String::from).unwrap_or_default()
                )))
            }
        }
    }
    Ok(out)
}

/// Split off one line, accepting both LF and CRLF endings.
fn next_line(input: &str) -> Result<(&str, &str)> {
    let end = input
        .find('\n')
        .ok_or_else(|| ChatError::Decode("truncated frame".to_string()))?;
    let line = input[..end].strip_suffix('\r').unwrap_or(&input[..end]);
    Ok((line, &input[end + 1..]))
}

impl Frame {
    pub fn new(cmd: &str) -> Self {
        Self {
            command: cmd.to_string(),
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn is(&self, cmd: &str) -> bool {
        self.command == cmd
    }

    /// Reason carried by an ERROR frame: the `message` header, else the body.
    pub fn error_reason(&self) -> String {
        match self.get(header::MESSAGE) {
            Some(msg) if !msg.is_empty() => msg.to_string(),
            _ if !self.body.trim().is_empty() => self.body.trim().to_string(),
            _ => "no reason given".to_string(),
        }
    }

    pub fn encode(&self) -> String {
        let escaped = escapes_headers(&self.command);
        let mut out = String::with_capacity(self.body.len() + 64);
        out.push_str(&self.command);
        out.push('\n');
        for (name, value) in &self.headers {
            if escaped {
                out.push_str(&escape(name));
                out.push(':');
                out.push_str(&escape(value));
            } else {
                out.push_str(name);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }
        if !self.body.is_empty() && self.get(header::CONTENT_LENGTH).is_none() {
            out.push_str(header::CONTENT_LENGTH);
            out.push(':');
            out.push_str(&self.body.len().to_string());
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }

    fn parse_one(input: &str) -> Result<(Frame, &str)> {
        let (cmd, mut rest) = next_line(input)?;
        if cmd.is_empty() {
            return Err(ChatError::Decode("missing command".to_string()));
        }
        let escaped = escapes_headers(cmd);
        let mut frame = Frame::new(cmd);

        loop {
            let (line, remaining) = next_line(rest)?;
            rest = remaining;
            if line.is_empty() {
                break;
            }
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| ChatError::Decode(format!("malformed header line: {line}")))?;
            if escaped {
                frame.headers.push((unescape(name)?, unescape(value)?));
            } else {
                frame.headers.push((name.to_string(), value.to_string()));
            }
        }

        let content_length = frame
            .get(header::CONTENT_LENGTH)
            .map(|v| {
                v.trim()
                    .parse::<usize>()
                    .map_err(|_| ChatError::Decode(format!("bad content-length: {v}")))
            })
            .transpose()?;

        let body_end = match content_length {
            Some(len) => {
                if rest.len() <= len || !rest.is_char_boundary(len) || rest.as_bytes()[len] != 0 {
                    return Err(ChatError::Decode(
                        "body does not match content-length".to_string(),
                    ));
                }
                len
            }
            None => rest
                .find('\0')
                .ok_or_else(|| ChatError::Decode("frame missing NUL terminator".to_string()))?,
        };

        frame.body = rest[..body_end].to_string();
        Ok((frame, &rest[body_end + 1..]))
    }
}

/// Decode every frame in one websocket text message. Bare EOLs are
/// heart-beats and produce no frames.
pub fn decode(text: &str) -> Result<Vec<Frame>> {
    let mut frames = Vec::new();
    let mut rest = text;
    loop {
        rest = rest.trim_start_matches(['\r', '\n']);
        if rest.is_empty() {
            return Ok(frames);
        }
        let (frame, remaining) = Frame::parse_one(rest)?;
        frames.push(frame);
        rest = remaining;
    }
}
