//! Wire codec for the ipstash protocol.
//!
//! Binary tag/length framing. A command frame is a tag byte followed by a
//! u16 big-endian filename length and the filename bytes (length 0 for
//! LIST). Every reply frame starts with the RESPONSE marker followed by a
//! flag byte selecting status, size or error payload. A LIST reply body is
//! a sequence of `{u16 len, name, u32 size}` records terminated by
//! connection close; since a connection serves exactly one command, close
//! delimits the listing.

use crate::error::{AppResult, DomainError};
use crate::models::FileEntry;

// Command tags
pub const TAG_GET: u8 = 0x01;
pub const TAG_PUT: u8 = 0x02;
pub const TAG_DELETE: u8 = 0x03;
pub const TAG_LIST: u8 = 0x04;
/// First byte of every reply frame
pub const TAG_RESPONSE: u8 = 0x05;

// Reply flags
pub const FLAG_STATUS: u8 = 0x20;
pub const FLAG_SIZE: u8 = 0x40;
pub const FLAG_ERROR: u8 = 0x80;

pub const STATUS_OK: u8 = 0x80;
pub const STATUS_NOTOK: u8 = 0x00;

// Error codes carried by FLAG_ERROR frames
pub const ERR_FILE_NOT_FOUND: u8 = 0x01;
pub const ERR_CONNECTION_BROKEN: u8 = 0x02;

/// Chunk size for streamed file transfer.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Upper bound on filename length accepted from the wire.
pub const MAX_NAME_LEN: usize = 255;

/// A parsed client command. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Get { name: String },
    Put { name: String },
    List,
    Delete { name: String },
}

impl Command {
    /// Parse a complete command frame: tag + u16 BE length + name bytes.
    pub fn parse(frame: &[u8]) -> AppResult<Self> {
        if frame.is_empty() {
            return Err(DomainError::Protocol("empty command frame".into()));
        }
        let tag = frame[0];
        if frame.len() < 3 {
            return Err(DomainError::Protocol("truncated command frame".into()));
        }
        let declared = u16::from_be_bytes([frame[1], frame[2]]) as usize;
        let body = &frame[3..];
        if body.len() != declared {
            return Err(DomainError::Protocol(format!(
                "declared name length {declared} but {} bytes follow",
                body.len()
            )));
        }

        match tag {
            TAG_LIST => {
                if declared != 0 {
                    return Err(DomainError::Protocol("LIST carries no filename".into()));
                }
                Ok(Command::List)
            }
            TAG_GET | TAG_PUT | TAG_DELETE => {
                let name = String::from_utf8(body.to_vec())
                    .map_err(|_| DomainError::Protocol("filename is not valid UTF-8".into()))?;
                validate_filename(&name)?;
                Ok(match tag {
                    TAG_GET => Command::Get { name },
                    TAG_PUT => Command::Put { name },
                    _ => Command::Delete { name },
                })
            }
            other => Err(DomainError::Protocol(format!("unknown command tag 0x{other:02x}"))),
        }
    }

    /// Encode a command frame (used by clients and tests).
    pub fn encode(&self) -> Vec<u8> {
        let (tag, name) = match self {
            Command::Get { name } => (TAG_GET, name.as_str()),
            Command::Put { name } => (TAG_PUT, name.as_str()),
            Command::Delete { name } => (TAG_DELETE, name.as_str()),
            Command::List => (TAG_LIST, ""),
        };
        let mut out = Vec::with_capacity(3 + name.len());
        out.push(tag);
        out.extend_from_slice(&(name.len() as u16).to_be_bytes());
        out.extend_from_slice(name.as_bytes());
        out
    }

    pub fn verb(&self) -> &'static str {
        match self {
            Command::Get { .. } => "GET",
            Command::Put { .. } => "PUT",
            Command::List => "LIST",
            Command::Delete { .. } => "DELETE",
        }
    }

    pub fn filename(&self) -> Option<&str> {
        match self {
            Command::Get { name } | Command::Put { name } | Command::Delete { name } => Some(name),
            Command::List => None,
        }
    }
}

/// A parsed reply frame received from the peer mid-command (the ready
/// signal and final ack during GET, the declared size during PUT).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    Status(bool),
    Size(u32),
    Error(u8),
}

impl Reply {
    /// Parse the payload of a reply frame, given its flag byte.
    pub fn parse(flag: u8, payload: &[u8]) -> AppResult<Self> {
        match flag {
            FLAG_STATUS => match payload {
                [STATUS_OK] => Ok(Reply::Status(true)),
                [STATUS_NOTOK] => Ok(Reply::Status(false)),
                _ => Err(DomainError::Protocol("malformed status payload".into())),
            },
            FLAG_SIZE => {
                let bytes: [u8; 4] = payload
                    .try_into()
                    .map_err(|_| DomainError::Protocol("malformed size payload".into()))?;
                Ok(Reply::Size(u32::from_be_bytes(bytes)))
            }
            FLAG_ERROR => match payload {
                [code] => Ok(Reply::Error(*code)),
                _ => Err(DomainError::Protocol("malformed error payload".into())),
            },
            other => Err(DomainError::Protocol(format!("unknown reply flag 0x{other:02x}"))),
        }
    }

    /// Payload length implied by a flag byte.
    pub fn payload_len(flag: u8) -> AppResult<usize> {
        match flag {
            FLAG_STATUS | FLAG_ERROR => Ok(1),
            FLAG_SIZE => Ok(4),
            other => Err(DomainError::Protocol(format!("unknown reply flag 0x{other:02x}"))),
        }
    }
}

pub fn encode_status(ok: bool) -> [u8; 3] {
    [TAG_RESPONSE, FLAG_STATUS, if ok { STATUS_OK } else { STATUS_NOTOK }]
}

pub fn encode_error(code: u8) -> [u8; 3] {
    [TAG_RESPONSE, FLAG_ERROR, code]
}

pub fn encode_size(n: u32) -> [u8; 6] {
    let b = n.to_be_bytes();
    [TAG_RESPONSE, FLAG_SIZE, b[0], b[1], b[2], b[3]]
}

/// Encode a size frame from a stat'ed length, rejecting anything the
/// 4-byte wire field cannot carry instead of truncating it.
pub fn encode_size_checked(n: u64) -> AppResult<[u8; 6]> {
    let n = u32::try_from(n)
        .map_err(|_| DomainError::Protocol(format!("size {n} exceeds the size frame limit")))?;
    Ok(encode_size(n))
}

/// Encode a LIST reply body. Entry order follows the input (directory
/// enumeration order; not stable across calls).
pub fn encode_listing(entries: &[FileEntry]) -> Vec<u8> {
    let mut out = Vec::new();
    for e in entries {
        out.extend_from_slice(&(e.name.len() as u16).to_be_bytes());
        out.extend_from_slice(e.name.as_bytes());
        out.extend_from_slice(&(e.size as u32).to_be_bytes());
    }
    out
}

/// Decode a complete LIST reply body (used by clients and tests).
pub fn decode_listing(mut body: &[u8]) -> AppResult<Vec<FileEntry>> {
    let mut entries = Vec::new();
    while !body.is_empty() {
        if body.len() < 2 {
            return Err(DomainError::Protocol("truncated listing record".into()));
        }
        let len = u16::from_be_bytes([body[0], body[1]]) as usize;
        body = &body[2..];
        if body.len() < len + 4 {
            return Err(DomainError::Protocol("truncated listing record".into()));
        }
        let name = String::from_utf8(body[..len].to_vec())
            .map_err(|_| DomainError::Protocol("listing name is not valid UTF-8".into()))?;
        let size = u32::from_be_bytes([body[len], body[len + 1], body[len + 2], body[len + 3]]);
        body = &body[len + 4..];
        entries.push(FileEntry {
            name,
            size: size as u64,
        });
    }
    Ok(entries)
}

/// Read one command frame from the connection.
pub async fn read_command<R>(reader: &mut R) -> AppResult<Command>
where
    R: tokio::io::AsyncRead + Unpin,
{
    use tokio::io::AsyncReadExt;

    let mut head = [0u8; 3];
    reader.read_exact(&mut head).await?;
    let len = u16::from_be_bytes([head[1], head[2]]) as usize;
    if len > MAX_NAME_LEN {
        return Err(DomainError::Protocol(format!("filename length {len} too long")));
    }
    let mut frame = head.to_vec();
    frame.resize(3 + len, 0);
    reader.read_exact(&mut frame[3..]).await?;
    Command::parse(&frame)
}

/// Read one reply frame (status, size or error) from the connection.
pub async fn read_reply<R>(reader: &mut R) -> AppResult<Reply>
where
    R: tokio::io::AsyncRead + Unpin,
{
    use tokio::io::AsyncReadExt;

    let mut head = [0u8; 2];
    reader.read_exact(&mut head).await?;
    if head[0] != TAG_RESPONSE {
        return Err(DomainError::Protocol(format!(
            "expected response marker, got 0x{:02x}",
            head[0]
        )));
    }
    let len = Reply::payload_len(head[1])?;
    let mut payload = [0u8; 4];
    reader.read_exact(&mut payload[..len]).await?;
    Reply::parse(head[1], &payload[..len])
}

/// Filenames become path segments inside the client's namespace directory,
/// so anything that could escape it is rejected before the filesystem is
/// ever touched.
pub fn validate_filename(name: &str) -> AppResult<()> {
    if name.is_empty() {
        return Err(DomainError::Protocol("empty filename".into()));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(DomainError::Protocol("filename too long".into()));
    }
    if name.contains('/') || name.contains('\\') || name.contains('\0') {
        return Err(DomainError::Protocol(format!(
            "filename {name:?} contains a path separator"
        )));
    }
    if name == "." || name == ".." {
        return Err(DomainError::Protocol(format!(
            "filename {name:?} is a directory reference"
        )));
    }
    Ok(())
}
