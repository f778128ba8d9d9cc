//! Length-prefixed framing for peer connections.
//!
//! Every message, control text or chunk payload, travels as one frame:
//!
//! ```text
//! u32 BE   length of (kind + body)
//! u8       kind
//! ...      body
//! ```
//!
//! | kind | frame | body |
//! |---|---|---|
//! | `0x01` | [`Frame::Text`] | UTF-8 text |
//! | `0x02` | [`Frame::Chunk`] | `u32 BE index`, `u32 BE length`, bytes |
//! | `0x03` | [`Frame::Data`] | `u32 BE length`, bytes |
//!
//! All multi-byte fields are big-endian (network byte order).

use crate::error::FrameError;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Size of the outer length prefix
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Largest accepted value of the length prefix (16 MiB)
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Receiver is ready for chunk frames
pub const READY: &str = "READY";

/// Chunk stored
pub const ACK: &str = "ACK";

/// Holder cannot serve the request
pub const MISSING: &str = "MISSING";

const GET_CHUNK_PREFIX: &str = "GET_CHUNK:";
const RECOVER_PREFIX: &str = "RECOVER:";
const CORRUPT_PREFIX: &str = "corrupt|";

/// Frame kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameKind {
    /// UTF-8 control text
    Text = 0x01,
    /// Indexed chunk (push transfer)
    Chunk = 0x02,
    /// Raw bytes (pull reply, recovery resend)
    Data = 0x03,
}

impl TryFrom<u8> for FrameKind {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Self::Text),
            0x02 => Ok(Self::Chunk),
            0x03 => Ok(Self::Data),
            _ => Err(FrameError::UnknownKind(value)),
        }
    }
}

/// A decoded frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Control text
    Text(String),
    /// Chunk pushed during a seed session
    Chunk {
        /// Chunk index within the file
        index: u32,
        /// Chunk bytes
        data: Vec<u8>,
    },
    /// Unindexed chunk bytes
    Data(Vec<u8>),
}

impl Frame {
    /// Text frame
    pub fn text(text: impl Into<String>) -> Self {
        Frame::Text(text.into())
    }

    /// Kind byte of this frame
    #[must_use]
    pub fn kind(&self) -> FrameKind {
        match self {
            Frame::Text(_) => FrameKind::Text,
            Frame::Chunk { .. } => FrameKind::Chunk,
            Frame::Data(_) => FrameKind::Data,
        }
    }

    /// Borrow the text of a text frame
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Frame::Text(text) => Some(text),
            _ => None,
        }
    }

    fn body_len(&self) -> usize {
        match self {
            Frame::Text(text) => text.len(),
            Frame::Chunk { data, .. } => 8 + data.len(),
            Frame::Data(data) => 4 + data.len(),
        }
    }

    /// Total encoded size including the length prefix
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        LENGTH_PREFIX_SIZE + 1 + self.body_len()
    }

    /// Encode into a new buffer
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::TooLarge`] if the frame exceeds [`MAX_FRAME_LEN`].
    pub fn encode(&self) -> Result<Vec<u8>, FrameError> {
        let frame_len = 1 + self.body_len();
        if frame_len > MAX_FRAME_LEN {
            return Err(FrameError::TooLarge(frame_len));
        }

        let mut buf = Vec::with_capacity(LENGTH_PREFIX_SIZE + frame_len);
        buf.extend_from_slice(&(frame_len as u32).to_be_bytes());
        buf.push(self.kind() as u8);

        match self {
            Frame::Text(text) => buf.extend_from_slice(text.as_bytes()),
            Frame::Chunk { index, data } => {
                buf.extend_from_slice(&index.to_be_bytes());
                buf.extend_from_slice(&(data.len() as u32).to_be_bytes());
                buf.extend_from_slice(data);
            }
            Frame::Data(data) => {
                buf.extend_from_slice(&(data.len() as u32).to_be_bytes());
                buf.extend_from_slice(data);
            }
        }

        Ok(buf)
    }

    /// Decode one frame from the front of `buf`
    ///
    /// Returns the frame and the number of bytes consumed.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer is truncated or the frame is malformed.
    pub fn decode(buf: &[u8]) -> Result<(Self, usize), FrameError> {
        if buf.len() < LENGTH_PREFIX_SIZE {
            return Err(FrameError::TooShort {
                expected: LENGTH_PREFIX_SIZE,
                actual: buf.len(),
            });
        }

        let frame_len = read_u32(buf, 0) as usize;
        check_frame_len(frame_len)?;

        let total = LENGTH_PREFIX_SIZE + frame_len;
        if buf.len() < total {
            return Err(FrameError::TooShort {
                expected: total,
                actual: buf.len(),
            });
        }

        let frame = Self::decode_body(&buf[LENGTH_PREFIX_SIZE..total])?;
        Ok((frame, total))
    }

    /// Decode `kind + body` (the bytes covered by the length prefix)
    fn decode_body(bytes: &[u8]) -> Result<Self, FrameError> {
        let (&kind, body) = bytes.split_first().ok_or(FrameError::TooShort {
            expected: 1,
            actual: 0,
        })?;

        match FrameKind::try_from(kind)? {
            FrameKind::Text => String::from_utf8(body.to_vec())
                .map(Frame::Text)
                .map_err(|_| FrameError::InvalidUtf8),
            FrameKind::Chunk => {
                if body.len() < 8 {
                    return Err(FrameError::TooShort {
                        expected: 8,
                        actual: body.len(),
                    });
                }
                let index = read_u32(body, 0);
                let data = payload(&body[4..])?;
                Ok(Frame::Chunk { index, data })
            }
            FrameKind::Data => payload(body).map(Frame::Data),
        }
    }
}

fn read_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

fn check_frame_len(frame_len: usize) -> Result<(), FrameError> {
    if frame_len == 0 {
        return Err(FrameError::TooShort {
            expected: 1,
            actual: 0,
        });
    }
    if frame_len > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge(frame_len));
    }
    Ok(())
}

/// Parse `u32 length` followed by exactly that many bytes
fn payload(body: &[u8]) -> Result<Vec<u8>, FrameError> {
    if body.len() < 4 {
        return Err(FrameError::TooShort {
            expected: 4,
            actual: body.len(),
        });
    }
    let declared = read_u32(body, 0) as usize;
    let data = &body[4..];
    if declared != data.len() {
        return Err(FrameError::LengthMismatch {
            declared,
            actual: data.len(),
        });
    }
    Ok(data.to_vec())
}

/// Read one frame
///
/// Returns `Ok(None)` when the peer closed the connection on a frame
/// boundary.
///
/// # Errors
///
/// Returns [`FrameError::ConnectionClosed`] on EOF inside a frame, or a
/// decoding error for a malformed frame.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Frame>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
    let first = reader.read(&mut prefix).await?;
    if first == 0 {
        return Ok(None);
    }
    read_exact(reader, &mut prefix[first..]).await?;

    let frame_len = u32::from_be_bytes(prefix) as usize;
    check_frame_len(frame_len)?;

    let mut bytes = vec![0u8; frame_len];
    read_exact(reader, &mut bytes).await?;
    Frame::decode_body(&bytes).map(Some)
}

async fn read_exact<R>(reader: &mut R, buf: &mut [u8]) -> Result<(), FrameError>
where
    R: AsyncRead + Unpin,
{
    match reader.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            Err(FrameError::ConnectionClosed)
        }
        Err(e) => Err(FrameError::Io(e)),
    }
}

/// Write one frame and flush
///
/// # Errors
///
/// Returns an error if the frame is too large or the write fails.
pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    let buf = frame.encode()?;
    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}

/// First text frame of an inbound connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `GET_CHUNK:<file_id>:<chunk_id>`
    GetChunk {
        /// Requested file
        file_id: String,
        /// Requested chunk
        chunk_id: u32,
    },
    /// `RECOVER:<file_id>`
    Recover {
        /// File being repaired
        file_id: String,
    },
    /// Any other text opens a push session for that file name
    Push {
        /// Pushed file name
        file_id: String,
    },
}

impl Command {
    /// Parse the opening text of a session
    ///
    /// Returns `None` for a reserved prefix with a malformed argument.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        if let Some(rest) = text.strip_prefix(GET_CHUNK_PREFIX) {
            // File names may contain ':'; the index follows the last one
            let (file_id, chunk_id) = rest.rsplit_once(':')?;
            if file_id.is_empty() {
                return None;
            }
            return Some(Command::GetChunk {
                file_id: file_id.to_string(),
                chunk_id: chunk_id.parse().ok()?,
            });
        }

        if let Some(file_id) = text.strip_prefix(RECOVER_PREFIX) {
            if file_id.is_empty() {
                return None;
            }
            return Some(Command::Recover {
                file_id: file_id.to_string(),
            });
        }

        Some(Command::Push {
            file_id: text.to_string(),
        })
    }

    /// Text form sent on the wire
    #[must_use]
    pub fn to_text(&self) -> String {
        match self {
            Command::GetChunk { file_id, chunk_id } => {
                format!("{GET_CHUNK_PREFIX}{file_id}:{chunk_id}")
            }
            Command::Recover { file_id } => format!("{RECOVER_PREFIX}{file_id}"),
            Command::Push { file_id } => file_id.clone(),
        }
    }
}

/// Returns true if a file name would be read as a command
#[must_use]
pub fn is_reserved_name(name: &str) -> bool {
    name.starts_with(GET_CHUNK_PREFIX)
        || name.starts_with(RECOVER_PREFIX)
        || name.starts_with(CORRUPT_PREFIX)
}

/// `corrupt|<index>`
#[must_use]
pub fn corrupt_request(index: u32) -> String {
    format!("{CORRUPT_PREFIX}{index}")
}

/// Parse `corrupt|<index>`
#[must_use]
pub fn parse_corrupt_request(text: &str) -> Option<u32> {
    text.strip_prefix(CORRUPT_PREFIX)?.parse().ok()
}

/// `"<count>/<total>"` header of a push session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushHeader {
    /// Chunks this session will carry
    pub count: u32,
    /// Chunks in the whole file
    pub total: u32,
}

impl PushHeader {
    /// Parse `"<count>/<total>"`
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let (count, total) = text.split_once('/')?;
        let header = Self {
            count: count.trim().parse().ok()?,
            total: total.trim().parse().ok()?,
        };
        (header.count <= header.total).then_some(header)
    }

    /// Wire form
    #[must_use]
    pub fn to_text(self) -> String {
        format!("{}/{}", self.count, self.total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_text_layout() {
        let buf = Frame::text("ACK").encode().unwrap();
        assert_eq!(buf, vec![0, 0, 0, 4, 0x01, b'A', b'C', b'K']);
    }

    #[test]
    fn test_chunk_layout() {
        let frame = Frame::Chunk {
            index: 7,
            data: vec![0xAA, 0xBB],
        };
        let buf = frame.encode().unwrap();
        assert_eq!(
            buf,
            vec![0, 0, 0, 11, 0x02, 0, 0, 0, 7, 0, 0, 0, 2, 0xAA, 0xBB]
        );
        assert_eq!(buf.len(), frame.encoded_len());

        let (decoded, used) = Frame::decode(&buf).unwrap();
        assert_eq!(decoded, frame);
        assert_eq!(used, buf.len());
    }

    #[test]
    fn test_decode_consumes_one_frame() {
        let mut buf = Frame::text("READY").encode().unwrap();
        buf.extend(Frame::Data(vec![1, 2, 3]).encode().unwrap());

        let (first, used) = Frame::decode(&buf).unwrap();
        assert_eq!(first, Frame::text(READY));
        let (second, _) = Frame::decode(&buf[used..]).unwrap();
        assert_eq!(second, Frame::Data(vec![1, 2, 3]));
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(
            Frame::decode(&[0, 0]),
            Err(FrameError::TooShort { .. })
        ));
        assert!(matches!(
            Frame::decode(&[0, 0, 0, 1, 0x09]),
            Err(FrameError::UnknownKind(0x09))
        ));
        assert!(matches!(
            Frame::decode(&[0xFF, 0xFF, 0xFF, 0xFF]),
            Err(FrameError::TooLarge(_))
        ));
        assert!(matches!(
            Frame::decode(&[0, 0, 0, 3, 0x01, 0xC3, 0x28]),
            Err(FrameError::InvalidUtf8)
        ));
        // Data frame announcing 5 bytes but carrying 1
        assert!(matches!(
            Frame::decode(&[0, 0, 0, 6, 0x03, 0, 0, 0, 5, 9]),
            Err(FrameError::LengthMismatch {
                declared: 5,
                actual: 1
            })
        ));
    }

    #[test]
    fn test_oversized_encode_rejected() {
        let frame = Frame::Data(vec![0u8; MAX_FRAME_LEN]);
        assert!(matches!(frame.encode(), Err(FrameError::TooLarge(_))));
    }

    #[tokio::test]
    async fn test_stream_read_write() {
        let (mut a, mut b) = tokio::io::duplex(64 * 1024);

        write_frame(&mut a, &Frame::text("notes.txt")).await.unwrap();
        write_frame(&mut a, &Frame::Data(vec![5; 512])).await.unwrap();
        drop(a);

        assert_eq!(
            read_frame(&mut b).await.unwrap(),
            Some(Frame::text("notes.txt"))
        );
        assert_eq!(
            read_frame(&mut b).await.unwrap(),
            Some(Frame::Data(vec![5; 512]))
        );
        // Clean EOF on a frame boundary
        assert_eq!(read_frame(&mut b).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_eof_inside_frame() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        let buf = Frame::text("READY").encode().unwrap();
        a.write_all(&buf[..6]).await.unwrap();
        drop(a);

        let err = read_frame(&mut b).await.unwrap_err();
        assert!(err.is_disconnect());
    }

    #[test]
    fn test_command_parsing() {
        assert_eq!(
            Command::parse("GET_CHUNK:report.pdf:12"),
            Some(Command::GetChunk {
                file_id: "report.pdf".into(),
                chunk_id: 12
            })
        );
        assert_eq!(
            Command::parse("GET_CHUNK:a:b.txt:3"),
            Some(Command::GetChunk {
                file_id: "a:b.txt".into(),
                chunk_id: 3
            })
        );
        assert_eq!(
            Command::parse("RECOVER:report.pdf"),
            Some(Command::Recover {
                file_id: "report.pdf".into()
            })
        );
        assert_eq!(
            Command::parse("report.pdf"),
            Some(Command::Push {
                file_id: "report.pdf".into()
            })
        );
        assert_eq!(Command::parse("GET_CHUNK:report.pdf:x"), None);
        assert_eq!(Command::parse("RECOVER:"), None);

        let cmd = Command::GetChunk {
            file_id: "f".into(),
            chunk_id: 4,
        };
        assert_eq!(Command::parse(&cmd.to_text()), Some(cmd));
    }

    #[test]
    fn test_reserved_names() {
        assert!(is_reserved_name("GET_CHUNK:x"));
        assert!(is_reserved_name("RECOVER:x"));
        assert!(is_reserved_name("corrupt|1"));
        assert!(!is_reserved_name("GET_CHUNK.txt"));
    }

    #[test]
    fn test_corrupt_request() {
        assert_eq!(corrupt_request(6), "corrupt|6");
        assert_eq!(parse_corrupt_request("corrupt|6"), Some(6));
        assert_eq!(parse_corrupt_request("corrupt|"), None);
        assert_eq!(parse_corrupt_request("ACK"), None);
    }

    #[test]
    fn test_push_header() {
        assert_eq!(
            PushHeader::parse("5/10"),
            Some(PushHeader { count: 5, total: 10 })
        );
        assert_eq!(PushHeader::parse("11/10"), None);
        assert_eq!(PushHeader::parse("five/10"), None);
        assert_eq!(PushHeader { count: 0, total: 3 }.to_text(), "0/3");
    }

    proptest! {
        #[test]
        fn prop_decode_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
            let _ = Frame::decode(&bytes);
        }

        #[test]
        fn prop_chunk_frames_survive_encoding(
            index in any::<u32>(),
            data in proptest::collection::vec(any::<u8>(), 0..2048),
        ) {
            let frame = Frame::Chunk { index, data };
            let buf = frame.encode().unwrap();
            let (decoded, used) = Frame::decode(&buf).unwrap();
            prop_assert_eq!(used, buf.len());
            prop_assert_eq!(decoded, frame);
        }
    }
}
