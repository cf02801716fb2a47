//! multipart/x-mixed-replace framing for JPEG parts.

use std::io::{self, Write};

/// Boundary token shared by the response header and every part on a connection.
pub const BOUNDARY: &str = "frame";

pub const PART_CONTENT_TYPE: &str = "image/jpeg";

/// `Content-Type` value for a stream whose parts are delimited by `boundary`.
pub fn content_type(boundary: &str) -> String {
    format!("multipart/x-mixed-replace; boundary={boundary}")
}

/// Wire form of one encoded frame:
/// `--<boundary>\r\nContent-Type: image/jpeg\r\n\r\n<jpeg>\r\n`.
#[derive(Clone, Copy, Debug)]
pub struct MultipartChunk<'a> {
    boundary: &'a str,
    payload: &'a [u8],
}

impl<'a> MultipartChunk<'a> {
    pub fn new(boundary: &'a str, payload: &'a [u8]) -> Self {
        Self { boundary, payload }
    }

    fn head(&self) -> String {
        format!(
            "--{}\r\nContent-Type: {}\r\n\r\n",
            self.boundary, PART_CONTENT_TYPE
        )
    }

    pub fn encoded_len(&self) -> usize {
        self.head().len() + self.payload.len() + 2
    }

    /// Writes the whole chunk in one `write_all` call.
    pub fn write_to<W: Write + ?Sized>(&self, sink: &mut W) -> io::Result<()> {
        sink.write_all(&self.to_bytes())
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        out.extend_from_slice(self.head().as_bytes());
        out.extend_from_slice(self.payload);
        out.extend_from_slice(b"\r\n");
        out
    }
}
