//! HTTP/1.1 upgrade request encoding and response parsing.

use httparse::Status;

use crate::error::HandshakeError;

/// Maximum number of response headers parsed during the handshake.
const MAX_RESPONSE_HEADERS: usize = 32;

/// A borrowed HTTP header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header<'a> {
    /// Header name, compared without case.
    pub name: &'a str,
    /// Raw header value.
    pub value: &'a [u8],
}

/// An outgoing `GET` upgrade request.
#[derive(Debug)]
pub struct Request<'headers, 'buf> {
    path: &'buf str,
    headers: &'headers [Header<'buf>],
    additional_headers: &'headers [Header<'buf>],
}

impl<'headers, 'buf> Request<'headers, 'buf> {
    /// A request for `path` with the required `headers` followed by user supplied ones.
    pub const fn get(
        path: &'buf str,
        headers: &'headers [Header<'buf>],
        additional_headers: &'headers [Header<'buf>],
    ) -> Self {
        Request {
            path,
            headers,
            additional_headers,
        }
    }

    /// Writes the request line, all headers and the terminating blank line.
    pub fn encode(&self) -> Vec<u8> {
        let mut dst = Vec::with_capacity(256);

        dst.extend_from_slice(b"GET ");
        dst.extend_from_slice(self.path.as_bytes());
        dst.extend_from_slice(b" HTTP/1.1\r\n");

        for header in self.headers.iter().chain(self.additional_headers) {
            dst.extend_from_slice(header.name.as_bytes());
            dst.extend_from_slice(b": ");
            dst.extend_from_slice(header.value);
            dst.extend_from_slice(b"\r\n");
        }

        dst.extend_from_slice(b"\r\n");

        dst
    }
}

/// A parsed handshake response head.
#[derive(Debug)]
pub struct Response<'buf> {
    version: Option<u8>,
    code: Option<u16>,
    headers: Vec<Header<'buf>>,
}

impl<'buf> Response<'buf> {
    /// Parses a complete response head, including its terminating blank line.
    pub fn parse(src: &'buf [u8]) -> Result<Self, HandshakeError> {
        let mut headers = [httparse::EMPTY_HEADER; MAX_RESPONSE_HEADERS];
        let mut response = httparse::Response::new(&mut headers);

        match response.parse(src)? {
            Status::Complete(_) => Ok(Self {
                version: response.version,
                code: response.code,
                headers: response
                    .headers
                    .iter()
                    .map(|h| Header {
                        name: h.name,
                        value: h.value,
                    })
                    .collect(),
            }),
            Status::Partial => Err(HandshakeError::ConnectionClosed),
        }
    }

    /// The status code.
    pub const fn code(&self) -> Option<u16> {
        self.code
    }

    /// Returns whether this is an `HTTP/1.1 101` response.
    pub fn is_switching_protocols(&self) -> bool {
        self.version == Some(1) && self.code == Some(101)
    }

    /// The first header called `name`.
    pub fn header(&self, name: &str) -> Option<&Header<'buf>> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
    }

    /// The raw value of the first header called `name`.
    pub fn header_value(&self, name: &str) -> Option<&'buf [u8]> {
        self.header(name).map(|h| h.value)
    }

    /// Like [`Response::header_value`], if the value is UTF-8.
    pub fn header_value_str(&self, name: &str) -> Option<&'buf str> {
        self.header_value(name)
            .and_then(|v| core::str::from_utf8(v).ok())
    }

    /// Returns whether the comma separated header `name` lists `token`, ignoring case.
    pub fn header_has_token(&self, name: &str, token: &str) -> bool {
        self.header_value_str(name).is_some_and(|v| {
            v.split(',')
                .any(|item| item.trim().eq_ignore_ascii_case(token))
        })
    }
}

/// Returns the position just past the first `\r\n\r\n` in `src`, searching from `from`.
pub fn find_head_end(src: &[u8], from: usize) -> Option<usize> {
    let start = from.saturating_sub(3);

    src.get(start..)?
        .windows(4)
        .position(|window| window == b"\r\n\r\n")
        .map(|position| start + position + 4)
}
