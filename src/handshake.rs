use base64::{Engine as _, engine::general_purpose};
use rand_core::RngCore;
use sha1::{Digest, Sha1};
use tracing::{debug, error};

use crate::{
    Options, Uri,
    error::{Error, HandshakeError, TransportError},
    http::{self, Header, Request, Response},
    transport::{Transport, send_all},
};

const RESPONSE_CHUNK: usize = 256;

pub(crate) fn generate_sec_key<R: RngCore>(rng: &mut R) -> [u8; 24] {
    let mut key: [u8; 16] = [0; 16];

    rng.fill_bytes(&mut key);

    // 24 = ((4 * key.len() + 2) / 3 + 3) & !3 = ((4 * 16 + 2) / 3 + 3) & !3
    let mut encoded: [u8; 24] = [0; 24];

    let written = general_purpose::STANDARD
        .encode_slice(key, &mut encoded)
        .unwrap_or_default();

    debug_assert_eq!(written, 24, "sec key must encode to 24 bytes");

    encoded
}

pub(crate) fn generate_sec_accept(sec_key: &[u8]) -> [u8; 28] {
    let mut sha1 = Sha1::new();

    sha1.update(sec_key);
    sha1.update(b"258EAFA5-E914-47DA-95CA-C5AB0DC85B11");

    let hash = sha1.finalize();

    // 28 = ((4 * hash.len() + 2) / 3 + 3) & !3 = ((4 * 20 + 2) / 3 + 3) & !3
    let mut encoded: [u8; 28] = [0; 28];

    let written = general_purpose::STANDARD
        .encode_slice(hash, &mut encoded)
        .unwrap_or_default();

    debug_assert_eq!(written, 28, "sec accept must encode to 28 bytes");

    encoded
}

/// Runs the client upgrade over an already connected transport.
///
/// Returns the bytes received after the response head, which already belong to the
/// WebSocket stream. The transport is left connected either way; the caller tears it down
/// on failure.
pub(crate) fn client_handshake<T: Transport>(
    transport: &mut T,
    uri: &Uri,
    options: &Options,
    sec_key: &[u8; 24],
) -> Result<Vec<u8>, Error<T::Error>> {
    let host = uri.host_header();

    let mut headers = Vec::with_capacity(5);

    if options.header("host").is_none() {
        headers.push(Header {
            name: "Host",
            value: host.as_bytes(),
        });
    }

    headers.extend([
        Header {
            name: "Upgrade",
            value: b"websocket",
        },
        Header {
            name: "Connection",
            value: b"Upgrade",
        },
        Header {
            name: "Sec-WebSocket-Version",
            value: b"13",
        },
        Header {
            name: "Sec-WebSocket-Key",
            value: sec_key,
        },
    ]);

    let additional: Vec<Header<'_>> = options
        .headers()
        .filter(|(name, _)| !headers.iter().any(|h| h.name.eq_ignore_ascii_case(name)))
        .map(|(name, value)| Header {
            name,
            value: value.as_bytes(),
        })
        .collect();

    let request = Request::get(uri.path(), &headers, &additional).encode();

    send_all(transport, &request, options.would_block_backoff(), || false).inspect_err(
        |err| {
            error!(%err, "Failed to send WebSocket handshake request");
        },
    )?;

    let (buffer, head_len) = read_response_head(transport, options)?;

    let response = Response::parse(&buffer[..head_len])?;

    if !response.is_switching_protocols() {
        error!(
            response = %String::from_utf8_lossy(&buffer[..head_len]),
            "WebSocket handshake failed"
        );

        return Err(Error::Handshake(HandshakeError::InvalidStatusCode {
            code: response.code(),
        }));
    }

    if options.strict_handshake() {
        verify_response(&response, sec_key)?;
    }

    debug!(leftover = buffer.len() - head_len, "WebSocket handshake successful");

    Ok(buffer[head_len..].to_vec())
}

fn verify_response(response: &Response<'_>, sec_key: &[u8]) -> Result<(), HandshakeError> {
    if !response
        .header_value_str("upgrade")
        .is_some_and(|v| v.eq_ignore_ascii_case("websocket"))
    {
        return Err(HandshakeError::MissingOrInvalidUpgrade);
    }

    if !response.header_has_token("connection", "upgrade") {
        return Err(HandshakeError::MissingOrInvalidConnection);
    }

    let sec_accept = generate_sec_accept(sec_key);

    if response
        .header_value("sec-websocket-accept")
        .is_none_or(|v| v != sec_accept)
    {
        return Err(HandshakeError::MissingOrInvalidAccept);
    }

    Ok(())
}

/// Reads until the blank line ending the response head.
///
/// Returns everything read so far and the length of the head within it.
fn read_response_head<T: Transport>(
    transport: &mut T,
    options: &Options,
) -> Result<(Vec<u8>, usize), Error<T::Error>> {
    let limit = options.max_handshake_response();

    let mut buffer = Vec::with_capacity(RESPONSE_CHUNK);
    let mut chunk = [0u8; RESPONSE_CHUNK];

    loop {
        if !transport.is_connected() {
            return Err(Error::Handshake(HandshakeError::ConnectionClosed));
        }

        match transport.receive(&mut chunk) {
            Ok(0) => return Err(Error::Handshake(HandshakeError::ConnectionClosed)),
            Ok(read) => {
                let searched = buffer.len();

                buffer.extend_from_slice(&chunk[..read]);

                if let Some(head_len) = http::find_head_end(&buffer, searched) {
                    return Ok((buffer, head_len));
                }

                if buffer.len() > limit {
                    return Err(Error::Handshake(HandshakeError::ResponseTooLarge { limit }));
                }
            }
            Err(TransportError::WouldBlock) => std::thread::sleep(options.would_block_backoff()),
            Err(err) => {
                error!(%err, "Failed to receive handshake response");

                return Err(Error::Transport(err));
            }
        }
    }
}
