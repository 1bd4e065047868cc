use std::{
    collections::VecDeque,
    io,
    sync::{
        Arc, OnceLock, Weak,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use parking_lot::Mutex;
use rand::{SeedableRng, rngs::StdRng};

use crate::{
    CloseCode, CloseFrame, ConnectionState, Options, WebSocket,
    error::{Error, FrameEncodeError, HandshakeError, SendError, UriError},
    handshake::generate_sec_accept,
    transport::{Transport, TransportError},
};

// cSpell:disable
const STR_MESSAGES: &[&str] = &[
    "Hello, world!",
    "Lorem ipsum dolor sit amet, consectetur adipiscing elit.",
    "Sed ut perspiciatis unde omnis iste natus error sit voluptatem accusantium.",
];
// cSpell:enable

/// How the scripted peer answers the upgrade request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reply {
    Accept,
    BadAccept,
    Status(u16),
    Hangup,
}

#[derive(Debug)]
struct Wire {
    reply: Reply,
    /// Sent right after the response head.
    early: Vec<u8>,
    answered: bool,
    inbound: VecDeque<u8>,
    outbound: Vec<u8>,
    request_len: usize,
    connected: bool,
    connects: usize,
    target: Option<(String, u16)>,
    peer_closed: bool,
    fail_sends: bool,
    block_sends: bool,
    max_read: usize,
}

impl Default for Wire {
    fn default() -> Self {
        Self {
            reply: Reply::Accept,
            early: Vec::new(),
            answered: false,
            inbound: VecDeque::new(),
            outbound: Vec::new(),
            request_len: 0,
            connected: false,
            connects: 0,
            target: None,
            peer_closed: false,
            fail_sends: false,
            block_sends: false,
            max_read: usize::MAX,
        }
    }
}

impl Wire {
    fn answer(&mut self) {
        let Some(end) = self.outbound.windows(4).position(|w| w == b"\r\n\r\n") else {
            return;
        };

        self.answered = true;
        self.request_len = end + 4;

        let request = String::from_utf8_lossy(&self.outbound[..self.request_len]).into_owned();

        let key = request
            .lines()
            .find_map(|line| line.strip_prefix("Sec-WebSocket-Key: "))
            .unwrap_or_default()
            .to_owned();

        let response = match self.reply {
            Reply::Accept => format!(
                "HTTP/1.1 101 Switching Protocols\r\n\
                Upgrade: websocket\r\n\
                Connection: Upgrade\r\n\
                Sec-WebSocket-Accept: {}\r\n\
                \r\n",
                String::from_utf8_lossy(&generate_sec_accept(key.as_bytes()))
            ),
            Reply::BadAccept => "HTTP/1.1 101 Switching Protocols\r\n\
                Upgrade: websocket\r\n\
                Connection: Upgrade\r\n\
                Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n\
                \r\n"
                .to_owned(),
            Reply::Status(code) => format!("HTTP/1.1 {code} Nope\r\nContent-Length: 0\r\n\r\n"),
            Reply::Hangup => {
                self.peer_closed = true;

                return;
            }
        };

        self.inbound.extend(response.as_bytes());

        let early = core::mem::take(&mut self.early);
        self.inbound.extend(early);
    }
}

/// In-memory [`Transport`] answering the handshake by itself.
#[derive(Debug)]
struct Scripted(Arc<Mutex<Wire>>);

impl Transport for Scripted {
    type Error = io::Error;

    fn connect(&mut self, host: &str, port: u16) -> Result<(), TransportError<Self::Error>> {
        let mut wire = self.0.lock();

        wire.connected = true;
        wire.connects += 1;
        wire.target = Some((host.to_owned(), port));
        wire.answered = false;
        wire.peer_closed = false;
        wire.inbound.clear();
        wire.outbound.clear();
        wire.request_len = 0;

        Ok(())
    }

    fn send(&mut self, buf: &[u8]) -> Result<usize, TransportError<Self::Error>> {
        let mut wire = self.0.lock();

        if !wire.connected {
            return Err(TransportError::NotConnected);
        }

        if wire.fail_sends {
            return Err(TransportError::Other(io::Error::from(
                io::ErrorKind::BrokenPipe,
            )));
        }

        if wire.block_sends {
            return Err(TransportError::WouldBlock);
        }

        wire.outbound.extend_from_slice(buf);

        if !wire.answered {
            wire.answer();
        }

        Ok(buf.len())
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, TransportError<Self::Error>> {
        let mut wire = self.0.lock();

        if !wire.connected {
            return Err(TransportError::NotConnected);
        }

        if wire.inbound.is_empty() {
            return match wire.peer_closed {
                true => Ok(0),
                false => Err(TransportError::WouldBlock),
            };
        }

        let read = buf.len().min(wire.max_read).min(wire.inbound.len());

        for (dst, src) in buf.iter_mut().zip(wire.inbound.drain(..read)) {
            *dst = src;
        }

        Ok(read)
    }

    fn disconnect(&mut self) {
        self.0.lock().connected = false;
    }

    fn is_connected(&self) -> bool {
        self.0.lock().connected
    }
}

/// The test's side of a [`Scripted`] transport.
#[derive(Debug, Clone)]
struct Peer(Arc<Mutex<Wire>>);

impl Peer {
    fn push(&self, bytes: &[u8]) {
        self.0.lock().inbound.extend(bytes);
    }

    fn hang_up(&self) {
        self.0.lock().peer_closed = true;
    }

    fn with<T>(&self, f: impl FnOnce(&mut Wire) -> T) -> T {
        f(&mut self.0.lock())
    }

    fn request(&self) -> String {
        let wire = self.0.lock();

        String::from_utf8_lossy(&wire.outbound[..wire.request_len]).into_owned()
    }

    fn is_connected(&self) -> bool {
        self.0.lock().connected
    }

    /// Unmasks every frame the client wrote after the handshake.
    fn client_frames(&self) -> Vec<(u8, bool, Vec<u8>)> {
        let wire = self.0.lock();
        let mut bytes = &wire.outbound[wire.request_len..];
        let mut frames = Vec::new();

        while !bytes.is_empty() {
            let fin = bytes[0] & 0x80 != 0;
            let opcode = bytes[0] & 0x0F;

            assert!(bytes[1] & 0x80 != 0, "client frames must be masked");

            let (len, offset) = match bytes[1] & 0x7F {
                126 => (u16::from_be_bytes([bytes[2], bytes[3]]) as usize, 4),
                127 => panic!("client never sends 64 bit lengths"),
                len => (len as usize, 2),
            };

            let mask = [
                bytes[offset],
                bytes[offset + 1],
                bytes[offset + 2],
                bytes[offset + 3],
            ];

            let payload = bytes[offset + 4..offset + 4 + len]
                .iter()
                .enumerate()
                .map(|(i, byte)| byte ^ mask[i % 4])
                .collect();

            frames.push((opcode, fin, payload));

            bytes = &bytes[offset + 4 + len..];
        }

        frames
    }
}

fn scripted() -> (Scripted, Peer) {
    let wire = Arc::new(Mutex::new(Wire::default()));

    (Scripted(wire.clone()), Peer(wire))
}

/// Unmasked frame as a server writes it.
fn server_frame(fin: bool, opcode: u8, payload: &[u8]) -> Vec<u8> {
    let mut frame = vec![((fin as u8) << 7) | opcode];

    match payload.len() {
        len if len < 126 => frame.push(len as u8),
        len => {
            frame.push(126);
            frame.extend_from_slice(&(len as u16).to_be_bytes());
        }
    }

    frame.extend_from_slice(payload);

    frame
}

fn options() -> Options {
    Options::default()
        .with_poll_interval(Duration::from_millis(5))
        .with_would_block_backoff(Duration::from_millis(1))
}

fn eventually(condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);

    while Instant::now() < deadline {
        if condition() {
            return true;
        }

        thread::sleep(Duration::from_millis(2));
    }

    condition()
}

#[derive(Debug, Default)]
struct Recorder {
    connected: AtomicUsize,
    disconnected: AtomicUsize,
    messages: Mutex<Vec<(bool, Vec<u8>)>>,
    errors: Mutex<Vec<(CloseCode, String)>>,
}

impl Recorder {
    fn messages(&self) -> Vec<(bool, Vec<u8>)> {
        self.messages.lock().clone()
    }

    fn errors(&self) -> Vec<(CloseCode, String)> {
        self.errors.lock().clone()
    }

    fn disconnected(&self) -> usize {
        self.disconnected.load(Ordering::SeqCst)
    }

    fn connected(&self) -> usize {
        self.connected.load(Ordering::SeqCst)
    }
}

fn client(options: Options) -> (WebSocket<Scripted>, Peer, Arc<Recorder>) {
    let (transport, peer) = scripted();
    let recorder = Arc::new(Recorder::default());

    let mut websocket = WebSocket::with_rng(options, transport, StdRng::seed_from_u64(42));

    {
        let recorder = recorder.clone();
        websocket.on_connected(move || {
            recorder.connected.fetch_add(1, Ordering::SeqCst);
        });
    }
    {
        let recorder = recorder.clone();
        websocket.on_disconnected(move || {
            recorder.disconnected.fetch_add(1, Ordering::SeqCst);
        });
    }
    {
        let recorder = recorder.clone();
        websocket.on_data(move |message| {
            recorder
                .messages
                .lock()
                .push((message.is_binary(), message.payload().to_vec()));
        });
    }
    {
        let recorder = recorder.clone();
        websocket.on_error(move |err| {
            recorder
                .errors
                .lock()
                .push((err.close_code(), err.to_string()));
        });
    }

    (websocket, peer, recorder)
}

fn connected(options: Options) -> (WebSocket<Scripted>, Peer, Arc<Recorder>) {
    let (websocket, peer, recorder) = client(options);

    websocket
        .connect("ws://example.com/ws")
        .expect("Handshake failed");

    (websocket, peer, recorder)
}

mod handshake {
    use super::*;

    #[test]
    fn sends_upgrade_request() {
        let (mut websocket, peer, recorder) = client(options());

        websocket.set_header("Client-Id", "7");

        websocket
            .connect("ws://example.com:8080/chat?room=1")
            .expect("Handshake failed");

        let request = peer.request();

        assert!(request.starts_with("GET /chat?room=1 HTTP/1.1\r\n"));
        assert!(request.contains("Host: example.com:8080\r\n"));
        assert!(request.contains("Upgrade: websocket\r\n"));
        assert!(request.contains("Connection: Upgrade\r\n"));
        assert!(request.contains("Sec-WebSocket-Version: 13\r\n"));
        assert!(request.contains("Sec-WebSocket-Key: "));
        assert!(request.contains("Client-Id: 7\r\n"));
        assert!(request.ends_with("\r\n\r\n"));

        assert_eq!(
            peer.with(|wire| wire.target.clone()),
            Some(("example.com".to_owned(), 8080))
        );
        assert_eq!(websocket.state(), ConnectionState::Open);
        assert!(websocket.is_connected());
        assert!(eventually(|| recorder.connected() == 1));

        websocket.disconnect();

        assert_eq!(websocket.state(), ConnectionState::Disconnected);
        assert_eq!(recorder.disconnected(), 1);
        assert!(!peer.is_connected());
    }

    #[test]
    fn invalid_uri_is_rejected_before_connecting() {
        let (websocket, peer, _) = client(options());

        assert!(matches!(
            websocket.connect("example.com/ws"),
            Err(Error::InvalidUri(UriError::MissingScheme))
        ));
        assert_eq!(websocket.state(), ConnectionState::Disconnected);
        assert_eq!(peer.with(|wire| wire.connects), 0);
    }

    #[test]
    fn non_101_status_fails_and_allows_retry() {
        let (websocket, peer, recorder) = client(options());

        peer.with(|wire| wire.reply = Reply::Status(403));

        assert!(matches!(
            websocket.connect("ws://example.com/ws"),
            Err(Error::Handshake(HandshakeError::InvalidStatusCode {
                code: Some(403)
            }))
        ));
        assert_eq!(websocket.state(), ConnectionState::Disconnected);
        assert!(!peer.is_connected());
        assert_eq!(recorder.connected(), 0);

        peer.with(|wire| wire.reply = Reply::Accept);

        websocket
            .connect("ws://example.com/ws")
            .expect("Handshake failed");

        assert_eq!(peer.with(|wire| wire.connects), 2);
        assert!(websocket.is_connected());
    }

    #[test]
    fn peer_hanging_up_during_handshake() {
        let (websocket, peer, _) = client(options());

        peer.with(|wire| wire.reply = Reply::Hangup);

        assert!(matches!(
            websocket.connect("ws://example.com/ws"),
            Err(Error::Handshake(HandshakeError::ConnectionClosed))
        ));
        assert_eq!(websocket.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn wrong_accept_key() {
        let (websocket, peer, _) = client(options());

        peer.with(|wire| wire.reply = Reply::BadAccept);

        assert!(matches!(
            websocket.connect("ws://example.com/ws"),
            Err(Error::Handshake(HandshakeError::MissingOrInvalidAccept))
        ));

        let (websocket, peer, _) = client(options().with_strict_handshake(false));

        peer.with(|wire| wire.reply = Reply::BadAccept);

        assert!(websocket.connect("ws://example.com/ws").is_ok());
    }

    #[test]
    fn bytes_after_the_response_head_are_processed() {
        let (websocket, peer, recorder) = client(options());

        peer.with(|wire| wire.early = server_frame(true, 0x1, b"early"));

        websocket
            .connect("ws://example.com/ws")
            .expect("Handshake failed");

        assert!(eventually(|| recorder.messages() == [(false, b"early".to_vec())]));
    }

    #[test]
    fn early_bytes_larger_than_the_receive_buffer_are_processed() {
        let (websocket, peer, recorder) = client(options().with_receive_buffer_size(32));

        let early: Vec<u8> = (b'a'..=b'd')
            .flat_map(|byte| server_frame(true, 0x2, &[byte; 10]))
            .collect();

        peer.with(|wire| wire.early = early);

        websocket
            .connect("ws://example.com/ws")
            .expect("Handshake failed");

        let expected: Vec<_> = (b'a'..=b'd').map(|byte| (true, vec![byte; 10])).collect();

        assert!(eventually(|| recorder.messages() == expected));
        assert!(recorder.errors().is_empty());
        assert!(websocket.is_connected());
    }

    #[test]
    fn connect_twice_is_rejected() {
        let (websocket, _peer, _) = connected(options());

        assert!(matches!(
            websocket.connect("ws://example.com/ws"),
            Err(Error::AlreadyConnected)
        ));
        assert!(websocket.is_connected());
    }
}

mod receive {
    use super::*;

    #[test]
    fn fragmented_message_is_delivered_once() {
        let (_websocket, peer, recorder) = connected(options());

        peer.push(&server_frame(false, 0x1, b"A"));
        peer.push(&server_frame(false, 0x0, b"B"));
        peer.push(&server_frame(true, 0x0, b"C"));

        assert!(eventually(|| !recorder.messages().is_empty()));

        thread::sleep(Duration::from_millis(20));

        assert_eq!(recorder.messages(), [(false, b"ABC".to_vec())]);
        assert!(recorder.errors().is_empty());
    }

    #[test]
    fn frames_split_across_reads() {
        let (_websocket, peer, recorder) = connected(options());

        peer.with(|wire| wire.max_read = 3);

        for message in STR_MESSAGES {
            peer.push(&server_frame(true, 0x1, message.as_bytes()));
        }

        peer.push(&server_frame(true, 0x2, &[0xAB; 300]));

        assert!(eventually(|| recorder.messages().len() == STR_MESSAGES.len() + 1));

        let messages = recorder.messages();

        for (received, expected) in messages.iter().zip(STR_MESSAGES) {
            assert_eq!(received, &(false, expected.as_bytes().to_vec()));
        }

        assert_eq!(messages[STR_MESSAGES.len()], (true, vec![0xAB; 300]));
    }

    #[test]
    fn masked_server_frame_ends_the_session() {
        let (websocket, peer, recorder) = connected(options());

        peer.push(&[0x81, 0x82, 1, 2, 3, 4, b'h' ^ 1, b'i' ^ 2]);

        assert!(eventually(|| recorder.disconnected() == 1));

        let errors = recorder.errors();

        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0, CloseCode::Protocol);
        assert!(errors[0].1.contains("masked"));
        assert!(recorder.messages().is_empty());
        assert!(!peer.is_connected());
        assert_eq!(websocket.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn continuation_without_a_message_is_a_protocol_error() {
        let (_websocket, peer, recorder) = connected(options());

        peer.push(&server_frame(true, 0x0, b"orphan"));

        assert!(eventually(|| recorder.disconnected() == 1));
        assert_eq!(recorder.errors()[0].0, CloseCode::Protocol);
    }

    #[test]
    fn ping_is_answered_with_one_pong() {
        let (_websocket, peer, recorder) = connected(options());

        peer.push(&server_frame(true, 0x9, b"hi"));

        assert!(eventually(|| !peer.client_frames().is_empty()));

        thread::sleep(Duration::from_millis(20));

        assert_eq!(peer.client_frames(), [(0xA, true, b"hi".to_vec())]);
        assert!(recorder.messages().is_empty());
    }

    #[test]
    fn unknown_opcode_is_ignored() {
        let (_websocket, peer, recorder) = connected(options());

        peer.push(&server_frame(true, 0x3, b"??"));
        peer.push(&server_frame(true, 0x1, b"ok"));

        assert!(eventually(|| !recorder.messages().is_empty()));

        assert_eq!(recorder.messages(), [(false, b"ok".to_vec())]);
        assert!(recorder.errors().is_empty());
        assert_eq!(recorder.disconnected(), 0);
    }

    #[test]
    fn frame_larger_than_receive_buffer_overflows() {
        let (_websocket, peer, recorder) =
            connected(options().with_receive_buffer_size(64));

        peer.push(&server_frame(true, 0x2, &[0; 200]));

        assert!(eventually(|| recorder.disconnected() == 1));

        let errors = recorder.errors();

        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0, CloseCode::Size);
        assert!(recorder.messages().is_empty());
    }

    #[test]
    fn peer_closing_the_stream_is_not_an_error() {
        let (websocket, peer, recorder) = connected(options());

        peer.hang_up();

        assert!(eventually(|| recorder.disconnected() == 1));
        assert!(recorder.errors().is_empty());
        assert_eq!(websocket.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn close_frame_ends_the_session() {
        let (_websocket, peer, recorder) = connected(options());

        peer.push(&server_frame(true, 0x8, &[0x03, 0xE8, b'b', b'y', b'e']));

        assert!(eventually(|| recorder.disconnected() == 1));
        assert!(recorder.errors().is_empty());
        assert!(peer.client_frames().is_empty());
        assert!(!peer.is_connected());
    }

    #[test]
    fn close_frame_is_echoed_when_enabled() {
        let (_websocket, peer, recorder) = connected(options().with_echo_close(true));

        peer.push(&server_frame(true, 0x8, &[0x03, 0xE8, b'b', b'y', b'e']));

        assert!(eventually(|| recorder.disconnected() == 1));
        assert_eq!(peer.client_frames(), [(0x8, true, vec![0x03, 0xE8])]);
    }
}

mod send {
    use super::*;

    #[test]
    fn rejected_while_disconnected() {
        let (websocket, _peer, _) = client(options());

        assert_eq!(websocket.send_text("x"), Err(SendError::NotConnected));
        assert_eq!(websocket.ping(), Err(SendError::NotConnected));
        assert_eq!(websocket.close(), Err(SendError::NotConnected));
    }

    #[test]
    fn oversized_payloads_are_rejected() {
        let (websocket, peer, _) = connected(options());

        assert_eq!(
            websocket.send(&vec![0; 65536], true, true),
            Err(SendError::Encode(FrameEncodeError::PayloadTooLarge { len: 65536 }))
        );
        assert_eq!(
            websocket.ping_with(&[0; 126]),
            Err(SendError::Encode(
                FrameEncodeError::ControlPayloadTooLarge { len: 126 }
            ))
        );

        assert!(websocket.send(&vec![7; 65535], true, true).is_ok());
        assert!(eventually(|| peer.client_frames().len() == 1));
        assert_eq!(peer.client_frames()[0].2.len(), 65535);
        assert!(websocket.is_connected());
    }

    #[test]
    fn messages_are_written_in_order() {
        let (websocket, peer, _) = connected(options());

        for message in STR_MESSAGES {
            websocket.send_text(message).unwrap();
        }

        websocket.send_binary(b"\x00\x01").unwrap();

        assert!(eventually(|| peer.client_frames().len() == STR_MESSAGES.len() + 1));

        let frames = peer.client_frames();

        for (frame, expected) in frames.iter().zip(STR_MESSAGES) {
            assert_eq!(frame, &(0x1, true, expected.as_bytes().to_vec()));
        }

        assert_eq!(frames[STR_MESSAGES.len()], (0x2, true, vec![0, 1]));
    }

    #[test]
    fn fragments_use_continuation_opcodes() {
        let (websocket, peer, _) = connected(options());

        websocket.send(b"a", false, false).unwrap();
        websocket.send(b"b", true, false).unwrap();
        websocket.send(b"c", false, true).unwrap();
        websocket.send_binary(b"d").unwrap();

        assert!(eventually(|| peer.client_frames().len() == 4));

        assert_eq!(
            peer.client_frames(),
            [
                (0x1, false, b"a".to_vec()),
                (0x0, false, b"b".to_vec()),
                (0x0, true, b"c".to_vec()),
                (0x2, true, b"d".to_vec()),
            ]
        );
    }

    #[test]
    fn close_moves_to_closing() {
        let (websocket, peer, _) = connected(options());

        websocket
            .close_with(CloseFrame::new(CloseCode::Normal, "bye"))
            .unwrap();

        assert_eq!(websocket.state(), ConnectionState::Closing);
        assert_eq!(websocket.send_text("late"), Err(SendError::NotConnected));
        assert_eq!(websocket.close(), Err(SendError::NotConnected));

        assert!(eventually(|| peer.client_frames().len() == 1));
        assert_eq!(
            peer.client_frames(),
            [(0x8, true, vec![0x03, 0xE8, b'b', b'y', b'e'])]
        );
    }

    #[test]
    fn consecutive_send_failures_end_the_session() {
        let (websocket, peer, recorder) = connected(options());

        peer.with(|wire| wire.fail_sends = true);

        for _ in 0..3 {
            websocket.send_text("x").unwrap();
        }

        assert!(eventually(|| recorder.disconnected() == 1));

        let errors = recorder.errors();

        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0, CloseCode::Abnormal);
        assert!(errors[0].1.contains("3 consecutive"));
        assert_eq!(websocket.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn full_queue_drops_oldest_frames() {
        let (websocket, peer, _) = connected(options().with_queue_capacity(4));

        peer.with(|wire| wire.block_sends = true);

        // Taken by the I/O thread, which then waits on the blocked transport.
        websocket.send_text("first").unwrap();
        assert!(eventually(|| websocket.queued_frames() == 0));

        for i in 0..10 {
            websocket.send_text(&i.to_string()).unwrap();
        }

        assert_eq!(websocket.queued_frames(), 4);

        let started = Instant::now();
        websocket.disconnect();

        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(websocket.queued_frames(), 0);
    }
}

mod lifecycle {
    use crate::mock::Noop;

    use super::*;

    #[test]
    fn idle_client_reports_disconnected() {
        let websocket = WebSocket::with_rng(Options::default(), Noop::default(), Noop::default());

        assert_eq!(websocket.state(), ConnectionState::Disconnected);
        assert!(!websocket.is_connected());
        assert_eq!(websocket.queued_frames(), 0);
        assert_eq!(websocket.send_binary(b"x"), Err(SendError::NotConnected));
        assert!(format!("{websocket:?}").contains("Disconnected"));

        websocket.disconnect();

        assert_eq!(websocket.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn reconnect_after_peer_went_away() {
        let (websocket, peer, recorder) = connected(options());

        peer.hang_up();

        assert!(eventually(|| recorder.disconnected() == 1));
        assert!(!websocket.is_connected());

        websocket
            .connect("ws://example.com/ws")
            .expect("Reconnect failed");

        assert!(eventually(|| recorder.connected() == 2));

        websocket.send_text("again").unwrap();

        assert!(eventually(|| peer.client_frames() == [(0x1, true, b"again".to_vec())]));
        assert_eq!(peer.with(|wire| wire.connects), 2);
    }

    #[test]
    fn disconnect_is_idempotent() {
        let (websocket, _peer, recorder) = connected(options());

        websocket.disconnect();
        websocket.disconnect();

        assert_eq!(recorder.disconnected(), 1);
        assert_eq!(websocket.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn disconnect_while_many_threads_send() {
        let (websocket, _peer, recorder) = connected(options());
        let websocket = Arc::new(websocket);

        let senders: Vec<_> = (0..4)
            .map(|_| {
                let websocket = websocket.clone();

                thread::spawn(move || {
                    let mut sent = 0usize;

                    while websocket.send_text("payload").is_ok() {
                        sent += 1;
                    }

                    sent
                })
            })
            .collect();

        thread::sleep(Duration::from_millis(30));

        let started = Instant::now();
        websocket.disconnect();

        assert!(started.elapsed() < Duration::from_secs(1));

        for sender in senders {
            sender.join().unwrap();
        }

        assert_eq!(recorder.disconnected(), 1);
        assert_eq!(websocket.state(), ConnectionState::Disconnected);
        assert_eq!(websocket.send_text("late"), Err(SendError::NotConnected));
    }

    #[test]
    fn disconnect_from_a_callback() {
        let (transport, peer) = scripted();
        let disconnected = Arc::new(AtomicUsize::new(0));
        let slot: Arc<OnceLock<Weak<WebSocket<Scripted>>>> = Arc::new(OnceLock::new());

        let mut websocket =
            WebSocket::with_rng(options(), transport, StdRng::seed_from_u64(1));

        {
            let slot = slot.clone();
            websocket.on_data(move |_| {
                if let Some(websocket) = slot.get().and_then(Weak::upgrade) {
                    websocket.disconnect();
                }
            });
        }
        {
            let disconnected = disconnected.clone();
            websocket.on_disconnected(move || {
                disconnected.fetch_add(1, Ordering::SeqCst);
            });
        }

        let websocket = Arc::new(websocket);
        slot.set(Arc::downgrade(&websocket)).unwrap();

        websocket.connect("ws://example.com/ws").unwrap();

        peer.push(&server_frame(true, 0x1, b"stop"));

        assert!(eventually(|| disconnected.load(Ordering::SeqCst) == 1));
        assert_eq!(websocket.state(), ConnectionState::Disconnected);

        // The transport is back and a new session can start.
        websocket.disconnect();
        websocket.connect("ws://example.com/ws").unwrap();
        assert!(websocket.is_connected());
    }
}

mod tcp {
    //! Against a `fastwebsockets` server over real sockets.

    use std::net::SocketAddr;

    use bytes::Bytes;
    use fastwebsockets::{FragmentCollector, Frame, OpCode, Payload, WebSocketError};
    use http_body_util::Empty;
    use hyper::{Request, Response, StatusCode, body::Incoming, service::service_fn};
    use hyper_util::rt::TokioIo;

    use crate::TcpTransport;

    use super::*;

    async fn serve(mut req: Request<Incoming>) -> Result<Response<Empty<Bytes>>, WebSocketError> {
        if req.uri().path() == "/reject" {
            return Ok(Response::builder()
                .status(StatusCode::BAD_REQUEST)
                .body(Empty::new())
                .unwrap());
        }

        let (response, fut) = fastwebsockets::upgrade::upgrade(&mut req)?;

        tokio::spawn(async move {
            let mut ws = FragmentCollector::new(fut.await.unwrap());

            loop {
                let Ok(frame) = ws.read_frame().await else {
                    break;
                };

                let opcode = frame.opcode;
                let payload = frame.payload.to_vec();

                match opcode {
                    OpCode::Text | OpCode::Binary => {
                        ws.write_frame(Frame::new(true, opcode, None, Payload::Owned(payload)))
                            .await
                            .unwrap();
                    }
                    OpCode::Close => break,
                    _ => {}
                }
            }
        });

        Ok(response)
    }

    /// Starts an echo server on its own runtime thread.
    fn echo_server() -> SocketAddr {
        let (tx, rx) = std::sync::mpsc::channel();

        thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(2)
                .enable_all()
                .build()
                .unwrap();

            runtime.block_on(async move {
                let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();

                tx.send(listener.local_addr().unwrap()).unwrap();

                loop {
                    let (stream, _) = listener.accept().await.unwrap();

                    tokio::spawn(async move {
                        let _ = hyper::server::conn::http1::Builder::new()
                            .serve_connection(TokioIo::new(stream), service_fn(serve))
                            .with_upgrades()
                            .await;
                    });
                }
            });
        });

        rx.recv().unwrap()
    }

    fn tcp_client() -> (WebSocket<TcpTransport>, Arc<Recorder>) {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        let recorder = Arc::new(Recorder::default());
        let transport = TcpTransport::new().with_connect_timeout(Duration::from_secs(5));

        let mut websocket = WebSocket::with_options(options(), transport);

        {
            let recorder = recorder.clone();
            websocket.on_data(move |message| {
                recorder
                    .messages
                    .lock()
                    .push((message.is_binary(), message.payload().to_vec()));
            });
        }
        {
            let recorder = recorder.clone();
            websocket.on_disconnected(move || {
                recorder.disconnected.fetch_add(1, Ordering::SeqCst);
            });
        }
        {
            let recorder = recorder.clone();
            websocket.on_error(move |err| {
                recorder
                    .errors
                    .lock()
                    .push((err.close_code(), err.to_string()));
            });
        }

        (websocket, recorder)
    }

    #[test]
    fn echo() {
        let addr = echo_server();
        let (websocket, recorder) = tcp_client();

        websocket
            .connect(&format!("ws://{addr}/echo"))
            .expect("Handshake failed");

        for message in STR_MESSAGES {
            websocket.send_text(message).unwrap();
        }

        websocket.send(b"Hello, ", false, false).unwrap();
        websocket.send(b"fragmented ", false, false).unwrap();
        websocket.send(b"world!", false, true).unwrap();

        websocket.send_binary(&[0xFF; 1000]).unwrap();
        websocket.ping_with(b"alive").unwrap();

        assert!(eventually(|| recorder.messages().len() == STR_MESSAGES.len() + 2));

        let messages = recorder.messages();

        for (received, expected) in messages.iter().zip(STR_MESSAGES) {
            assert_eq!(received, &(false, expected.as_bytes().to_vec()));
        }

        assert_eq!(
            messages[STR_MESSAGES.len()],
            (false, b"Hello, fragmented world!".to_vec())
        );
        assert_eq!(messages[STR_MESSAGES.len() + 1], (true, vec![0xFF; 1000]));

        websocket.close().unwrap();

        assert!(eventually(|| recorder.disconnected() == 1));
        assert!(recorder.errors().is_empty());
        assert_eq!(websocket.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn rejected_upgrade() {
        let addr = echo_server();
        let (websocket, _) = tcp_client();

        assert!(matches!(
            websocket.connect(&format!("ws://{addr}/reject")),
            Err(Error::Handshake(HandshakeError::InvalidStatusCode {
                code: Some(400)
            }))
        ));
        assert_eq!(websocket.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn connection_refused() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let (websocket, _) = tcp_client();

        assert!(matches!(
            websocket.connect(&format!("ws://{addr}/")),
            Err(Error::Transport(TransportError::Other(_)))
        ));
        assert_eq!(websocket.state(), ConnectionState::Disconnected);
    }
}
