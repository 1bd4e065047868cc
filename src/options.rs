use std::time::Duration;

/// Engine configuration.
///
/// Every setter returns the updated options, so a configuration reads as a chain of `with_*`
/// calls starting from [`Options::default`].
#[derive(Debug, Clone)]
pub struct Options {
    headers: Vec<(String, String)>,
    receive_buffer_size: usize,
    queue_capacity: usize,
    poll_interval: Duration,
    max_send_failures: usize,
    would_block_backoff: Duration,
    max_handshake_response: usize,
    max_message_size: usize,
    strict_handshake: bool,
    echo_close: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self::new()
    }
}

impl Options {
    /// Default receive buffer size in bytes.
    pub const DEFAULT_RECEIVE_BUFFER_SIZE: usize = 4096;
    /// Default number of queued frames.
    pub const DEFAULT_QUEUE_CAPACITY: usize = 60;
    /// Default I/O loop wait.
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(20);
    /// Default consecutive write failures before giving up.
    pub const DEFAULT_MAX_SEND_FAILURES: usize = 3;
    /// Default sleep between would-block retries.
    pub const DEFAULT_WOULD_BLOCK_BACKOFF: Duration = Duration::from_millis(3);
    /// Default limit for the handshake response head in bytes.
    pub const DEFAULT_MAX_HANDSHAKE_RESPONSE: usize = 8192;
    /// Default limit for a reassembled message in bytes.
    pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1024 * 1024;

    /// Options with every default applied and no extra headers.
    pub const fn new() -> Self {
        Self {
            headers: Vec::new(),
            receive_buffer_size: Self::DEFAULT_RECEIVE_BUFFER_SIZE,
            queue_capacity: Self::DEFAULT_QUEUE_CAPACITY,
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
            max_send_failures: Self::DEFAULT_MAX_SEND_FAILURES,
            would_block_backoff: Self::DEFAULT_WOULD_BLOCK_BACKOFF,
            max_handshake_response: Self::DEFAULT_MAX_HANDSHAKE_RESPONSE,
            max_message_size: Self::DEFAULT_MAX_MESSAGE_SIZE,
            strict_handshake: true,
            echo_close: false,
        }
    }

    /// Adds a request header, replacing any header with the same name (ignoring case).
    ///
    /// `Host` falls back to the URI's authority when not set here.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_header(name, value);
        self
    }

    pub(crate) fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();

        match self
            .headers
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(&name))
        {
            Some(header) => *header = (name, value),
            None => self.headers.push((name, value)),
        }
    }

    /// The value of header `name`, ignoring case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Extra request headers in insertion order.
    pub fn headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Capacity of the receive buffer. A single frame must fit in it.
    pub const fn with_receive_buffer_size(mut self, size: usize) -> Self {
        self.receive_buffer_size = if size < 2 { 2 } else { size };
        self
    }

    /// See [`Options::with_receive_buffer_size`].
    pub const fn receive_buffer_size(&self) -> usize {
        self.receive_buffer_size
    }

    /// Number of encoded frames held before the oldest is dropped.
    pub const fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = if capacity == 0 { 1 } else { capacity };
        self
    }

    /// See [`Options::with_queue_capacity`].
    pub const fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// Longest time the I/O loop waits for outgoing frames before polling the transport.
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// See [`Options::with_poll_interval`].
    pub const fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Consecutive failed frame writes that end the session.
    pub const fn with_max_send_failures(mut self, failures: usize) -> Self {
        self.max_send_failures = if failures == 0 { 1 } else { failures };
        self
    }

    /// See [`Options::with_max_send_failures`].
    pub const fn max_send_failures(&self) -> usize {
        self.max_send_failures
    }

    /// Sleep between retries of a write or handshake read that would block.
    pub const fn with_would_block_backoff(mut self, backoff: Duration) -> Self {
        self.would_block_backoff = backoff;
        self
    }

    /// See [`Options::with_would_block_backoff`].
    pub const fn would_block_backoff(&self) -> Duration {
        self.would_block_backoff
    }

    /// Largest handshake response head accepted, in bytes.
    pub const fn with_max_handshake_response(mut self, limit: usize) -> Self {
        self.max_handshake_response = limit;
        self
    }

    /// See [`Options::with_max_handshake_response`].
    pub const fn max_handshake_response(&self) -> usize {
        self.max_handshake_response
    }

    /// Largest reassembled message accepted from the peer.
    pub const fn with_max_message_size(mut self, limit: usize) -> Self {
        self.max_message_size = limit;
        self
    }

    /// See [`Options::with_max_message_size`].
    pub const fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    /// Also check `Upgrade`, `Connection` and `Sec-WebSocket-Accept`, not just the `101` status.
    pub const fn with_strict_handshake(mut self, strict: bool) -> Self {
        self.strict_handshake = strict;
        self
    }

    /// See [`Options::with_strict_handshake`].
    pub const fn strict_handshake(&self) -> bool {
        self.strict_handshake
    }

    /// Answer a received close frame with a close frame before tearing down the transport.
    pub const fn with_echo_close(mut self, echo: bool) -> Self {
        self.echo_close = echo;
        self
    }

    /// See [`Options::with_echo_close`].
    pub const fn echo_close(&self) -> bool {
        self.echo_close
    }
}
