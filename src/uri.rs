use crate::error::UriError;

/// A parsed `scheme://host[:port][/path]` endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Uri {
    scheme: String,
    host: String,
    port: u16,
    path: String,
}

impl Uri {
    /// Parses `uri`.
    ///
    /// A missing port defaults to 443 for `wss`/`https` and to 80 otherwise. A missing path
    /// defaults to `/`. Query strings stay part of the path.
    pub fn parse(uri: &str) -> Result<Self, UriError> {
        let (scheme, rest) = uri.split_once("://").ok_or(UriError::MissingScheme)?;

        if scheme.is_empty() {
            return Err(UriError::MissingScheme);
        }

        let (authority, path) = match rest.find(['/', '?']) {
            Some(index) => (&rest[..index], &rest[index..]),
            None => (rest, "/"),
        };

        let (host, port) = match authority.split_once(':') {
            Some((host, port)) => {
                let port = port.parse::<u16>().map_err(|_| UriError::InvalidPort)?;

                (host, port)
            }
            None => (authority, Self::default_port(scheme)),
        };

        if host.is_empty() {
            return Err(UriError::EmptyHost);
        }

        let path = match path.starts_with('?') {
            true => format!("/{path}"),
            false => path.to_owned(),
        };

        Ok(Self {
            scheme: scheme.to_owned(),
            host: host.to_owned(),
            port,
            path,
        })
    }

    fn default_port(scheme: &str) -> u16 {
        match Self::scheme_is_secure(scheme) {
            true => 443,
            false => 80,
        }
    }

    fn scheme_is_secure(scheme: &str) -> bool {
        scheme.eq_ignore_ascii_case("wss") || scheme.eq_ignore_ascii_case("https")
    }

    /// The scheme, as written.
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// The host without the port.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The explicit port or the scheme's default.
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// The path including any query, never empty.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// `wss` and `https`. TLS itself is up to the transport.
    pub fn is_secure(&self) -> bool {
        Self::scheme_is_secure(&self.scheme)
    }

    /// The `Host` header value: the host, plus the port when it is not the scheme's default.
    pub fn host_header(&self) -> String {
        match self.port == Self::default_port(&self.scheme) {
            true => self.host.clone(),
            false => format!("{}:{}", self.host, self.port),
        }
    }
}

impl core::fmt::Display for Uri {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}://{}:{}{}", self.scheme, self.host, self.port, self.path)
    }
}
