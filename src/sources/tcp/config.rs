use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, bail, ensure};
use socket2::{SockRef, TcpKeepalive};
use tokio::net::TcpStream;

use crate::types::AnyResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpFamily {
    Any,
    V4,
    V6,
}

/// Listen address parsed from `scheme://rest`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenAddr {
    /// `tcp://`, `tcp4://`, `tcp6://` with a `host:port` authority.
    Tcp { host_port: String, family: IpFamily },
    /// `unix:///path/to/socket`
    Unix(PathBuf),
}

impl ListenAddr {
    pub fn parse(raw: &str) -> AnyResult<Self> {
        let (scheme, rest) = raw
            .split_once("://")
            .ok_or_else(|| anyhow!("invalid address '{}' (expect scheme://...)", raw))?;
        let family = match scheme.to_ascii_lowercase().as_str() {
            "tcp" => IpFamily::Any,
            "tcp4" => IpFamily::V4,
            "tcp6" => IpFamily::V6,
            "unix" => {
                ensure!(!rest.is_empty(), "unix address '{}' has no socket path", raw);
                return Ok(ListenAddr::Unix(PathBuf::from(rest)));
            }
            "udp" | "udp4" | "udp6" | "unixgram" => {
                bail!("datagram address '{}' is not supported (octet-counting needs a stream)", raw)
            }
            other => bail!("unsupported scheme '{}' in address '{}'", other, raw),
        };
        let (host, port) = rest
            .rsplit_once(':')
            .ok_or_else(|| anyhow!("address '{}' has no port", raw))?;
        port.parse::<u16>()
            .map_err(|_| anyhow!("invalid port '{}' in address '{}'", port, raw))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        ensure!(!host.is_empty(), "address '{}' has no host", raw);
        Ok(ListenAddr::Tcp {
            host_port: rest.to_string(),
            family,
        })
    }

    pub fn is_unix(&self) -> bool {
        matches!(self, ListenAddr::Unix(_))
    }
}

impl fmt::Display for ListenAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListenAddr::Tcp { host_port, family } => {
                let scheme = match family {
                    IpFamily::Any => "tcp",
                    IpFamily::V4 => "tcp4",
                    IpFamily::V6 => "tcp6",
                };
                write!(f, "{}://{}", scheme, host_port)
            }
            ListenAddr::Unix(path) => write!(f, "unix://{}", path.display()),
        }
    }
}

/// TCP keep-alive setting applied to every accepted TCP connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeepAlive {
    #[default]
    Disabled,
    /// Enabled with the operating system's probe timing.
    OsDefault,
    Period(Duration),
}

impl KeepAlive {
    /// absent = off, zero = OS default, positive = explicit period
    pub fn from_period(period: Option<Duration>) -> Self {
        match period {
            None => KeepAlive::Disabled,
            Some(d) if d.is_zero() => KeepAlive::OsDefault,
            Some(d) => KeepAlive::Period(d),
        }
    }

    pub fn apply(&self, stream: &TcpStream) -> io::Result<()> {
        let sock = SockRef::from(stream);
        match self {
            KeepAlive::Disabled => sock.set_keepalive(false),
            KeepAlive::OsDefault => sock.set_keepalive(true),
            KeepAlive::Period(period) => {
                let keepalive = TcpKeepalive::new().with_time(*period);
                #[cfg(any(target_os = "linux", target_os = "macos", target_os = "windows"))]
                let keepalive = keepalive.with_interval(*period);
                sock.set_tcp_keepalive(&keepalive)
            }
        }
    }
}
