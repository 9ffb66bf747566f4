//! Stream listeners: TCP (v4/v6) and Unix domain sockets behind one type.

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow, bail};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
#[cfg(unix)]
use tokio::net::UnixListener;

use super::config::{IpFamily, KeepAlive, ListenAddr};
use crate::types::AnyResult;

/// Any bidirectional byte stream a worker can own.
pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> AsyncStream for T {}

pub type BoxedStream = Box<dyn AsyncStream>;

/// Address a listener actually bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoundAddr {
    Tcp(SocketAddr),
    Unix(PathBuf),
}

impl BoundAddr {
    pub fn as_socket_addr(&self) -> Option<SocketAddr> {
        match self {
            BoundAddr::Tcp(addr) => Some(*addr),
            BoundAddr::Unix(_) => None,
        }
    }

    pub fn as_path(&self) -> Option<&Path> {
        match self {
            BoundAddr::Tcp(_) => None,
            BoundAddr::Unix(path) => Some(path),
        }
    }
}

impl fmt::Display for BoundAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoundAddr::Tcp(addr) => write!(f, "tcp://{}", addr),
            BoundAddr::Unix(path) => write!(f, "unix://{}", path.display()),
        }
    }
}

pub enum TransportListener {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix { listener: UnixListener, path: PathBuf },
}

impl TransportListener {
    pub async fn bind(addr: &ListenAddr) -> AnyResult<Self> {
        match addr {
            ListenAddr::Tcp { host_port, family } => {
                let target = resolve(host_port, *family).await?;
                let listener = TcpListener::bind(target)
                    .await
                    .with_context(|| format!("failed to bind TCP socket to {}", target))?;
                Ok(TransportListener::Tcp(listener))
            }
            #[cfg(unix)]
            ListenAddr::Unix(path) => {
                remove_stale_socket(path)?;
                let listener = UnixListener::bind(path).with_context(|| {
                    format!("failed to bind unix socket to {}", path.display())
                })?;
                Ok(TransportListener::Unix {
                    listener,
                    path: path.clone(),
                })
            }
            #[cfg(not(unix))]
            ListenAddr::Unix(path) => bail!(
                "unix socket {} is not supported on this platform",
                path.display()
            ),
        }
    }

    pub fn local_addr(&self) -> io::Result<BoundAddr> {
        match self {
            TransportListener::Tcp(listener) => listener.local_addr().map(BoundAddr::Tcp),
            #[cfg(unix)]
            TransportListener::Unix { path, .. } => Ok(BoundAddr::Unix(path.clone())),
        }
    }

    /// Accept one connection; returns the stream and a printable peer name.
    pub async fn accept(&self, keep_alive: KeepAlive) -> io::Result<(BoxedStream, String)> {
        match self {
            TransportListener::Tcp(listener) => {
                let (stream, peer) = listener.accept().await?;
                if let Err(e) = keep_alive.apply(&stream) {
                    warn_data!("set keep-alive {:?} on {} failed: {}", keep_alive, peer, e);
                }
                Ok((Box::new(stream), peer.to_string()))
            }
            #[cfg(unix)]
            TransportListener::Unix { listener, path } => {
                let (stream, _) = listener.accept().await?;
                Ok((Box::new(stream), format!("unix://{}", path.display())))
            }
        }
    }

    /// Remove the socket file of a Unix listener; no-op for TCP.
    pub fn cleanup(&self) {
        match self {
            TransportListener::Tcp(_) => {}
            #[cfg(unix)]
            TransportListener::Unix { path, .. } => match std::fs::remove_file(path) {
                Err(e) if e.kind() != io::ErrorKind::NotFound => {
                    warn_ctrl!("remove unix socket {} failed: {}", path.display(), e);
                }
                _ => {}
            },
        }
    }
}

async fn resolve(host_port: &str, family: IpFamily) -> AnyResult<SocketAddr> {
    let mut candidates = tokio::net::lookup_host(host_port)
        .await
        .with_context(|| format!("failed to resolve {}", host_port))?;
    candidates
        .find(|addr| match family {
            IpFamily::Any => true,
            IpFamily::V4 => addr.is_ipv4(),
            IpFamily::V6 => addr.is_ipv6(),
        })
        .ok_or_else(|| anyhow!("{} has no {:?} address", host_port, family))
}

// 上次运行残留的 socket 文件
#[cfg(unix)]
fn remove_stale_socket(path: &Path) -> AnyResult<()> {
    use std::os::unix::fs::FileTypeExt;

    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_socket() => std::fs::remove_file(path)
            .with_context(|| format!("failed to remove stale socket {}", path.display())),
        Ok(_) => bail!("{} exists and is not a socket", path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("failed to inspect {}", path.display())),
    }
}
