//! SFTP session over ssh2.
//!
//! libssh2 is blocking, so every operation runs on tokio's blocking pool.
//! The connection is established in the background; [`ready`] resolves
//! once the handshake and authentication have finished.
//!
//! [`ready`]: crate::RemoteSession::ready

use std::io::{Seek, SeekFrom, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use ssh2::{CheckResult, FileStat, KnownHostFileKind, OpenFlags, OpenType, Session};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::{RemoteError, RemoteFile, RemoteFuture, RemoteSession, RemoteStat};

/// Connection parameters for [`SftpSession`].
#[derive(Debug, Clone)]
pub struct SftpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    /// Private key tried after the ssh-agent. Defaults to `~/.ssh/id_ed25519`
    /// or `~/.ssh/id_rsa`, whichever exists.
    pub identity: Option<PathBuf>,
    /// Defaults to `~/.ssh/known_hosts`.
    pub known_hosts: Option<PathBuf>,
    /// Skips host key verification.
    pub insecure: bool,
    pub connect_timeout: Duration,
}

#[derive(Clone)]
enum LinkState {
    Connecting,
    Up(Arc<Link>),
    Down(String),
}

struct Link {
    // Keeps the transport alive for as long as the SFTP channel is used.
    _session: Session,
    sftp: ssh2::Sftp,
}

/// A [`RemoteSession`] speaking SFTP.
pub struct SftpSession {
    state: watch::Sender<LinkState>,
}

impl SftpSession {
    /// Starts connecting in the background and returns immediately.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(config: SftpConfig) -> Self {
        let (state, _) = watch::channel(LinkState::Connecting);
        let tx = state.clone();

        tokio::task::spawn_blocking(move || {
            let next = match establish(&config) {
                Ok(link) => {
                    info!(host = %config.host, port = config.port, "sftp session ready");
                    LinkState::Up(Arc::new(link))
                }
                Err(e) => {
                    warn!(host = %config.host, port = config.port, error = %e, "sftp connection failed");
                    LinkState::Down(e)
                }
            };
            tx.send_replace(next);
        });

        Self { state }
    }

    fn link(&self) -> Result<Arc<Link>, RemoteError> {
        match &*self.state.borrow() {
            LinkState::Up(link) => Ok(Arc::clone(link)),
            LinkState::Down(e) => Err(RemoteError::Connect(e.clone())),
            LinkState::Connecting => Err(RemoteError::Connect("not connected yet".into())),
        }
    }

    async fn run<T, F>(&self, path: &str, op: F) -> Result<T, RemoteError>
    where
        T: Send + 'static,
        F: FnOnce(&ssh2::Sftp) -> Result<T, ssh2::Error> + Send + 'static,
    {
        let link = self.link()?;
        tokio::task::spawn_blocking(move || op(&link.sftp))
            .await
            .map_err(|e| RemoteError::Protocol(format!("blocking task failed: {e}")))?
            .map_err(|e| RemoteError::io(path, e.into()))
    }
}

impl RemoteSession for SftpSession {
    fn ready(&self) -> RemoteFuture<'_, ()> {
        Box::pin(async move {
            let mut rx = self.state.subscribe();
            let state = rx
                .wait_for(|s| !matches!(s, LinkState::Connecting))
                .await
                .map_err(|_| RemoteError::SessionClosed)?
                .clone();
            match state {
                LinkState::Up(_) => Ok(()),
                LinkState::Down(e) => Err(RemoteError::Connect(e)),
                LinkState::Connecting => Err(RemoteError::SessionClosed),
            }
        })
    }

    fn canonicalize<'a>(&'a self, path: &'a str) -> RemoteFuture<'a, String> {
        Box::pin(async move {
            let target = PathBuf::from(if path.is_empty() { "." } else { path });
            let resolved = self
                .run(path, move |sftp| sftp.realpath(&target))
                .await
                .map_err(|e| match e {
                    RemoteError::Io { .. } => RemoteError::InvalidPath(path.to_string()),
                    other => other,
                })?;
            Ok(resolved.to_string_lossy().replace('\\', "/"))
        })
    }

    fn stat<'a>(&'a self, path: &'a str) -> RemoteFuture<'a, RemoteStat> {
        Box::pin(async move {
            let target = PathBuf::from(path);
            let stat = self.run(path, move |sftp| sftp.stat(&target)).await?;
            Ok(RemoteStat {
                size: stat.size.unwrap_or(0),
                is_dir: stat.is_dir(),
                mode: stat.perm.unwrap_or(0) & 0o7777,
            })
        })
    }

    fn open_write<'a>(&'a self, path: &'a str) -> RemoteFuture<'a, Box<dyn RemoteFile>> {
        Box::pin(async move {
            let target = PathBuf::from(path);
            let file = self
                .run(path, move |sftp| {
                    sftp.open_mode(
                        &target,
                        OpenFlags::WRITE | OpenFlags::CREATE,
                        0o644,
                        OpenType::File,
                    )
                })
                .await?;
            Ok(Box::new(SftpFile {
                file: Some(file),
                path: path.to_string(),
            }) as Box<dyn RemoteFile>)
        })
    }

    fn mkdir<'a>(&'a self, path: &'a str) -> RemoteFuture<'a, ()> {
        Box::pin(async move {
            let target = PathBuf::from(path);
            self.run(path, move |sftp| sftp.mkdir(&target, 0o755)).await
        })
    }

    fn chmod<'a>(&'a self, path: &'a str, mode: u32) -> RemoteFuture<'a, ()> {
        Box::pin(async move {
            let target = PathBuf::from(path);
            self.run(path, move |sftp| {
                sftp.setstat(
                    &target,
                    FileStat {
                        size: None,
                        uid: None,
                        gid: None,
                        perm: Some(mode & 0o7777),
                        atime: None,
                        mtime: None,
                    },
                )
            })
            .await
        })
    }
}

struct SftpFile {
    file: Option<ssh2::File>,
    path: String,
}

impl SftpFile {
    /// Moves the handle onto the blocking pool for one operation and back.
    async fn with_file<T, F>(&mut self, op: F) -> Result<T, RemoteError>
    where
        T: Send + 'static,
        F: FnOnce(&mut ssh2::File) -> std::io::Result<T> + Send + 'static,
    {
        let mut file = self
            .file
            .take()
            .ok_or_else(|| RemoteError::Protocol(format!("{}: handle already closed", self.path)))?;
        let (file, result) = tokio::task::spawn_blocking(move || {
            let result = op(&mut file);
            (file, result)
        })
        .await
        .map_err(|e| RemoteError::Protocol(format!("blocking task failed: {e}")))?;
        self.file = Some(file);
        result.map_err(|e| RemoteError::io(self.path.clone(), e))
    }
}

impl RemoteFile for SftpFile {
    fn seek(&mut self, offset: u64) -> RemoteFuture<'_, ()> {
        Box::pin(async move {
            self.with_file(move |f| f.seek(SeekFrom::Start(offset)).map(|_| ()))
                .await
        })
    }

    fn write<'a>(&'a mut self, buf: &'a [u8]) -> RemoteFuture<'a, usize> {
        Box::pin(async move {
            let data = buf.to_vec();
            self.with_file(move |f| f.write(&data)).await
        })
    }

    fn close(&mut self) -> RemoteFuture<'_, ()> {
        Box::pin(async move {
            if self.file.is_none() {
                return Ok(());
            }
            let result = self
                .with_file(|f| f.close().map_err(std::io::Error::from))
                .await;
            self.file = None;
            result
        })
    }
}

fn establish(config: &SftpConfig) -> Result<Link, String> {
    let addr = (config.host.as_str(), config.port)
        .to_socket_addrs()
        .map_err(|e| format!("cannot resolve {}: {e}", config.host))?
        .next()
        .ok_or_else(|| format!("no address for {}", config.host))?;

    debug!(%addr, "connecting");
    let tcp = TcpStream::connect_timeout(&addr, config.connect_timeout)
        .map_err(|e| format!("TCP connection to {addr} failed: {e}"))?;

    let mut session = Session::new().map_err(|e| format!("cannot create SSH session: {e}"))?;
    session.set_tcp_stream(tcp);
    session
        .handshake()
        .map_err(|e| format!("SSH handshake failed: {e}"))?;

    verify_host_key(&session, config)?;
    authenticate(&session, config)?;

    let sftp = session
        .sftp()
        .map_err(|e| format!("cannot open SFTP subsystem: {e}"))?;
    Ok(Link {
        _session: session,
        sftp,
    })
}

fn verify_host_key(session: &Session, config: &SftpConfig) -> Result<(), String> {
    if config.insecure {
        warn!(host = %config.host, "host key verification disabled");
        return Ok(());
    }

    let (key, _) = session
        .host_key()
        .ok_or_else(|| "server sent no host key".to_string())?;
    let mut known = session
        .known_hosts()
        .map_err(|e| format!("cannot init known hosts: {e}"))?;
    let path = config
        .known_hosts
        .clone()
        .unwrap_or_else(|| ssh_dir().join("known_hosts"));
    known
        .read_file(&path, KnownHostFileKind::OpenSSH)
        .map_err(|e| format!("cannot read {}: {e}", path.display()))?;

    match known.check_port(&config.host, config.port, key) {
        CheckResult::Match => Ok(()),
        CheckResult::NotFound => Err(format!(
            "host key for {} not found in {}",
            config.host,
            path.display()
        )),
        CheckResult::Mismatch => Err(format!("host key mismatch for {}", config.host)),
        CheckResult::Failure => Err(format!("host key check failed for {}", config.host)),
    }
}

fn authenticate(session: &Session, config: &SftpConfig) -> Result<(), String> {
    if session.userauth_agent(&config.username).is_ok() && session.authenticated() {
        debug!(user = %config.username, "authenticated via agent");
        return Ok(());
    }

    let identity = config
        .identity
        .clone()
        .or_else(default_identity)
        .ok_or_else(|| "ssh-agent auth failed and no identity file found".to_string())?;
    session
        .userauth_pubkey_file(&config.username, None, &identity, None)
        .map_err(|e| format!("public key auth with {} failed: {e}", identity.display()))?;

    if !session.authenticated() {
        return Err(format!("authentication failed for {}", config.username));
    }
    debug!(user = %config.username, identity = %identity.display(), "authenticated via key");
    Ok(())
}

fn default_identity() -> Option<PathBuf> {
    ["id_ed25519", "id_rsa"]
        .iter()
        .map(|name| ssh_dir().join(name))
        .find(|p| Path::new(p).exists())
}

fn ssh_dir() -> PathBuf {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
        .join(".ssh")
}
