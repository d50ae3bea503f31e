//
// Copyright 2026 The Project Oak Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Listeners of the two transport bindings.

use std::{
    fs::Permissions,
    io::ErrorKind,
    net::SocketAddr,
    os::unix::fs::{FileTypeExt, PermissionsExt},
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{bail, Context};
use attestd_channel::{
    envelope::{Request, Response},
    ChannelError, EnvelopeChannel,
};
use tokio::{
    fs::set_permissions,
    io::{AsyncRead, AsyncWrite},
    net::{TcpListener, UnixListener},
};
use tokio_util::sync::CancellationToken;

use crate::handler::AttestationService;

/// Pause after a failed accept, so that a persistent failure such as running
/// out of file descriptors doesn't spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// How many requests a binding serves on one connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionMode {
    /// The connection is closed after the first response.
    SingleRequest,
    /// Requests are served in order until the peer closes the connection.
    Persistent,
}

enum ConnectionState {
    AwaitingRequest,
    Dispatching(Request),
    Responding { response: Response, close: bool },
    Closed,
}

/// Serves requests from `stream` until the connection is done.
///
/// Application failures are answered with an error envelope and leave the
/// connection open in [`ConnectionMode::Persistent`]. A protocol error is
/// answered with an error envelope before closing, since the rest of the
/// stream can't be trusted. Transport errors close the connection.
pub async fn serve_connection<S>(stream: S, service: &AttestationService, mode: ConnectionMode)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut channel = EnvelopeChannel::new(stream);
    let mut state = ConnectionState::AwaitingRequest;
    loop {
        state = match state {
            ConnectionState::AwaitingRequest => match channel.read_request().await {
                Ok(request) => ConnectionState::Dispatching(request),
                Err(err) if err.is_eof() => ConnectionState::Closed,
                Err(ChannelError::Protocol(message)) => {
                    log::warn!("closing connection after protocol error: {}", message);
                    ConnectionState::Responding {
                        response: Response::error(format!("protocol error: {message}")),
                        close: true,
                    }
                }
                Err(err) => {
                    log::warn!("closing connection: {}", err);
                    ConnectionState::Closed
                }
            },
            ConnectionState::Dispatching(request) => {
                log::debug!("dispatching {} request", request.tag());
                ConnectionState::Responding {
                    response: service.handle(request).await,
                    close: mode == ConnectionMode::SingleRequest,
                }
            }
            ConnectionState::Responding { response, close } => {
                match channel.write_response(&response).await {
                    Ok(()) if close => ConnectionState::Closed,
                    Ok(()) => ConnectionState::AwaitingRequest,
                    Err(err) => {
                        log::warn!("couldn't write {} response: {}", response.tag(), err);
                        ConnectionState::Closed
                    }
                }
            }
            ConnectionState::Closed => return,
        }
    }
}

/// Passes an accepted connection through. A failed accept is logged and
/// followed by [`ACCEPT_BACKOFF`] before the caller accepts again.
async fn accepted_or_back_off<T>(accepted: std::io::Result<T>) -> Option<T> {
    match accepted {
        Ok(connection) => Some(connection),
        Err(err) => {
            log::warn!("couldn't accept connection: {}", err);
            tokio::time::sleep(ACCEPT_BACKOFF).await;
            None
        }
    }
}

/// The local socket binding. Serves one request per connection.
pub struct UnixSocketServer {
    listener: UnixListener,
    path: PathBuf,
}

impl UnixSocketServer {
    /// Binds to `path`, replacing a stale socket left behind by a previous
    /// run. Anything else found at `path` is left alone and fails the bind.
    pub async fn bind(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("couldn't create {}", parent.display()))?;
        }
        match tokio::fs::symlink_metadata(&path).await {
            Ok(metadata) if metadata.file_type().is_socket() => {
                tokio::fs::remove_file(&path)
                    .await
                    .with_context(|| format!("couldn't remove {}", path.display()))?;
                log::info!("removed stale socket {}", path.display());
            }
            Ok(_) => bail!("{} exists and is not a socket", path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => {
                return Err(err).with_context(|| format!("couldn't inspect {}", path.display()))
            }
        }

        let listener = UnixListener::bind(&path).context("could not bind to the supplied address")?;
        // Local trust clients may run as any user.
        set_permissions(&path, Permissions::from_mode(0o666)).await?;
        Ok(Self { listener, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Accepts connections until `cancellation_token` is cancelled, then
    /// removes the socket file.
    pub async fn serve(
        self,
        service: AttestationService,
        cancellation_token: CancellationToken,
    ) -> anyhow::Result<()> {
        log::info!("listening on {}", self.path.display());
        loop {
            tokio::select! {
                _ = cancellation_token.cancelled() => break,
                accepted = self.listener.accept() => {
                    if let Some((stream, _)) = accepted_or_back_off(accepted).await {
                        let service = service.clone();
                        tokio::spawn(async move {
                            serve_connection(stream, &service, ConnectionMode::SingleRequest).await
                        });
                    }
                }
            }
        }

        drop(self.listener);
        tokio::fs::remove_file(&self.path)
            .await
            .with_context(|| format!("couldn't remove {}", self.path.display()))?;
        log::info!("removed socket {}", self.path.display());
        Ok(())
    }
}

/// The network binding. Connections stay open for sequential requests.
pub struct TcpServer {
    listener: TcpListener,
}

impl TcpServer {
    pub async fn bind(address: &str) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(address)
            .await
            .with_context(|| format!("couldn't bind to {address}"))?;
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts connections until `cancellation_token` is cancelled.
    pub async fn serve(
        self,
        service: AttestationService,
        cancellation_token: CancellationToken,
    ) -> anyhow::Result<()> {
        log::info!("listening on {}", self.local_addr()?);
        loop {
            tokio::select! {
                _ = cancellation_token.cancelled() => break,
                accepted = self.listener.accept() => {
                    if let Some((stream, peer)) = accepted_or_back_off(accepted).await {
                        log::debug!("accepted connection from {}", peer);
                        let service = service.clone();
                        tokio::spawn(async move {
                            serve_connection(stream, &service, ConnectionMode::Persistent).await
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use tokio::time::Instant;

    use super::*;

    #[tokio::test]
    async fn test_failed_accept_backs_off() {
        let start = Instant::now();
        let error = io::Error::from_raw_os_error(24); // EMFILE
        assert!(accepted_or_back_off::<()>(Err(error)).await.is_none());
        assert!(start.elapsed() >= ACCEPT_BACKOFF);

        let start = Instant::now();
        assert_eq!(accepted_or_back_off(Ok(7)).await, Some(7));
        assert!(start.elapsed() < ACCEPT_BACKOFF);
    }
}
