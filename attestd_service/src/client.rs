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

//! Transport agnostic client of the attestd service.

use std::{path::PathBuf, time::Duration};

use async_trait::async_trait;
use attestd_channel::{
    envelope::{Request, Response},
    EnvelopeChannel,
};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::{TcpStream, UnixStream},
};

use crate::{Binding, ServiceError, TrustService};

/// Upper bound on establishing a network binding connection.
pub const DIAL_TIMEOUT: Duration = Duration::from_secs(10);

/// Opens connections to a service endpoint.
#[async_trait]
pub trait Connector: Send + Sync {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send;

    async fn connect(&self) -> Result<Self::Stream, ServiceError>;
}

pub struct UnixConnector {
    path: PathBuf,
}

impl UnixConnector {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl Connector for UnixConnector {
    type Stream = UnixStream;

    async fn connect(&self) -> Result<UnixStream, ServiceError> {
        UnixStream::connect(&self.path).await.map_err(|source| ServiceError::Connect {
            address: self.path.display().to_string(),
            source,
        })
    }
}

pub struct TcpConnector {
    address: String,
    timeout: Duration,
}

impl TcpConnector {
    pub fn new(address: impl Into<String>) -> Self {
        Self { address: address.into(), timeout: DIAL_TIMEOUT }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Connector for TcpConnector {
    type Stream = TcpStream;

    async fn connect(&self) -> Result<TcpStream, ServiceError> {
        tokio::time::timeout(self.timeout, TcpStream::connect(&self.address))
            .await
            .map_err(|_| ServiceError::Timeout(self.address.clone()))?
            .map_err(|source| ServiceError::Connect { address: self.address.clone(), source })
    }
}

/// Sends every call over a fresh connection, which both bindings accept.
/// Failures are returned to the caller and never retried.
pub struct Client<C> {
    connector: C,
}

impl<C: Connector> Client<C> {
    pub fn new(connector: C) -> Self {
        Self { connector }
    }
}

#[async_trait]
impl<C: Connector> TrustService for Client<C> {
    async fn call(&self, request: Request) -> Result<Response, ServiceError> {
        let mut channel = EnvelopeChannel::new(self.connector.connect().await?);
        channel.write_request(&request).await?;
        Ok(channel.read_response().await?)
    }
}

/// Returns a client for `binding`. Connections are only opened when a call is
/// made.
pub fn connect(binding: &Binding) -> Box<dyn TrustService> {
    match binding {
        Binding::Socket(path) => Box::new(Client::new(UnixConnector::new(path.clone()))),
        Binding::Network(address) => Box::new(Client::new(TcpConnector::new(address.clone()))),
    }
}
