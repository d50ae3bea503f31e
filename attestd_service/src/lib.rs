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

//! The attestd service: the request handler, the two transport bindings that
//! expose it, and the client side connector.

pub mod client;
pub mod handler;
pub mod server;

use std::path::PathBuf;

use async_trait::async_trait;
use attestd_attestation::results::VerificationResult;
use attestd_channel::{
    envelope::{
        AttestationRequest, Request, Response, TlsCertRequest, TlsSignRequest,
        VerificationRequest,
    },
    ChannelError,
};

pub use client::connect;
pub use handler::{AttestationService, ServiceConfig};

/// Default endpoint of the local socket binding.
pub const DEFAULT_SOCKET_PATH: &str = "/run/attestd/attestd.sock";
/// Default endpoint of the network binding.
pub const DEFAULT_NETWORK_ADDRESS: &str = "127.0.0.1:9955";

/// Transport carrying the envelope protocol.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Binding {
    /// Filesystem path of a Unix domain socket.
    Socket(PathBuf),
    /// `host:port` of a TCP endpoint.
    Network(String),
}

#[derive(thiserror::Error, Debug)]
pub enum ServiceError {
    #[error("couldn't connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },
    #[error("timed out connecting to {0}")]
    Timeout(String),
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error("service error: {0}")]
    Application(String),
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl ServiceError {
    /// Whether the connection the error happened on must be discarded.
    ///
    /// Application errors leave the connection usable; everything else means
    /// the caller has to reconnect before retrying.
    pub fn is_connection_fatal(&self) -> bool {
        !matches!(self, ServiceError::Application(_))
    }
}

fn unexpected(response: Response) -> ServiceError {
    match response {
        Response::Error(error) => ServiceError::Application(error.message),
        other => ServiceError::UnexpectedResponse(format!("{} envelope", other.tag())),
    }
}

/// The four trust operations, independent of where they are executed.
#[async_trait]
pub trait TrustService: Send + Sync {
    /// Sends one request and waits for its response.
    async fn call(&self, request: Request) -> Result<Response, ServiceError>;

    /// Returns a serialized signed report bound to `nonce`.
    async fn attest(&self, nonce: Vec<u8>) -> Result<Vec<u8>, ServiceError> {
        match self.call(Request::Attest(AttestationRequest { nonce })).await? {
            Response::Attest(response) => Ok(response.report),
            other => Err(unexpected(other)),
        }
    }

    async fn verify(
        &self,
        request: VerificationRequest,
    ) -> Result<VerificationResult, ServiceError> {
        match self.call(Request::Verify(request)).await? {
            Response::Verify(response) => VerificationResult::from_json(&response.result)
                .map_err(|err| ServiceError::UnexpectedResponse(format!("{err:#}"))),
            other => Err(unexpected(other)),
        }
    }

    async fn tls_sign(&self, request: TlsSignRequest) -> Result<Vec<u8>, ServiceError> {
        match self.call(Request::TlsSign(request)).await? {
            Response::TlsSign(response) => Ok(response.signature),
            other => Err(unexpected(other)),
        }
    }

    /// Returns the PEM encoded leaf and intermediate certificates.
    async fn tls_cert(&self, id: Vec<u8>) -> Result<Vec<Vec<u8>>, ServiceError> {
        match self.call(Request::TlsCert(TlsCertRequest { id })).await? {
            Response::TlsCert(response) => Ok(response.certificate_chain),
            other => Err(unexpected(other)),
        }
    }
}
