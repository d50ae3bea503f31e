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

// Not every test binary uses every helper.
#![allow(dead_code)]

use std::{path::PathBuf, sync::Arc};

use attestd_attestation::{policy::AllowAll, report::CborSerializer, signer::Signer};
use attestd_service::{
    connect,
    server::{TcpServer, UnixSocketServer},
    AttestationService, Binding, ServiceConfig, TrustService,
};
use attestd_test_utils::{dummy_sources, TestPki};
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Clone, Copy, Debug)]
pub enum Kind {
    Socket,
    Network,
}

pub fn service(pki: &TestPki) -> AttestationService {
    service_with_signer(Some(Arc::new(pki.signer())))
}

pub fn service_with_signer(signer: Option<Arc<dyn Signer>>) -> AttestationService {
    AttestationService::new(ServiceConfig {
        measurement_sources: dummy_sources(),
        policy_engine: Arc::new(AllowAll),
        signer,
        serializer: Arc::new(CborSerializer),
    })
}

/// A running server of one binding plus a client connected to it.
pub struct Running {
    pub binding: Binding,
    pub client: Box<dyn TrustService>,
    pub cancellation_token: CancellationToken,
    server: JoinHandle<anyhow::Result<()>>,
    _dir: TempDir,
}

impl Running {
    pub async fn start(kind: Kind, service: AttestationService) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let cancellation_token = CancellationToken::new();
        let (binding, server) = match kind {
            Kind::Socket => {
                let path = dir.path().join("attestd.sock");
                let server = UnixSocketServer::bind(&path).await.unwrap();
                let server = tokio::spawn(server.serve(service, cancellation_token.clone()));
                (Binding::Socket(path), server)
            }
            Kind::Network => {
                let server = TcpServer::bind("127.0.0.1:0").await.unwrap();
                let address = server.local_addr().unwrap().to_string();
                let server = tokio::spawn(server.serve(service, cancellation_token.clone()));
                (Binding::Network(address), server)
            }
        };
        Self { client: connect(&binding), binding, cancellation_token, server, _dir: dir }
    }

    pub fn socket_path(&self) -> Option<PathBuf> {
        match &self.binding {
            Binding::Socket(path) => Some(path.clone()),
            Binding::Network(_) => None,
        }
    }

    pub async fn stop(self) {
        self.cancellation_token.cancel();
        self.server.await.unwrap().unwrap();
    }
}
