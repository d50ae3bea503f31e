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

use std::{
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use anyhow::{ensure, Context};
use async_trait::async_trait;
use attestd_attestation::{
    measurement::MeasurementSource,
    policy::PolicyEngine,
    report::{self, ReportSerializer},
    signer::{HashAlgorithm, SignOptions, Signer},
    verifier,
};
use attestd_channel::envelope::{
    self, AttestationRequest, AttestationResponse, Request, Response, SignatureOptions,
    TlsCertRequest, TlsCertResponse, TlsSignRequest, TlsSignResponse, VerificationRequest,
    VerificationResponse,
};

use crate::{ServiceError, TrustService};

const NO_SIGNER: &str = "no valid signer configured";

/// Everything the service needs, loaded once at startup and never mutated.
pub struct ServiceConfig {
    /// Queried in this order for every attestation request.
    pub measurement_sources: Vec<Arc<dyn MeasurementSource>>,
    pub policy_engine: Arc<dyn PolicyEngine>,
    /// Without a signer, only verification requests can succeed.
    pub signer: Option<Arc<dyn Signer>>,
    pub serializer: Arc<dyn ReportSerializer>,
}

impl ServiceConfig {
    fn signer(&self) -> anyhow::Result<&dyn Signer> {
        self.signer.as_deref().context(NO_SIGNER)
    }
}

/// Executes requests against the report engine and the signer delegate.
#[derive(Clone)]
pub struct AttestationService {
    config: Arc<ServiceConfig>,
}

impl AttestationService {
    pub fn new(config: ServiceConfig) -> Self {
        Self { config: Arc::new(config) }
    }

    /// Handles one request. Failures are returned as [`Response::Error`].
    ///
    /// Measurement sources and signers may block on hardware, so the work
    /// runs on the blocking thread pool.
    pub async fn handle(&self, request: Request) -> Response {
        let tag = request.tag();
        let config = self.config.clone();
        match tokio::task::spawn_blocking(move || dispatch(&config, request)).await {
            Ok(Ok(response)) => {
                log::debug!("{} request succeeded", tag);
                response
            }
            Ok(Err(err)) => {
                log::warn!("{} request failed: {:#}", tag, err);
                Response::error(format!("{err:#}"))
            }
            Err(err) => {
                log::error!("{} handler didn't complete: {}", tag, err);
                Response::error(format!("{tag} handler didn't complete"))
            }
        }
    }
}

#[async_trait]
impl TrustService for AttestationService {
    async fn call(&self, request: Request) -> Result<Response, ServiceError> {
        Ok(self.handle(request).await)
    }
}

fn dispatch(config: &ServiceConfig, request: Request) -> anyhow::Result<Response> {
    match request {
        Request::Attest(request) => attest(config, request).map(Response::Attest),
        Request::Verify(request) => verify(config, request).map(Response::Verify),
        Request::TlsSign(request) => tls_sign(config, request).map(Response::TlsSign),
        Request::TlsCert(request) => tls_cert(config, request).map(Response::TlsCert),
    }
}

fn attest(
    config: &ServiceConfig,
    request: AttestationRequest,
) -> anyhow::Result<AttestationResponse> {
    log::info!("attestation requested for nonce {}", hex::encode(&request.nonce));
    ensure!(!request.nonce.is_empty(), "nonce must not be empty");
    let signer = config.signer()?;

    let report = report::generate(
        &request.nonce,
        &config.measurement_sources,
        config.serializer.as_ref(),
    )?;
    let report = report::sign(&report, signer, config.serializer.as_ref())?;
    Ok(AttestationResponse { report })
}

fn verify(
    config: &ServiceConfig,
    request: VerificationRequest,
) -> anyhow::Result<VerificationResponse> {
    log::info!("verification requested for nonce {}", hex::encode(&request.nonce));
    let current_time =
        SystemTime::now().duration_since(UNIX_EPOCH).context("system clock is before 1970")?;

    let result = verifier::verify(
        &request.report,
        &request.nonce,
        &request.trusted_ca,
        &request.policies,
        config.policy_engine.as_ref(),
        config.serializer.as_ref(),
        current_time,
    );
    if !result.success {
        log::info!("report for nonce {} failed verification", hex::encode(&request.nonce));
    }
    Ok(VerificationResponse { result: result.to_json()? })
}

fn tls_sign(config: &ServiceConfig, request: TlsSignRequest) -> anyhow::Result<TlsSignResponse> {
    let signer = config.signer()?;
    let signature_options = SignatureOptions::decode(&request.signature_options)?;
    let options = SignOptions {
        hash: match request.hash_algorithm {
            envelope::HashAlgorithm::Sha256 => HashAlgorithm::Sha256,
            envelope::HashAlgorithm::Sha384 => HashAlgorithm::Sha384,
            envelope::HashAlgorithm::Sha512 => HashAlgorithm::Sha512,
        },
        pss_salt_length: signature_options.pss_salt_length,
    };

    let key = signer.signing_key_handle().context(NO_SIGNER)?;
    let signature = signer.sign(&key, &request.content, &options)?;
    Ok(TlsSignResponse { signature })
}

fn tls_cert(config: &ServiceConfig, request: TlsCertRequest) -> anyhow::Result<TlsCertResponse> {
    log::info!("certificate requested for id {}", hex::encode(&request.id));
    let certificate_chain = config
        .signer()?
        .certificate_chain()
        .to_pem_chain()
        .context("couldn't encode certificate chain")?;
    Ok(TlsCertResponse { certificate_chain })
}
