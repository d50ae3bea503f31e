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

//! Scenarios every implementation of `TrustService` must pass: the in-process
//! service and clients of both transport bindings.

mod common;

use attestd_attestation::certificate::parse_certificate;
use attestd_channel::envelope::{
    HashAlgorithm, SignatureOptions, TlsSignRequest, VerificationRequest,
};
use attestd_service::{ServiceError, TrustService};
use attestd_test_utils::{TestPki, OTHER_NONCE, TEST_NONCE};
use common::{service, service_with_signer, Kind, Running};
use p256::ecdsa::{signature::Verifier, DerSignature, VerifyingKey};
use sha2::{Digest, Sha256};

async fn attest_and_verify(client: &dyn TrustService, pki: &TestPki) {
    let report = client.attest(TEST_NONCE.to_vec()).await.unwrap();

    let request = |nonce: &[u8]| VerificationRequest {
        report: report.clone(),
        nonce: nonce.to_vec(),
        trusted_ca: pki.root_pem.as_bytes().to_vec(),
        policies: vec![],
    };

    let result = client.verify(request(&TEST_NONCE)).await.unwrap();
    assert!(result.success, "{result:?}");

    let result = client.verify(request(&OTHER_NONCE)).await.unwrap();
    assert!(!result.success);
    assert!(!result.nonce_check.success);
    assert!(result.signature_check.success);
}

async fn verify_garbage_is_a_failed_result(client: &dyn TrustService, pki: &TestPki) {
    let result = client
        .verify(VerificationRequest {
            report: b"garbage".to_vec(),
            nonce: TEST_NONCE.to_vec(),
            trusted_ca: pki.root_pem.as_bytes().to_vec(),
            policies: vec![],
        })
        .await
        .unwrap();
    assert!(!result.success);
    assert!(!result.report_check.success);
}

async fn tls_cert_returns_leaf_and_intermediate(client: &dyn TrustService, pki: &TestPki) {
    let chain = client.tls_cert(b"default".to_vec()).await.unwrap();

    assert_eq!(chain.len(), 2);
    assert!(chain[0].starts_with(b"-----BEGIN CERTIFICATE-----"));
    assert_eq!(
        parse_certificate(&chain[0]).unwrap(),
        parse_certificate(pki.leaf_pem.as_bytes()).unwrap()
    );
    assert_eq!(
        parse_certificate(&chain[1]).unwrap(),
        parse_certificate(pki.intermediate_pem.as_bytes()).unwrap()
    );
}

async fn tls_sign_signs_with_certified_key(client: &dyn TrustService, pki: &TestPki) {
    let transcript = b"client hello, server hello";
    let signature = client
        .tls_sign(TlsSignRequest {
            content: Sha256::digest(transcript).to_vec(),
            hash_algorithm: HashAlgorithm::Sha256,
            signature_options: vec![],
        })
        .await
        .unwrap();

    let leaf = parse_certificate(pki.leaf_pem.as_bytes()).unwrap();
    let key = VerifyingKey::from_sec1_bytes(
        leaf.tbs_certificate.subject_public_key_info.subject_public_key.raw_bytes(),
    )
    .unwrap();
    let signature = DerSignature::try_from(signature.as_slice()).unwrap();
    assert!(key.verify(transcript, &signature).is_ok());
}

async fn tls_sign_rejects_bad_requests(client: &dyn TrustService) {
    let wrong_length = TlsSignRequest {
        content: vec![0; 32],
        hash_algorithm: HashAlgorithm::Sha384,
        signature_options: vec![],
    };
    let error = client.tls_sign(wrong_length).await.unwrap_err();
    assert!(matches!(error, ServiceError::Application(_)), "{error:?}");
    assert!(!error.is_connection_fatal());

    let pss = TlsSignRequest {
        content: vec![0; 32],
        hash_algorithm: HashAlgorithm::Sha256,
        signature_options: SignatureOptions { pss_salt_length: Some(32) }.encode().unwrap(),
    };
    let error = client.tls_sign(pss).await.unwrap_err();
    assert!(matches!(error, ServiceError::Application(ref message) if message.contains("PSS")));
}

async fn run_scenarios(client: &dyn TrustService, pki: &TestPki) {
    attest_and_verify(client, pki).await;
    verify_garbage_is_a_failed_result(client, pki).await;
    tls_cert_returns_leaf_and_intermediate(client, pki).await;
    tls_sign_signs_with_certified_key(client, pki).await;
    tls_sign_rejects_bad_requests(client).await;
}

async fn run_without_signer(client: &dyn TrustService) {
    for error in [
        client.attest(TEST_NONCE.to_vec()).await.unwrap_err(),
        client.tls_cert(vec![]).await.unwrap_err(),
        client
            .tls_sign(TlsSignRequest { content: vec![0; 32], ..Default::default() })
            .await
            .unwrap_err(),
    ] {
        assert!(
            matches!(
                error,
                ServiceError::Application(ref message) if message == "no valid signer configured"
            ),
            "{error:?}"
        );
    }
}

#[tokio::test]
async fn test_in_process_service() {
    let pki = TestPki::generate();
    run_scenarios(&service(&pki), &pki).await;
    run_without_signer(&service_with_signer(None)).await;
}

#[tokio::test]
async fn test_socket_binding() {
    let pki = TestPki::generate();
    let running = Running::start(Kind::Socket, service(&pki)).await;
    run_scenarios(running.client.as_ref(), &pki).await;
    running.stop().await;

    let running = Running::start(Kind::Socket, service_with_signer(None)).await;
    run_without_signer(running.client.as_ref()).await;
    running.stop().await;
}

#[tokio::test]
async fn test_network_binding() {
    let pki = TestPki::generate();
    let running = Running::start(Kind::Network, service(&pki)).await;
    run_scenarios(running.client.as_ref(), &pki).await;
    running.stop().await;

    let running = Running::start(Kind::Network, service_with_signer(None)).await;
    run_without_signer(running.client.as_ref()).await;
    running.stop().await;
}

#[tokio::test]
async fn test_report_from_one_binding_verifies_on_the_other() {
    let pki = TestPki::generate();
    let socket = Running::start(Kind::Socket, service(&pki)).await;
    let network = Running::start(Kind::Network, service(&pki)).await;

    let report = socket.client.attest(TEST_NONCE.to_vec()).await.unwrap();
    let result = network
        .client
        .verify(VerificationRequest {
            report,
            nonce: TEST_NONCE.to_vec(),
            trusted_ca: pki.root_der.clone(),
            policies: vec![],
        })
        .await
        .unwrap();
    assert!(result.success, "{result:?}");

    socket.stop().await;
    network.stop().await;
}
