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

//! Verification of signed attestation reports.

use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use p256::ecdsa::{signature::Verifier, DerSignature, VerifyingKey};
use x509_cert::{der::Decode, Certificate};

use crate::{
    certificate::{parse_certificate, report_chain},
    policy::PolicyEngine,
    report::{ReportSerializer, SignedReport},
    results::{CheckResult, MeasurementResult, VerificationResult},
};

/// Verifies a serialized [`SignedReport`].
///
/// Never fails: a report that can't be verified yields a result whose
/// `success` is false. Once the outer report is decoded, the certificate,
/// signature, nonce and policy checks are computed independently of each
/// other. `current_time` is the time since the UNIX epoch used to check
/// certificate validity.
pub fn verify(
    report: &[u8],
    expected_nonce: &[u8],
    trusted_ca: &[u8],
    policies: &[u8],
    policy_engine: &dyn PolicyEngine,
    serializer: &dyn ReportSerializer,
    current_time: Duration,
) -> VerificationResult {
    let signed = match serializer.deserialize_report(report) {
        Ok(signed) => signed,
        Err(err) => return malformed_report(format!("{err:#}")),
    };

    let chain = signed
        .certificate_chain
        .iter()
        .map(|der| Certificate::from_der(der).context("couldn't decode embedded certificate"))
        .collect::<anyhow::Result<Vec<_>>>();
    let (certificate_check, signature_check): (CheckResult, CheckResult) = match &chain {
        Ok(chain) => (
            check_certificates(chain, trusted_ca, current_time).into(),
            check_signature(chain, &signed).into(),
        ),
        Err(err) => (
            CheckResult::failed(format!("{err:#}")),
            CheckResult::not_evaluated("no signer certificate"),
        ),
    };

    let mut result = match serializer.deserialize_body(&signed.body) {
        Ok(body) => {
            let nonce_check = if body.nonce == expected_nonce {
                CheckResult::passed()
            } else {
                CheckResult::failed(format!(
                    "report nonce {} doesn't match expected nonce {}",
                    hex::encode(&body.nonce),
                    hex::encode(expected_nonce)
                ))
            };

            let measurements: Vec<MeasurementResult> = body
                .measurements
                .iter()
                .map(|measurement| {
                    MeasurementResult::new(
                        &measurement.source,
                        policy_engine.evaluate(measurement, policies),
                    )
                })
                .collect();
            let rejected: Vec<&str> = measurements
                .iter()
                .filter(|measurement| !measurement.success)
                .map(|measurement| measurement.source.as_str())
                .collect();
            let policy_check = if rejected.is_empty() {
                CheckResult::passed()
            } else {
                CheckResult::failed(format!("policy rejected {}", rejected.join(", ")))
            };

            VerificationResult {
                success: false,
                nonce: body.nonce,
                report_check: CheckResult::passed(),
                certificate_check,
                signature_check,
                nonce_check,
                policy_check,
                measurements,
            }
        }
        Err(err) => VerificationResult {
            success: false,
            nonce: Vec::new(),
            report_check: CheckResult::failed(format!("{err:#}")),
            certificate_check,
            signature_check,
            nonce_check: CheckResult::not_evaluated("report body couldn't be decoded"),
            policy_check: CheckResult::not_evaluated("report body couldn't be decoded"),
            measurements: Vec::new(),
        },
    };

    result.success = [
        &result.report_check,
        &result.certificate_check,
        &result.signature_check,
        &result.nonce_check,
        &result.policy_check,
    ]
    .iter()
    .all(|check| check.success);

    log::debug!(
        "verified report for nonce {}: success={} certificates={} signature={} nonce={} policy={}",
        hex::encode(&result.nonce),
        result.success,
        result.certificate_check.success,
        result.signature_check.success,
        result.nonce_check.success,
        result.policy_check.success
    );
    result
}

fn malformed_report(details: String) -> VerificationResult {
    let skipped = || CheckResult::not_evaluated("report couldn't be decoded");
    VerificationResult {
        success: false,
        nonce: Vec::new(),
        report_check: CheckResult::failed(details),
        certificate_check: skipped(),
        signature_check: skipped(),
        nonce_check: skipped(),
        policy_check: skipped(),
        measurements: Vec::new(),
    }
}

fn check_certificates(
    chain: &[Certificate],
    trusted_ca: &[u8],
    current_time: Duration,
) -> anyhow::Result<()> {
    let root = parse_certificate(trusted_ca).context("couldn't parse trusted CA certificate")?;
    let report = report_chain(chain, &root, current_time)?;
    let errors = report.errors();
    if !errors.is_empty() {
        bail!(errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "));
    }
    Ok(())
}

fn check_signature(chain: &[Certificate], signed: &SignedReport) -> anyhow::Result<()> {
    let leaf = chain.first().context("report carries no certificates")?;
    let key = VerifyingKey::from_sec1_bytes(
        leaf.tbs_certificate.subject_public_key_info.subject_public_key.raw_bytes(),
    )
    .map_err(|err| anyhow!("leaf certificate doesn't hold a P-256 key: {err}"))?;
    let signature = DerSignature::try_from(signed.signature.as_slice())
        .map_err(|err| anyhow!("malformed signature: {err}"))?;
    key.verify(&signed.body, &signature)
        .map_err(|err| anyhow!("signature doesn't match report body: {err}"))
}
