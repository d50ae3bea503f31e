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

//! Generation and signing of attestation reports.

use std::sync::Arc;

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, Bytes};

use crate::{
    cbor,
    measurement::{Measurement, MeasurementSource},
    signer::{HashAlgorithm, SignOptions, Signer},
};

/// The signed part of a report.
#[serde_as]
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ReportBody {
    #[serde_as(as = "Bytes")]
    pub nonce: Vec<u8>,
    pub measurements: Vec<Measurement>,
}

/// What is sent on the wire as the `report` of an attestation response.
#[serde_as]
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SignedReport {
    /// The serialized [`ReportBody`], exactly as it was signed.
    #[serde_as(as = "Bytes")]
    pub body: Vec<u8>,
    /// DER encoded ECDSA signature over `body`.
    #[serde_as(as = "Bytes")]
    pub signature: Vec<u8>,
    /// DER encoded certificates, leaf first.
    #[serde_as(as = "Vec<Bytes>")]
    pub certificate_chain: Vec<Vec<u8>>,
}

/// Canonical encoding shared by the signing and verifying sides.
///
/// Implementations must be deterministic: encoding equal values has to
/// produce equal bytes.
pub trait ReportSerializer: Send + Sync {
    fn serialize_body(&self, body: &ReportBody) -> anyhow::Result<Vec<u8>>;
    fn deserialize_body(&self, encoded: &[u8]) -> anyhow::Result<ReportBody>;
    fn serialize_report(&self, report: &SignedReport) -> anyhow::Result<Vec<u8>>;
    fn deserialize_report(&self, encoded: &[u8]) -> anyhow::Result<SignedReport>;
}

/// CBOR encoding with struct fields in declaration order and sorted maps.
#[derive(Clone, Copy, Debug, Default)]
pub struct CborSerializer;

impl ReportSerializer for CborSerializer {
    fn serialize_body(&self, body: &ReportBody) -> anyhow::Result<Vec<u8>> {
        cbor::to_vec(body).context("couldn't serialize report body")
    }

    fn deserialize_body(&self, encoded: &[u8]) -> anyhow::Result<ReportBody> {
        cbor::from_slice(encoded).context("couldn't deserialize report body")
    }

    fn serialize_report(&self, report: &SignedReport) -> anyhow::Result<Vec<u8>> {
        cbor::to_vec(report).context("couldn't serialize signed report")
    }

    fn deserialize_report(&self, encoded: &[u8]) -> anyhow::Result<SignedReport> {
        cbor::from_slice(encoded).context("couldn't deserialize signed report")
    }
}

/// An unsigned report together with its canonical serialization.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttestationReport {
    pub body: ReportBody,
    pub serialized: Vec<u8>,
}

/// Collects a measurement from every source, in the given order, and
/// serializes them together with `nonce`.
///
/// Fails if any source fails. The error names every failing source.
pub fn generate(
    nonce: &[u8],
    sources: &[Arc<dyn MeasurementSource>],
    serializer: &dyn ReportSerializer,
) -> anyhow::Result<AttestationReport> {
    let mut measurements = Vec::with_capacity(sources.len());
    let mut failures = Vec::new();
    for source in sources {
        match source.collect(nonce) {
            Ok(measurement) => measurements.push(measurement),
            Err(err) => {
                log::warn!("measurement source {} failed: {:#}", source.name(), err);
                failures.push(format!("{}: {:#}", source.name(), err));
            }
        }
    }
    if !failures.is_empty() {
        bail!("couldn't collect measurements: {}", failures.join("; "));
    }

    let body = ReportBody { nonce: nonce.to_vec(), measurements };
    let serialized = serializer.serialize_body(&body)?;
    log::debug!(
        "generated report for nonce {} with {} measurement(s)",
        hex::encode(nonce),
        body.measurements.len()
    );
    Ok(AttestationReport { body, serialized })
}

/// Signs the canonical serialization of `report` with the signer delegate and
/// returns the serialized [`SignedReport`].
pub fn sign(
    report: &AttestationReport,
    signer: &dyn Signer,
    serializer: &dyn ReportSerializer,
) -> anyhow::Result<Vec<u8>> {
    let body = serializer.serialize_body(&report.body)?;
    let certificate_chain = signer
        .certificate_chain()
        .to_der_chain()
        .context("signer has no usable certificate chain")?;
    let key = signer.signing_key_handle().context("signer has no valid key")?;

    let options = SignOptions { hash: HashAlgorithm::Sha256, pss_salt_length: None };
    let digest = options.hash.digest(&body);
    let signature = signer.sign(&key, &digest, &options).context("signer refused to sign")?;

    serializer.serialize_report(&SignedReport { body, signature, certificate_chain })
}
