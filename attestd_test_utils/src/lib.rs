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

//! Helpers shared by the attestd test suites.

use std::{collections::BTreeMap, path::Path, sync::Arc};

use anyhow::bail;
use attestd_attestation::{
    certificate::{parse_certificate, CertificateChain},
    measurement::{Measurement, MeasurementSource},
    signer::SoftwareSigner,
};
use rcgen::{
    date_time_ymd, BasicConstraints, CertificateParams, DistinguishedName, DnType, IsCa, KeyPair,
    KeyUsagePurpose, PKCS_ECDSA_P256_SHA256,
};

/// The nonce used by the attestation scenarios.
pub const TEST_NONCE: [u8; 4] = [0x01, 0x02, 0x03, 0x04];
/// A nonce different from [`TEST_NONCE`].
pub const OTHER_NONCE: [u8; 4] = [0x05, 0x06, 0x07, 0x08];

/// A generated root CA -> intermediate CA -> leaf hierarchy with P-256 keys.
pub struct TestPki {
    pub root_der: Vec<u8>,
    pub root_pem: String,
    pub intermediate_der: Vec<u8>,
    pub intermediate_pem: String,
    pub leaf_der: Vec<u8>,
    pub leaf_pem: String,
    /// PKCS#8 PEM private key certified by the leaf.
    pub leaf_key_pem: String,
}

/// Deviations from a well formed hierarchy.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Flaw {
    None,
    ExpiredLeaf,
    /// The intermediate is an end-entity certificate.
    EndEntityIntermediate,
    /// The root allows no intermediates below it.
    RootPathLenZero,
    /// The intermediate is a CA whose key usage lacks keyCertSign.
    IntermediateWithoutCertSign,
}

impl TestPki {
    pub fn generate() -> Self {
        Self::build(Flaw::None)
    }

    /// Same hierarchy, but the leaf certificate expired in 2000.
    pub fn with_expired_leaf() -> Self {
        Self::build(Flaw::ExpiredLeaf)
    }

    /// The leaf is issued by the key of an end-entity certificate that the
    /// root issued, rather than by a CA.
    pub fn with_end_entity_intermediate() -> Self {
        Self::build(Flaw::EndEntityIntermediate)
    }

    /// The root carries a path length constraint of zero, so the
    /// intermediate may not issue certificates.
    pub fn with_root_path_len_zero() -> Self {
        Self::build(Flaw::RootPathLenZero)
    }

    /// The intermediate is a CA, but its key usage only allows digital
    /// signatures.
    pub fn with_intermediate_without_cert_sign() -> Self {
        Self::build(Flaw::IntermediateWithoutCertSign)
    }

    fn build(flaw: Flaw) -> Self {
        let root_key = KeyPair::generate_for(&PKCS_ECDSA_P256_SHA256).unwrap();
        let mut root_params = ca_params("attestd test root");
        if flaw == Flaw::RootPathLenZero {
            root_params.is_ca = IsCa::Ca(BasicConstraints::Constrained(0));
        }
        let root = root_params.self_signed(&root_key).unwrap();

        let intermediate_key = KeyPair::generate_for(&PKCS_ECDSA_P256_SHA256).unwrap();
        let mut intermediate_params = ca_params("attestd test intermediate");
        match flaw {
            Flaw::EndEntityIntermediate => intermediate_params.is_ca = IsCa::ExplicitNoCa,
            Flaw::IntermediateWithoutCertSign => {
                intermediate_params.key_usages = vec![KeyUsagePurpose::DigitalSignature]
            }
            _ => {}
        }
        let intermediate =
            intermediate_params.signed_by(&intermediate_key, &root, &root_key).unwrap();

        let leaf_key = KeyPair::generate_for(&PKCS_ECDSA_P256_SHA256).unwrap();
        let mut leaf_params = CertificateParams::default();
        leaf_params.distinguished_name = common_name("attestd test signer");
        if flaw == Flaw::ExpiredLeaf {
            leaf_params.not_before = date_time_ymd(1999, 1, 1);
            leaf_params.not_after = date_time_ymd(2000, 1, 1);
        }
        let leaf = leaf_params.signed_by(&leaf_key, &intermediate, &intermediate_key).unwrap();

        Self {
            root_der: root.der().to_vec(),
            root_pem: root.pem(),
            intermediate_der: intermediate.der().to_vec(),
            intermediate_pem: intermediate.pem(),
            leaf_der: leaf.der().to_vec(),
            leaf_pem: leaf.pem(),
            leaf_key_pem: leaf_key.serialize_pem(),
        }
    }

    pub fn certificate_chain(&self) -> CertificateChain {
        CertificateChain::new(
            Some(parse_certificate(self.leaf_pem.as_bytes()).unwrap()),
            vec![parse_certificate(self.intermediate_pem.as_bytes()).unwrap()],
            Some(parse_certificate(self.root_pem.as_bytes()).unwrap()),
        )
    }

    pub fn signer(&self) -> SoftwareSigner {
        SoftwareSigner::from_pkcs8_pem(&self.leaf_key_pem, self.certificate_chain()).unwrap()
    }

    /// Writes the key and certificates as `key.pem`, `leaf.pem`,
    /// `intermediate.pem` and `ca.pem` into `dir`.
    pub fn write_to(&self, dir: &Path) {
        for (name, contents) in [
            ("key.pem", &self.leaf_key_pem),
            ("leaf.pem", &self.leaf_pem),
            ("intermediate.pem", &self.intermediate_pem),
            ("ca.pem", &self.root_pem),
        ] {
            std::fs::write(dir.join(name), contents).unwrap();
        }
    }
}

fn common_name(name: &str) -> DistinguishedName {
    let mut distinguished_name = DistinguishedName::new();
    distinguished_name.push(DnType::CommonName, name);
    distinguished_name
}

fn ca_params(name: &str) -> CertificateParams {
    let mut params = CertificateParams::default();
    params.distinguished_name = common_name(name);
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params
}

/// Returns the same evidence on every call.
pub struct StaticMeasurementSource {
    name: String,
    evidence: Vec<u8>,
    parameters: BTreeMap<String, Vec<u8>>,
}

impl StaticMeasurementSource {
    pub fn new(name: &str, evidence: &[u8]) -> Self {
        Self { name: name.to_owned(), evidence: evidence.to_vec(), parameters: BTreeMap::new() }
    }

    pub fn with_parameter(mut self, key: &str, value: &[u8]) -> Self {
        self.parameters.insert(key.to_owned(), value.to_vec());
        self
    }
}

impl MeasurementSource for StaticMeasurementSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn collect(&self, _nonce: &[u8]) -> anyhow::Result<Measurement> {
        let mut measurement = Measurement::new(self.name.clone(), self.evidence.clone());
        measurement.parameters = self.parameters.clone();
        Ok(measurement)
    }
}

/// Always fails, like a measurement device that is unavailable.
pub struct FailingMeasurementSource {
    name: String,
}

impl FailingMeasurementSource {
    pub fn new(name: &str) -> Self {
        Self { name: name.to_owned() }
    }
}

impl MeasurementSource for FailingMeasurementSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn collect(&self, _nonce: &[u8]) -> anyhow::Result<Measurement> {
        bail!("{} is unavailable", self.name)
    }
}

/// The single `dummy` source answering `OK`.
pub fn dummy_sources() -> Vec<Arc<dyn MeasurementSource>> {
    vec![Arc::new(StaticMeasurementSource::new("dummy", b"OK"))]
}

