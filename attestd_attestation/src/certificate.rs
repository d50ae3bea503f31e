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

//! X.509 certificate chains: loading the signer's chain at startup and
//! validating an embedded chain against a trusted root.

use std::time::Duration;

use x509_cert::{
    der::{pem::LineEnding, Decode, DecodePem, Encode, EncodePem},
    ext::pkix::{BasicConstraints, KeyUsage},
};
pub use x509_cert::Certificate;
use x509_verify::VerifyingKey;

const PEM_PREFIX: &[u8] = b"-----BEGIN";

#[derive(thiserror::Error, Debug)]
pub enum CertificateError {
    #[error("no leaf certificate")]
    MissingLeaf,
    #[error("couldn't decode certificate: {0}")]
    Decode(#[from] x509_cert::der::Error),
    #[error("certificate `{subject}` not valid before {not_before:?}, current time {current_time:?}")]
    NotYetValid { subject: String, not_before: Duration, current_time: Duration },
    #[error("certificate `{subject}` expired at {not_after:?}, current time {current_time:?}")]
    Expired { subject: String, not_after: Duration, current_time: Duration },
    #[error("certificate `{subject}` names issuer `{expected}` but is followed by `{actual}`")]
    IssuerMismatch { subject: String, expected: String, actual: String },
    #[error("signature of certificate `{subject}` doesn't verify: {reason}")]
    InvalidSignature { subject: String, reason: String },
    #[error("certificate `{subject}` issues other certificates but is not a CA")]
    NotACa { subject: String },
    #[error("certificate `{subject}` allows {path_len} intermediates below it, found {found}")]
    PathLengthExceeded { subject: String, path_len: u8, found: usize },
    #[error("key usage of certificate `{subject}` doesn't include keyCertSign")]
    MissingKeyCertSign { subject: String },
}

/// Parses a single certificate given either as PEM or as DER.
pub fn parse_certificate(encoded: &[u8]) -> Result<Certificate, CertificateError> {
    if encoded.trim_ascii_start().starts_with(PEM_PREFIX) {
        Ok(Certificate::from_pem(encoded)?)
    } else {
        Ok(Certificate::from_der(encoded)?)
    }
}

/// Parses every PEM certificate contained in `encoded`, in order.
pub fn parse_pem_bundle(encoded: &[u8]) -> Result<Vec<Certificate>, CertificateError> {
    Ok(Certificate::load_pem_chain(encoded)?)
}

pub fn subject_of(certificate: &Certificate) -> String {
    certificate.tbs_certificate.subject.to_string()
}

/// The certificate chain of the signing key, loaded once at startup.
#[derive(Clone, Debug, Default)]
pub struct CertificateChain {
    leaf: Option<Certificate>,
    intermediates: Vec<Certificate>,
    ca: Option<Certificate>,
}

impl CertificateChain {
    pub fn new(
        leaf: Option<Certificate>,
        intermediates: Vec<Certificate>,
        ca: Option<Certificate>,
    ) -> Self {
        Self { leaf, intermediates, ca }
    }

    pub fn leaf(&self) -> Option<&Certificate> {
        self.leaf.as_ref()
    }

    pub fn intermediates(&self) -> &[Certificate] {
        &self.intermediates
    }

    pub fn ca(&self) -> Option<&Certificate> {
        self.ca.as_ref()
    }

    /// DER encoded chain embedded into signed reports: leaf, intermediates,
    /// then the CA if known.
    pub fn to_der_chain(&self) -> Result<Vec<Vec<u8>>, CertificateError> {
        let leaf = self.leaf.as_ref().ok_or(CertificateError::MissingLeaf)?;
        core::iter::once(leaf)
            .chain(self.intermediates.iter())
            .chain(self.ca.iter())
            .map(|certificate| certificate.to_der().map_err(CertificateError::from))
            .collect()
    }

    /// PEM encoded leaf and intermediates, as handed out to TLS peers.
    pub fn to_pem_chain(&self) -> Result<Vec<Vec<u8>>, CertificateError> {
        let leaf = self.leaf.as_ref().ok_or(CertificateError::MissingLeaf)?;
        core::iter::once(leaf)
            .chain(self.intermediates.iter())
            .map(|certificate| {
                certificate
                    .to_pem(LineEnding::LF)
                    .map(String::into_bytes)
                    .map_err(CertificateError::from)
            })
            .collect()
    }
}

/// Result of checking one certificate of a chain. Both checks are always
/// performed so that every problem is reported, not only the first one.
#[derive(Debug)]
pub struct CertificateReport {
    pub subject: String,
    /// Whether the certificate is valid at the verification time.
    pub validity: Result<(), CertificateError>,
    /// Whether the certificate was issued by the next certificate in the
    /// chain (or by the trusted root for the last one).
    pub verification: Result<(), CertificateError>,
}

#[derive(Debug)]
pub struct ChainReport {
    /// Reports for the chain, leaf first. Excludes the trusted root.
    pub certificates: Vec<CertificateReport>,
    /// Validity of the trusted root itself.
    pub root_validity: Result<(), CertificateError>,
}

impl ChainReport {
    pub fn errors(&self) -> Vec<&CertificateError> {
        self.certificates
            .iter()
            .flat_map(|report| [report.validity.as_ref().err(), report.verification.as_ref().err()])
            .chain(core::iter::once(self.root_validity.as_ref().err()))
            .flatten()
            .collect()
    }
}

/// Checks that `chain` (leaf first) leads to `root`, and that every
/// certificate involved is valid at `current_time` (time since the UNIX
/// epoch).
///
/// Every issuer, the root included, must be a CA whose path length
/// constraint admits the intermediates below it. The chain may or may not
/// include the root as its last element.
pub fn report_chain(
    chain: &[Certificate],
    root: &Certificate,
    current_time: Duration,
) -> Result<ChainReport, CertificateError> {
    let chain = match chain.split_last() {
        None => return Err(CertificateError::MissingLeaf),
        Some((last, rest)) if !rest.is_empty() && last == root => rest,
        Some(_) => chain,
    };

    let certificates = chain
        .iter()
        .enumerate()
        .map(|(index, certificate)| {
            let issuer = chain.get(index + 1).unwrap_or(root);
            CertificateReport {
                subject: subject_of(certificate),
                validity: verify_validity(certificate, current_time),
                // Certificates at 1..index are the intermediates below `issuer`.
                verification: verify_can_issue(issuer, index)
                    .and_then(|()| verify_issued_by(certificate, issuer)),
            }
        })
        .collect();

    Ok(ChainReport { certificates, root_validity: verify_validity(root, current_time) })
}

fn verify_validity(
    certificate: &Certificate,
    current_time: Duration,
) -> Result<(), CertificateError> {
    let validity = &certificate.tbs_certificate.validity;
    let not_before = validity.not_before.to_unix_duration();
    let not_after = validity.not_after.to_unix_duration();

    if current_time < not_before {
        Err(CertificateError::NotYetValid {
            subject: subject_of(certificate),
            not_before,
            current_time,
        })
    } else if current_time > not_after {
        Err(CertificateError::Expired { subject: subject_of(certificate), not_after, current_time })
    } else {
        Ok(())
    }
}

fn verify_can_issue(
    issuer: &Certificate,
    intermediates_below: usize,
) -> Result<(), CertificateError> {
    let tbs_certificate = &issuer.tbs_certificate;
    let subject = || subject_of(issuer);

    match tbs_certificate.get::<BasicConstraints>()? {
        Some((_, constraints)) if constraints.ca => match constraints.path_len_constraint {
            Some(path_len) if usize::from(path_len) < intermediates_below => {
                return Err(CertificateError::PathLengthExceeded {
                    subject: subject(),
                    path_len,
                    found: intermediates_below,
                })
            }
            _ => {}
        },
        _ => return Err(CertificateError::NotACa { subject: subject() }),
    }

    match tbs_certificate.get::<KeyUsage>()? {
        Some((_, key_usage)) if !key_usage.key_cert_sign() => {
            Err(CertificateError::MissingKeyCertSign { subject: subject() })
        }
        _ => Ok(()),
    }
}

fn verify_issued_by(
    certificate: &Certificate,
    issuer: &Certificate,
) -> Result<(), CertificateError> {
    if certificate.tbs_certificate.issuer != issuer.tbs_certificate.subject {
        return Err(CertificateError::IssuerMismatch {
            subject: subject_of(certificate),
            expected: certificate.tbs_certificate.issuer.to_string(),
            actual: subject_of(issuer),
        });
    }
    let invalid_signature = |reason: String| CertificateError::InvalidSignature {
        subject: subject_of(certificate),
        reason,
    };
    VerifyingKey::try_from(issuer)
        .map_err(|err| invalid_signature(format!("unusable issuer key: {err:?}")))?
        .verify(certificate)
        .map_err(|err| invalid_signature(format!("{err:?}")))
}
