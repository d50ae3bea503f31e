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

//! The signer delegate: the only component that can reach the private key.

use std::sync::Mutex;

use anyhow::{anyhow, ensure, Context};
use p256::{
    ecdsa::{signature::hazmat::PrehashSigner, SigningKey, VerifyingKey},
    pkcs8::DecodePrivateKey,
};
use sha2::{Digest, Sha256, Sha384, Sha512};

use crate::certificate::CertificateChain;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgorithm {
    pub fn digest_size(&self) -> usize {
        match self {
            HashAlgorithm::Sha256 => 32,
            HashAlgorithm::Sha384 => 48,
            HashAlgorithm::Sha512 => 64,
        }
    }

    pub fn digest(&self, data: &[u8]) -> Vec<u8> {
        match self {
            HashAlgorithm::Sha256 => Sha256::digest(data).to_vec(),
            HashAlgorithm::Sha384 => Sha384::digest(data).to_vec(),
            HashAlgorithm::Sha512 => Sha512::digest(data).to_vec(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SignOptions {
    /// The hash function that produced the digest to sign.
    pub hash: HashAlgorithm,
    /// Salt length for RSASSA-PSS; `None` selects the key's default scheme.
    pub pss_salt_length: Option<i64>,
}

/// Opaque reference to a private key held by a [`Signer`]. It carries no key
/// material.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SigningKeyHandle {
    label: String,
}

impl SigningKeyHandle {
    pub fn new(label: impl Into<String>) -> Self {
        Self { label: label.into() }
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

/// A delegate that signs with a (typically hardware-backed) private key
/// without exposing it.
pub trait Signer: Send + Sync {
    fn signing_key_handle(&self) -> anyhow::Result<SigningKeyHandle>;

    /// Signs a digest computed with `options.hash` and returns the encoded
    /// signature (DER for ECDSA keys).
    fn sign(
        &self,
        key: &SigningKeyHandle,
        digest: &[u8],
        options: &SignOptions,
    ) -> anyhow::Result<Vec<u8>>;

    fn certificate_chain(&self) -> &CertificateChain;
}

const SOFTWARE_KEY_LABEL: &str = "software-p256";

/// A [`Signer`] backed by a P-256 key kept in process memory.
///
/// The key sits behind a mutex, the same way a hardware delegate serializes
/// multi-step operations on its device.
pub struct SoftwareSigner {
    key: Mutex<SigningKey>,
    chain: CertificateChain,
}

impl SoftwareSigner {
    /// Creates a signer, checking that the leaf certificate (if any) certifies
    /// `key`.
    pub fn new(key: SigningKey, chain: CertificateChain) -> anyhow::Result<Self> {
        if let Some(leaf) = chain.leaf() {
            let certified_key = VerifyingKey::from_sec1_bytes(
                leaf.tbs_certificate.subject_public_key_info.subject_public_key.raw_bytes(),
            )
            .map_err(|err| anyhow!("leaf certificate doesn't hold a P-256 key: {err}"))?;
            ensure!(
                &certified_key == key.verifying_key(),
                "leaf certificate doesn't match the signing key"
            );
        }
        Ok(Self { key: Mutex::new(key), chain })
    }

    /// Loads a PKCS#8 PEM encoded P-256 private key.
    pub fn from_pkcs8_pem(pem: &str, chain: CertificateChain) -> anyhow::Result<Self> {
        let key = SigningKey::from_pkcs8_pem(pem)
            .map_err(|err| anyhow!("couldn't parse PKCS#8 key: {err}"))?;
        Self::new(key, chain)
    }
}

impl Signer for SoftwareSigner {
    fn signing_key_handle(&self) -> anyhow::Result<SigningKeyHandle> {
        Ok(SigningKeyHandle::new(SOFTWARE_KEY_LABEL))
    }

    fn sign(
        &self,
        key: &SigningKeyHandle,
        digest: &[u8],
        options: &SignOptions,
    ) -> anyhow::Result<Vec<u8>> {
        ensure!(key.label() == SOFTWARE_KEY_LABEL, "unknown signing key `{}`", key.label());
        ensure!(options.pss_salt_length.is_none(), "PSS signatures require an RSA key");
        ensure!(
            digest.len() == options.hash.digest_size(),
            "digest is {} bytes long, {:?} produces {} bytes",
            digest.len(),
            options.hash,
            options.hash.digest_size()
        );

        let key = self.key.lock().map_err(|_| anyhow!("signing key lock poisoned"))?;
        let signature: p256::ecdsa::Signature = key
            .sign_prehash(digest)
            .map_err(anyhow::Error::msg)
            .context("couldn't sign digest")?;
        Ok(signature.to_der().as_bytes().to_vec())
    }

    fn certificate_chain(&self) -> &CertificateChain {
        &self.chain
    }
}
