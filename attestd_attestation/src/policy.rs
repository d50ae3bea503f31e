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

use std::collections::BTreeMap;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, Bytes};
use sha2::{Digest, Sha256};

use crate::{cbor, measurement::Measurement};

/// Outcome of judging one measurement against a policy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PolicyVerdict {
    pub success: bool,
    pub details: Option<String>,
}

impl PolicyVerdict {
    pub fn accept() -> Self {
        Self { success: true, details: None }
    }

    pub fn reject(details: impl Into<String>) -> Self {
        Self { success: false, details: Some(details.into()) }
    }
}

/// Decides whether a measurement, whose report has already been decoded,
/// satisfies the caller supplied policy blob.
pub trait PolicyEngine: Send + Sync {
    fn evaluate(&self, measurement: &Measurement, policies: &[u8]) -> PolicyVerdict;
}

/// Accepts every measurement. Only meant for testing and bring-up.
#[derive(Clone, Copy, Debug, Default)]
pub struct AllowAll;

impl PolicyEngine for AllowAll {
    fn evaluate(&self, _measurement: &Measurement, _policies: &[u8]) -> PolicyVerdict {
        PolicyVerdict::accept()
    }
}

/// Policy blob understood by [`ReferenceValues`]: for every measurement
/// source, the SHA-256 digests of the evidence that are acceptable.
#[serde_as]
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct ReferenceValuePolicy {
    #[serde_as(as = "BTreeMap<_, Vec<Bytes>>")]
    pub accepted_digests: BTreeMap<String, Vec<Vec<u8>>>,
}

impl ReferenceValuePolicy {
    pub fn accept(mut self, source: impl Into<String>, evidence: &[u8]) -> Self {
        self.accepted_digests
            .entry(source.into())
            .or_default()
            .push(Sha256::digest(evidence).to_vec());
        self
    }

    pub fn encode(&self) -> anyhow::Result<Vec<u8>> {
        cbor::to_vec(self).context("couldn't encode reference value policy")
    }

    pub fn decode(encoded: &[u8]) -> anyhow::Result<Self> {
        cbor::from_slice(encoded).context("couldn't decode reference value policy")
    }
}

/// Compares the digest of each measurement's evidence with the reference
/// values listed for its source.
#[derive(Clone, Copy, Debug, Default)]
pub struct ReferenceValues;

impl PolicyEngine for ReferenceValues {
    fn evaluate(&self, measurement: &Measurement, policies: &[u8]) -> PolicyVerdict {
        if policies.is_empty() {
            return PolicyVerdict::reject("no reference values provided");
        }
        let policy = match ReferenceValuePolicy::decode(policies) {
            Ok(policy) => policy,
            Err(err) => return PolicyVerdict::reject(format!("{err:#}")),
        };
        let Some(accepted) = policy.accepted_digests.get(&measurement.source) else {
            return PolicyVerdict::reject(format!(
                "no reference values for source {}",
                measurement.source
            ));
        };

        let digest = Sha256::digest(&measurement.evidence);
        if accepted.iter().any(|candidate| candidate.as_slice() == digest.as_slice()) {
            PolicyVerdict::accept()
        } else {
            PolicyVerdict::reject(format!(
                "evidence digest {} of source {} matches no reference value",
                hex::encode(digest),
                measurement.source
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn measurement() -> Measurement {
        Measurement::new("dummy", b"OK".to_vec())
    }

    #[test]
    fn test_allow_all_accepts_anything() {
        assert!(AllowAll.evaluate(&measurement(), b"").success);
    }

    #[test]
    fn test_reference_values_accepts_known_digest() {
        let policies = ReferenceValuePolicy::default().accept("dummy", b"OK").encode().unwrap();
        assert_eq!(ReferenceValues.evaluate(&measurement(), &policies), PolicyVerdict::accept());
    }

    #[test]
    fn test_reference_values_rejects_unknown_digest() {
        let policies = ReferenceValuePolicy::default().accept("dummy", b"NOT OK").encode().unwrap();
        let verdict = ReferenceValues.evaluate(&measurement(), &policies);
        assert!(!verdict.success);
        assert!(verdict.details.unwrap().contains("matches no reference value"));
    }

    #[test]
    fn test_reference_values_rejects_unlisted_source() {
        let policies = ReferenceValuePolicy::default().accept("other", b"OK").encode().unwrap();
        assert!(!ReferenceValues.evaluate(&measurement(), &policies).success);
    }

    #[test]
    fn test_reference_values_rejects_missing_or_malformed_policies() {
        assert!(!ReferenceValues.evaluate(&measurement(), b"").success);
        assert!(!ReferenceValues.evaluate(&measurement(), &[0xFF, 0xFF]).success);
    }
}
