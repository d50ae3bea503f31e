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

use std::{collections::BTreeMap, path::PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, Bytes};
use sha2::{Digest, Sha256};

use crate::cbor;

/// Evidence contributed by a single measurement source.
///
/// The report engine treats the evidence as opaque. Parameters are kept in a
/// sorted map so that their encoding does not depend on insertion order.
#[serde_as]
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Measurement {
    pub source: String,
    #[serde_as(as = "Bytes")]
    pub evidence: Vec<u8>,
    #[serde_as(as = "BTreeMap<_, Bytes>")]
    pub parameters: BTreeMap<String, Vec<u8>>,
}

impl Measurement {
    pub fn new(source: impl Into<String>, evidence: Vec<u8>) -> Self {
        Self { source: source.into(), evidence, parameters: BTreeMap::new() }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }
}

/// A provider of platform evidence, e.g. a TPM quote.
///
/// Called once per attestation request; implementations must not cache
/// evidence across requests. A failure must be reported as an error rather
/// than as an empty measurement.
pub trait MeasurementSource: Send + Sync {
    fn name(&self) -> &str;

    fn collect(&self, nonce: &[u8]) -> anyhow::Result<Measurement>;
}

#[serde_as]
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct FileDigest {
    pub path: String,
    #[serde_as(as = "Bytes")]
    pub sha256: Vec<u8>,
}

/// Measures a fixed, ordered list of files by their SHA-256 digest.
pub struct FileDigestSource {
    name: String,
    paths: Vec<PathBuf>,
}

impl FileDigestSource {
    pub fn new(name: impl Into<String>, paths: Vec<PathBuf>) -> Self {
        Self { name: name.into(), paths }
    }

    pub fn decode_evidence(evidence: &[u8]) -> anyhow::Result<Vec<FileDigest>> {
        cbor::from_slice(evidence).context("couldn't decode file digest evidence")
    }
}

impl MeasurementSource for FileDigestSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn collect(&self, _nonce: &[u8]) -> anyhow::Result<Measurement> {
        let digests = self
            .paths
            .iter()
            .map(|path| {
                let contents = std::fs::read(path)
                    .with_context(|| format!("couldn't read {}", path.display()))?;
                Ok(FileDigest {
                    path: path.display().to_string(),
                    sha256: Sha256::digest(&contents).to_vec(),
                })
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        let evidence = cbor::to_vec(&digests).context("couldn't encode file digests")?;
        Ok(Measurement::new(self.name.clone(), evidence).with_parameter("hashAlgorithm", "SHA-256"))
    }
}
