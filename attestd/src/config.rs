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

//! Daemon configuration file.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context;
use attestd_attestation::{
    certificate::{parse_certificate, parse_pem_bundle, Certificate, CertificateChain},
    measurement::{FileDigestSource, MeasurementSource},
    policy::{AllowAll, PolicyEngine, ReferenceValues},
    report::CborSerializer,
    signer::{Signer, SoftwareSigner},
};
use attestd_service::{Binding, ServiceConfig, DEFAULT_NETWORK_ADDRESS, DEFAULT_SOCKET_PATH};
use serde::{de::DeserializeOwned, Deserialize};

#[derive(Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "camelCase")]
pub enum BindingKind {
    #[default]
    Socket,
    Network,
}

#[derive(Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum PolicyEngineKind {
    AllowAll,
    #[default]
    ReferenceValues,
}

#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MeasurementSourceConfig {
    FileDigest { name: String, paths: Vec<PathBuf> },
}

#[derive(Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CertificatePaths {
    pub leaf: Option<PathBuf>,
    /// Each file may hold several PEM certificates.
    #[serde(default)]
    pub intermediates: Vec<PathBuf>,
    pub ca: Option<PathBuf>,
}

#[derive(Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DaemonConfig {
    #[serde(default)]
    pub binding: BindingKind,
    /// Socket path or `host:port`, depending on `binding`.
    pub address: Option<String>,
    /// PKCS#8 PEM encoded P-256 private key.
    pub signing_key: Option<PathBuf>,
    #[serde(default)]
    pub certificates: CertificatePaths,
    #[serde(default)]
    pub measurement_sources: Vec<MeasurementSourceConfig>,
    #[serde(default)]
    pub policy_engine: PolicyEngineKind,
}

/// Parses a JSON file. Used as a `clap` value parser.
pub fn load_json<T: DeserializeOwned>(path: &str) -> anyhow::Result<T> {
    let contents = std::fs::read(path).with_context(|| format!("couldn't read {path}"))?;
    serde_json::from_slice(&contents).with_context(|| format!("couldn't parse {path}"))
}

impl DaemonConfig {
    pub fn binding(&self) -> Binding {
        match self.binding {
            BindingKind::Socket => Binding::Socket(PathBuf::from(
                self.address.as_deref().unwrap_or(DEFAULT_SOCKET_PATH),
            )),
            BindingKind::Network => Binding::Network(
                self.address.clone().unwrap_or_else(|| DEFAULT_NETWORK_ADDRESS.to_owned()),
            ),
        }
    }

    /// Loads keys and certificates and instantiates the configured sources
    /// and policy engine.
    pub fn load_service_config(&self) -> anyhow::Result<ServiceConfig> {
        let measurement_sources = self
            .measurement_sources
            .iter()
            .map(|source| -> Arc<dyn MeasurementSource> {
                match source {
                    MeasurementSourceConfig::FileDigest { name, paths } => {
                        Arc::new(FileDigestSource::new(name.clone(), paths.clone()))
                    }
                }
            })
            .collect();
        let policy_engine: Arc<dyn PolicyEngine> = match self.policy_engine {
            PolicyEngineKind::AllowAll => {
                log::warn!("policy engine accepts every measurement");
                Arc::new(AllowAll)
            }
            PolicyEngineKind::ReferenceValues => Arc::new(ReferenceValues),
        };

        Ok(ServiceConfig {
            measurement_sources,
            policy_engine,
            signer: self.load_signer()?,
            serializer: Arc::new(CborSerializer),
        })
    }

    fn load_signer(&self) -> anyhow::Result<Option<Arc<dyn Signer>>> {
        let Some(key_path) = &self.signing_key else {
            log::warn!("no signing key configured, only verification is available");
            return Ok(None);
        };

        let certificates = &self.certificates;
        let leaf = certificates.leaf.as_deref().map(load_certificate).transpose()?;
        let intermediates = certificates
            .intermediates
            .iter()
            .map(|path| load_bundle(path))
            .collect::<anyhow::Result<Vec<_>>>()?
            .into_iter()
            .flatten()
            .collect();
        let ca = certificates.ca.as_deref().map(load_certificate).transpose()?;
        let chain = CertificateChain::new(leaf, intermediates, ca);
        if chain.leaf().is_none() {
            log::warn!("no leaf certificate configured, attestation is unavailable");
        }

        let key = std::fs::read_to_string(key_path)
            .with_context(|| format!("couldn't read {}", key_path.display()))?;
        let signer = SoftwareSigner::from_pkcs8_pem(&key, chain)
            .with_context(|| format!("couldn't load signing key {}", key_path.display()))?;
        Ok(Some(Arc::new(signer)))
    }
}

fn load_certificate(path: &Path) -> anyhow::Result<Certificate> {
    let encoded =
        std::fs::read(path).with_context(|| format!("couldn't read {}", path.display()))?;
    parse_certificate(&encoded).with_context(|| format!("couldn't parse {}", path.display()))
}

fn load_bundle(path: &Path) -> anyhow::Result<Vec<Certificate>> {
    let encoded =
        std::fs::read(path).with_context(|| format!("couldn't read {}", path.display()))?;
    parse_pem_bundle(&encoded).with_context(|| format!("couldn't parse {}", path.display()))
}

#[cfg(test)]
mod tests {
    use attestd_test_utils::TestPki;

    use super::*;

    #[test]
    fn test_defaults() {
        let config: DaemonConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.binding(), Binding::Socket(PathBuf::from(DEFAULT_SOCKET_PATH)));
        assert_eq!(config.policy_engine, PolicyEngineKind::ReferenceValues);

        let config = DaemonConfig { binding: BindingKind::Network, ..Default::default() };
        assert_eq!(config.binding(), Binding::Network(DEFAULT_NETWORK_ADDRESS.to_owned()));
    }

    #[test]
    fn test_rejects_unknown_keys() {
        assert!(serde_json::from_str::<DaemonConfig>(r#"{"bindng": "network"}"#).is_err());
    }

    #[test]
    fn test_loads_full_config() {
        let dir = tempfile::tempdir().unwrap();
        let pki = TestPki::generate();
        pki.write_to(dir.path());
        let path = |name: &str| dir.path().join(name).display().to_string();
        let json = format!(
            r#"{{
                "binding": "network",
                "address": "127.0.0.1:0",
                "signingKey": "{key}",
                "certificates": {{
                    "leaf": "{leaf}",
                    "intermediates": ["{intermediate}"],
                    "ca": "{ca}"
                }},
                "measurementSources": [
                    {{ "type": "fileDigest", "name": "keys", "paths": ["{key}"] }}
                ],
                "policyEngine": "allowAll"
            }}"#,
            key = path("key.pem"),
            leaf = path("leaf.pem"),
            intermediate = path("intermediate.pem"),
            ca = path("ca.pem"),
        );
        std::fs::write(dir.path().join("attestd.json"), json).unwrap();

        let config: DaemonConfig = load_json(&path("attestd.json")).unwrap();
        assert_eq!(config.binding(), Binding::Network("127.0.0.1:0".to_owned()));
        assert_eq!(config.policy_engine, PolicyEngineKind::AllowAll);

        let service_config = config.load_service_config().unwrap();
        assert_eq!(service_config.measurement_sources.len(), 1);
        assert_eq!(service_config.measurement_sources[0].name(), "keys");
        let signer = service_config.signer.unwrap();
        assert_eq!(signer.certificate_chain().intermediates().len(), 1);
        assert!(signer.certificate_chain().ca().is_some());
        assert_eq!(signer.certificate_chain().to_pem_chain().unwrap().len(), 2);
    }

    #[test]
    fn test_without_signing_key() {
        let config = DaemonConfig::default();
        assert!(config.load_service_config().unwrap().signer.is_none());
    }

    #[test]
    fn test_key_must_match_leaf() {
        let dir = tempfile::tempdir().unwrap();
        let pki = TestPki::generate();
        pki.write_to(dir.path());
        let other = TestPki::generate();
        std::fs::write(dir.path().join("other.pem"), &other.leaf_pem).unwrap();

        let config = DaemonConfig {
            signing_key: Some(dir.path().join("key.pem")),
            certificates: CertificatePaths {
                leaf: Some(dir.path().join("other.pem")),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.load_service_config().is_err());
    }
}
