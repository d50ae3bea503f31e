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

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::policy::PolicyVerdict;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CheckResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl CheckResult {
    pub fn passed() -> Self {
        Self { success: true, details: None }
    }

    pub fn failed(details: impl Into<String>) -> Self {
        Self { success: false, details: Some(details.into()) }
    }

    /// A check that couldn't run because an earlier step produced no input
    /// for it. Counts as a failure.
    pub fn not_evaluated(reason: &str) -> Self {
        Self::failed(format!("not evaluated: {reason}"))
    }
}

impl From<anyhow::Result<()>> for CheckResult {
    fn from(result: anyhow::Result<()>) -> Self {
        match result {
            Ok(()) => Self::passed(),
            Err(err) => Self::failed(format!("{err:#}")),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct MeasurementResult {
    pub source: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl MeasurementResult {
    pub fn new(source: impl Into<String>, verdict: PolicyVerdict) -> Self {
        Self { source: source.into(), success: verdict.success, details: verdict.details }
    }
}

/// Outcome of verifying one report. Every class of check is kept so that a
/// caller can tell why verification failed.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    /// Logical AND of all the checks below.
    pub success: bool,
    /// The nonce embedded in the report, if it could be decoded.
    #[serde(with = "hex::serde")]
    pub nonce: Vec<u8>,
    pub report_check: CheckResult,
    pub certificate_check: CheckResult,
    pub signature_check: CheckResult,
    pub nonce_check: CheckResult,
    pub policy_check: CheckResult,
    pub measurements: Vec<MeasurementResult>,
}

impl VerificationResult {
    pub fn to_json(&self) -> anyhow::Result<Vec<u8>> {
        serde_json::to_vec(self).context("couldn't serialize verification result")
    }

    pub fn from_json(encoded: &[u8]) -> anyhow::Result<Self> {
        serde_json::from_slice(encoded).context("couldn't parse verification result")
    }
}
