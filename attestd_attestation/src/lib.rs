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

//! Attestation report engine.
//!
//! Reports are generated from pluggable [`measurement::MeasurementSource`]s,
//! signed by a [`signer::Signer`] delegate that never exposes its key, and
//! verified against a trusted CA and a pluggable [`policy::PolicyEngine`].

pub mod cbor;
pub mod certificate;
pub mod measurement;
pub mod policy;
pub mod report;
pub mod results;
pub mod signer;
pub mod verifier;

pub use report::{generate, sign};
pub use verifier::verify;
