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

//! Implements the envelope layer that sits on top of a frame: a single
//! operation tag byte followed by the CBOR encoded request or response body.

use core::fmt;
use std::io::Cursor;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_with::{serde_as, Bytes};

use crate::ChannelError;

/// Identifies the schema of an envelope body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum OperationTag {
    Attest = 0x01,
    Verify = 0x02,
    TlsSign = 0x03,
    TlsCert = 0x04,
    /// Only valid in responses.
    Error = 0x05,
}

impl TryFrom<u8> for OperationTag {
    type Error = ChannelError;

    fn try_from(value: u8) -> Result<Self, ChannelError> {
        match value {
            0x01 => Ok(OperationTag::Attest),
            0x02 => Ok(OperationTag::Verify),
            0x03 => Ok(OperationTag::TlsSign),
            0x04 => Ok(OperationTag::TlsCert),
            0x05 => Ok(OperationTag::Error),
            unknown => Err(ChannelError::Protocol(format!("unknown operation tag {unknown:#04x}"))),
        }
    }
}

impl fmt::Display for OperationTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationTag::Attest => "ATTEST",
            OperationTag::Verify => "VERIFY",
            OperationTag::TlsSign => "TLS_SIGN",
            OperationTag::TlsCert => "TLS_CERT",
            OperationTag::Error => "ERROR",
        };
        f.write_str(name)
    }
}

#[serde_as]
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct AttestationRequest {
    #[serde_as(as = "Bytes")]
    pub nonce: Vec<u8>,
}

#[serde_as]
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct AttestationResponse {
    /// Serialized signed attestation report.
    #[serde_as(as = "Bytes")]
    pub report: Vec<u8>,
}

#[serde_as]
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VerificationRequest {
    #[serde_as(as = "Bytes")]
    pub report: Vec<u8>,
    /// The nonce the verifier expects to find embedded in the report.
    #[serde_as(as = "Bytes")]
    pub nonce: Vec<u8>,
    /// PEM or DER encoded root certificate the report signer must chain to.
    #[serde_as(as = "Bytes")]
    pub trusted_ca: Vec<u8>,
    /// Opaque input for the configured policy engine.
    #[serde_as(as = "Bytes")]
    pub policies: Vec<u8>,
}

#[serde_as]
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct VerificationResponse {
    /// JSON serialized verification result.
    #[serde_as(as = "Bytes")]
    pub result: Vec<u8>,
}

/// Hash function that produced the content of a [`TlsSignRequest`].
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum HashAlgorithm {
    #[default]
    #[serde(rename = "SHA-256")]
    Sha256,
    #[serde(rename = "SHA-384")]
    Sha384,
    #[serde(rename = "SHA-512")]
    Sha512,
}

#[serde_as]
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TlsSignRequest {
    /// Digest to be signed, typically of a TLS handshake transcript.
    #[serde_as(as = "Bytes")]
    pub content: Vec<u8>,
    pub hash_algorithm: HashAlgorithm,
    /// CBOR encoded [`SignatureOptions`], empty for defaults.
    #[serde_as(as = "Bytes")]
    pub signature_options: Vec<u8>,
}

/// Signature scheme parameters carried inside
/// [`TlsSignRequest::signature_options`].
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SignatureOptions {
    /// Requests an RSASSA-PSS signature with the given salt length.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pss_salt_length: Option<i64>,
}

impl SignatureOptions {
    pub fn decode(encoded: &[u8]) -> Result<Self, ChannelError> {
        if encoded.is_empty() {
            return Ok(Self::default());
        }
        ciborium::from_reader(encoded)
            .map_err(|err| ChannelError::Protocol(format!("malformed signature options: {err}")))
    }

    pub fn encode(&self) -> Result<Vec<u8>, ChannelError> {
        let mut encoded = Vec::new();
        ciborium::into_writer(self, &mut encoded)
            .map_err(|err| {
                ChannelError::Protocol(format!("couldn't encode signature options: {err}"))
            })?;
        Ok(encoded)
    }
}

#[serde_as]
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct TlsSignResponse {
    #[serde_as(as = "Bytes")]
    pub signature: Vec<u8>,
}

#[serde_as]
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct TlsCertRequest {
    /// Reserved for selecting between several identities; currently only
    /// logged.
    #[serde_as(as = "Bytes")]
    pub id: Vec<u8>,
}

#[serde_as]
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TlsCertResponse {
    /// PEM encoded certificates, leaf first.
    #[serde_as(as = "Vec<Bytes>")]
    pub certificate_chain: Vec<Vec<u8>>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct ErrorResponse {
    pub message: String,
}

/// A request envelope. Exactly one variant per operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Request {
    Attest(AttestationRequest),
    Verify(VerificationRequest),
    TlsSign(TlsSignRequest),
    TlsCert(TlsCertRequest),
}

impl Request {
    pub fn tag(&self) -> OperationTag {
        match self {
            Request::Attest(_) => OperationTag::Attest,
            Request::Verify(_) => OperationTag::Verify,
            Request::TlsSign(_) => OperationTag::TlsSign,
            Request::TlsCert(_) => OperationTag::TlsCert,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, ChannelError> {
        match self {
            Request::Attest(body) => encode_envelope(self.tag(), body),
            Request::Verify(body) => encode_envelope(self.tag(), body),
            Request::TlsSign(body) => encode_envelope(self.tag(), body),
            Request::TlsCert(body) => encode_envelope(self.tag(), body),
        }
    }

    pub fn decode(payload: &[u8]) -> Result<Self, ChannelError> {
        let (tag, body) = split_envelope(payload)?;
        match tag {
            OperationTag::Attest => decode_body(tag, body).map(Request::Attest),
            OperationTag::Verify => decode_body(tag, body).map(Request::Verify),
            OperationTag::TlsSign => decode_body(tag, body).map(Request::TlsSign),
            OperationTag::TlsCert => decode_body(tag, body).map(Request::TlsCert),
            OperationTag::Error => {
                Err(ChannelError::Protocol("ERROR tag is not allowed in requests".into()))
            }
        }
    }
}

/// A response envelope: either the result of the requested operation or an
/// application level error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Response {
    Attest(AttestationResponse),
    Verify(VerificationResponse),
    TlsSign(TlsSignResponse),
    TlsCert(TlsCertResponse),
    Error(ErrorResponse),
}

impl Response {
    pub fn error(message: impl Into<String>) -> Self {
        Response::Error(ErrorResponse { message: message.into() })
    }

    pub fn tag(&self) -> OperationTag {
        match self {
            Response::Attest(_) => OperationTag::Attest,
            Response::Verify(_) => OperationTag::Verify,
            Response::TlsSign(_) => OperationTag::TlsSign,
            Response::TlsCert(_) => OperationTag::TlsCert,
            Response::Error(_) => OperationTag::Error,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, ChannelError> {
        match self {
            Response::Attest(body) => encode_envelope(self.tag(), body),
            Response::Verify(body) => encode_envelope(self.tag(), body),
            Response::TlsSign(body) => encode_envelope(self.tag(), body),
            Response::TlsCert(body) => encode_envelope(self.tag(), body),
            Response::Error(body) => encode_envelope(self.tag(), body),
        }
    }

    pub fn decode(payload: &[u8]) -> Result<Self, ChannelError> {
        let (tag, body) = split_envelope(payload)?;
        match tag {
            OperationTag::Attest => decode_body(tag, body).map(Response::Attest),
            OperationTag::Verify => decode_body(tag, body).map(Response::Verify),
            OperationTag::TlsSign => decode_body(tag, body).map(Response::TlsSign),
            OperationTag::TlsCert => decode_body(tag, body).map(Response::TlsCert),
            OperationTag::Error => decode_body(tag, body).map(Response::Error),
        }
    }
}

fn encode_envelope<T: Serialize>(tag: OperationTag, body: &T) -> Result<Vec<u8>, ChannelError> {
    let mut envelope = vec![tag as u8];
    ciborium::into_writer(body, &mut envelope)
        .map_err(|err| ChannelError::Protocol(format!("couldn't encode {tag} body: {err}")))?;
    Ok(envelope)
}

fn split_envelope(payload: &[u8]) -> Result<(OperationTag, &[u8]), ChannelError> {
    let (tag, body) =
        payload.split_first().ok_or(ChannelError::Protocol("empty envelope".into()))?;
    Ok((OperationTag::try_from(*tag)?, body))
}

/// Decodes `body`, which must hold exactly one CBOR item.
fn decode_body<T: DeserializeOwned>(tag: OperationTag, body: &[u8]) -> Result<T, ChannelError> {
    let mut reader = Cursor::new(body);
    let decoded = ciborium::from_reader(&mut reader)
        .map_err(|err| ChannelError::Protocol(format!("malformed {tag} body: {err}")))?;
    let trailing = body.len() as u64 - reader.position();
    if trailing != 0 {
        return Err(ChannelError::Protocol(format!(
            "{trailing} trailing bytes after {tag} body"
        )));
    }
    Ok(decoded)
}
