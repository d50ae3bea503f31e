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

//! CBOR encoding of reports, evidence and policies.

use std::io::Cursor;

use anyhow::{ensure, Context};
use serde::{de::DeserializeOwned, Serialize};

/// Encodes `value`. Struct fields keep declaration order and maps are
/// ordered, so equal values always encode to equal bytes.
pub fn to_vec<T: Serialize>(value: &T) -> anyhow::Result<Vec<u8>> {
    let mut encoded = Vec::new();
    ciborium::into_writer(value, &mut encoded).context("couldn't encode CBOR")?;
    Ok(encoded)
}

/// Decodes a single CBOR item that must span all of `encoded`.
pub fn from_slice<T: DeserializeOwned>(encoded: &[u8]) -> anyhow::Result<T> {
    let mut reader = Cursor::new(encoded);
    let value = ciborium::from_reader(&mut reader).context("couldn't decode CBOR")?;
    let trailing = encoded.len() as u64 - reader.position();
    ensure!(trailing == 0, "{trailing} trailing bytes after CBOR item");
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_bytes_are_rejected() {
        let mut encoded = to_vec(&vec![1u32, 2, 3]).unwrap();
        assert_eq!(from_slice::<Vec<u32>>(&encoded).unwrap(), vec![1, 2, 3]);

        encoded.extend_from_slice(&[0xFF, 0xFF]);
        let error = from_slice::<Vec<u32>>(&encoded).unwrap_err();
        assert_eq!(error.to_string(), "2 trailing bytes after CBOR item");
    }
}
