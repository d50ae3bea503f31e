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

//! Implements the frame layer: every message is sent as a 4 byte big-endian
//! length prefix followed by exactly that many payload bytes.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::ChannelError;

pub type Length = u32;
pub const LENGTH_SIZE: usize = 4;
static_assertions::assert_eq_size!([u8; LENGTH_SIZE], Length);

/// Upper bound of a single underlying read while collecting a payload.
pub const CHUNK_SIZE: usize = 1024;

/// Writes `payload` prefixed with its length as one buffer, so the peer never
/// observes a prefix without the data that follows it.
pub async fn write_frame<W: AsyncWrite + Unpin + ?Sized>(
    writer: &mut W,
    payload: &[u8],
) -> Result<(), ChannelError> {
    if payload.is_empty() {
        return Err(ChannelError::Protocol("refusing to send a zero-length message".into()));
    }
    let length = Length::try_from(payload.len()).map_err(|_| {
        ChannelError::Protocol(format!(
            "message of {} bytes exceeds the maximum frame size",
            payload.len()
        ))
    })?;

    let mut buffer = Vec::with_capacity(LENGTH_SIZE + payload.len());
    buffer.extend_from_slice(&length.to_be_bytes());
    buffer.extend_from_slice(payload);

    writer.write_all(&buffer).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one complete frame and returns its payload.
///
/// The payload is collected in reads of at most [`CHUNK_SIZE`] bytes until the
/// announced length has arrived. A partially received payload is never
/// returned: any I/O failure, including the peer closing the stream early,
/// is reported as [`ChannelError::Transport`].
pub async fn read_frame<R: AsyncRead + Unpin + ?Sized>(
    reader: &mut R,
) -> Result<Vec<u8>, ChannelError> {
    let length: usize = {
        let mut length_bytes = [0; LENGTH_SIZE];
        reader.read_exact(&mut length_bytes).await?;
        Length::from_be_bytes(length_bytes)
            .try_into()
            .map_err(|_| ChannelError::Protocol("frame length doesn't fit in memory".into()))?
    };
    log::trace!("frame length: {}", length);

    if length == 0 {
        return Err(ChannelError::Protocol("zero-length message".into()));
    }

    // The buffer grows with the received data instead of trusting the length
    // prefix for a single up-front allocation.
    let mut payload = Vec::with_capacity(length.min(CHUNK_SIZE));
    let mut chunk = [0u8; CHUNK_SIZE];
    while payload.len() < length {
        let wanted = (length - payload.len()).min(CHUNK_SIZE);
        let received = reader.read(&mut chunk[..wanted]).await?;
        if received == 0 {
            return Err(ChannelError::Transport(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("stream closed after {} of {} payload bytes", payload.len(), length),
            )));
        }
        payload.extend_from_slice(&chunk[..received]);
    }

    Ok(payload)
}
