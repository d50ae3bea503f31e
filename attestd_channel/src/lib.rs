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

//! Wire protocol shared by every attestd transport binding.
//!
//! A connection carries a sequence of frames (see [`frame`]), and every frame
//! carries exactly one envelope (see [`envelope`]).

pub mod envelope;
pub mod frame;


use tokio::io::{AsyncRead, AsyncWrite};

use crate::envelope::{Request, Response};

/// Errors that make a connection unusable.
///
/// Application level failures are not represented here: they travel as
/// [`Response::Error`] envelopes over a healthy connection.
#[derive(thiserror::Error, Debug)]
pub enum ChannelError {
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl ChannelError {
    /// Whether the peer closed the stream, as opposed to a genuine I/O failure.
    pub fn is_eof(&self) -> bool {
        matches!(
            self,
            ChannelError::Transport(err) if err.kind() == std::io::ErrorKind::UnexpectedEof
        )
    }
}

/// Sends and receives envelopes over a byte stream.
pub struct EnvelopeChannel<S> {
    inner: S,
}

impl<S: AsyncRead + AsyncWrite + Unpin> EnvelopeChannel<S> {
    pub fn new(stream: S) -> Self {
        Self { inner: stream }
    }

    pub async fn read_request(&mut self) -> Result<Request, ChannelError> {
        let payload = frame::read_frame(&mut self.inner).await?;
        Request::decode(&payload)
    }

    pub async fn write_request(&mut self, request: &Request) -> Result<(), ChannelError> {
        frame::write_frame(&mut self.inner, &request.encode()?).await
    }

    pub async fn read_response(&mut self) -> Result<Response, ChannelError> {
        let payload = frame::read_frame(&mut self.inner).await?;
        Response::decode(&payload)
    }

    pub async fn write_response(&mut self, response: &Response) -> Result<(), ChannelError> {
        frame::write_frame(&mut self.inner, &response.encode()?).await
    }
}
