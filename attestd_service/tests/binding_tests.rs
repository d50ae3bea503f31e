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

mod common;

use std::{os::unix::fs::PermissionsExt, time::Duration};

use attestd_channel::{
    envelope::{HashAlgorithm, Request, Response, TlsCertRequest, TlsSignRequest},
    frame::{read_frame, write_frame},
    EnvelopeChannel,
};
use attestd_service::{
    client::{Client, Connector, TcpConnector, UnixConnector},
    server::UnixSocketServer,
    Binding, TrustService,
};
use attestd_test_utils::TestPki;
use common::{service, Kind, Running};
use tokio::{
    io::{AsyncRead, AsyncWrite, AsyncWriteExt},
    net::{TcpStream, UnixStream},
};

async fn raw_stream(running: &Running) -> Box<dyn RawStream> {
    match &running.binding {
        Binding::Socket(path) => Box::new(UnixStream::connect(path).await.unwrap()),
        Binding::Network(address) => Box::new(TcpStream::connect(address).await.unwrap()),
    }
}

trait RawStream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<S: AsyncRead + AsyncWrite + Unpin + Send> RawStream for S {}

async fn assert_protocol_error_then_close(mut stream: Box<dyn RawStream>) {
    let response = Response::decode(&read_frame(&mut stream).await.unwrap()).unwrap();
    assert!(
        matches!(
            response,
            Response::Error(ref error) if error.message.starts_with("protocol error")
        ),
        "{response:?}"
    );
    assert!(read_frame(&mut stream).await.unwrap_err().is_eof());
}

#[tokio::test]
async fn test_unknown_tag_is_answered_and_closed() {
    let pki = TestPki::generate();
    for kind in [Kind::Socket, Kind::Network] {
        let running = Running::start(kind, service(&pki)).await;

        let mut stream = raw_stream(&running).await;
        write_frame(&mut stream, &[0xFF, 0xA0]).await.unwrap();
        assert_protocol_error_then_close(stream).await;

        // The server keeps serving other connections.
        assert_eq!(running.client.tls_cert(vec![]).await.unwrap().len(), 2);
        running.stop().await;
    }
}

#[tokio::test]
async fn test_zero_length_frame_is_answered_and_closed() {
    let pki = TestPki::generate();
    for kind in [Kind::Socket, Kind::Network] {
        let running = Running::start(kind, service(&pki)).await;

        let mut stream = raw_stream(&running).await;
        stream.write_all(&0u32.to_be_bytes()).await.unwrap();
        assert_protocol_error_then_close(stream).await;

        running.stop().await;
    }
}

#[tokio::test]
async fn test_network_connection_survives_application_errors() {
    let pki = TestPki::generate();
    let running = Running::start(Kind::Network, service(&pki)).await;
    let mut channel = EnvelopeChannel::new(raw_stream(&running).await);

    let bad_sign = Request::TlsSign(TlsSignRequest {
        content: vec![0; 5],
        hash_algorithm: HashAlgorithm::Sha256,
        signature_options: vec![],
    });
    channel.write_request(&bad_sign).await.unwrap();
    assert!(matches!(channel.read_response().await.unwrap(), Response::Error(_)));

    channel.write_request(&Request::TlsCert(TlsCertRequest::default())).await.unwrap();
    assert!(matches!(channel.read_response().await.unwrap(), Response::TlsCert(_)));

    running.stop().await;
}

#[tokio::test]
async fn test_socket_connection_serves_one_request() {
    let pki = TestPki::generate();
    let running = Running::start(Kind::Socket, service(&pki)).await;
    let mut channel = EnvelopeChannel::new(raw_stream(&running).await);

    channel.write_request(&Request::TlsCert(TlsCertRequest::default())).await.unwrap();
    assert!(matches!(channel.read_response().await.unwrap(), Response::TlsCert(_)));
    assert!(channel.read_response().await.unwrap_err().is_eof());

    running.stop().await;
}

#[tokio::test]
async fn test_socket_file_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run").join("attestd.sock");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    // A listener dropped without cleanup leaves its socket file behind.
    drop(std::os::unix::net::UnixListener::bind(&path).unwrap());
    assert!(path.exists());

    let server = UnixSocketServer::bind(&path).await.unwrap();
    let mode = std::fs::metadata(&path).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o666);

    let pki = TestPki::generate();
    let cancellation_token = tokio_util::sync::CancellationToken::new();
    let serving = tokio::spawn(server.serve(service(&pki), cancellation_token.clone()));
    let client = Client::new(UnixConnector::new(&path));
    assert_eq!(client.tls_cert(vec![]).await.unwrap().len(), 2);

    cancellation_token.cancel();
    serving.await.unwrap().unwrap();
    assert!(!path.exists());
}

#[tokio::test]
async fn test_bind_leaves_other_files_alone() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("attestd.sock");
    std::fs::write(&path, b"not a socket").unwrap();

    let error = UnixSocketServer::bind(&path).await.err().unwrap();
    assert!(error.to_string().contains("is not a socket"), "{error:#}");
    assert_eq!(std::fs::read(&path).unwrap(), b"not a socket");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stalled_connection_does_not_block_others() {
    let pki = TestPki::generate();
    for kind in [Kind::Socket, Kind::Network] {
        let running = Running::start(kind, service(&pki)).await;

        // Half a length prefix: the server waits for the rest indefinitely.
        let mut stalled = raw_stream(&running).await;
        stalled.write_all(&[0, 0]).await.unwrap();
        stalled.flush().await.unwrap();

        let chain = tokio::time::timeout(Duration::from_secs(5), running.client.tls_cert(vec![]))
            .await
            .expect("request behind a stalled connection timed out")
            .unwrap();
        assert_eq!(chain.len(), 2);

        drop(stalled);
        running.stop().await;
    }
}

#[tokio::test]
async fn test_connection_failures_are_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let error = UnixConnector::new(dir.path().join("missing.sock")).connect().await.unwrap_err();
    assert!(error.is_connection_fatal());

    let running = Running::start(Kind::Network, service(&TestPki::generate())).await;
    let address = match &running.binding {
        Binding::Network(address) => address.clone(),
        Binding::Socket(_) => unreachable!(),
    };
    running.stop().await;
    // Non-routable address: the dial either times out or is refused.
    let connector = TcpConnector::new("10.255.255.1:9955").with_timeout(Duration::from_millis(100));
    assert!(connector.connect().await.unwrap_err().is_connection_fatal());

    let client = Client::new(TcpConnector::new(address));
    let error = client.tls_cert(vec![]).await.unwrap_err();
    assert!(error.is_connection_fatal(), "{error:?}");
}
