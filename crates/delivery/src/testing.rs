//! Test support: a minimal mock HTTP endpoint built on raw tokio sockets.

use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// A mock customer endpoint that returns canned responses.
pub(crate) struct MockEndpoint {
    listener: tokio::net::TcpListener,
    pub(crate) url: String,
}

impl MockEndpoint {
    pub(crate) async fn start() -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind mock endpoint");
        let port = listener.local_addr().unwrap().port();
        let url = format!("http://127.0.0.1:{port}/hook");
        Self { listener, url }
    }

    /// Accept one connection and respond with the given status and body,
    /// then shut down. Returns the raw request bytes.
    pub(crate) async fn respond_once(self, status_code: u16, body: &str) -> Vec<u8> {
        let (mut stream, _) = self.listener.accept().await.unwrap();
        respond(&mut stream, status_code, body).await
    }

    /// Accept sequential connections, answering each with the paired status
    /// and body.
    pub(crate) async fn respond_sequence(self, responses: Vec<(u16, String)>) {
        for (status_code, body) in responses {
            let (mut stream, _) = self.listener.accept().await.unwrap();
            respond(&mut stream, status_code, &body).await;
        }
    }

    /// Accept one connection and never answer it.
    pub(crate) async fn accept_and_stall(self) {
        let (_stream, _) = self.listener.accept().await.unwrap();
        // Hold the connection open until the test drops the future.
        std::future::pending::<()>().await;
    }
}

async fn respond(stream: &mut tokio::net::TcpStream, status_code: u16, body: &str) -> Vec<u8> {
    let mut buf = vec![0u8; 16384];
    let n = stream.read(&mut buf).await.unwrap();
    buf.truncate(n);

    let response = format!(
        "HTTP/1.1 {status_code} X\r\n\
         Content-Type: application/json\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {body}",
        body.len()
    );
    stream.write_all(response.as_bytes()).await.unwrap();
    stream.shutdown().await.unwrap();

    buf
}
