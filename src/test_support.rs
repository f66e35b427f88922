//! Helpers shared by the in-crate tests
//!
//! A [`TestClient`] plays the remote end of a chat connection: it writes raw
//! lines and waits for expected text, keeping whatever arrived past the match.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

/// How long any single expectation may wait
const EXPECT_TIMEOUT: Duration = Duration::from_secs(5);

pub struct TestClient<S> {
    stream: S,
    pending: String,
    /// Tail of a multi-byte character split across reads
    partial: Vec<u8>,
}

impl<S> TestClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            pending: String::new(),
            partial: Vec::new(),
        }
    }

    fn push_bytes(&mut self, bytes: &[u8]) {
        self.partial.extend_from_slice(bytes);
        let complete = match std::str::from_utf8(&self.partial) {
            Ok(_) => self.partial.len(),
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(_) => self.partial.len(),
        };
        let rest = self.partial.split_off(complete);
        self.pending.push_str(&String::from_utf8_lossy(&self.partial));
        self.partial = rest;
    }

    /// Read until `needle` arrives; return everything up to and including it.
    pub async fn expect(&mut self, needle: &str) -> String {
        let read = async {
            loop {
                if let Some(pos) = self.pending.find(needle) {
                    let end = pos + needle.len();
                    return self.pending.drain(..end).collect::<String>();
                }
                let mut buf = [0u8; 1024];
                let n = self.stream.read(&mut buf).await.expect("read failed");
                assert!(
                    n > 0,
                    "connection closed while waiting for {:?}, got {:?}",
                    needle,
                    self.pending
                );
                self.push_bytes(&buf[..n]);
            }
        };
        timeout(EXPECT_TIMEOUT, read)
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for {:?}", needle))
    }

    /// Read until the server closes the stream; return everything not yet consumed.
    pub async fn read_to_close(&mut self) -> String {
        let read = async {
            let mut rest = Vec::new();
            // A reset counts as closed
            let _ = self.stream.read_to_end(&mut rest).await;
            rest
        };
        let rest = timeout(EXPECT_TIMEOUT, read)
            .await
            .expect("timed out waiting for close");
        self.push_bytes(&rest);
        let mut out = std::mem::take(&mut self.pending);
        out.push_str(&String::from_utf8_lossy(&std::mem::take(&mut self.partial)));
        out
    }

    pub async fn send(&mut self, text: &str) {
        self.send_bytes(text.as_bytes()).await;
    }

    pub async fn send_bytes(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.expect("write failed");
    }
}
