use std::fmt;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite};

/// Readable end of a command's standard output or standard error
pub type PipeReader = Box<dyn AsyncRead + Send + Unpin>;

/// Writable end of a command's standard input
pub type PipeWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// In-memory standard input handed out by the test doubles.
///
/// Every clone appends to the same buffer, so a test can keep one clone and
/// inspect what the code under test wrote to the pipe.
#[derive(Clone, Default)]
pub struct CapturedInput(Arc<Mutex<Vec<u8>>>);

impl CapturedInput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far
    pub fn contents(&self) -> Vec<u8> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn writer(&self) -> PipeWriter {
        Box::new(self.clone())
    }
}

impl fmt::Debug for CapturedInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CapturedInput")
            .field(&self.contents().len())
            .finish()
    }
}

impl AsyncWrite for CapturedInput {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}
