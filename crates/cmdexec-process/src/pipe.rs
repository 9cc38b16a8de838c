use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::oneshot;

enum State<T> {
    Pending(oneshot::Receiver<T>),
    Ready(T),
    Closed,
}

/// A child pipe requested before the child exists.
///
/// The handle is returned to the caller right away; the real pipe is sent
/// through the channel when the process is spawned. Until then reads and
/// writes wait. If the command is dropped without starting, reads see EOF
/// and writes fail with `BrokenPipe`.
pub(crate) struct DeferredPipe<T> {
    state: State<T>,
}

impl<T> DeferredPipe<T> {
    pub(crate) fn channel() -> (oneshot::Sender<T>, Self) {
        let (tx, rx) = oneshot::channel();
        (
            tx,
            Self {
                state: State::Pending(rx),
            },
        )
    }

    fn poll_pipe(&mut self, cx: &mut Context<'_>) -> Poll<Option<&mut T>> {
        if let State::Pending(rx) = &mut self.state {
            let delivered = ready!(Pin::new(rx).poll(cx));
            self.state = match delivered {
                Ok(pipe) => State::Ready(pipe),
                Err(_) => State::Closed,
            };
        }
        match &mut self.state {
            State::Ready(pipe) => Poll::Ready(Some(pipe)),
            _ => Poll::Ready(None),
        }
    }
}

impl<T: AsyncRead + Unpin> AsyncRead for DeferredPipe<T> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match ready!(self.get_mut().poll_pipe(cx)) {
            Some(pipe) => Pin::new(pipe).poll_read(cx, buf),
            None => Poll::Ready(Ok(())),
        }
    }
}

impl<T: AsyncWrite + Unpin> AsyncWrite for DeferredPipe<T> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match ready!(self.get_mut().poll_pipe(cx)) {
            Some(pipe) => Pin::new(pipe).poll_write(cx, buf),
            None => Poll::Ready(Err(std::io::ErrorKind::BrokenPipe.into())),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match &mut self.get_mut().state {
            State::Ready(pipe) => Pin::new(pipe).poll_flush(cx),
            _ => Poll::Ready(Ok(())),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();
        match &mut this.state {
            State::Ready(pipe) => Pin::new(pipe).poll_shutdown(cx),
            State::Pending(_) => {
                // dropping the receiver closes the child's stdin as soon as it is spawned
                this.state = State::Closed;
                Poll::Ready(Ok(()))
            }
            State::Closed => Poll::Ready(Ok(())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_read_waits_for_pipe() {
        let (tx, mut pipe) = DeferredPipe::channel();

        let reader = tokio::spawn(async move {
            let mut buf = String::new();
            pipe.read_to_string(&mut buf).await.map(|_| buf)
        });

        tx.send(std::io::Cursor::new(b"late data".to_vec())).unwrap();
        assert_eq!(reader.await.unwrap().unwrap(), "late data");
    }

    #[tokio::test]
    async fn test_dropped_sender_reads_eof() {
        let (tx, mut pipe) = DeferredPipe::<std::io::Cursor<Vec<u8>>>::channel();
        drop(tx);

        let mut buf = Vec::new();
        assert_eq!(pipe.read_to_end(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_dropped_sender_breaks_writes() {
        let (tx, mut pipe) = DeferredPipe::<Vec<u8>>::channel();
        drop(tx);

        let error = pipe.write_all(b"lost").await.unwrap_err();
        assert_eq!(error.kind(), std::io::ErrorKind::BrokenPipe);
    }

    #[tokio::test]
    async fn test_write_after_delivery() {
        let (tx, mut pipe) = DeferredPipe::<Vec<u8>>::channel();
        tx.send(Vec::new()).unwrap();

        pipe.write_all(b"hello").await.unwrap();
        pipe.flush().await.unwrap();
        match &pipe.state {
            State::Ready(buf) => assert_eq!(buf, b"hello"),
            _ => panic!("pipe should be ready"),
        }
    }
}
