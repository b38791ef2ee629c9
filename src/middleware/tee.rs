//! Passive body taps.
//!
//! [`TeeBody`] sits between a body and whoever polls it and copies every
//! data frame into a side writer on the way through. Frames, errors, end of
//! stream and size hints are forwarded untouched. Dropping the tee drops the
//! wrapped body once and leaves the side writer alone.

use std::io::Write;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use axum::{body::Body as AxumBody, extract::Request, response::Response};
use bytes::Bytes;
use http_body::{Body, Frame, SizeHint};

pub struct TeeBody<B, W> {
    inner: B,
    sink: W,
}

impl<B, W> TeeBody<B, W> {
    pub fn new(inner: B, sink: W) -> Self {
        Self { inner, sink }
    }
}

impl<B, W> Body for TeeBody<B, W>
where
    B: Body<Data = Bytes> + Unpin,
    W: Write + Unpin,
{
    type Data = Bytes;
    type Error = B::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = &mut *self;
        let frame = ready!(Pin::new(&mut this.inner).poll_frame(cx));

        if let Some(Ok(frame)) = &frame {
            if let Some(data) = frame.data_ref() {
                if !data.is_empty() {
                    // sink errors are dropped
                    let _ = this.sink.write_all(data);
                }
            }
        }

        Poll::Ready(frame)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

/// Replaces the request body with a tee that copies everything downstream
/// reads into `sink`.
pub fn tap_request<W>(request: Request, sink: W) -> Request
where
    W: Write + Unpin + Send + 'static,
{
    request.map(|body| AxumBody::new(TeeBody::new(body, sink)))
}

/// Replaces the response body with a tee that copies everything written to
/// the client into `sink`. Status, headers and extensions stay as they are.
pub fn tap_response<W>(response: Response, sink: W) -> Response
where
    W: Write + Unpin + Send + 'static,
{
    response.map(|body| AxumBody::new(TeeBody::new(body, sink)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;
    use futures::stream;
    use http_body_util::{BodyExt, Full, StreamBody};
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FailingWriter;

    impl Write for FailingWriter {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink closed"))
        }
    }

    struct DropCounted {
        inner: Full<Bytes>,
        drops: Arc<AtomicUsize>,
    }

    impl Body for DropCounted {
        type Data = Bytes;
        type Error = std::convert::Infallible;

        fn poll_frame(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
        ) -> Poll<Option<Result<Frame<Bytes>, Self::Error>>> {
            Pin::new(&mut self.inner).poll_frame(cx)
        }
    }

    impl Drop for DropCounted {
        fn drop(&mut self) {
            self.drops.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn chunked(
        chunks: Vec<Result<&'static str, io::Error>>,
    ) -> impl Body<Data = Bytes, Error = io::Error> + Unpin {
        StreamBody::new(stream::iter(
            chunks
                .into_iter()
                .map(|c| c.map(|s| Frame::data(Bytes::from_static(s.as_bytes())))),
        ))
    }

    #[tokio::test]
    async fn forwards_data_and_copies_each_chunk() {
        let sink = MemorySink::new();
        let body = chunked(vec![Ok("hello "), Ok(""), Ok("world")]);

        let collected = TeeBody::new(body, sink.clone())
            .collect()
            .await
            .unwrap()
            .to_bytes();

        assert_eq!(collected, Bytes::from("hello world"));
        assert_eq!(sink.contents(), "hello world");
    }

    #[tokio::test]
    async fn read_errors_pass_through_after_partial_copy() {
        let sink = MemorySink::new();
        let body = chunked(vec![
            Ok("partial"),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")),
        ]);
        let mut tee = TeeBody::new(body, sink.clone());

        let first = tee.frame().await.unwrap().unwrap();
        assert_eq!(first.into_data().unwrap(), Bytes::from("partial"));

        let err = tee.frame().await.unwrap().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
        assert!(tee.frame().await.is_none());

        assert_eq!(sink.contents(), "partial");
    }

    #[tokio::test]
    async fn failing_sink_never_reaches_the_reader() {
        let body = Full::new(Bytes::from("payload"));
        let collected = TeeBody::new(body, FailingWriter)
            .collect()
            .await
            .unwrap()
            .to_bytes();

        assert_eq!(collected, Bytes::from("payload"));
    }

    #[tokio::test]
    async fn dropping_closes_inner_once_without_touching_sink() {
        let drops = Arc::new(AtomicUsize::new(0));
        let sink = MemorySink::new();
        let body = DropCounted {
            inner: Full::new(Bytes::from("unread")),
            drops: drops.clone(),
        };

        let tee = TeeBody::new(body, sink.clone());
        drop(tee);

        assert_eq!(drops.load(Ordering::SeqCst), 1);
        assert!(sink.is_empty());
        assert_eq!(sink.clone().write(b"still open").unwrap(), 10);
    }

    #[test]
    fn size_hint_is_forwarded() {
        let tee = TeeBody::new(Full::new(Bytes::from("12345")), MemorySink::new());
        assert_eq!(tee.size_hint().exact(), Some(5));
        assert!(!tee.is_end_stream());
    }

    #[tokio::test]
    async fn tap_response_keeps_status_and_headers() {
        let sink = MemorySink::new();
        let response = axum::http::Response::builder()
            .status(404)
            .header("x-trace", "abc")
            .body(AxumBody::from("not here"))
            .unwrap();

        let tapped = tap_response(response, sink.clone());
        assert_eq!(tapped.status(), 404);
        assert_eq!(tapped.headers()["x-trace"], "abc");

        let bytes = tapped.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(bytes, Bytes::from("not here"));
        assert_eq!(sink.contents(), "not here");
    }
}
