use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use nodeflow_dto::dto::StreamMessage;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

/// A bounded writer/reader pair for streamed runs.
pub fn pipe(capacity: usize) -> (StreamWriter, ExecutionStream) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        StreamWriter { tx },
        ExecutionStream {
            inner: ReceiverStream::new(rx),
        },
    )
}

#[derive(Debug, Clone)]
pub struct StreamWriter {
    tx: mpsc::Sender<StreamMessage>,
}

impl StreamWriter {
    /// Waits for buffer space. Returns `false` once the reader has gone away.
    pub async fn send(&self, message: StreamMessage) -> bool {
        match self.tx.send(message).await {
            Ok(()) => true,
            Err(_) => {
                debug!("stream reader detached, message dropped");
                false
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Messages of one streamed run. Ends after the writer side is dropped.
#[derive(Debug)]
pub struct ExecutionStream {
    inner: ReceiverStream<StreamMessage>,
}

impl Stream for ExecutionStream {
    type Item = StreamMessage;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use nodeflow_dto::dto::{StateMessage, WorkflowStatus};

    fn state(status: WorkflowStatus) -> StreamMessage {
        StreamMessage::State(StateMessage::new(1, status))
    }

    #[tokio::test]
    async fn stream_ends_when_writer_drops() {
        let (writer, stream) = pipe(2);
        tokio::spawn(async move {
            writer.send(state(WorkflowStatus::Running)).await;
            writer.send(state(WorkflowStatus::Success)).await;
        });

        let statuses: Vec<_> = stream.filter_map(|m| async move { m.status() }).collect().await;
        assert_eq!(statuses, vec![WorkflowStatus::Running, WorkflowStatus::Success]);
    }

    #[tokio::test]
    async fn writer_notices_detached_reader() {
        let (writer, stream) = pipe(1);
        drop(stream);
        assert!(writer.is_closed());
        assert!(!writer.send(state(WorkflowStatus::Running)).await);
    }
}
