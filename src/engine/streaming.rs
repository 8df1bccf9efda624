//! Text streaming output for incremental responses.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::error::SessionError;
use super::guarded::GuardedSession;
use super::session::FinishReason;
use super::Backend;

/// One event on a [`TextStream`].
#[derive(Debug)]
pub enum StreamEvent {
    /// Newly completed text.
    Delta(String),
    /// Generation finished; `text` is the full output.
    Done { text: String, finish: Option<FinishReason> },
    Error(SessionError),
}

/// Async stream of text produced by a generation task.
pub struct TextStream {
    receiver: mpsc::Receiver<StreamEvent>,
    worker: JoinHandle<()>,
}

impl TextStream {
    /// Receive the next event, if available.
    pub async fn next(&mut self) -> Option<StreamEvent> {
        self.receiver.recv().await
    }

    /// Concatenate every delta until the stream ends.
    pub async fn collect(mut self) -> Result<String, SessionError> {
        let mut text = String::new();
        while let Some(event) = self.next().await {
            match event {
                StreamEvent::Delta(delta) => text.push_str(&delta),
                StreamEvent::Done { .. } => break,
                StreamEvent::Error(e) => return Err(e),
            }
        }
        Ok(text)
    }

    /// Stop generating. The task exits before its next step.
    pub fn cancel(self) {
        drop(self.receiver);
    }

    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }
}

/// Run `begin(prompt)` and step to completion on a blocking task.
///
/// Must be called from inside a tokio runtime. Dropping the stream stops
/// generation after the step in flight.
pub fn stream<B>(guarded: GuardedSession<B>, prompt: String, buffer_size: usize) -> TextStream
where
    B: Backend,
    B::Model: Send,
    B::Context: Send,
{
    let (sender, receiver) = mpsc::channel(buffer_size.max(1));
    let worker = tokio::task::spawn_blocking(move || {
        let mut session = guarded.lock();
        if let Err(e) = session.begin(&prompt) {
            let _ = sender.blocking_send(StreamEvent::Error(e));
            return;
        }
        loop {
            if sender.is_closed() {
                tracing::debug!("stream receiver dropped, stopping generation");
                return;
            }
            match session.step() {
                Ok(out) => {
                    if !out.delta.is_empty() && sender.blocking_send(StreamEvent::Delta(out.delta)).is_err() {
                        return;
                    }
                    if out.terminal {
                        let _ = sender.blocking_send(StreamEvent::Done {
                            text: out.text,
                            finish: out.finish,
                        });
                        return;
                    }
                }
                Err(e) => {
                    let _ = sender.blocking_send(StreamEvent::Error(e));
                    return;
                }
            }
        }
    });
    TextStream { receiver, worker }
}
