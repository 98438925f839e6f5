//! Streaming stage updates while a question is answered.

use super::Answer;
use crate::errors::AskflowError;
use crate::events::{EventSink, PipelineEvent};
use futures::channel::mpsc::UnboundedSender;

/// One item of [`super::Assistant::stream`].
#[derive(Debug, Clone)]
pub enum StreamItem {
    /// A stage started, finished, failed or dropped an item.
    Stage(PipelineEvent),
    /// The run ended. Always the last item.
    Finished(Result<Answer, AskflowError>),
}

impl StreamItem {
    /// Returns true for the final item.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        matches!(self, Self::Finished(_))
    }
}

/// Forwards stage-level events into a stream.
pub(super) struct ChannelEventSink {
    tx: UnboundedSender<StreamItem>,
}

impl ChannelEventSink {
    pub(super) const fn new(tx: UnboundedSender<StreamItem>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelEventSink {
    fn try_emit(&self, event: &PipelineEvent) {
        if event.stage.is_some() {
            // The receiver is gone once the caller drops the stream.
            let _ = self.tx.unbounded_send(StreamItem::Stage(event.clone()));
        }
    }
}
