//! Paced replay of one complete completion response.
//!
//! Fallback strategy when no true upstream stream was requested: the full
//! response text is split on whitespace and re-revealed token by token with
//! a fixed delay, approximating incremental arrival. CONTENT events carry
//! the *cumulative* prefix; the final END event carries the complete text.

use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::relay::event::StreamEvent;
use crate::relay::EventSource;

/// Event source replaying one blocking completion as a paced stream.
pub struct ResponsePacer {
    full_text: String,
    tokens: Vec<String>,
    next: usize,
    assembled: String,
    delay: Duration,
    cancel: CancellationToken,
    done: bool,
}

impl ResponsePacer {
    /// Build a pacer over one complete response text.
    #[must_use]
    pub fn new(full_text: impl Into<String>, delay: Duration, cancel: CancellationToken) -> Self {
        let full_text = full_text.into();
        let tokens = full_text.split_whitespace().map(str::to_owned).collect();
        Self {
            full_text,
            tokens,
            next: 0,
            assembled: String::new(),
            delay,
            cancel,
            done: false,
        }
    }
}

impl EventSource for ResponsePacer {
    fn next_event(&mut self) -> BoxFuture<'_, Option<StreamEvent>> {
        Box::pin(async move {
            if self.done {
                return None;
            }
            if self.next >= self.tokens.len() {
                self.done = true;
                return Some(StreamEvent::End(self.full_text.clone()));
            }

            tokio::select! {
                () = self.cancel.cancelled() => {
                    self.done = true;
                    return None;
                }
                () = tokio::time::sleep(self.delay) => {}
            }

            if !self.assembled.is_empty() {
                self.assembled.push(' ');
            }
            self.assembled.push_str(&self.tokens[self.next]);
            self.next += 1;
            Some(StreamEvent::Content(self.assembled.clone()))
        })
    }
}
