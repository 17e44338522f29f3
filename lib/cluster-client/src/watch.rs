//! Watch streams over newline-delimited JSON change events
//!
//! A watch is a single long-lived GET whose body is a sequence of JSON
//! documents, one per line. The stream returned by
//! [`ClusterClient::watch_resource`](crate::ClusterClient::watch_resource) is
//! lazy: the request is sent on the first poll. Dropping the stream drops the
//! response body, which closes the connection.
//!
//! Any transport error or undecodable line ends the stream after the error is
//! yielded. Callers restart a watch by issuing a new call.

use std::collections::VecDeque;

use cluster_core::{ClusterError, ParseSource, Result};
use futures::future::BoxFuture;
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::Response;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Lazily opened stream of watch events
pub type WatchStream<T> = BoxStream<'static, Result<WatchEvent<T>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WatchEventType {
    Added,
    Modified,
    Deleted,
    Error,
    Bookmark,
}

/// One change notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchEvent<T> {
    #[serde(rename = "type")]
    pub event_type: WatchEventType,
    pub object: T,
}

/// Splits a byte stream into complete lines
#[derive(Debug, Default)]
pub struct LineDecoder {
    buffer: Vec<u8>,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every completed, non-blank line
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();
            if !is_blank(&line) {
                lines.push(line);
            }
        }
        lines
    }

    /// Take the unterminated remainder once the body has ended
    pub fn finish(&mut self) -> Option<Vec<u8>> {
        let rest = std::mem::take(&mut self.buffer);
        if is_blank(&rest) {
            None
        } else {
            Some(rest)
        }
    }

    /// Bytes buffered without a terminating newline yet
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

fn is_blank(line: &[u8]) -> bool {
    line.iter().all(|b| b.is_ascii_whitespace())
}

/// Decode one line of a watch body
pub fn decode_event<T: DeserializeOwned>(line: &[u8]) -> Result<WatchEvent<T>> {
    serde_json::from_slice(line).map_err(|e| {
        let raw = String::from_utf8_lossy(line).into_owned();
        warn!("Undecodable watch event: {}", e);
        ClusterError::parsing(ParseSource::WatchEvent, "watch event", e, raw)
    })
}

enum WatchState {
    Connecting(BoxFuture<'static, Result<Response>>),
    Streaming {
        body: BoxStream<'static, reqwest::Result<bytes::Bytes>>,
        decoder: LineDecoder,
        ready: VecDeque<Vec<u8>>,
    },
    Draining(VecDeque<Vec<u8>>),
}

/// Turn a not-yet-sent watch request into an event stream
pub(crate) fn watch_stream<T>(connect: BoxFuture<'static, Result<Response>>) -> WatchStream<T>
where
    T: DeserializeOwned + Send + 'static,
{
    stream::try_unfold(WatchState::Connecting(connect), next_event::<T>).boxed()
}

async fn next_event<T: DeserializeOwned>(
    mut state: WatchState,
) -> Result<Option<(WatchEvent<T>, WatchState)>> {
    loop {
        state = match state {
            WatchState::Connecting(connect) => {
                let response = connect.await?;
                debug!("Watch stream opened (status {})", response.status());
                WatchState::Streaming {
                    body: response.bytes_stream().boxed(),
                    decoder: LineDecoder::new(),
                    ready: VecDeque::new(),
                }
            }
            WatchState::Streaming {
                mut body,
                mut decoder,
                mut ready,
            } => {
                if let Some(line) = ready.pop_front() {
                    let event = decode_event(&line)?;
                    return Ok(Some((event, WatchState::Streaming { body, decoder, ready })));
                }

                match body.next().await {
                    Some(Ok(chunk)) => {
                        ready.extend(decoder.push(&chunk));
                        WatchState::Streaming { body, decoder, ready }
                    }
                    Some(Err(e)) => {
                        warn!("Watch stream transport error: {}", e);
                        return Err(ClusterError::network("Error in watch stream", e));
                    }
                    None => {
                        debug!("Watch stream closed by server");
                        ready.extend(decoder.finish());
                        WatchState::Draining(ready)
                    }
                }
            }
            WatchState::Draining(mut ready) => {
                return match ready.pop_front() {
                    Some(line) => Ok(Some((decode_event(&line)?, WatchState::Draining(ready)))),
                    None => Ok(None),
                };
            }
        };
    }
}
