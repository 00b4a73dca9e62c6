//! Delta-to-cumulative conversion shared by every adapter

use futures_util::future;
use futures_util::{Stream, StreamExt};

use crate::error::Result;
use crate::providers::types::TextStream;

/// Turn a stream of text fragments into a stream of cumulative snapshots.
///
/// Empty fragments produce no snapshot: they would only repeat the previous one.
/// The first error is passed through and ends the stream.
pub fn cumulative<S>(fragments: S) -> TextStream
where
    S: Stream<Item = Result<String>> + Send + 'static,
{
    let snapshots = fragments
        .scan((String::new(), false), |(text, failed), item| {
            if *failed {
                return future::ready(None);
            }
            let out = match item {
                Ok(fragment) if fragment.is_empty() => None,
                Ok(fragment) => {
                    text.push_str(&fragment);
                    Some(Ok(text.clone()))
                }
                Err(e) => {
                    *failed = true;
                    Some(Err(e))
                }
            };
            future::ready(Some(out))
        })
        .filter_map(future::ready);

    Box::pin(snapshots)
}
