use std::future::Future;

use futures::stream::{self, BoxStream};
use futures::StreamExt;

pub mod backends;
pub mod template;

pub use backends::StorageConfig;
pub use template::{BlobStore, ObjectMetadata};

/// Flattens a one-shot key listing into a stream of keys.
///
/// A failed listing yields its error as the only item.
#[allow(dead_code)]
pub(crate) fn keys_stream<'a, F>(listing: F) -> BoxStream<'a, anyhow::Result<String>>
where
    F: Future<Output = anyhow::Result<Vec<String>>> + Send + 'a,
{
    stream::once(listing)
        .map(|result| match result {
            Ok(keys) => stream::iter(keys.into_iter().map(Ok::<_, anyhow::Error>)).left_stream(),
            Err(e) => stream::iter(std::iter::once(Err(e))).right_stream(),
        })
        .flatten()
        .boxed()
}
