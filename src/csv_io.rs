use crate::ranking::RankedStorefront;
use crate::tracking::TrackingEnvelope;
use csv_async::{AsyncReaderBuilder, AsyncWriterBuilder};
use futures::stream::Stream;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::compat::{TokioAsyncReadCompatExt, TokioAsyncWriteCompatExt};

/// Stream tracking events from async reader
pub fn stream_tracking_events<R: AsyncRead + Unpin + Send + 'static>(
    reader: R,
) -> impl Stream<Item = Result<TrackingEnvelope, csv_async::Error>> {
    let compat_reader = reader.compat();
    let csv_reader = AsyncReaderBuilder::new()
        .trim(csv_async::Trim::All)
        .flexible(true)
        .create_deserializer(compat_reader);

    csv_reader.into_deserialize::<TrackingEnvelope>()
}

/// Write ranked storefronts as CSV. Header row is always written.
pub async fn write_leaderboard<W: AsyncWrite + Unpin>(
    writer: W,
    entries: &[RankedStorefront],
) -> Result<(), anyhow::Error> {
    let mut csv_writer = AsyncWriterBuilder::new().create_writer(writer.compat_write());

    csv_writer
        .write_record(["rank", "id", "name", "url", "revenue", "orders", "score"])
        .await?;

    for entry in entries {
        let storefront = &entry.storefront;
        csv_writer
            .write_record([
                entry.position.to_string(),
                storefront.id.to_string(),
                storefront.name.clone(),
                storefront.url.clone(),
                format!("{:.2}", storefront.revenue),
                storefront.orders.to_string(),
                format!("{:.2}", entry.score),
            ])
            .await?;
    }

    csv_writer.flush().await?;
    Ok(())
}
