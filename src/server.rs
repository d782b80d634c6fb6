use crate::csv_io::stream_tracking_events;
use crate::tracking::TrackingCollector;
use anyhow::Result;
use futures::StreamExt;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;

pub async fn run(bind: String, max_connections: usize, collector: TrackingCollector) -> Result<()> {
    tracing::info!("Collector mode: binding to {}", bind);

    let listener = TcpListener::bind(&bind).await?;
    serve(listener, max_connections, collector).await
}

/// Accept loop over an already bound listener.
pub async fn serve(
    listener: TcpListener,
    max_connections: usize,
    collector: TrackingCollector,
) -> Result<()> {
    let semaphore = Arc::new(Semaphore::new(max_connections.max(1)));

    tracing::info!(
        "Listening on {}, max {} connections",
        listener.local_addr()?,
        max_connections
    );

    loop {
        let permit = semaphore.clone().acquire_owned().await?;
        let (socket, addr) = listener.accept().await?;
        tracing::info!("Accepted connection from {}", addr);

        let collector = collector.clone();

        tokio::spawn(async move {
            if let Err(e) = handle_connection(socket, collector).await {
                tracing::error!("Connection {} error: {}", addr, e);
            }
            drop(permit);
        });
    }
}

async fn handle_connection(socket: TcpStream, collector: TrackingCollector) -> Result<()> {
    let (reader, writer) = socket.into_split();
    let mut writer = BufWriter::new(writer);

    // Header row first, then one ack line per event row
    let mut stream = stream_tracking_events(BufReader::new(reader));

    while let Some(result) = stream.next().await {
        let ack = match result {
            Ok(envelope) => match collector.ingest(envelope).await {
                Ok(outcome) => outcome.ack(),
                Err(e) => {
                    tracing::warn!(error = %e, "Tracking event rejected");
                    format!("rejected,{}", e.code())
                }
            },
            Err(e) => {
                tracing::warn!("CSV parse error: {}", e);
                "rejected,malformed".to_string()
            }
        };
        write_ack(&mut writer, &ack).await?;
    }

    writer.shutdown().await?;
    Ok(())
}

async fn write_ack<W: AsyncWrite + Unpin>(writer: &mut W, ack: &str) -> Result<()> {
    writer.write_all(ack.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}
