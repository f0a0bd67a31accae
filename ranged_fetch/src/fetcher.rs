use std::sync::Arc;

use bytes::Bytes;
use ccp_config::HttpConfig;
use futures::StreamExt;
use reqwest::Client;
use reqwest::header::RANGE;
use tracing::{debug, error};

use crate::block_store::BlockStore;
use crate::error::{DownloadError, ErrorState, Result};
use crate::gate::ConnectionGate;
use crate::http_source::apply_headers;
use crate::plan::PartitionPlan;
use crate::stats::transfer_stats;

/// Everything one block worker needs.
pub(crate) struct BlockFetch {
    pub client: Client,
    pub url: Arc<String>,
    pub plan: PartitionPlan,
    pub index: usize,
    pub block: Arc<BlockStore>,
    pub gate: Arc<ConnectionGate>,
    pub http: Arc<HttpConfig>,
    pub sorted: bool,
    pub errors: Arc<ErrorState>,
}

/// Task body of one block worker. A failure is fatal to the whole object;
/// it is recorded for the reader to surface, never retried here.
pub(crate) async fn run(fetch: BlockFetch) {
    let index = fetch.index;
    let errors = fetch.errors.clone();
    if let Err(err) = fetch_block(fetch).await {
        error!(block = index, %err, "block fetch failed");
        errors.set(err);
    }
}

async fn fetch_block(fetch: BlockFetch) -> Result<()> {
    let (start, end) = fetch.plan.block_range(fetch.index);
    if start >= end {
        // Empty tail block; the cursor never reaches it.
        return Ok(());
    }

    // Block 0 starts ungated so the leading block reaches the reader with
    // minimum latency.
    let _permit = if fetch.index > 0 {
        Some(fetch.gate.admit(fetch.index, fetch.sorted).await?)
    } else {
        None
    };

    debug!(block = fetch.index, start, end, "start");
    let request = apply_headers(fetch.client.get(fetch.url.as_str()), &fetch.http)
        .header(RANGE, format!("bytes={}-{}", start, end - 1));
    let response = request.send().await.map_err(|err| DownloadError::FetchFailed {
        block: fetch.index,
        cause: Arc::new(err),
    })?;
    let status = response.status();
    if status.as_u16() >= 400 {
        return Err(DownloadError::FetchStatus {
            block: fetch.index,
            status,
        });
    }

    fetch.block.init().await?;

    // Some servers ignore partial ranges and send the whole object; never
    // write past this block's span.
    let expected = end - start;
    let mut remaining = expected;
    let mut body = response.bytes_stream();
    while remaining > 0 {
        let Some(chunk) = body.next().await else { break };
        let mut data: Bytes = chunk.map_err(|err| DownloadError::FetchFailed {
            block: fetch.index,
            cause: Arc::new(err),
        })?;
        if data.len() as u64 > remaining {
            data = data.slice(..remaining as usize);
        }
        if data.is_empty() {
            continue;
        }
        remaining -= data.len() as u64;
        transfer_stats().add_rx(data.len() as u64);
        fetch.block.write(data).await?;
    }
    if remaining > 0 {
        return Err(DownloadError::TruncatedBody {
            block: fetch.index,
            expected,
            received: expected - remaining,
        });
    }

    fetch.block.finalize();
    debug!(block = fetch.index, bytes = expected, "done");
    Ok(())
}
