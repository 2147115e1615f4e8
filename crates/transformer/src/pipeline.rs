//! Sequential per-request pipeline.
//!
//! One request runs one pipeline: parse → translate → I/O → translate →
//! emit. Translation is CPU-bound and non-suspending; the suspension points
//! are the upstream I/O calls, and each checks the cancellation token. On
//! cancel the pipeline returns the sentinel without emitting a partial
//! response. No state is shared across concurrent pipelines.

use futures::StreamExt;
use futures::future::{self, Either};
use tokio_util::sync::CancellationToken;

use crate::dialect::{Inbound, Outbound, SseFrameStream};
use crate::error::{Error, Result};
use crate::http::{HttpClient, HttpError, HttpResponse, RawRequest};

/// Race a pipeline step against cancellation.
async fn checked<F, T>(cancel: &CancellationToken, step: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let cancelled = std::pin::pin!(cancel.cancelled());
    let step = std::pin::pin!(step);

    match future::select(cancelled, step).await {
        Either::Left(_) => Err(Error::Cancelled),
        Either::Right((result, _)) => result,
    }
}

/// Run a unary request end to end.
///
/// Taxonomy errors come back rendered in the caller's dialect envelope;
/// the only `Err` this returns is the cancellation sentinel.
pub async fn execute(
    inbound: &dyn Inbound,
    outbound: &dyn Outbound,
    client: &dyn HttpClient,
    raw: RawRequest,
    cancel: CancellationToken,
) -> Result<HttpResponse> {
    match run_unary(inbound, outbound, client, raw, &cancel).await {
        Ok(response) => Ok(response),
        Err(Error::Cancelled) => Err(Error::Cancelled),
        Err(error) => Ok(inbound.transform_error(&error)),
    }
}

async fn run_unary(
    inbound: &dyn Inbound,
    outbound: &dyn Outbound,
    client: &dyn HttpClient,
    raw: RawRequest,
    cancel: &CancellationToken,
) -> Result<HttpResponse> {
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }

    let request = inbound.transform_request(raw).await?;
    let upstream_request = outbound.transform_request(request).await?;
    let metadata = upstream_request.metadata.clone();

    let upstream_response = checked(cancel, client.execute(upstream_request)).await?;

    if !upstream_response.status.is_success() {
        return Err(outbound.transform_error(HttpError {
            status: upstream_response.status,
            body: upstream_response.body,
        }));
    }

    let mut upstream_response = upstream_response;
    if upstream_response.metadata.is_empty() {
        upstream_response.metadata = metadata;
    }

    let unified = outbound.transform_response(upstream_response)?;
    inbound.transform_response(unified)
}

/// Run a streaming request end to end, producing caller-dialect SSE frames.
///
/// Setup errors are returned unrendered so the edge can answer with a plain
/// HTTP error envelope; once the stream is live, errors travel in-band and
/// terminate it. Cancellation stops the mapped stream at the next pull.
pub async fn execute_stream(
    inbound: &dyn Inbound,
    outbound: &dyn Outbound,
    client: &dyn HttpClient,
    raw: RawRequest,
    cancel: CancellationToken,
) -> Result<SseFrameStream> {
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }

    let request = inbound.transform_request(raw).await?;
    let upstream_request = outbound.transform_request(request).await?;

    let events = checked(&cancel, client.execute_stream(upstream_request)).await?;

    let chunks = outbound.transform_stream(events);
    let frames = inbound.transform_stream(chunks);

    Ok(frames.take_until(cancel.cancelled_owned()).boxed())
}

/// Run a unary request over a streaming-only upstream: drain the SSE stream,
/// fold it into a synthetic unary body, then hand it to the regular response
/// path.
pub async fn execute_aggregated(
    inbound: &dyn Inbound,
    outbound: &dyn Outbound,
    client: &dyn HttpClient,
    raw: RawRequest,
    cancel: CancellationToken,
) -> Result<HttpResponse> {
    match run_aggregated(inbound, outbound, client, raw, &cancel).await {
        Ok(response) => Ok(response),
        Err(Error::Cancelled) => Err(Error::Cancelled),
        Err(error) => Ok(inbound.transform_error(&error)),
    }
}

async fn run_aggregated(
    inbound: &dyn Inbound,
    outbound: &dyn Outbound,
    client: &dyn HttpClient,
    raw: RawRequest,
    cancel: &CancellationToken,
) -> Result<HttpResponse> {
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }

    let mut request = inbound.transform_request(raw).await?;

    // The upstream only speaks SSE here; address its streaming endpoint even
    // though the caller asked for a unary answer.
    request.stream = Some(true);

    let upstream_request = outbound.transform_request(request).await?;
    let metadata = upstream_request.metadata.clone();

    let mut events = checked(cancel, client.execute_stream(upstream_request)).await?;

    let mut chunks: Vec<String> = Vec::new();
    loop {
        let next = checked(cancel, async {
            Ok(events.next().await.transpose())
        })
        .await?;

        match next {
            Ok(Some(event)) => chunks.push(event.data),
            Ok(None) => break,
            Err(error) => return Err(error),
        }
    }

    let (body, _meta) = outbound.aggregate_stream_chunks(&chunks)?;

    let unified = outbound.transform_response(HttpResponse {
        status: http::StatusCode::OK,
        headers: http::HeaderMap::new(),
        body,
        metadata,
    })?;

    inbound.transform_response(unified)
}
