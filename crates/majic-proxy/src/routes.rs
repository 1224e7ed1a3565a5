//! HTTP surface of the proxy.

use std::net::SocketAddr;
use std::sync::Arc;

use majic_feed::FeedSource;
use warp::http::StatusCode;
use warp::reply::{Reply, Response};
use warp::Filter;

use crate::proxy::CalendarProxy;
use crate::result::ProxyResult;

/// `GET /api/calendar`
pub fn routes<S>(
    proxy: Arc<CalendarProxy<S>>,
) -> impl Filter<Extract = (Response,), Error = warp::Rejection> + Clone
where
    S: FeedSource + 'static,
{
    warp::get()
        .and(warp::path("api"))
        .and(warp::path("calendar"))
        .and(warp::path::end())
        .and(warp::any().map(move || proxy.clone()))
        .then(|proxy: Arc<CalendarProxy<S>>| async move { render(proxy.run().await) })
}

fn render(result: ProxyResult) -> Response {
    let status = StatusCode::from_u16(result.status()).unwrap_or(StatusCode::BAD_GATEWAY);
    match result {
        ProxyResult::Ok(events) => warp::reply::json(&events).into_response(),
        failure => match failure.error_body() {
            Some(body) => warp::reply::with_status(warp::reply::json(&body), status).into_response(),
            None => status.into_response(),
        },
    }
}

/// Serve the proxy until Ctrl-C.
pub async fn serve<S>(source: S, addr: SocketAddr) -> anyhow::Result<()>
where
    S: FeedSource + 'static,
{
    let proxy = Arc::new(CalendarProxy::new(source));

    let (bound, server) = warp::serve(routes(proxy)).try_bind_with_graceful_shutdown(
        addr,
        async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
        },
    )?;

    tracing::info!(addr = %bound, "Calendar proxy listening");
    server.await;
    tracing::info!("Calendar proxy stopped");
    Ok(())
}
