//! Fetch → normalize orchestration.

use majic_feed::{normalize, FeedError, FeedSource};
use tracing::instrument;

use crate::result::{status_for, ProxyResult};

/// Stateless per request: every call fetches and parses from scratch.
pub struct CalendarProxy<S> {
    source: S,
}

impl<S: FeedSource> CalendarProxy<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    #[instrument(skip(self), level = "info")]
    pub async fn run(&self) -> ProxyResult {
        match self.fetch_events().await {
            Ok(events) => {
                tracing::info!(count = events.len(), "Serving calendar events");
                ProxyResult::Ok(events)
            }
            Err(err) => {
                tracing::error!(
                    kind = ?err.kind(),
                    status = status_for(&err),
                    upstream_status = ?err.upstream_status(),
                    details = %err,
                    "Calendar request failed"
                );
                if let FeedError::UpstreamHttpError { body, .. } = &err {
                    tracing::debug!(upstream_body = %body, "Upstream error body");
                }
                ProxyResult::from_error(&err)
            }
        }
    }

    async fn fetch_events(&self) -> Result<Vec<majic_feed::CalendarEvent>, FeedError> {
        let raw = self.source.fetch().await?;
        tracing::debug!(url = %raw.url, status = raw.status, bytes = raw.body.len(), "Parsing feed");
        normalize(&raw.body)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]
    use super::*;
    use majic_feed::{FailureKind, FeedFetcher, RawFeed};
    use std::future::Future;
    use std::time::Duration;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Canned(Result<String, FeedError>);

    impl FeedSource for Canned {
        fn fetch(&self) -> impl Future<Output = Result<RawFeed, FeedError>> + Send {
            let result = self.0.clone().map(|body| RawFeed {
                url: "http://upstream.test/cal".to_string(),
                status: 200,
                body,
            });
            async move { result }
        }
    }

    fn synthetic_feed(n: usize) -> String {
        let mut feed = String::from("BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//test//EN\r\n");
        for i in 0..n {
            feed.push_str(&format!(
                "BEGIN:VEVENT\r\nUID:evt-{i}\r\nDTSTAMP:20250901T000000Z\r\nDTSTART:202509{day:02}T080000Z\r\nDTEND:202509{day:02}T100000Z\r\nSUMMARY:Course {i}\r\nEND:VEVENT\r\n",
                day = i + 1
            ));
        }
        feed.push_str("END:VCALENDAR\r\n");
        feed
    }

    #[tokio::test]
    async fn test_fetch_then_normalize_yields_every_event() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(synthetic_feed(5)))
            .mount(&mock_server)
            .await;

        let fetcher = FeedFetcher::with_url(&mock_server.uri(), Duration::from_secs(5)).unwrap();
        let proxy = CalendarProxy::new(fetcher);

        match proxy.run().await {
            ProxyResult::Ok(events) => {
                assert_eq!(events.len(), 5);
                for (i, event) in events.iter().enumerate() {
                    assert_eq!(event.id, format!("evt-{i}"));
                    assert_eq!(event.summary, format!("Course {i}"));
                    assert_eq!(event.start.format("%d %H").to_string(), format!("{:02} 08", i + 1));
                    assert_eq!(event.end.format("%d %H").to_string(), format!("{:02} 10", i + 1));
                }
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_dns_failure_maps_to_503() {
        let proxy = CalendarProxy::new(Canned(Err(FeedError::ConnectionFailure(
            "dns error: failed to lookup address information".into(),
        ))));
        let result = proxy.run().await;
        assert_eq!(result.status(), 503);
    }

    #[tokio::test]
    async fn test_empty_body_maps_to_500() {
        let proxy = CalendarProxy::new(Canned(Ok(String::new())));
        let result = proxy.run().await;

        assert_eq!(result.status(), 500);
        match result {
            ProxyResult::Failure { kind, .. } => assert_eq!(kind, FailureKind::ParseError),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
