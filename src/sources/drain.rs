//! Background resolution of the remainder of a large collection.
//!
//! Items are searched with bounded concurrency but handed to the session in
//! playlist order. A failed item is logged, counted and skipped.

use futures::{stream, StreamExt};
use serenity::model::id::UserId;
use std::{pin::pin, sync::Arc, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{TrackDescriptor, TrackResolver};

/// Trabajo de drenado: consultas pendientes de una colección diferida
#[derive(Debug, Clone)]
pub struct DrainJob {
    pub title: String,
    pub queries: Vec<String>,
    pub requested_by: UserId,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub added: usize,
    pub failed: usize,
    pub cancelled: bool,
}

/// Resuelve las consultas del trabajo y entrega cada pista a `append`.
///
/// `append` devuelve `false` cuando la sesión ya no acepta pistas de este
/// drenado; en ese caso se corta igual que con el token.
pub async fn run_drain<F>(
    resolver: Arc<dyn TrackResolver>,
    job: DrainJob,
    concurrency: usize,
    token: CancellationToken,
    mut append: F,
) -> DrainReport
where
    F: FnMut(TrackDescriptor) -> bool + Send,
{
    let started = Instant::now();
    let total = job.queries.len();
    let requested_by = job.requested_by;
    let mut report = DrainReport::default();

    info!("🔄 Drenando {} pistas de '{}'", total, job.title);

    let results = job.queries.into_iter().map(|query| {
        let resolver = Arc::clone(&resolver);
        async move {
            let result = resolver.background_search(&query, requested_by).await;
            (query, result)
        }
    });
    let mut results = pin!(stream::iter(results).buffered(concurrency.max(1)));

    loop {
        let next = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            next = results.next() => next,
        };

        let Some((query, result)) = next else {
            break;
        };

        match result {
            Ok(track) => {
                if token.is_cancelled() || !append(track) {
                    report.cancelled = true;
                    break;
                }
                report.added += 1;
            }
            Err(e) => {
                warn!("⏭️ No se pudo resolver '{}': {}", query, e);
                report.failed += 1;
            }
        }
    }

    if token.is_cancelled() {
        report.cancelled = true;
    }

    if report.cancelled {
        debug!(
            "🛑 Drenado de '{}' cancelado tras {} pistas",
            job.title, report.added
        );
    } else {
        info!(
            "✅ Drenado de '{}' terminado: {} agregadas, {} fallidas en {}",
            job.title,
            report.added,
            report.failed,
            humantime::format_duration(std::time::Duration::from_secs(started.elapsed().as_secs()))
        );
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::ResolutionError, testing::FakeResolver};
    use pretty_assertions::assert_eq;

    fn job(queries: &[&str]) -> DrainJob {
        DrainJob {
            title: "Mix".to_string(),
            queries: queries.iter().map(|q| q.to_string()).collect(),
            requested_by: UserId::new(1),
        }
    }

    #[tokio::test]
    async fn test_drain_preserves_order() {
        let resolver = Arc::new(FakeResolver::default());
        let mut appended = Vec::new();

        let report = run_drain(
            resolver,
            job(&["a", "b", "c", "d", "e"]),
            3,
            CancellationToken::new(),
            |track| {
                appended.push(track.title().to_string());
                true
            },
        )
        .await;

        assert_eq!(appended, vec!["a", "b", "c", "d", "e"]);
        assert_eq!(
            report,
            DrainReport {
                added: 5,
                failed: 0,
                cancelled: false
            }
        );
    }

    #[tokio::test]
    async fn test_one_failure_does_not_stop_the_rest() {
        let resolver = Arc::new(FakeResolver::default().failing("b"));
        let mut appended = Vec::new();

        let report = run_drain(
            resolver,
            job(&["a", "b", "c"]),
            2,
            CancellationToken::new(),
            |track| {
                appended.push(track.title().to_string());
                true
            },
        )
        .await;

        assert_eq!(appended, vec!["a", "c"]);
        assert_eq!(report.added, 2);
        assert_eq!(report.failed, 1);
    }

    #[tokio::test]
    async fn test_cancelled_token_appends_nothing() {
        let token = CancellationToken::new();
        token.cancel();
        let mut appended = 0;

        let report = run_drain(
            Arc::new(FakeResolver::default()),
            job(&["a", "b"]),
            2,
            token,
            |_| {
                appended += 1;
                true
            },
        )
        .await;

        assert_eq!(appended, 0);
        assert!(report.cancelled);
    }

    #[tokio::test]
    async fn test_rejected_append_stops_drain() {
        let mut appended = Vec::new();

        let report = run_drain(
            Arc::new(FakeResolver::default()),
            job(&["a", "b", "c"]),
            1,
            CancellationToken::new(),
            |track| {
                appended.push(track.title().to_string());
                appended.len() < 2
            },
        )
        .await;

        assert_eq!(appended, vec!["a", "b"]);
        assert_eq!(report.added, 1);
        assert!(report.cancelled);
    }

    #[tokio::test]
    async fn test_provider_errors_are_counted() {
        let resolver = Arc::new(
            FakeResolver::default().with_error("x", ResolutionError::NoResults("x".to_string())),
        );

        let report = run_drain(
            resolver,
            job(&["x", "y"]),
            4,
            CancellationToken::new(),
            |_| true,
        )
        .await;

        assert_eq!(report.added, 1);
        assert_eq!(report.failed, 1);
    }
}
