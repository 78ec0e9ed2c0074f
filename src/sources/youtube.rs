use async_process::Command;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::{CatalogCollection, CatalogEntry, VideoCatalog};
use crate::error::ResolutionError;

const PROVIDER: &str = "yt-dlp";

/// Cliente para interactuar con YouTube a través de yt-dlp
pub struct YtDlpClient {
    // Limitar procesos concurrentes para evitar rate limiting
    rate_limiter: Semaphore,
    // Los drenados usan su propio cupo y no frenan a los `/play`
    background_limiter: Semaphore,
}

/// Información extraída de yt-dlp (`--dump-json`, una línea por entrada)
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    id: Option<String>,
    title: Option<String>,
    duration: Option<f64>,
    uploader: Option<String>,
    channel: Option<String>,
    thumbnail: Option<String>,
    webpage_url: Option<String>,
    url: Option<String>,
    playlist_title: Option<String>,
}

impl YtDlpInfo {
    /// URL canónica de la página; las entradas planas solo traen `url` o `id`
    fn canonical_url(&self) -> Option<String> {
        self.webpage_url
            .clone()
            .or_else(|| self.url.clone().filter(|url| url.starts_with("http")))
            .or_else(|| {
                self.id
                    .as_ref()
                    .map(|id| format!("https://www.youtube.com/watch?v={}", id))
            })
    }

    fn into_entry(self) -> Option<CatalogEntry> {
        let url = self.canonical_url()?;
        Some(CatalogEntry {
            title: self.title.unwrap_or_else(|| url.clone()),
            url,
            artist: self.uploader.or(self.channel),
            duration: self
                .duration
                .filter(|secs| secs.is_finite() && *secs >= 0.0)
                .map(Duration::from_secs_f64),
            thumbnail: self.thumbnail,
        })
    }
}

impl YtDlpClient {
    pub fn new() -> Self {
        Self {
            rate_limiter: Semaphore::new(3),
            background_limiter: Semaphore::new(2),
        }
    }

    async fn run(&self, args: &[&str]) -> Result<String, ResolutionError> {
        self.run_with(&self.rate_limiter, args).await
    }

    /// Ejecuta yt-dlp con un permiso de `limiter` y devuelve stdout
    async fn run_with(&self, limiter: &Semaphore, args: &[&str]) -> Result<String, ResolutionError> {
        let _permit = limiter
            .acquire()
            .await
            .map_err(|e| ResolutionError::provider(PROVIDER, e))?;

        let output = Command::new("yt-dlp")
            .args(args)
            .output()
            .await
            .map_err(|e| ResolutionError::provider(PROVIDER, format!("Error al ejecutar yt-dlp: {}", e)))?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            return Err(classify_failure(&error));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Verifica que yt-dlp esté disponible
    pub async fn verify_available(&self) -> Result<String, ResolutionError> {
        let version = self.run(&["--version"]).await?;
        Ok(version.trim().to_string())
    }

    /// Actualiza yt-dlp (debe ejecutarse periódicamente)
    pub async fn update_ytdlp() {
        info!("🔄 Actualizando yt-dlp...");

        match Command::new("yt-dlp").arg("-U").output().await {
            Ok(output) if output.status.success() => info!("✅ yt-dlp actualizado exitosamente"),
            Ok(output) => warn!(
                "⚠️ No se pudo actualizar yt-dlp: {}",
                String::from_utf8_lossy(&output.stderr)
            ),
            Err(e) => warn!("⚠️ No se pudo ejecutar yt-dlp -U: {}", e),
        }
    }

    async fn search_with(
        &self,
        limiter: &Semaphore,
        query: &str,
        limit: usize,
    ) -> Result<Vec<CatalogEntry>, ResolutionError> {
        let search_query = format!("ytsearch{}:{}", limit.max(1), query);
        let stdout = self
            .run_with(
                limiter,
                &[
                    "--no-playlist",
                    "--dump-json",
                    "--flat-playlist",
                    "--skip-download",
                    "--no-warnings",
                    &search_query,
                ],
            )
            .await?;

        Ok(parse_entries(&stdout)
            .into_iter()
            .filter_map(YtDlpInfo::into_entry)
            .collect())
    }
}

impl Default for YtDlpClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Parsea la salida de `--dump-json`; las líneas inválidas se ignoran
fn parse_entries(stdout: &str) -> Vec<YtDlpInfo> {
    stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str::<YtDlpInfo>(line) {
            Ok(info) => Some(info),
            Err(e) => {
                debug!("Línea de yt-dlp ignorada: {}", e);
                None
            }
        })
        .collect()
}

fn classify_failure(stderr: &str) -> ResolutionError {
    let lower = stderr.to_lowercase();
    if lower.contains("429") || lower.contains("too many requests") {
        ResolutionError::RateLimited {
            provider: PROVIDER,
            retry_after: None,
        }
    } else {
        ResolutionError::provider(PROVIDER, stderr.trim())
    }
}

#[async_trait]
impl VideoCatalog for YtDlpClient {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<CatalogEntry>, ResolutionError> {
        info!("🔍 Buscando en YouTube: {}", query);
        self.search_with(&self.rate_limiter, query, limit).await
    }

    async fn background_search(&self, query: &str, limit: usize) -> Result<Vec<CatalogEntry>, ResolutionError> {
        debug!("🔍 Buscando en segundo plano: {}", query);
        self.search_with(&self.background_limiter, query, limit).await
    }

    async fn lookup(&self, url: &str) -> Result<CatalogEntry, ResolutionError> {
        debug!("📊 Obteniendo info de: {}", url);

        let stdout = self
            .run(&["--no-playlist", "--dump-json", "--no-warnings", url])
            .await?;

        parse_entries(&stdout)
            .into_iter()
            .next()
            .and_then(YtDlpInfo::into_entry)
            .ok_or_else(|| ResolutionError::NoResults(url.to_string()))
    }

    async fn collection(&self, url: &str, limit: usize) -> Result<CatalogCollection, ResolutionError> {
        info!("📋 Obteniendo playlist: {}", url);

        let limit = limit.to_string();
        let stdout = self
            .run(&[
                "--yes-playlist",
                "--flat-playlist",
                "--dump-json",
                "--playlist-end",
                &limit,
                "--no-warnings",
                url,
            ])
            .await?;

        let entries = parse_entries(&stdout);
        let title = entries
            .iter()
            .find_map(|info| info.playlist_title.clone())
            .unwrap_or_else(|| "Playlist de YouTube".to_string());

        Ok(CatalogCollection {
            title,
            entries: entries.into_iter().filter_map(YtDlpInfo::into_entry).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_flat_entries_get_canonical_url() {
        let stdout = r#"{"id": "abc", "title": "Uno", "url": "https://www.youtube.com/watch?v=abc", "duration": 212.0, "channel": "Canal", "playlist_title": "Mix"}
not json at all
{"id": "def", "title": "Dos"}
"#;
        let entries = parse_entries(stdout);
        assert_eq!(entries.len(), 2);

        let entries: Vec<CatalogEntry> = entries.into_iter().filter_map(YtDlpInfo::into_entry).collect();
        assert_eq!(entries[0].url, "https://www.youtube.com/watch?v=abc");
        assert_eq!(entries[0].artist.as_deref(), Some("Canal"));
        assert_eq!(entries[0].duration, Some(Duration::from_secs(212)));
        assert_eq!(entries[1].url, "https://www.youtube.com/watch?v=def");
    }

    #[test]
    fn test_webpage_url_wins_over_stream_url() {
        let info: YtDlpInfo = serde_json::from_str(
            r#"{"id": "abc", "title": "Uno", "webpage_url": "https://www.youtube.com/watch?v=abc", "url": "https://rr3.googlevideo.com/videoplayback?x=1"}"#,
        )
        .unwrap();

        assert_eq!(
            info.into_entry().unwrap().url,
            "https://www.youtube.com/watch?v=abc"
        );
    }

    #[test]
    fn test_rate_limit_is_classified() {
        assert_eq!(
            classify_failure("ERROR: HTTP Error 429: Too Many Requests"),
            ResolutionError::RateLimited {
                provider: "yt-dlp",
                retry_after: None
            }
        );
        assert!(matches!(
            classify_failure("ERROR: Video unavailable"),
            ResolutionError::Provider { .. }
        ));
    }
}
