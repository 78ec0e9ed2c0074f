use async_trait::async_trait;
use base64::Engine;
use reqwest::{header, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use super::{StreamingCatalog, StreamingPage, StreamingTrack};
use crate::error::ResolutionError;

const PROVIDER: &str = "Spotify";
const API_BASE: &str = "https://api.spotify.com/v1";
const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const MAX_RETRIES: u32 = 3;
/// Esperas más largas se reportan como `RateLimited` en vez de dormir
const MAX_RETRY_WAIT: Duration = Duration::from_secs(30);

/// Tipo de colección de Spotify
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionKind {
    Playlist,
    Album,
}

impl CollectionKind {
    pub fn fallback_title(&self) -> &'static str {
        match self {
            CollectionKind::Playlist => "Playlist de Spotify",
            CollectionKind::Album => "Álbum de Spotify",
        }
    }

    fn path(&self) -> &'static str {
        match self {
            CollectionKind::Playlist => "playlists",
            CollectionKind::Album => "albums",
        }
    }

    fn page_size(&self) -> usize {
        match self {
            CollectionKind::Playlist => 100,
            CollectionKind::Album => 50,
        }
    }
}

/// Referencia a un recurso de Spotify
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpotifyRef {
    Track(String),
    Collection(CollectionKind, String),
}

/// Verifica si la entrada es una URL o URI de Spotify
pub fn is_spotify_url(input: &str) -> bool {
    input.starts_with("spotify:") || input.contains("spotify.com/")
}

impl SpotifyRef {
    /// Acepta `https://open.spotify.com/[intl-xx/]<tipo>/<id>` y `spotify:<tipo>:<id>`
    pub fn parse(input: &str) -> Result<Self, ResolutionError> {
        let (kind, id) = if let Some(rest) = input.strip_prefix("spotify:") {
            let mut parts = rest.split(':');
            (
                parts.next().unwrap_or_default().to_string(),
                parts.next().unwrap_or_default().to_string(),
            )
        } else {
            let url = Url::parse(input).map_err(|_| ResolutionError::MalformedUrl(input.to_string()))?;
            let segments: Vec<&str> = url
                .path_segments()
                .map(|segments| {
                    segments
                        .filter(|s| !s.is_empty() && !s.starts_with("intl-"))
                        .collect()
                })
                .unwrap_or_default();

            match segments.as_slice() {
                [kind, id, ..] => (kind.to_string(), id.to_string()),
                _ => return Err(ResolutionError::MalformedUrl(input.to_string())),
            }
        };

        if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ResolutionError::MalformedUrl(input.to_string()));
        }

        match kind.as_str() {
            "track" => Ok(SpotifyRef::Track(id)),
            "playlist" => Ok(SpotifyRef::Collection(CollectionKind::Playlist, id)),
            "album" => Ok(SpotifyRef::Collection(CollectionKind::Album, id)),
            _ => Err(ResolutionError::Unsupported(input.to_string())),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Clone)]
struct AccessToken {
    value: String,
    expires_at: Instant,
}

#[derive(Debug, Deserialize)]
struct ApiArtist {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ApiTrack {
    name: String,
    #[serde(default)]
    artists: Vec<ApiArtist>,
}

impl From<ApiTrack> for StreamingTrack {
    fn from(track: ApiTrack) -> Self {
        Self {
            name: track.name,
            artists: track.artists.into_iter().map(|a| a.name).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Named {
    name: String,
}

#[derive(Debug, Deserialize)]
struct PlaylistItem {
    track: Option<ApiTrack>,
}

#[derive(Debug, Deserialize)]
struct Paging<T> {
    items: Vec<T>,
    next: Option<String>,
}

impl From<Paging<PlaylistItem>> for StreamingPage {
    fn from(page: Paging<PlaylistItem>) -> Self {
        let total = page.items.len();
        let items: Vec<StreamingTrack> = page
            .items
            .into_iter()
            .filter_map(|item| item.track)
            .map(StreamingTrack::from)
            .collect();

        Self {
            skipped: total - items.len(),
            items,
            next: page.next,
        }
    }
}

impl From<Paging<ApiTrack>> for StreamingPage {
    fn from(page: Paging<ApiTrack>) -> Self {
        Self {
            items: page.items.into_iter().map(StreamingTrack::from).collect(),
            skipped: 0,
            next: page.next,
        }
    }
}

/// Cliente de la Web API de Spotify (client credentials)
pub struct SpotifyClient {
    http: reqwest::Client,
    api_base: String,
    token_url: String,
    client_id: String,
    client_secret: String,
    token: Mutex<Option<AccessToken>>,
}

impl SpotifyClient {
    pub fn new(http: reqwest::Client, client_id: String, client_secret: String) -> Self {
        Self::with_endpoints(http, client_id, client_secret, API_BASE, TOKEN_URL)
    }

    /// Cliente contra otros endpoints de la API y de tokens
    pub fn with_endpoints(
        http: reqwest::Client,
        client_id: String,
        client_secret: String,
        api_base: impl Into<String>,
        token_url: impl Into<String>,
    ) -> Self {
        Self {
            http,
            api_base: api_base.into(),
            token_url: token_url.into(),
            client_id,
            client_secret,
            token: Mutex::new(None),
        }
    }

    /// Token vigente, pidiendo uno nuevo si expiró
    async fn access_token(&self) -> Result<String, ResolutionError> {
        let mut token = self.token.lock().await;

        if let Some(current) = token.as_ref() {
            if current.expires_at > Instant::now() + Duration::from_secs(30) {
                return Ok(current.value.clone());
            }
        }

        debug!("🔑 Solicitando token de Spotify");
        let credentials = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:{}", self.client_id, self.client_secret));

        let response = self
            .http
            .post(&self.token_url)
            .header(header::AUTHORIZATION, format!("Basic {}", credentials))
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body("grant_type=client_credentials")
            .send()
            .await
            .map_err(|e| ResolutionError::provider(PROVIDER, e))?;

        if !response.status().is_success() {
            return Err(ResolutionError::provider(
                PROVIDER,
                format!("token rechazado ({})", response.status()),
            ));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| ResolutionError::provider(PROVIDER, e))?;

        let value = body.access_token.clone();
        *token = Some(AccessToken {
            value: body.access_token,
            expires_at: Instant::now() + Duration::from_secs(body.expires_in),
        });

        Ok(value)
    }

    async fn invalidate_token(&self) {
        *self.token.lock().await = None;
    }

    /// GET con reintentos para 429/5xx, respetando `Retry-After`.
    ///
    /// Un 401 renueva el token una sola vez y no cuenta como reintento.
    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, ResolutionError> {
        let mut retries = 0;
        let mut refreshed = false;

        loop {
            let token = self.access_token().await?;
            let response = self
                .http
                .get(url)
                .bearer_auth(token)
                .send()
                .await
                .map_err(|e| ResolutionError::provider(PROVIDER, e))?;

            let status = response.status();
            if status.is_success() {
                return response
                    .json()
                    .await
                    .map_err(|e| ResolutionError::provider(PROVIDER, e));
            }

            match status {
                StatusCode::UNAUTHORIZED if !refreshed => {
                    debug!("🔑 Token rechazado, renovando");
                    refreshed = true;
                    self.invalidate_token().await;
                }
                StatusCode::NOT_FOUND => return Err(ResolutionError::NoResults(url.to_string())),
                s if s == StatusCode::TOO_MANY_REQUESTS || s.is_server_error() => {
                    retries += 1;
                    let retry_after = retry_after(response.headers());
                    let wait = retry_after.unwrap_or_else(|| backoff(retries));

                    if retries > MAX_RETRIES || wait > MAX_RETRY_WAIT {
                        return Err(if s == StatusCode::TOO_MANY_REQUESTS {
                            ResolutionError::RateLimited {
                                provider: PROVIDER,
                                retry_after,
                            }
                        } else {
                            ResolutionError::provider(PROVIDER, format!("{} en {}", status, url))
                        });
                    }

                    warn!(
                        "⏳ Spotify respondió {} en {}, reintentando en {}",
                        status,
                        url,
                        humantime::format_duration(wait)
                    );
                    tokio::time::sleep(wait).await;
                }
                _ => {
                    return Err(ResolutionError::provider(
                        PROVIDER,
                        format!("{} en {}", status, url),
                    ))
                }
            }
        }
    }
}

fn retry_after(headers: &header::HeaderMap) -> Option<Duration> {
    headers
        .get(header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn backoff(attempt: u32) -> Duration {
    Duration::from_millis(500 * 2u64.pow(attempt.saturating_sub(1)))
}

#[async_trait]
impl StreamingCatalog for SpotifyClient {
    async fn track(&self, id: &str) -> Result<StreamingTrack, ResolutionError> {
        let track: ApiTrack = self.get_json(&format!("{}/tracks/{}", self.api_base, id)).await?;
        Ok(track.into())
    }

    async fn collection_title(&self, kind: CollectionKind, id: &str) -> Result<String, ResolutionError> {
        let url = match kind {
            CollectionKind::Playlist => format!("{}/playlists/{}?fields=name", self.api_base, id),
            CollectionKind::Album => format!("{}/albums/{}", self.api_base, id),
        };
        let named: Named = self.get_json(&url).await?;
        Ok(named.name)
    }

    async fn collection_page(
        &self,
        kind: CollectionKind,
        id: &str,
        cursor: Option<String>,
    ) -> Result<StreamingPage, ResolutionError> {
        let url = cursor.unwrap_or_else(|| {
            format!("{}/{}/{}/tracks?limit={}", self.api_base, kind.path(), id, kind.page_size())
        });
        debug!("📄 Página de Spotify: {}", url);

        let page: StreamingPage = match kind {
            CollectionKind::Playlist => self.get_json::<Paging<PlaylistItem>>(&url).await?.into(),
            CollectionKind::Album => self.get_json::<Paging<ApiTrack>>(&url).await?.into(),
        };

        if page.skipped > 0 {
            info!("⏭️ {} elementos sin pista en la página de {}", page.skipped, id);
        }

        Ok(page)
    }
}
