//! # Sources Module
//!
//! Turns whatever the user typed after `/play` into playable tracks.
//!
//! Input is classified in a fixed order, first match wins:
//!
//! 1. An existing local file
//! 2. A YouTube URL (single video or playlist)
//! 3. A Spotify URL or URI (track, playlist or album)
//! 4. A direct `http(s)` link to an audio file
//! 5. Free text without a scheme, searched on YouTube
//!
//! Anything else is rejected as unsupported. Spotify collections are never
//! resolved in one go: the first item is searched right away and the rest is
//! handed back as a list of search queries that the session drains in the
//! background (see [`drain`]).

pub mod drain;
pub mod local;
pub mod spotify;
pub mod youtube;

use async_trait::async_trait;
use regex::Regex;
use serenity::model::id::UserId;
use std::{
    path::PathBuf,
    sync::{Arc, LazyLock},
    time::Duration,
};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::ResolutionError;

pub use local::is_local_file;
pub use spotify::{CollectionKind, SpotifyClient, SpotifyRef};
pub use youtube::YtDlpClient;

/// Receta para abrir el audio de una pista en el momento de reproducirla
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioSource {
    /// Archivo en el sistema de archivos local
    File(PathBuf),
    /// Página que yt-dlp convierte en stream al abrirse
    YtDlp(String),
    /// Stream HTTP directo
    Http(String),
}

/// Representa un track resuelto y listo para encolar
#[derive(Debug, Clone, PartialEq)]
pub struct TrackDescriptor {
    title: String,
    source_uri: String,
    audio: AudioSource,
    artist: Option<String>,
    duration: Option<Duration>,
    thumbnail: Option<String>,
    requested_by: UserId,
}

impl TrackDescriptor {
    pub fn new(
        title: impl Into<String>,
        source_uri: impl Into<String>,
        audio: AudioSource,
        requested_by: UserId,
    ) -> Self {
        Self {
            title: title.into(),
            source_uri: source_uri.into(),
            audio,
            artist: None,
            duration: None,
            thumbnail: None,
            requested_by,
        }
    }

    // Getters
    pub fn title(&self) -> &str {
        &self.title
    }
    /// Lo que hay que volver a resolver para obtener esta pista de nuevo
    pub fn source_uri(&self) -> &str {
        &self.source_uri
    }
    pub fn audio(&self) -> &AudioSource {
        &self.audio
    }
    pub fn artist(&self) -> Option<&str> {
        self.artist.as_deref()
    }
    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }
    pub fn thumbnail(&self) -> Option<&str> {
        self.thumbnail.as_deref()
    }
    pub fn requested_by(&self) -> UserId {
        self.requested_by
    }

    // Builders
    pub fn with_artist(mut self, artist: String) -> Self {
        self.artist = Some(artist);
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_thumbnail(mut self, thumbnail: String) -> Self {
        self.thumbnail = Some(thumbnail);
        self
    }
}

/// Resultado de resolver una entrada
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    Track(TrackDescriptor),
    Tracks {
        title: String,
        tracks: Vec<TrackDescriptor>,
    },
    Deferred(DeferredCollection),
}

/// Colección cuyo primer elemento ya está resuelto; el resto se drena después
#[derive(Debug, Clone, PartialEq)]
pub struct DeferredCollection {
    pub title: String,
    pub first: TrackDescriptor,
    pub remaining: Vec<String>,
    /// Elementos descartados antes de encontrar el primero (sin pista o sin resultados)
    pub skipped: usize,
}

/// Entrada de un catálogo de video (búsqueda, video o elemento de playlist)
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    pub title: String,
    pub url: String,
    pub artist: Option<String>,
    pub duration: Option<Duration>,
    pub thumbnail: Option<String>,
}

impl CatalogEntry {
    pub fn into_descriptor(self, requested_by: UserId) -> TrackDescriptor {
        let mut track = TrackDescriptor::new(
            self.title,
            self.url.clone(),
            AudioSource::YtDlp(self.url),
            requested_by,
        );

        if let Some(artist) = self.artist {
            track = track.with_artist(artist);
        }

        if let Some(duration) = self.duration {
            track = track.with_duration(duration);
        }

        if let Some(thumbnail) = self.thumbnail {
            track = track.with_thumbnail(thumbnail);
        }

        track
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CatalogCollection {
    pub title: String,
    pub entries: Vec<CatalogEntry>,
}

/// Proveedor de videos (búsqueda, videos sueltos y playlists)
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VideoCatalog: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<CatalogEntry>, ResolutionError>;

    async fn lookup(&self, url: &str) -> Result<CatalogEntry, ResolutionError>;

    async fn collection(&self, url: &str, limit: usize) -> Result<CatalogCollection, ResolutionError>;

    /// Como `search`, con un cupo aparte para el trabajo en segundo plano
    async fn background_search(&self, query: &str, limit: usize) -> Result<Vec<CatalogEntry>, ResolutionError> {
        self.search(query, limit).await
    }
}

/// Pista de un servicio de streaming, solo metadata
#[derive(Debug, Clone, PartialEq)]
pub struct StreamingTrack {
    pub name: String,
    pub artists: Vec<String>,
}

impl StreamingTrack {
    /// Consulta de texto equivalente para buscar la pista en YouTube
    pub fn search_query(&self) -> String {
        match self.artists.first() {
            Some(artist) => format!("{} {}", self.name, artist),
            None => self.name.clone(),
        }
    }
}

/// Página de una colección paginada
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamingPage {
    pub items: Vec<StreamingTrack>,
    /// Elementos de la página sin pista utilizable
    pub skipped: usize,
    /// Cursor de continuación; `None` cuando no hay más páginas
    pub next: Option<String>,
}

/// Proveedor de metadata de un servicio de streaming
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StreamingCatalog: Send + Sync {
    async fn track(&self, id: &str) -> Result<StreamingTrack, ResolutionError>;

    async fn collection_title(&self, kind: CollectionKind, id: &str) -> Result<String, ResolutionError>;

    async fn collection_page(
        &self,
        kind: CollectionKind,
        id: &str,
        cursor: Option<String>,
    ) -> Result<StreamingPage, ResolutionError>;
}

/// Lo que el resto del bot necesita del resolvedor
#[async_trait]
pub trait TrackResolver: Send + Sync {
    async fn resolve(&self, input: &str, requested_by: UserId) -> Result<Resolved, ResolutionError>;

    /// Búsqueda de texto libre: el mejor resultado o `NoResults`
    async fn search(&self, query: &str, requested_by: UserId) -> Result<TrackDescriptor, ResolutionError>;

    /// Búsqueda de los drenados; no compite con los `/play` interactivos
    async fn background_search(
        &self,
        query: &str,
        requested_by: UserId,
    ) -> Result<TrackDescriptor, ResolutionError> {
        self.search(query, requested_by).await
    }

    /// Vuelve a resolver una pista desde su `source_uri` (modo loop)
    async fn reresolve(&self, track: &TrackDescriptor) -> Result<TrackDescriptor, ResolutionError> {
        match self.resolve(track.source_uri(), track.requested_by()).await? {
            Resolved::Track(fresh) => Ok(fresh),
            Resolved::Tracks { tracks, .. } => tracks
                .into_iter()
                .next()
                .ok_or_else(|| ResolutionError::NoResults(track.source_uri().to_string())),
            Resolved::Deferred(collection) => Ok(collection.first),
        }
    }
}

/// Tipo de entrada detectado
#[derive(Debug, Clone, PartialEq)]
pub enum InputKind {
    LocalFile(PathBuf),
    Video { url: String, collection: bool },
    Streaming(SpotifyRef),
    Direct(Url),
    Search(String),
}

// Cualquier ruta de youtube.com (videos, shorts, live, canales) o youtu.be
static YOUTUBE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(https?://)?([a-z0-9-]+\.)*(youtube\.com|youtu\.be)(/|$)")
        .expect("regex de YouTube válida")
});

const AUDIO_EXTENSIONS: &[&str] = &["mp3", "ogg", "opus", "flac", "wav", "m4a", "aac", "webm"];

/// Verifica si una URL es de YouTube
pub fn is_youtube_url(url: &str) -> bool {
    YOUTUBE_URL.is_match(url)
}

/// Una URL de YouTube es colección si trae una lista
pub fn is_youtube_collection(url: &str) -> bool {
    url.contains("list=") || url.contains("/playlist")
}

/// URL `http(s)` que apunta directamente a un archivo de audio
pub fn direct_audio_url(input: &str) -> Option<Url> {
    let url = Url::parse(input).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }

    let extension = url.path().rsplit_once('.')?.1.to_ascii_lowercase();
    AUDIO_EXTENSIONS.contains(&extension.as_str()).then_some(url)
}

/// Pista para un stream HTTP directo; el título es el último segmento de la ruta
fn direct_descriptor(url: Url, requested_by: UserId) -> TrackDescriptor {
    let title = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|segment| !segment.is_empty())
        .unwrap_or("Stream")
        .to_string();

    TrackDescriptor::new(title, url.as_str(), AudioSource::Http(url.to_string()), requested_by)
}

/// Clasifica la entrada del usuario
pub async fn classify(input: &str) -> Result<InputKind, ResolutionError> {
    let input = input.trim();

    if input.is_empty() {
        return Err(ResolutionError::Unsupported("entrada vacía".to_string()));
    }

    if is_local_file(input).await {
        return Ok(InputKind::LocalFile(PathBuf::from(input)));
    }

    if is_youtube_url(input) {
        return Ok(InputKind::Video {
            url: input.to_string(),
            collection: is_youtube_collection(input),
        });
    }

    if spotify::is_spotify_url(input) {
        return SpotifyRef::parse(input).map(InputKind::Streaming);
    }

    if let Some(url) = direct_audio_url(input) {
        return Ok(InputKind::Direct(url));
    }

    if !input.contains("://") {
        return Ok(InputKind::Search(input.to_string()));
    }

    Err(ResolutionError::Unsupported(input.to_string()))
}

/// Resolvedor concreto sobre yt-dlp y (opcionalmente) Spotify
pub struct SourceResolver {
    video: Arc<dyn VideoCatalog>,
    streaming: Option<Arc<dyn StreamingCatalog>>,
    playlist_limit: usize,
}

impl SourceResolver {
    pub fn new(
        video: Arc<dyn VideoCatalog>,
        streaming: Option<Arc<dyn StreamingCatalog>>,
        playlist_limit: usize,
    ) -> Self {
        Self {
            video,
            streaming,
            playlist_limit: playlist_limit.max(1),
        }
    }

    async fn resolve_video(
        &self,
        url: &str,
        collection: bool,
        requested_by: UserId,
    ) -> Result<Resolved, ResolutionError> {
        if !collection {
            let entry = self.video.lookup(url).await?;
            return Ok(Resolved::Track(entry.into_descriptor(requested_by)));
        }

        let collection = self.video.collection(url, self.playlist_limit).await?;
        if collection.entries.is_empty() {
            return Err(ResolutionError::EmptyCollection(collection.title));
        }

        info!(
            "📋 Playlist de YouTube '{}' con {} entradas",
            collection.title,
            collection.entries.len()
        );

        Ok(Resolved::Tracks {
            title: collection.title,
            tracks: collection
                .entries
                .into_iter()
                .take(self.playlist_limit)
                .map(|entry| entry.into_descriptor(requested_by))
                .collect(),
        })
    }

    async fn resolve_streaming(
        &self,
        reference: SpotifyRef,
        requested_by: UserId,
    ) -> Result<Resolved, ResolutionError> {
        let catalog = self
            .streaming
            .as_ref()
            .ok_or(ResolutionError::MissingCredentials("Spotify"))?;

        match reference {
            SpotifyRef::Track(id) => {
                let track = catalog.track(&id).await?;
                self.search(&track.search_query(), requested_by)
                    .await
                    .map(Resolved::Track)
            }
            SpotifyRef::Collection(kind, id) => {
                let title = catalog
                    .collection_title(kind, &id)
                    .await
                    .unwrap_or_else(|e| {
                        warn!("⚠️ No se pudo obtener el nombre de la colección {}: {}", id, e);
                        kind.fallback_title().to_string()
                    });

                let (queries, mut skipped) = self.collect_queries(catalog.as_ref(), kind, &id).await?;
                if queries.is_empty() {
                    return Err(ResolutionError::EmptyCollection(title));
                }

                info!("🎵 Colección de Spotify '{}' con {} pistas", title, queries.len());

                // La primera que se resuelva arranca la reproducción; el resto se drena
                let mut queries = queries.into_iter();
                while let Some(query) = queries.next() {
                    match self.search(&query, requested_by).await {
                        Ok(first) => {
                            return Ok(Resolved::Deferred(DeferredCollection {
                                title,
                                first,
                                remaining: queries.collect(),
                                skipped,
                            }));
                        }
                        Err(e) => {
                            warn!("⏭️ Saltando '{}' de la colección: {}", query, e);
                            skipped += 1;
                        }
                    }
                }

                Err(ResolutionError::NoResults(title))
            }
        }
    }

    /// Recorre todas las páginas hasta agotarlas o llegar al límite
    async fn collect_queries(
        &self,
        catalog: &dyn StreamingCatalog,
        kind: CollectionKind,
        id: &str,
    ) -> Result<(Vec<String>, usize), ResolutionError> {
        let mut queries = Vec::new();
        let mut skipped = 0;
        let mut cursor = None;

        loop {
            let page = catalog.collection_page(kind, id, cursor.take()).await?;
            skipped += page.skipped;
            queries.extend(page.items.iter().map(StreamingTrack::search_query));

            if queries.len() >= self.playlist_limit {
                queries.truncate(self.playlist_limit);
                debug!("Límite de {} pistas alcanzado en {}", self.playlist_limit, id);
                break;
            }

            match page.next {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        Ok((queries, skipped))
    }
}

#[async_trait]
impl TrackResolver for SourceResolver {
    async fn resolve(&self, input: &str, requested_by: UserId) -> Result<Resolved, ResolutionError> {
        match classify(input).await? {
            InputKind::LocalFile(path) => Ok(Resolved::Track(local::descriptor(path, requested_by))),
            InputKind::Video { url, collection } => {
                self.resolve_video(&url, collection, requested_by).await
            }
            InputKind::Streaming(reference) => self.resolve_streaming(reference, requested_by).await,
            InputKind::Direct(url) => Ok(Resolved::Track(direct_descriptor(url, requested_by))),
            InputKind::Search(query) => self.search(&query, requested_by).await.map(Resolved::Track),
        }
    }

    async fn search(&self, query: &str, requested_by: UserId) -> Result<TrackDescriptor, ResolutionError> {
        let entries = self.video.search(query, 1).await?;
        best_match(entries, query, requested_by)
    }

    async fn background_search(
        &self,
        query: &str,
        requested_by: UserId,
    ) -> Result<TrackDescriptor, ResolutionError> {
        let entries = self.video.background_search(query, 1).await?;
        best_match(entries, query, requested_by)
    }
}

fn best_match(
    entries: Vec<CatalogEntry>,
    query: &str,
    requested_by: UserId,
) -> Result<TrackDescriptor, ResolutionError> {
    entries
        .into_iter()
        .next()
        .map(|entry| entry.into_descriptor(requested_by))
        .ok_or_else(|| ResolutionError::NoResults(query.to_string()))
}
