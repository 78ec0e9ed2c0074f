use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    #[serde(default)]
    pub application_id: u64,
    #[serde(default)]
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Spotify (opcional: sin credenciales no se resuelven URLs de Spotify)
    #[serde(default)]
    pub spotify_client_id: Option<String>,
    #[serde(default)]
    pub spotify_client_secret: Option<String>,

    // Audio
    #[serde(default = "default_volume")]
    pub default_volume: f32,

    // Cola
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,
    #[serde(default = "default_playlist_limit")]
    pub playlist_limit: usize,
    #[serde(default = "default_queue_preview_len")]
    pub queue_preview_len: usize,
    #[serde(default = "default_drain_concurrency")]
    pub drain_concurrency: usize,
}

fn default_volume() -> f32 {
    0.5
}

fn default_max_queue_size() -> usize {
    1000
}

fn default_playlist_limit() -> usize {
    100
}

fn default_queue_preview_len() -> usize {
    10
}

fn default_drain_concurrency() -> usize {
    4
}

impl Config {
    /// Carga la configuración desde `.env`, `jukebox.toml` (opcional) y variables de entorno
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let settings = config::Config::builder()
            .add_source(config::File::with_name("jukebox").required(false))
            .add_source(config::Environment::default().try_parsing(true))
            .build()
            .context("Error al leer la configuración")?;

        let config: Self = settings
            .try_deserialize()
            .context("Configuración inválida (¿falta DISCORD_TOKEN?)")?;

        // Validate configuration before returning
        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Volume must be between 0.0 and 2.0
    /// - Queue and playlist limits must be greater than 0
    /// - Spotify credentials must be provided together
    pub fn validate(&self) -> Result<()> {
        if self.default_volume < 0.0 || self.default_volume > 2.0 {
            anyhow::bail!("Default volume must be between 0.0 and 2.0, got: {}", self.default_volume);
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.playlist_limit == 0 {
            anyhow::bail!("Playlist limit must be greater than 0");
        }

        if self.queue_preview_len == 0 {
            anyhow::bail!("Queue preview length must be greater than 0");
        }

        if self.drain_concurrency == 0 {
            anyhow::bail!("Drain concurrency must be greater than 0");
        }

        if self.spotify_client_id.is_some() != self.spotify_client_secret.is_some() {
            anyhow::bail!("SPOTIFY_CLIENT_ID and SPOTIFY_CLIENT_SECRET must be set together");
        }

        Ok(())
    }

    /// Credenciales de Spotify si ambas están presentes
    pub fn spotify_credentials(&self) -> Option<(String, String)> {
        match (&self.spotify_client_id, &self.spotify_client_secret) {
            (Some(id), Some(secret)) => Some((id.clone(), secret.clone())),
            _ => None,
        }
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Tokens and secrets are never included.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {})\n  \
            Audio: {}% vol\n  \
            Queue: {} max, {} per playlist, {} in preview, {} drain workers\n  \
            Spotify: {}",
            self.application_id,
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            (self.default_volume * 100.0) as u32,
            self.max_queue_size,
            self.playlist_limit,
            self.queue_preview_len,
            self.drain_concurrency,
            if self.spotify_credentials().is_some() { "enabled" } else { "disabled" },
        )
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            application_id: 0,
            guild_id: None,

            spotify_client_id: None,
            spotify_client_secret: None,

            default_volume: default_volume(),

            max_queue_size: default_max_queue_size(),
            playlist_limit: default_playlist_limit(),
            queue_preview_len: default_queue_preview_len(),
            drain_concurrency: default_drain_concurrency(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.playlist_limit, 100);
    }

    #[test]
    fn test_rejects_half_spotify_credentials() {
        let config = Config {
            spotify_client_id: Some("id".into()),
            ..Config::default()
        };
        assert!(config.validate().is_err());
        assert!(config.spotify_credentials().is_none());
    }

    #[test]
    fn test_rejects_zero_playlist_limit() {
        let config = Config {
            playlist_limit: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_summary_hides_secrets() {
        let config = Config {
            discord_token: "super-secret".into(),
            spotify_client_id: Some("id".into()),
            spotify_client_secret: Some("hidden".into()),
            ..Config::default()
        };
        let summary = config.summary();
        assert!(!summary.contains("super-secret"));
        assert!(!summary.contains("hidden"));
        assert!(summary.contains("Spotify: enabled"));
    }
}
