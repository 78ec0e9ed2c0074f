use serenity::model::id::UserId;
use std::path::{Path, PathBuf};

use super::{AudioSource, TrackDescriptor};

/// Verifica si la entrada apunta a un archivo local existente
pub async fn is_local_file(input: &str) -> bool {
    match tokio::fs::metadata(input).await {
        Ok(metadata) => metadata.is_file(),
        Err(_) => false,
    }
}

/// Pista para un archivo local; el título es el nombre del archivo
pub fn descriptor(path: PathBuf, requested_by: UserId) -> TrackDescriptor {
    let title = file_title(&path);
    let uri = path.to_string_lossy().into_owned();
    TrackDescriptor::new(title, uri, AudioSource::File(path), requested_by)
}

fn file_title(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_existing_file_is_local() {
        let mut file = tempfile::Builder::new().suffix(".mp3").tempfile().unwrap();
        file.write_all(b"ID3").unwrap();

        assert!(is_local_file(file.path().to_str().unwrap()).await);
    }

    #[tokio::test]
    async fn test_directories_and_missing_paths_are_not_local() {
        let dir = tempfile::tempdir().unwrap();

        assert!(!is_local_file(dir.path().to_str().unwrap()).await);
        assert!(!is_local_file("/definitely/not/here.mp3").await);
    }

    #[test]
    fn test_descriptor_uses_file_name() {
        let track = descriptor(PathBuf::from("/music/intro.flac"), UserId::new(3));

        assert_eq!(track.title(), "intro.flac");
        assert_eq!(track.source_uri(), "/music/intro.flac");
        assert_eq!(
            track.audio(),
            &AudioSource::File(PathBuf::from("/music/intro.flac"))
        );
    }
}
