use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Un elemento reproducible: metadatos + handle opaco que entiende el backend.
///
/// The serialized shape (camelCase keys) is the one stored in persisted
/// queues, so renaming a field breaks restoring queues saved by older builds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub title: String,
    pub author: String,
    pub uri: Option<String>,
    pub artwork_uri: Option<String>,
    pub duration_ms: u64,
    pub backend_handle: String,
    pub source_name: Option<String>,
    pub seekable: bool,
}

impl Track {
    pub fn new(
        title: impl Into<String>,
        author: impl Into<String>,
        backend_handle: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            author: author.into(),
            uri: None,
            artwork_uri: None,
            duration_ms: 0,
            backend_handle: backend_handle.into(),
            source_name: None,
            seekable: false,
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration_ms = duration.as_millis() as u64;
        self.seekable = true;
        self
    }

    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    pub fn with_artwork(mut self, artwork_uri: impl Into<String>) -> Self {
        self.artwork_uri = Some(artwork_uri.into());
        self
    }

    pub fn with_source(mut self, source_name: impl Into<String>) -> Self {
        self.source_name = Some(source_name.into());
        self
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    /// Los streams en vivo no tienen duración conocida
    pub fn is_stream(&self) -> bool {
        self.duration_ms == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn serializes_with_camel_case_keys() {
        let track = Track::new("Song", "Artist", "https://youtu.be/abc")
            .with_duration(Duration::from_secs(90))
            .with_source("youtube");

        let json = serde_json::to_value(&track).unwrap();
        assert_eq!(json["durationMs"], 90_000);
        assert_eq!(json["backendHandle"], "https://youtu.be/abc");
        assert_eq!(json["sourceName"], "youtube");
        assert_eq!(json["artworkUri"], serde_json::Value::Null);
        assert_eq!(json["seekable"], true);
    }

    #[test]
    fn tracks_without_duration_are_streams() {
        let track = Track::new("Radio", "Station", "https://radio.example/live");
        assert!(track.is_stream());
        assert_eq!(track.duration(), Duration::ZERO);
    }
}
