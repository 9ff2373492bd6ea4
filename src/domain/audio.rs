//! Audio container formats accepted from recorders.

/// Audio container of an uploaded or generated clip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    /// WebM/Opus (browser MediaRecorder default)
    WebM,
    /// OGG Opus
    Ogg,
    /// MP3
    Mp3,
    /// AAC in an MP4 container
    M4a,
    /// WAV
    Wav,
}

impl AudioFormat {
    /// Resolve a MIME type; parameters such as `;codecs=opus` are ignored.
    ///
    /// Unknown or missing types fall back to WebM, the recorder's container.
    pub fn from_mime(mime: Option<&str>) -> Self {
        let essence = mime
            .and_then(|m| m.split(';').next())
            .map(|m| m.trim().to_ascii_lowercase())
            .unwrap_or_default();

        match essence.as_str() {
            "audio/ogg" | "audio/opus" => Self::Ogg,
            "audio/mpeg" | "audio/mp3" => Self::Mp3,
            "audio/mp4" | "audio/m4a" | "audio/x-m4a" | "audio/aac" => Self::M4a,
            "audio/wav" | "audio/x-wav" | "audio/wave" => Self::Wav,
            _ => Self::WebM,
        }
    }

    /// Resolve a storage file name by its extension
    pub fn from_path(path: &str) -> Option<Self> {
        let (_, extension) = path.rsplit_once('.')?;
        match extension.to_ascii_lowercase().as_str() {
            "webm" => Some(Self::WebM),
            "ogg" => Some(Self::Ogg),
            "mp3" => Some(Self::Mp3),
            "m4a" => Some(Self::M4a),
            "wav" => Some(Self::Wav),
            _ => None,
        }
    }

    /// Canonical MIME type
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::WebM => "audio/webm",
            Self::Ogg => "audio/ogg",
            Self::Mp3 => "audio/mpeg",
            Self::M4a => "audio/mp4",
            Self::Wav => "audio/wav",
        }
    }

    /// File extension used in storage paths
    pub fn extension(&self) -> &'static str {
        match self {
            Self::WebM => "webm",
            Self::Ogg => "ogg",
            Self::Mp3 => "mp3",
            Self::M4a => "m4a",
            Self::Wav => "wav",
        }
    }
}
