use thiserror::Error;
use uuid::Uuid;

/// Enumerates high-level errors returned by this library.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Represents an annotation whose end does not come after its start.
    #[error("invalid timestamps: end_time ({end_time}) must be greater than start_time ({start_time}), and start_time must not be negative")]
    InvalidRange { start_time: f64, end_time: f64 },

    /// Represents a non-positive or non-finite duration.
    #[error("invalid duration: {0}")]
    InvalidDuration(f64),

    /// Represents a speech speed outside the supported range.
    #[error("invalid speed: {0} (must be between 0.25 and 4.0)")]
    InvalidSpeed(f32),

    /// Represents an unrecognized voice name.
    #[error("invalid voice: {0}")]
    InvalidVoice(String),

    /// Represents a video title that is empty after normalization.
    #[error("title must not be empty")]
    EmptyTitle,

    /// Represents a request to synthesize speech with no text.
    #[error("no text to synthesize")]
    MissingText,

    /// Represents a request body that could not be read as the expected
    /// JSON.
    #[error("malformed request body: {0}")]
    MalformedBody(String),

    /// Represents a request body over the accepted size.
    #[error("request body exceeds {0} bytes")]
    BodyTooLarge(u64),

    /// Represents an ID that could not be parsed.
    #[error("invalid ID: {0}")]
    InvalidId(String),

    /// Represents a record absent from storage.
    #[error("{entity} not found: {id}")]
    NotFound { entity: Entity, id: Uuid },

    /// Represents a request for the audio of a voice script that has
    /// none attached.
    #[error("voice script {0} has no audio")]
    NoAudio(Uuid),

    /// Represents a generation request made without a configured
    /// credential.
    #[error("generation service is not configured")]
    GenerationUnavailable,

    /// Represents an error returned by the generation service.
    #[error("generation failed: {message}")]
    GenerationFailed { message: String },

    /// Represents a write that storage acknowledged without returning
    /// the record.
    #[error("failed to persist {entity}")]
    PersistenceFailed { entity: Entity },

    /// Represents a stored audio payload that is not valid base64.
    #[error("stored audio is malformed")]
    MalformedAudio { source: base64::DecodeError },

    /// Represents an SQL error.
    #[error("SQLx error")]
    Sqlx { source: sqlx::Error },
}

impl BackendError {
    pub fn not_found(entity: Entity, id: Uuid) -> Self {
        BackendError::NotFound { entity, id }
    }

    pub fn generation_failed(message: impl Into<String>) -> Self {
        BackendError::GenerationFailed {
            message: message.into(),
        }
    }
}

/// The kinds of record kept in storage.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Entity {
    Video,
    Annotation,
    VoiceScript,
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Entity::Video => "video",
            Entity::Annotation => "annotation",
            Entity::VoiceScript => "voice script",
        };

        f.write_str(name)
    }
}
