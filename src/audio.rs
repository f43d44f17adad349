use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use log::{debug, info, warn, Logger};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::Db;
use crate::errors::{BackendError, Entity};
use crate::generation::{self, SafeGenerator, SpeechRequest};
use crate::video;
use crate::voice_script::{self, AudioAttachment, VoiceScript};

pub mod voice;

pub use self::voice::{Speed, Voice};

/// The MIME type of everything the synthesizer produces.
pub const AUDIO_MIME_TYPE: &str = "audio/mpeg";

pub fn encode(raw: &[u8]) -> String {
    STANDARD.encode(raw)
}

pub fn decode(payload: &str) -> Result<Vec<u8>, BackendError> {
    STANDARD
        .decode(payload)
        .map_err(|source| BackendError::MalformedAudio { source })
}

/// Returns a fresh name for a synthesized file.
pub fn new_filename() -> String {
    format!("speech_{}.mp3", Uuid::new_v4().to_simple())
}

/// Speech returned by the synthesizer, ready to store.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GeneratedAudio {
    /// The audio, base64-encoded.
    pub audio_data: String,
    pub filename: String,
    pub voice: Voice,
    pub speed: Speed,
    pub size_bytes: i64,
}

impl From<GeneratedAudio> for AudioAttachment {
    fn from(audio: GeneratedAudio) -> Self {
        AudioAttachment {
            payload: audio.audio_data,
            filename: audio.filename,
            voice: audio.voice,
            speed: audio.speed,
            size_bytes: audio.size_bytes,
        }
    }
}

/// Client-supplied synthesis options. Missing values fall back to the
/// configured defaults.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AudioOptions {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub voice: Option<Voice>,
    #[serde(default)]
    pub speed: Option<Speed>,
}

impl AudioOptions {
    pub fn with_defaults(self, voice: Voice, speed: Speed) -> AudioRequest {
        AudioRequest {
            text: self.text.filter(|t| !t.trim().is_empty()),
            voice: self.voice.unwrap_or(voice),
            speed: self.speed.unwrap_or(speed),
        }
    }
}

/// Client-supplied options for generating audio for a whole video.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BatchOptions {
    #[serde(default)]
    pub voice: Option<Voice>,
    #[serde(default)]
    pub speed: Option<Speed>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AudioRequest {
    /// What to say. When attaching to a voice script this defaults to
    /// its generated script.
    pub text: Option<String>,
    pub voice: Voice,
    pub speed: Speed,
}

/// What was stored on a voice script, without the audio itself.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AudioSummary {
    pub voice_script_id: Uuid,
    pub filename: String,
    pub voice: Voice,
    pub speed: Speed,
    pub size_bytes: i64,
}

impl AudioSummary {
    fn new(voice_script_id: Uuid, audio: &AudioAttachment) -> Self {
        Self {
            voice_script_id,
            filename: audio.filename.clone(),
            voice: audio.voice,
            speed: audio.speed,
            size_bytes: audio.size_bytes,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BatchFailure {
    pub voice_script_id: Uuid,
    pub error: String,
}

/// The outcome of generating audio for every script of a video.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BatchReport {
    pub video_id: Uuid,
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub results: Vec<AudioSummary>,
    pub errors: Vec<BatchFailure>,
}

/// Converts `text` to speech without storing it.
pub async fn synthesize(
    generator: Option<&SafeGenerator>,
    text: &str,
    voice: Voice,
    speed: Speed,
) -> Result<GeneratedAudio, BackendError> {
    let generator = generation::require(generator)?;
    let text = text.trim();

    if text.is_empty() {
        return Err(BackendError::MissingText);
    }

    let raw = generator
        .synthesize(SpeechRequest {
            text: text.to_owned(),
            voice,
            speed,
        })
        .await?;

    Ok(GeneratedAudio {
        audio_data: encode(&raw),
        filename: new_filename(),
        voice,
        speed,
        size_bytes: raw.len() as i64,
    })
}

/// Synthesizes speech for a voice script and stores it on the script.
pub async fn attach(
    db: &(dyn Db + Send + Sync),
    generator: Option<&SafeGenerator>,
    script_id: Uuid,
    request: AudioRequest,
) -> Result<AudioSummary, BackendError> {
    let generator = generation::require(generator)?;
    let script = voice_script::retrieve(db, script_id).await?;

    let text = request.text.unwrap_or(script.generated_script);
    let audio = synthesize(Some(generator), &text, request.voice, request.speed).await?;

    store(db, script_id, audio).await
}

async fn store(
    db: &(dyn Db + Send + Sync),
    script_id: Uuid,
    audio: GeneratedAudio,
) -> Result<AudioSummary, BackendError> {
    let script = db
        .set_audio(&script_id, Some(audio.into()))
        .await?
        .ok_or_else(|| BackendError::not_found(Entity::VoiceScript, script_id))?;

    script
        .audio
        .as_ref()
        .map(|audio| AudioSummary::new(script_id, audio))
        .ok_or(BackendError::PersistenceFailed {
            entity: Entity::VoiceScript,
        })
}

/// Generates and stores audio for every script of a video, one after
/// another. A failure is recorded against its script and the rest are
/// still processed. The video itself must exist.
pub async fn generate_for_video(
    db: &(dyn Db + Send + Sync),
    generator: Option<&SafeGenerator>,
    logger: &Logger,
    video_id: Uuid,
    voice: Voice,
    speed: Speed,
) -> Result<BatchReport, BackendError> {
    let generator = generation::require(generator)?;
    video::retrieve(db, video_id).await?;

    let scripts = voice_script::list_for_video(db, video_id).await?;
    let total = scripts.len();

    let mut results = Vec::with_capacity(total);
    let mut errors = Vec::new();

    for script in scripts {
        let id = script.id;
        debug!(logger, "Generating audio..."; "voice_script_id" => %id);

        let outcome = async {
            let audio = synthesize(Some(generator), &script.generated_script, voice, speed).await?;
            store(db, id, audio).await
        }
        .await;

        match outcome {
            Ok(summary) => results.push(summary),
            Err(e) => {
                warn!(logger, "Failed to generate audio"; "voice_script_id" => %id, "error" => %e);
                errors.push(BatchFailure {
                    voice_script_id: id,
                    error: e.to_string(),
                });
            }
        }
    }

    info!(logger, "Generated audio for video"; "video_id" => %video_id, "total" => total, "failed" => errors.len());

    Ok(BatchReport {
        video_id,
        total,
        successful: results.len(),
        failed: errors.len(),
        results,
        errors,
    })
}

/// Clears the audio of a voice script. Clearing a script that has no
/// audio succeeds.
pub async fn remove(
    db: &(dyn Db + Send + Sync),
    script_id: Uuid,
) -> Result<VoiceScript, BackendError> {
    db.set_audio(&script_id, None)
        .await?
        .ok_or_else(|| BackendError::not_found(Entity::VoiceScript, script_id))
}

/// Returns the decoded audio of a voice script and its filename.
pub async fn retrieve_audio(
    db: &(dyn Db + Send + Sync),
    script_id: Uuid,
) -> Result<(Vec<u8>, String), BackendError> {
    let script = voice_script::retrieve(db, script_id).await?;
    let audio = script.audio.ok_or(BackendError::NoAudio(script_id))?;

    Ok((decode(&audio.payload)?, audio.filename))
}

#[cfg(test)]
mod tests {
    use futures::future::{self, BoxFuture, FutureExt};
    use log::{o, Discard};

    use super::*;
    use crate::db::MemoryDb;
    use crate::generation::{Generator, Prompt};
    use crate::video::{self, NewVideo};
    use crate::voice_script::NewVoiceScript;

    /// Speaks every text as its own bytes, except texts containing
    /// `FAIL`.
    struct Parrot;

    impl Generator for Parrot {
        fn complete(&self, _: Prompt) -> BoxFuture<Result<String, BackendError>> {
            future::ready(Err(BackendError::generation_failed("not a writer"))).boxed()
        }

        fn synthesize(&self, request: SpeechRequest) -> BoxFuture<Result<Vec<u8>, BackendError>> {
            let result = if request.text.contains("FAIL") {
                Err(BackendError::generation_failed("rate limit exceeded"))
            } else {
                Ok(request.text.into_bytes())
            };

            future::ready(result).boxed()
        }
    }

    async fn scripts(db: &MemoryDb, texts: &[&str]) -> (Uuid, Vec<VoiceScript>) {
        let video = video::create(db, NewVideo::new("Demo", None)).await.unwrap();
        let mut created = Vec::new();

        for (index, text) in texts.iter().enumerate() {
            let script = voice_script::create(
                db,
                NewVoiceScript {
                    video_id: video.id,
                    annotation_id: None,
                    duration: 2.0,
                    original_annotation: "segment".to_owned(),
                    generated_script: (*text).to_owned(),
                    order_index: Some(index as i32),
                },
            )
            .await
            .unwrap();
            created.push(script);
        }

        (video.id, created)
    }

    fn request(text: Option<&str>) -> AudioRequest {
        AudioRequest {
            text: text.map(str::to_owned),
            voice: Voice::Onyx,
            speed: Speed::new(1.25).unwrap(),
        }
    }

    #[test]
    fn filenames_are_fresh_mp3s() {
        let first = new_filename();

        assert!(first.starts_with("speech_"));
        assert!(first.ends_with(".mp3"));
        assert_ne!(first, new_filename());
    }

    #[test]
    fn malformed_payloads_are_reported() {
        assert!(matches!(
            decode("not base64!"),
            Err(BackendError::MalformedAudio { .. })
        ));
    }

    #[test]
    fn options_fall_back_to_defaults() {
        let options: AudioOptions = serde_json::from_str(r#"{"text": "  ", "speed": 2.0}"#).unwrap();

        let request = options.with_defaults(Voice::Nova, Speed::default());

        assert_eq!(request.text, None);
        assert_eq!(request.voice, Voice::Nova);
        assert_eq!(request.speed.value(), 2.0);
    }

    #[tokio::test]
    async fn synthesis_requires_text_and_a_generator() {
        assert!(matches!(
            synthesize(Some(&Parrot), " \n", Voice::Alloy, Speed::default()).await,
            Err(BackendError::MissingText)
        ));
        assert!(matches!(
            synthesize(None, "hello", Voice::Alloy, Speed::default()).await,
            Err(BackendError::GenerationUnavailable)
        ));
    }

    #[tokio::test]
    async fn stored_audio_reads_back_identically() {
        let db = MemoryDb::default();
        let (_, created) = scripts(&db, &["Hello there"]).await;
        let id = created[0].id;

        let summary = attach(&db, Some(&Parrot), id, request(None)).await.unwrap();
        assert_eq!(summary.size_bytes, 11);
        assert_eq!(summary.voice, Voice::Onyx);

        let (raw, filename) = retrieve_audio(&db, id).await.unwrap();
        assert_eq!(raw, b"Hello there".to_vec());
        assert_eq!(filename, summary.filename);

        let script = voice_script::retrieve(&db, id).await.unwrap();
        assert!(script.has_audio());
        assert_eq!(script.audio.unwrap().speed.value(), 1.25);
    }

    #[tokio::test]
    async fn explicit_text_overrides_the_script() {
        let db = MemoryDb::default();
        let (_, created) = scripts(&db, &["Hello there"]).await;
        let id = created[0].id;

        attach(&db, Some(&Parrot), id, request(Some("Bye"))).await.unwrap();

        let (raw, _) = retrieve_audio(&db, id).await.unwrap();
        assert_eq!(raw, b"Bye".to_vec());
    }

    #[tokio::test]
    async fn attaching_to_missing_scripts_fails_first() {
        let db = MemoryDb::default();

        let result = attach(&db, Some(&Parrot), Uuid::new_v4(), request(Some("FAIL"))).await;

        assert!(matches!(
            result,
            Err(BackendError::NotFound { entity: Entity::VoiceScript, .. })
        ));
    }

    #[tokio::test]
    async fn batch_continues_past_failures() {
        let db = MemoryDb::default();
        let logger = Logger::root(Discard, o!());
        let (video_id, created) = scripts(&db, &["one", "two FAIL", "three", "four"]).await;

        let report = generate_for_video(
            &db,
            Some(&Parrot),
            &logger,
            video_id,
            Voice::Echo,
            Speed::default(),
        )
        .await
        .unwrap();

        assert_eq!(report.total, 4);
        assert_eq!(report.successful, 3);
        assert_eq!(report.failed, 1);
        assert_eq!(report.errors[0].voice_script_id, created[1].id);
        assert!(report.errors[0].error.contains("rate limit exceeded"));

        for (index, script) in created.iter().enumerate() {
            let stored = voice_script::retrieve(&db, script.id).await.unwrap();
            assert_eq!(stored.has_audio(), index != 1);
        }
    }

    #[tokio::test]
    async fn batch_for_a_missing_video_is_not_found() {
        let db = MemoryDb::default();
        let logger = Logger::root(Discard, o!());
        let missing = Uuid::new_v4();

        assert!(matches!(
            generate_for_video(&db, Some(&Parrot), &logger, missing, Voice::Echo, Speed::default()).await,
            Err(BackendError::NotFound { entity: Entity::Video, id }) if id == missing
        ));
    }

    #[tokio::test]
    async fn batch_over_a_video_without_scripts_is_empty() {
        let db = MemoryDb::default();
        let logger = Logger::root(Discard, o!());
        let (video_id, _) = scripts(&db, &[]).await;

        let report = generate_for_video(&db, Some(&Parrot), &logger, video_id, Voice::Echo, Speed::default())
            .await
            .unwrap();

        assert_eq!(report.total, 0);
        assert!(report.results.is_empty() && report.errors.is_empty());
    }

    #[tokio::test]
    async fn batch_requires_a_generator() {
        let db = MemoryDb::default();
        let logger = Logger::root(Discard, o!());
        let (video_id, _) = scripts(&db, &["one"]).await;

        assert!(matches!(
            generate_for_video(&db, None, &logger, video_id, Voice::Echo, Speed::default()).await,
            Err(BackendError::GenerationUnavailable)
        ));
    }

    #[tokio::test]
    async fn removing_audio_is_idempotent() {
        let db = MemoryDb::default();
        let (_, created) = scripts(&db, &["Hello"]).await;
        let id = created[0].id;

        attach(&db, Some(&Parrot), id, request(None)).await.unwrap();

        let cleared = remove(&db, id).await.unwrap();
        assert!(!cleared.has_audio());
        assert!(cleared.audio.is_none());

        let again = remove(&db, id).await.unwrap();
        assert!(!again.has_audio());

        assert!(matches!(
            retrieve_audio(&db, id).await,
            Err(BackendError::NoAudio(_))
        ));
        assert!(matches!(
            remove(&db, Uuid::new_v4()).await,
            Err(BackendError::NotFound { .. })
        ));
    }
}
