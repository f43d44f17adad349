use std::convert::TryFrom;

use serde::{Deserialize, Deserializer, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::audio::{Speed, Voice};
use crate::db::Db;
use crate::errors::{BackendError, Entity};

/// Separates scripts in a combined script.
pub const SCRIPT_SEPARATOR: &str = "\n\n";

/// Narration generated for a segment of a video, optionally with
/// synthesized speech attached.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(try_from = "VoiceScriptView", into = "VoiceScriptView")]
pub struct VoiceScript {
    pub id: Uuid,
    pub video_id: Uuid,

    /// The annotation this script was written for. Never checked.
    pub annotation_id: Option<Uuid>,

    /// The length of the segment being narrated, in seconds.
    pub duration: f64,

    /// The description the script was generated from.
    pub original_annotation: String,

    pub generated_script: String,

    /// Position within the video's narration.
    pub order_index: Option<i32>,

    pub created_at: OffsetDateTime,

    /// The attached speech. Either all of it is present or none of it.
    pub audio: Option<AudioAttachment>,
}

impl VoiceScript {
    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }
}

/// Synthesized speech stored inline with its script.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioAttachment {
    /// The audio, base64-encoded.
    pub payload: String,
    pub filename: String,
    pub voice: Voice,
    pub speed: Speed,
    pub size_bytes: i64,
}

/// The client-supplied fields for creating a voice script.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct NewVoiceScript {
    pub video_id: Uuid,
    #[serde(default)]
    pub annotation_id: Option<Uuid>,
    pub duration: f64,
    pub original_annotation: String,
    pub generated_script: String,
    #[serde(default)]
    pub order_index: Option<i32>,
}

/// The fields of a voice script a client may change. Absent fields are
/// left as they are. Audio can only change through the audio
/// operations.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct VoiceScriptUpdate {
    /// `Some(None)` unlinks the script from its annotation.
    #[serde(default, deserialize_with = "deserialize_nullable")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotation_id: Option<Option<Uuid>>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub original_annotation: Option<String>,
    #[serde(default)]
    pub generated_script: Option<String>,
    /// `Some(None)` removes the script's position.
    #[serde(default, deserialize_with = "deserialize_nullable")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_index: Option<Option<i32>>,
}

/// Reads a present field as `Some`, so that an explicit `null` becomes
/// `Some(None)` while an absent field stays `None` through `default`.
fn deserialize_nullable<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Every script for a video in narration order, joined into one.
#[derive(Clone, Debug, Serialize)]
pub struct CombinedScript {
    pub video_id: Uuid,
    pub combined_script: String,
    pub total_duration: f64,
    pub script_count: usize,
    pub scripts: Vec<VoiceScript>,
}

/// Sorts scripts by ascending order index. Scripts without an index go
/// last. The relative order of equal indexes is unspecified.
pub fn order_scripts(scripts: &mut [VoiceScript]) {
    scripts.sort_by_key(|s| (s.order_index.is_none(), s.order_index));
}

pub fn combine(video_id: Uuid, mut scripts: Vec<VoiceScript>) -> CombinedScript {
    order_scripts(&mut scripts);

    let combined_script = scripts
        .iter()
        .map(|s| s.generated_script.as_str())
        .collect::<Vec<_>>()
        .join(SCRIPT_SEPARATOR);
    let total_duration = scripts.iter().map(|s| s.duration).sum();

    CombinedScript {
        video_id,
        combined_script,
        total_duration,
        script_count: scripts.len(),
        scripts,
    }
}

fn validate_duration(duration: f64) -> Result<f64, BackendError> {
    if duration.is_finite() && duration > 0.0 {
        Ok(duration)
    } else {
        Err(BackendError::InvalidDuration(duration))
    }
}

pub async fn create(
    db: &(dyn Db + Send + Sync),
    script: NewVoiceScript,
) -> Result<VoiceScript, BackendError> {
    validate_duration(script.duration)?;

    db.insert_voice_script(script).await
}

pub async fn retrieve(db: &(dyn Db + Send + Sync), id: Uuid) -> Result<VoiceScript, BackendError> {
    db.retrieve_voice_script(&id)
        .await?
        .ok_or_else(|| BackendError::not_found(Entity::VoiceScript, id))
}

pub async fn list_for_video(
    db: &(dyn Db + Send + Sync),
    video_id: Uuid,
) -> Result<Vec<VoiceScript>, BackendError> {
    let mut scripts = db.list_voice_scripts(&video_id).await?;
    order_scripts(&mut scripts);

    Ok(scripts)
}

pub async fn combined_for_video(
    db: &(dyn Db + Send + Sync),
    video_id: Uuid,
) -> Result<CombinedScript, BackendError> {
    let scripts = db.list_voice_scripts(&video_id).await?;

    Ok(combine(video_id, scripts))
}

pub async fn update(
    db: &(dyn Db + Send + Sync),
    id: Uuid,
    update: VoiceScriptUpdate,
) -> Result<VoiceScript, BackendError> {
    if let Some(duration) = update.duration {
        validate_duration(duration)?;
    }

    db.update_voice_script(&id, update)
        .await?
        .ok_or_else(|| BackendError::not_found(Entity::VoiceScript, id))
}

pub async fn delete(db: &(dyn Db + Send + Sync), id: Uuid) -> Result<VoiceScript, BackendError> {
    db.delete_voice_script(&id)
        .await?
        .ok_or_else(|| BackendError::not_found(Entity::VoiceScript, id))
}

/// The wire form of a voice script, with the audio spread over flat
/// fields.
#[derive(Clone, Debug, Deserialize, Serialize)]
struct VoiceScriptView {
    id: Uuid,
    video_id: Uuid,
    annotation_id: Option<Uuid>,
    duration: f64,
    original_annotation: String,
    generated_script: String,
    order_index: Option<i32>,
    #[serde(with = "time::serde::timestamp")]
    created_at: OffsetDateTime,
    has_audio: bool,
    audio_data: Option<String>,
    audio_filename: Option<String>,
    audio_voice: Option<Voice>,
    audio_speed: Option<Speed>,
    audio_size_bytes: Option<i64>,
}

impl From<VoiceScript> for VoiceScriptView {
    fn from(script: VoiceScript) -> Self {
        let VoiceScript {
            id,
            video_id,
            annotation_id,
            duration,
            original_annotation,
            generated_script,
            order_index,
            created_at,
            audio,
        } = script;

        let has_audio = audio.is_some();
        let (audio_data, audio_filename, audio_voice, audio_speed, audio_size_bytes) = match audio {
            Some(a) => (
                Some(a.payload),
                Some(a.filename),
                Some(a.voice),
                Some(a.speed),
                Some(a.size_bytes),
            ),
            None => (None, None, None, None, None),
        };

        VoiceScriptView {
            id,
            video_id,
            annotation_id,
            duration,
            original_annotation,
            generated_script,
            order_index,
            created_at,
            has_audio,
            audio_data,
            audio_filename,
            audio_voice,
            audio_speed,
            audio_size_bytes,
        }
    }
}

/// Raised when the flat audio fields describe a partial attachment.
#[derive(Debug, thiserror::Error)]
#[error("audio fields must be either all present with has_audio or all absent without it")]
pub struct PartialAudio;

impl TryFrom<VoiceScriptView> for VoiceScript {
    type Error = PartialAudio;

    fn try_from(view: VoiceScriptView) -> Result<Self, Self::Error> {
        let audio = match (
            view.has_audio,
            view.audio_data,
            view.audio_filename,
            view.audio_voice,
            view.audio_speed,
            view.audio_size_bytes,
        ) {
            (true, Some(payload), Some(filename), Some(voice), Some(speed), Some(size_bytes)) => {
                Some(AudioAttachment {
                    payload,
                    filename,
                    voice,
                    speed,
                    size_bytes,
                })
            }
            (false, None, None, None, None, None) => None,
            _ => return Err(PartialAudio),
        };

        Ok(VoiceScript {
            id: view.id,
            video_id: view.video_id,
            annotation_id: view.annotation_id,
            duration: view.duration,
            original_annotation: view.original_annotation,
            generated_script: view.generated_script,
            order_index: view.order_index,
            created_at: view.created_at,
            audio,
        })
    }
}
