use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::db::Db;
use crate::errors::{BackendError, Entity};
use crate::normalization;

/// A video that can be annotated.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Video {
    /// The ID assigned by storage.
    pub id: Uuid,

    /// The title provided.
    pub title: String,

    /// Where the video can be found, if anywhere.
    pub video_url: Option<String>,

    /// When the video was registered.
    #[serde(with = "time::serde::timestamp")]
    pub created_at: OffsetDateTime,
}

/// The client-supplied fields for registering a video.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct NewVideo {
    /// The title. Must not be blank after normalization.
    #[serde(deserialize_with = "normalization::deserialize")]
    pub title: String,

    #[serde(default)]
    #[serde(deserialize_with = "normalization::deserialize_option")]
    pub video_url: Option<String>,
}

impl NewVideo {
    pub fn new(title: impl AsRef<str>, video_url: Option<String>) -> Self {
        Self {
            title: normalization::normalize_text(title),
            video_url,
        }
    }
}

pub async fn create(db: &(dyn Db + Send + Sync), video: NewVideo) -> Result<Video, BackendError> {
    if video.title.is_empty() {
        return Err(BackendError::EmptyTitle);
    }

    db.insert_video(video).await
}

pub async fn list(db: &(dyn Db + Send + Sync)) -> Result<Vec<Video>, BackendError> {
    db.list_videos().await
}

pub async fn retrieve(db: &(dyn Db + Send + Sync), id: Uuid) -> Result<Video, BackendError> {
    db.retrieve_video(&id)
        .await?
        .ok_or_else(|| BackendError::not_found(Entity::Video, id))
}
