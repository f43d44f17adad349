use futures::future::BoxFuture;
use uuid::Uuid;

use crate::annotation::{Annotation, ValidAnnotation};
use crate::errors::BackendError;
use crate::video::{NewVideo, Video};
use crate::voice_script::{AudioAttachment, NewVoiceScript, VoiceScript, VoiceScriptUpdate};

/// Storage for videos, annotations and voice scripts. Methods returning
/// `Option` yield `None` when no record has the given ID.
pub trait Db {
    fn insert_video(&self, video: NewVideo) -> BoxFuture<Result<Video, BackendError>>;

    fn list_videos(&self) -> BoxFuture<Result<Vec<Video>, BackendError>>;

    fn retrieve_video(&self, id: &Uuid) -> BoxFuture<Result<Option<Video>, BackendError>>;

    fn insert_annotation(
        &self,
        video_id: &Uuid,
        annotation: ValidAnnotation,
    ) -> BoxFuture<Result<Annotation, BackendError>>;

    fn list_annotations(&self, video_id: &Uuid) -> BoxFuture<Result<Vec<Annotation>, BackendError>>;

    fn update_annotation(
        &self,
        id: &Uuid,
        annotation: ValidAnnotation,
    ) -> BoxFuture<Result<Option<Annotation>, BackendError>>;

    fn delete_annotation(&self, id: &Uuid) -> BoxFuture<Result<Option<Annotation>, BackendError>>;

    fn insert_voice_script(
        &self,
        script: NewVoiceScript,
    ) -> BoxFuture<Result<VoiceScript, BackendError>>;

    fn retrieve_voice_script(
        &self,
        id: &Uuid,
    ) -> BoxFuture<Result<Option<VoiceScript>, BackendError>>;

    fn list_voice_scripts(
        &self,
        video_id: &Uuid,
    ) -> BoxFuture<Result<Vec<VoiceScript>, BackendError>>;

    fn update_voice_script(
        &self,
        id: &Uuid,
        update: VoiceScriptUpdate,
    ) -> BoxFuture<Result<Option<VoiceScript>, BackendError>>;

    /// Replaces every audio field at once. `None` clears them.
    fn set_audio(
        &self,
        id: &Uuid,
        audio: Option<AudioAttachment>,
    ) -> BoxFuture<Result<Option<VoiceScript>, BackendError>>;

    fn delete_voice_script(
        &self,
        id: &Uuid,
    ) -> BoxFuture<Result<Option<VoiceScript>, BackendError>>;
}

mod memory;

pub use self::memory::MemoryDb;
pub use self::postgres::*;

mod postgres {
    use futures::future::BoxFuture;
    use futures::FutureExt;
    use sqlx::{
        self,
        postgres::{PgPool, PgRow},
    };
    use uuid::Uuid;

    use crate::annotation::{Annotation, ValidAnnotation};
    use crate::audio::{Speed, Voice};
    use crate::errors::{BackendError, Entity};
    use crate::video::{NewVideo, Video};
    use crate::voice_script::{AudioAttachment, NewVoiceScript, VoiceScript, VoiceScriptUpdate};

    const ANNOTATIONS_VIDEO_CONSTRAINT: &str = "annotations_video_id_fkey";
    const VOICE_SCRIPTS_VIDEO_CONSTRAINT: &str = "voice_scripts_video_id_fkey";

    pub struct PgDb {
        pool: PgPool,
    }

    impl PgDb {
        pub fn new(pool: PgPool) -> Self {
            PgDb { pool }
        }
    }

    // these can be simplified once async functions in traits are stabilized
    impl super::Db for PgDb {
        fn insert_video(&self, video: NewVideo) -> BoxFuture<Result<Video, BackendError>> {
            async move {
                let query = sqlx::query(include_str!("queries/create_video.sql"));

                let video = query
                    .bind(Uuid::new_v4())
                    .bind(video.title)
                    .bind(video.video_url)
                    .try_map(|row: PgRow| video_from_row(&row))
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                video.ok_or(BackendError::PersistenceFailed {
                    entity: Entity::Video,
                })
            }
            .boxed()
        }

        fn list_videos(&self) -> BoxFuture<Result<Vec<Video>, BackendError>> {
            async move {
                let query = sqlx::query(include_str!("queries/list_videos.sql"));

                let videos = query
                    .try_map(|row: PgRow| video_from_row(&row))
                    .fetch_all(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(videos)
            }
            .boxed()
        }

        fn retrieve_video(&self, id: &Uuid) -> BoxFuture<Result<Option<Video>, BackendError>> {
            let id = *id;

            async move {
                let query = sqlx::query(include_str!("queries/retrieve_video.sql"));

                let video = query
                    .bind(id)
                    .try_map(|row: PgRow| video_from_row(&row))
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(video)
            }
            .boxed()
        }

        fn insert_annotation(
            &self,
            video_id: &Uuid,
            annotation: ValidAnnotation,
        ) -> BoxFuture<Result<Annotation, BackendError>> {
            let video_id = *video_id;

            async move {
                let query = sqlx::query(include_str!("queries/create_annotation.sql"));

                let annotation = query
                    .bind(Uuid::new_v4())
                    .bind(video_id)
                    .bind(annotation.start_time)
                    .bind(annotation.end_time)
                    .bind(annotation.description)
                    .bind(annotation.duration)
                    .try_map(|row: PgRow| annotation_from_row(&row))
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(|e| map_insert_error(e, video_id))?;

                annotation.ok_or(BackendError::PersistenceFailed {
                    entity: Entity::Annotation,
                })
            }
            .boxed()
        }

        fn list_annotations(
            &self,
            video_id: &Uuid,
        ) -> BoxFuture<Result<Vec<Annotation>, BackendError>> {
            let video_id = *video_id;

            async move {
                let query = sqlx::query(include_str!("queries/list_annotations.sql"));

                let annotations = query
                    .bind(video_id)
                    .try_map(|row: PgRow| annotation_from_row(&row))
                    .fetch_all(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(annotations)
            }
            .boxed()
        }

        fn update_annotation(
            &self,
            id: &Uuid,
            annotation: ValidAnnotation,
        ) -> BoxFuture<Result<Option<Annotation>, BackendError>> {
            let id = *id;

            async move {
                let query = sqlx::query(include_str!("queries/update_annotation.sql"));

                let annotation = query
                    .bind(id)
                    .bind(annotation.start_time)
                    .bind(annotation.end_time)
                    .bind(annotation.description)
                    .bind(annotation.duration)
                    .try_map(|row: PgRow| annotation_from_row(&row))
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(annotation)
            }
            .boxed()
        }

        fn delete_annotation(
            &self,
            id: &Uuid,
        ) -> BoxFuture<Result<Option<Annotation>, BackendError>> {
            let id = *id;

            async move {
                let query = sqlx::query(include_str!("queries/delete_annotation.sql"));

                let annotation = query
                    .bind(id)
                    .try_map(|row: PgRow| annotation_from_row(&row))
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(annotation)
            }
            .boxed()
        }

        fn insert_voice_script(
            &self,
            script: NewVoiceScript,
        ) -> BoxFuture<Result<VoiceScript, BackendError>> {
            async move {
                let query = sqlx::query(include_str!("queries/create_voice_script.sql"));
                let video_id = script.video_id;

                let script = query
                    .bind(Uuid::new_v4())
                    .bind(script.video_id)
                    .bind(script.annotation_id)
                    .bind(script.duration)
                    .bind(script.original_annotation)
                    .bind(script.generated_script)
                    .bind(script.order_index)
                    .try_map(|row: PgRow| voice_script_from_row(&row))
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(|e| map_insert_error(e, video_id))?;

                script.ok_or(BackendError::PersistenceFailed {
                    entity: Entity::VoiceScript,
                })
            }
            .boxed()
        }

        fn retrieve_voice_script(
            &self,
            id: &Uuid,
        ) -> BoxFuture<Result<Option<VoiceScript>, BackendError>> {
            let id = *id;

            async move {
                let query = sqlx::query(include_str!("queries/retrieve_voice_script.sql"));

                let script = query
                    .bind(id)
                    .try_map(|row: PgRow| voice_script_from_row(&row))
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(script)
            }
            .boxed()
        }

        fn list_voice_scripts(
            &self,
            video_id: &Uuid,
        ) -> BoxFuture<Result<Vec<VoiceScript>, BackendError>> {
            let video_id = *video_id;

            async move {
                let query = sqlx::query(include_str!("queries/list_voice_scripts.sql"));

                let scripts = query
                    .bind(video_id)
                    .try_map(|row: PgRow| voice_script_from_row(&row))
                    .fetch_all(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(scripts)
            }
            .boxed()
        }

        fn update_voice_script(
            &self,
            id: &Uuid,
            update: VoiceScriptUpdate,
        ) -> BoxFuture<Result<Option<VoiceScript>, BackendError>> {
            let id = *id;

            async move {
                let query = sqlx::query(include_str!("queries/update_voice_script.sql"));

                let script = query
                    .bind(id)
                    .bind(update.annotation_id.is_some())
                    .bind(update.annotation_id.flatten())
                    .bind(update.duration)
                    .bind(update.original_annotation)
                    .bind(update.generated_script)
                    .bind(update.order_index.is_some())
                    .bind(update.order_index.flatten())
                    .try_map(|row: PgRow| voice_script_from_row(&row))
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(script)
            }
            .boxed()
        }

        fn set_audio(
            &self,
            id: &Uuid,
            audio: Option<AudioAttachment>,
        ) -> BoxFuture<Result<Option<VoiceScript>, BackendError>> {
            let id = *id;

            async move {
                let query = sqlx::query(include_str!("queries/update_voice_script_audio.sql"));

                let has_audio = audio.is_some();
                // the columns are written together so they can never disagree
                let (payload, filename, voice, speed, size_bytes) = match audio {
                    Some(a) => (
                        Some(a.payload),
                        Some(a.filename),
                        Some(a.voice.as_str()),
                        Some(a.speed.value()),
                        Some(a.size_bytes),
                    ),
                    None => (None, None, None, None, None),
                };

                let script = query
                    .bind(id)
                    .bind(has_audio)
                    .bind(payload)
                    .bind(filename)
                    .bind(voice)
                    .bind(speed)
                    .bind(size_bytes)
                    .try_map(|row: PgRow| voice_script_from_row(&row))
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(script)
            }
            .boxed()
        }

        fn delete_voice_script(
            &self,
            id: &Uuid,
        ) -> BoxFuture<Result<Option<VoiceScript>, BackendError>> {
            let id = *id;

            async move {
                let query = sqlx::query(include_str!("queries/delete_voice_script.sql"));

                let script = query
                    .bind(id)
                    .try_map(|row: PgRow| voice_script_from_row(&row))
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(script)
            }
            .boxed()
        }
    }

    fn video_from_row(row: &PgRow) -> Result<Video, sqlx::Error> {
        Ok(Video {
            id: try_get(row, "id")?,
            title: try_get(row, "title")?,
            video_url: try_get(row, "video_url")?,
            created_at: try_get(row, "created_at")?,
        })
    }

    fn annotation_from_row(row: &PgRow) -> Result<Annotation, sqlx::Error> {
        Ok(Annotation {
            id: try_get(row, "id")?,
            video_id: try_get(row, "video_id")?,
            start_time: try_get(row, "start_time")?,
            end_time: try_get(row, "end_time")?,
            description: try_get(row, "description")?,
            duration: try_get(row, "duration")?,
        })
    }

    fn voice_script_from_row(row: &PgRow) -> Result<VoiceScript, sqlx::Error> {
        let has_audio: bool = try_get(row, "has_audio")?;

        let audio = if has_audio {
            let voice: String = try_get(row, "audio_voice")?;
            let voice: Voice = voice.parse().map_err(decode_error)?;
            let speed: f32 = try_get(row, "audio_speed")?;
            let speed = Speed::new(speed).map_err(decode_error)?;

            Some(AudioAttachment {
                payload: try_get(row, "audio_data")?,
                filename: try_get(row, "audio_filename")?,
                voice,
                speed,
                size_bytes: try_get(row, "audio_size_bytes")?,
            })
        } else {
            None
        };

        Ok(VoiceScript {
            id: try_get(row, "id")?,
            video_id: try_get(row, "video_id")?,
            annotation_id: try_get(row, "annotation_id")?,
            duration: try_get(row, "duration")?,
            original_annotation: try_get(row, "original_annotation")?,
            generated_script: try_get(row, "generated_script")?,
            order_index: try_get(row, "order_index")?,
            created_at: try_get(row, "created_at")?,
            audio,
        })
    }

    fn try_get<'a, T: sqlx::Type<sqlx::Postgres> + sqlx::decode::Decode<'a, sqlx::Postgres>>(
        row: &'a PgRow,
        column: &str,
    ) -> Result<T, sqlx::Error> {
        use sqlx::Row;

        row.try_get(column)
    }

    // the schema only admits values we wrote, so this should never happen
    fn decode_error(error: BackendError) -> sqlx::Error {
        sqlx::Error::Decode(Box::new(error))
    }

    /// Maps a failed insert, reporting a missing parent video as such.
    fn map_insert_error(error: sqlx::Error, video_id: Uuid) -> BackendError {
        match error {
            sqlx::Error::Database(ref e)
                if e.constraint() == Some(ANNOTATIONS_VIDEO_CONSTRAINT)
                    || e.constraint() == Some(VOICE_SCRIPTS_VIDEO_CONSTRAINT) =>
            {
                BackendError::not_found(Entity::Video, video_id)
            }
            _ => map_sqlx_error(error),
        }
    }

    fn map_sqlx_error(error: sqlx::Error) -> BackendError {
        BackendError::Sqlx { source: error }
    }
}
