use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use futures::future::{self, BoxFuture};
use futures::FutureExt;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::annotation::{Annotation, ValidAnnotation};
use crate::errors::{BackendError, Entity};
use crate::video::{NewVideo, Video};
use crate::voice_script::{AudioAttachment, NewVoiceScript, VoiceScript, VoiceScriptUpdate};

/// An in-process store with the same semantics as the database: IDs
/// and creation times are assigned on insert, child records require an
/// existing video, and lists come back in the same order.
#[derive(Default)]
pub struct MemoryDb {
    tables: RwLock<Tables>,
    writes: AtomicUsize,
}

#[derive(Default)]
struct Tables {
    videos: Vec<Video>,
    annotations: Vec<Annotation>,
    voice_scripts: Vec<VoiceScript>,
}

impl Tables {
    fn require_video(&self, id: &Uuid) -> Result<(), BackendError> {
        if self.videos.iter().any(|v| v.id == *id) {
            Ok(())
        } else {
            Err(BackendError::not_found(Entity::Video, *id))
        }
    }

    fn voice_script_mut(&mut self, id: &Uuid) -> Option<&mut VoiceScript> {
        self.voice_scripts.iter_mut().find(|s| s.id == *id)
    }
}

impl MemoryDb {
    /// How many write operations have been attempted, successful or not.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    // a panic while holding the lock leaves the tables consistent, since
    // every write is a single push, replace or remove
    fn read(&self) -> RwLockReadGuard<Tables> {
        self.tables.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<Tables> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.tables.write().unwrap_or_else(|e| e.into_inner())
    }
}

fn ready<T: Send + 'static>(value: Result<T, BackendError>) -> BoxFuture<'static, Result<T, BackendError>> {
    future::ready(value).boxed()
}

impl super::Db for MemoryDb {
    fn insert_video(&self, video: NewVideo) -> BoxFuture<Result<Video, BackendError>> {
        let video = Video {
            id: Uuid::new_v4(),
            title: video.title,
            video_url: video.video_url,
            created_at: OffsetDateTime::now_utc(),
        };

        self.write().videos.push(video.clone());

        ready(Ok(video))
    }

    fn list_videos(&self) -> BoxFuture<Result<Vec<Video>, BackendError>> {
        let mut videos = self.read().videos.clone();
        videos.reverse();

        ready(Ok(videos))
    }

    fn retrieve_video(&self, id: &Uuid) -> BoxFuture<Result<Option<Video>, BackendError>> {
        let video = self.read().videos.iter().find(|v| v.id == *id).cloned();

        ready(Ok(video))
    }

    fn insert_annotation(
        &self,
        video_id: &Uuid,
        annotation: ValidAnnotation,
    ) -> BoxFuture<Result<Annotation, BackendError>> {
        let mut tables = self.write();

        let result = tables.require_video(video_id).map(|_| {
            let annotation = Annotation {
                id: Uuid::new_v4(),
                video_id: *video_id,
                start_time: annotation.start_time,
                end_time: annotation.end_time,
                description: annotation.description,
                duration: annotation.duration,
            };

            tables.annotations.push(annotation.clone());
            annotation
        });

        ready(result)
    }

    fn list_annotations(&self, video_id: &Uuid) -> BoxFuture<Result<Vec<Annotation>, BackendError>> {
        let mut annotations: Vec<Annotation> = self
            .read()
            .annotations
            .iter()
            .filter(|a| a.video_id == *video_id)
            .cloned()
            .collect();

        // stored ranges are always finite
        annotations.sort_by(|a, b| {
            a.start_time
                .partial_cmp(&b.start_time)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        ready(Ok(annotations))
    }

    fn update_annotation(
        &self,
        id: &Uuid,
        annotation: ValidAnnotation,
    ) -> BoxFuture<Result<Option<Annotation>, BackendError>> {
        let mut tables = self.write();

        let updated = tables
            .annotations
            .iter_mut()
            .find(|a| a.id == *id)
            .map(|existing| {
                existing.start_time = annotation.start_time;
                existing.end_time = annotation.end_time;
                existing.description = annotation.description;
                existing.duration = annotation.duration;
                existing.clone()
            });

        ready(Ok(updated))
    }

    fn delete_annotation(&self, id: &Uuid) -> BoxFuture<Result<Option<Annotation>, BackendError>> {
        let mut tables = self.write();

        let deleted = tables
            .annotations
            .iter()
            .position(|a| a.id == *id)
            .map(|index| tables.annotations.remove(index));

        ready(Ok(deleted))
    }

    fn insert_voice_script(
        &self,
        script: NewVoiceScript,
    ) -> BoxFuture<Result<VoiceScript, BackendError>> {
        let mut tables = self.write();

        let result = tables.require_video(&script.video_id).map(|_| {
            let script = VoiceScript {
                id: Uuid::new_v4(),
                video_id: script.video_id,
                annotation_id: script.annotation_id,
                duration: script.duration,
                original_annotation: script.original_annotation,
                generated_script: script.generated_script,
                order_index: script.order_index,
                created_at: OffsetDateTime::now_utc(),
                audio: None,
            };

            tables.voice_scripts.push(script.clone());
            script
        });

        ready(result)
    }

    fn retrieve_voice_script(
        &self,
        id: &Uuid,
    ) -> BoxFuture<Result<Option<VoiceScript>, BackendError>> {
        let script = self
            .read()
            .voice_scripts
            .iter()
            .find(|s| s.id == *id)
            .cloned();

        ready(Ok(script))
    }

    fn list_voice_scripts(
        &self,
        video_id: &Uuid,
    ) -> BoxFuture<Result<Vec<VoiceScript>, BackendError>> {
        let scripts = self
            .read()
            .voice_scripts
            .iter()
            .filter(|s| s.video_id == *video_id)
            .cloned()
            .collect();

        ready(Ok(scripts))
    }

    fn update_voice_script(
        &self,
        id: &Uuid,
        update: VoiceScriptUpdate,
    ) -> BoxFuture<Result<Option<VoiceScript>, BackendError>> {
        let mut tables = self.write();

        let updated = tables.voice_script_mut(id).map(|script| {
            if let Some(annotation_id) = update.annotation_id {
                script.annotation_id = annotation_id;
            }
            if let Some(duration) = update.duration {
                script.duration = duration;
            }
            if let Some(original_annotation) = update.original_annotation {
                script.original_annotation = original_annotation;
            }
            if let Some(generated_script) = update.generated_script {
                script.generated_script = generated_script;
            }
            if let Some(order_index) = update.order_index {
                script.order_index = order_index;
            }

            script.clone()
        });

        ready(Ok(updated))
    }

    fn set_audio(
        &self,
        id: &Uuid,
        audio: Option<AudioAttachment>,
    ) -> BoxFuture<Result<Option<VoiceScript>, BackendError>> {
        let mut tables = self.write();

        let updated = tables.voice_script_mut(id).map(|script| {
            script.audio = audio;
            script.clone()
        });

        ready(Ok(updated))
    }

    fn delete_voice_script(
        &self,
        id: &Uuid,
    ) -> BoxFuture<Result<Option<VoiceScript>, BackendError>> {
        let mut tables = self.write();

        let deleted = tables
            .voice_scripts
            .iter()
            .position(|s| s.id == *id)
            .map(|index| tables.voice_scripts.remove(index));

        ready(Ok(deleted))
    }
}
