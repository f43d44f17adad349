use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::Db;
use crate::errors::{BackendError, Entity};

/// A labelled time range within a video.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Annotation {
    /// The ID assigned by storage.
    pub id: Uuid,

    /// The video this annotation belongs to.
    pub video_id: Uuid,

    /// Where the range starts, in seconds.
    pub start_time: f64,

    /// Where the range ends, in seconds.
    pub end_time: f64,

    /// What happens during the range.
    pub description: String,

    /// `end_time - start_time`, stored alongside the range.
    pub duration: f64,
}

/// The client-supplied fields for creating or replacing an annotation.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AnnotationInput {
    pub start_time: f64,
    pub end_time: f64,
    pub description: String,
}

/// An annotation whose range has been checked and whose duration has
/// been derived. Only this type reaches storage.
#[derive(Clone, Debug, PartialEq)]
pub struct ValidAnnotation {
    pub(crate) start_time: f64,
    pub(crate) end_time: f64,
    pub(crate) description: String,
    pub(crate) duration: f64,
}

impl ValidAnnotation {
    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    pub fn end_time(&self) -> f64 {
        self.end_time
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }
}

/// Checks that the range is well-formed and derives its duration.
///
/// The end must come strictly after the start and the start must not
/// be negative. NaN compares as unordered and is rejected.
pub fn validate(input: AnnotationInput) -> Result<ValidAnnotation, BackendError> {
    let AnnotationInput {
        start_time,
        end_time,
        description,
    } = input;

    let ordered = end_time.partial_cmp(&start_time) == Some(Ordering::Greater);

    if !ordered || start_time < 0.0 || !end_time.is_finite() {
        return Err(BackendError::InvalidRange {
            start_time,
            end_time,
        });
    }

    Ok(ValidAnnotation {
        start_time,
        end_time,
        description,
        duration: end_time - start_time,
    })
}

pub async fn create(
    db: &(dyn Db + Send + Sync),
    video_id: Uuid,
    input: AnnotationInput,
) -> Result<Annotation, BackendError> {
    let annotation = validate(input)?;

    db.insert_annotation(&video_id, annotation).await
}

pub async fn list(
    db: &(dyn Db + Send + Sync),
    video_id: Uuid,
) -> Result<Vec<Annotation>, BackendError> {
    db.list_annotations(&video_id).await
}

/// Replaces the range and description of an annotation. The stored
/// duration is always recomputed from the new range.
pub async fn update(
    db: &(dyn Db + Send + Sync),
    id: Uuid,
    input: AnnotationInput,
) -> Result<Annotation, BackendError> {
    let annotation = validate(input)?;

    db.update_annotation(&id, annotation)
        .await?
        .ok_or_else(|| BackendError::not_found(Entity::Annotation, id))
}

pub async fn delete(db: &(dyn Db + Send + Sync), id: Uuid) -> Result<Annotation, BackendError> {
    db.delete_annotation(&id)
        .await?
        .ok_or_else(|| BackendError::not_found(Entity::Annotation, id))
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::db::MemoryDb;
    use crate::video::{self, NewVideo};

    async fn new_video(db: &MemoryDb) -> Uuid {
        video::create(db, NewVideo::new("Keynote", None))
            .await
            .unwrap()
            .id
    }

    fn input(start_time: f64, end_time: f64) -> AnnotationInput {
        AnnotationInput {
            start_time,
            end_time,
            description: "Speaker walks on stage".to_owned(),
        }
    }

    #[test]
    fn rejects_empty_and_inverted_ranges() {
        for (start, end) in &[(5.0, 5.0), (5.0, 4.5), (-1.0, 3.0), (0.0, f64::NAN), (f64::NAN, 1.0)] {
            assert!(
                matches!(validate(input(*start, *end)), Err(BackendError::InvalidRange { .. })),
                "{} -> {} must be rejected",
                start,
                end
            );
        }
    }

    #[test]
    fn rejects_infinite_end() {
        assert!(matches!(
            validate(input(0.0, f64::INFINITY)),
            Err(BackendError::InvalidRange { .. })
        ));
    }

    #[test]
    fn derives_duration() {
        let valid = validate(input(1.25, 4.0)).unwrap();
        assert_eq!(valid.duration(), 2.75);
        assert_eq!(valid.description(), "Speaker walks on stage");
    }

    #[tokio::test]
    async fn invalid_ranges_never_reach_storage() {
        let db = MemoryDb::default();
        let video_id = new_video(&db).await;
        let writes = db.write_count();

        let result = create(&db, video_id, input(10.0, 2.0)).await;

        assert!(matches!(result, Err(BackendError::InvalidRange { .. })));
        assert!(list(&db, video_id).await.unwrap().is_empty());
        assert_eq!(db.write_count(), writes);
    }

    #[tokio::test]
    async fn update_recomputes_duration() {
        let db = MemoryDb::default();
        let video_id = new_video(&db).await;

        let created = create(&db, video_id, input(0.0, 10.0)).await.unwrap();
        assert_eq!(created.duration, 10.0);

        let updated = update(&db, created.id, input(3.5, 4.0)).await.unwrap();
        assert_eq!(updated.id, created.id);
        assert_eq!(updated.video_id, video_id);
        assert_eq!(updated.duration, 0.5);
    }

    #[tokio::test]
    async fn invalid_update_leaves_record_untouched() {
        let db = MemoryDb::default();
        let video_id = new_video(&db).await;

        let created = create(&db, video_id, input(0.0, 10.0)).await.unwrap();
        let writes = db.write_count();

        let result = update(&db, created.id, input(4.0, 4.0)).await;

        assert!(matches!(result, Err(BackendError::InvalidRange { .. })));
        assert_eq!(db.write_count(), writes);
        assert_eq!(list(&db, video_id).await.unwrap(), vec![created]);
    }

    #[tokio::test]
    async fn annotations_require_an_existing_video() {
        let db = MemoryDb::default();
        let video_id = Uuid::new_v4();

        assert!(matches!(
            create(&db, video_id, input(0.0, 1.0)).await,
            Err(BackendError::NotFound { entity: Entity::Video, .. })
        ));
    }

    #[tokio::test]
    async fn deleted_annotations_are_returned_and_gone() {
        let db = MemoryDb::default();
        let video_id = new_video(&db).await;

        let created = create(&db, video_id, input(1.0, 2.0)).await.unwrap();

        assert_eq!(delete(&db, created.id).await.unwrap(), created);
        assert!(list(&db, video_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn updating_or_deleting_missing_annotations_fails() {
        let db = MemoryDb::default();
        let id = Uuid::new_v4();

        assert!(matches!(
            update(&db, id, input(0.0, 1.0)).await,
            Err(BackendError::NotFound { entity: Entity::Annotation, .. })
        ));
        assert!(matches!(
            delete(&db, id).await,
            Err(BackendError::NotFound { entity: Entity::Annotation, .. })
        ));
    }

    proptest! {
        #[test]
        fn duration_is_exact_difference(start in 0.0f64..100_000.0, length in 0.001f64..10_000.0) {
            let end = start + length;
            prop_assume!(end > start);

            let valid = validate(input(start, end)).unwrap();

            prop_assert_eq!(valid.duration(), end - start);
            prop_assert_eq!(valid.start_time(), start);
            prop_assert_eq!(valid.end_time(), end);
        }

        #[test]
        fn non_increasing_ranges_are_rejected(start in 0.0f64..100_000.0, back in 0.0f64..100_000.0) {
            let end = start - back;

            prop_assert!(validate(input(start, end)).is_err());
        }
    }
}
