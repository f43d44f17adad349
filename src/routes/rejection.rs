use serde::Serialize;
use warp::reject;

use crate::errors::BackendError;

#[derive(Debug)]
pub struct Rejection {
    pub(crate) context: Context,
    pub(crate) error: BackendError,
}

impl Rejection {
    pub fn new(context: Context, error: BackendError) -> Self {
        Rejection { context, error }
    }

    pub fn flatten(&self) -> FlattenedRejection {
        FlattenedRejection {
            context: self.context.clone(),
            message: format!("{}", self.error),
        }
    }
}

impl reject::Reject for Rejection {}

#[derive(Debug, Serialize)]
pub struct FlattenedRejection {
    #[serde(flatten)]
    pub(crate) context: Context,
    pub(crate) message: String,
}

/// The operation that failed, with the IDs it was given.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum Context {
    ReadRequestBody,
    CreateVideo,
    ListVideos,
    RetrieveVideo { id: String },
    CreateAnnotation { video_id: String },
    ListAnnotations { video_id: String },
    UpdateAnnotation { id: String },
    DeleteAnnotation { id: String },
    GenerateScript,
    CreateVoiceScript,
    RetrieveVoiceScript { id: String },
    UpdateVoiceScript { id: String },
    DeleteVoiceScript { id: String },
    ListVoiceScripts { video_id: String },
    CombinedScript { video_id: String },
    GenerateAudio,
    AttachAudio { id: String },
    RetrieveAudio { id: String },
    DeleteAudio { id: String },
    GenerateAllAudio { video_id: String },
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::errors::Entity;

    #[test]
    fn flattened_rejections_carry_operation_and_message() {
        let id = Uuid::nil();
        let rejection = Rejection::new(
            Context::DeleteAnnotation { id: id.to_string() },
            BackendError::not_found(Entity::Annotation, id),
        );

        let value = serde_json::to_value(rejection.flatten()).unwrap();

        assert_eq!(value["operation"], "delete_annotation");
        assert_eq!(value["id"], id.to_string());
        assert_eq!(
            value["message"],
            format!("annotation not found: {}", id)
        );
    }

    #[test]
    fn rejections_convert_into_warp_rejections() {
        let rejection: reject::Rejection =
            Rejection::new(Context::CreateVideo, BackendError::EmptyTitle).into();

        let found = rejection.find::<Rejection>().unwrap();
        assert!(matches!(found.error, BackendError::EmptyTitle));
    }

    #[test]
    fn unit_contexts_flatten_to_the_operation_alone() {
        let rejection = Rejection::new(Context::GenerateScript, BackendError::GenerationUnavailable);

        let value = serde_json::to_value(rejection.flatten()).unwrap();

        assert_eq!(value["operation"], "generate_script");
        assert_eq!(value.as_object().unwrap().len(), 2);
    }
}
