use std::error::Error as _;
use std::sync::Arc;

use log::{error, Logger};
use warp::body::BodyDeserializeError;
use warp::http::StatusCode;
use warp::reject;
use warp::reply::{json, with_status, Json, WithStatus};
use warp::Filter;

use crate::environment::Environment;
use crate::errors::BackendError;
use self::rejection::{Context, Rejection};

pub mod admin;
mod handlers;
mod rejection;
mod response;

pub use internal::*;

/// The largest JSON body to accept. Stored audio travels in responses,
/// never in requests, so bodies stay small.
const MAX_JSON_LENGTH: u64 = 1024 * 1024;

/// Every API route with CORS and error formatting applied.
pub fn api(
    environment: Environment,
) -> impl Filter<Extract = (impl warp::Reply,), Error = reject::Rejection> + Clone + Send + Sync + 'static
{
    let logger = environment.logger.clone();

    let routes = vec![
        make_list_videos_route(environment.clone()),
        make_create_video_route(environment.clone()),
        make_retrieve_video_route(environment.clone()),
        make_list_annotations_route(environment.clone()),
        make_create_annotation_route(environment.clone()),
        make_update_annotation_route(environment.clone()),
        make_delete_annotation_route(environment.clone()),
        make_generate_script_route(environment.clone()),
        make_create_voice_script_route(environment.clone()),
        make_retrieve_voice_script_route(environment.clone()),
        make_update_voice_script_route(environment.clone()),
        make_delete_voice_script_route(environment.clone()),
        make_list_voice_scripts_route(environment.clone()),
        make_combined_script_route(environment.clone()),
        make_generate_audio_route(environment.clone()),
        make_attach_audio_route(environment.clone()),
        make_retrieve_audio_route(environment.clone()),
        make_delete_audio_route(environment.clone()),
        make_generate_all_audio_route(environment.clone()),
    ];

    let routes = routes
        .into_iter()
        .fold(make_voices_route(environment), |all, route| {
            all.or(route).unify().boxed()
        });

    let cors = warp::cors()
        .allow_any_origin()
        .allow_methods(vec!["GET", "POST", "PUT", "DELETE"])
        .allow_header("content-type");

    routes
        .recover(move |r| format_rejection(logger.clone(), r))
        .with(cors)
}

pub async fn format_rejection(
    logger: Arc<Logger>,
    rej: reject::Rejection,
) -> Result<WithStatus<Json>, reject::Rejection> {
    if let Some(r) = rej.find::<rejection::Rejection>() {
        return Ok(render_rejection(&logger, r));
    }

    if let Some(e) = rej.find::<BodyDeserializeError>() {
        let cause = e.source().map_or_else(|| e.to_string(), |c| c.to_string());
        let r = Rejection::new(Context::ReadRequestBody, BackendError::MalformedBody(cause));

        return Ok(render_rejection(&logger, &r));
    }

    if rej.find::<reject::PayloadTooLarge>().is_some() {
        let r = Rejection::new(
            Context::ReadRequestBody,
            BackendError::BodyTooLarge(MAX_JSON_LENGTH),
        );

        return Ok(render_rejection(&logger, &r));
    }

    Err(rej)
}

fn render_rejection(logger: &Logger, r: &Rejection) -> WithStatus<Json> {
    let e = &r.error;
    error!(logger, "Backend error"; "context" => ?r.context, "error" => ?r.error, "status" => %status_code_for(e), "message" => %r.error);

    with_status(json(&r.flatten()), status_code_for(e))
}

fn status_code_for(e: &BackendError) -> StatusCode {
    use BackendError::*;

    match e {
        InvalidRange { .. }
        | InvalidDuration(..)
        | InvalidSpeed(..)
        | InvalidVoice(..)
        | EmptyTitle
        | MissingText
        | MalformedBody(..)
        | InvalidId(..) => StatusCode::BAD_REQUEST,
        BodyTooLarge(..) => StatusCode::PAYLOAD_TOO_LARGE,
        NotFound { .. } | NoAudio(..) => StatusCode::NOT_FOUND,
        GenerationUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        GenerationFailed { .. } => StatusCode::BAD_GATEWAY,
        PersistenceFailed { .. } | MalformedAudio { .. } | Sqlx { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

mod internal {
    use serde::de::DeserializeOwned;
    use warp::filters::BoxedFilter;
    use warp::path::end;
    use warp::reject;
    use warp::Filter;
    use warp::Reply;
    use warp::{delete, get as g, path as p, path::param as par, post, put};

    use super::{handlers, MAX_JSON_LENGTH};
    use crate::environment::Environment;

    type Route = BoxedFilter<(Box<dyn Reply>,)>;

    /// Matches `path` one segment at a time, so it may contain slashes.
    fn api_prefix(path: &str) -> BoxedFilter<()> {
        path.split('/')
            .filter(|segment| !segment.is_empty())
            .fold(warp::any().boxed(), |prefix, segment| {
                prefix.and(p(segment.to_owned())).boxed()
            })
    }

    fn json_body<T: DeserializeOwned + Send>(
    ) -> impl Filter<Extract = (T,), Error = reject::Rejection> + Clone {
        warp::body::content_length_limit(MAX_JSON_LENGTH).and(warp::body::json())
    }

    macro_rules! route_filter {
        ($route_variable:ident; $first:expr) => (let $route_variable = $route_variable.and($first););
        ($route_variable:ident; $first:expr, $($rest:expr),+) => (
            let $route_variable = $route_variable.and($first);
            route_filter!($route_variable; $($rest),+);
        )
    }

    macro_rules! route {
        ($name:ident => $handler:ident, $route_variable:ident; $($filters:expr),+) => (
            pub fn $name(environment: Environment) -> Route {
                let prefix = api_prefix(&environment.urls.api_path);

                let $route_variable = warp::any()
                    .map(move || environment.clone())
                    .and(prefix);

                route_filter!($route_variable; $($filters),+);

                $route_variable.and_then(handlers::$handler)
                    .boxed()
            }
        );
    }

    route!(make_voices_route => voices, rt; p("voices"), end(), g());
    route!(make_list_videos_route => list_videos, rt; p("videos"), end(), g());
    route!(make_create_video_route => create_video, rt; p("videos"), end(), post(), json_body());
    route!(make_retrieve_video_route => retrieve_video, rt; p("videos"), par::<String>(), end(), g());
    route!(make_list_annotations_route => list_annotations, rt; p!("videos" / String / "annotations"), end(), g());
    route!(make_create_annotation_route => create_annotation, rt; p!("videos" / String / "annotations"), end(), post(), json_body());
    route!(make_update_annotation_route => update_annotation, rt; p("annotations"), par::<String>(), end(), put(), json_body());
    route!(make_delete_annotation_route => delete_annotation, rt; p("annotations"), par::<String>(), end(), delete());
    route!(make_generate_script_route => generate_script, rt; p("generate-script"), end(), post(), json_body());
    route!(make_create_voice_script_route => create_voice_script, rt; p("voice-scripts"), end(), post(), json_body());
    route!(make_retrieve_voice_script_route => retrieve_voice_script, rt; p("voice-scripts"), par::<String>(), end(), g());
    route!(make_update_voice_script_route => update_voice_script, rt; p("voice-scripts"), par::<String>(), end(), put(), json_body());
    route!(make_delete_voice_script_route => delete_voice_script, rt; p("voice-scripts"), par::<String>(), end(), delete());
    route!(make_list_voice_scripts_route => list_voice_scripts, rt; p!("videos" / String / "voice-scripts"), end(), g());
    route!(make_combined_script_route => combined_script, rt; p!("videos" / String / "combined-script"), end(), g());
    route!(make_generate_audio_route => generate_audio, rt; p("generate-audio"), end(), post(), json_body());
    route!(make_attach_audio_route => attach_audio, rt; p!("voice-scripts" / String / "audio"), end(), post(), json_body());
    route!(make_retrieve_audio_route => retrieve_audio, rt; p!("voice-scripts" / String / "audio"), end(), g());
    route!(make_delete_audio_route => delete_audio, rt; p!("voice-scripts" / String / "audio"), end(), delete());
    route!(make_generate_all_audio_route => generate_all_audio, rt; p!("videos" / String / "generate-all-audio"), end(), post(), json_body());
}
