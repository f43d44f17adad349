use std::time::{Duration, Instant};

use log::{debug, info};
use uuid::Uuid;
use warp::{
    http::StatusCode,
    reject,
    reply::{json, with_header, with_status, Reply},
};

use crate::annotation::{self, AnnotationInput};
use crate::audio::{self, AudioOptions, BatchOptions, Voice, AUDIO_MIME_TYPE};
use crate::environment::Environment;
use crate::errors::BackendError;
use crate::routes::rejection::{Context, Rejection};
use crate::script::{self, ScriptRequest};
use crate::video::{self, NewVideo};
use crate::voice_script::{self, NewVoiceScript, VoiceScriptUpdate};

const SERVER_TIMING_HEADER: &str = "server-timing";
const LOCATION_HEADER: &str = "location";
type RouteResult = Result<Box<dyn Reply>, reject::Rejection>;

macro_rules! timed {
    ($body:block) => {{
        let start = Instant::now();

        // TODO when `try` blocks are stabilized, we can wrap the body
        // and return the headers even on errors
        let result = $body;

        Ok(Box::new(with_header(
            result,
            SERVER_TIMING_HEADER,
            format_server_timing(start.elapsed()),
        )) as Box<dyn Reply>)
    }};
}

pub async fn voices(_environment: Environment) -> RouteResult {
    timed!({ json(&Voice::ALL) })
}

pub async fn list_videos(environment: Environment) -> RouteResult {
    timed!({
        let videos = video::list(environment.db.as_ref())
            .await
            .map_err(|e| Rejection::new(Context::ListVideos, e))?;

        json(&videos)
    })
}

pub async fn create_video(environment: Environment, new_video: NewVideo) -> RouteResult {
    timed!({
        debug!(environment.logger, "Creating video..."; "title" => &new_video.title);

        let video = video::create(environment.db.as_ref(), new_video)
            .await
            .map_err(|e| Rejection::new(Context::CreateVideo, e))?;

        info!(environment.logger, "Created video"; "id" => %video.id);

        with_header(
            with_status(json(&video), StatusCode::CREATED),
            LOCATION_HEADER,
            environment.urls.video(&video.id).to_string(),
        )
    })
}

pub async fn retrieve_video(environment: Environment, id: String) -> RouteResult {
    timed!({
        let error_handler = |e: BackendError| Rejection::new(Context::RetrieveVideo { id: id.clone() }, e);

        let id = parse_id(&id).map_err(error_handler)?;
        let video = video::retrieve(environment.db.as_ref(), id)
            .await
            .map_err(error_handler)?;

        json(&video)
    })
}

pub async fn list_annotations(environment: Environment, video_id: String) -> RouteResult {
    timed!({
        let error_handler =
            |e: BackendError| Rejection::new(Context::ListAnnotations { video_id: video_id.clone() }, e);

        let video_id = parse_id(&video_id).map_err(error_handler)?;
        let annotations = annotation::list(environment.db.as_ref(), video_id)
            .await
            .map_err(error_handler)?;

        json(&annotations)
    })
}

pub async fn create_annotation(
    environment: Environment,
    video_id: String,
    input: AnnotationInput,
) -> RouteResult {
    timed!({
        let error_handler =
            |e: BackendError| Rejection::new(Context::CreateAnnotation { video_id: video_id.clone() }, e);

        let video_id = parse_id(&video_id).map_err(error_handler)?;
        debug!(environment.logger, "Creating annotation..."; "video_id" => %video_id);

        let annotation = annotation::create(environment.db.as_ref(), video_id, input)
            .await
            .map_err(error_handler)?;

        with_header(
            with_status(json(&annotation), StatusCode::CREATED),
            LOCATION_HEADER,
            environment.urls.annotation(&annotation.id).to_string(),
        )
    })
}

pub async fn update_annotation(
    environment: Environment,
    id: String,
    input: AnnotationInput,
) -> RouteResult {
    timed!({
        let error_handler = |e: BackendError| Rejection::new(Context::UpdateAnnotation { id: id.clone() }, e);

        let id = parse_id(&id).map_err(error_handler)?;
        debug!(environment.logger, "Updating annotation..."; "id" => %id);

        let annotation = annotation::update(environment.db.as_ref(), id, input)
            .await
            .map_err(error_handler)?;

        json(&annotation)
    })
}

pub async fn delete_annotation(environment: Environment, id: String) -> RouteResult {
    timed!({
        let error_handler = |e: BackendError| Rejection::new(Context::DeleteAnnotation { id: id.clone() }, e);

        let id = parse_id(&id).map_err(error_handler)?;
        debug!(environment.logger, "Deleting annotation..."; "id" => %id);

        let annotation = annotation::delete(environment.db.as_ref(), id)
            .await
            .map_err(error_handler)?;

        json(&annotation)
    })
}

pub async fn generate_script(environment: Environment, request: ScriptRequest) -> RouteResult {
    timed!({
        debug!(environment.logger, "Generating script..."; "duration" => request.duration);

        let generated = script::generate(environment.generator(), request)
            .await
            .map_err(|e| Rejection::new(Context::GenerateScript, e))?;

        json(&generated)
    })
}

pub async fn create_voice_script(environment: Environment, new_script: NewVoiceScript) -> RouteResult {
    timed!({
        debug!(environment.logger, "Creating voice script..."; "video_id" => %new_script.video_id);

        let script = voice_script::create(environment.db.as_ref(), new_script)
            .await
            .map_err(|e| Rejection::new(Context::CreateVoiceScript, e))?;

        with_header(
            with_status(json(&script), StatusCode::CREATED),
            LOCATION_HEADER,
            environment.urls.voice_script(&script.id).to_string(),
        )
    })
}

pub async fn retrieve_voice_script(environment: Environment, id: String) -> RouteResult {
    timed!({
        let error_handler =
            |e: BackendError| Rejection::new(Context::RetrieveVoiceScript { id: id.clone() }, e);

        let id = parse_id(&id).map_err(error_handler)?;
        let script = voice_script::retrieve(environment.db.as_ref(), id)
            .await
            .map_err(error_handler)?;

        json(&script)
    })
}

pub async fn update_voice_script(
    environment: Environment,
    id: String,
    update: VoiceScriptUpdate,
) -> RouteResult {
    timed!({
        let error_handler =
            |e: BackendError| Rejection::new(Context::UpdateVoiceScript { id: id.clone() }, e);

        let id = parse_id(&id).map_err(error_handler)?;
        debug!(environment.logger, "Updating voice script..."; "id" => %id);

        let script = voice_script::update(environment.db.as_ref(), id, update)
            .await
            .map_err(error_handler)?;

        json(&script)
    })
}

pub async fn delete_voice_script(environment: Environment, id: String) -> RouteResult {
    timed!({
        let error_handler =
            |e: BackendError| Rejection::new(Context::DeleteVoiceScript { id: id.clone() }, e);

        let id = parse_id(&id).map_err(error_handler)?;
        debug!(environment.logger, "Deleting voice script..."; "id" => %id);

        voice_script::delete(environment.db.as_ref(), id)
            .await
            .map_err(error_handler)?;

        StatusCode::NO_CONTENT
    })
}

pub async fn list_voice_scripts(environment: Environment, video_id: String) -> RouteResult {
    timed!({
        let error_handler =
            |e: BackendError| Rejection::new(Context::ListVoiceScripts { video_id: video_id.clone() }, e);

        let video_id = parse_id(&video_id).map_err(error_handler)?;
        let scripts = voice_script::list_for_video(environment.db.as_ref(), video_id)
            .await
            .map_err(error_handler)?;

        json(&scripts)
    })
}

pub async fn combined_script(environment: Environment, video_id: String) -> RouteResult {
    timed!({
        let error_handler =
            |e: BackendError| Rejection::new(Context::CombinedScript { video_id: video_id.clone() }, e);

        let video_id = parse_id(&video_id).map_err(error_handler)?;
        let combined = voice_script::combined_for_video(environment.db.as_ref(), video_id)
            .await
            .map_err(error_handler)?;

        json(&combined)
    })
}

pub async fn generate_audio(environment: Environment, options: AudioOptions) -> RouteResult {
    timed!({
        let config = environment.config;
        let request = options.with_defaults(config.default_voice, config.default_speed);
        debug!(environment.logger, "Generating audio..."; "voice" => %request.voice, "speed" => request.speed.value());

        let generated = audio::synthesize(
            environment.generator(),
            request.text.as_deref().unwrap_or_default(),
            request.voice,
            request.speed,
        )
        .await
        .map_err(|e| Rejection::new(Context::GenerateAudio, e))?;

        json(&generated)
    })
}

pub async fn attach_audio(environment: Environment, id: String, options: AudioOptions) -> RouteResult {
    timed!({
        let error_handler = |e: BackendError| Rejection::new(Context::AttachAudio { id: id.clone() }, e);

        let id = parse_id(&id).map_err(error_handler)?;
        let config = environment.config;
        let request = options.with_defaults(config.default_voice, config.default_speed);
        debug!(environment.logger, "Attaching audio..."; "id" => %id, "voice" => %request.voice);

        let summary = audio::attach(environment.db.as_ref(), environment.generator(), id, request)
            .await
            .map_err(error_handler)?;

        json(&summary)
    })
}

pub async fn retrieve_audio(environment: Environment, id: String) -> RouteResult {
    timed!({
        let error_handler = |e: BackendError| Rejection::new(Context::RetrieveAudio { id: id.clone() }, e);

        let id = parse_id(&id).map_err(error_handler)?;
        let (raw, filename) = audio::retrieve_audio(environment.db.as_ref(), id)
            .await
            .map_err(error_handler)?;

        with_header(
            with_header(raw, "content-type", AUDIO_MIME_TYPE),
            "content-disposition",
            format!("attachment; filename=\"{}\"", filename),
        )
    })
}

pub async fn delete_audio(environment: Environment, id: String) -> RouteResult {
    timed!({
        let error_handler = |e: BackendError| Rejection::new(Context::DeleteAudio { id: id.clone() }, e);

        let id = parse_id(&id).map_err(error_handler)?;
        debug!(environment.logger, "Removing audio..."; "id" => %id);

        let script = audio::remove(environment.db.as_ref(), id)
            .await
            .map_err(error_handler)?;

        json(&script)
    })
}

pub async fn generate_all_audio(
    environment: Environment,
    video_id: String,
    options: BatchOptions,
) -> RouteResult {
    timed!({
        let error_handler =
            |e: BackendError| Rejection::new(Context::GenerateAllAudio { video_id: video_id.clone() }, e);

        let video_id = parse_id(&video_id).map_err(error_handler)?;
        let config = environment.config;

        let report = audio::generate_for_video(
            environment.db.as_ref(),
            environment.generator(),
            &environment.logger,
            video_id,
            options.voice.unwrap_or(config.default_voice),
            options.speed.unwrap_or(config.default_speed),
        )
        .await
        .map_err(error_handler)?;

        json(&report)
    })
}

fn parse_id(id: &str) -> Result<Uuid, BackendError> {
    Uuid::parse_str(id).map_err(|_| BackendError::InvalidId(id.to_owned()))
}

fn format_server_timing(seconds: Duration) -> String {
    format!("handler;dur={}", seconds.as_secs_f64() * 1000.0)
}
