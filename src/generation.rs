use futures::future::BoxFuture;

use crate::audio::{Speed, Voice};
use crate::errors::BackendError;

/// A role-tagged instruction plus the content to act on.
#[derive(Clone, Debug, PartialEq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

/// Text to be spoken and how to speak it.
#[derive(Clone, Debug, PartialEq)]
pub struct SpeechRequest {
    pub text: String,
    pub voice: Voice,
    pub speed: Speed,
}

/// The external text and speech generation service.
pub trait Generator {
    /// Returns the text generated in response to `prompt`.
    fn complete(&self, prompt: Prompt) -> BoxFuture<Result<String, BackendError>>;

    /// Returns the raw audio synthesized from `request`.
    fn synthesize(&self, request: SpeechRequest) -> BoxFuture<Result<Vec<u8>, BackendError>>;
}

pub type SafeGenerator = dyn Generator + Send + Sync;

/// Fails with [`BackendError::GenerationUnavailable`] when no generator
/// was configured.
pub fn require(generator: Option<&SafeGenerator>) -> Result<&SafeGenerator, BackendError> {
    generator.ok_or(BackendError::GenerationUnavailable)
}

pub use self::openai::*;

mod openai {
    use futures::future::BoxFuture;
    use futures::FutureExt;
    use serde::{Deserialize, Serialize};
    use url::Url;

    use super::{Prompt, SpeechRequest};
    use crate::audio::Voice;
    use crate::config::get_optional_variable;
    use crate::errors::BackendError;

    pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1/";
    pub const DEFAULT_CHAT_MODEL: &str = "gpt-3.5-turbo";
    pub const DEFAULT_SPEECH_MODEL: &str = "tts-1";

    const MAX_TOKENS: u32 = 500;
    const TEMPERATURE: f32 = 0.7;
    const SPEECH_FORMAT: &str = "mp3";

    /// A generator backed by the OpenAI chat-completions and speech
    /// endpoints.
    pub struct OpenAiGenerator {
        client: reqwest::Client,
        api_key: String,
        base_url: Url,
        chat_model: String,
        speech_model: String,
    }

    impl OpenAiGenerator {
        /// Creates a new instance. A trailing slash is added to
        /// `base_url` if it lacks one, so endpoints resolve beneath it.
        pub fn new(
            api_key: String,
            mut base_url: Url,
            chat_model: String,
            speech_model: String,
        ) -> Self {
            if !base_url.path().ends_with('/') {
                let path = format!("{}/", base_url.path());
                base_url.set_path(&path);
            }

            Self {
                client: reqwest::Client::new(),
                api_key,
                base_url,
                chat_model,
                speech_model,
            }
        }

        /// Reads the configuration from the environment. Returns `None`
        /// when `OPENAI_API_KEY` is not set.
        pub fn from_env() -> Option<Self> {
            let api_key = get_optional_variable("OPENAI_API_KEY")?;

            let base_url = get_optional_variable("OPENAI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_owned());
            let base_url = Url::parse(&base_url).expect("parse OPENAI_BASE_URL");

            Some(Self::new(
                api_key,
                base_url,
                get_optional_variable("OPENAI_CHAT_MODEL")
                    .unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_owned()),
                get_optional_variable("OPENAI_SPEECH_MODEL")
                    .unwrap_or_else(|| DEFAULT_SPEECH_MODEL.to_owned()),
            ))
        }

        fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
            self.base_url
                .join(path)
                .map_err(|e| BackendError::generation_failed(e.to_string()))
        }
    }

    impl super::Generator for OpenAiGenerator {
        fn complete(&self, prompt: Prompt) -> BoxFuture<Result<String, BackendError>> {
            complete(self, prompt).boxed()
        }

        fn synthesize(&self, request: SpeechRequest) -> BoxFuture<Result<Vec<u8>, BackendError>> {
            synthesize(self, request).boxed()
        }
    }

    #[derive(Serialize)]
    struct ChatRequest<'a> {
        model: &'a str,
        messages: [ChatMessage<'a>; 2],
        max_tokens: u32,
        temperature: f32,
    }

    #[derive(Serialize)]
    struct ChatMessage<'a> {
        role: &'a str,
        content: &'a str,
    }

    #[derive(Deserialize)]
    struct ChatResponse {
        choices: Vec<ChatChoice>,
    }

    #[derive(Deserialize)]
    struct ChatChoice {
        message: ChatReply,
    }

    #[derive(Deserialize)]
    struct ChatReply {
        content: Option<String>,
    }

    #[derive(Serialize)]
    struct SpeechBody<'a> {
        model: &'a str,
        input: &'a str,
        voice: Voice,
        speed: f32,
        response_format: &'a str,
    }

    #[derive(Deserialize)]
    struct ErrorBody {
        error: ErrorDetail,
    }

    #[derive(Deserialize)]
    struct ErrorDetail {
        message: String,
    }

    async fn complete(generator: &OpenAiGenerator, prompt: Prompt) -> Result<String, BackendError> {
        let body = ChatRequest {
            model: &generator.chat_model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &prompt.system,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt.user,
                },
            ],
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
        };

        let response = generator
            .client
            .post(generator.endpoint("chat/completions")?)
            .bearer_auth(&generator.api_key)
            .json(&body)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let parsed: ChatResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(map_reqwest_error)?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_owned())
            .ok_or_else(|| BackendError::generation_failed("response contained no text"))
    }

    async fn synthesize(
        generator: &OpenAiGenerator,
        request: SpeechRequest,
    ) -> Result<Vec<u8>, BackendError> {
        let body = SpeechBody {
            model: &generator.speech_model,
            input: &request.text,
            voice: request.voice,
            speed: request.speed.value(),
            response_format: SPEECH_FORMAT,
        };

        let response = generator
            .client
            .post(generator.endpoint("audio/speech")?)
            .bearer_auth(&generator.api_key)
            .json(&body)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let audio = check_status(response)
            .await?
            .bytes()
            .await
            .map_err(map_reqwest_error)?;

        Ok(audio.to_vec())
    }

    /// Turns a non-success response into an error carrying the
    /// provider's own message when it sent one.
    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, BackendError> {
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = match serde_json::from_str::<ErrorBody>(&body) {
            Ok(parsed) => parsed.error.message,
            Err(_) => body,
        };

        Err(BackendError::generation_failed(format!(
            "{} ({})",
            message.trim(),
            status
        )))
    }

    fn map_reqwest_error(error: reqwest::Error) -> BackendError {
        BackendError::generation_failed(error.to_string())
    }

}
