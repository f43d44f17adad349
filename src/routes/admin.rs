use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use log::info;
use warp::http::StatusCode;
use warp::reject;
use warp::reply::{json, Reply};
use warp::Filter;

use super::response::SuccessResponse;
use crate::environment::Environment;

pub fn make_healthz_route(
    _environment: Environment,
) -> impl warp::Filter<Extract = (impl Reply,), Error = reject::Rejection> + Clone {
    warp::path("healthz").and(warp::get()).map(move || {
        json(&SuccessResponse::Healthz {
            revision: info::REVISION,
            timestamp: info::BUILD_TIMESTAMP,
            version: info::VERSION,
        })
    })
}

type TerminationFuture = BoxFuture<'static, ()>;

pub type TerminationFunctionWrapper = Arc<dyn Fn() -> TerminationFuture + Send + Sync>;

pub fn make_termination_route(
    environment: Environment,
    terminate: TerminationFunctionWrapper,
) -> impl warp::Filter<Extract = (impl Reply,), Error = reject::Rejection> + Clone {
    let handler = move || -> BoxFuture<'static, Result<StatusCode, std::convert::Infallible>> {
        let terminate = terminate.clone();
        let logger = environment.logger.clone();

        async move {
            info!(logger, "Termination requested");
            terminate().await;
            Ok(StatusCode::NO_CONTENT)
        }
        .boxed()
    };

    warp::path("terminate").and(warp::post()).and_then(handler)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use log::{o, Discard, Logger};

    use super::*;
    use crate::db::MemoryDb;
    use crate::environment::Config;
    use crate::urls::Urls;

    fn environment() -> Environment {
        Environment::new(
            Arc::new(Logger::root(Discard, o!())),
            Arc::new(MemoryDb::default()),
            None,
            Arc::new(Urls::new("http://localhost/", "api")),
            Config::default(),
        )
    }

    #[tokio::test]
    async fn healthz_reports_the_version() {
        let response = warp::test::request()
            .method("GET")
            .path("/healthz")
            .reply(&make_healthz_route(environment()))
            .await;

        assert_eq!(response.status(), StatusCode::OK);

        let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body["version"], info::VERSION);
    }

    #[tokio::test]
    async fn terminate_calls_the_terminator() {
        let called = Arc::new(AtomicBool::new(false));
        let flag = called.clone();

        let terminate: TerminationFunctionWrapper = Arc::new(move || {
            let flag = flag.clone();
            async move { flag.store(true, Ordering::SeqCst) }.boxed()
        });

        let response = warp::test::request()
            .method("POST")
            .path("/terminate")
            .reply(&make_termination_route(environment(), terminate))
            .await;

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(called.load(Ordering::SeqCst));
    }
}
