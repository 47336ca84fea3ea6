use crate::k8s::K8sDuration;
use futures::future;
use http_body_util::BodyExt;
use hyper::{http, Request, Response};
use scan_controller_admission::{
    review::{self, AdmissionResponse, AdmissionReview},
    AdmissionEngine, Review,
};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info_span, trace, warn, Instrument};

/// The path the validating webhook configuration points at.
pub const VALIDATE_PATH: &str = "/validate-k8s-mondoo-com";

/// Serves the validating admission webhook.
#[derive(Clone)]
pub struct Admission {
    engine: AdmissionEngine,
    shutdown: drain::Watch,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read request body: {0}")]
    Request(#[from] hyper::Error),

    #[error("failed to encode json response: {0}")]
    Json(#[from] serde_json::Error),
}

type Body = http_body_util::Full<bytes::Bytes>;

// === impl Admission ===

impl tower::Service<Request<hyper::body::Incoming>> for Admission {
    type Response = Response<Body>;
    type Error = Error;
    type Future = future::BoxFuture<'static, Result<Response<Body>, Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::result::Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<hyper::body::Incoming>) -> Self::Future {
        trace!(?req);
        if req.method() != http::Method::POST || !matches!(req.uri().path(), "/" | VALIDATE_PATH) {
            return Box::pin(future::ok(
                Response::builder()
                    .status(http::StatusCode::NOT_FOUND)
                    .body(Body::default())
                    .expect("not found response must be valid"),
            ));
        }

        let deadline = request_timeout(req.uri());
        let admission = self.clone();
        Box::pin(async move {
            let bytes = req.into_body().collect().await?.to_bytes();
            let rsp = admission.review(&bytes, deadline).await;
            debug!(?rsp);
            json_response(rsp.into_review())
        })
    }
}

impl Admission {
    pub fn new(engine: AdmissionEngine, shutdown: drain::Watch) -> Self {
        Self { engine, shutdown }
    }

    /// Reviews a request body. Once shutdown begins, pending reviews are
    /// answered with the default verdict instead of waiting on the scan.
    async fn review(self, body: &[u8], deadline: Option<Duration>) -> AdmissionResponse {
        let review = match Review::parse(body) {
            Ok(review) => review,
            Err(error) => {
                warn!(%error, "Failed to parse request body");
                let verdict = self.engine.record(self.engine.default_verdict());
                return review::respond_invalid(&error, verdict);
            }
        };

        let req = review.request();
        let span = info_span!(
            "review",
            uid = %req.uid,
            kind = %req.kind.kind,
            ns = req.namespace.as_deref().unwrap_or_default(),
            name = %req.name,
        );
        let Self { engine, shutdown } = self;
        let verdict = async {
            tokio::select! {
                verdict = engine.admit(&review, deadline) => verdict,
                _release = shutdown.signaled() => {
                    debug!("Shutting down; answering with the default verdict");
                    engine.record(engine.default_verdict())
                }
            }
        }
        .instrument(span)
        .await;

        review.respond(verdict)
    }
}

/// Reads the API server's `timeout` query parameter, e.g. `?timeout=10s`.
fn request_timeout(uri: &http::Uri) -> Option<Duration> {
    let value = uri
        .query()?
        .split('&')
        .find_map(|pair| pair.strip_prefix("timeout="))?;
    match value.parse::<K8sDuration>() {
        Ok(timeout) => Some(timeout.into()),
        Err(error) => {
            warn!(%error, timeout = value, "Ignoring invalid request timeout");
            None
        }
    }
}

fn json_response(rsp: AdmissionReview) -> Result<Response<Body>, Error> {
    let bytes = serde_json::to_vec(&rsp)?;
    Ok(Response::builder()
        .status(http::StatusCode::OK)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(Body::from(bytes))
        .expect("admission review response must be valid"))
}
