//! `admission.k8s.io/v1` AdmissionReviews, as modeled by `kube`.
//!
//! The review as a whole is retained so that it can be forwarded to the scan
//! backend unchanged.

use crate::Verdict;
use kube::core::{admission, DynamicObject, Status};

pub use kube::core::admission::{AdmissionResponse, Operation};

pub type AdmissionReview = admission::AdmissionReview<DynamicObject>;
pub type AdmissionRequest = admission::AdmissionRequest<DynamicObject>;

/// A parsed admission review.
#[derive(Debug)]
pub struct Review {
    data: serde_json::Value,
    request: AdmissionRequest,
}

#[derive(Debug, thiserror::Error)]
pub enum ReviewError {
    #[error("invalid admission review: {0}")]
    Json(#[from] serde_json::Error),

    #[error("admission review has no request")]
    MissingRequest,
}

// === impl Review ===

impl Review {
    pub fn parse(body: &[u8]) -> Result<Self, ReviewError> {
        let review = serde_json::from_slice::<AdmissionReview>(body)?;
        let request: AdmissionRequest = review
            .try_into()
            .map_err(|_| ReviewError::MissingRequest)?;

        // Forward only the request, as a well-formed v1 review.
        let mut value = serde_json::from_slice::<serde_json::Value>(body)?;
        let data = serde_json::json!({
            "apiVersion": admission::META_API_VERSION_V1,
            "kind": admission::META_KIND,
            "request": value
                .get_mut("request")
                .map(serde_json::Value::take)
                .unwrap_or_default(),
        });

        Ok(Self { data, request })
    }

    pub fn request(&self) -> &AdmissionRequest {
        &self.request
    }

    pub fn uid(&self) -> &str {
        &self.request.uid
    }

    /// The review as it is forwarded to the scan backend.
    pub fn data(&self) -> &serde_json::Value {
        &self.data
    }

    /// Answers this review with `verdict`.
    pub fn respond(&self, verdict: Verdict) -> AdmissionResponse {
        respond(AdmissionResponse::from(&self.request), verdict)
    }
}

/// Applies a verdict to a response, carrying its reason as the status message.
pub fn respond(rsp: AdmissionResponse, verdict: Verdict) -> AdmissionResponse {
    if !verdict.is_allowed() {
        let mut rsp = rsp.deny(verdict.reason());
        rsp.result.code = 403;
        rsp.result.reason = "Forbidden".to_string();
        return rsp;
    }

    let mut rsp = rsp;
    rsp.allowed = true;
    rsp.result = Status::success().with_code(200);
    rsp.result.message = verdict.reason().to_string();
    rsp
}

/// Answers a review that could not be parsed.
pub fn respond_invalid(error: &ReviewError, verdict: Verdict) -> AdmissionResponse {
    respond(AdmissionResponse::invalid(error), verdict)
}

pub fn operation_str(op: &Operation) -> &'static str {
    match op {
        Operation::Create => "CREATE",
        Operation::Update => "UPDATE",
        Operation::Delete => "DELETE",
        Operation::Connect => "CONNECT",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn parses_request_fields() {
        let body = json!({
            "apiVersion": "admission.k8s.io/v1",
            "kind": "AdmissionReview",
            "request": {
                "uid": "705ab4f5-6393-11e8-b7cc-42010a800002",
                "kind": {"group": "apps", "version": "v1", "kind": "Deployment"},
                "resource": {"group": "apps", "version": "v1", "resource": "deployments"},
                "namespace": "apps",
                "name": "web",
                "operation": "UPDATE",
                "userInfo": {"username": "admin@example.com"},
                "object": {
                    "apiVersion": "apps/v1",
                    "kind": "Deployment",
                    "metadata": {"name": "web"},
                },
                "oldObject": null,
                "dryRun": false,
            }
        });
        let review = Review::parse(body.to_string().as_bytes()).unwrap();
        let req = review.request();

        assert_eq!(review.uid(), "705ab4f5-6393-11e8-b7cc-42010a800002");
        assert_eq!(req.kind.kind, "Deployment");
        assert_eq!(req.operation, Operation::Update);
        assert_eq!(operation_str(&req.operation), "UPDATE");
        assert_eq!(req.namespace.as_deref(), Some("apps"));
        assert_eq!(req.user_info.username.as_deref(), Some("admin@example.com"));
        let object = req.object.as_ref().unwrap();
        assert_eq!(object.metadata.name.as_deref(), Some("web"));
        assert!(req.old_object.is_none());

        assert_eq!(review.data()["kind"], "AdmissionReview");
        assert_eq!(review.data()["request"]["name"], "web");
    }

    #[test]
    fn rejects_reviews_without_request() {
        assert!(matches!(
            Review::parse(br#"{"apiVersion":"admission.k8s.io/v1","kind":"AdmissionReview"}"#),
            Err(ReviewError::MissingRequest)
        ));
        assert!(matches!(Review::parse(b"{"), Err(ReviewError::Json(_))));
    }

    #[test]
    fn denied_responses_are_forbidden() {
        let rsp = respond(AdmissionResponse::invalid("bad"), Verdict::DenyFailed);
        let rsp = serde_json::to_value(rsp.into_review()).unwrap();
        assert_eq!(rsp["response"]["allowed"], false);
        assert_eq!(
            rsp["response"]["status"],
            json!({
                "status": "Failure",
                "code": 403,
                "message": "FAILED MONDOO SCAN",
                "reason": "Forbidden",
            })
        );

        let rsp = respond(AdmissionResponse::invalid("bad"), Verdict::AllowDefault);
        assert!(rsp.allowed);
        assert_eq!(rsp.result.code, 200);
        assert_eq!(rsp.result.message, "DEFAULT MONDOO PASSED");
    }
}
