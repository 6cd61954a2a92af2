//! Error types for the translation controller

use thiserror::Error;

/// Main error type for controller operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// An object was missing a metadata field the controller relies on
    #[error("missing object key: {0}")]
    MissingObjectKey(&'static str),

    /// A named service port could not be resolved to a numeric port
    #[error("port {port:?} not found in service {namespace}/{name}")]
    PortNotFound {
        /// Namespace of the service
        namespace: String,
        /// Name of the service
        name: String,
        /// The named port that was looked up
        port: String,
    },
}

impl Error {
    fn api_code(&self) -> Option<u16> {
        match self {
            Error::Kube(kube::Error::Api(response)) => Some(response.code),
            _ => None,
        }
    }

    /// The API server reported the object as absent.
    pub fn is_not_found(&self) -> bool {
        self.api_code() == Some(404)
    }

    /// The write lost an optimistic-concurrency race.
    pub fn is_conflict(&self) -> bool {
        self.api_code() == Some(409)
    }

    /// The object failed server-side validation. Retrying without a spec
    /// change cannot succeed, so callers translate this into a long requeue.
    pub fn is_invalid(&self) -> bool {
        matches!(self.api_code(), Some(422) | Some(400))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ErrorResponse;

    fn api_error(code: u16, reason: &str) -> Error {
        Error::Kube(kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: format!("{reason} ({code})"),
            reason: reason.to_string(),
            code,
        }))
    }

    /// Story: a derived resource vanished between list and read. The converge
    /// loop treats 404 as "proceed to create", nothing else.
    #[test]
    fn story_not_found_is_distinguished_from_other_api_errors() {
        assert!(api_error(404, "NotFound").is_not_found());
        assert!(!api_error(409, "Conflict").is_not_found());
        assert!(!api_error(500, "InternalError").is_not_found());
    }

    /// Story: two writers raced on the finalizer list. Conflicts requeue soon
    /// rather than propagating as failures.
    #[test]
    fn story_conflicts_are_recognized_for_requeue() {
        assert!(api_error(409, "Conflict").is_conflict());
        assert!(!api_error(404, "NotFound").is_conflict());
    }

    /// Story: the API server rejected a structurally broken HTTPRoute (for
    /// example one whose backend port could not be resolved). That rejection
    /// is permanent until the Ingress spec changes, so it must be classified
    /// apart from transient transport errors.
    #[test]
    fn story_validation_rejections_are_permanent() {
        assert!(api_error(422, "Invalid").is_invalid());
        assert!(api_error(400, "BadRequest").is_invalid());
        assert!(!api_error(500, "InternalError").is_invalid());
        assert!(!api_error(409, "Conflict").is_invalid());
    }

    #[test]
    fn non_api_errors_have_no_classification() {
        let err = Error::MissingObjectKey(".metadata.name");
        assert!(!err.is_not_found());
        assert!(!err.is_conflict());
        assert!(!err.is_invalid());
        assert!(err.to_string().contains(".metadata.name"));
    }
}
