/// What to do with a failed AWS call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorDisposition {
    /// Back off and retry (throttling, transient 5xx).
    Retry,
    /// Retry after an intermediate cleanup pass (resource still referenced).
    RetryAfterUnblock,
    /// The resource is already gone; a delete is a success.
    AlreadyGone,
    /// Give up; record the task as failed.
    Fail,
}

/// Classify an AWS error code into a disposition.
///
/// Codes not listed are treated as `Fail`; retrying an unknown error hides
/// real problems behind backoff noise.
pub fn classify_aws_error(code: &str) -> ErrorDisposition {
    match code {
        // Throttling family
        "Throttling"
        | "ThrottlingException"
        | "RequestLimitExceeded"
        | "TooManyRequestsException"
        | "SlowDown"
        | "ProvisionedThroughputExceededException" => ErrorDisposition::Retry,

        // Transient server-side failures
        "InternalError"
        | "InternalFailure"
        | "ServiceUnavailable"
        | "ServiceUnavailableException"
        | "RequestTimeout"
        | "RequestTimeoutException" => ErrorDisposition::Retry,

        // Still referenced by something else; clear the reference and retry
        "DependencyViolation" | "ResourceInUse" | "ResourceInUseException" => {
            ErrorDisposition::RetryAfterUnblock
        }

        // Deleting something that does not exist is a success
        "NoSuchEntity"
        | "NoSuchEntityException"
        | "InvalidGroupId.NotFound"
        | "InvalidGroup.NotFound"
        | "InvalidInstanceID.NotFound"
        | "NoSuchBucket"
        | "ResourceNotFoundException"
        | "NotFoundException"
        | "StateMachineDoesNotExist"
        | "ClusterNotFound"
        | "ClusterNotFoundFault"
        | "ReplicationConfigurationNotFoundError" => ErrorDisposition::AlreadyGone,

        // Permission and signature problems never heal on retry
        "AccessDenied"
        | "AccessDeniedException"
        | "UnauthorizedOperation"
        | "InvalidClientTokenId"
        | "SignatureDoesNotMatch"
        | "ExpiredToken" => ErrorDisposition::Fail,

        _ => ErrorDisposition::Fail,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throttling_retries() {
        assert_eq!(classify_aws_error("Throttling"), ErrorDisposition::Retry);
        assert_eq!(
            classify_aws_error("RequestLimitExceeded"),
            ErrorDisposition::Retry
        );
    }

    #[test]
    fn dependency_violation_needs_unblock() {
        assert_eq!(
            classify_aws_error("DependencyViolation"),
            ErrorDisposition::RetryAfterUnblock
        );
    }

    #[test]
    fn missing_resources_count_as_done() {
        assert_eq!(
            classify_aws_error("InvalidGroupId.NotFound"),
            ErrorDisposition::AlreadyGone
        );
        assert_eq!(
            classify_aws_error("NoSuchEntity"),
            ErrorDisposition::AlreadyGone
        );
        assert_eq!(
            classify_aws_error("ReplicationConfigurationNotFoundError"),
            ErrorDisposition::AlreadyGone
        );
    }

    #[test]
    fn access_denied_fails_fast() {
        assert_eq!(classify_aws_error("AccessDenied"), ErrorDisposition::Fail);
    }

    #[test]
    fn unknown_codes_fail() {
        assert_eq!(
            classify_aws_error("SomethingNovel"),
            ErrorDisposition::Fail
        );
    }
}
