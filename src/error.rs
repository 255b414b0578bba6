/// Failures the HTTP layer maps to a specific status code.
///
/// Services return `color_eyre::Result` and raise these with `Err(DomainError::..)?`;
/// anything that is not a `DomainError` is treated as an internal error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    #[error("{0}")]
    Validation(String),
    #[error("authentication required")]
    Unauthorized,
    #[error("{0}")]
    Forbidden(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Unavailable(String),
}

impl DomainError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }
}

/// Finds a `DomainError` anywhere in a report's chain.
pub fn find_domain_error(report: &color_eyre::Report) -> Option<&DomainError> {
    report
        .chain()
        .find_map(|cause| cause.downcast_ref::<DomainError>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use color_eyre::eyre::WrapErr;

    #[test]
    fn test_find_domain_error_through_context() {
        let result: color_eyre::Result<()> =
            Err(DomainError::NotFound("show")).wrap_err("Failed to load show");
        let report = result.unwrap_err();

        assert_eq!(
            find_domain_error(&report),
            Some(&DomainError::NotFound("show"))
        );
    }

    #[test]
    fn test_find_domain_error_absent() {
        let report = color_eyre::eyre::eyre!("database is on fire");
        assert!(find_domain_error(&report).is_none());
    }
}
