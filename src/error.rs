//! Stable error codes shared by every failure type in the crate.
//!
//! DESIGN
//! ======
//! Each module owns its own `thiserror` enum. This trait gives them a common
//! machine-readable code and a retry hint so logs and the HTTP layer can
//! classify failures without matching on concrete types.

pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NotFound;

    impl std::fmt::Display for NotFound {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "not found")
        }
    }

    impl ErrorCode for NotFound {
        fn error_code(&self) -> &'static str {
            "E_NOT_FOUND"
        }
    }

    #[test]
    fn retryable_defaults_to_false() {
        assert!(!NotFound.retryable());
        assert_eq!(NotFound.error_code(), "E_NOT_FOUND");
    }
}
