use std::time::Duration;

/// Default bound on a single invocation when none is configured.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default supervisor tick used for progress publication.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default number of distinct error messages retained by the tally.
pub const DEFAULT_ERROR_CAP: usize = 32;

/// Default bound on a single cleanup deletion.
pub const DEFAULT_CLEANUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Label used for the folded bucket of errors past the tally cap.
pub const OTHER_ERRORS_LABEL: &str = "other";
