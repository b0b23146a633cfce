//! Shared HTTP constants (headers, problem URIs).

pub(crate) const HEADER_REQUEST_ID: &str = "x-request-id";
pub(crate) const HEADER_LAST_EVENT_ID: &str = "last-event-id";

pub(crate) const SSE_KEEP_ALIVE_SECS: u64 = 15;

pub(crate) const PROBLEM_INTERNAL: &str = "https://tracewarden.dev/problems/internal";
pub(crate) const PROBLEM_BAD_REQUEST: &str = "https://tracewarden.dev/problems/bad-request";
pub(crate) const PROBLEM_CONFIG_INVALID: &str = "https://tracewarden.dev/problems/config-invalid";
pub(crate) const PROBLEM_START_FAILED: &str = "https://tracewarden.dev/problems/start-failed";
