//! HTTP client module with retry logic and error handling.

mod client;
mod retry;

pub use client::{HttpClient, HttpResponse};
pub use retry::{
    INITIAL_DELAY_MS, MAX_ATTEMPTS, RATE_LIMIT_REMAINING_HEADER, RATE_LIMIT_RESET_HEADER,
    RetryPolicy, classify_status, rate_limit_reset,
};
