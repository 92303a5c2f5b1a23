//! Resolves a raw endpoint response into the expected type or a structured error.
//!
//! Resolution order:
//! 1. A 2xx body that decodes as `T` is the typed result.
//! 2. A body matching the remote error shape (`{"code": .., "message": ..}`) becomes
//!    [`CallError::Remote`].
//! 3. A non-2xx response without that shape (a proxy's 502 page, a bare 503) becomes
//!    [`CallError::Transport`], so it is retried like any other delivery failure.
//! 4. Anything else is [`CallError::UnexpectedResponse`] carrying a diagnostic dump.

use crate::error::{CallError, RemoteError};
use serde::de::DeserializeOwned;
use serde::Deserialize;

/// Longest dump kept in an unexpected-response error.
pub const MAX_DUMP_LEN: usize = 4096;

#[derive(Deserialize)]
struct RemoteErrorBody {
    #[serde(default)]
    code: Option<u16>,
    message: String,
}

/// Classify one response. Applied identically to every endpoint.
pub fn classify<T: DeserializeOwned>(status: u16, body: &[u8]) -> Result<T, CallError> {
    let success = (200..300).contains(&status);
    if success {
        if let Ok(value) = serde_json::from_slice::<T>(body) {
            return Ok(value);
        }
    }

    if let Ok(remote) = serde_json::from_slice::<RemoteErrorBody>(body) {
        let code = remote.code.unwrap_or(if success { 500 } else { status });
        return Err(CallError::Remote(RemoteError { code, message: remote.message }));
    }

    if !success {
        let text = truncate(String::from_utf8_lossy(body).trim().to_string());
        let message = if text.is_empty() {
            format!("http status {}", status)
        } else {
            format!("http status {}: {}", status, text)
        };
        tracing::debug!(status, "error status without error body");
        return Err(CallError::transport(message));
    }

    let dump = pformat(body);
    tracing::error!(status, %dump, "received unexpected response");
    Err(CallError::UnexpectedResponse { status, dump })
}

/// Best-effort pretty rendering of a response body for diagnostics.
pub fn pformat(body: &[u8]) -> String {
    let rendered = match serde_json::from_slice::<serde_json::Value>(body) {
        Ok(value) => serde_json::to_string_pretty(&value)
            .unwrap_or_else(|_| String::from_utf8_lossy(body).into_owned()),
        Err(_) => String::from_utf8_lossy(body).into_owned(),
    };
    truncate(rendered)
}

fn truncate(mut text: String) -> String {
    if text.len() > MAX_DUMP_LEN {
        let mut cut = MAX_DUMP_LEN;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
        text.push_str("...");
    }
    text
}
