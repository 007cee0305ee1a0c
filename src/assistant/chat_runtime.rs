use std::time::Duration;

use reqwest::{RequestBuilder, Response, StatusCode};

#[derive(Debug)]
pub(crate) enum RequestFailure {
    Request(reqwest::Error),
    Api { status: StatusCode, body: String },
}

/// Sends `request` exactly once. Non-2xx answers carry their body text.
pub(crate) async fn send(
    request: RequestBuilder,
    timeout_secs: Option<u64>,
) -> Result<Response, RequestFailure> {
    let request = match timeout_secs {
        Some(secs) => request.timeout(Duration::from_secs(secs)),
        None => request,
    };

    let response = request.send().await.map_err(RequestFailure::Request)?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    log::debug!("chat proxy answered {status}: {body}");
    Err(RequestFailure::Api { status, body })
}
