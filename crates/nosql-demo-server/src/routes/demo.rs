use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::Json;
use nosql_demo_core::{ConsoleLine, Demo};
use serde::Serialize;
use tracing::{error, info};

use crate::error::AppError;
use crate::state::{AppState, SseMessage};

/// What the page renders: the console, the loading flag and the run status.
#[derive(Debug, Clone, Serialize)]
pub struct DemoSnapshot {
    pub loading: bool,
    pub running: bool,
    pub run_id: Option<String>,
    pub lines: Vec<ConsoleLine>,
    pub error: Option<String>,
}

pub async fn snapshot(app: &AppState) -> DemoSnapshot {
    let log = app.console.snapshot();
    let run = app.run.lock().await.clone();
    DemoSnapshot {
        loading: log.loading,
        running: run.active.is_some(),
        run_id: run.last_id,
        lines: log.lines,
        error: run.last_error,
    }
}

/// GET /api/demo: current console snapshot.
pub async fn get_demo(State(app): State<AppState>) -> Json<DemoSnapshot> {
    Json(snapshot(&app).await)
}

/// Reject browser requests that come from another site.
///
/// `Sec-Fetch-Site: cross-site` is refused outright. An `Origin` header must
/// name the same authority as `Host`. Requests with neither header (non-browser
/// clients) pass.
pub fn check_same_origin(headers: &HeaderMap) -> Result<(), AppError> {
    let header_str = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    let fetch_site = header_str("sec-fetch-site");
    if fetch_site.is_some_and(|site| site.eq_ignore_ascii_case("cross-site")) {
        return Err(AppError::forbidden(
            "cross-site requests may not start a demo run",
        ));
    }

    let Some(origin) = headers.get(header::ORIGIN) else {
        return Ok(());
    };
    let authority = origin
        .to_str()
        .ok()
        .and_then(|o| o.split_once("://"))
        .map(|(_, rest)| rest.trim_end_matches('/'));
    let host = header_str("host");
    match (authority, host) {
        (Some(a), Some(h)) if a.eq_ignore_ascii_case(h) => Ok(()),
        _ => Err(AppError::forbidden(
            "request origin does not match the host; demo run refused",
        )),
    }
}

/// POST /api/demo/run: start a demo run in the background.
///
/// Returns 202 with the run id, 403 for cross-site requests, or 409 while
/// another run is in flight.
pub async fn run_demo(
    State(app): State<AppState>,
    headers: HeaderMap,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    check_same_origin(&headers)?;

    let id = uuid::Uuid::new_v4().to_string();

    {
        let mut run = app.run.lock().await;
        if let Some(active) = &run.active {
            return Err(AppError::conflict(format!(
                "demo run '{active}' is already in progress"
            )));
        }
        run.active = Some(id.clone());
        run.last_id = Some(id.clone());
        run.last_error = None;
    }

    let _ = app.event_tx.send(SseMessage::RunStarted { id: id.clone() });

    let demo = Demo::new(
        app.settings.clone(),
        app.services.clone(),
        app.console.clone(),
    );
    let run_state = app.run.clone();
    let event_tx = app.event_tx.clone();
    let run_id = id.clone();

    tokio::spawn(async move {
        info!(run_id = %run_id, "demo run started");

        let failure = match demo.run().await {
            Ok(summary) => {
                info!(
                    run_id = %run_id,
                    item_id = %summary.read.id,
                    response_len = summary.response.len(),
                    "demo run finished"
                );
                None
            }
            Err(e) => {
                error!(
                    run_id = %run_id,
                    configuration = e.is_configuration(),
                    "demo run failed: {e}"
                );
                Some(e.to_string())
            }
        };

        {
            let mut run = run_state.lock().await;
            run.active = None;
            run.last_error = failure.clone();
        }

        let status = if failure.is_some() { "failed" } else { "completed" };
        let _ = event_tx.send(SseMessage::RunFinished {
            id: run_id,
            status: status.to_string(),
            error: failure,
        });
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "id": id, "status": "started" })),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn requests_without_browser_headers_pass() {
        assert!(check_same_origin(&HeaderMap::new()).is_ok());
    }

    #[test]
    fn same_origin_request_passes() {
        let h = headers(&[
            ("host", "localhost:5000"),
            ("origin", "http://localhost:5000"),
            ("sec-fetch-site", "same-origin"),
        ]);
        assert!(check_same_origin(&h).is_ok());
    }

    #[test]
    fn cross_site_fetch_is_rejected() {
        let h = headers(&[("host", "localhost:5000"), ("sec-fetch-site", "cross-site")]);
        assert!(check_same_origin(&h).is_err());
    }

    #[test]
    fn foreign_or_opaque_origin_is_rejected() {
        for origin in ["https://evil.example", "null", "http://localhost:5001"] {
            let mut h = headers(&[("host", "localhost:5000")]);
            h.insert("origin", HeaderValue::from_static(origin));
            assert!(check_same_origin(&h).is_err(), "{origin} should be rejected");
        }
    }

    #[test]
    fn origin_without_host_is_rejected() {
        let h = headers(&[("origin", "http://localhost:5000")]);
        assert!(check_same_origin(&h).is_err());
    }
}
