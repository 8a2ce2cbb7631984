use std::time::Duration;

use http_body_util::{BodyExt, Empty};
use hyper::Request;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use serde::Deserialize;

use crate::error::BrowserLaunchError;

/// One entry of the `/json` discovery array (§6 "Inbound from browser
/// `/json`").
#[derive(Debug, Clone, Deserialize)]
pub struct DevtoolsTarget {
    pub id: String,
    pub url: String,
    #[serde(rename = "webSocketDebuggerUrl")]
    pub web_socket_debugger_url: String,
}

/// Fetches `http://127.0.0.1:<remote_debugger_port>/json`, using the same
/// `hyper_util` client the capture crate already depends on rather than
/// pulling in a second HTTP client crate (§4.9).
pub async fn list_targets(remote_debugger_port: u16) -> Result<Vec<DevtoolsTarget>, BrowserLaunchError> {
    let client = Client::builder(TokioExecutor::new()).build_http();
    let uri = format!("http://127.0.0.1:{remote_debugger_port}/json");
    let req = Request::get(&uri)
        .body(Empty::<bytes::Bytes>::new())
        .map_err(|e| BrowserLaunchError::Probe(e.to_string()))?;

    let resp = client
        .request(req)
        .await
        .map_err(|e| BrowserLaunchError::Probe(e.to_string()))?;
    let body = resp
        .into_body()
        .collect()
        .await
        .map_err(|e| BrowserLaunchError::Probe(e.to_string()))?
        .to_bytes();

    serde_json::from_slice(&body).map_err(|e| BrowserLaunchError::Probe(e.to_string()))
}

/// Polls `/json` every 500ms (§4.9 step 4) until it answers or `timeout`
/// elapses.
pub async fn poll_until_ready(
    remote_debugger_port: u16,
    timeout: Duration,
) -> Result<Vec<DevtoolsTarget>, BrowserLaunchError> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        match list_targets(remote_debugger_port).await {
            Ok(targets) => return Ok(targets),
            Err(_) if tokio::time::Instant::now() < deadline => {
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
            Err(_) => return Err(BrowserLaunchError::Timeout),
        }
    }
}

/// Finds a tab whose `url` equals `target_url` (§4.9 step 2).
pub fn find_matching_tab<'a>(targets: &'a [DevtoolsTarget], target_url: &str) -> Option<&'a DevtoolsTarget> {
    targets.iter().find(|t| t.url == target_url)
}
