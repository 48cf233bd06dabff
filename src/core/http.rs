use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_ENCODING};
use reqwest::{redirect, Client};

use crate::core::config::EngineSettings;

/// Shared HTTP client for one launcher session.
///
/// Redirects are not followed by reqwest: the chunked downloader resolves them
/// itself so it can cap the chain and reuse the final URL for ranged requests.
/// `identity` encoding keeps `Content-Length` equal to the bytes on disk.
pub fn build_http_client(settings: &EngineSettings) -> Result<Client, reqwest::Error> {
    let mut default_headers = HeaderMap::new();
    default_headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));

    Client::builder()
        .user_agent(settings.user_agent.clone())
        .default_headers(default_headers)
        .redirect(redirect::Policy::none())
        .connect_timeout(settings.connect_timeout())
        .read_timeout(settings.read_timeout())
        .build()
}

/// GET a metadata document as text, following redirects manually.
pub(crate) async fn get_text(
    client: &Client,
    url: &str,
    max_redirects: usize,
) -> crate::core::error::LauncherResult<String> {
    use crate::core::error::LauncherError;

    let mut current = url.to_string();
    for _ in 0..=max_redirects {
        let response = client.get(&current).send().await?;
        let status = response.status();
        if status.is_redirection() {
            current = redirect_target(&current, response.headers())?;
            continue;
        }
        if !status.is_success() {
            return Err(LauncherError::DownloadFailed {
                url: current,
                status: status.as_u16(),
            });
        }
        return Ok(response.text().await?);
    }

    Err(LauncherError::TooManyRedirects {
        url: url.to_string(),
        limit: max_redirects,
    })
}

/// Resolve the `Location` of a redirect response against the URL that produced it.
pub(crate) fn redirect_target(
    from: &str,
    headers: &HeaderMap,
) -> crate::core::error::LauncherResult<String> {
    use crate::core::error::LauncherError;

    let location = headers
        .get(reqwest::header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| LauncherError::MissingRedirectLocation {
            url: from.to_string(),
        })?;

    let base = reqwest::Url::parse(from).map_err(|e| LauncherError::Other(e.to_string()))?;
    let next = base
        .join(location)
        .map_err(|e| LauncherError::Other(e.to_string()))?;
    Ok(next.to_string())
}
