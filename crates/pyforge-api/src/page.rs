//! Rendered-page HTTP endpoint.
//!
//! The backend renders page markup server-side; the view layer fetches it
//! here, scoped by path and client id. The core only supplies the client
//! id and consumes the resulting module-context binding. Failures are
//! surfaced as rendered error markup, never as a panic.

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::error::Error;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A rendered page as returned by the backend.
#[derive(Debug, Clone, Deserialize)]
pub struct RenderedPage {
    /// Markup for the page body.
    #[serde(default)]
    pub jsx: String,

    /// Inline style block, if any.
    #[serde(default)]
    pub style: Option<String>,

    /// Head tags (title, meta, links) as raw descriptors.
    #[serde(default)]
    pub head: Vec<Value>,

    /// Module context binding for outbound messages from this page.
    #[serde(default)]
    pub context: Option<String>,

    /// Script URLs the page depends on.
    #[serde(default)]
    pub scripts: Vec<String>,
}

/// Client for the page-markup endpoint.
pub struct PageClient {
    http: reqwest::Client,
    base_url: Url,
}

impl PageClient {
    /// Build a client for the given backend base URL.
    pub fn new(base_url: Url) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .user_agent("pyforge-client/0.1.0")
            .build()?;
        Ok(Self { http, base_url })
    }

    /// Fetch the rendered page for `path`, scoped by `client_id`.
    ///
    /// Non-success responses become [`Error::PageFetch`] carrying the
    /// error markup extracted from the body, so the view layer can show
    /// it in place of the page.
    pub async fn fetch_page(&self, path: &str, client_id: &str) -> Result<RenderedPage, Error> {
        let mut url = self
            .base_url
            .join("pyforge-page/")?
            .join(path.trim_start_matches('/'))?;
        url.query_pairs_mut().append_pair("client_id", client_id);

        tracing::debug!(url = %url, "fetching rendered page");

        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::PageFetch {
                status: status.as_u16(),
                markup: extract_error_markup(&body),
            });
        }

        Ok(response.json::<RenderedPage>().await?)
    }
}

/// Pull renderable markup out of an error response body.
///
/// JSON bodies may carry the markup under `jsx` or `message`; anything
/// else is passed through verbatim.
fn extract_error_markup(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        for key in ["jsx", "message"] {
            if let Some(markup) = value.get(key).and_then(Value::as_str) {
                return markup.to_owned();
            }
        }
    }
    body.to_owned()
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn setup() -> (MockServer, PageClient) {
        let server = MockServer::start().await;
        let client = PageClient::new(server.uri().parse().unwrap()).unwrap();
        (server, client)
    }

    #[tokio::test]
    async fn fetch_page_carries_client_id() {
        let (server, client) = setup().await;

        let body = json!({
            "jsx": "<Page>hello</Page>",
            "style": ".x{}",
            "context": "main_module",
            "head": [],
            "scripts": ["/static/app.js"]
        });

        Mock::given(method("GET"))
            .and(path("/pyforge-page/home"))
            .and(query_param("client_id", "c-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&body))
            .mount(&server)
            .await;

        let page = client.fetch_page("/home", "c-1").await.unwrap();
        assert_eq!(page.jsx, "<Page>hello</Page>");
        assert_eq!(page.context.as_deref(), Some("main_module"));
        assert_eq!(page.scripts, vec!["/static/app.js"]);
    }

    #[tokio::test]
    async fn error_response_surfaces_markup() {
        let (server, client) = setup().await;

        Mock::given(method("GET"))
            .and(path("/pyforge-page/missing"))
            .respond_with(
                ResponseTemplate::new(404)
                    .set_body_json(json!({"jsx": "<Error>no such page</Error>"})),
            )
            .mount(&server)
            .await;

        let err = client.fetch_page("missing", "c-1").await.unwrap_err();
        match err {
            Error::PageFetch { status, markup } => {
                assert_eq!(status, 404);
                assert_eq!(markup, "<Error>no such page</Error>");
            }
            other => panic!("expected PageFetch, got {other:?}"),
        }
    }

    #[test]
    fn non_json_error_body_passes_through() {
        assert_eq!(extract_error_markup("<h1>boom</h1>"), "<h1>boom</h1>");
    }
}
