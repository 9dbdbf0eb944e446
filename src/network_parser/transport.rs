//! HTTP 传输适配层。
//!
//! 上层只依赖 [`Transport`] trait：`fetch(request) -> {status, headers, body}`。
//! reqwest 实现负责：手动跟随 3xx（有跳数上限）、304/空响应视为空正文、可选禁用缓存。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{
    ACCEPT, ACCEPT_ENCODING, CACHE_CONTROL, CONNECTION, CONTENT_LENGTH, CONTENT_TYPE, HeaderMap,
    HeaderValue, LOCATION, PRAGMA, REFERER, USER_AGENT,
};
use reqwest::{Client, Method, StatusCode, Url};
use tracing::{debug, warn};

use crate::base_system::context::Config;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("invalid url {0}")]
    InvalidUrl(String),
    #[error("{url} responded with HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("too many redirects ({hops}) starting at {url}")]
    TooManyRedirects { url: String, hops: usize },
    #[error("redirect from {0} without a location header")]
    MissingLocation(String),
    #[error("client init failed: {0}")]
    Init(#[source] reqwest::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    Html,
    Json,
}

#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    pub method: Method,
    pub body: Option<String>,
    pub accept: BodyKind,
    pub referer: Option<String>,
    /// 新鲜度敏感的读取：附加 `Cache-Control: no-cache`。
    pub no_cache: bool,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: Method::GET,
            body: None,
            accept: BodyKind::Html,
            referer: None,
            no_cache: false,
        }
    }

    pub fn get_json(url: impl Into<String>) -> Self {
        Self {
            accept: BodyKind::Json,
            ..Self::get(url)
        }
    }

    pub fn post_json(url: impl Into<String>, body: String) -> Self {
        Self {
            method: Method::POST,
            body: Some(body),
            ..Self::get_json(url)
        }
    }

    pub fn with_referer(mut self, referer: impl Into<String>) -> Self {
        self.referer = Some(referer.into());
        self
    }

    pub fn fresh(mut self) -> Self {
        self.no_cache = true;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct FetchResponse {
    pub status: u16,
    pub final_url: String,
    pub headers: HeaderMap,
    pub body: String,
}

impl FetchResponse {
    pub fn is_empty(&self) -> bool {
        self.body.trim().is_empty()
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, TransportError>;
}

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub max_redirects: usize,
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(15),
            connect_timeout: Duration::from_secs(5),
            max_redirects: 10,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120 Safari/537.36".to_string(),
        }
    }
}

impl From<&Config> for TransportConfig {
    fn from(config: &Config) -> Self {
        Self {
            request_timeout: Duration::from_secs(config.request_timeout.max(1)),
            connect_timeout: Duration::from_secs(config.connect_timeout.max(1)),
            max_redirects: config.max_redirects,
            user_agent: config.user_agent.clone(),
        }
    }
}

pub struct ReqwestTransport {
    client: Client,
    config: TransportConfig,
}

impl ReqwestTransport {
    pub fn new(config: TransportConfig) -> Result<Self, TransportError> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));
        default_headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));

        // 跳转由 fetch 手动处理，便于限制跳数并保留最终 URL
        let client = Client::builder()
            .default_headers(default_headers)
            .redirect(reqwest::redirect::Policy::none())
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(TransportError::Init)?;

        Ok(Self { client, config })
    }

    fn headers_for(&self, request: &FetchRequest) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let accept = match request.accept {
            BodyKind::Html => "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            BodyKind::Json => "application/json, text/plain, */*",
        };
        headers.insert(ACCEPT, HeaderValue::from_static(accept));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&self.config.user_agent)
                .unwrap_or(HeaderValue::from_static("Mozilla/5.0")),
        );
        if request.body.is_some() {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }
        if let Some(referer) = request.referer.as_deref()
            && let Ok(v) = HeaderValue::from_str(referer)
        {
            headers.insert(REFERER, v);
        }
        if request.no_cache {
            headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
            headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
        }
        headers
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, TransportError> {
        let origin = request.url.clone();
        let mut url = Url::parse(&request.url).map_err(|_| TransportError::InvalidUrl(origin.clone()))?;
        let mut method = request.method.clone();
        let mut body = request.body.clone();

        for hop in 0..=self.config.max_redirects {
            debug!(target: "transport", hop, method = %method, url = %url, "发送请求");
            let mut builder = self
                .client
                .request(method.clone(), url.clone())
                .headers(self.headers_for(&request));
            if let Some(b) = body.clone() {
                builder = builder.body(b);
            }

            let resp = builder.send().await.map_err(|source| TransportError::Request {
                url: url.to_string(),
                source,
            })?;
            let status = resp.status();

            if status.is_redirection() && status != StatusCode::NOT_MODIFIED {
                let location = resp
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| TransportError::MissingLocation(url.to_string()))?;
                url = resolve_location(&url, location)
                    .ok_or_else(|| TransportError::InvalidUrl(location.to_string()))?;
                // 303 及历史上的 301/302 对 POST 都降级为 GET
                if status == StatusCode::SEE_OTHER
                    || (method == Method::POST
                        && matches!(status, StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND))
                {
                    method = Method::GET;
                    body = None;
                }
                continue;
            }

            if !(status.is_success() || status == StatusCode::NOT_MODIFIED) {
                warn!(target: "transport", status = status.as_u16(), url = %url, "请求失败");
                return Err(TransportError::Status {
                    url: url.to_string(),
                    status: status.as_u16(),
                });
            }

            let headers = resp.headers().clone();
            let final_url = url.to_string();
            if is_empty_payload(status, &headers) {
                return Ok(FetchResponse {
                    status: status.as_u16(),
                    final_url,
                    headers,
                    body: String::new(),
                });
            }

            let text = resp.text().await.map_err(|source| TransportError::Request {
                url: final_url.clone(),
                source,
            })?;
            return Ok(FetchResponse {
                status: status.as_u16(),
                final_url,
                headers,
                body: text,
            });
        }

        Err(TransportError::TooManyRedirects {
            url: origin,
            hops: self.config.max_redirects,
        })
    }
}

/// 304 或 `Content-Length: 0` 代表“没有新数据”，按空正文处理。
pub(crate) fn is_empty_payload(status: StatusCode, headers: &HeaderMap) -> bool {
    if status == StatusCode::NOT_MODIFIED || status == StatusCode::NO_CONTENT {
        return true;
    }
    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        == Some(0)
}

pub(crate) fn resolve_location(base: &Url, location: &str) -> Option<Url> {
    let location = location.trim();
    if location.is_empty() {
        return None;
    }
    base.join(location).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    type Route = fn(&str, &str) -> String;

    fn reply(status: &str, headers: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {status}\r\n{headers}Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        )
    }

    /// 本地 HTTP 服务：按 `route(method, path)` 应答，并记录 `"METHOD /path"`。
    async fn serve(route: Route) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let log = Arc::new(Mutex::new(Vec::new()));
        let seen = log.clone();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let mut buf = Vec::new();
                let mut chunk = [0u8; 1024];
                let head_end = loop {
                    if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                        break Some(pos + 4);
                    }
                    match stream.read(&mut chunk).await {
                        Ok(0) | Err(_) => break None,
                        Ok(n) => buf.extend_from_slice(&chunk[..n]),
                    }
                };
                let Some(head_end) = head_end else { continue };
                let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();
                let length = head
                    .lines()
                    .filter_map(|line| line.split_once(':'))
                    .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                while buf.len() < head_end + length {
                    match stream.read(&mut chunk).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => buf.extend_from_slice(&chunk[..n]),
                    }
                }

                let mut parts = head.split_whitespace();
                let method = parts.next().unwrap_or_default().to_string();
                let path = parts.next().unwrap_or_default().to_string();
                seen.lock().unwrap().push(format!("{method} {path}"));
                let _ = stream.write_all(route(&method, &path).as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });
        (base, log)
    }

    fn transport(max_redirects: usize) -> ReqwestTransport {
        ReqwestTransport::new(TransportConfig {
            max_redirects,
            ..TransportConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn relative_redirect_is_followed_to_final_url() {
        let (base, log) = serve(|_, path| match path {
            "/start" => reply("302 Found", "Location: /next?x=1\r\n", ""),
            "/next?x=1" => reply("200 OK", "", "done"),
            _ => reply("404 Not Found", "", ""),
        })
        .await;
        let resp = transport(3)
            .fetch(FetchRequest::get(format!("{base}/start")))
            .await
            .unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body, "done");
        assert_eq!(resp.final_url, format!("{base}/next?x=1"));
        assert_eq!(*log.lock().unwrap(), ["GET /start", "GET /next?x=1"]);
    }

    #[tokio::test]
    async fn redirect_loop_stops_at_hop_limit() {
        let (base, log) = serve(|_, _| reply("302 Found", "Location: /again\r\n", "")).await;
        let url = format!("{base}/again");
        let err = transport(3).fetch(FetchRequest::get(url.as_str())).await.unwrap_err();
        assert!(
            matches!(&err, TransportError::TooManyRedirects { url: origin, hops: 3 } if *origin == url),
            "{err:?}"
        );
        // 首次请求 + 3 次跳转
        assert_eq!(log.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn redirect_without_location_is_an_error() {
        let (base, _) = serve(|_, _| reply("302 Found", "", "")).await;
        let err = transport(3)
            .fetch(FetchRequest::get(format!("{base}/nowhere")))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::MissingLocation(_)), "{err:?}");
    }

    #[tokio::test]
    async fn see_other_turns_post_into_get_but_307_keeps_it() {
        let (base, log) = serve(|method, path| match (method, path) {
            ("POST", "/submit") => reply("303 See Other", "Location: /result\r\n", ""),
            ("GET", "/result") => reply("200 OK", "", "ok"),
            ("POST", "/keep") => reply("307 Temporary Redirect", "Location: /kept\r\n", ""),
            ("POST", "/kept") => reply("200 OK", "", "still post"),
            _ => reply("405 Method Not Allowed", "", ""),
        })
        .await;
        let transport = transport(3);

        let resp = transport
            .fetch(FetchRequest::post_json(format!("{base}/submit"), r#"{"q":1}"#.into()))
            .await
            .unwrap();
        assert_eq!(resp.body, "ok");

        let resp = transport
            .fetch(FetchRequest::post_json(format!("{base}/keep"), r#"{"q":2}"#.into()))
            .await
            .unwrap();
        assert_eq!(resp.body, "still post");
        assert_eq!(
            *log.lock().unwrap(),
            ["POST /submit", "GET /result", "POST /keep", "POST /kept"]
        );
    }

    #[tokio::test]
    async fn error_status_after_redirect_reports_final_url() {
        let (base, _) = serve(|_, path| match path {
            "/old" => reply("301 Moved Permanently", "Location: /gone\r\n", ""),
            _ => reply("410 Gone", "", ""),
        })
        .await;
        let err = transport(3)
            .fetch(FetchRequest::get(format!("{base}/old")))
            .await
            .unwrap_err();
        assert!(
            matches!(&err, TransportError::Status { url, status: 410 } if *url == format!("{base}/gone")),
            "{err:?}"
        );
    }

    #[test]
    fn not_modified_and_zero_length_are_empty() {
        let mut headers = HeaderMap::new();
        assert!(is_empty_payload(StatusCode::NOT_MODIFIED, &headers));
        assert!(!is_empty_payload(StatusCode::OK, &headers));

        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("0"));
        assert!(is_empty_payload(StatusCode::OK, &headers));

        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("12"));
        assert!(!is_empty_payload(StatusCode::OK, &headers));
    }

    #[test]
    fn relative_location_resolves_against_current_url() {
        let base = Url::parse("https://example.org/novel/abc?page=1").unwrap();
        assert_eq!(
            resolve_location(&base, "/series/abc").unwrap().as_str(),
            "https://example.org/series/abc"
        );
        assert_eq!(
            resolve_location(&base, "https://cdn.example.org/x").unwrap().as_str(),
            "https://cdn.example.org/x"
        );
        assert!(resolve_location(&base, "  ").is_none());
    }

    #[test]
    fn fresh_request_sets_no_cache_headers() {
        let transport = ReqwestTransport::new(TransportConfig::default()).unwrap();
        let req = FetchRequest::get_json("https://example.org/api").fresh();
        let headers = transport.headers_for(&req);
        assert_eq!(headers.get(CACHE_CONTROL).unwrap(), "no-cache");
        assert_eq!(headers.get(PRAGMA).unwrap(), "no-cache");
        assert_eq!(headers.get(ACCEPT).unwrap(), "application/json, text/plain, */*");

        let plain = transport.headers_for(&FetchRequest::get("https://example.org/"));
        assert!(plain.get(CACHE_CONTROL).is_none());
    }
}
