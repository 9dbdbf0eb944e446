//! 测试用的内存传输：按 URL 返回预置正文，并记录每一次请求。

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::transport::{FetchRequest, FetchResponse, Transport, TransportError};

#[derive(Default)]
pub(crate) struct FixtureTransport {
    routes: Mutex<HashMap<String, Result<String, u16>>>,
    requests: Mutex<Vec<FetchRequest>>,
}

impl FixtureTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with(self, url: &str, body: impl Into<String>) -> Self {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), Ok(body.into()));
        self
    }

    pub(crate) fn failing(self, url: &str, status: u16) -> Self {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), Err(status));
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.url.clone())
            .collect()
    }

    pub(crate) fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub(crate) fn last_request(&self) -> Option<FetchRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl Transport for FixtureTransport {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        let route = self.routes.lock().unwrap().get(&request.url).cloned();
        match route {
            Some(Ok(body)) => Ok(FetchResponse {
                status: 200,
                final_url: request.url,
                headers: Default::default(),
                body,
            }),
            Some(Err(status)) => Err(TransportError::Status {
                url: request.url,
                status,
            }),
            None => Err(TransportError::Status {
                url: request.url,
                status: 404,
            }),
        }
    }
}
