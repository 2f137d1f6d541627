//! Client for the external test result server.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::models::{LabTestResult, TestResult};

#[derive(Debug, Serialize)]
struct ResultRequest<'a> {
    id: &'a str,
}

/// Black-box oracle returning the COVID test result for a hashed GUID.
#[async_trait]
pub trait TestResultClient: Send + Sync {
    async fn result(&self, hashed_guid: &str) -> Result<TestResult, anyhow::Error>;
}

/// HTTP implementation talking to the result server.
pub struct TestResultServerClient {
    client: reqwest::Client,
    base_url: String,
}

impl TestResultServerClient {
    pub fn new(base_url: &str) -> Result<Self, anyhow::Error> {
        let client = reqwest::Client::builder()
            .pool_idle_timeout(std::time::Duration::from_secs(30))
            .timeout(std::time::Duration::from_secs(5))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl TestResultClient for TestResultServerClient {
    async fn result(&self, hashed_guid: &str) -> Result<TestResult, anyhow::Error> {
        let url = format!("{}/api/v1/app/result", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&ResultRequest { id: hashed_guid })
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json::<TestResult>().await?)
    }
}

/// Configurable stand-in for tests: results are keyed by hashed GUID, with
/// a default for everything else.
#[derive(Clone, Default)]
pub struct MockTestResultClient {
    results: Arc<Mutex<HashMap<String, i32>>>,
    default_code: i32,
}

impl MockTestResultClient {
    pub fn new() -> Self {
        Self {
            results: Arc::new(Mutex::new(HashMap::new())),
            default_code: LabTestResult::Pending.code(),
        }
    }

    pub async fn set_result(&self, hashed_guid: &str, code: i32) {
        self.results
            .lock()
            .await
            .insert(hashed_guid.to_string(), code);
    }
}

#[async_trait]
impl TestResultClient for MockTestResultClient {
    async fn result(&self, hashed_guid: &str) -> Result<TestResult, anyhow::Error> {
        let code = self
            .results
            .lock()
            .await
            .get(hashed_guid)
            .copied()
            .unwrap_or(self.default_code);
        Ok(TestResult::new(code))
    }
}
