use anyhow::{Context, Result};
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use routemap::server::{build_router, init_state};
use routemap_core::Config;
use tower::ServiceExt;

pub struct TestApp {
    router: Router,
}

impl TestApp {
    pub fn new(mut config: Config) -> Self {
        config.server.cors_enabled = false;
        config.server.verbose = false;

        Self {
            router: build_router(init_state(config)),
        }
    }

    pub async fn post_json(
        &self,
        path: &str,
        payload: serde_json::Value,
    ) -> Result<serde_json::Value> {
        let (status, body) = self.post_with_status(path, payload).await?;
        if !status.is_success() {
            anyhow::bail!("request failed with status {}", status);
        }
        Ok(body)
    }

    pub async fn get_json(&self, path: &str) -> Result<serde_json::Value> {
        let (status, body) = self.get_with_status(path).await?;
        if !status.is_success() {
            anyhow::bail!("request failed with status {}", status);
        }
        Ok(body)
    }

    /// Variant that keeps the status code; used by the error-path tests.
    pub async fn get_with_status(&self, path: &str) -> Result<(StatusCode, serde_json::Value)> {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())?;

        self.execute(request).await
    }

    pub async fn post_with_status(
        &self,
        path: &str,
        payload: serde_json::Value,
    ) -> Result<(StatusCode, serde_json::Value)> {
        let body = Body::from(serde_json::to_vec(&payload)?);
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "application/json")
            .body(body)?;

        self.execute(request).await
    }

    async fn execute(&self, request: Request<Body>) -> Result<(StatusCode, serde_json::Value)> {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .context("router execution failed")?;

        let status = response.status();
        let bytes = response.into_body().collect().await?.to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        Ok((status, body))
    }
}
