use anyhow::{bail, Context};
use serde_json::{json, Value};

use devflow_core::config::GatewayConfig;

/// Client for the review endpoints of a running gateway.
pub struct ReviewClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ReviewClient {
    pub fn new(config: &GatewayConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: format!("http://{}", config.bind),
            token: config.resolved_token().map(str::to_string),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let req = self.http.request(method, format!("{}{}", self.base_url, path));
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> anyhow::Result<Value> {
        let resp = req
            .send()
            .await
            .with_context(|| format!("gateway at {} is not reachable", self.base_url))?;
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(Value::Null);
        if !status.is_success() {
            let message = body["error"].as_str().unwrap_or("request failed");
            bail!("{} ({})", message, status);
        }
        Ok(body)
    }

    pub async fn list(&self) -> anyhow::Result<Vec<Value>> {
        let body = self
            .send(self.request(reqwest::Method::GET, "/api/reviews"))
            .await?;
        Ok(body["reviews"].as_array().cloned().unwrap_or_default())
    }

    pub async fn decide(&self, review_id: &str, decision: &str) -> anyhow::Result<Value> {
        let req = self
            .request(reqwest::Method::POST, "/api/review-feedback")
            .json(&json!({ "review_id": review_id, "decision": decision }));
        self.send(req).await
    }

    pub async fn revise(&self, review_id: &str, revised: &str) -> anyhow::Result<Value> {
        let req = self
            .request(reqwest::Method::POST, "/api/revisions")
            .json(&json!({ "review_id": review_id, "revised_artifact": revised }));
        self.send(req).await
    }
}

/// One line per pending review.
pub fn format_review(review: &Value) -> String {
    let id = review["id"].as_str().unwrap_or("");
    let short = id.get(..8).unwrap_or(id);
    let key = review["artifact_key"].as_str().unwrap_or("");
    let first_line = key.lines().next().unwrap_or("");
    format!(
        "{}  {:<22} {:<14} {}",
        short,
        review["step"].as_str().unwrap_or("?"),
        review["status"].as_str().unwrap_or("?"),
        crate::console::truncate(first_line, 60)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn review_line_uses_short_id_and_first_line() {
        let line = format_review(&json!({
            "id": "0123456789abcdef",
            "step": "review_user_stories",
            "status": "Pending",
            "artifact_key": "As a user, I can add tasks.\nAs a user, I can share lists.",
        }));
        assert!(line.starts_with("01234567  review_user_stories"));
        assert!(line.contains("Pending"));
        assert!(line.ends_with("As a user, I can add tasks."));
    }

    #[test]
    fn token_is_resolved_from_config() {
        let client = ReviewClient::new(&GatewayConfig {
            bind: "127.0.0.1:9999".into(),
            token: Some("${UNSET_DEVFLOW_TOKEN}".into()),
        });
        assert_eq!(client.base_url, "http://127.0.0.1:9999");
        assert!(client.token.is_none());
    }
}
