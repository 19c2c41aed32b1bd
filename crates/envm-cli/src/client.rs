//! HTTP client for the envm API.

use anyhow::{Context, Result, bail};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

// ── Response types ───────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub full_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub user: User,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Organization {
    pub id: String,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Project {
    pub id: String,
    pub organization_id: String,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Environment {
    pub id: String,
    pub project_id: String,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Variable {
    pub key: String,
    pub value: String,
    pub path: String,
}

#[derive(Deserialize)]
struct Organizations {
    organizations: Vec<Organization>,
}

#[derive(Deserialize)]
struct Projects {
    projects: Vec<Project>,
}

#[derive(Deserialize)]
struct Environments {
    environments: Vec<Environment>,
}

#[derive(Deserialize)]
struct Variables {
    variables: Vec<Variable>,
}

#[derive(Deserialize)]
struct Message {
    message: String,
}

// ── Client ───────────────────────────────────────────────────────────

pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    access_token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: format!("{}/api/v1", base_url.trim_end_matches('/')),
            access_token: None,
        }
    }

    #[must_use]
    pub fn with_access_token(mut self, token: String) -> Self {
        self.access_token = Some(token);
        self
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.http.request(method, format!("{}{path}", self.base_url));
        match &self.access_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let resp = builder
            .send()
            .await
            .context("request failed (is the envm server running?)")?;
        handle_response(resp).await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send(self.request(Method::GET, path)).await
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, body: &Value) -> Result<T> {
        self.send(self.request(Method::POST, path).json(body)).await
    }

    async fn put<T: DeserializeOwned>(&self, path: &str, body: &Value) -> Result<T> {
        self.send(self.request(Method::PUT, path).json(body)).await
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let _: Value = self.send(self.request(Method::DELETE, path)).await?;
        Ok(())
    }

    // ── Auth ─────────────────────────────────────────────────────────

    pub async fn register(&self, email: &str, password: &str, full_name: &str) -> Result<User> {
        self.post(
            "/auth/register",
            &json!({ "email": email, "password": password, "full_name": full_name }),
        )
        .await
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<Session> {
        self.post("/auth/login", &json!({ "email": email, "password": password }))
            .await
    }

    /// Exchange a refresh token for a new session; the old token is revoked.
    pub async fn refresh(&self, refresh_token: &str) -> Result<Session> {
        self.post("/auth/refresh", &json!({ "refresh_token": refresh_token }))
            .await
    }

    pub async fn logout(&self, refresh_token: &str) -> Result<()> {
        let _: Message = self
            .post("/auth/logout", &json!({ "refresh_token": refresh_token }))
            .await?;
        Ok(())
    }

    pub async fn forgot_password(&self, email: &str) -> Result<String> {
        let ack: Message = self
            .post("/auth/forgot-password", &json!({ "email": email }))
            .await?;
        Ok(ack.message)
    }

    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<String> {
        let ack: Message = self
            .post(
                "/auth/reset-password",
                &json!({ "token": token, "new_password": new_password }),
            )
            .await?;
        Ok(ack.message)
    }

    // ── Current user ─────────────────────────────────────────────────

    pub async fn me(&self) -> Result<User> {
        self.get("/users/me").await
    }

    pub async fn update_me(&self, email: Option<&str>, full_name: Option<&str>) -> Result<User> {
        self.put("/users/me", &json!({ "email": email, "full_name": full_name }))
            .await
    }

    pub async fn delete_me(&self) -> Result<()> {
        self.delete("/users/me").await
    }

    // ── Organizations & projects ─────────────────────────────────────

    pub async fn list_orgs(&self) -> Result<Vec<Organization>> {
        let list: Organizations = self.get("/orgs").await?;
        Ok(list.organizations)
    }

    pub async fn create_org(&self, name: &str, slug: Option<&str>) -> Result<Organization> {
        self.post("/orgs", &json!({ "name": name, "slug": slug })).await
    }

    pub async fn get_org(&self, org_id: &str) -> Result<Organization> {
        self.get(&format!("/orgs/{org_id}")).await
    }

    pub async fn update_org(
        &self,
        org_id: &str,
        name: Option<&str>,
        slug: Option<&str>,
    ) -> Result<Organization> {
        self.put(&format!("/orgs/{org_id}"), &json!({ "name": name, "slug": slug }))
            .await
    }

    pub async fn delete_org(&self, org_id: &str) -> Result<()> {
        self.delete(&format!("/orgs/{org_id}")).await
    }

    pub async fn accept_invitation(&self, token: &str) -> Result<Value> {
        self.post("/invitations/accept", &json!({ "token": token }))
            .await
    }

    pub async fn list_projects(&self, org_id: Option<&str>) -> Result<Vec<Project>> {
        let path = match org_id {
            Some(org_id) => format!("/orgs/{org_id}/projects"),
            None => "/projects".to_owned(),
        };
        let list: Projects = self.get(&path).await?;
        Ok(list.projects)
    }

    pub async fn get_project(&self, project_id: &str) -> Result<Project> {
        self.get(&format!("/projects/{project_id}")).await
    }

    pub async fn update_project(
        &self,
        project_id: &str,
        name: Option<&str>,
        slug: Option<&str>,
        description: Option<&str>,
    ) -> Result<Project> {
        self.put(
            &format!("/projects/{project_id}"),
            &json!({ "name": name, "slug": slug, "description": description }),
        )
        .await
    }

    pub async fn delete_project(&self, project_id: &str) -> Result<()> {
        self.delete(&format!("/projects/{project_id}")).await
    }

    pub async fn create_project(
        &self,
        org_id: &str,
        name: &str,
        description: Option<&str>,
    ) -> Result<Project> {
        self.post(
            &format!("/orgs/{org_id}/projects"),
            &json!({ "name": name, "description": description }),
        )
        .await
    }

    // ── Environments & variables ─────────────────────────────────────

    pub async fn list_environments(&self, project_id: &str) -> Result<Vec<Environment>> {
        let list: Environments = self
            .get(&format!("/projects/{project_id}/environments"))
            .await?;
        Ok(list.environments)
    }

    pub async fn create_environment(&self, project_id: &str, name: &str) -> Result<Environment> {
        self.post(
            &format!("/projects/{project_id}/environments"),
            &json!({ "name": name }),
        )
        .await
    }

    pub async fn get_environment(&self, env_id: &str) -> Result<Environment> {
        self.get(&format!("/environments/{env_id}")).await
    }

    pub async fn update_environment(
        &self,
        env_id: &str,
        name: Option<&str>,
        slug: Option<&str>,
    ) -> Result<Environment> {
        self.put(
            &format!("/environments/{env_id}"),
            &json!({ "name": name, "slug": slug }),
        )
        .await
    }

    pub async fn delete_environment(&self, env_id: &str) -> Result<()> {
        self.delete(&format!("/environments/{env_id}")).await
    }

    pub async fn list_variables(&self, env_id: &str) -> Result<Vec<Variable>> {
        let list: Variables = self
            .get(&format!("/environments/{env_id}/variables"))
            .await?;
        Ok(list.variables)
    }

    pub async fn create_variable(
        &self,
        env_id: &str,
        key: &str,
        value: &str,
        path: &str,
    ) -> Result<Variable> {
        self.post(
            &format!("/environments/{env_id}/variables"),
            &json!({ "key": key, "value": value, "path": path }),
        )
        .await
    }

    pub async fn update_variable(
        &self,
        env_id: &str,
        key: &str,
        value: &str,
        path: &str,
    ) -> Result<Variable> {
        self.put(
            &format!("/environments/{env_id}/variables/{key}"),
            &json!({ "value": value, "path": path }),
        )
        .await
    }
}

async fn handle_response<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
    let status = resp.status();
    let body = resp.text().await.context("failed to read response body")?;
    if !status.is_success() {
        bail!("{}", error_message(status, &body));
    }
    let body = if body.is_empty() { "null" } else { body.as_str() };
    serde_json::from_str(body).context("failed to parse response JSON")
}

/// Prefer the server's `message` field over the raw body.
fn error_message(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|json| json.get("message").and_then(Value::as_str).map(ToOwned::to_owned))
        .unwrap_or_else(|| format!("server returned {status}: {body}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_message_is_preferred() {
        let body = r#"{"error":"forbidden","message":"forbidden: requires admin"}"#;
        assert_eq!(
            error_message(StatusCode::FORBIDDEN, body),
            "forbidden: requires admin"
        );
        assert_eq!(
            error_message(StatusCode::BAD_GATEWAY, "upstream down"),
            "server returned 502 Bad Gateway: upstream down"
        );
    }

    #[test]
    fn base_url_gets_api_prefix() {
        let client = ApiClient::new("http://localhost:8080/");
        assert_eq!(client.base_url, "http://localhost:8080/api/v1");
    }
}
