use super::{Backend, DocumentRecord, DocumentRow};
use crate::document::Reviewer;
use crate::error::{DocboardError, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, Method, Request};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Columns requested for every document read, with the reviewer embedded.
pub const DOCUMENT_SELECT: &str =
    "id,header,type,status,target,limit_value,reviewer:reviewers(id,name)";

/// Hosted backend speaking the PostgREST protocol.
pub struct RestBackend {
    client: Client,
    base_url: String,
    api_key: String,
    access_token: Option<String>,
}

impl RestBackend {
    /// `base_url` is the project URL; tables live under `/rest/v1/`.
    pub fn new(base_url: &str, api_key: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(RestBackend {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            access_token: None,
        })
    }

    /// Authenticate requests as a signed-in user instead of the anonymous key.
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.base_url)
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        let bearer = self.access_token.as_deref().unwrap_or(&self.api_key);
        headers.insert("apikey", header_value(&self.api_key)?);
        headers.insert(AUTHORIZATION, header_value(&format!("Bearer {bearer}"))?);
        Ok(headers)
    }

    fn request(&self, method: Method, table: &str) -> Result<reqwest::RequestBuilder> {
        Ok(self
            .client
            .request(method, self.table_url(table))
            .headers(self.headers()?))
    }

    pub(crate) fn select_documents_request(&self) -> Result<Request> {
        Ok(self
            .request(Method::GET, "documents")?
            .query(&[("select", DOCUMENT_SELECT), ("order", "created_at.desc")])
            .build()?)
    }

    pub(crate) fn select_reviewers_request(&self) -> Result<Request> {
        Ok(self
            .request(Method::GET, "reviewers")?
            .query(&[("select", "*")])
            .build()?)
    }

    pub(crate) fn insert_request(&self, record: &DocumentRecord) -> Result<Request> {
        Ok(self
            .request(Method::POST, "documents")?
            .query(&[("select", DOCUMENT_SELECT)])
            .header("Prefer", "return=representation")
            .json(record)
            .build()?)
    }

    pub(crate) fn update_request(&self, id: &str, record: &DocumentRecord) -> Result<Request> {
        let id_filter = format!("eq.{id}");
        Ok(self
            .request(Method::PATCH, "documents")?
            .query(&[("id", id_filter.as_str()), ("select", DOCUMENT_SELECT)])
            .header("Prefer", "return=representation")
            .json(record)
            .build()?)
    }

    pub(crate) fn delete_request(&self, id: &str) -> Result<Request> {
        let id_filter = format!("eq.{id}");
        Ok(self
            .request(Method::DELETE, "documents")?
            .query(&[("id", id_filter.as_str())])
            .header("Prefer", "return=minimal")
            .build()?)
    }

    /// Execute a request, returning the raw body of a successful response.
    async fn execute(
        &self,
        request: Request,
        fail: fn(String) -> DocboardError,
    ) -> Result<String> {
        let method = request.method().clone();
        let url = request.url().path().to_string();
        log::debug!("{method} {url}");

        let response = self
            .client
            .execute(request)
            .await
            .map_err(|e| fail(e.to_string()))?;
        let status = response.status();
        let body = response.text().await.map_err(|e| fail(e.to_string()))?;

        if !status.is_success() {
            log::warn!("{method} {url} failed with {status}");
            return Err(fail(error_message(&body, status.as_str())));
        }
        Ok(body)
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        request: Request,
        fail: fn(String) -> DocboardError,
    ) -> Result<T> {
        let body = self.execute(request, fail).await?;
        decode_body(&body).map_err(|e| fail(e.to_string()))
    }
}

#[async_trait]
impl Backend for RestBackend {
    async fn select_documents(&self) -> Result<Vec<DocumentRow>> {
        let request = self.select_documents_request()?;
        self.fetch(request, DocboardError::Query).await
    }

    async fn select_reviewers(&self) -> Result<Vec<Reviewer>> {
        let request = self.select_reviewers_request()?;
        self.fetch(request, DocboardError::Query).await
    }

    async fn insert_document(&self, record: &DocumentRecord) -> Result<Vec<DocumentRow>> {
        let request = self.insert_request(record)?;
        self.fetch(request, DocboardError::Mutation).await
    }

    async fn update_document(
        &self,
        id: &str,
        record: &DocumentRecord,
    ) -> Result<Vec<DocumentRow>> {
        let request = self.update_request(id, record)?;
        self.fetch(request, DocboardError::Mutation).await
    }

    async fn delete_document(&self, id: &str) -> Result<()> {
        let request = self.delete_request(id)?;
        self.execute(request, DocboardError::Mutation).await?;
        Ok(())
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| DocboardError::Config(format!("invalid header value: {e}")))
}

/// Decode a successful response body.
pub(crate) fn decode_body<T: DeserializeOwned>(body: &str) -> Result<T> {
    Ok(serde_json::from_str(body)?)
}

/// Pull the human-readable message out of a PostgREST error body.
/// Falls back to the raw body, then to the status code.
pub(crate) fn error_message(body: &str, status: &str) -> String {
    let from_json = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string));

    match from_json {
        Some(message) => message,
        None if !body.trim().is_empty() => body.trim().to_string(),
        None => format!("request failed with status {status}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::tests::document;
    use pretty_assertions::assert_eq;

    fn backend() -> RestBackend {
        RestBackend::new("https://project.example.co/", "anon-key").unwrap()
    }

    fn body_json(request: &Request) -> serde_json::Value {
        let bytes = request.body().and_then(|b| b.as_bytes()).unwrap();
        serde_json::from_slice(bytes).unwrap()
    }

    #[test]
    fn test_select_documents_url() {
        let request = backend().select_documents_request().unwrap();
        let url = request.url();
        assert_eq!(url.path(), "/rest/v1/documents");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("select".to_string(), DOCUMENT_SELECT.to_string()),
                ("order".to_string(), "created_at.desc".to_string()),
            ]
        );
        assert_eq!(request.headers()["apikey"], "anon-key");
        assert_eq!(request.headers()[AUTHORIZATION], "Bearer anon-key");
    }

    #[test]
    fn test_access_token_used_for_bearer() {
        let request = backend()
            .with_access_token("jwt-123")
            .select_reviewers_request()
            .unwrap();
        assert_eq!(request.headers()[AUTHORIZATION], "Bearer jwt-123");
        assert_eq!(request.url().path(), "/rest/v1/reviewers");
    }

    #[test]
    fn test_update_sends_null_reviewer_and_id_filter() {
        let doc = document("doc-7", |d| d.reviewer = None);
        let record = DocumentRecord::from_document(&doc);
        let request = backend().update_request(&doc.id, &record).unwrap();

        assert_eq!(request.method(), Method::PATCH);
        assert!(request.url().query_pairs().any(|(k, v)| k == "id" && v == "eq.doc-7"));
        assert_eq!(request.headers()["Prefer"], "return=representation");

        let body = body_json(&request);
        assert_eq!(body["reviewer_id"], serde_json::Value::Null);
        assert!(body.get("user_id").is_none());
    }

    #[test]
    fn test_insert_carries_user_id() {
        let doc = document("", |_| {});
        let record = DocumentRecord::from_document(&doc).with_user("user-1");
        let request = backend().insert_request(&record).unwrap();
        assert_eq!(request.method(), Method::POST);
        assert_eq!(body_json(&request)["user_id"], "user-1");
    }

    #[test]
    fn test_delete_request() {
        let request = backend().delete_request("x").unwrap();
        assert_eq!(request.method(), Method::DELETE);
        assert_eq!(request.url().query(), Some("id=eq.x"));
    }

    #[test]
    fn test_error_message_extraction() {
        let body = r#"{"code":"23503","details":null,"hint":null,"message":"insert or update violates foreign key constraint"}"#;
        assert_eq!(
            error_message(body, "409"),
            "insert or update violates foreign key constraint"
        );
        assert_eq!(error_message("upstream timeout\n", "504"), "upstream timeout");
        assert_eq!(error_message("", "500"), "request failed with status 500");
    }

    #[test]
    fn test_malformed_body_is_json_error() {
        let err = decode_body::<Vec<DocumentRow>>("{not json").unwrap_err();
        assert!(matches!(err, DocboardError::Json(_)));

        let rows: Vec<DocumentRow> = decode_body("[]").unwrap();
        assert!(rows.is_empty());
    }
}
