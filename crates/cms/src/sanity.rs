//! Sanity HTTP API client.

use async_trait::async_trait;
use pipeline::{CmsClient, CmsConnection, CmsError, DocumentId};
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, instrument, warn};

/// One entry of a `data/mutate` request body.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Mutation {
    Create(Value),
    CreateOrReplace(Value),
    Patch { id: String, set: Map<String, Value> },
    Delete { id: String },
}

#[derive(Debug, Serialize)]
struct MutateRequest<'a> {
    mutations: &'a [Mutation],
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    result: Value,
}

#[derive(Debug, Deserialize)]
struct MutateResponse {
    #[serde(default)]
    results: Vec<MutationResult>,
}

#[derive(Debug, Deserialize)]
struct MutationResult {
    #[serde(default)]
    document: Option<Value>,
}

pub struct SanityClient {
    client: Client,
    base_url: String,
    dataset: String,
    token: String,
}

impl SanityClient {
    pub fn new(connection: &CmsConnection) -> Self {
        let version = connection.api_version.trim_start_matches('v');
        Self {
            client: Client::new(),
            base_url: format!("https://{}.api.sanity.io/v{version}", connection.project_id),
            dataset: connection.dataset.clone(),
            token: connection.token.clone(),
        }
    }

    /// Overrides the API host (e.g. the CDN host or a local proxy).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn query_url(&self) -> String {
        format!("{}/data/query/{}", self.base_url, self.dataset)
    }

    pub fn mutate_url(&self) -> String {
        format!("{}/data/mutate/{}", self.base_url, self.dataset)
    }

    /// Sends mutations in one transaction and returns the stored documents.
    #[instrument(skip_all, fields(count = mutations.len()))]
    pub async fn mutate(&self, mutations: &[Mutation]) -> Result<Vec<Value>, CmsError> {
        let request = self
            .client
            .post(self.mutate_url())
            .query(&[("returnDocuments", "true")])
            .json(&MutateRequest { mutations });
        let body = self.send(request).await?;
        parse_mutate_response(&body)
    }

    async fn mutate_one(&self, mutation: Mutation) -> Result<Value, CmsError> {
        let mut documents = self.mutate(std::slice::from_ref(&mutation)).await?;
        Ok(if documents.is_empty() {
            Value::Null
        } else {
            documents.swap_remove(0)
        })
    }

    async fn send(&self, request: RequestBuilder) -> Result<String, CmsError> {
        let response = request
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| CmsError::Transport(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CmsError::Transport(e.to_string()))?;

        if !status.is_success() {
            let message = error_message(&body);
            warn!(status = status.as_u16(), %message, "CMS request rejected");
            return Err(CmsError::Status {
                status: status.as_u16(),
                message,
            });
        }
        Ok(body)
    }
}

impl std::fmt::Debug for SanityClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SanityClient")
            .field("base_url", &self.base_url)
            .field("dataset", &self.dataset)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

#[async_trait]
impl CmsClient for SanityClient {
    #[instrument(skip(self, params))]
    async fn fetch(&self, query: &str, params: Value) -> Result<Value, CmsError> {
        let pairs = query_pairs(query, &params)?;
        let body = self
            .send(self.client.get(self.query_url()).query(&pairs))
            .await?;
        let parsed: QueryResponse =
            serde_json::from_str(&body).map_err(|e| CmsError::InvalidResponse(e.to_string()))?;
        debug!("CMS query answered");
        Ok(parsed.result)
    }

    async fn create(&self, document: Value) -> Result<Value, CmsError> {
        check_document(&document)?;
        self.mutate_one(Mutation::Create(document)).await
    }

    async fn create_or_replace(&self, document: Value) -> Result<Value, CmsError> {
        check_document(&document)?;
        if document.get("_id").and_then(Value::as_str).is_none() {
            return Err(CmsError::InvalidDocument);
        }
        self.mutate_one(Mutation::CreateOrReplace(document)).await
    }

    async fn patch(&self, id: &DocumentId, fields: Map<String, Value>) -> Result<Value, CmsError> {
        self.mutate_one(Mutation::Patch {
            id: id.as_str().to_string(),
            set: fields,
        })
        .await
    }

    async fn delete(&self, id: &DocumentId) -> Result<(), CmsError> {
        self.mutate_one(Mutation::Delete {
            id: id.as_str().to_string(),
        })
        .await
        .map(|_| ())
    }
}

fn check_document(document: &Value) -> Result<(), CmsError> {
    match document.get("_type").and_then(Value::as_str) {
        Some(kind) if !kind.is_empty() => Ok(()),
        _ => Err(CmsError::InvalidDocument),
    }
}

/// URL query pairs: the GROQ text plus one `$name=<json>` pair per parameter.
fn query_pairs(query: &str, params: &Value) -> Result<Vec<(String, String)>, CmsError> {
    let mut pairs = vec![("query".to_string(), query.to_string())];
    match params {
        Value::Null => {}
        Value::Object(map) => {
            for (name, value) in map {
                let encoded = serde_json::to_string(value)
                    .map_err(|e| CmsError::InvalidResponse(e.to_string()))?;
                pairs.push((format!("${name}"), encoded));
            }
        }
        other => {
            return Err(CmsError::InvalidResponse(format!(
                "query parameters must be an object, got {other}"
            )))
        }
    }
    Ok(pairs)
}

fn parse_mutate_response(body: &str) -> Result<Vec<Value>, CmsError> {
    let parsed: MutateResponse =
        serde_json::from_str(body).map_err(|e| CmsError::InvalidResponse(e.to_string()))?;
    Ok(parsed
        .results
        .into_iter()
        .filter_map(|r| r.document)
        .collect())
}

fn error_message(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return body.to_string();
    };
    value
        .pointer("/error/description")
        .or_else(|| value.pointer("/error/message"))
        .or_else(|| value.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn connection() -> CmsConnection {
        CmsConnection {
            project_id: "abc123".to_string(),
            dataset: "production".to_string(),
            api_version: "2024-01-01".to_string(),
            token: "sk-secret".to_string(),
        }
    }

    #[test]
    fn urls_follow_project_version_and_dataset() {
        let client = SanityClient::new(&connection());
        assert_eq!(
            client.query_url(),
            "https://abc123.api.sanity.io/v2024-01-01/data/query/production"
        );
        assert_eq!(
            client.mutate_url(),
            "https://abc123.api.sanity.io/v2024-01-01/data/mutate/production"
        );
        assert!(!format!("{client:?}").contains("sk-secret"));
    }

    #[test]
    fn leading_v_in_api_version_is_not_doubled() {
        let mut conn = connection();
        conn.api_version = "v2023-05-03".to_string();
        let client = SanityClient::new(&conn);
        assert!(client.query_url().contains("/v2023-05-03/"));
    }

    #[test]
    fn params_are_json_encoded_with_dollar_prefix() {
        let pairs = query_pairs(
            "*[_id == $id][0]",
            &json!({ "id": "page-home", "limit": 3 }),
        )
        .unwrap();
        assert_eq!(pairs[0], ("query".to_string(), "*[_id == $id][0]".to_string()));
        assert!(pairs.contains(&("$id".to_string(), "\"page-home\"".to_string())));
        assert!(pairs.contains(&("$limit".to_string(), "3".to_string())));

        assert_eq!(query_pairs("count(*)", &Value::Null).unwrap().len(), 1);
        assert!(query_pairs("x", &json!([1])).is_err());
    }

    #[test]
    fn mutations_serialise_in_wire_shape() {
        let mut set = Map::new();
        set.insert("title".to_string(), json!("Home"));
        let body = serde_json::to_value(MutateRequest {
            mutations: &[
                Mutation::Create(json!({ "_type": "page" })),
                Mutation::CreateOrReplace(json!({ "_id": "header", "_type": "header" })),
                Mutation::Patch {
                    id: "page-home".to_string(),
                    set,
                },
                Mutation::Delete {
                    id: "old".to_string(),
                },
            ],
        })
        .unwrap();

        assert_eq!(
            body,
            json!({ "mutations": [
                { "create": { "_type": "page" } },
                { "createOrReplace": { "_id": "header", "_type": "header" } },
                { "patch": { "id": "page-home", "set": { "title": "Home" } } },
                { "delete": { "id": "old" } }
            ]})
        );
    }

    #[test]
    fn mutate_response_yields_returned_documents() {
        let body = r#"{
            "transactionId": "tx1",
            "results": [
                {"id": "a", "operation": "create", "document": {"_id": "a", "_type": "page"}},
                {"id": "b", "operation": "delete"}
            ]
        }"#;
        let docs = parse_mutate_response(body).unwrap();
        assert_eq!(docs, vec![json!({"_id": "a", "_type": "page"})]);
        assert!(parse_mutate_response("nope").is_err());
    }

    #[test]
    fn error_messages_prefer_description() {
        assert_eq!(
            error_message(r#"{"error":{"description":"Document not found","type":"x"}}"#),
            "Document not found"
        );
        assert_eq!(error_message(r#"{"message":"Unauthorized"}"#), "Unauthorized");
        assert_eq!(error_message("gateway timeout"), "gateway timeout");
    }

    #[test]
    fn documents_need_a_type() {
        assert!(check_document(&json!({ "_type": "page" })).is_ok());
        assert!(matches!(
            check_document(&json!({ "title": "x" })),
            Err(CmsError::InvalidDocument)
        ));
    }
}
