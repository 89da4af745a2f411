//! HTTP client wrapper for the Milvus REST v2 API.

use crate::milvus::types::{Envelope, HasCollectionData, InsertData, MilvusError, SearchRow};
use reqwest::{Client, Method};
use serde_json::{Map, Value, json};
use std::time::Duration;

/// VarChar `max_length` of the text field. Milvus counts UTF-8 bytes, not characters.
pub const TEXT_MAX_LENGTH: usize = 65_535;
/// VarChar `max_length` of the filename field, in bytes.
pub const FILENAME_MAX_LENGTH: usize = 512;
/// VarChar `max_length` of the summary field, in bytes.
pub const SUMMARY_MAX_LENGTH: usize = 1_024;

const VECTOR_FIELD: &str = "embedding";
/// Largest `limit` Milvus accepts for a scalar query.
pub const QUERY_LIMIT_MAX: usize = 16_384;

/// Schema parameters of the document collection.
#[derive(Debug, Clone)]
pub struct CollectionSpec {
    /// Collection name.
    pub name: String,
    /// Vector dimension.
    pub dimension: usize,
    /// IVF cluster count used when building the index.
    pub nlist: u32,
}

/// Lightweight HTTP client for Milvus operations.
pub struct MilvusService {
    pub(crate) client: Client,
    pub(crate) base_url: String,
    pub(crate) token: Option<String>,
    pub(crate) database: Option<String>,
}

impl MilvusService {
    /// Construct a client for the Milvus instance at `url`.
    pub fn new(
        url: &str,
        token: Option<String>,
        database: Option<String>,
        timeout: Duration,
    ) -> Result<Self, MilvusError> {
        let client = Client::builder()
            .user_agent("pbs-rag/0.3")
            .timeout(timeout)
            .build()?;
        let base_url = normalize_base_url(url).map_err(MilvusError::InvalidUrl)?;
        tracing::debug!(
            url = %base_url,
            has_token = token.as_deref().is_some_and(|value| !value.is_empty()),
            database = ?database,
            "Initialized Milvus HTTP client"
        );
        Ok(Self {
            client,
            base_url,
            token,
            database,
        })
    }

    /// Whether the named collection exists.
    pub async fn has_collection(&self, collection: &str) -> Result<bool, MilvusError> {
        let data = self
            .call("collections/has", json!({ "collectionName": collection }))
            .await?;
        let parsed: HasCollectionData = serde_json::from_value(data)
            .map_err(|error| MilvusError::InvalidResponse(error.to_string()))?;
        Ok(parsed.has)
    }

    /// Create the document collection together with its COSINE IVF_FLAT index.
    pub async fn create_collection(&self, spec: &CollectionSpec) -> Result<(), MilvusError> {
        self.call("collections/create", collection_schema(spec)).await?;
        tracing::info!(
            collection = %spec.name,
            dimension = spec.dimension,
            nlist = spec.nlist,
            "Collection created"
        );
        Ok(())
    }

    /// Load the collection into memory so it can serve searches.
    pub async fn load_collection(&self, collection: &str) -> Result<(), MilvusError> {
        self.call("collections/load", json!({ "collectionName": collection })).await?;
        tracing::debug!(collection, "Collection loaded");
        Ok(())
    }

    /// Insert a single row and return the number of rows Milvus acknowledged.
    pub async fn insert(&self, collection: &str, row: Value) -> Result<u64, MilvusError> {
        let data = self
            .call(
                "entities/insert",
                json!({ "collectionName": collection, "data": [row] }),
            )
            .await?;
        let parsed: InsertData = serde_json::from_value(data)
            .map_err(|error| MilvusError::InvalidResponse(error.to_string()))?;
        tracing::debug!(collection, inserted = parsed.insert_count, "Rows inserted");
        Ok(parsed.insert_count)
    }

    /// Seal pending writes so they become durable.
    pub async fn flush(&self, collection: &str) -> Result<(), MilvusError> {
        self.call("collections/flush", json!({ "collectionName": collection })).await?;
        Ok(())
    }

    /// Nearest-neighbour search over the vector field.
    pub async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
        nprobe: u32,
        output_fields: &[&str],
    ) -> Result<Vec<SearchRow>, MilvusError> {
        let body = json!({
            "collectionName": collection,
            "data": [vector],
            "annsField": VECTOR_FIELD,
            "limit": limit,
            "outputFields": output_fields,
            "searchParams": {
                "metricType": "COSINE",
                "params": { "nprobe": nprobe }
            }
        });

        let data = self.call("entities/search", body).await?;
        let rows = into_rows(data)?;
        Ok(rows
            .into_iter()
            .map(|mut fields| {
                let distance = fields
                    .remove("distance")
                    .and_then(|value| value.as_f64())
                    .unwrap_or(f64::MIN) as f32;
                SearchRow { distance, fields }
            })
            .collect())
    }

    /// Scalar query returning `output_fields` of rows matching `filter`.
    pub async fn query(
        &self,
        collection: &str,
        filter: &str,
        output_fields: &[&str],
        limit: usize,
    ) -> Result<Vec<Map<String, Value>>, MilvusError> {
        let body = json!({
            "collectionName": collection,
            "filter": filter,
            "outputFields": output_fields,
            "limit": limit.clamp(1, QUERY_LIMIT_MAX),
        });
        let data = self.call("entities/query", body).await?;
        into_rows(data)
    }

    async fn call(&self, path: &str, mut body: Value) -> Result<Value, MilvusError> {
        if let (Some(database), Some(object)) = (&self.database, body.as_object_mut()) {
            object.insert("dbName".into(), Value::String(database.clone()));
        }

        let response = self
            .request(Method::POST, &format!("v2/vectordb/{path}"))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = MilvusError::UnexpectedStatus { status, body };
            tracing::error!(path, error = %error, "Milvus request failed");
            return Err(error);
        }

        let envelope: Envelope = response.json().await?;
        envelope.into_data().inspect_err(|error| {
            tracing::warn!(path, error = %error, "Milvus rejected request");
        })
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format_endpoint(&self.base_url, path);
        let mut req = self.client.request(method, url);
        if let Some(token) = &self.token
            && !token.is_empty()
        {
            req = req.bearer_auth(token);
        }
        req
    }
}

fn collection_schema(spec: &CollectionSpec) -> Value {
    json!({
        "collectionName": spec.name,
        "description": "Uploaded documents with summaries",
        "schema": {
            "autoId": true,
            "enableDynamicField": false,
            "fields": [
                { "fieldName": "id", "dataType": "Int64", "isPrimary": true },
                {
                    "fieldName": VECTOR_FIELD,
                    "dataType": "FloatVector",
                    "elementTypeParams": { "dim": spec.dimension.to_string() }
                },
                {
                    "fieldName": "text",
                    "dataType": "VarChar",
                    "elementTypeParams": { "max_length": TEXT_MAX_LENGTH }
                },
                {
                    "fieldName": "filename",
                    "dataType": "VarChar",
                    "elementTypeParams": { "max_length": FILENAME_MAX_LENGTH }
                },
                {
                    "fieldName": "summary",
                    "dataType": "VarChar",
                    "elementTypeParams": { "max_length": SUMMARY_MAX_LENGTH }
                }
            ]
        },
        "indexParams": [
            {
                "fieldName": VECTOR_FIELD,
                "indexName": "embedding_ivf",
                "metricType": "COSINE",
                "params": { "index_type": "IVF_FLAT", "nlist": spec.nlist }
            }
        ]
    })
}

fn into_rows(data: Value) -> Result<Vec<Map<String, Value>>, MilvusError> {
    match data {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(map) => Ok(map),
                other => Err(MilvusError::InvalidResponse(format!(
                    "expected row object, got {other}"
                ))),
            })
            .collect(),
        other => Err(MilvusError::InvalidResponse(format!(
            "expected row array, got {other}"
        ))),
    }
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

fn format_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    fn service_for(server: &MockServer) -> MilvusService {
        MilvusService::new(
            &server.base_url(),
            Some("root:Milvus".into()),
            None,
            Duration::from_secs(5),
        )
        .expect("service")
    }

    #[tokio::test]
    async fn create_collection_sends_schema_and_index() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v2/vectordb/collections/create")
                    .header("authorization", "Bearer root:Milvus")
                    .json_body_partial(r#"{ "collectionName": "pbs_docs" }"#)
                    .body_contains(r#""autoId":true"#)
                    .body_contains(r#""dim":"1024""#)
                    .body_contains(r#""metricType":"COSINE""#)
                    .body_contains(r#""index_type":"IVF_FLAT""#)
                    .body_contains(r#""nlist":128"#);
                then.status(200).json_body(json!({ "code": 0, "data": {} }));
            })
            .await;

        service_for(&server)
            .create_collection(&CollectionSpec {
                name: "pbs_docs".into(),
                dimension: 1024,
                nlist: 128,
            })
            .await
            .expect("create");

        mock.assert();
    }

    #[tokio::test]
    async fn search_parses_rows_and_distance() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v2/vectordb/entities/search")
                    .json_body_partial(r#"{ "collectionName": "pbs_docs", "limit": 3 }"#);
                then.status(200).json_body(json!({
                    "code": 0,
                    "data": [
                        {
                            "id": 7,
                            "distance": 0.91,
                            "text": "The sky is blue.",
                            "filename": "a.txt"
                        }
                    ]
                }));
            })
            .await;

        let rows = service_for(&server)
            .search("pbs_docs", &[0.1, 0.2], 3, 16, &["text", "filename"])
            .await
            .expect("search");

        mock.assert();
        assert_eq!(rows.len(), 1);
        assert!((rows[0].distance - 0.91).abs() < 1e-6);
        assert_eq!(rows[0].fields["text"], json!("The sky is blue."));
        assert!(!rows[0].fields.contains_key("distance"));
    }

    #[tokio::test]
    async fn non_zero_code_is_an_api_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v2/vectordb/collections/load");
                then.status(200).json_body(json!({
                    "code": 100,
                    "message": "collection not found[collection=pbs_docs]"
                }));
            })
            .await;

        let error = service_for(&server)
            .load_collection("pbs_docs")
            .await
            .expect_err("api error");

        assert!(matches!(error, MilvusError::Api { code: 100, .. }));
        assert!(!error.is_transport());
    }

    #[tokio::test]
    async fn database_name_is_attached_to_requests() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v2/vectordb/collections/has")
                    .json_body(json!({ "collectionName": "pbs_docs", "dbName": "rag" }));
                then.status(200)
                    .json_body(json!({ "code": 0, "data": { "has": false } }));
            })
            .await;

        let service = MilvusService::new(
            &server.base_url(),
            None,
            Some("rag".into()),
            Duration::from_secs(5),
        )
        .expect("service");
        let exists = service.has_collection("pbs_docs").await.expect("has");

        mock.assert();
        assert!(!exists);
    }

    #[tokio::test]
    async fn hung_server_times_out_as_transport_failure() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v2/vectordb/collections/has");
                then.status(200)
                    .delay(Duration::from_millis(500))
                    .json_body(json!({ "code": 0, "data": { "has": true } }));
            })
            .await;

        let service =
            MilvusService::new(&server.base_url(), None, None, Duration::from_millis(50))
                .expect("service");
        let error = service
            .has_collection("pbs_docs")
            .await
            .expect_err("timeout");

        assert!(matches!(error, MilvusError::Http(ref inner) if inner.is_timeout()));
        assert!(error.is_transport());
    }
}
