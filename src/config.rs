use std::env;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
    /// Configuration was installed more than once.
    #[error("Configuration already initialized")]
    AlreadyInitialized,
}

/// Runtime configuration for the document backend.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the Ollama runtime serving embeddings and generations.
    pub ollama_url: String,
    /// Model used for embeddings.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors; fixes the collection schema.
    pub embedding_dimension: usize,
    /// Model used for summaries and chat answers.
    pub llm_model: String,
    /// Per-call timeout for embedding requests.
    pub embedding_timeout: Duration,
    /// Per-call timeout for upload summaries.
    pub summary_timeout: Duration,
    /// Per-call timeout for chat answers.
    pub generation_timeout: Duration,
    /// Vector index backend.
    pub vector_backend: VectorBackend,
    /// Base URL of the Milvus REST endpoint.
    pub milvus_url: String,
    /// Optional bearer token (`user:password` or API key) for Milvus.
    pub milvus_token: Option<String>,
    /// Optional Milvus database name.
    pub milvus_database: Option<String>,
    /// Per-request timeout for Milvus calls.
    pub milvus_timeout: Duration,
    /// Name of the collection holding document embeddings.
    pub collection_name: String,
    /// Number of IVF clusters built for the similarity index.
    pub index_nlist: u32,
    /// Number of IVF clusters probed per search.
    pub search_nprobe: u32,
    /// Settling delay before the first index connection attempt.
    pub index_startup_delay: Duration,
    /// Object storage backend.
    pub object_store_backend: ObjectStoreBackend,
    /// Bucket that receives uploaded documents.
    pub s3_bucket: String,
    /// AWS region of the bucket.
    pub aws_region: String,
    /// Optional endpoint override for S3-compatible stores.
    pub s3_endpoint_url: Option<String>,
    /// Lifetime of presigned download links.
    pub presign_ttl: Duration,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
    /// Origins allowed by CORS; empty means any origin.
    pub cors_allowed_origins: Vec<String>,
    /// Largest accepted upload body in bytes.
    pub max_upload_bytes: usize,
}

/// Supported vector index backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VectorBackend {
    /// Milvus over its REST API.
    Milvus,
    /// Process-local brute-force index, for development and tests.
    Memory,
}

/// Supported object storage backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObjectStoreBackend {
    /// Amazon S3 or an S3-compatible store.
    S3,
    /// Process-local map, for development and tests.
    Memory,
}

impl FromStr for VectorBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "milvus" => Ok(Self::Milvus),
            "memory" => Ok(Self::Memory),
            _ => Err(()),
        }
    }
}

impl FromStr for ObjectStoreBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "s3" => Ok(Self::S3),
            "memory" => Ok(Self::Memory),
            _ => Err(()),
        }
    }
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(lookup);
        Ok(Self {
            ollama_url: vars.string_or("OLLAMA_URL", "http://127.0.0.1:11434"),
            embedding_model: vars.string_or("EMBEDDING_MODEL", "mxbai-embed-large"),
            embedding_dimension: vars.parse_or("EMBEDDING_DIMENSION", 1024)?,
            llm_model: vars.string_or("LLM_MODEL", "solar:10.7b"),
            embedding_timeout: Duration::from_secs(vars.parse_or("EMBEDDING_TIMEOUT_SECS", 20)?),
            summary_timeout: Duration::from_secs(vars.parse_or("SUMMARY_TIMEOUT_SECS", 30)?),
            generation_timeout: Duration::from_secs(
                vars.parse_or("GENERATION_TIMEOUT_SECS", 60)?,
            ),
            vector_backend: vars.variant_or("VECTOR_BACKEND", VectorBackend::Milvus)?,
            milvus_url: vars.string_or("MILVUS_URL", "http://milvus-standalone:19530"),
            milvus_token: vars.optional("MILVUS_TOKEN"),
            milvus_database: vars.optional("MILVUS_DATABASE"),
            milvus_timeout: Duration::from_secs(vars.parse_or("MILVUS_TIMEOUT_SECS", 10)?),
            collection_name: vars.string_or("MILVUS_COLLECTION", "pbs_docs"),
            index_nlist: vars.parse_or("INDEX_NLIST", 128)?,
            search_nprobe: vars.parse_or("SEARCH_NPROBE", 16)?,
            index_startup_delay: Duration::from_secs(
                vars.parse_or("INDEX_STARTUP_DELAY_SECS", 5)?,
            ),
            object_store_backend: vars
                .variant_or("OBJECT_STORE_BACKEND", ObjectStoreBackend::S3)?,
            s3_bucket: vars.string_or("S3_BUCKET_NAME", "pbs-project-ai-data-dev-v1"),
            aws_region: vars.string_or("AWS_REGION", "ap-northeast-2"),
            s3_endpoint_url: vars.optional("S3_ENDPOINT_URL"),
            presign_ttl: Duration::from_secs(vars.parse_or("PRESIGN_TTL_SECS", 3600)?),
            server_port: vars.parse_optional("SERVER_PORT")?,
            cors_allowed_origins: vars
                .optional("CORS_ALLOWED_ORIGINS")
                .map(|value| {
                    value
                        .split(',')
                        .map(str::trim)
                        .filter(|origin| !origin.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            max_upload_bytes: vars.parse_or("MAX_UPLOAD_BYTES", 50 * 1024 * 1024)?,
        }
        .validated()?)
    }

    fn validated(self) -> Result<Self, ConfigError> {
        if self.embedding_dimension == 0 {
            return Err(ConfigError::InvalidValue("EMBEDDING_DIMENSION".into()));
        }
        if self.index_nlist == 0 {
            return Err(ConfigError::InvalidValue("INDEX_NLIST".into()));
        }
        if self.s3_bucket.trim().is_empty() && self.object_store_backend == ObjectStoreBackend::S3
        {
            return Err(ConfigError::MissingVariable("S3_BUCKET_NAME".into()));
        }
        Ok(self)
    }
}

struct Vars<F>(F);

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn string_or(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    fn parse_optional<T: FromStr>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        self.optional(key)
            .map(|value| {
                value
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue(key.to_string()))
            })
            .transpose()
    }

    fn parse_or<T: FromStr>(&self, key: &str, default: T) -> Result<T, ConfigError> {
        Ok(self.parse_optional(key)?.unwrap_or(default))
    }

    fn variant_or<T: FromStr<Err = ()>>(&self, key: &str, default: T) -> Result<T, ConfigError> {
        self.parse_or(key, default)
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load `.env` and the environment, then install the result in the global cache.
pub fn init_config() -> Result<&'static Config, ConfigError> {
    dotenvy::dotenv().ok();
    install(Config::from_env()?)
}

fn install(config: Config) -> Result<&'static Config, ConfigError> {
    tracing::debug!(
        ollama_url = %config.ollama_url,
        vector_backend = ?config.vector_backend,
        milvus_url = %config.milvus_url,
        collection = %config.collection_name,
        object_store = ?config.object_store_backend,
        bucket = %config.s3_bucket,
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    CONFIG.set(config).map_err(|_| ConfigError::AlreadyInitialized)?;
    Ok(get_config())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_environment_is_empty() {
        let config = Config::from_lookup(lookup(&[])).expect("config");
        assert_eq!(config.embedding_dimension, 1024);
        assert_eq!(config.collection_name, "pbs_docs");
        assert_eq!(config.vector_backend, VectorBackend::Milvus);
        assert_eq!(config.object_store_backend, ObjectStoreBackend::S3);
        assert_eq!(config.generation_timeout, Duration::from_secs(60));
        assert_eq!(config.presign_ttl, Duration::from_secs(3600));
        assert!(config.cors_allowed_origins.is_empty());
        assert!(config.server_port.is_none());
        assert_eq!(config.milvus_timeout, Duration::from_secs(10));
    }

    #[test]
    fn overrides_are_parsed() {
        let config = Config::from_lookup(lookup(&[
            ("VECTOR_BACKEND", "Memory"),
            ("OBJECT_STORE_BACKEND", "memory"),
            ("EMBEDDING_DIMENSION", "768"),
            ("SERVER_PORT", "9000"),
            ("MILVUS_TOKEN", "  "),
            ("CORS_ALLOWED_ORIGINS", "http://a.test, ,http://b.test"),
        ]))
        .expect("config");
        assert_eq!(config.vector_backend, VectorBackend::Memory);
        assert_eq!(config.object_store_backend, ObjectStoreBackend::Memory);
        assert_eq!(config.embedding_dimension, 768);
        assert_eq!(config.server_port, Some(9000));
        assert!(config.milvus_token.is_none());
        assert_eq!(
            config.cors_allowed_origins,
            vec!["http://a.test".to_string(), "http://b.test".to_string()]
        );
    }

    #[test]
    fn invalid_values_are_rejected() {
        let error = Config::from_lookup(lookup(&[("SERVER_PORT", "not-a-port")]))
            .expect_err("invalid port");
        assert!(matches!(error, ConfigError::InvalidValue(key) if key == "SERVER_PORT"));

        let error = Config::from_lookup(lookup(&[("VECTOR_BACKEND", "pinecone")]))
            .expect_err("unknown backend");
        assert!(matches!(error, ConfigError::InvalidValue(key) if key == "VECTOR_BACKEND"));

        let error = Config::from_lookup(lookup(&[("EMBEDDING_DIMENSION", "0")]))
            .expect_err("zero dimension");
        assert!(matches!(error, ConfigError::InvalidValue(_)));
    }

    #[test]
    fn configuration_installs_once() {
        let first = Config::from_lookup(lookup(&[("EMBEDDING_DIMENSION", "768")])).expect("config");
        let installed = install(first).expect("first install");
        assert_eq!(installed.embedding_dimension, 768);

        let second = Config::from_lookup(lookup(&[])).expect("config");
        let error = install(second).expect_err("second install");
        assert!(matches!(error, ConfigError::AlreadyInitialized));
        assert_eq!(get_config().embedding_dimension, 768);
    }
}
