use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub blob: BlobConfig,
    pub catalog: CatalogConfig,
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
    pub vector: VectorConfig,
    #[serde(default)]
    pub context: ContextConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BlobConfig {
    pub credentials_access_key_id: String,
    pub credentials_secret_access_key: String,
    pub region: String,
    pub bucket: String,
    #[serde(default = "default_presign_ttl")]
    pub presign_ttl_seconds: u64,
    #[serde(default = "default_blob_timeout")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CatalogConfig {
    pub url: String,
    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,
    #[serde(default = "default_pool_timeout")]
    pub pool_timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default = "default_chat_model")]
    pub model: String,
    #[serde(default = "default_llm_timeout")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,
    #[serde(default = "default_embedding_timeout")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct VectorConfig {
    pub url: String,
    pub token: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default = "default_vector_timeout")]
    pub timeout_seconds: u64,
}

/// Chat-turn assembly and chunking knobs. Defaults match the reference
/// embedder (text-embedding-3-small) and the OpenAI inline-file limits.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ContextConfig {
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,
    #[serde(default = "default_max_inline_bytes")]
    pub max_total_inline_bytes: u64,
    #[serde(default = "default_max_inline_bytes")]
    pub max_single_file_bytes: u64,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_messages: default_max_messages(),
            max_total_inline_bytes: default_max_inline_bytes(),
            max_single_file_bytes: default_max_inline_bytes(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            default_top_k: default_top_k(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_presign_ttl() -> u64 {
    3600
}

fn default_blob_timeout() -> u64 {
    30
}

fn default_pool_max_size() -> u32 {
    10
}

fn default_pool_timeout() -> u64 {
    30
}

fn default_llm_base_url() -> String {
    "https://api.openai.com".to_string()
}

fn default_chat_model() -> String {
    "gpt-4.1-mini".to_string()
}

fn default_llm_timeout() -> u64 {
    60
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_embedding_dimension() -> usize {
    1536
}

fn default_embedding_timeout() -> u64 {
    15
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_vector_timeout() -> u64 {
    30
}

fn default_max_messages() -> usize {
    20
}

fn default_max_inline_bytes() -> u64 {
    50 * 1024 * 1024
}

fn default_chunk_size() -> usize {
    512
}

fn default_chunk_overlap() -> usize {
    100
}

fn default_top_k() -> usize {
    5
}

impl Settings {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config::builder()
            .add_source(File::with_name("config/settings").required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        Ok(settings)
    }
}
