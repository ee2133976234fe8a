//! Bucket listing against the storage provider.
//!
//! Only a single page is ever requested; buckets larger than the page size
//! are silently truncated.

use crate::config::ResolverConfig;
use crate::error::StorageError;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

/// File extensions treated as playable audio.
pub const AUDIO_EXTENSIONS: [&str; 5] = [".mp3", ".wav", ".flac", ".m4a", ".ogg"];

/// Lists object names in a bucket.
#[async_trait]
pub trait BucketLister: Send + Sync {
    /// Up to `limit` object names at the bucket root.
    async fn list(&self, bucket: &str, limit: usize) -> Result<Vec<String>, StorageError>;
}

/// Keep only names with an audio extension.
pub fn audio_files(names: Vec<String>) -> Vec<String> {
    names
        .into_iter()
        .filter(|name| {
            let lower = name.to_lowercase();
            AUDIO_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct ListedObject {
    name: Option<String>,
}

/// Storage REST listing (`POST /storage/v1/object/list/{bucket}`).
#[derive(Debug, Clone)]
pub struct HttpBucketLister {
    client: reqwest::Client,
    storage_url: String,
    api_key: Option<String>,
}

impl HttpBucketLister {
    pub fn new(client: reqwest::Client, config: &ResolverConfig) -> Self {
        Self {
            client,
            storage_url: config.storage_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        }
    }
}

#[async_trait]
impl BucketLister for HttpBucketLister {
    async fn list(&self, bucket: &str, limit: usize) -> Result<Vec<String>, StorageError> {
        let url = format!("{}/storage/v1/object/list/{}", self.storage_url, bucket);
        let body = json!({
            "prefix": "",
            "limit": limit,
            "offset": 0,
            "sortBy": { "column": "name", "order": "asc" },
        });

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.header("apikey", key).bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(StorageError::Status {
                bucket: bucket.to_string(),
                status: status.as_u16(),
            });
        }

        let objects: Vec<ListedObject> = response.json().await?;
        let names: Vec<String> = objects.into_iter().filter_map(|o| o.name).collect();
        log::debug!("Listed {} objects in bucket '{}'", names.len(), bucket);
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_files_filters_by_extension() {
        let names = vec![
            "ocean-waves.mp3".to_string(),
            "cover.jpg".to_string(),
            "Thunder.FLAC".to_string(),
            "notes.txt".to_string(),
            "rain.ogg".to_string(),
            ".emptyFolderPlaceholder".to_string(),
        ];

        assert_eq!(
            audio_files(names),
            vec!["ocean-waves.mp3", "Thunder.FLAC", "rain.ogg"]
        );
    }

    #[test]
    fn test_listed_object_without_name_is_skipped() {
        let raw = r#"[{"name":"a.mp3","id":"1"},{"id":"2"},{"name":"b.mp3"}]"#;
        let objects: Vec<ListedObject> = serde_json::from_str(raw).expect("valid listing");
        let names: Vec<String> = objects.into_iter().filter_map(|o| o.name).collect();
        assert_eq!(names, vec!["a.mp3", "b.mp3"]);
    }

    #[tokio::test]
    async fn test_unreachable_listing_is_error() {
        let config = ResolverConfig {
            storage_url: "http://127.0.0.1:9".to_string(),
            ..ResolverConfig::default()
        };
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(500))
            .build()
            .expect("client builds");
        let lister = HttpBucketLister::new(client, &config);
        assert!(lister.list("neuralpositivemusic", 10).await.is_err());
    }
}
