use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::Client as S3Client;
use std::time::Duration;

/// A presigned upload grant: the URL the client PUTs to, the path the
/// message will reference, and the signature token.
#[derive(Debug, Clone)]
pub struct SignedUpload {
    pub signed_url: String,
    pub path: String,
    pub token: String,
}

#[derive(Clone)]
pub struct BlobClient {
    client: S3Client,
    bucket: String,
}

impl BlobClient {
    pub async fn new(endpoint: &str, access_key: &str, secret_key: &str, bucket: &str) -> Self {
        let credentials = Credentials::new(access_key, secret_key, None, None, "pulse-blob");

        let config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(endpoint)
            .region(Region::new("us-east-1"))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        let client = S3Client::from_conf(config);

        // Ensure bucket exists; already-exists is fine.
        let _ = client.create_bucket().bucket(bucket).send().await;

        tracing::info!(endpoint = %endpoint, bucket = %bucket, "blob store client initialized");

        Self {
            client,
            bucket: bucket.to_string(),
        }
    }

    /// Presigned PUT the client uploads through. Paths embed a millisecond
    /// timestamp, so a collision indicates a bug rather than an upsert.
    pub async fn create_signed_upload_url(
        &self,
        path: &str,
        ttl_secs: u64,
    ) -> Result<SignedUpload, String> {
        let presign_config = PresigningConfig::builder()
            .expires_in(Duration::from_secs(ttl_secs))
            .build()
            .map_err(|e| format!("presign config error: {e}"))?;

        let presigned = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(path)
            .presigned(presign_config)
            .await
            .map_err(|e| format!("presign error: {e}"))?;

        let signed_url = presigned.uri().to_string();
        let token = signature_token(&signed_url);

        Ok(SignedUpload {
            signed_url,
            path: path.to_string(),
            token,
        })
    }

    /// Presigned GET for reading a blob back.
    pub async fn create_signed_download_url(
        &self,
        path: &str,
        ttl_secs: u64,
    ) -> Result<String, String> {
        let presign_config = PresigningConfig::builder()
            .expires_in(Duration::from_secs(ttl_secs))
            .build()
            .map_err(|e| format!("presign config error: {e}"))?;

        let url = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(path)
            .presigned(presign_config)
            .await
            .map_err(|e| format!("presign error: {e}"))?
            .uri()
            .to_string();

        Ok(url)
    }

    pub async fn remove(&self, paths: &[String]) -> Result<(), String> {
        for path in paths {
            self.client
                .delete_object()
                .bucket(&self.bucket)
                .key(path)
                .send()
                .await
                .map_err(|e| format!("delete failed: {e}"))?;
        }
        Ok(())
    }
}

/// The signature query parameter doubles as the upload token handed back to
/// the client alongside the full URL.
fn signature_token(signed_url: &str) -> String {
    signed_url
        .split('?')
        .nth(1)
        .and_then(|query| {
            query.split('&').find_map(|pair| {
                pair.strip_prefix("X-Amz-Signature=").map(|v| v.to_string())
            })
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_extracted_from_query() {
        let url = "http://localhost:9000/pulse/a.png?X-Amz-Algorithm=AWS4-HMAC-SHA256&X-Amz-Signature=deadbeef&X-Amz-Expires=300";
        assert_eq!(signature_token(url), "deadbeef");
    }

    #[test]
    fn missing_signature_yields_empty_token() {
        assert_eq!(signature_token("http://localhost:9000/pulse/a.png"), "");
    }
}
