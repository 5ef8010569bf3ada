use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};

use crate::config::{Credentials, Endpoints};
use crate::error::{Error, Result, UploadPhase};
use crate::media::{DownloadedImage, MAX_MEDIA_SIZE};
use crate::oauth::Signer;

pub struct XClient {
    signer: Signer,
    http: Client,
    media_upload_url: String,
    tweets_url: String,
}

#[derive(Serialize)]
struct TweetBody<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    media: Option<TweetMedia<'a>>,
}

#[derive(Serialize)]
struct TweetMedia<'a> {
    media_ids: [&'a str; 1],
}

#[derive(Deserialize)]
struct MediaResponse {
    media_id_string: String,
}

/// Status and decoded body of a create-post request.
#[derive(Debug)]
pub struct PostResponse {
    pub status: StatusCode,
    pub body: serde_json::Value,
}

impl PostResponse {
    pub fn is_success(&self) -> bool {
        self.status == StatusCode::CREATED
    }

    pub fn tweet_id(&self) -> Option<&str> {
        self.body.pointer("/data/id").and_then(|v| v.as_str())
    }
}

impl XClient {
    pub fn new(credentials: Credentials, endpoints: &Endpoints, http: Client) -> Self {
        Self {
            signer: Signer::new(credentials),
            http,
            media_upload_url: endpoints.media_upload.clone(),
            tweets_url: endpoints.tweets.clone(),
        }
    }

    /// Upload one image with INIT, a single APPEND, and FINALIZE, returning the
    /// media id. Any unexpected status ends the upload; nothing is rolled back.
    pub async fn upload_media(&self, image: &DownloadedImage) -> Result<String> {
        if image.size > MAX_MEDIA_SIZE {
            return Err(Error::MediaTooLarge {
                size: image.size,
                max: MAX_MEDIA_SIZE,
            });
        }

        tracing::info!("Uploading image to X: {}", image.path().display());
        let media_id = self.upload_init(image).await?;
        tracing::info!("INIT succeeded, media id {media_id}");

        self.upload_append(&media_id, image).await?;
        tracing::info!("APPEND succeeded");

        self.upload_finalize(&media_id).await?;
        tracing::info!("Image upload complete: {media_id}");
        Ok(media_id)
    }

    async fn upload_init(&self, image: &DownloadedImage) -> Result<String> {
        let total_bytes = image.size.to_string();
        let params = [
            ("command", "INIT"),
            ("media_type", image.mime),
            ("total_bytes", total_bytes.as_str()),
        ];

        let resp = self.post_form(&params).await?;
        let resp = self.expect_status(resp, StatusCode::OK, UploadPhase::Init).await?;
        let media: MediaResponse = serde_json::from_str(&resp.text().await?)?;
        Ok(media.media_id_string)
    }

    async fn upload_append(&self, media_id: &str, image: &DownloadedImage) -> Result<()> {
        let file_bytes = tokio::fs::read(image.path()).await?;

        let part = reqwest::multipart::Part::bytes(file_bytes)
            .file_name(image.file_name())
            .mime_str(image.mime)?;
        let form = reqwest::multipart::Form::new()
            .text("command", "APPEND")
            .text("media_id", media_id.to_string())
            .text("segment_index", "0")
            .part("media", part);

        // The file part is not form-urlencodable, so only the text fields are signed.
        let signed = [
            ("command", "APPEND"),
            ("media_id", media_id),
            ("segment_index", "0"),
        ];
        let auth = self
            .signer
            .authorization_header("POST", &self.media_upload_url, &signed);
        let resp = self
            .http
            .post(&self.media_upload_url)
            .header("Authorization", auth)
            .multipart(form)
            .send()
            .await?;

        self.expect_status(resp, StatusCode::NO_CONTENT, UploadPhase::Append)
            .await?;
        Ok(())
    }

    async fn upload_finalize(&self, media_id: &str) -> Result<()> {
        let params = [("command", "FINALIZE"), ("media_id", media_id)];
        let resp = self.post_form(&params).await?;
        self.expect_status(resp, StatusCode::OK, UploadPhase::Finalize)
            .await?;
        Ok(())
    }

    /// Create a post. The JSON body is not part of the signature. Any HTTP
    /// response is returned as-is; only transport failures are errors.
    pub async fn post_tweet(&self, text: &str, media_id: Option<&str>) -> Result<PostResponse> {
        let body = TweetBody {
            text,
            media: media_id.map(|id| TweetMedia { media_ids: [id] }),
        };

        let auth = self
            .signer
            .authorization_header("POST", &self.tweets_url, &[]);
        let resp = self
            .http
            .post(&self.tweets_url)
            .header("Authorization", auth)
            .json(&body)
            .send()
            .await?;

        self.check_auth_error(&resp);
        self.check_rate_limit(&resp);
        let status = resp.status();
        let raw = resp.text().await?;
        let body = serde_json::from_str(&raw).unwrap_or(serde_json::Value::String(raw));

        Ok(PostResponse { status, body })
    }

    async fn post_form(&self, params: &[(&str, &str)]) -> Result<Response> {
        let auth = self
            .signer
            .authorization_header("POST", &self.media_upload_url, params);
        let resp = self
            .http
            .post(&self.media_upload_url)
            .header("Authorization", auth)
            .form(params)
            .send()
            .await?;
        Ok(resp)
    }

    async fn expect_status(
        &self,
        resp: Response,
        expected: StatusCode,
        phase: UploadPhase,
    ) -> Result<Response> {
        self.check_auth_error(&resp);
        self.check_rate_limit(&resp);
        let status = resp.status();
        if status != expected {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Upload { phase, status, body });
        }
        Ok(resp)
    }

    fn check_rate_limit(&self, resp: &Response) {
        if resp.status() == StatusCode::TOO_MANY_REQUESTS {
            match resp
                .headers()
                .get("x-rate-limit-reset")
                .and_then(|v| v.to_str().ok())
            {
                Some(reset) => {
                    tracing::warn!("Rate limited by X API; limit resets at timestamp {reset}")
                }
                None => tracing::warn!("Rate limited by X API"),
            }
        }
    }

    fn check_auth_error(&self, resp: &Response) {
        if resp.status() == StatusCode::UNAUTHORIZED {
            tracing::error!(
                "Received 401 Unauthorized from X API. \
                 Your OAuth credentials may be revoked or invalid. \
                 Regenerate them at https://developer.x.com/"
            );
        }
    }
}
