//! One posting run: pick a record, render it, attach its first image, post.

use reqwest::Client;

use crate::api::XClient;
use crate::config::Config;
use crate::content;
use crate::error::{Error, Result};
use crate::media::{self, DownloadedImage};
use crate::notion::{self, NotionClient};

/// What a successful run posted.
#[derive(Debug)]
pub struct PostOutcome {
    pub tweet_id: Option<String>,
    pub text: String,
    pub media_id: Option<String>,
}

pub async fn run(config: &Config) -> Result<PostOutcome> {
    let http = Client::builder().build()?;
    let endpoints = &config.settings.endpoints;

    let notion = NotionClient::new(http.clone(), &config.notion, endpoints);
    tracing::info!("Fetching all records from database {}", config.notion.database_id);
    let page = notion::fetch_random_record(&notion)
        .await?
        .ok_or(Error::NoRecords)?;
    tracing::info!("Selected record {}", page.id);

    let extracted = content::extract(&page, &config.settings.fields);
    println!("{}", content::describe(&extracted));

    let text = content::format_post(&extracted);
    if text.is_empty() {
        return Err(Error::EmptyPost);
    }
    println!("{}", content::preview(&text));

    let x = XClient::new(config.credentials.clone(), endpoints, http.clone());

    // Only the first image is attached.
    let image = match extracted.image_urls.first() {
        Some(url) => fetch_image(&http, url, config).await?,
        None => None,
    };

    let media_id = match &image {
        Some(image) => Some(x.upload_media(image).await?),
        None => None,
    };

    tracing::info!("Posting to X");
    let resp = x.post_tweet(&text, media_id.as_deref()).await?;
    if !resp.is_success() {
        return Err(Error::Publish {
            status: resp.status,
            body: resp.body.to_string(),
        });
    }

    let tweet_id = resp.tweet_id().map(str::to_string);
    tracing::info!("Posted successfully (id {})", tweet_id.as_deref().unwrap_or("unknown"));

    if let Some(image) = image {
        let path = image.path().to_path_buf();
        match image.remove() {
            Ok(()) => tracing::info!("Removed temporary file {}", path.display()),
            Err(e) => tracing::warn!("Failed to remove temporary file {}: {e}", path.display()),
        }
    }

    Ok(PostOutcome {
        tweet_id,
        text,
        media_id,
    })
}

/// A failed download is not fatal; the post goes out without media. Typed
/// errors from the download (an image too large to upload) still end the run.
async fn fetch_image(
    http: &Client,
    url: &str,
    config: &Config,
) -> Result<Option<DownloadedImage>> {
    match media::download_image(http, url, &config.download_dir()).await {
        Ok(image) => Ok(Some(image)),
        Err(e) => match e.downcast::<Error>() {
            Ok(err) => Err(err),
            Err(e) => {
                tracing::warn!("Image download failed, posting text only: {e:#}");
                Ok(None)
            }
        },
    }
}
