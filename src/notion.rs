//! Notion database access: the record model, the paginated query client, and
//! random record selection.

use async_trait::async_trait;
use rand::seq::SliceRandom;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::{Endpoints, NotionAuth};
use crate::error::{Error, Result};

const PAGE_SIZE: u32 = 100;

/// A database row as returned by the query endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Page {
    pub id: String,
    #[serde(default)]
    pub properties: HashMap<String, PropertyValue>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PropertyValue {
    Title {
        #[serde(default)]
        title: Vec<RichText>,
    },
    RichText {
        #[serde(default)]
        rich_text: Vec<RichText>,
    },
    Files {
        #[serde(default)]
        files: Vec<FileObject>,
    },
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RichText {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: Option<TextContent>,
}

impl RichText {
    pub fn content(&self) -> &str {
        self.text.as_ref().map(|t| t.content.as_str()).unwrap_or("")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TextContent {
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FileObject {
    /// Hosted by Notion; the URL is short-lived.
    File { file: FileUrl },
    External { external: FileUrl },
    #[serde(other)]
    Unsupported,
}

impl FileObject {
    pub fn url(&self) -> Option<&str> {
        match self {
            FileObject::File { file } | FileObject::External { external: file } => {
                Some(file.url.as_str()).filter(|url| !url.is_empty())
            }
            FileObject::Unsupported => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileUrl {
    #[serde(default)]
    pub url: String,
}

/// One page of query results.
#[derive(Debug, Deserialize)]
pub struct QueryPage {
    pub results: Vec<Page>,
    #[serde(default)]
    pub has_more: bool,
    pub next_cursor: Option<String>,
}

#[derive(Serialize)]
struct QueryBody<'a> {
    page_size: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    start_cursor: Option<&'a str>,
}

/// A cursor-paginated source of database records.
#[async_trait]
pub trait PageSource {
    async fn query(&self, cursor: Option<&str>) -> Result<QueryPage>;
}

pub struct NotionClient {
    http: Client,
    query_url: String,
    token: String,
    notion_version: String,
}

impl NotionClient {
    pub fn new(http: Client, auth: &NotionAuth, endpoints: &Endpoints) -> Self {
        Self {
            http,
            query_url: format!(
                "{}/databases/{}/query",
                endpoints.notion_api.trim_end_matches('/'),
                auth.database_id
            ),
            token: auth.token.clone(),
            notion_version: endpoints.notion_version.clone(),
        }
    }
}

#[async_trait]
impl PageSource for NotionClient {
    async fn query(&self, cursor: Option<&str>) -> Result<QueryPage> {
        let body = QueryBody {
            page_size: PAGE_SIZE,
            start_cursor: cursor,
        };
        let resp = self
            .http
            .post(&self.query_url)
            .bearer_auth(&self.token)
            .header("Notion-Version", &self.notion_version)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Notion { status, body });
        }

        Ok(resp.json().await?)
    }
}

/// Follow the cursor until the source reports no more pages. Everything is
/// held in memory, so this only suits small databases.
pub async fn fetch_all<S>(source: &S) -> Result<Vec<Page>>
where
    S: PageSource + Sync + ?Sized,
{
    let mut pages = Vec::new();
    let mut cursor: Option<String> = None;

    loop {
        let page = source.query(cursor.as_deref()).await?;
        pages.extend(page.results);
        tracing::info!("Fetched {} records so far", pages.len());

        if !page.has_more {
            break;
        }
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => {
                tracing::warn!("Source reported more pages without a cursor; stopping");
                break;
            }
        }
    }

    Ok(pages)
}

/// Fetch every record and pick one uniformly at random. `None` when the
/// database is empty.
pub async fn fetch_random_record<S>(source: &S) -> Result<Option<Page>>
where
    S: PageSource + Sync + ?Sized,
{
    let pages = fetch_all(source).await?;
    let total = pages.len();
    let chosen = pages.choose(&mut rand::thread_rng()).cloned();
    if chosen.is_some() {
        tracing::info!("Picked one record at random out of {total}");
    }
    Ok(chosen)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn page(id: usize) -> Page {
        Page {
            id: format!("page-{id}"),
            properties: HashMap::new(),
        }
    }

    /// Serves pre-built pages and records the cursors it was asked for.
    struct FakeSource {
        pages: Vec<(usize, Option<&'static str>)>,
        seen: Mutex<Vec<Option<String>>>,
    }

    impl FakeSource {
        fn new(pages: Vec<(usize, Option<&'static str>)>) -> Self {
            Self {
                pages,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl PageSource for FakeSource {
        async fn query(&self, cursor: Option<&str>) -> Result<QueryPage> {
            let mut seen = self.seen.lock().unwrap();
            let index = seen.len();
            seen.push(cursor.map(str::to_string));

            let (count, next) = self.pages[index];
            let offset: usize = self.pages[..index].iter().map(|(n, _)| n).sum();
            Ok(QueryPage {
                results: (offset..offset + count).map(page).collect(),
                has_more: next.is_some(),
                next_cursor: next.map(str::to_string),
            })
        }
    }

    #[tokio::test]
    async fn test_fetch_all_accumulates_every_page() {
        let source = FakeSource::new(vec![(100, Some("c1")), (100, Some("c2")), (1, None)]);

        let pages = fetch_all(&source).await.unwrap();
        assert_eq!(pages.len(), 201);
        assert_eq!(pages[200].id, "page-200");
        assert_eq!(
            *source.seen.lock().unwrap(),
            vec![None, Some("c1".to_string()), Some("c2".to_string())]
        );
    }

    #[tokio::test]
    async fn test_random_record_comes_from_source() {
        let source = FakeSource::new(vec![(3, Some("next")), (2, None)]);
        let chosen = fetch_random_record(&source).await.unwrap().unwrap();
        let index: usize = chosen.id.trim_start_matches("page-").parse().unwrap();
        assert!(index < 5);
    }

    #[tokio::test]
    async fn test_random_record_none_when_empty() {
        let source = FakeSource::new(vec![(0, None)]);
        assert!(fetch_random_record(&source).await.unwrap().is_none());
    }

    #[test]
    fn test_page_properties_deserialize() {
        let raw = json!({
            "object": "page",
            "id": "abc",
            "properties": {
                "タイトル": {"id": "title", "type": "title", "title": [
                    {
                        "type": "text",
                        "text": {"content": "Hello", "link": null},
                        "plain_text": "Hello"
                    }
                ]},
                "テキスト": {"id": "x", "type": "rich_text", "rich_text": [
                    {"type": "mention", "mention": {"type": "user"}, "plain_text": "@me"}
                ]},
                "画像": {"id": "y", "type": "files", "files": [
                    {"name": "a.png", "type": "file", "file": {
                        "url": "https://s3/a.png",
                        "expiry_time": "2024-01-01T00:00:00.000Z"
                    }},
                    {"name": "b", "type": "external", "external": {"url": "https://img/b.jpg"}}
                ]},
                "Tags": {"id": "z", "type": "multi_select", "multi_select": []}
            }
        });

        let page: Page = serde_json::from_value(raw).unwrap();
        assert!(matches!(page.properties["Tags"], PropertyValue::Unsupported));
        match &page.properties["テキスト"] {
            PropertyValue::RichText { rich_text } => {
                assert_eq!(rich_text[0].kind, "mention");
                assert_eq!(rich_text[0].content(), "");
            }
            other => panic!("unexpected property: {other:?}"),
        }
        match &page.properties["画像"] {
            PropertyValue::Files { files } => {
                let urls: Vec<_> = files.iter().filter_map(FileObject::url).collect();
                assert_eq!(urls, vec!["https://s3/a.png", "https://img/b.jpg"]);
            }
            other => panic!("unexpected property: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_client_follows_cursor_over_http() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/databases/db-1/query"))
            .and(header("authorization", "Bearer secret_tok"))
            .and(header("notion-version", "2022-06-28"))
            .and(body_json(json!({"page_size": 100})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "object": "list",
                "results": [{"id": "p1", "properties": {}}],
                "has_more": true,
                "next_cursor": "cur-2"
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/v1/databases/db-1/query"))
            .and(body_json(json!({"page_size": 100, "start_cursor": "cur-2"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "object": "list",
                "results": [{"id": "p2", "properties": {}}],
                "has_more": false,
                "next_cursor": null
            })))
            .expect(1)
            .mount(&server)
            .await;

        let auth = NotionAuth {
            token: "secret_tok".into(),
            database_id: "db-1".into(),
        };
        let endpoints = Endpoints {
            notion_api: format!("{}/v1", server.uri()),
            ..Endpoints::default()
        };
        let client = NotionClient::new(Client::new(), &auth, &endpoints);

        let pages = fetch_all(&client).await.unwrap();
        let ids: Vec<_> = pages.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["p1", "p2"]);
    }

    #[tokio::test]
    async fn test_client_surfaces_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
            .mount(&server)
            .await;

        let auth = NotionAuth {
            token: "bad".into(),
            database_id: "db-1".into(),
        };
        let endpoints = Endpoints {
            notion_api: server.uri(),
            ..Endpoints::default()
        };
        let client = NotionClient::new(Client::new(), &auth, &endpoints);

        match fetch_all(&client).await.unwrap_err() {
            Error::Notion { status, body } => {
                assert_eq!(status.as_u16(), 401);
                assert_eq!(body, "unauthorized");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
