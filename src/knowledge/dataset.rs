//! Dataset access for the offline builder
//!
//! Records are pulled page by page so the builder never holds more of the
//! dataset than it keeps.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::error::ServiceError;
use crate::Result;

pub const HF_ROWS_URL: &str = "https://datasets-server.huggingface.co";
pub const FINANCEBENCH_DATASET: &str = "PatronusAI/financebench";

/// One raw dataset row; fields are accessed by name and may be absent.
pub type DatasetRecord = Map<String, Value>;

/// A lazily paged source of dataset records.
#[async_trait]
pub trait DatasetSource: Send {
    /// Next page of records, or `None` once the dataset is exhausted.
    async fn next_batch(&mut self) -> Result<Option<Vec<DatasetRecord>>>;
}

/// Reads a split through the Hugging Face datasets-server `/rows` endpoint.
pub struct HuggingFaceRows {
    client: Client,
    base_url: String,
    dataset: String,
    config: String,
    split: String,
    offset: usize,
    page_size: usize,
    total: Option<usize>,
}

impl HuggingFaceRows {
    pub fn new(dataset: impl Into<String>, split: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: HF_ROWS_URL.to_string(),
            dataset: dataset.into(),
            config: "default".to_string(),
            split: split.into(),
            offset: 0,
            // datasets-server caps a page at 100 rows
            page_size: 100,
            total: None,
        }
    }

    pub fn financebench() -> Self {
        Self::new(FINANCEBENCH_DATASET, "train")
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.clamp(1, 100);
        self
    }
}

#[derive(Debug, Deserialize)]
struct RowsPage {
    #[serde(default)]
    rows: Vec<RowEntry>,
    num_rows_total: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct RowEntry {
    row: DatasetRecord,
}

#[async_trait]
impl DatasetSource for HuggingFaceRows {
    async fn next_batch(&mut self) -> Result<Option<Vec<DatasetRecord>>> {
        if matches!(self.total, Some(total) if self.offset >= total) {
            return Ok(None);
        }

        let url = format!("{}/rows", self.base_url.trim_end_matches('/'));
        let offset = self.offset.to_string();
        let length = self.page_size.to_string();

        debug!(dataset = %self.dataset, offset = self.offset, "Fetching dataset page");

        let response = self
            .client
            .get(&url)
            .query(&[
                ("dataset", self.dataset.as_str()),
                ("config", self.config.as_str()),
                ("split", self.split.as_str()),
                ("offset", offset.as_str()),
                ("length", length.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::Dataset(format!(
                "rows request for {} failed ({}): {}",
                self.dataset, status, body
            )));
        }

        let page: RowsPage = response.json().await?;
        if let Some(total) = page.num_rows_total {
            if self.total.is_none() {
                info!(dataset = %self.dataset, total, "Dataset size reported");
            }
            self.total = Some(total);
        }

        if page.rows.is_empty() {
            return Ok(None);
        }

        self.offset += page.rows.len();
        Ok(Some(page.rows.into_iter().map(|entry| entry.row).collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn page(start: usize, count: usize, total: usize) -> Value {
        let rows: Vec<Value> = (start..start + count)
            .map(|i| json!({"row_idx": i, "row": {"company": format!("Co{}", i)}, "truncated_cells": []}))
            .collect();
        json!({"rows": rows, "num_rows_total": total})
    }

    #[tokio::test]
    async fn test_pages_until_total() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rows"))
            .and(query_param("offset", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(0, 2, 3)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rows"))
            .and(query_param("offset", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(2, 1, 3)))
            .mount(&server)
            .await;

        let mut source = HuggingFaceRows::financebench()
            .with_base_url(server.uri())
            .with_page_size(2);

        let first = source.next_batch().await.unwrap().unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0]["company"], "Co0");

        let second = source.next_batch().await.unwrap().unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0]["company"], "Co2");

        assert!(source.next_batch().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_error_status_is_dataset_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rows"))
            .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
            .mount(&server)
            .await;

        let mut source = HuggingFaceRows::financebench().with_base_url(server.uri());
        let err = source.next_batch().await.unwrap_err();
        assert!(matches!(err, ServiceError::Dataset(_)));
    }
}
