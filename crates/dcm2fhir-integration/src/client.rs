//! FHIR REST客户端
//!
//! 通过HTTP访问FHIR服务器：
//! - `PUT [base]/[type]/[id]` 按标识创建或更新
//! - `GET [base]/[type]` 获取全部资源（跟随Bundle的 `next` 链接分页）
//! - `GET [base]/[type]?_id=[id]` 按标识搜索

use crate::path::get_str_by_path;
use crate::repository::ResourceRepository;
use async_trait::async_trait;
use dcm2fhir_core::{ConvertError, ResourceKind, Result};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde_json::Value;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info, warn};

/// 默认内容类型
pub const FHIR_JSON: &str = "application/fhir+json";

/// 客户端配置
#[derive(Debug, Clone)]
pub struct FhirClientConfig {
    /// FHIR服务器基础URL
    pub base_url: String,
    pub content_type: String,
    /// 请求超时，`None` 表示不设超时
    pub timeout: Option<Duration>,
}

impl FhirClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            content_type: FHIR_JSON.to_string(),
            timeout: None,
        }
    }
}

/// FHIR服务器客户端
#[derive(Debug, Clone)]
pub struct FhirClient {
    base_url: String,
    content_type: String,
    client: reqwest::Client,
}

impl FhirClient {
    /// 创建客户端，基础URL为空时返回配置错误
    pub fn new(config: FhirClientConfig) -> Result<Self> {
        let base_url = config.base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(ConvertError::Config("FHIR服务器基础URL未配置".to_string()));
        }

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| ConvertError::Config(format!("无法创建HTTP客户端: {}", e)))?;

        info!("FHIR客户端已创建: {}", base_url);
        Ok(Self {
            base_url,
            content_type: config.content_type,
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// 资源类型URL
    pub fn type_url(&self, kind: ResourceKind) -> String {
        format!("{}/{}", self.base_url, kind.as_str())
    }

    /// 单个资源URL
    pub fn resource_url(&self, kind: ResourceKind, id: &str) -> String {
        format!("{}/{}/{}", self.base_url, kind.as_str(), id)
    }

    /// 发送请求并解析JSON响应，空响应体返回 `Value::Null`
    async fn send_json(&self, request: reqwest::RequestBuilder, url: &str) -> Result<Value> {
        let response = request
            .header(ACCEPT, &self.content_type)
            .send()
            .await
            .map_err(|e| ConvertError::Store(format!("请求 {} 失败: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            warn!("FHIR服务器返回错误状态 {}: {}", status, url);
            return Err(ConvertError::StoreStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| ConvertError::Store(format!("读取 {} 响应失败: {}", url, e)))?;
        if body.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&body)
            .map_err(|e| ConvertError::Store(format!("无法解析 {} 的响应: {}", url, e)))
    }

    /// 提取Bundle中类型为 `kind` 的资源
    ///
    /// 跳过 `search.mode` 为 `outcome` 的条目（服务器附带的OperationOutcome）
    /// 以及资源类型不符的条目。
    fn bundle_resources(bundle: &Value, kind: ResourceKind) -> Vec<Value> {
        let Some(entries) = bundle.get("entry").and_then(Value::as_array) else {
            return Vec::new();
        };

        entries
            .iter()
            .filter(|entry| get_str_by_path(entry, "search.mode") != Some("outcome"))
            .filter_map(|entry| entry.get("resource"))
            .filter(|resource| {
                let matches = get_str_by_path(resource, "resourceType") == Some(kind.as_str());
                if !matches {
                    debug!("跳过非 {} 条目: {:?}", kind, resource.get("resourceType"));
                }
                matches
            })
            .cloned()
            .collect()
    }

    /// Bundle的下一页链接
    fn next_link(bundle: &Value) -> Option<String> {
        bundle
            .get("link")?
            .as_array()?
            .iter()
            .find(|link| get_str_by_path(link, "relation") == Some("next"))
            .and_then(|link| get_str_by_path(link, "url"))
            .map(str::to_string)
    }
}

#[async_trait]
impl ResourceRepository for FhirClient {
    async fn upsert(&self, kind: ResourceKind, id: &str, resource: Value) -> Result<Value> {
        let url = self.resource_url(kind, id);
        debug!("PUT {}", url);

        let body = serde_json::to_vec(&resource)?;
        let request = self
            .client
            .put(&url)
            .header(CONTENT_TYPE, &self.content_type)
            .body(body);

        match self.send_json(request, &url).await? {
            Value::Null => Ok(resource),
            stored => Ok(stored),
        }
    }

    async fn fetch_all(&self, kind: ResourceKind) -> Result<Vec<Value>> {
        let mut url = self.type_url(kind);
        let mut visited = HashSet::new();
        let mut resources = Vec::new();

        loop {
            debug!("GET {}", url);
            let bundle = self.send_json(self.client.get(&url), &url).await?;
            resources.extend(Self::bundle_resources(&bundle, kind));
            visited.insert(url.clone());

            match Self::next_link(&bundle) {
                Some(next) if !visited.contains(&next) => url = next,
                _ => break,
            }
        }

        info!("获取 {} 资源 {} 个", kind, resources.len());
        Ok(resources)
    }

    async fn search_by_id(&self, kind: ResourceKind, id: &str) -> Result<Vec<Value>> {
        let url = self.type_url(kind);
        debug!("GET {}?_id={}", url, id);

        let request = self.client.get(&url).query(&[("_id", id)]);
        let bundle = self.send_json(request, &url).await?;
        Ok(Self::bundle_resources(&bundle, kind))
    }
}
