//! 资源仓库接口

use async_trait::async_trait;
use dcm2fhir_core::{ResourceKind, Result};
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// 资源仓库
///
/// 每次调用最多尝试一次，失败原样返回给调用方。
#[async_trait]
pub trait ResourceRepository: Send + Sync {
    /// 按标识创建或更新资源，返回存储后的资源
    async fn upsert(&self, kind: ResourceKind, id: &str, resource: Value) -> Result<Value>;

    /// 获取某类型的全部资源，保持存储返回的顺序
    async fn fetch_all(&self, kind: ResourceKind) -> Result<Vec<Value>>;

    /// 按标识搜索资源
    async fn search_by_id(&self, kind: ResourceKind, id: &str) -> Result<Vec<Value>>;
}

#[derive(Debug, Default)]
struct StoreState {
    order: Vec<(ResourceKind, String)>,
    resources: HashMap<(ResourceKind, String), Value>,
    writes: usize,
}

/// 内存资源仓库
///
/// 按首次写入顺序返回资源，重复写入同一标识时原位更新。
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    state: RwLock<StoreState>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// 读取单个资源
    pub async fn get(&self, kind: ResourceKind, id: &str) -> Option<Value> {
        let state = self.state.read().await;
        state.resources.get(&(kind, id.to_string())).cloned()
    }

    /// 某类型的资源数量
    pub async fn count(&self, kind: ResourceKind) -> usize {
        let state = self.state.read().await;
        state.order.iter().filter(|(k, _)| *k == kind).count()
    }

    /// 资源总数
    pub async fn len(&self) -> usize {
        self.state.read().await.order.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// 累计写入次数
    pub async fn write_count(&self) -> usize {
        self.state.read().await.writes
    }
}

#[async_trait]
impl ResourceRepository for InMemoryRepository {
    async fn upsert(&self, kind: ResourceKind, id: &str, resource: Value) -> Result<Value> {
        let mut state = self.state.write().await;
        let key = (kind, id.to_string());

        if state.resources.insert(key.clone(), resource.clone()).is_none() {
            debug!("创建资源 {}/{}", kind, id);
            state.order.push(key);
        } else {
            debug!("更新资源 {}/{}", kind, id);
        }
        state.writes += 1;

        Ok(resource)
    }

    async fn fetch_all(&self, kind: ResourceKind) -> Result<Vec<Value>> {
        let state = self.state.read().await;
        Ok(state
            .order
            .iter()
            .filter(|(k, _)| *k == kind)
            .filter_map(|key| state.resources.get(key).cloned())
            .collect())
    }

    async fn search_by_id(&self, kind: ResourceKind, id: &str) -> Result<Vec<Value>> {
        Ok(self.get(kind, id).await.into_iter().collect())
    }
}
