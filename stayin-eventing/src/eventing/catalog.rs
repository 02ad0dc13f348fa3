//! 事件目录（Catalog）
//!
//! 事件类型标识到（解码器，处理器）的注册表，启动时一次性填充，运行期只读：
//! - 解码器把原始载荷反序列化为具体事件，并以类型擦除（`Any`）形式交给分发器；
//! - 处理器在工作单元 `W` 上执行事件的副作用，执行时再按同一泛型还原具体类型；
//! - 同一类型重复注册返回 `DuplicateKind`，避免静默覆盖。
//!
//! 新增事件类型只需实现 `Event` 与 `EventHandler` 并注册，无需修改分发逻辑。
//!
use crate::domain_event::Event;
use crate::error::{EventingError, EventingResult as Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::any::Any;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// 事件处理器：在工作单元上应用某一类事件的副作用
///
/// 处理器只能通过 `work` 修改持久化状态，提交与回滚由消费循环负责。
#[async_trait]
pub trait EventHandler<E: Event, W: Send>: Send + Sync {
    async fn handle(&self, event: E, work: &mut W) -> anyhow::Result<()>;
}

/// 解码后的事件：公共事件头 + 类型擦除的具体事件
pub struct DecodedEvent {
    event_id: String,
    published_at: DateTime<Utc>,
    inner: Box<dyn Any + Send>,
}

impl DecodedEvent {
    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn published_at(&self) -> DateTime<Utc> {
        self.published_at
    }
}

type DecodeFn = Box<dyn Fn(&[u8]) -> Result<DecodedEvent> + Send + Sync>;

type HandleFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

type HandleFn<W> =
    Box<dyn for<'a> Fn(Box<dyn Any + Send>, &'a mut W) -> HandleFuture<'a> + Send + Sync>;

fn decode_fn<F>(f: F) -> DecodeFn
where
    F: Fn(&[u8]) -> Result<DecodedEvent> + Send + Sync + 'static,
{
    Box::new(f)
}

fn handle_fn<W, F>(f: F) -> HandleFn<W>
where
    F: for<'a> Fn(Box<dyn Any + Send>, &'a mut W) -> HandleFuture<'a> + Send + Sync + 'static,
{
    Box::new(f)
}

/// 目录中的一项
pub struct CatalogEntry<W> {
    kind: &'static str,
    decode: DecodeFn,
    handle: HandleFn<W>,
}

impl<W> CatalogEntry<W> {
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// 载荷 → 具体事件；失败为 `Decode`
    pub fn decode(&self, payload: &[u8]) -> Result<DecodedEvent> {
        (self.decode)(payload)
    }

    /// 在工作单元上执行处理器；处理器错误为 `Handler`
    pub async fn handle(&self, event: DecodedEvent, work: &mut W) -> Result<()> {
        (self.handle)(event.inner, work).await
    }
}

/// 事件类型 → 目录项
pub struct Catalog<W> {
    entries: DashMap<&'static str, Arc<CatalogEntry<W>>>,
}

impl<W> Default for Catalog<W> {
    fn default() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

impl<W: Send + 'static> Catalog<W> {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册事件类型 `E` 及其处理器
    pub fn register<E, H>(&self, handler: H) -> Result<()>
    where
        E: Event,
        H: EventHandler<E, W> + 'static,
    {
        let Entry::Vacant(slot) = self.entries.entry(E::KIND) else {
            return Err(EventingError::DuplicateKind {
                kind: E::KIND.to_string(),
            });
        };

        let decode = decode_fn(|payload| {
            let event: E = serde_json::from_slice(payload).map_err(|e| EventingError::Decode {
                kind: E::KIND.to_string(),
                reason: e.to_string(),
            })?;

            Ok(DecodedEvent {
                event_id: event.event_id().to_string(),
                published_at: event.published_at(),
                inner: Box::new(event),
            })
        });

        let handler = Arc::new(handler);
        let handle = handle_fn(move |boxed, work: &mut W| {
            let handler = handler.clone();

            Box::pin(async move {
                // 键与闭包共享同一泛型 E，正常情况下不会失败
                let event = boxed.downcast::<E>().map_err(|_| EventingError::Runtime {
                    reason: format!("catalog entry type mismatch: kind={}", E::KIND),
                })?;

                handler
                    .handle(*event, work)
                    .await
                    .map_err(|e| EventingError::Handler {
                        kind: E::KIND.to_string(),
                        reason: format!("{e:#}"),
                    })
            })
        });

        slot.insert(Arc::new(CatalogEntry {
            kind: E::KIND,
            decode,
            handle,
        }));
        Ok(())
    }

    pub fn get(&self, kind: &str) -> Option<Arc<CatalogEntry<W>>> {
        self.entries.get(kind).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.entries.contains_key(kind)
    }

    /// 已注册的类型（排序后）
    pub fn kinds(&self) -> Vec<&'static str> {
        let mut kinds: Vec<_> = self.entries.iter().map(|entry| *entry.key()).collect();
        kinds.sort_unstable();
        kinds
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
