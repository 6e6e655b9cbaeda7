use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use scheduler_errors::{SchedulerError, SchedulerResult};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

/// 分发给处理器的执行上下文
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskContext {
    pub task_id: i64,
    pub theme: String,
    pub log_id: String,
    pub worker_id: u64,
    pub retry_time: i32,
}

/// 任务处理器：接收序列化参数，返回可序列化的结果
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, ctx: &TaskContext, arg: &[u8]) -> SchedulerResult<Value>;
}

type HandlerFn =
    dyn Fn(TaskContext, Vec<u8>) -> BoxFuture<'static, SchedulerResult<Value>> + Send + Sync;

struct FnHandler {
    func: Box<HandlerFn>,
}

#[async_trait]
impl TaskHandler for FnHandler {
    async fn handle(&self, ctx: &TaskContext, arg: &[u8]) -> SchedulerResult<Value> {
        (self.func)(ctx.clone(), arg.to_vec()).await
    }
}

/// `(service, method) -> handler` 路由表，启动时构建，运行期只读
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<(String, String), Arc<dyn TaskHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册处理器，同名路由会被覆盖
    pub fn register(
        &mut self,
        service: impl Into<String>,
        method: impl Into<String>,
        handler: Arc<dyn TaskHandler>,
    ) -> &mut Self {
        self.handlers
            .insert((service.into(), method.into()), handler);
        self
    }

    /// 以闭包注册原始字节参数的处理器
    pub fn register_fn<F, Fut>(
        &mut self,
        service: impl Into<String>,
        method: impl Into<String>,
        func: F,
    ) -> &mut Self
    where
        F: Fn(TaskContext, Vec<u8>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = SchedulerResult<Value>> + Send + 'static,
    {
        let handler = FnHandler {
            func: Box::new(move |ctx, arg| func(ctx, arg).boxed()),
        };
        self.register(service, method, Arc::new(handler))
    }

    /// 以强类型闭包注册处理器，参数按JSON反序列化，结果按JSON序列化。
    /// 空参数按 `null` 处理。
    pub fn register_json<A, R, F, Fut>(
        &mut self,
        service: impl Into<String>,
        method: impl Into<String>,
        func: F,
    ) -> &mut Self
    where
        A: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = SchedulerResult<R>> + Send + 'static,
    {
        let func = Arc::new(func);
        self.register_fn(service, method, move |_ctx, arg| {
            let func = Arc::clone(&func);
            async move {
                let input: A = if arg.is_empty() {
                    serde_json::from_value(Value::Null)?
                } else {
                    serde_json::from_slice(&arg)?
                };
                let output = func(input).await?;
                Ok::<Value, SchedulerError>(serde_json::to_value(output)?)
            }
        })
    }

    pub fn resolve(&self, service: &str, method: &str) -> SchedulerResult<Arc<dyn TaskHandler>> {
        self.handlers
            .get(&(service.to_string(), method.to_string()))
            .cloned()
            .ok_or_else(|| SchedulerError::handler_not_found(service, method))
    }

    pub fn contains(&self, service: &str, method: &str) -> bool {
        self.handlers
            .contains_key(&(service.to_string(), method.to_string()))
    }

    /// 已注册的路由，格式为 `service.method`，按字典序排列
    pub fn routes(&self) -> Vec<String> {
        let mut routes: Vec<String> = self
            .handlers
            .keys()
            .map(|(service, method)| format!("{service}.{method}"))
            .collect();
        routes.sort();
        routes
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("routes", &self.routes())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    fn ctx() -> TaskContext {
        TaskContext {
            task_id: 1,
            theme: "default".to_string(),
            log_id: "log".to_string(),
            worker_id: 1,
            retry_time: 0,
        }
    }

    #[derive(Deserialize)]
    struct AddArgs {
        a: i64,
        b: i64,
    }

    #[tokio::test]
    async fn test_register_json_round_trip() {
        let mut registry = HandlerRegistry::new();
        registry.register_json("math", "add", |args: AddArgs| async move {
            Ok::<_, SchedulerError>(args.a + args.b)
        });

        let handler = registry.resolve("math", "add").unwrap();
        let result = handler.handle(&ctx(), br#"{"a":2,"b":3}"#).await.unwrap();
        assert_eq!(result, Value::from(5));
    }

    #[tokio::test]
    async fn test_register_json_bad_argument_is_error() {
        let mut registry = HandlerRegistry::new();
        registry.register_json("math", "add", |args: AddArgs| async move {
            Ok::<_, SchedulerError>(args.a + args.b)
        });

        let handler = registry.resolve("math", "add").unwrap();
        let err = handler.handle(&ctx(), b"not json").await.unwrap_err();
        assert!(matches!(err, SchedulerError::Serialization(_)));
    }

    #[tokio::test]
    async fn test_empty_argument_is_null() {
        let mut registry = HandlerRegistry::new();
        registry.register_json("system", "ping", |_: Option<Value>| async move {
            Ok::<_, SchedulerError>("pong")
        });

        let handler = registry.resolve("system", "ping").unwrap();
        assert_eq!(handler.handle(&ctx(), b"").await.unwrap(), Value::from("pong"));
    }

    #[tokio::test]
    async fn test_register_fn_sees_context() {
        let mut registry = HandlerRegistry::new();
        registry.register_fn("ctx", "echo", |ctx: TaskContext, arg: Vec<u8>| async move {
            Ok::<_, SchedulerError>(serde_json::json!({ "task_id": ctx.task_id, "len": arg.len() }))
        });

        let handler = registry.resolve("ctx", "echo").unwrap();
        let result = handler.handle(&ctx(), b"abc").await.unwrap();
        assert_eq!(result["task_id"], 1);
        assert_eq!(result["len"], 3);
    }

    #[test]
    fn test_unknown_route() {
        let registry = HandlerRegistry::new();
        let err = registry.resolve("nope", "missing").err().unwrap();
        assert_eq!(err.to_string(), "未注册的任务处理器: nope.missing");
        assert!(registry.is_empty());
    }

    #[test]
    fn test_routes_are_sorted() {
        let mut registry = HandlerRegistry::new();
        registry
            .register_json("b", "x", |_: Value| async move { Ok::<_, SchedulerError>(()) })
            .register_json("a", "y", |_: Value| async move { Ok::<_, SchedulerError>(()) });
        assert_eq!(registry.routes(), vec!["a.y".to_string(), "b.x".to_string()]);
        assert!(registry.contains("a", "y"));
        assert_eq!(registry.len(), 2);
    }
}
