use serde_json::{Value, json};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub enum ParamType {
    String,
    Choice(&'static [&'static str]),
    List(&'static ParamType),
    Record(&'static [Param]),
}

#[derive(Debug, Clone)]
pub struct Param {
    pub name: &'static str,
    pub desc: &'static str,
    pub param_type: ParamType,
    pub required: bool,
}

/// Tool arguments that do not match the declared shape. Nothing is executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    Shape(String),
    Item { index: usize, reason: String },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Shape(e) => write!(f, "invalid arguments: {e}"),
            ValidationError::Item { index, reason } => {
                write!(f, "invalid arguments: item {index}: {reason}")
            }
        }
    }
}

impl std::error::Error for ValidationError {}

impl ValidationError {
    pub fn to_value(&self) -> Value {
        json!({ "error": self.to_string() })
    }
}

/// Anything that can be called with a `serde_json::Value` payload.
pub type AsyncFn = Box<
    dyn Fn(serde_json::Value) -> Pin<Box<dyn Future<Output = serde_json::Value> + Send>>
        + Send
        + Sync,
>;

/// Adapt a typed async handler to the uniform `Fn(Value) -> Future<Value>` shape.
/// Arguments that fail to deserialize never reach the handler; the caller gets
/// `{ "error": ... }` back instead.
///
/// ```rust,ignore
/// #[derive(serde::Deserialize)]
/// struct Hello { name: String }
///
/// async fn hello(args: Hello) -> serde_json::Value {
///     serde_json::json!({ "hi": args.name })
/// }
///
/// let wrapped = with_args(hello);
/// let out = wrapped(serde_json::json!({ "name": "Ada" })).await;
/// assert_eq!(out, serde_json::json!({ "hi": "Ada" }));
///
/// let err = wrapped(serde_json::json!({ "name": 123 })).await;
/// assert!(err.get("error").is_some());
/// ```
pub fn with_args<Args, Fut, F>(f: F) -> AsyncFn
where
    Args: serde::de::DeserializeOwned + Send + 'static,
    F: Fn(Args) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = serde_json::Value> + Send + 'static,
{
    let f = Arc::new(f);
    Box::new(move |args: serde_json::Value| {
        let args = serde_json::from_value::<Args>(args)
            .map_err(|e| ValidationError::Shape(e.to_string()));
        let args = match args {
            Ok(args) => args,
            Err(error) => {
                tracing::debug!(%error, "tools: rejected arguments");
                return Box::pin(async move { error.to_value() });
            }
        };
        let f = Arc::clone(&f);
        Box::pin(async move { (f)(args).await })
    })
}

fn type_schema(param_type: &ParamType) -> Value {
    match param_type {
        ParamType::String => json!({ "type": "string" }),
        ParamType::Choice(options) => json!({ "type": "string", "enum": options }),
        ParamType::List(item) => json!({ "type": "array", "items": type_schema(item) }),
        ParamType::Record(fields) => object_schema(fields),
    }
}

/// JSON schema of an argument object.
pub fn object_schema(params: &[Param]) -> Value {
    let mut properties = serde_json::Map::new();
    let mut required = Vec::new();
    for p in params {
        let mut schema = type_schema(&p.param_type);
        if let Some(obj) = schema.as_object_mut() {
            obj.insert("description".into(), Value::from(p.desc));
        }
        properties.insert(p.name.to_string(), schema);
        if p.required {
            required.push(Value::from(p.name));
        }
    }
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}
