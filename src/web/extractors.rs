use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use serde::Deserialize;

/// 请求ID提取器，优先使用客户端传入的 X-Request-ID
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for RequestId
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let request_id = parts
            .headers
            .get("X-Request-ID")
            .and_then(|value| value.to_str().ok())
            .map(|s| s.to_string())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        Ok(RequestId(request_id))
    }
}

/// 预测接口的查询参数
#[derive(Debug, Default, Deserialize)]
pub struct PredictQuery {
    #[serde(default)]
    pub threshold: Option<String>,
}

impl PredictQuery {
    /// 无法解析的阈值按未指定处理
    pub fn threshold(&self) -> Option<f32> {
        let raw = self.threshold.as_deref()?;
        match raw.trim().parse::<f32>() {
            Ok(value) if value.is_finite() => Some(value),
            _ => {
                tracing::debug!("Ignoring unparsable threshold '{}'", raw);
                None
            }
        }
    }
}
