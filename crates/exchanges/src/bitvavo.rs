use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::Method;
use serde_json::Value;
use sha2::Sha256;
use tracing::{error, info};

use interface::ExchangeError;

use crate::{excerpt, USER_AGENT};

type HmacSha256 = Hmac<Sha256>;

pub const BASE_URL: &str = "https://api.bitvavo.com/v2";

/// 서명 유효 시간 (밀리초). 서버 시계 오차 허용폭.
pub const ACCESS_WINDOW: &str = "10000";

const EXCHANGE: &str = "bitvavo";

/// Bitvavo REST API 호출 인터페이스
#[async_trait]
pub trait BitvavoApi: Send + Sync {
    async fn api_call(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<Value>,
    ) -> Result<Value, ExchangeError>;
}

pub struct BitvavoClient {
    http: reqwest::Client,
    api_key: String,
    api_secret: String,
}

impl BitvavoClient {
    pub fn new(api_key: String, api_secret: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            api_secret,
        }
    }
}

fn encode_query(query: &[(&str, String)]) -> String {
    query
        .iter()
        .map(|(key, value)| format!("{}={}", key, urlencoding::encode(value)))
        .collect::<Vec<_>>()
        .join("&")
}

/// 서명 입력: timestamp + METHOD + "/v2/" + endpoint[?query] [+ JSON 본문].
/// 본문은 전송되는 바이트열과 정확히 같은 직렬화 결과여야 한다.
pub fn sign_request(
    timestamp: &str,
    method: &Method,
    endpoint_with_query: &str,
    body: Option<&str>,
    api_secret: &str,
) -> Result<String, ExchangeError> {
    let mut mac = HmacSha256::new_from_slice(api_secret.as_bytes())
        .map_err(|e| ExchangeError::Other(format!("failed to create HMAC signer: {}", e)))?;
    mac.update(timestamp.as_bytes());
    mac.update(method.as_str().as_bytes());
    mac.update(b"/v2/");
    mac.update(endpoint_with_query.as_bytes());
    if let Some(body) = body {
        mac.update(body.as_bytes());
    }

    Ok(hex::encode(mac.finalize().into_bytes()))
}

#[async_trait]
impl BitvavoApi for BitvavoClient {
    async fn api_call(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<Value>,
    ) -> Result<Value, ExchangeError> {
        let mut endpoint = path.to_owned();
        if !query.is_empty() {
            endpoint.push('?');
            endpoint.push_str(&encode_query(query));
        }

        // 서명한 문자열과 전송 본문이 달라지지 않도록 직렬화는 한 번만 한다
        let body_text = match &body {
            Some(body) => Some(serde_json::to_string(body).map_err(|e| {
                ExchangeError::Other(format!("failed to serialize request body: {}", e))
            })?),
            None => None,
        };

        let timestamp = Utc::now().timestamp_millis().to_string();
        let signature = sign_request(
            &timestamp,
            &method,
            &endpoint,
            body_text.as_deref(),
            &self.api_secret,
        )?;

        let url = format!("{}/{}", BASE_URL, endpoint);
        let mut request = self
            .http
            .request(method, &url)
            .header("User-Agent", USER_AGENT)
            .header("Bitvavo-Access-Key", &self.api_key)
            .header("Bitvavo-Access-Signature", signature)
            .header("Bitvavo-Access-Timestamp", timestamp)
            .header("Bitvavo-Access-Window", ACCESS_WINDOW);
        if let Some(body_text) = body_text {
            request = request
                .header("Content-Type", "application/json")
                .body(body_text);
        }

        let response = request.send().await?;
        let text = response.text().await?;
        let parsed: Value = serde_json::from_str(&text).map_err(|e| {
            error!("Bitvavo API call failed: {}", path);
            ExchangeError::MalformedResponse {
                exchange: EXCHANGE,
                message: format!("{}, response: {}", e, excerpt(&text)),
            }
        })?;

        check_error(path, &parsed)?;
        info!("Bitvavo API call success: {}", path);

        Ok(parsed)
    }
}

/// 오류 본문은 {"errorCode": 110, "error": "..."} 형태
fn check_error(path: &str, response: &Value) -> Result<(), ExchangeError> {
    let Some(code) = response.get("errorCode") else {
        return Ok(());
    };

    error!("Bitvavo API call failed: {}", path);

    let message = response
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("unknown error")
        .to_owned();

    Err(ExchangeError::Api {
        exchange: EXCHANGE,
        code: Some(code.to_string()),
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const FIXTURE_SECRET: &str = "bitvavo-test-secret";

    #[test]
    fn signs_get_with_query_string() {
        let signature = sign_request(
            "1548183413298",
            &Method::GET,
            "order?market=BTC-EUR&orderId=1234",
            None,
            FIXTURE_SECRET,
        )
        .unwrap();

        assert_eq!(
            signature,
            "b0335ab5feccccfb6782b80945cf75019cf4b91ae88ae8b88a9545e414c70226"
        );
    }

    #[test]
    fn signs_post_with_json_body() {
        let body = r#"{"market":"BTC-EUR","side":"buy","orderType":"market","amountQuote":"10"}"#;
        let signature =
            sign_request("1548183413298", &Method::POST, "order", Some(body), FIXTURE_SECRET)
                .unwrap();

        assert_eq!(
            signature,
            "eb94b2153171bcdaa74c9ad9bd528f4e71c2c0a6e97b223f121c366342e30f92"
        );
    }

    #[test]
    fn body_changes_the_signature() {
        let with_body = sign_request(
            "1548183413298",
            &Method::POST,
            "order",
            Some(r#"{"market":"BTC-EUR"}"#),
            FIXTURE_SECRET,
        )
        .unwrap();
        let without_body =
            sign_request("1548183413298", &Method::POST, "order", None, FIXTURE_SECRET).unwrap();

        assert_ne!(with_body, without_body);
    }

    #[test]
    fn encodes_query_pairs_in_order() {
        let query = encode_query(&[
            ("market", "BTC-EUR".to_string()),
            ("orderId", "1234".to_string()),
        ]);

        assert_eq!(query, "market=BTC-EUR&orderId=1234");
    }

    #[test]
    fn detects_error_body() {
        let body = json!({"errorCode": 110, "error": "Invalid endpoint."});

        match check_error("order", &body) {
            Err(ExchangeError::Api { exchange, code, message }) => {
                assert_eq!(exchange, "bitvavo");
                assert_eq!(code.as_deref(), Some("110"));
                assert_eq!(message, "Invalid endpoint.");
            }
            other => panic!("expected Api error, got {:?}", other),
        }
    }

    #[test]
    fn normal_body_is_not_an_error() {
        let body = json!({"orderId": "abc", "status": "filled"});
        assert!(check_error("order", &body).is_ok());
    }
}
