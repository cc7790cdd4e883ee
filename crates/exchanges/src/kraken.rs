use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::{Digest, Sha256, Sha512};
use tracing::{error, info};

use interface::ExchangeError;

use crate::{excerpt, USER_AGENT};

type HmacSha512 = Hmac<Sha512>;

pub const BASE_URL: &str = "https://api.kraken.com";
pub const API_VERSION: &str = "0";

const EXCHANGE: &str = "kraken";

/// Kraken REST API 호출 인터페이스.
/// 두 메서드 모두 응답의 result 객체를 돌려준다.
#[async_trait]
pub trait KrakenApi: Send + Sync {
    async fn query_public(
        &self,
        function: &str,
        arguments: &[(&str, String)],
    ) -> Result<Value, ExchangeError>;

    async fn query_private(
        &self,
        function: &str,
        arguments: &[(&str, String)],
    ) -> Result<Value, ExchangeError>;
}

pub struct KrakenClient {
    http: reqwest::Client,
    api_key: String,
    private_key: String,
}

impl KrakenClient {
    pub fn new(api_key: String, private_key: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            private_key,
        }
    }
}

pub fn generate_nonce() -> String {
    Utc::now().timestamp_micros().to_string()
}

/// nonce를 맨 앞에 붙인 urlencoded POST 본문
pub fn build_post_data(nonce: &str, arguments: &[(&str, String)]) -> String {
    let mut pairs = vec![format!("nonce={}", nonce)];
    pairs.extend(
        arguments
            .iter()
            .map(|(key, value)| format!("{}={}", key, urlencoding::encode(value))),
    );
    pairs.join("&")
}

/// API-Sign 서명:
/// base64(HMAC-SHA512(path + SHA256(nonce + post_data), base64 디코딩한 개인키))
pub fn sign_request(
    path: &str,
    nonce: &str,
    post_data: &str,
    private_key: &str,
) -> Result<String, ExchangeError> {
    let key = BASE64
        .decode(private_key)
        .map_err(|e| ExchangeError::Other(format!("invalid Kraken private key: {}", e)))?;

    let mut inner = Sha256::new();
    inner.update(nonce.as_bytes());
    inner.update(post_data.as_bytes());

    let mut mac = HmacSha512::new_from_slice(&key)
        .map_err(|e| ExchangeError::Other(format!("failed to create HMAC signer: {}", e)))?;
    mac.update(path.as_bytes());
    mac.update(&inner.finalize());

    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

impl KrakenClient {
    async fn parse_response(&self, function: &str, body: String) -> Result<Value, ExchangeError> {
        let parsed: Value = serde_json::from_str(&body).map_err(|e| {
            error!("Kraken API call failed: {}", function);
            ExchangeError::MalformedResponse {
                exchange: EXCHANGE,
                message: format!("{}, response: {}", e, excerpt(&body)),
            }
        })?;

        let result = validate_response(function, parsed)?;
        info!("Kraken API call success: {}", function);

        Ok(result)
    }
}

#[async_trait]
impl KrakenApi for KrakenClient {
    async fn query_public(
        &self,
        function: &str,
        arguments: &[(&str, String)],
    ) -> Result<Value, ExchangeError> {
        let url = format!("{}/{}/public/{}", BASE_URL, API_VERSION, function);
        let response = self
            .http
            .get(&url)
            .header("User-Agent", USER_AGENT)
            .query(arguments)
            .send()
            .await?;

        self.parse_response(function, response.text().await?).await
    }

    async fn query_private(
        &self,
        function: &str,
        arguments: &[(&str, String)],
    ) -> Result<Value, ExchangeError> {
        let path = format!("/{}/private/{}", API_VERSION, function);
        let nonce = generate_nonce();
        let post_data = build_post_data(&nonce, arguments);
        let signature = sign_request(&path, &nonce, &post_data, &self.private_key)?;

        let url = format!("{}{}", BASE_URL, path);
        let response = self
            .http
            .post(&url)
            .header("User-Agent", USER_AGENT)
            .header("API-Key", &self.api_key)
            .header("API-Sign", signature)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(post_data)
            .send()
            .await?;

        self.parse_response(function, response.text().await?).await
    }
}

/// error 배열이 비어 있지 않으면 항목을 이어붙여 오류로, 비어 있으면
/// result 객체를 꺼내 돌려준다.
fn validate_response(function: &str, mut response: Value) -> Result<Value, ExchangeError> {
    let errors: Vec<String> = response
        .get("error")
        .and_then(Value::as_array)
        .map(|errors| {
            errors
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default();

    if !errors.is_empty() {
        error!("Kraken API call failed: {}", function);
        return Err(ExchangeError::Api {
            exchange: EXCHANGE,
            code: None,
            message: errors.join(", "),
        });
    }

    response
        .get_mut("result")
        .map(Value::take)
        .ok_or_else(|| ExchangeError::MalformedResponse {
            exchange: EXCHANGE,
            message: format!("response for {} carries no result object", function),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // 공식 문서의 서명 예제와 같은 입력을 쓰는 픽스처
    const DOCS_PRIVATE_KEY: &str =
        "kQH5HW/8p1uGOVjbgWA7FunAmGO8lsSUXNsu3eow76sz84Q18fWxnyRzBHCd3pd5nE9qa99HAZtuZuj6F1huXg==";

    #[test]
    fn signs_docs_example_vector() {
        let nonce = "1616492376744";
        let post_data =
            "nonce=1616492376744&ordertype=limit&pair=XBTUSD&price=37500&type=buy&volume=1.25";
        let signature =
            sign_request("/0/private/AddOrder", nonce, post_data, DOCS_PRIVATE_KEY).unwrap();

        assert_eq!(
            signature,
            "Cq//kwKLmfso2kwu1vI77D+dVVVR4cFKIRkN9X8j2kMbn9diJlQOaiw1EuTxXKh39fYm/uqujN7aUz6Jdibjzw=="
        );
    }

    #[test]
    fn rejects_private_key_that_is_not_base64() {
        assert!(sign_request("/0/private/Balance", "1", "nonce=1", "?!").is_err());
    }

    #[test]
    fn post_data_starts_with_nonce() {
        let post_data = build_post_data(
            "1616492376744",
            &[("pair", "XXBTZEUR".to_string()), ("type", "buy".to_string())],
        );

        assert_eq!(post_data, "nonce=1616492376744&pair=XXBTZEUR&type=buy");
    }

    #[test]
    fn unwraps_result_when_error_array_is_empty() {
        let response = json!({"error": [], "result": {"txid": ["OUF4EM-FRGI2-MQMWZD"]}});

        let result = validate_response("AddOrder", response).unwrap();
        assert_eq!(result, json!({"txid": ["OUF4EM-FRGI2-MQMWZD"]}));
    }

    #[test]
    fn joins_multiple_errors_into_one_message() {
        let response = json!({
            "error": ["EGeneral:Invalid arguments", "EOrder:Insufficient funds"]
        });

        match validate_response("AddOrder", response) {
            Err(ExchangeError::Api { exchange, code, message }) => {
                assert_eq!(exchange, "kraken");
                assert_eq!(code, None);
                assert_eq!(message, "EGeneral:Invalid arguments, EOrder:Insufficient funds");
            }
            other => panic!("expected Api error, got {:?}", other),
        }
    }

    #[test]
    fn missing_result_is_malformed() {
        let response = json!({"error": []});

        assert!(matches!(
            validate_response("Balance", response),
            Err(ExchangeError::MalformedResponse { .. })
        ));
    }
}
