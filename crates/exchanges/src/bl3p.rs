use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha512;
use tracing::{error, info};

use interface::ExchangeError;

use crate::{excerpt, USER_AGENT};

type HmacSha512 = Hmac<Sha512>;

pub const BASE_URL: &str = "https://api.bl3p.eu/1/";

const EXCHANGE: &str = "bl3p";

/// BL3P 인증 API 호출 인터페이스.
/// 성공 시 응답 봉투를 벗긴 data 객체를 돌려준다.
/// 서비스 계층은 이 트레이트에만 의존하므로 테스트에서 스텁으로 바꿀 수 있다.
#[async_trait]
pub trait Bl3pApi: Send + Sync {
    async fn api_call(
        &self,
        path: &str,
        parameters: &[(&str, String)],
    ) -> Result<Value, ExchangeError>;
}

/// BL3P REST 클라이언트. 자격 증명은 생성자로만 주입한다.
pub struct Bl3pClient {
    http: reqwest::Client,
    public_key: String,
    private_key: String,
}

impl Bl3pClient {
    pub fn new(public_key: String, private_key: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            public_key,
            private_key,
        }
    }
}

/// nonce: 초 + 마이크로초 6자리를 이어붙인 십진 문자열.
/// 문자열로만 다뤄서 32비트 오버플로를 피한다.
pub fn generate_nonce() -> String {
    Utc::now().timestamp_micros().to_string()
}

/// POST 본문 생성. 파라미터를 urlencode하고 nonce를 마지막에 붙인다.
pub fn build_post_data(parameters: &[(&str, String)], nonce: &str) -> String {
    let mut pairs: Vec<String> = parameters
        .iter()
        .map(|(key, value)| format!("{}={}", key, urlencoding::encode(value)))
        .collect();
    pairs.push(format!("nonce={}", nonce));
    pairs.join("&")
}

/// Rest-Sign 서명: base64(HMAC-SHA512(path + NUL + body, base64 디코딩한 개인키))
pub fn sign_request(path: &str, post_data: &str, private_key: &str) -> Result<String, ExchangeError> {
    let key = BASE64
        .decode(private_key)
        .map_err(|e| ExchangeError::Other(format!("invalid BL3P private key: {}", e)))?;
    let mut mac = HmacSha512::new_from_slice(&key)
        .map_err(|e| ExchangeError::Other(format!("failed to create HMAC signer: {}", e)))?;
    mac.update(path.as_bytes());
    mac.update(&[0]);
    mac.update(post_data.as_bytes());

    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

#[async_trait]
impl Bl3pApi for Bl3pClient {
    async fn api_call(
        &self,
        path: &str,
        parameters: &[(&str, String)],
    ) -> Result<Value, ExchangeError> {
        let nonce = generate_nonce();
        let post_data = build_post_data(parameters, &nonce);
        let signature = sign_request(path, &post_data, &self.private_key)?;
        let url = format!("{}{}", BASE_URL, path);

        let response = self
            .http
            .post(&url)
            .header("Rest-Key", &self.public_key)
            .header("Rest-Sign", signature)
            .header("User-Agent", USER_AGENT)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(post_data)
            .send()
            .await?;

        let body = response.text().await?;
        let parsed: Value = serde_json::from_str(&body).map_err(|e| {
            error!("BL3P API call failed: {}", path);
            ExchangeError::MalformedResponse {
                exchange: EXCHANGE,
                message: format!("{}, response: {}", e, excerpt(&body)),
            }
        })?;

        let data = unwrap_envelope(path, parsed)?;
        info!("BL3P API call success: {}", path);

        Ok(data)
    }
}

/// {result, data} 봉투 해석.
/// result 키가 없으면 본문 전체를 data로 간주한다 (일부 엔드포인트는
/// 봉투 없이 바로 데이터를 준다).
fn unwrap_envelope(path: &str, mut response: Value) -> Result<Value, ExchangeError> {
    let result = match response.get("result").and_then(Value::as_str) {
        Some(result) => result.to_owned(),
        None => return Ok(response),
    };

    if result == "success" {
        return Ok(response
            .get_mut("data")
            .map(Value::take)
            .unwrap_or(Value::Null));
    }

    let code = response
        .pointer("/data/code")
        .map(|code| code.as_str().map(str::to_owned).unwrap_or_else(|| code.to_string()));
    let message = response
        .pointer("/data/message")
        .and_then(Value::as_str)
        .map(str::to_owned);

    error!("BL3P API call failed: {}", path);

    match (code, message) {
        (Some(code), Some(message)) => Err(ExchangeError::Api {
            exchange: EXCHANGE,
            code: Some(code),
            message,
        }),
        _ => Err(ExchangeError::MalformedResponse {
            exchange: EXCHANGE,
            message: format!(
                "received unsuccessful state, and additionally a malformed response at {}",
                path
            ),
        }),
    }
}
