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

pub const BASE_URL: &str = "https://api.binance.com";

const EXCHANGE: &str = "binance";

/// 엔드포인트 보안 등급. 등급이 서명/키 첨부 여부를 결정한다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityType {
    None,
    Trade,
    UserData,
    UserStream,
    MarketData,
}

impl SecurityType {
    /// TRADE와 USER_DATA만 timestamp + HMAC 서명을 요구한다.
    pub fn needs_signature(self) -> bool {
        matches!(self, SecurityType::Trade | SecurityType::UserData)
    }

    /// NONE을 뺀 모든 등급은 X-MBX-APIKEY 헤더를 붙인다.
    pub fn needs_api_key(self) -> bool {
        !matches!(self, SecurityType::None)
    }
}

/// 서명까지 끝난 전송 준비 상태. 순수 함수 출력이라 그대로 검증할 수 있다.
#[derive(Debug, PartialEq, Eq)]
pub struct PreparedRequest {
    pub query: Option<String>,
    pub body: Option<String>,
    pub headers: Vec<(&'static str, String)>,
}

/// 밀리초 타임스탬프
pub fn get_timestamp() -> u64 {
    Utc::now().timestamp_millis() as u64
}

fn encode_params(params: &[(&str, String)]) -> String {
    params
        .iter()
        .map(|(key, value)| format!("{}={}", key, urlencoding::encode(value)))
        .collect::<Vec<_>>()
        .join("&")
}

/// 서명: HMAC-SHA256(urlencoded 파라미터 문자열, secret)의 소문자 hex
pub fn generate_signature(payload: &str, secret: &str) -> Result<String, ExchangeError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ExchangeError::Other(format!("failed to create HMAC signer: {}", e)))?;
    mac.update(payload.as_bytes());

    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// 보안 등급에 따라 파라미터를 서명하고 쿼리/본문/헤더로 배치한다.
/// 서명 대상 파라미터는 GET/DELETE면 쿼리에, POST/PUT이면 본문에 실린다.
pub fn prepare_request(
    method: &Method,
    params: &[(&str, String)],
    security: SecurityType,
    api_key: &str,
    api_secret: &str,
    timestamp: u64,
) -> Result<PreparedRequest, ExchangeError> {
    let mut headers = Vec::new();
    if security.needs_api_key() {
        headers.push(("X-MBX-APIKEY", api_key.to_owned()));
    }

    let payload = if security.needs_signature() {
        let mut signed: Vec<(&str, String)> = params.to_vec();
        signed.push(("timestamp", timestamp.to_string()));

        let mut encoded = encode_params(&signed);
        let signature = generate_signature(&encoded, api_secret)?;
        encoded.push_str("&signature=");
        encoded.push_str(&signature);
        encoded
    } else {
        encode_params(params)
    };

    if payload.is_empty() {
        return Ok(PreparedRequest { query: None, body: None, headers });
    }

    if *method == Method::POST || *method == Method::PUT {
        Ok(PreparedRequest {
            query: None,
            body: Some(payload),
            headers,
        })
    } else {
        Ok(PreparedRequest {
            query: Some(payload),
            body: None,
            headers,
        })
    }
}

/// Binance REST API 호출 인터페이스
#[async_trait]
pub trait BinanceApi: Send + Sync {
    async fn request(
        &self,
        method: Method,
        path: &str,
        security: SecurityType,
        params: &[(&str, String)],
    ) -> Result<Value, ExchangeError>;
}

pub struct BinanceClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    api_secret: String,
}

impl BinanceClient {
    pub fn new(api_key: String, api_secret: String) -> Self {
        Self::with_base_url(BASE_URL.to_owned(), api_key, api_secret)
    }

    /// 지역별 호스트 (binance.us 등) 지원
    pub fn with_base_url(base_url: String, api_key: String, api_secret: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            api_key,
            api_secret,
        }
    }
}

#[async_trait]
impl BinanceApi for BinanceClient {
    async fn request(
        &self,
        method: Method,
        path: &str,
        security: SecurityType,
        params: &[(&str, String)],
    ) -> Result<Value, ExchangeError> {
        let prepared = prepare_request(
            &method,
            params,
            security,
            &self.api_key,
            &self.api_secret,
            get_timestamp(),
        )?;

        let mut url = format!("{}{}", self.base_url, path);
        if let Some(query) = &prepared.query {
            url.push('?');
            url.push_str(query);
        }

        let mut request = self
            .http
            .request(method, &url)
            .header("User-Agent", USER_AGENT);
        for (name, value) in &prepared.headers {
            request = request.header(*name, value);
        }
        if let Some(body) = prepared.body {
            request = request
                .header("Content-Type", "application/x-www-form-urlencoded")
                .body(body);
        }

        let response = request.send().await?;
        let body = response.text().await?;
        let parsed: Value = serde_json::from_str(&body).map_err(|e| {
            error!("Binance API call failed: {}", path);
            ExchangeError::MalformedResponse {
                exchange: EXCHANGE,
                message: format!("{}, response: {}", e, excerpt(&body)),
            }
        })?;

        check_error(path, &parsed)?;
        info!("Binance API call success: {}", path);

        Ok(parsed)
    }
}

/// 오류 본문은 {"code": -1121, "msg": "..."} 형태. 두 키가 모두 있으면 오류.
fn check_error(path: &str, response: &Value) -> Result<(), ExchangeError> {
    let (Some(code), Some(msg)) = (response.get("code"), response.get("msg")) else {
        return Ok(());
    };
    let Some(msg) = msg.as_str() else {
        return Ok(());
    };

    error!("Binance API call failed: {}", path);

    Err(ExchangeError::Api {
        exchange: EXCHANGE,
        code: Some(code.to_string()),
        message: msg.to_owned(),
    })
}
