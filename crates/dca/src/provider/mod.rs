use interface::ExchangeError;

/// 출금 주소 공급자. 공급자 체인은 순서대로 시도되고 실패는 건너뛴다.
pub trait WithdrawAddressProvider: Send + Sync {
    fn provide(&self) -> Result<String, ExchangeError>;
}

/// 설정 파일/환경에서 받은 고정 주소를 검증 후 그대로 내주는 공급자
pub struct SimpleWithdrawAddressProvider {
    configured_address: Option<String>,
}

impl SimpleWithdrawAddressProvider {
    pub fn new(configured_address: Option<String>) -> Self {
        Self { configured_address }
    }
}

impl WithdrawAddressProvider for SimpleWithdrawAddressProvider {
    fn provide(&self) -> Result<String, ExchangeError> {
        let address = self
            .configured_address
            .as_deref()
            .ok_or_else(|| ExchangeError::Other("no withdraw address configured".to_owned()))?;

        validate_address(address)?;

        Ok(address.to_owned())
    }
}

/// 메인넷 주소의 최소 구문 검증.
/// 체크섬 검증은 하지 않는다. 오타로 인한 자금 손실을 전부 막으려는 것이
/// 아니라 빈 값이나 명백히 다른 체인의 주소를 거르는 수준이다.
pub fn validate_address(address: &str) -> Result<(), ExchangeError> {
    if address.is_empty() {
        return Err(ExchangeError::Other(
            "configured address cannot be empty".to_owned(),
        ));
    }

    let known_prefix =
        address.starts_with("bc1") || address.starts_with('1') || address.starts_with('3');
    if !known_prefix {
        return Err(ExchangeError::Other(format!(
            "address '{}' does not look like a mainnet Bitcoin address",
            address
        )));
    }

    if address.len() < 26 || address.len() > 90 {
        return Err(ExchangeError::Other(format!(
            "address '{}' has an implausible length",
            address
        )));
    }

    Ok(())
}
