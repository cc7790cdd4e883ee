pub mod config;
pub mod event;
pub mod factory;
pub mod logger;
pub mod provider;
pub mod repository;
pub mod service;

use std::sync::Once;

static INIT: Once = Once::new();

/// 라이브러리 초기화 (.env 파일에서 환경 변수 로드)
fn init() {
    INIT.call_once(|| {
        dotenv::dotenv().ok();
    });
}

// 라이브러리 로드 시 자동으로 초기화
#[ctor::ctor]
fn setup() {
    init();
}
