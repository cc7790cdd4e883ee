use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::PathBuf;

use tracing::warn;

/// 태그 → 정수 저장소. 매수/출금 리스너가 태그별 누적 잔고를 기록하는 데 쓴다.
///
/// read-modify-write가 원자적이지 않으므로 동시 실행 간 경합은 보장하지
/// 않는다. 한 번에 하나의 명령만 실행하는 도구라는 전제를 따른다.
pub trait TaggedIntegerRepository: Send + Sync {
    fn get(&self, tag: &str) -> i64;
    fn set(&self, tag: &str, value: i64) -> io::Result<()>;
    fn increase(&self, tag: &str, value: i64) -> io::Result<()>;
    fn decrease(&self, tag: &str, value: i64) -> io::Result<()>;
}

/// JSON 파일 기반 구현. 파일이 없거나 손상되면 빈 저장소로 읽는다.
pub struct JsonFileTaggedIntegerRepository {
    path: PathBuf,
}

impl JsonFileTaggedIntegerRepository {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn read(&self) -> BTreeMap<String, i64> {
        let Ok(raw) = fs::read_to_string(&self.path) else {
            return BTreeMap::new();
        };

        match serde_json::from_str(&raw) {
            Ok(map) => map,
            Err(e) => {
                warn!("balance file is corrupt, treating as empty: {}", e);
                BTreeMap::new()
            }
        }
    }

    fn write(&self, data: &BTreeMap<String, i64>) -> io::Result<()> {
        let raw = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, raw)
    }
}

impl TaggedIntegerRepository for JsonFileTaggedIntegerRepository {
    fn get(&self, tag: &str) -> i64 {
        self.read().get(tag).copied().unwrap_or(0)
    }

    fn set(&self, tag: &str, value: i64) -> io::Result<()> {
        let mut data = self.read();
        data.insert(tag.to_owned(), value);
        self.write(&data)
    }

    fn increase(&self, tag: &str, value: i64) -> io::Result<()> {
        let mut data = self.read();
        *data.entry(tag.to_owned()).or_insert(0) += value;
        self.write(&data)
    }

    fn decrease(&self, tag: &str, value: i64) -> io::Result<()> {
        let mut data = self.read();
        *data.entry(tag.to_owned()).or_insert(0) -= value;
        self.write(&data)
    }
}
