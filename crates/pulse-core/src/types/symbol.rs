//! 선물 심볼 정의.
//!
//! 거래소에 전달되는 형식(`BTCUSDT`)으로 정규화된 심볼 타입을 제공합니다.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{SignalError, SignalResult};

/// 심볼 뒤에 붙어 있으면 호가 자산으로 간주하는 접미사.
pub const KNOWN_QUOTES: [&str; 3] = ["USDT", "BUSD", "USDC"];

/// 기본 호가 자산.
pub const DEFAULT_QUOTE: &str = "USDT";

const MIN_LEN: usize = 5;
const MAX_LEN: usize = 20;

/// 정규화된 선물 심볼 (예: `BTCUSDT`).
///
/// 생성은 [`Symbol::parse`]를 통해서만 가능하므로 항상 유효한 형식을 보장합니다.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    /// 코인 이름이나 페어 문자열을 파싱해 심볼을 만듭니다.
    ///
    /// - 대문자로 변환하고 `/` 구분자를 제거합니다 (`btc/usdt` → `BTCUSDT`).
    /// - 알려진 호가 자산으로 끝나지 않으면 `USDT`를 붙입니다 (`ETH` → `ETHUSDT`).
    /// - 결과는 5~20자의 ASCII 영숫자여야 합니다.
    pub fn parse(raw: &str) -> SignalResult<Self> {
        let cleaned: String = raw
            .trim()
            .chars()
            .filter(|c| *c != '/')
            .collect::<String>()
            .to_ascii_uppercase();

        if cleaned.is_empty() || cleaned == "NA" {
            return Err(SignalError::InvalidSymbol(raw.to_string()));
        }

        if !cleaned.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(SignalError::InvalidSymbol(raw.to_string()));
        }

        let has_quote = KNOWN_QUOTES
            .iter()
            .any(|q| cleaned.ends_with(q) && cleaned.len() > q.len());

        let normalized = if has_quote {
            cleaned
        } else {
            format!("{}{}", cleaned, DEFAULT_QUOTE)
        };

        if !(MIN_LEN..=MAX_LEN).contains(&normalized.len()) {
            return Err(SignalError::InvalidSymbol(raw.to_string()));
        }

        Ok(Self(normalized))
    }

    /// 거래소 형식 문자열을 반환합니다.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 호가 자산을 제외한 기준 자산을 반환합니다.
    pub fn base(&self) -> &str {
        KNOWN_QUOTES
            .iter()
            .find_map(|q| self.0.strip_suffix(q))
            .unwrap_or(&self.0)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Symbol {
    type Error = SignalError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Symbol::parse(&value)
    }
}

impl From<Symbol> for String {
    fn from(symbol: Symbol) -> Self {
        symbol.0
    }
}

impl std::str::FromStr for Symbol {
    type Err = SignalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Symbol::parse(s)
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
