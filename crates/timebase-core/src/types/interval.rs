//! 시계열 인터벌 정의.
//!
//! 프로바이더 프로토콜이 사용하는 인터벌 문자열(`1m`, `1h`, `1d`, `1wk` 등)을
//! 타입으로 표현합니다.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::CoreError;

/// 시계열 인터벌.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Interval {
    /// 1분
    #[serde(rename = "1m")]
    M1,
    /// 5분
    #[serde(rename = "5m")]
    M5,
    /// 15분
    #[serde(rename = "15m")]
    M15,
    /// 30분
    #[serde(rename = "30m")]
    M30,
    /// 1시간
    #[serde(rename = "1h")]
    H1,
    /// 4시간
    #[serde(rename = "4h")]
    H4,
    /// 일
    #[serde(rename = "1d")]
    D1,
    /// 주
    #[serde(rename = "1wk")]
    W1,
    /// 월
    #[serde(rename = "1mo")]
    MO1,
}

impl Interval {
    /// 지원되는 모든 인터벌.
    pub const ALL: [Interval; 9] = [
        Interval::M1,
        Interval::M5,
        Interval::M15,
        Interval::M30,
        Interval::H1,
        Interval::H4,
        Interval::D1,
        Interval::W1,
        Interval::MO1,
    ];

    /// 이 인터벌의 기간을 반환합니다.
    pub fn duration(&self) -> Duration {
        match self {
            Interval::M1 => Duration::from_secs(60),
            Interval::M5 => Duration::from_secs(5 * 60),
            Interval::M15 => Duration::from_secs(15 * 60),
            Interval::M30 => Duration::from_secs(30 * 60),
            Interval::H1 => Duration::from_secs(60 * 60),
            Interval::H4 => Duration::from_secs(4 * 60 * 60),
            Interval::D1 => Duration::from_secs(24 * 60 * 60),
            Interval::W1 => Duration::from_secs(7 * 24 * 60 * 60),
            Interval::MO1 => Duration::from_secs(30 * 24 * 60 * 60), // 근사값
        }
    }

    /// 프로토콜 문자열로 변환합니다.
    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::M1 => "1m",
            Interval::M5 => "5m",
            Interval::M15 => "15m",
            Interval::M30 => "30m",
            Interval::H1 => "1h",
            Interval::H4 => "4h",
            Interval::D1 => "1d",
            Interval::W1 => "1wk",
            Interval::MO1 => "1mo",
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Interval::ALL
            .iter()
            .copied()
            .find(|interval| interval.as_str() == s)
            .ok_or_else(|| CoreError::InvalidInterval(s.to_string()))
    }
}
