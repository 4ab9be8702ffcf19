//! TOTP(RFC 6238) 일회용 코드 생성.
//!
//! SmartAPI 로그인은 인증 앱과 같은 6자리 TOTP를 요구합니다.
//! HMAC-SHA1, 30초 주기, base32 비밀키를 사용합니다.

use chrono::{DateTime, Utc};
use data_encoding::BASE32_NOPAD;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha1::Sha1;

use crate::{BrokerError, BrokerResult};

type HmacSha1 = Hmac<Sha1>;

/// TOTP 주기 (초).
const TIME_STEP_SECS: i64 = 30;

/// 코드 자릿수.
const DIGITS: u32 = 6;

/// TOTP 생성기.
///
/// 키를 넣은 HMAC 상태를 생성 시점에 만들어 두고 코드마다 복제합니다.
pub struct Totp {
    mac: HmacSha1,
}

impl Totp {
    /// base32 비밀키로 생성기를 만듭니다.
    ///
    /// # Errors
    /// 비밀키가 비었거나 base32가 아니면 `BrokerError::InvalidConfig`를 반환합니다.
    pub fn from_base32(secret: &SecretString) -> BrokerResult<Self> {
        let key = decode_base32(secret.expose_secret())?;
        if key.is_empty() {
            return Err(BrokerError::InvalidConfig("TOTP 비밀키가 비어 있습니다".to_string()));
        }
        let mac = HmacSha1::new_from_slice(&key)
            .map_err(|e| BrokerError::InvalidConfig(format!("TOTP 키 설정 실패: {}", e)))?;
        Ok(Self { mac })
    }

    /// 현재 시각의 코드.
    pub fn now(&self) -> String {
        self.at(Utc::now())
    }

    /// 주어진 시각의 코드.
    pub fn at(&self, time: DateTime<Utc>) -> String {
        let counter = time.timestamp().div_euclid(TIME_STEP_SECS) as u64;
        self.generate(counter)
    }

    fn generate(&self, counter: u64) -> String {
        let mut mac = self.mac.clone();
        mac.update(&counter.to_be_bytes());
        let hash = mac.finalize().into_bytes();

        let offset = (hash[hash.len() - 1] & 0x0f) as usize;
        let binary = ((hash[offset] as u32 & 0x7f) << 24)
            | ((hash[offset + 1] as u32) << 16)
            | ((hash[offset + 2] as u32) << 8)
            | (hash[offset + 3] as u32);

        let code = binary % 10u32.pow(DIGITS);
        format!("{:0width$}", code, width = DIGITS as usize)
    }
}

/// 인증 앱 형식의 base32 비밀키 디코딩 (대소문자, 공백, 하이픈, 패딩 무시).
fn decode_base32(input: &str) -> BrokerResult<Vec<u8>> {
    let normalized: String = input
        .chars()
        .filter(|c| !(c.is_whitespace() || *c == '-' || *c == '='))
        .map(|c| c.to_ascii_uppercase())
        .collect();

    BASE32_NOPAD.decode(normalized.as_bytes()).map_err(|e| {
        BrokerError::InvalidConfig(format!("TOTP 비밀키가 올바른 base32가 아닙니다: {}", e))
    })
}
