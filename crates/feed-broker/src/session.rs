//! 제공자 세션 수명 주기.
//!
//! 한 번의 수집 실행은 세션 하나를 열고, 끝나면 (성공이든 실패든) 닫습니다.
//! 로그인 실패는 재시도하지 않고 즉시 `IngestError::Auth`로 보고합니다.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use feed_core::{IngestError, IngestResult};
use secrecy::{ExposeSecret, SecretString};
use tracing::{info, warn};

use crate::totp::Totp;
use crate::traits::HistoricalDataProvider;
use crate::BrokerError;

/// 일회용 코드 공급 방식.
#[derive(Debug)]
pub enum OtpSource {
    /// base32 TOTP 비밀키로 로그인 시점에 코드 생성
    Totp(SecretString),
    /// 이미 발급된 6자리 코드
    Static(SecretString),
}

/// 로그인 자격증명.
///
/// 값은 모두 외부(환경변수, `.env`)에서 주입됩니다.
#[derive(Debug)]
pub struct Credentials {
    /// 클라이언트 코드
    pub client_code: String,
    /// 로그인 PIN
    pub pin: SecretString,
    /// 일회용 코드 공급 방식
    pub otp: OtpSource,
}

impl Credentials {
    /// 새 자격증명 생성.
    pub fn new(client_code: impl Into<String>, pin: SecretString, otp: OtpSource) -> Self {
        Self {
            client_code: client_code.into(),
            pin,
            otp,
        }
    }

    /// 지금 사용할 일회용 코드.
    fn current_otp(&self) -> IngestResult<String> {
        match &self.otp {
            OtpSource::Totp(secret) => Totp::from_base32(secret)
                .map(|totp| totp.now())
                .map_err(|e| IngestError::Config(e.to_string())),
            OtpSource::Static(code) => Ok(code.expose_secret().to_string()),
        }
    }
}

/// 열린 세션.
#[derive(Debug)]
pub struct Session {
    client_code: String,
    jwt: SecretString,
    opened_at: DateTime<Utc>,
}

impl Session {
    /// 클라이언트 코드.
    pub fn client_code(&self) -> &str {
        &self.client_code
    }

    /// API 호출용 JWT.
    pub fn jwt(&self) -> &SecretString {
        &self.jwt
    }

    /// 세션을 연 시각.
    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }
}

/// 제공자 세션 관리자.
#[derive(Clone)]
pub struct ProviderSession {
    provider: Arc<dyn HistoricalDataProvider>,
}

impl ProviderSession {
    /// 새 세션 관리자 생성.
    pub fn new(provider: Arc<dyn HistoricalDataProvider>) -> Self {
        Self { provider }
    }

    /// 내부 제공자.
    pub fn provider(&self) -> &Arc<dyn HistoricalDataProvider> {
        &self.provider
    }

    /// 2단계 인증 로그인으로 세션을 엽니다.
    ///
    /// # Errors
    /// - 잘못된 자격증명/OTP: `IngestError::Auth`
    /// - 연결 실패/타임아웃: `IngestError::Network`
    /// - 잘못된 TOTP 비밀키: `IngestError::Config`
    pub async fn open(&self, credentials: &Credentials) -> IngestResult<Session> {
        let otp = credentials.current_otp()?;

        let grant = self
            .provider
            .login(&credentials.client_code, &credentials.pin, &otp)
            .await
            .map_err(login_error)?;

        info!(
            provider = self.provider.name(),
            client = %credentials.client_code,
            "Provider session opened"
        );

        Ok(Session {
            client_code: credentials.client_code.clone(),
            jwt: grant.jwt_token,
            opened_at: Utc::now(),
        })
    }

    /// 세션을 닫습니다.
    ///
    /// 실패해도 경고만 남기고 반환합니다.
    pub async fn close(&self, session: Session) {
        match self
            .provider
            .logout(&session.jwt, &session.client_code)
            .await
        {
            Ok(()) => info!(
                provider = self.provider.name(),
                client = %session.client_code,
                "Provider session closed"
            ),
            Err(e) => warn!(
                provider = self.provider.name(),
                client = %session.client_code,
                error = %e,
                "Failed to close provider session"
            ),
        }
    }

    /// 세션을 열고 닫힘이 보장되는 가드로 감쌉니다.
    ///
    /// # Errors
    /// `open`과 같습니다.
    pub async fn open_guarded(&self, credentials: &Credentials) -> IngestResult<SessionGuard> {
        let session = self.open(credentials).await?;
        Ok(SessionGuard {
            sessions: self.clone(),
            session,
            armed: true,
        })
    }
}

/// 닫힘이 보장되는 세션.
///
/// `close()` 없이 버려지면 (실행 future 취소, 패닉 등) 현재 tokio 런타임에 로그아웃을 예약합니다.
pub struct SessionGuard {
    sessions: ProviderSession,
    session: Session,
    armed: bool,
}

impl SessionGuard {
    /// 열린 세션.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// 세션을 닫습니다.
    pub async fn close(mut self) {
        let session = self.disarm();
        self.sessions.close(session).await;
    }

    fn disarm(&mut self) -> Session {
        self.armed = false;
        let placeholder = Session {
            client_code: String::new(),
            jwt: SecretString::new(String::new().into()),
            opened_at: self.session.opened_at,
        };
        std::mem::replace(&mut self.session, placeholder)
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let session = self.disarm();

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!(
                    client = %session.client_code,
                    "Session dropped without close, scheduling logout"
                );
                let sessions = self.sessions.clone();
                handle.spawn(async move { sessions.close(session).await });
            }
            Err(_) => warn!(
                client = %session.client_code,
                "Session dropped outside a runtime, logout skipped"
            ),
        }
    }
}

/// 로그인 에러를 파이프라인 에러로 변환.
fn login_error(err: BrokerError) -> IngestError {
    match err {
        BrokerError::NetworkError(_) | BrokerError::Timeout(_) | BrokerError::RateLimited(_) => {
            IngestError::Network(err.to_string())
        }
        BrokerError::InvalidConfig(_) => IngestError::Config(err.to_string()),
        _ => IngestError::Auth(err.to_string()),
    }
}
