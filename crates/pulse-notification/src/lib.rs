//! # Pulse Notification
//!
//! 거래 라이프사이클 운영자 알림.
//!
//! 지원 채널:
//! - Telegram
//!
//! 알림 실패는 로그로만 남고 거래 코어로 전파되지 않습니다.

pub mod dispatcher;
pub mod telegram;
pub mod types;

pub use dispatcher::*;
pub use telegram::*;
pub use types::*;
