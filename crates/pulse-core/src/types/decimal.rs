//! 정밀한 금융 계산을 위한 Decimal 유틸리티.

use rust_decimal::{Decimal, RoundingStrategy};

/// 금융 정밀도를 위한 가격 타입.
pub type Price = Decimal;

/// 주문 수량을 위한 타입.
pub type Quantity = Decimal;

/// Decimal 연산을 위한 확장 트레이트.
pub trait DecimalExt {
    /// 지정된 소수점 자릿수로 내림합니다 (0 방향 절삭).
    fn floor_dp(&self, dp: u32) -> Decimal;

    /// 부호를 포함한 표시용 문자열 (예: "+50.00", "-3.10").
    fn to_signed_string(&self, dp: u32) -> String;
}

impl DecimalExt for Decimal {
    fn floor_dp(&self, dp: u32) -> Decimal {
        self.round_dp_with_strategy(dp, RoundingStrategy::ToZero)
    }

    fn to_signed_string(&self, dp: u32) -> String {
        let rounded = self.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero);
        if rounded.is_sign_negative() && !rounded.is_zero() {
            format!("{:.*}", dp as usize, rounded)
        } else {
            format!("+{:.*}", dp as usize, rounded)
        }
    }
}
