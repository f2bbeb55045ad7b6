//! 메시지 파싱 확인.

use anyhow::Result;
use pulse_core::SentimentParser;

/// 텍스트를 파싱해 신호를 JSON 줄로 출력합니다.
pub fn run(text: &str, origin: &str, threshold: f64) -> Result<()> {
    let parser = SentimentParser::new(threshold);
    // 셸에서 넘긴 리터럴 "\n"도 줄바꿈으로 취급
    let text = text.replace("\\n", "\n");

    match parser.parse(&text, origin, None) {
        Ok(signals) => {
            for signal in &signals {
                println!("{}", serde_json::to_string(signal)?);
            }
            Ok(())
        }
        Err(e) if e.is_ignorable() => {
            println!("신호 없음: {}", e);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
