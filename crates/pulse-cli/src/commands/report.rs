//! 저장된 통계 리포트.

use anyhow::{Context, Result};
use pulse_core::AppConfig;
use pulse_stats::{JsonFilePersister, StatsPersister, StatsReport};

/// 영속화된 통계를 읽어 두 개의 표로 출력합니다.
pub async fn run(config: &AppConfig) -> Result<()> {
    let persister = JsonFilePersister::new(&config.storage.pnl_path, &config.storage.stats_path);
    let snapshot = persister
        .load()
        .await
        .with_context(|| format!("통계 로드 실패: {}", persister.stats_path().display()))?;

    let report = StatsReport::new(config.origins.clone());
    println!("{}", report.render_channels(&snapshot.channels));
    println!();
    println!("{}", report.render_global(&snapshot.global));
    Ok(())
}
