//! CLI 명령어 구현 모듈.

pub mod parse;
pub mod report;
pub mod run;
