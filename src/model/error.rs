//! 模型层错误类型
//!
//! 校验错误属于数据（见 `validation::ErrorTree`），不会走这里；
//! 这里只覆盖文件读写、解析和路径寻址这类真正的失败

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PanelError {
    #[error("IO失败: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON解析失败: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("路径错误: {0}")]
    Path(String),
    #[error("Schema错误: {0}")]
    Schema(String),
}
