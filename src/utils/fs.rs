//! IO helper: JSON documents on disk (schemas, models, listing snapshots)

use std::{fs::File, io::BufReader, path::Path};

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::model::error::PanelError;

/// 读取任意 JSON 文档
pub fn read_json_file(p: &Path) -> Result<Value, PanelError> {
    read_typed(p)
}

/// 读取并反序列化为具体类型（如列表响应）
pub fn read_typed<T: DeserializeOwned>(p: &Path) -> Result<T, PanelError> {
    let f = File::open(p)?;
    let rdr = BufReader::new(f);
    Ok(serde_json::from_reader(rdr)?)
}

/// 格式化写出
pub fn write_json_file<T: Serialize + ?Sized>(p: &Path, value: &T) -> Result<(), PanelError> {
    let f = File::create(p)?;
    serde_json::to_writer_pretty(f, value)?;
    tracing::debug!("已写出 JSON: {}", p.display());
    Ok(())
}
