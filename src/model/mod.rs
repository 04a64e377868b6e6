//! 数据层：schema 解析、模型读写、校验，以及文件树状态

pub mod defaults;
pub mod document;
pub mod error;
pub mod explorer;
pub mod form;
pub mod listing;
pub mod performance;
pub mod schema;
pub mod tree;
pub mod union;
pub mod upload;
pub mod validation;
