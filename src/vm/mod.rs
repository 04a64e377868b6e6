//! 视图模型：把数据层状态转换成视图层直接消费的结构

pub mod field_plan;
pub mod rows;
