//! 设备控制面板前端的数据核心
//!
//! 两部分：JSON Schema 驱动的表单模型（引用解析、联合分支推断、默认值、
//! 整树校验、字段计划），以及虚拟列表用的文件树模型（展开/扁平化、
//! 面包屑、上传中条目的乐观合并）。全部为同步纯函数加显式状态对象。

pub mod model;
pub mod utils;
pub mod vm;

// 重新导出主要类型
pub use model::document::{BranchSelections, FieldPath, PathSegment};
pub use model::error::PanelError;
pub use model::explorer::ExplorerState;
pub use model::form::FormSession;
pub use model::schema::SchemaDefs;
pub use model::tree::{ExpandedNodes, FileEntry, FlatRow};
pub use model::validation::{validate_all, ErrorTree};
pub use vm::field_plan::{FieldPlan, FieldView};
pub use vm::rows::RowView;
