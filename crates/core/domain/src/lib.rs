//! UDO 接收链路共享的领域模型。
//!
//! - [`DecodedRecord`]：一行 UDO 报文解码后的结构化记录
//! - [`MessageKind`]：记录的报文分类（定位 / 事件 / 记录状态）
//! - [`FieldTag`]：显式字段映射中每一列的字段类型

pub mod field;
pub mod record;

pub use field::{FieldTag, FieldTagError};
pub use record::{DecodedRecord, MessageKind};
