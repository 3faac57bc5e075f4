use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

/// 报文分类。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// 常规定位/姿态数据（默认）
    #[default]
    Position,
    /// 事件标记（event number 或包含 event/mark 关键字）
    Event,
    /// 记录开关状态（logging + start/stop/on/off）
    LoggingStatus,
}

/// 一行 UDO 报文解码后的记录。
///
/// 所有字段均可选：单行报文很少填满全部字段。
/// 记录交给订阅者后不再被解析器修改。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecodedRecord {
    /// 原始报文行（不含行结束符）
    pub raw: String,
    /// 接收时间戳（毫秒）
    pub received_at_ms: i64,
    /// 报文分类
    pub kind: MessageKind,

    pub time: Option<NaiveTime>,
    pub date: Option<NaiveDate>,
    pub event_number: Option<u32>,
    pub event_text: Option<String>,
    pub logging_active: Option<bool>,

    /// 平面坐标
    pub easting: Option<f64>,
    pub northing: Option<f64>,

    /// 地理坐标
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub height: Option<f64>,

    /// 路由里程：KP、沿线距离（DAL）、偏离中心线距离（DCC）
    pub kp: Option<f64>,
    pub along_track: Option<f64>,
    pub cross_track: Option<f64>,

    /// 姿态
    pub heading: Option<f64>,
    pub roll: Option<f64>,
    pub pitch: Option<f64>,
    pub heave: Option<f64>,

    /// 辅助通道
    pub aux1: Option<f64>,
    pub aux2: Option<f64>,

    pub quality: Option<i32>,
    pub age: Option<f64>,
}

impl DecodedRecord {
    /// 以原始行与接收时间创建空记录。
    pub fn new(raw: impl Into<String>, received_at_ms: i64) -> Self {
        Self {
            raw: raw.into(),
            received_at_ms,
            ..Self::default()
        }
    }

    /// 是否包含平面坐标（东坐标与北坐标均存在）。
    pub fn has_planar_position(&self) -> bool {
        self.easting.is_some() && self.northing.is_some()
    }

    /// 是否包含地理坐标（纬度与经度均存在）。
    pub fn has_geographic_position(&self) -> bool {
        self.latitude.is_some() && self.longitude.is_some()
    }
}
