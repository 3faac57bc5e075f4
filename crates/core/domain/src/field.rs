//! 显式字段映射使用的字段类型标签。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 字段标签解析错误。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldTagError {
    #[error("unknown field tag: {0}")]
    Unknown(String),
}

/// 一列 UDO 字段的类型。
///
/// 映射模式下，第 N 个标签决定第 N 列写入哪个记录字段。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldTag {
    Time,
    Date,
    /// 事件号；非数字时退化为事件文本
    Event,
    LoggingActive,
    Easting,
    Northing,
    Latitude,
    Longitude,
    Height,
    Kp,
    AlongTrack,
    CrossTrack,
    Heading,
    Roll,
    Pitch,
    Heave,
    Aux1,
    Aux2,
    Quality,
    Age,
    /// 忽略该列
    Skip,
}

impl FieldTag {
    /// 标签的规范名称（与 serde 名称一致）。
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Time => "time",
            Self::Date => "date",
            Self::Event => "event",
            Self::LoggingActive => "logging_active",
            Self::Easting => "easting",
            Self::Northing => "northing",
            Self::Latitude => "latitude",
            Self::Longitude => "longitude",
            Self::Height => "height",
            Self::Kp => "kp",
            Self::AlongTrack => "along_track",
            Self::CrossTrack => "cross_track",
            Self::Heading => "heading",
            Self::Roll => "roll",
            Self::Pitch => "pitch",
            Self::Heave => "heave",
            Self::Aux1 => "aux1",
            Self::Aux2 => "aux2",
            Self::Quality => "quality",
            Self::Age => "age",
            Self::Skip => "skip",
        }
    }

    /// 是否为数值字段。
    pub fn is_numeric(&self) -> bool {
        !matches!(
            self,
            Self::Time | Self::Date | Self::Event | Self::LoggingActive | Self::Skip
        )
    }

    /// 解析逗号分隔的标签列表（如 `event,easting,northing,time`）。
    pub fn parse_list(value: &str) -> Result<Vec<FieldTag>, FieldTagError> {
        value
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::parse)
            .collect()
    }
}

impl fmt::Display for FieldTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldTag {
    type Err = FieldTagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        let tag = match normalized.as_str() {
            "time" => Self::Time,
            "date" => Self::Date,
            "event" | "event_number" | "eventnumber" => Self::Event,
            "logging" | "logging_active" | "log" => Self::LoggingActive,
            "easting" | "e" | "x" => Self::Easting,
            "northing" | "n" | "y" => Self::Northing,
            "latitude" | "lat" => Self::Latitude,
            "longitude" | "lon" | "long" => Self::Longitude,
            "height" | "h" | "z" => Self::Height,
            "kp" => Self::Kp,
            "along_track" | "dal" => Self::AlongTrack,
            "cross_track" | "dcc" => Self::CrossTrack,
            "heading" | "hdg" | "gyro" => Self::Heading,
            "roll" => Self::Roll,
            "pitch" => Self::Pitch,
            "heave" => Self::Heave,
            "aux1" => Self::Aux1,
            "aux2" => Self::Aux2,
            "quality" | "qual" => Self::Quality,
            "age" => Self::Age,
            "skip" | "ignore" | "_" => Self::Skip,
            _ => return Err(FieldTagError::Unknown(s.trim().to_string())),
        };
        Ok(tag)
    }
}
