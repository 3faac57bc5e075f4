//! 自动识别模式
//!
//! 字段从左到右依次匹配 [`AutoRule::ORDER`] 中的规则，首个命中的规则生效，
//! 已填充的字段不会被覆盖。没有规则命中的字段被忽略。

use super::time::{parse_date, parse_datetime, parse_time};
use crate::settings::AutoDetectThresholds;
use domain::DecodedRecord;

/// 单个字段的预解析结果。
#[derive(Debug, Clone, Copy)]
pub struct Token<'a> {
    pub text: &'a str,
    pub number: Option<f64>,
    /// 文本为整数（无小数部分）时的值
    pub integer: Option<i64>,
    /// 小数位数
    pub decimals: usize,
}

impl<'a> Token<'a> {
    pub fn new(text: &'a str) -> Self {
        let number = text.parse::<f64>().ok().filter(|value| value.is_finite());
        let integer = text.parse::<i64>().ok();
        let decimals = match (number, text.split_once('.')) {
            (Some(_), Some((_, fraction))) => {
                fraction.chars().take_while(char::is_ascii_digit).count()
            }
            _ => 0,
        };
        Self {
            text,
            number,
            integer,
            decimals,
        }
    }
}

/// 自动识别规则（按优先级排列）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoRule {
    /// 区间 (0, event_max) 内的整数 → 事件号
    EventNumber,
    /// 绝对值大于 planar_min → 东坐标、北坐标
    Planar,
    /// 绝对值不超过 geographic_max 且具有度级精度 → 纬度、经度
    Geographic,
    /// [0, heading_max] → 航向
    Heading,
    /// 绝对值不超过 attitude_max → 横摇、纵摇、升沉
    Attitude,
    /// 其余 [-chainage_max, chainage_max] 的数值 → KP、偏离距离
    Chainage,
    Time,
    /// 日期（或同时包含日期与时间的字段）
    Date,
}

impl AutoRule {
    pub const ORDER: [AutoRule; 8] = [
        AutoRule::EventNumber,
        AutoRule::Planar,
        AutoRule::Geographic,
        AutoRule::Heading,
        AutoRule::Attitude,
        AutoRule::Chainage,
        AutoRule::Time,
        AutoRule::Date,
    ];

    /// 尝试将字段写入记录，命中返回 `true`。
    pub fn try_apply(
        self,
        token: &Token<'_>,
        record: &mut DecodedRecord,
        thresholds: &AutoDetectThresholds,
    ) -> bool {
        match self {
            Self::EventNumber => match token.integer {
                Some(value)
                    if record.event_number.is_none()
                        && value > 0
                        && value < thresholds.event_max =>
                {
                    record.event_number = u32::try_from(value).ok();
                    record.event_number.is_some()
                }
                _ => false,
            },
            Self::Planar => match token.number {
                Some(value) if value.abs() > thresholds.planar_min => {
                    fill_first(&mut [&mut record.easting, &mut record.northing], value)
                }
                _ => false,
            },
            Self::Geographic => match token.number {
                Some(value)
                    if value.abs() <= thresholds.geographic_max
                        && token.decimals >= thresholds.geographic_min_decimals =>
                {
                    fill_first(&mut [&mut record.latitude, &mut record.longitude], value)
                }
                _ => false,
            },
            Self::Heading => match token.number {
                Some(value)
                    if record.heading.is_none()
                        && (0.0..=thresholds.heading_max).contains(&value) =>
                {
                    record.heading = Some(value);
                    true
                }
                _ => false,
            },
            Self::Attitude => match token.number {
                Some(value) if value.abs() <= thresholds.attitude_max => fill_first(
                    &mut [&mut record.roll, &mut record.pitch, &mut record.heave],
                    value,
                ),
                _ => false,
            },
            Self::Chainage => match token.number {
                Some(value) if value.abs() <= thresholds.chainage_max => {
                    fill_first(&mut [&mut record.kp, &mut record.cross_track], value)
                }
                _ => false,
            },
            Self::Time => {
                if token.number.is_some() || record.time.is_some() {
                    return false;
                }
                match parse_time(token.text) {
                    Some(time) => {
                        record.time = Some(time);
                        true
                    }
                    None => false,
                }
            }
            Self::Date => {
                if token.number.is_some() {
                    return false;
                }
                if record.date.is_none() {
                    if let Some(date) = parse_date(token.text) {
                        record.date = Some(date);
                        return true;
                    }
                }
                match parse_datetime(token.text) {
                    Some(datetime) if record.date.is_none() || record.time.is_none() => {
                        if record.date.is_none() {
                            record.date = Some(datetime.date());
                        }
                        if record.time.is_none() {
                            record.time = Some(datetime.time());
                        }
                        true
                    }
                    _ => false,
                }
            }
        }
    }
}

/// 填充第一个空槽位；全部已填充返回 `false`。
fn fill_first(slots: &mut [&mut Option<f64>], value: f64) -> bool {
    for slot in slots.iter_mut() {
        if slot.is_none() {
            **slot = Some(value);
            return true;
        }
    }
    false
}

/// 对一行的所有字段运行规则表。
pub fn apply(fields: &[&str], record: &mut DecodedRecord, thresholds: &AutoDetectThresholds) {
    for field in fields.iter().filter(|field| !field.is_empty()) {
        let token = Token::new(field);
        for rule in AutoRule::ORDER {
            if rule.try_apply(&token, record, thresholds) {
                break;
            }
        }
    }
}
