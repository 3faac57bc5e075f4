//! UDO 协议解析
//!
//! 两种互斥模式：
//! - **自动识别**：按有序规则表逐字段判断（见 [`auto_detect`]）
//! - **显式映射**：第 N 列按第 N 个 [`FieldTag`] 赋值（见 [`mapped`]）
//!
//! 解析完成后对记录做报文分类（[`classify`]）。解析与分类均为同步操作。

pub mod auto_detect;
pub mod mapped;
pub mod time;

use crate::settings::{AutoDetectThresholds, ConnectionSettings};
use domain::{DecodedRecord, FieldTag, MessageKind};
use std::fmt;

pub use auto_detect::AutoRule;
pub use mapped::render_line;

/// 解析模式
#[derive(Debug, Clone)]
pub enum ParserMode {
    AutoDetect(AutoDetectThresholds),
    Mapped(Vec<FieldTag>),
}

/// 单个字段的解析告警（记录仍然输出）。
#[derive(Debug, Clone, PartialEq)]
pub struct ParseWarning {
    /// 列序号（从 0 开始）
    pub column: usize,
    pub tag: Option<FieldTag>,
    pub value: String,
    pub reason: &'static str,
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.tag {
            Some(tag) => write!(
                f,
                "column {} ({}): {} {:?}",
                self.column, tag, self.reason, self.value
            ),
            None => write!(f, "column {}: {} {:?}", self.column, self.reason, self.value),
        }
    }
}

/// 一行的解析结果。
#[derive(Debug, Clone)]
pub struct ParsedLine {
    pub record: DecodedRecord,
    pub warnings: Vec<ParseWarning>,
}

/// UDO 协议解析器
#[derive(Debug, Clone)]
pub struct ProtocolParser {
    mode: ParserMode,
    separator: char,
}

impl ProtocolParser {
    pub fn new(mode: ParserMode, separator: char) -> Self {
        Self { mode, separator }
    }

    /// 按连接配置选择解析模式。
    pub fn from_settings(settings: &ConnectionSettings) -> Self {
        let mode = if settings.uses_auto_detect() {
            ParserMode::AutoDetect(settings.thresholds.clone())
        } else {
            ParserMode::Mapped(settings.field_mapping.clone())
        };
        Self::new(mode, settings.field_separator)
    }

    pub fn mode(&self) -> &ParserMode {
        &self.mode
    }

    /// 解析一行报文并分类。
    pub fn parse(&self, line: &str, received_at_ms: i64) -> ParsedLine {
        let line = line.trim_end_matches(['\r', '\n']);
        let mut record = DecodedRecord::new(line, received_at_ms);
        let fields: Vec<&str> = line.split(self.separator).map(str::trim).collect();

        let warnings = match &self.mode {
            ParserMode::AutoDetect(thresholds) => {
                auto_detect::apply(&fields, &mut record, thresholds);
                Vec::new()
            }
            ParserMode::Mapped(mapping) => mapped::apply(&fields, mapping, &mut record),
        };

        classify(&mut record);
        ParsedLine { record, warnings }
    }
}

const EVENT_KEYWORDS: [&str; 2] = ["event", "mark"];
const LOGGING_KEYWORD: &str = "log";
const LOGGING_ON: [&str; 2] = ["start", "on"];
const LOGGING_OFF: [&str; 2] = ["stop", "off"];

/// 报文分类：
/// - 有事件号或包含 event/mark 关键字 → Event
/// - 某个词以 log 开头，且另有完整的 start/stop/on/off 词 → LoggingStatus
/// - 其他 → Position
///
/// 记录状态按词匹配（以非字母数字字符切分），`LOG,position` 中的 "on" 不算开关词。
pub fn classify(record: &mut DecodedRecord) -> MessageKind {
    let lower = record.raw.to_ascii_lowercase();

    let kind = if record.event_number.is_some()
        || EVENT_KEYWORDS.iter().any(|keyword| lower.contains(keyword))
    {
        MessageKind::Event
    } else if words(&lower).any(|word| word.starts_with(LOGGING_KEYWORD)) {
        let off = words(&lower).any(|word| LOGGING_OFF.contains(&word));
        let on = words(&lower).any(|word| LOGGING_ON.contains(&word));
        if off || on {
            if record.logging_active.is_none() {
                record.logging_active = Some(!off);
            }
            MessageKind::LoggingStatus
        } else {
            MessageKind::Position
        }
    } else {
        MessageKind::Position
    };

    record.kind = kind;
    kind
}

fn words(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|word| !word.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn mapped(tags: &[FieldTag]) -> ProtocolParser {
        ProtocolParser::new(ParserMode::Mapped(tags.to_vec()), ',')
    }

    fn auto() -> ProtocolParser {
        ProtocolParser::new(ParserMode::AutoDetect(AutoDetectThresholds::default()), ',')
    }

    #[test]
    fn test_mapped_event_line() {
        let parser = mapped(&[
            FieldTag::Event,
            FieldTag::Easting,
            FieldTag::Northing,
            FieldTag::Time,
        ]);
        let parsed = parser.parse("1,523412.11,6234123.55,12:30:45.100", 7);
        let record = parsed.record;
        assert!(parsed.warnings.is_empty());
        assert_eq!(record.event_number, Some(1));
        assert_eq!(record.easting, Some(523412.11));
        assert_eq!(record.northing, Some(6234123.55));
        assert_eq!(
            record.time,
            NaiveTime::from_hms_milli_opt(12, 30, 45, 100)
        );
        assert_eq!(record.kind, MessageKind::Event);
        assert_eq!(record.received_at_ms, 7);
    }

    #[test]
    fn test_auto_detect_attitude_line() {
        let record = auto().parse("45.2,-12.3,1.1,95.233341,14:02:10", 0).record;
        assert_eq!(record.heading, Some(45.2));
        assert_eq!(record.roll, Some(-12.3));
        assert_eq!(record.pitch, Some(1.1));
        assert_eq!(record.heave, None);
        assert_eq!(record.time, NaiveTime::from_hms_opt(14, 2, 10));
        assert_eq!(record.event_number, None);
        assert_eq!(record.kind, MessageKind::Position);
    }

    #[test]
    fn test_classify_keywords() {
        let parser = auto();
        assert_eq!(parser.parse("MARK,12:00:00", 0).record.kind, MessageKind::Event);
        assert_eq!(parser.parse("Event fired", 0).record.kind, MessageKind::Event);

        let start = parser.parse("LOGGING START", 0).record;
        assert_eq!(start.kind, MessageKind::LoggingStatus);
        assert_eq!(start.logging_active, Some(true));

        let stop = parser.parse("logging,stop", 0).record;
        assert_eq!(stop.kind, MessageKind::LoggingStatus);
        assert_eq!(stop.logging_active, Some(false));

        assert_eq!(parser.parse("LOG", 0).record.kind, MessageKind::Position);
    }

    #[test]
    fn test_logging_keywords_match_whole_words() {
        let parser = auto();
        let record = parser.parse("LOG,position", 0).record;
        assert_eq!(record.kind, MessageKind::Position);
        assert_eq!(record.logging_active, None);
        assert_eq!(parser.parse("catalog on", 0).record.kind, MessageKind::Position);
        assert_eq!(parser.parse("LOG,stopped", 0).record.kind, MessageKind::Position);

        let on = parser.parse("Logging: ON", 0).record;
        assert_eq!(on.kind, MessageKind::LoggingStatus);
        assert_eq!(on.logging_active, Some(true));

        let off = parser.parse("log;off", 0).record;
        assert_eq!(off.kind, MessageKind::LoggingStatus);
        assert_eq!(off.logging_active, Some(false));
        assert_eq!(parser.parse("12.5,7.25", 0).record.kind, MessageKind::Position);
    }

    #[test]
    fn test_trailing_terminator_trimmed() {
        let record = auto().parse("LOG ON\r\n", 0).record;
        assert_eq!(record.raw, "LOG ON");
    }

    #[test]
    fn test_mode_from_settings() {
        let settings = ConnectionSettings::tcp(0);
        assert!(matches!(
            ProtocolParser::from_settings(&settings).mode(),
            ParserMode::AutoDetect(_)
        ));
        let settings = settings.with_mapping(vec![FieldTag::Kp]);
        assert!(matches!(
            ProtocolParser::from_settings(&settings).mode(),
            ParserMode::Mapped(tags) if tags == &vec![FieldTag::Kp]
        ));
    }
}
