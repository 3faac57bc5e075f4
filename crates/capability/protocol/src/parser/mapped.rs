//! 显式映射模式
//!
//! 第 N 列始终写入第 N 个标签对应的字段，与其他列的取值或缺失无关。
//! 多余的列被忽略，缺失的列保持未设置。

use super::ParseWarning;
use super::time::{format_date, format_time, parse_date, parse_time};
use domain::{DecodedRecord, FieldTag};

/// 按映射写入记录，返回无法解析的字段告警。
pub fn apply(fields: &[&str], mapping: &[FieldTag], record: &mut DecodedRecord) -> Vec<ParseWarning> {
    let mut warnings = Vec::new();

    for (column, (tag, value)) in mapping.iter().zip(fields.iter()).enumerate() {
        if value.is_empty() || *tag == FieldTag::Skip {
            continue;
        }
        if let Err(reason) = assign(*tag, value, record) {
            warnings.push(ParseWarning {
                column,
                tag: Some(*tag),
                value: value.to_string(),
                reason,
            });
        }
    }

    warnings
}

fn assign(tag: FieldTag, value: &str, record: &mut DecodedRecord) -> Result<(), &'static str> {
    match tag {
        FieldTag::Time => {
            record.time = Some(parse_time(value).ok_or("unparsable time")?);
            Ok(())
        }
        FieldTag::Date => {
            record.date = Some(parse_date(value).ok_or("unparsable date")?);
            Ok(())
        }
        FieldTag::Event => {
            match value.parse::<u32>() {
                Ok(number) => record.event_number = Some(number),
                Err(_) => record.event_text = Some(value.to_string()),
            }
            Ok(())
        }
        FieldTag::LoggingActive => {
            record.logging_active = Some(parse_flag(value).ok_or("unparsable logging flag")?);
            Ok(())
        }
        FieldTag::Quality => {
            let quality = value
                .parse::<i32>()
                .ok()
                .or_else(|| parse_number(value).map(|number| number.round() as i32))
                .ok_or("unparsable quality")?;
            record.quality = Some(quality);
            Ok(())
        }
        numeric if numeric.is_numeric() => {
            let number = parse_number(value).ok_or("unparsable number")?;
            if let Some(slot) = numeric_slot(numeric, record) {
                *slot = Some(number);
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn numeric_slot(tag: FieldTag, record: &mut DecodedRecord) -> Option<&mut Option<f64>> {
    let slot = match tag {
        FieldTag::Easting => &mut record.easting,
        FieldTag::Northing => &mut record.northing,
        FieldTag::Latitude => &mut record.latitude,
        FieldTag::Longitude => &mut record.longitude,
        FieldTag::Height => &mut record.height,
        FieldTag::Kp => &mut record.kp,
        FieldTag::AlongTrack => &mut record.along_track,
        FieldTag::CrossTrack => &mut record.cross_track,
        FieldTag::Heading => &mut record.heading,
        FieldTag::Roll => &mut record.roll,
        FieldTag::Pitch => &mut record.pitch,
        FieldTag::Heave => &mut record.heave,
        FieldTag::Aux1 => &mut record.aux1,
        FieldTag::Aux2 => &mut record.aux2,
        FieldTag::Age => &mut record.age,
        _ => return None,
    };
    Some(slot)
}

fn numeric_value(tag: FieldTag, record: &DecodedRecord) -> Option<f64> {
    match tag {
        FieldTag::Easting => record.easting,
        FieldTag::Northing => record.northing,
        FieldTag::Latitude => record.latitude,
        FieldTag::Longitude => record.longitude,
        FieldTag::Height => record.height,
        FieldTag::Kp => record.kp,
        FieldTag::AlongTrack => record.along_track,
        FieldTag::CrossTrack => record.cross_track,
        FieldTag::Heading => record.heading,
        FieldTag::Roll => record.roll,
        FieldTag::Pitch => record.pitch,
        FieldTag::Heave => record.heave,
        FieldTag::Aux1 => record.aux1,
        FieldTag::Aux2 => record.aux2,
        FieldTag::Age => record.age,
        _ => None,
    }
}

fn parse_number(value: &str) -> Option<f64> {
    value.parse::<f64>().ok().filter(|number| number.is_finite())
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" | "start" | "y" => Some(true),
        "0" | "false" | "off" | "no" | "stop" | "n" => Some(false),
        _ => None,
    }
}

/// 按映射顺序将记录渲染为一行分隔文本（不含行结束符）。
///
/// 未设置的字段渲染为空列。
pub fn render_line(record: &DecodedRecord, mapping: &[FieldTag], separator: char) -> String {
    let mut columns = Vec::with_capacity(mapping.len());

    for tag in mapping {
        let column = match tag {
            FieldTag::Skip => String::new(),
            FieldTag::Time => record.time.as_ref().map(format_time).unwrap_or_default(),
            FieldTag::Date => record.date.as_ref().map(format_date).unwrap_or_default(),
            FieldTag::Event => match (&record.event_number, &record.event_text) {
                (Some(number), _) => number.to_string(),
                (None, Some(text)) => text.clone(),
                (None, None) => String::new(),
            },
            FieldTag::LoggingActive => record
                .logging_active
                .map(|active| (if active { "1" } else { "0" }).to_string())
                .unwrap_or_default(),
            FieldTag::Quality => record
                .quality
                .map(|quality| quality.to_string())
                .unwrap_or_default(),
            numeric if numeric.is_numeric() => numeric_value(*numeric, record)
                .map(|number| number.to_string())
                .unwrap_or_default(),
            _ => String::new(),
        };
        columns.push(column);
    }

    columns.join(&separator.to_string())
}
