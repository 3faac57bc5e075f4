use domain::{DecodedRecord, FieldTag, FieldTagError, MessageKind};

#[test]
fn field_tags_parse_names_and_aliases() {
    assert_eq!("Easting".parse::<FieldTag>(), Ok(FieldTag::Easting));
    assert_eq!("dcc".parse::<FieldTag>(), Ok(FieldTag::CrossTrack));
    assert_eq!("along-track".parse::<FieldTag>(), Ok(FieldTag::AlongTrack));
    assert_eq!(" event ".parse::<FieldTag>(), Ok(FieldTag::Event));
    assert_eq!(
        "speed".parse::<FieldTag>(),
        Err(FieldTagError::Unknown("speed".to_string()))
    );
}

#[test]
fn field_tag_list_keeps_column_order() {
    let tags = FieldTag::parse_list("event, easting,northing ,time").expect("tags");
    assert_eq!(
        tags,
        vec![
            FieldTag::Event,
            FieldTag::Easting,
            FieldTag::Northing,
            FieldTag::Time
        ]
    );
    assert!(FieldTag::parse_list("event,bogus").is_err());
}

#[test]
fn field_tag_display_matches_serde_name() {
    for tag in [FieldTag::LoggingActive, FieldTag::Kp, FieldTag::Aux2] {
        let json = serde_json::to_string(&tag).expect("json");
        assert_eq!(json, format!("\"{}\"", tag));
    }
}

#[test]
fn record_serializes_kind_in_snake_case() {
    let mut record = DecodedRecord::new("LOG START", 1);
    record.kind = MessageKind::LoggingStatus;
    let json = serde_json::to_value(&record).expect("json");
    assert_eq!(json["kind"], "logging_status");
    assert_eq!(json["raw"], "LOG START");
}
