//! Drill-hole section registry and sample data

use dh_model::{Aggregate, BlockingError, Record, SaveWarning};
use dh_store::{FnValidator, SectionConfig, SectionKind, SectionRegistry};
use std::sync::Arc;

pub const COLLAR: &str = "collar";
pub const SURVEY: &str = "survey";
pub const GEOLOGY: &str = "geology";
pub const SAMPLE: &str = "sample";

/// Longest interval logged without a warning, in metres
pub const MAX_INTERVAL: f64 = 10.0;

pub fn record(value: serde_json::Value) -> Record {
    Record::from_value(value).expect("fixture records are objects")
}

/// HoleId is mandatory; a missing azimuth only warns
pub fn collar_validators() -> FnValidator {
    FnValidator::new(
        |row| match row.text("HoleId") {
            Some(hole) if !hole.trim().is_empty() => Vec::new(),
            _ => vec![BlockingError::new("HoleId", "hole id is required", "REQUIRED")],
        },
        |row| {
            if row.number("Azimuth").is_some() {
                Vec::new()
            } else {
                vec![SaveWarning::new("Azimuth", "collar azimuth not recorded", "MISSING_AZIMUTH")]
            }
        },
    )
}

/// Depth is mandatory and dip must be a real angle
pub fn survey_validators() -> FnValidator {
    FnValidator::new(
        |row| {
            let mut errors = Vec::new();
            match row.number("Depth") {
                Some(depth) if depth >= 0.0 => {}
                _ => errors.push(BlockingError::new("Depth", "depth must be zero or more", "REQUIRED")),
            }
            if row.number("Dip").is_some_and(|dip| !(-90.0..=90.0).contains(&dip)) {
                errors.push(BlockingError::new("Dip", "dip must lie within ±90°", "DIP_RANGE"));
            }
            errors
        },
        |row| {
            if row.number("Azimuth").is_some() {
                Vec::new()
            } else {
                vec![SaveWarning::new("Azimuth", "survey azimuth not recorded", "MISSING_AZIMUTH")]
            }
        },
    )
}

/// DepthTo must exceed DepthFrom; long intervals only warn
pub fn interval_validators() -> FnValidator {
    FnValidator::new(
        |row| match (row.number("DepthFrom"), row.number("DepthTo")) {
            (Some(from), Some(to)) if to > from => Vec::new(),
            (None, _) => vec![BlockingError::new("DepthFrom", "interval start is required", "REQUIRED")],
            _ => vec![BlockingError::new("DepthTo", "DepthTo must be greater than DepthFrom", "DEPTH_ORDER")],
        },
        |row| match (row.number("DepthFrom"), row.number("DepthTo")) {
            (Some(from), Some(to)) if to - from > MAX_INTERVAL => vec![SaveWarning::new(
                "DepthTo",
                "interval longer than 10 m",
                "LONG_INTERVAL",
            )],
            _ => Vec::new(),
        },
    )
}

/// Collection section over depth intervals
pub fn interval_section(key: &str, id_field: &'static str) -> SectionConfig {
    SectionConfig::builder(
        key,
        SectionKind::Collection {
            id_field,
            order_by: Some("DepthFrom"),
        },
    )
    .label(key)
    .validators(interval_validators())
    .empty_record(|| record(serde_json::json!({"RowStatus": 0, "ActiveInd": true})))
    .build()
    .expect("interval section is complete")
}

/// Collar (required single), survey, geology and sample sections
pub fn registry() -> Arc<SectionRegistry> {
    let collar = SectionConfig::builder(COLLAR, SectionKind::Single { id_field: "CollarId" })
        .label("Collar")
        .required()
        .validators(collar_validators())
        .empty_record(|| record(serde_json::json!({"HoleId": "", "RowStatus": 0})))
        .build()
        .expect("collar section is complete");
    let survey = SectionConfig::builder(
        SURVEY,
        SectionKind::Collection {
            id_field: "SurveyId",
            order_by: Some("Depth"),
        },
    )
    .label("Downhole survey")
    .validators(survey_validators())
    .empty_record(|| record(serde_json::json!({"RowStatus": 0})))
    .build()
    .expect("survey section is complete");

    let registry = SectionRegistry::builder()
        .register(collar)
        .and_then(|b| b.register(survey))
        .and_then(|b| b.register(interval_section(GEOLOGY, "GeologyLogId")))
        .and_then(|b| b.register(interval_section(SAMPLE, "SampleId")))
        .expect("fixture keys are unique")
        .build();
    Arc::new(registry)
}

/// Registry with one geology section keyed on a plain `id` field
pub fn plain_id_registry() -> Arc<SectionRegistry> {
    let registry = SectionRegistry::builder()
        .register(interval_section(GEOLOGY, "id"))
        .expect("single entry")
        .build();
    Arc::new(registry)
}

/// A clean, valid hole; survey rows are stored out of depth order
pub fn hole(id: &str) -> Aggregate {
    Aggregate::new(id)
        .with_section(
            COLLAR,
            vec![record(serde_json::json!({
                "CollarId": "C-1", "DrillHoleId": id, "HoleId": "DH-001",
                "Azimuth": 45, "Dip": -60, "RowStatus": 0
            }))],
        )
        .with_section(
            SURVEY,
            vec![
                record(serde_json::json!({
                    "SurveyId": "SV-2", "DrillHoleId": id, "Depth": 50, "Azimuth": 46, "Dip": -59, "RowStatus": 0
                })),
                record(serde_json::json!({
                    "SurveyId": "SV-1", "DrillHoleId": id, "Depth": 0, "Azimuth": 45, "Dip": -60, "RowStatus": 0
                })),
            ],
        )
        .with_section(
            GEOLOGY,
            vec![
                record(serde_json::json!({
                    "GeologyLogId": "GL-1", "DrillHoleId": id, "DepthFrom": 0, "DepthTo": 4,
                    "Lithology": "OVB", "ActiveInd": true, "RowStatus": 0
                })),
                record(serde_json::json!({
                    "GeologyLogId": "GL-2", "DrillHoleId": id, "DepthFrom": 4, "DepthTo": 9,
                    "Lithology": "BSLT", "ActiveInd": true, "RowStatus": 0
                })),
            ],
        )
        .with_section(
            SAMPLE,
            vec![record(serde_json::json!({
                "SampleId": "SA-1", "DrillHoleId": id, "DepthFrom": 0, "DepthTo": 1, "ActiveInd": true, "RowStatus": 0
            }))],
        )
}

/// A hole with no collar record yet
pub fn hole_without_collar(id: &str) -> Aggregate {
    let mut aggregate = hole(id);
    aggregate.sections.remove(&dh_model::SectionKey::new(COLLAR));
    aggregate
}
