use anyhow::Result;
use serde_json::json;
use std::path::Path;
use tempfile::tempdir;

use attendee_profiler::apis::create_orchestrator;
use attendee_profiler::config::Config;
use attendee_profiler::domain::{AttributeCategory, AttributeKey, IndividualRequirements};
use attendee_profiler::error::StoreError;
use attendee_profiler::CollectorStatus;

const PHOTO: &str = "6f1c3a52-9d1e-4c4e-8f5b-2b0a4f6f9a11";

fn write_json(dir: &Path, name: &str, value: serde_json::Value) -> Result<()> {
    std::fs::write(dir.join(name), serde_json::to_string_pretty(&value)?)?;
    Ok(())
}

fn write_fixture(dir: &Path) -> Result<()> {
    write_json(
        dir,
        "roster.json",
        json!([
            {"first_name": "Ann", "last_name": "Lee", "email": "Ann@Example.org", "show": "gala", "seat": "A1"},
            {"first_name": "Bo", "last_name": "Park", "email": "bo@example.org", "show": "gala"},
            {"first_name": "Cy", "last_name": "Moss", "email": "cy@example.org", "show": "matinee"}
        ]),
    )?;
    write_json(
        dir,
        "fb.json",
        json!([
            {"email": "ann@example.org", "attribute": "photo", "value": {"kind": "uuid", "value": PHOTO}, "reliability": 0.9},
            {"email": "bo@example.org", "attribute": "town", "value": {"kind": "text", "value": "Tacoma"}, "reliability": 0.4},
            {"email": "nobody@example.org", "attribute": "town", "value": {"kind": "text", "value": "Nowhere"}, "reliability": 0.4}
        ]),
    )?;
    write_json(
        dir,
        "tw.json",
        json!([
            {"email": "bo@example.org", "attribute": "photo", "value": {"kind": "uuid", "value": PHOTO}, "reliability": 0.3},
            {"email": "bo@example.org", "attribute": "photo", "value": {"kind": "text", "value": "not-a-uuid"}, "reliability": 0.9},
            {"email": "ann@example.org", "attribute": "age", "value": {"kind": "integer", "value": 34}, "reliability": 0.7}
        ]),
    )?;
    std::fs::write(
        dir.join("profiler.toml"),
        r#"
[session]
collector_timeout_secs = 5

[roster]
path = "roster.json"
show = "gala"

[[sources]]
namespace = "fb"
path = "fb.json"
attributes = { photo = "photo_reference", town = "hometown" }

[[sources]]
namespace = "tw"
path = "tw.json"
attributes = { photo = "photo_reference", age = "age" }

[[sources]]
namespace = "gone"
path = "missing.json"
attributes = { photo = "photo_reference" }

[requirements]
thresholds = { photo_reference = 0.5 }
"#,
    )?;
    Ok(())
}

#[tokio::test]
async fn test_session_from_config_files() -> Result<()> {
    let dir = tempdir()?;
    write_fixture(dir.path())?;
    let config = Config::load_from(dir.path().join("profiler.toml"))?;

    let mut orchestrator = create_orchestrator(&config)?;
    let report = orchestrator.run().await?;

    // Only the "gala" attendees are collected.
    let individuals = report.individuals();
    assert_eq!(individuals.len(), 2);
    assert_eq!(individuals[0].first_name, "Ann");
    assert_eq!(individuals[0].seat.as_deref(), Some("A1"));

    let primary = report.outcome("roster").unwrap();
    assert!(primary.status.is_success());
    assert_eq!(primary.written, 6);

    assert_eq!(report.outcome("fb").unwrap().written, 2);

    let tw = report.outcome("tw").unwrap();
    assert!(tw.status.is_success());
    assert_eq!(tw.written, 2);
    assert_eq!(tw.rejected.len(), 1);
    assert!(matches!(tw.rejected[0], StoreError::TypeMismatch { .. }));

    assert!(matches!(
        report.outcome("gone").unwrap().status,
        CollectorStatus::Failed(_)
    ));

    let bo = &individuals[1];
    let photos = bo.category_values(report.registry(), AttributeCategory::PhotoReference);
    assert_eq!(photos.len(), 1);
    assert_eq!(photos[0].reliability.get(), 0.3);
    let town: AttributeKey = "fb_town".parse()?;
    assert_eq!(bo.attributes[&town].value.to_string(), "Tacoma");
    Ok(())
}

#[tokio::test]
async fn test_configured_requirements_select_attendees() -> Result<()> {
    let dir = tempdir()?;
    write_fixture(dir.path())?;
    let config = Config::load_from(dir.path().join("profiler.toml"))?;

    let mut orchestrator = create_orchestrator(&config)?;
    let report = orchestrator.run().await?;

    let found = report.find_suitable(&config.requirements()?)?;
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].display_name(), "Ann Lee");

    let mut lenient = IndividualRequirements::new();
    lenient.require(AttributeCategory::PhotoReference, 0.3)?;
    assert_eq!(report.find_suitable(&lenient)?.len(), 2);

    let mut both = IndividualRequirements::new();
    both.require(AttributeCategory::PhotoReference, 0.3)?;
    both.require(AttributeCategory::Hometown, 0.5)?;
    let err = report.find_suitable(&both).unwrap_err();
    assert_eq!(err.requirements, 2);
    Ok(())
}

#[tokio::test]
async fn test_summary_serializes_outcomes() -> Result<()> {
    let dir = tempdir()?;
    write_fixture(dir.path())?;
    let config = Config::load_from(dir.path().join("profiler.toml"))?;

    let report = create_orchestrator(&config)?.run().await?;
    let summary = serde_json::to_value(report.summary())?;

    assert_eq!(summary["state"], "completed");
    assert_eq!(summary["individuals"], 2);
    assert_eq!(summary["primary"]["status"], "success");
    let gone = summary["secondaries"]
        .as_array()
        .unwrap()
        .iter()
        .find(|o| o["namespace"] == "gone")
        .unwrap();
    assert_eq!(gone["status"], "failed");
    assert_eq!(gone["error"]["reason"], "setup_failed");
    Ok(())
}
