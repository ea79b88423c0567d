use std::error::Error;
use std::io::{self, Write};

use rollcall_face_core::engine::AlertDelivery;
use serde::Serialize;
use serde_json::{json, Value};

use crate::cli::OutputMode;
use crate::config::ConfigReport;
use crate::errors::{AppError, AppResult};
use crate::gallery::{DeactivationOutcome, GalleryEnrollmentOutcome, GalleryListing};
use crate::recognize::{DecideOutcome, LivenessOutcome, MatchOutcome};

fn write_json<T: Serialize + ?Sized>(value: &T) -> AppResult<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    let payload = serde_json::to_string(value)?;
    handle.write_all(payload.as_bytes())?;
    handle.write_all(b"\n")?;
    Ok(())
}

fn print_logs(logs: &[String]) {
    for line in logs {
        println!("{line}");
    }
}

pub fn render_gallery_enroll(outcome: &GalleryEnrollmentOutcome, mode: OutputMode) -> AppResult<()> {
    match mode {
        OutputMode::Human => {
            print_logs(&outcome.logs);
            println!(
                "Enrollment successful: {} embedding(s) added for {} ({}) in {}",
                outcome.added.len(),
                outcome.label,
                outcome.identity,
                outcome.gallery_path.display()
            );
        }
        OutputMode::Json => write_json(&enroll_json_payload(outcome))?,
    }
    Ok(())
}

fn enroll_json_payload(outcome: &GalleryEnrollmentOutcome) -> Value {
    json!({
        "identity": outcome.identity,
        "label": outcome.label,
        "gallery_path": outcome.gallery_path.display().to_string(),
        "added": outcome.added,
    })
}

pub fn render_gallery_list(listing: &GalleryListing, mode: OutputMode) -> AppResult<()> {
    match mode {
        OutputMode::Human => {
            if listing.identities.is_empty() {
                println!("Gallery {} is empty", listing.gallery_path.display());
                return Ok(());
            }
            for identity in &listing.identities {
                println!(
                    "{}  {:<24} embeddings={} {}",
                    identity.identity,
                    identity.label,
                    identity.embeddings,
                    if identity.active { "active" } else { "inactive" }
                );
            }
        }
        OutputMode::Json => write_json(listing)?,
    }
    Ok(())
}

pub fn render_gallery_deactivate(outcome: &DeactivationOutcome, mode: OutputMode) -> AppResult<()> {
    match mode {
        OutputMode::Human => print_logs(&outcome.logs),
        OutputMode::Json => write_json(&json!({
            "identity": outcome.identity,
            "gallery_path": outcome.gallery_path.display().to_string(),
            "remaining_active": outcome.remaining_active,
        }))?,
    }
    Ok(())
}

pub fn render_match(outcome: &MatchOutcome, mode: OutputMode) -> AppResult<()> {
    match mode {
        OutputMode::Human => {
            print_logs(&outcome.logs);
            match (&outcome.result.identity, &outcome.result.label) {
                (Some(identity), Some(label)) => println!("Match: {label} ({identity})"),
                (Some(identity), None) => println!("Match: {identity}"),
                (None, _) => println!("No match"),
            }
        }
        OutputMode::Json => write_json(outcome)?,
    }
    Ok(())
}

pub fn render_liveness(outcome: &LivenessOutcome, mode: OutputMode) -> AppResult<()> {
    match mode {
        OutputMode::Human => {
            print_logs(&outcome.logs);
            println!(
                "Liveness: {} (score {:.2}, reason {})",
                if outcome.verdict.is_live { "live" } else { "not live" },
                outcome.verdict.score,
                outcome.verdict.reason
            );
        }
        OutputMode::Json => write_json(outcome)?,
    }
    Ok(())
}

pub fn render_decide(outcome: &DecideOutcome, mode: OutputMode) -> AppResult<()> {
    match mode {
        OutputMode::Human => {
            print_logs(&outcome.logs);
            let decision = &outcome.outcome;
            println!(
                "Outcome {}: {} (confidence {:.2}, liveness {:.2}, mask {})",
                decision.id,
                decision.status.as_str(),
                decision.confidence_score,
                decision.liveness_score,
                decision.mask_status
            );
            if let (Some(kind), Some(severity)) = (decision.anomaly_type, decision.severity) {
                println!("Anomaly: {kind} (severity {severity})");
            }
            if let AlertDelivery::Failed(err) = &outcome.alert_delivery {
                println!("Alert not delivered: {err}");
            }
        }
        OutputMode::Json => write_json(outcome)?,
    }
    Ok(())
}

pub fn render_config(report: &ConfigReport, mode: OutputMode) -> AppResult<()> {
    match mode {
        OutputMode::Human => {
            match &report.source {
                Some(source) => println!("# loaded from {source}"),
                None => println!("# no configuration file found; defaults in effect"),
            }
            let value = serde_json::to_value(report)?;
            if let Value::Object(fields) = value {
                for (key, value) in fields.iter().filter(|(key, _)| key.as_str() != "source") {
                    println!("{key} = {value}");
                }
            }
        }
        OutputMode::Json => write_json(report)?,
    }
    Ok(())
}

pub fn render_error(err: &AppError, mode: OutputMode) {
    match mode {
        OutputMode::Human => {
            eprintln!("error: {}", err.human_message());
            if let Some(source) = err.source() {
                eprintln!("cause: {source}");
            }
            if err.is_retryable() {
                eprintln!("hint: the attempt can be retried");
            }
        }
        OutputMode::Json => {
            let payload = json!({
                "success": false,
                "error": err.human_message(),
                "retryable": err.is_retryable(),
            });
            if let Ok(json) = serde_json::to_string(&payload) {
                println!("{json}");
            }
            if let Some(source) = err.source() {
                eprintln!("cause: {source}");
            }
        }
    }
}
