//! `AutoVirtualDC` admission validation.

use kube::api::{Api, ListParams};

use crate::admission::types::FieldError;
use crate::avdc::schedule;
use crate::crds::{AutoVirtualDC, VirtualDC};

/// Validates a new AVDC's schedule/timeout fields and checks for name
/// collisions against existing VDCs/AVDCs.
pub async fn validate_create(
    avdc: &AutoVirtualDC,
    vdcs: &Api<VirtualDC>,
    avdcs: &Api<AutoVirtualDC>,
) -> Result<(), Vec<FieldError>> {
    let mut errors = validate_schedule_fields(&avdc.spec);

    let name = avdc.metadata.name.clone().unwrap_or_default();
    if let Ok(list) = vdcs.list(&ListParams::default()).await {
        if list
            .items
            .iter()
            .any(|v| v.metadata.name.as_deref() == Some(name.as_str()))
        {
            errors.push(FieldError {
                field: "metadata.name".to_string(),
                message: format!("a VirtualDC named {name:?} already exists"),
            });
        }
    }
    if let Ok(list) = avdcs.list(&ListParams::default()).await {
        if list
            .items
            .iter()
            .any(|a| a.metadata.name.as_deref() == Some(name.as_str()))
        {
            errors.push(FieldError {
                field: "metadata.name".to_string(),
                message: format!("an AutoVirtualDC named {name:?} already exists"),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Rejects a schedule change and re-validates `timeoutDuration`.
pub fn validate_update(old: &AutoVirtualDC, new: &AutoVirtualDC) -> Result<(), Vec<FieldError>> {
    let mut errors = Vec::new();
    if old.spec.start_schedule != new.spec.start_schedule {
        errors.push(FieldError {
            field: "spec.startSchedule".to_string(),
            message: "field is immutable after creation".to_string(),
        });
    }
    if old.spec.stop_schedule != new.spec.stop_schedule {
        errors.push(FieldError {
            field: "spec.stopSchedule".to_string(),
            message: "field is immutable after creation".to_string(),
        });
    }
    if !new.spec.timeout_duration.is_empty() {
        if let Err(e) = schedule::parse_duration(&new.spec.timeout_duration) {
            errors.push(FieldError {
                field: "spec.timeoutDuration".to_string(),
                message: e.to_string(),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_schedule_fields(spec: &crate::crds::AutoVirtualDcSpec) -> Vec<FieldError> {
    let mut errors = Vec::new();

    if !spec.timeout_duration.is_empty() {
        if let Err(e) = schedule::parse_duration(&spec.timeout_duration) {
            errors.push(FieldError {
                field: "spec.timeoutDuration".to_string(),
                message: e.to_string(),
            });
        }
    }

    let start_empty = spec.start_schedule.is_empty();
    let stop_empty = spec.stop_schedule.is_empty();
    if start_empty != stop_empty {
        errors.push(FieldError {
            field: "spec.startSchedule".to_string(),
            message: "startSchedule and stopSchedule must both be set or both be empty".to_string(),
        });
        return errors;
    }

    if !start_empty {
        if let Err(e) = schedule::validate_cron(&spec.start_schedule) {
            errors.push(FieldError {
                field: "spec.startSchedule".to_string(),
                message: e.to_string(),
            });
        }
        if let Err(e) = schedule::validate_cron(&spec.stop_schedule) {
            errors.push(FieldError {
                field: "spec.stopSchedule".to_string(),
                message: e.to_string(),
            });
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crds::VirtualDcSpec;

    fn spec(start: &str, stop: &str, timeout: &str) -> crate::crds::AutoVirtualDcSpec {
        crate::crds::AutoVirtualDcSpec {
            template: VirtualDcSpec {
                neco_branch: "main".to_string(),
                neco_apps_branch: "main".to_string(),
                skip_neco_apps: false,
                command: vec![],
                resources: None,
            },
            start_schedule: start.to_string(),
            stop_schedule: stop.to_string(),
            timeout_duration: timeout.to_string(),
        }
    }

    #[test]
    fn rejects_one_sided_schedule() {
        let errors = validate_schedule_fields(&spec("0 0 * * * *", "", ""));
        assert!(!errors.is_empty());
    }

    #[test]
    fn rejects_bad_timeout_duration() {
        let errors = validate_schedule_fields(&spec("", "", "banana"));
        assert!(!errors.is_empty());
    }

    #[test]
    fn accepts_empty_schedule_and_timeout() {
        let errors = validate_schedule_fields(&spec("", "", ""));
        assert!(errors.is_empty());
    }

    #[test]
    fn accepts_valid_schedules() {
        let errors = validate_schedule_fields(&spec("0 0 * * *", "0 12 * * *", "1h"));
        assert!(errors.is_empty());
    }

    #[test]
    fn rejects_a_six_field_schedule() {
        let errors = validate_schedule_fields(&spec("0 0 0 * * *", "0 0 12 * * *", ""));
        assert!(!errors.is_empty());
    }
}
