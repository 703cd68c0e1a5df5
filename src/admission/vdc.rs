//! `VirtualDC` admission validation.

use kube::api::{Api, ListParams};

use crate::admission::types::FieldError;
use crate::crds::{AutoVirtualDC, VirtualDC};
use crate::domain::constants::API_GROUP;

/// Rejects a create unless the VDC is owned by an `AutoVirtualDC` in this
/// API group, or its name collides with an existing VDC/AVDC.
pub async fn validate_create(
    vdc: &VirtualDC,
    vdcs: &Api<VirtualDC>,
    avdcs: &Api<AutoVirtualDC>,
) -> Result<(), Vec<FieldError>> {
    let name = vdc.metadata.name.clone().unwrap_or_default();
    let mut errors = Vec::new();

    let owned_by_avdc = vdc
        .metadata
        .owner_references
        .as_ref()
        .is_some_and(|refs| refs.iter().any(|r| r.kind == "AutoVirtualDC" && r.api_version.starts_with(API_GROUP)));

    if !owned_by_avdc {
        if let Ok(list) = avdcs.list(&ListParams::default()).await {
            if list.items.iter().any(|a| a.metadata.name.as_deref() == Some(name.as_str())) {
                errors.push(FieldError {
                    field: "metadata.name".to_string(),
                    message: format!("an AutoVirtualDC named {name:?} already exists"),
                });
            }
        }
    }

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

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Rejects any change to the immutable spec fields.
pub fn validate_update(old: &VirtualDC, new: &VirtualDC) -> Result<(), Vec<FieldError>> {
    let mut errors = Vec::new();

    if old.spec.neco_branch != new.spec.neco_branch {
        errors.push(immutable("spec.necoBranch"));
    }
    if old.spec.neco_apps_branch != new.spec.neco_apps_branch {
        errors.push(immutable("spec.necoAppsBranch"));
    }
    if old.spec.skip_neco_apps != new.spec.skip_neco_apps {
        errors.push(immutable("spec.skipNecoApps"));
    }
    if old.spec.command != new.spec.command {
        errors.push(immutable("spec.command"));
    }
    if old.spec.resources != new.spec.resources {
        errors.push(immutable("spec.resources"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn immutable(field: &str) -> FieldError {
    FieldError {
        field: field.to_string(),
        message: "field is immutable after creation".to_string(),
    }
}
