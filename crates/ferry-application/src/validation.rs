//! Spec validation run before any remote call

use std::collections::HashSet;

use ferry_common::crd::{FerryApplication, LoadBalancerType};
use ferry_common::Error;
use kube::ResourceExt;

/// Validate a FerryApplication spec, returning the first violation
pub fn validate_application(app: &FerryApplication) -> Result<(), Error> {
    let name = app.name_any();
    let lb = &app.spec.load_balancer;

    if lb.name.trim().is_empty() {
        return Err(Error::validation_for_field(
            &name,
            "spec.loadBalancer.name",
            "load balancer name must not be empty",
        ));
    }
    if lb.region.trim().is_empty() {
        return Err(Error::validation_for_field(
            &name,
            "spec.loadBalancer.region",
            "region must not be empty",
        ));
    }

    let Some(frontend) = lb.frontend.as_ref() else {
        return Err(Error::validation_for_field(
            &name,
            "spec.loadBalancer.frontend",
            "a frontend is required",
        ));
    };
    if frontend.name.trim().is_empty() {
        return Err(Error::validation_for_field(
            &name,
            "spec.loadBalancer.frontend.name",
            "frontend name must not be empty",
        ));
    }
    if frontend.port == 0 {
        return Err(Error::validation_for_field(
            &name,
            "spec.loadBalancer.frontend.port",
            "frontend port must be between 1 and 65535",
        ));
    }

    let mut seen = HashSet::new();
    for (i, tg) in app.spec.target_groups.iter().enumerate() {
        if tg.name.trim().is_empty() {
            return Err(Error::validation_for_field(
                &name,
                format!("spec.targetGroups[{i}].name"),
                "target group name must not be empty",
            ));
        }
        if !seen.insert(tg.name.as_str()) {
            return Err(Error::validation_for_field(
                &name,
                format!("spec.targetGroups[{i}].name"),
                format!("duplicate target group name '{}'", tg.name),
            ));
        }
    }

    if lb.lb_type == LoadBalancerType::Network && lb.backend_port.unwrap_or(0) == 0 {
        return Err(Error::validation_for_field(
            &name,
            "spec.loadBalancer.backendPort",
            "a network load balancer requires backendPort",
        ));
    }

    Ok(())
}
