//! FerryDomain spec validation

use std::net::{Ipv4Addr, Ipv6Addr};

use ferry_common::crd::{DnsRecordSpec, FerryDomain};
use ferry_common::Error;
use kube::ResourceExt;

/// Record types the provider accepts
pub const ALLOWED_RECORD_TYPES: &[&str] = &["A", "AAAA", "CNAME", "MX", "TXT", "SRV", "CAA", "NS"];

const MAX_DOMAIN_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;

/// Whether `domain` is a fully qualified DNS name with at least two labels
pub fn is_valid_domain(domain: &str) -> bool {
    let domain = domain.strip_suffix('.').unwrap_or(domain);
    if domain.is_empty() || domain.len() > MAX_DOMAIN_LEN {
        return false;
    }
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return false;
    }
    let labels_ok = labels.iter().all(|label| {
        !label.is_empty()
            && label.len() <= MAX_LABEL_LEN
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    });
    // A numeric top-level label means this is an address, not a name
    let tld_ok = labels
        .last()
        .is_some_and(|tld| !tld.chars().all(|c| c.is_ascii_digit()));
    labels_ok && tld_ok
}

/// Validate a FerryDomain spec, returning the first violation
pub fn validate_domain(domain: &FerryDomain) -> Result<(), Error> {
    let name = domain.name_any();

    if !is_valid_domain(&domain.spec.domain) {
        return Err(Error::validation_for_field(
            &name,
            "spec.domain",
            format!("'{}' is not a valid domain name", domain.spec.domain),
        ));
    }

    for (i, record) in domain.spec.records.iter().enumerate() {
        validate_record(record).map_err(|msg| {
            Error::validation_for_field(&name, format!("spec.records[{i}]"), msg)
        })?;
    }
    Ok(())
}

fn validate_record(record: &DnsRecordSpec) -> Result<(), String> {
    let record_type = record.record_type.to_uppercase();
    if !ALLOWED_RECORD_TYPES.contains(&record_type.as_str()) {
        return Err(format!(
            "record type '{}' is not one of {}",
            record.record_type,
            ALLOWED_RECORD_TYPES.join(", ")
        ));
    }
    if record.hostname.trim().is_empty() {
        return Err("hostname must not be empty".to_string());
    }
    if record.value.trim().is_empty() {
        return Err("value must not be empty".to_string());
    }

    match record_type.as_str() {
        "A" if record.value.parse::<Ipv4Addr>().is_err() => {
            Err(format!("A record value '{}' is not an IPv4 address", record.value))
        }
        "AAAA" if record.value.parse::<Ipv6Addr>().is_err() => {
            Err(format!("AAAA record value '{}' is not an IPv6 address", record.value))
        }
        "SRV" => {
            let complete = record.port_type.as_deref().is_some_and(|p| !p.is_empty())
                && record.weight.unwrap_or(0) != 0
                && record.port.unwrap_or(0) != 0
                && record.priority.unwrap_or(0) != 0;
            if complete {
                Ok(())
            } else {
                Err("SRV records need portType, weight, port and priority".to_string())
            }
        }
        "MX" if record.priority.unwrap_or(0) == 0 => {
            Err("MX records need a priority".to_string())
        }
        _ => Ok(()),
    }
}
