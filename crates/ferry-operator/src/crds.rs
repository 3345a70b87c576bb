//! CRD installation utilities
//!
//! The operator installs its own CRDs on startup using server-side apply, so
//! the installed schema always matches the running version.

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, CustomResourceExt};

use ferry_common::crd::{FerryApplication, FerryDomain};
use ferry_common::kube_utils::FIELD_MANAGER;

/// Every CRD ferry serves, keyed by its full name
fn all_crds() -> Vec<(&'static str, CustomResourceDefinition)> {
    vec![
        ("ferryapplications.ferry.dev", FerryApplication::crd()),
        ("ferrydomains.ferry.dev", FerryDomain::crd()),
    ]
}

/// Render every CRD as a multi-document YAML stream
pub fn crd_yaml() -> Result<String, serde_yaml::Error> {
    let docs = all_crds()
        .into_iter()
        .map(|(_, crd)| serde_yaml::to_string(&crd))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(docs.join("---\n"))
}

/// Ensure all ferry CRDs are installed
pub async fn ensure_crds_installed(client: &Client) -> anyhow::Result<()> {
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(FIELD_MANAGER).force();

    for (name, crd) in all_crds() {
        tracing::info!(crd = name, "installing CRD");
        crds.patch(name, &params, &Patch::Apply(&crd))
            .await
            .map_err(|e| anyhow::anyhow!("failed to install CRD {name}: {e}"))?;
    }
    Ok(())
}
