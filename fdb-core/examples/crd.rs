//! A script used to generate the CRDs used by this project.
//!
//! Any time a CRD spec changes, this script can be run to ensure that the CRDs are up-to-date and
//! ready to be synced with the cluster.

use anyhow::{Context, Result};
use fdb_core::crd::{FoundationDBCluster, FoundationDBRestore};
use kube::CustomResourceExt;

fn main() -> Result<()> {
    let canon = std::fs::canonicalize("..").context("error getting canonical path of current dir")?;
    let crds_path = canon.join("k8s").join("crds");
    std::fs::create_dir_all(&crds_path).with_context(|| format!("error creating CRD dir {:?}", &crds_path))?;

    let cluster = FoundationDBCluster::crd();
    let cluster_yaml = serde_yaml::to_string(&cluster).context("error serializing FoundationDBCluster CRD to yaml")?;
    std::fs::write(crds_path.join("foundationdbcluster.yaml"), &cluster_yaml)
        .with_context(|| format!("error writing FoundationDBCluster CRD to {:?}", &crds_path))?;
    println!("FoundationDBCluster CRD written to {:?}", &crds_path);

    let restore = FoundationDBRestore::crd();
    let restore_yaml = serde_yaml::to_string(&restore).context("error serializing FoundationDBRestore CRD to yaml")?;
    std::fs::write(crds_path.join("foundationdbrestore.yaml"), &restore_yaml)
        .with_context(|| format!("error writing FoundationDBRestore CRD to {:?}", &crds_path))?;
    println!("FoundationDBRestore CRD written to {:?}", &crds_path);

    Ok(())
}
