// file: src/bootstrap/kubeadm.rs
// version: 1.0.0
// guid: 5b9d2e70-c4a1-48f3-9e06-d17a3b8c52f4

//! kubeadm configuration document handling

use crate::Result;
use regex::Regex;
use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use std::sync::OnceLock;

/// Values written into the ClusterConfiguration document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterSettings {
    pub schema: String,
    pub kubernetes_version: String,
    pub control_plane_endpoint: String,
    pub pod_subnet: String,
}

fn schema_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^apiVersion:\s*kubeadm\.k8s\.io/(v\d+beta\d+)\s*$").expect("static regex")
    })
}

/// Schema version announced by `kubeadm config print init-defaults`
pub fn parse_schema(init_defaults: &str) -> Option<String> {
    schema_pattern()
        .captures(init_defaults)
        .map(|caps| caps[1].to_string())
}

/// Schema version kubeadm of a given minor release expects
pub fn schema_for_minor(minor: u64) -> &'static str {
    match minor {
        m if m >= 31 => "v1beta4",
        22..=30 => "v1beta3",
        _ => "v1beta2",
    }
}

fn cluster_document(settings: &ClusterSettings) -> Value {
    let mut networking = Mapping::new();
    networking.insert("podSubnet".into(), settings.pod_subnet.clone().into());

    let mut doc = Mapping::new();
    doc.insert(
        "apiVersion".into(),
        format!("kubeadm.k8s.io/{}", settings.schema).into(),
    );
    doc.insert("kind".into(), "ClusterConfiguration".into());
    doc.insert(
        "kubernetesVersion".into(),
        format!("v{}", settings.kubernetes_version).into(),
    );
    doc.insert(
        "controlPlaneEndpoint".into(),
        settings.control_plane_endpoint.clone().into(),
    );
    doc.insert("networking".into(), Value::Mapping(networking));
    Value::Mapping(doc)
}

/// Fresh single-document configuration
pub fn render(settings: &ClusterSettings) -> Result<String> {
    Ok(serde_yaml::to_string(&cluster_document(settings))?)
}

fn is_kubeadm_document(doc: &Value) -> bool {
    doc.get("apiVersion")
        .and_then(Value::as_str)
        .is_some_and(|v| v.starts_with("kubeadm.k8s.io/"))
}

/// Update an existing configuration in place
///
/// Every kubeadm document gets the new schema version; the
/// ClusterConfiguration gets the version, endpoint and pod subnet. Other
/// keys and documents are kept. A ClusterConfiguration is appended when none
/// exists.
pub fn patch(existing: &str, settings: &ClusterSettings) -> Result<String> {
    let mut docs = Vec::new();
    for document in serde_yaml::Deserializer::from_str(existing) {
        let value = Value::deserialize(document)?;
        if !value.is_null() {
            docs.push(value);
        }
    }

    let mut found_cluster = false;
    for doc in docs.iter_mut() {
        if is_kubeadm_document(doc) {
            doc["apiVersion"] = format!("kubeadm.k8s.io/{}", settings.schema).into();
        }
        if doc.get("kind").and_then(Value::as_str) != Some("ClusterConfiguration") {
            continue;
        }
        found_cluster = true;

        let Value::Mapping(map) = doc else { continue };
        map.insert(
            "kubernetesVersion".into(),
            format!("v{}", settings.kubernetes_version).into(),
        );
        map.insert(
            "controlPlaneEndpoint".into(),
            settings.control_plane_endpoint.clone().into(),
        );
        let networking = map
            .entry("networking".into())
            .or_insert_with(|| Value::Mapping(Mapping::new()));
        if !networking.is_mapping() {
            *networking = Value::Mapping(Mapping::new());
        }
        networking["podSubnet"] = settings.pod_subnet.clone().into();
    }
    if !found_cluster {
        docs.push(cluster_document(settings));
    }

    let mut out = String::new();
    for (i, doc) in docs.iter().enumerate() {
        if i > 0 {
            out.push_str("---\n");
        }
        out.push_str(&serde_yaml::to_string(doc)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> ClusterSettings {
        ClusterSettings {
            schema: "v1beta4".to_string(),
            kubernetes_version: "1.31.1".to_string(),
            control_plane_endpoint: "k8scp:6443".to_string(),
            pod_subnet: "10.200.0.0/16".to_string(),
        }
    }

    #[test]
    fn test_parse_schema() {
        let defaults = "apiVersion: kubeadm.k8s.io/v1beta4\nbootstrapTokens:\n- groups: []\nkind: InitConfiguration\n---\napiVersion: kubeadm.k8s.io/v1beta4\nkind: ClusterConfiguration\n";
        assert_eq!(parse_schema(defaults).as_deref(), Some("v1beta4"));
        assert_eq!(parse_schema("command not found"), None);
    }

    #[test]
    fn test_schema_table() {
        assert_eq!(schema_for_minor(33), "v1beta4");
        assert_eq!(schema_for_minor(31), "v1beta4");
        assert_eq!(schema_for_minor(30), "v1beta3");
        assert_eq!(schema_for_minor(22), "v1beta3");
        assert_eq!(schema_for_minor(21), "v1beta2");
    }

    #[test]
    fn test_render() {
        let yaml = render(&settings()).unwrap();
        let value: Value = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(value["apiVersion"], Value::from("kubeadm.k8s.io/v1beta4"));
        assert_eq!(value["kind"], Value::from("ClusterConfiguration"));
        assert_eq!(value["kubernetesVersion"], Value::from("v1.31.1"));
        assert_eq!(value["controlPlaneEndpoint"], Value::from("k8scp:6443"));
        assert_eq!(value["networking"]["podSubnet"], Value::from("10.200.0.0/16"));
    }

    #[test]
    fn test_patch_preserves_other_keys() {
        let existing = "apiVersion: kubeadm.k8s.io/v1beta3\nkind: InitConfiguration\nnodeRegistration:\n  criSocket: unix:///run/containerd/containerd.sock\n---\napiVersion: kubeadm.k8s.io/v1beta3\nkind: ClusterConfiguration\nkubernetesVersion: v1.29.0\nclusterName: lab\nnetworking:\n  podSubnet: 192.168.0.0/16\n  serviceSubnet: 10.96.0.0/12\n---\napiVersion: kubelet.config.k8s.io/v1beta1\nkind: KubeletConfiguration\ncgroupDriver: systemd\n";

        let patched = patch(existing, &settings()).unwrap();
        let docs: Vec<Value> = serde_yaml::Deserializer::from_str(&patched)
            .map(|d| Value::deserialize(d).unwrap())
            .collect();

        assert_eq!(docs.len(), 3);
        assert_eq!(docs[0]["apiVersion"], Value::from("kubeadm.k8s.io/v1beta4"));
        assert_eq!(
            docs[0]["nodeRegistration"]["criSocket"],
            Value::from("unix:///run/containerd/containerd.sock")
        );
        assert_eq!(docs[1]["kubernetesVersion"], Value::from("v1.31.1"));
        assert_eq!(docs[1]["clusterName"], Value::from("lab"));
        assert_eq!(docs[1]["controlPlaneEndpoint"], Value::from("k8scp:6443"));
        assert_eq!(docs[1]["networking"]["podSubnet"], Value::from("10.200.0.0/16"));
        assert_eq!(docs[1]["networking"]["serviceSubnet"], Value::from("10.96.0.0/12"));
        assert_eq!(docs[2]["apiVersion"], Value::from("kubelet.config.k8s.io/v1beta1"));
    }

    #[test]
    fn test_patch_appends_missing_cluster_document() {
        let existing = "apiVersion: kubeadm.k8s.io/v1beta3\nkind: InitConfiguration\n";
        let patched = patch(existing, &settings()).unwrap();
        assert!(patched.contains("kind: InitConfiguration"));
        assert!(patched.contains("kind: ClusterConfiguration"));
        assert!(patched.contains("podSubnet: 10.200.0.0/16"));
    }
}
