//! Resource descriptor factory: target representation of every child kind.
//!
//! Pure and total. The same record always yields the same descriptors; the only
//! derived value is the content fingerprint label on the data blob.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    ConfigMap, ConfigMapVolumeSource, Container, ContainerPort, PodSpec, PodTemplateSpec, Service, ServicePort,
    ServiceSpec, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;

use jso_core::{
    fingerprint, ChildKind, ChildResource, Config, JsonServer, CONFIG_FIELD, FINGERPRINT_LABEL, HTTP_PORT,
    HTTP_PORT_NAME, HTTP_PROTOCOL, IDENTITY_LABEL,
};

const CONTAINER_NAME: &str = "json-server";
const VOLUME_NAME: &str = "json-config";
const MOUNT_PATH: &str = "/data";

#[derive(Debug, Clone)]
pub struct DescriptorFactory {
    image: String,
}

impl DescriptorFactory {
    pub fn new(cfg: &Config) -> Self {
        Self { image: cfg.image.clone() }
    }

    pub fn build(&self, kind: ChildKind, record: &JsonServer) -> ChildResource {
        match kind {
            ChildKind::DataBlob => ChildResource::ConfigMap(data_blob(record)),
            ChildKind::Workload => ChildResource::Deployment(self.workload(record)),
            ChildKind::Endpoint => ChildResource::Service(endpoint(record)),
        }
    }

    /// All descriptors, in apply order.
    pub fn build_all(&self, record: &JsonServer) -> Vec<ChildResource> {
        ChildKind::ORDER.iter().map(|k| self.build(*k, record)).collect()
    }

    fn workload(&self, record: &JsonServer) -> Deployment {
        let labels = workload_labels(record);
        Deployment {
            metadata: child_meta(record, Some(labels.clone())),
            spec: Some(DeploymentSpec {
                replicas: record.spec.replicas,
                selector: LabelSelector { match_labels: Some(labels.clone()), ..Default::default() },
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta { labels: Some(labels), ..Default::default() }),
                    spec: Some(PodSpec {
                        containers: vec![Container {
                            name: CONTAINER_NAME.to_string(),
                            image: Some(self.image.clone()),
                            args: Some(vec![format!("{}/{}", MOUNT_PATH, CONFIG_FIELD)]),
                            ports: Some(vec![ContainerPort {
                                name: Some(HTTP_PORT_NAME.to_string()),
                                container_port: HTTP_PORT,
                                protocol: Some(HTTP_PROTOCOL.to_string()),
                                ..Default::default()
                            }]),
                            volume_mounts: Some(vec![VolumeMount {
                                name: VOLUME_NAME.to_string(),
                                read_only: Some(true),
                                mount_path: MOUNT_PATH.to_string(),
                                ..Default::default()
                            }]),
                            ..Default::default()
                        }],
                        volumes: Some(vec![Volume {
                            name: VOLUME_NAME.to_string(),
                            config_map: Some(ConfigMapVolumeSource {
                                name: Some(record.name_any()),
                                ..Default::default()
                            }),
                            ..Default::default()
                        }]),
                        ..Default::default()
                    }),
                },
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

fn child_meta(record: &JsonServer, labels: Option<BTreeMap<String, String>>) -> ObjectMeta {
    ObjectMeta {
        name: Some(record.name_any()),
        namespace: record.namespace(),
        labels,
        ..Default::default()
    }
}

fn data_blob(record: &JsonServer) -> ConfigMap {
    let payload = &record.spec.json_config;
    let labels = BTreeMap::from([(FINGERPRINT_LABEL.to_string(), fingerprint(payload))]);
    ConfigMap {
        metadata: child_meta(record, Some(labels)),
        data: Some(BTreeMap::from([(CONFIG_FIELD.to_string(), payload.clone())])),
        ..Default::default()
    }
}

fn endpoint(record: &JsonServer) -> Service {
    Service {
        metadata: child_meta(record, None),
        spec: Some(ServiceSpec {
            ports: Some(vec![ServicePort {
                name: Some(HTTP_PORT_NAME.to_string()),
                protocol: Some(HTTP_PROTOCOL.to_string()),
                port: HTTP_PORT,
                target_port: Some(IntOrString::Int(HTTP_PORT)),
                ..Default::default()
            }]),
            selector: Some(identity_labels(record)),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn identity_labels(record: &JsonServer) -> BTreeMap<String, String> {
    BTreeMap::from([(IDENTITY_LABEL.to_string(), record.name_any())])
}

/// Parent labels plus the identity label. The identity key is reserved: a parent label
/// with the same key is ignored.
pub fn workload_labels(record: &JsonServer) -> BTreeMap<String, String> {
    let mut labels: BTreeMap<String, String> = record
        .labels()
        .iter()
        .filter(|(k, _)| k.as_str() != IDENTITY_LABEL)
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    labels.extend(identity_labels(record));
    labels
}

/// `k=v,...` form of the workload pod selector, published for the scale subresource.
pub fn selector_string(record: &JsonServer) -> String {
    workload_labels(record)
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use jso_core::JsonServerSpec;

    fn record(replicas: Option<i32>) -> JsonServer {
        let mut js = JsonServer::new("app-demo", JsonServerSpec { replicas, json_config: "hey joe".into() });
        js.metadata.namespace = Some("ns".into());
        js
    }

    fn factory() -> DescriptorFactory {
        DescriptorFactory::new(&Config::default())
    }

    #[test]
    fn data_blob_carries_payload_and_fingerprint() {
        let ChildResource::ConfigMap(cm) = factory().build(ChildKind::DataBlob, &record(Some(1))) else {
            panic!("expected ConfigMap");
        };
        assert_eq!(cm.metadata.name.as_deref(), Some("app-demo"));
        assert_eq!(cm.metadata.namespace.as_deref(), Some("ns"));
        assert_eq!(cm.data.as_ref().unwrap()["db.json"], "hey joe");
        assert_eq!(cm.metadata.labels.as_ref().unwrap()[FINGERPRINT_LABEL], "c5d1f53fc4cc4fd76e9b0022295b2321");
    }

    #[test]
    fn workload_replicas_pass_through_unset() {
        let ChildResource::Deployment(d) = factory().build(ChildKind::Workload, &record(None)) else {
            panic!("expected Deployment");
        };
        assert_eq!(d.spec.as_ref().unwrap().replicas, None);

        let ChildResource::Deployment(d) = factory().build(ChildKind::Workload, &record(Some(4))) else {
            panic!("expected Deployment");
        };
        assert_eq!(d.spec.as_ref().unwrap().replicas, Some(4));
    }

    #[test]
    fn workload_mounts_blob_and_uses_configured_image() {
        let cfg = Config { image: "example/json-server:2".into(), ..Config::default() };
        let ChildResource::Deployment(d) = DescriptorFactory::new(&cfg).build(ChildKind::Workload, &record(Some(1)))
        else {
            panic!("expected Deployment");
        };
        let pod = d.spec.unwrap().template.spec.unwrap();
        let c = &pod.containers[0];
        assert_eq!(c.image.as_deref(), Some("example/json-server:2"));
        assert_eq!(c.args.as_deref(), Some(&["/data/db.json".to_string()][..]));
        assert_eq!(c.ports.as_ref().unwrap()[0].container_port, 3000);
        let vol = &pod.volumes.unwrap()[0];
        assert_eq!(vol.config_map.as_ref().unwrap().name.as_deref(), Some("app-demo"));
    }

    #[test]
    fn identity_label_is_reserved() {
        let mut js = record(Some(1));
        js.metadata.labels = Some(BTreeMap::from([
            ("app".to_string(), "hijack".to_string()),
            ("team".to_string(), "blue".to_string()),
        ]));
        let labels = workload_labels(&js);
        assert_eq!(labels["app"], "app-demo");
        assert_eq!(labels["team"], "blue");
        assert_eq!(selector_string(&js), "app=app-demo,team=blue");
    }

    #[test]
    fn endpoint_port_is_fixed() {
        let ChildResource::Service(svc) = factory().build(ChildKind::Endpoint, &record(Some(1))) else {
            panic!("expected Service");
        };
        let spec = svc.spec.unwrap();
        let port = &spec.ports.unwrap()[0];
        assert_eq!(port.port, 3000);
        assert_eq!(port.protocol.as_deref(), Some("TCP"));
        assert_eq!(port.target_port, Some(IntOrString::Int(3000)));
        assert_eq!(spec.selector.unwrap()["app"], "app-demo");
    }

    #[test]
    fn build_is_deterministic_and_ordered() {
        let f = factory();
        let a = f.build_all(&record(Some(2)));
        let b = f.build_all(&record(Some(2)));
        assert_eq!(a, b);
        let kinds: Vec<_> = a.iter().map(|c| c.kind()).collect();
        assert_eq!(kinds, ChildKind::ORDER.to_vec());
    }
}
