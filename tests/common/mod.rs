use k8s_openapi::api::core::v1::{Container, ContainerState, ContainerStateTerminated, ContainerStatus, Pod, PodSpec, PodStatus};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use loadtest_operator::crd::{LoadTest, Role};
use loadtest_operator::identity::{owner_reference, pod_labels};

pub fn make_owned_pod(
    loadtest: &LoadTest,
    role: Role,
    component_name: &str,
    pool: &str,
    phase: &str,
    main_exit_code: Option<i32>,
) -> Pod {
    let owner = owner_reference(loadtest);

    let main_status = main_exit_code.map(|code| ContainerStatus {
        name: "main".to_string(),
        ready: code == 0 && phase == "Running",
        restart_count: 0,
        image: "img:latest".to_string(),
        image_id: String::new(),
        state: Some(ContainerState {
            terminated: Some(ContainerStateTerminated {
                exit_code: code,
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    });

    Pod {
        metadata: ObjectMeta {
            name: Some(format!("{}-{component_name}", loadtest.metadata.name.clone().unwrap_or_default())),
            namespace: loadtest.metadata.namespace.clone(),
            labels: Some(pod_labels(
                &loadtest.metadata.name.clone().unwrap_or_default(),
                role,
                component_name,
                pool,
            )),
            owner_references: Some(vec![owner]),
            ..Default::default()
        },
        spec: Some(PodSpec {
            containers: vec![Container {
                name: "main".to_string(),
                image: Some("img:latest".to_string()),
                ..Default::default()
            }],
            ..Default::default()
        }),
        status: Some(PodStatus {
            phase: Some(phase.to_string()),
            container_statuses: main_status.map(|s| vec![s]),
            ..Default::default()
        }),
    }
}
