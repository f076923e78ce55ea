//! Shared label and ownership vocabulary used by the Pod Builder, the
//! Reconciler, and the Status Aggregator so all three agree on how a pod is
//! tied back to its parent LoadTest.

use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Resource, ResourceExt};

use crate::crd::{LoadTest, Role};

/* ============================= LABEL KEYS ============================= */

pub const LABEL_LOADTEST: &str = "loadtest";
pub const LABEL_ROLE: &str = "role";
pub const LABEL_COMPONENT_NAME: &str = "component-name";
pub const LABEL_POOL: &str = "pool";

pub const FINALIZER: &str = "loadtest.devops.io/cleanup";

/// Build the label set a pod of `role`/`component_name`/`pool` must carry.
pub fn pod_labels(
    loadtest_name: &str,
    role: Role,
    component_name: &str,
    pool: &str,
) -> std::collections::BTreeMap<String, String> {
    std::collections::BTreeMap::from([
        (LABEL_LOADTEST.to_string(), loadtest_name.to_string()),
        (LABEL_ROLE.to_string(), role.label().to_string()),
        (
            LABEL_COMPONENT_NAME.to_string(),
            component_name.to_string(),
        ),
        (LABEL_POOL.to_string(), pool.to_string()),
    ])
}

/// Build an ownerReference pointing at `loadtest` with the controller bit
/// set, so the platform cascade-deletes pods when the LoadTest is deleted.
pub fn owner_reference(loadtest: &LoadTest) -> OwnerReference {
    OwnerReference {
        api_version: LoadTest::api_version(&()).to_string(),
        kind: LoadTest::kind(&()).to_string(),
        name: loadtest.name_any(),
        uid: loadtest.uid().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

/// The single predicate for parentage: a pod belongs to `loadtest` iff the
/// LoadTest's uid appears in its ownerReferences. Labels may legitimately
/// collide across LoadTests and are never used for ownership decisions.
pub fn owned_by(pod: &Pod, loadtest: &LoadTest) -> bool {
    let Some(uid) = loadtest.uid() else {
        return false;
    };
    pod.metadata
        .owner_references
        .as_ref()
        .is_some_and(|refs| refs.iter().any(|o| o.uid == uid))
}

/// Read back the role label, if present and recognized.
pub fn role_of(pod: &Pod) -> Option<Role> {
    let value = pod.metadata.labels.as_ref()?.get(LABEL_ROLE)?;
    match value.as_str() {
        "driver" => Some(Role::Driver),
        "server" => Some(Role::Server),
        "client" => Some(Role::Client),
        _ => None,
    }
}

/// Read back the component-name label, if present.
pub fn component_name_of(pod: &Pod) -> Option<&str> {
    pod.metadata
        .labels
        .as_ref()?
        .get(LABEL_COMPONENT_NAME)
        .map(|s| s.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn test_loadtest(uid: &str) -> LoadTest {
        LoadTest {
            metadata: ObjectMeta {
                name: Some("lt1".to_string()),
                namespace: Some("default".to_string()),
                uid: Some(uid.to_string()),
                ..Default::default()
            },
            spec: Default::default(),
            status: None,
        }
    }

    #[test]
    fn test_pod_labels_contains_all_keys() {
        let labels = pod_labels("lt1", Role::Server, "server-0", "default-pool");
        assert_eq!(labels.get(LABEL_LOADTEST).unwrap(), "lt1");
        assert_eq!(labels.get(LABEL_ROLE).unwrap(), "server");
        assert_eq!(labels.get(LABEL_COMPONENT_NAME).unwrap(), "server-0");
        assert_eq!(labels.get(LABEL_POOL).unwrap(), "default-pool");
    }

    #[test]
    fn test_owner_reference_carries_uid_and_controller_bit() {
        let lt = test_loadtest("abc-123");
        let owner = owner_reference(&lt);
        assert_eq!(owner.uid, "abc-123");
        assert_eq!(owner.kind, "LoadTest");
        assert_eq!(owner.controller, Some(true));
    }

    #[test]
    fn test_owned_by_true_when_uid_matches() {
        let lt = test_loadtest("abc-123");
        let pod = Pod {
            metadata: ObjectMeta {
                owner_references: Some(vec![owner_reference(&lt)]),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(owned_by(&pod, &lt));
    }

    #[test]
    fn test_owned_by_false_when_uid_differs() {
        let lt = test_loadtest("abc-123");
        let other = test_loadtest("zzz-999");
        let pod = Pod {
            metadata: ObjectMeta {
                owner_references: Some(vec![owner_reference(&other)]),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(!owned_by(&pod, &lt));
    }

    #[test]
    fn test_owned_by_false_when_no_owner_refs() {
        let lt = test_loadtest("abc-123");
        let pod = Pod::default();
        assert!(!owned_by(&pod, &lt));
    }

    #[test]
    fn test_role_of_recognizes_labels() {
        let mut pod = Pod::default();
        pod.metadata.labels = Some(pod_labels("lt1", Role::Client, "client-0", "p"));
        assert_eq!(role_of(&pod), Some(Role::Client));
    }

    #[test]
    fn test_role_of_none_when_missing() {
        assert_eq!(role_of(&Pod::default()), None);
    }

    #[test]
    fn test_component_name_of() {
        let mut pod = Pod::default();
        pod.metadata.labels = Some(pod_labels("lt1", Role::Driver, "driver", "p"));
        assert_eq!(component_name_of(&pod), Some("driver"));
    }
}
