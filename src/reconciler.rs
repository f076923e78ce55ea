//! The pure, unit-testable core of the LoadTest Reconciler: given an
//! observed pod set, what pods are missing and where, and has the LoadTest's
//! TTL expired. `commands::reconcile` wires this to the live cluster the
//! way the operator wires `governance`/`enforcement` into its controller
//! callback.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Pod;

use crate::crd::{Component, LoadTest, Role};
use crate::defaults::resolve_pool;
use crate::identity::{component_name_of, owned_by, role_of};

/// One component the Reconciler still needs to create a pod for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingComponent {
    pub role: Role,
    pub component_name: String,
    pub pool: String,
}

/// Components with no observed owned pod matching their
/// resolved `component-name`, grouped by pool for the admission-control
/// capacity check.
pub fn missing_components(loadtest: &LoadTest, observed: &[Pod]) -> Vec<MissingComponent> {
    let owned_names: std::collections::HashSet<(Role, &str)> = observed
        .iter()
        .filter(|p| owned_by(p, loadtest))
        .filter_map(|p| Some((role_of(p)?, component_name_of(p)?)))
        .collect();

    loadtest
        .spec
        .all_components()
        .into_iter()
        .enumerate()
        .filter_map(|(index, (role, component))| {
            let name = resolved_component_name(role, index, component);
            if owned_names.contains(&(role, name.as_str())) {
                None
            } else {
                Some(MissingComponent {
                    role,
                    pool: resolve_pool(role, component.pool.as_deref()),
                    component_name: name,
                })
            }
        })
        .collect()
}

fn resolved_component_name(role: Role, index_within_role: usize, component: &Component) -> String {
    component
        .name
        .clone()
        .unwrap_or_else(|| format!("{}-{index_within_role}", role.label()))
}

/// `missing_components`, grouped and counted by resolved pool — the input
/// to admission control's "is there enough node capacity" decision.
pub fn missing_by_pool(loadtest: &LoadTest, observed: &[Pod]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for missing in missing_components(loadtest, observed) {
        *counts.entry(missing.pool).or_insert(0) += 1;
    }
    counts
}

/// Whether `creation_epoch_seconds + ttlSeconds` has passed as of `now`.
/// The LoadTest should be deleted (cascade-deleting pods) once true.
pub fn ttl_expired(creation_epoch_seconds: i64, ttl_seconds: u32, now_epoch_seconds: i64) -> bool {
    now_epoch_seconds >= creation_epoch_seconds + i64::from(ttl_seconds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{LoadTestSpec, RunSpec};
    use crate::identity::{owner_reference, pod_labels};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn loadtest(servers: usize, clients: usize) -> LoadTest {
        let component = |name: &str| Component {
            name: Some(name.to_string()),
            language: "go".to_string(),
            pool: None,
            clone: None,
            build: None,
            run: RunSpec::default(),
        };
        LoadTest {
            metadata: ObjectMeta {
                name: Some("lt1".to_string()),
                uid: Some("uid-1".to_string()),
                ..Default::default()
            },
            spec: LoadTestSpec {
                servers: (0..servers).map(|i| component(&format!("server-{i}"))).collect(),
                clients: (0..clients).map(|i| component(&format!("client-{i}"))).collect(),
                timeout_seconds: 60,
                ttl_seconds: 3600,
                ..Default::default()
            },
            status: None,
        }
    }

    fn owned_pod(lt: &LoadTest, role: Role, component_name: &str) -> Pod {
        Pod {
            metadata: ObjectMeta {
                owner_references: Some(vec![owner_reference(lt)]),
                labels: Some(pod_labels(
                    lt.metadata.name.as_deref().unwrap(),
                    role,
                    component_name,
                    "pool",
                )),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_all_missing_when_no_pods_observed() {
        let lt = loadtest(2, 1);
        let missing = missing_components(&lt, &[]);
        assert_eq!(missing.len(), 3);
    }

    #[test]
    fn test_none_missing_when_all_observed() {
        let lt = loadtest(1, 1);
        let pods = vec![
            owned_pod(&lt, Role::Server, "server-0"),
            owned_pod(&lt, Role::Client, "client-0"),
        ];
        assert!(missing_components(&lt, &pods).is_empty());
    }

    #[test]
    fn test_partial_observation_leaves_remainder_missing() {
        let lt = loadtest(2, 0);
        let pods = vec![owned_pod(&lt, Role::Server, "server-0")];
        let missing = missing_components(&lt, &pods);
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].component_name, "server-1");
    }

    #[test]
    fn test_unowned_pod_does_not_count_as_observed() {
        let lt = loadtest(1, 0);
        let mut other = loadtest(1, 0);
        other.metadata.uid = Some("other-uid".to_string());
        let stray = owned_pod(&other, Role::Server, "server-0");
        let missing = missing_components(&lt, &[stray]);
        assert_eq!(missing.len(), 1);
    }

    #[test]
    fn test_missing_by_pool_groups_under_default_key() {
        let lt = loadtest(2, 0);
        let grouped = missing_by_pool(&lt, &[]);
        assert_eq!(grouped.get("__default_pool (servers)"), Some(&2));
    }

    #[test]
    fn test_ttl_not_yet_expired() {
        assert!(!ttl_expired(1000, 3600, 2000));
    }

    #[test]
    fn test_ttl_expired_at_boundary() {
        assert!(ttl_expired(1000, 3600, 4600));
    }

    #[test]
    fn test_ttl_expired_past_boundary() {
        assert!(ttl_expired(1000, 3600, 10_000));
    }
}
