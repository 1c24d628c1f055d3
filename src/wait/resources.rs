use super::{PollError, Schedule, WaitConfig, poll_until};
#[cfg_attr(test, mockall_double::double)]
use crate::k8s::client::SyncK8sClient;
use crate::k8s::error::K8sError;
use crate::k8s::utils::{get_name, get_phase};
use crate::resource::handle::{Existence, ResourceHandle};
use crate::resource::pod::pod_type_meta;
use k8s_openapi::api::apps::v1::DaemonSet;
use kube::api::TypeMeta;
use tracing::debug;

pub fn daemon_set_type_meta() -> TypeMeta {
    TypeMeta {
        api_version: "apps/v1".to_string(),
        kind: "DaemonSet".to_string(),
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConvergenceError {
    #[error(transparent)]
    K8s(#[from] K8sError),

    #[error("pod `{0}/{1}` finished in phase Failed")]
    PodFailed(String, String),
}

/// Waits until the remote object reports `.status.phase` equal to `phase`.
///
/// NotFound while waiting is transient: a freshly created resource may not be
/// observable yet, so the probe keeps going until the deadline. Any other
/// remote failure aborts the wait.
pub fn wait_for_phase(
    handle: &mut ResourceHandle,
    phase: &str,
    config: &WaitConfig,
) -> Result<(), PollError<ConvergenceError>> {
    poll_until(Schedule::Immediate, config, || match handle.refresh() {
        Existence::Exists => {
            let observed = handle.object().and_then(get_phase);
            Ok(observed.as_deref() == Some(phase))
        }
        Existence::Absent => Ok(false),
        Existence::Unknown(err) => Err(err.into()),
    })
}

/// Waits until the remote object is gone. NotFound is the success condition.
pub fn wait_for_absence(
    handle: &mut ResourceHandle,
    config: &WaitConfig,
) -> Result<(), PollError<ConvergenceError>> {
    poll_until(Schedule::Immediate, config, || match handle.refresh() {
        Existence::Absent => Ok(true),
        Existence::Exists => Ok(false),
        Existence::Unknown(err) => Err(err.into()),
    })
}

/// Waits until a DaemonSet reports every desired pod ready and none unavailable.
///
/// The first probe runs after one full interval: right after a rollout is
/// triggered the reported status still describes the previous generation.
pub fn wait_for_daemon_set_ready(
    client: &SyncK8sClient,
    namespace: &str,
    name: &str,
    config: &WaitConfig,
) -> Result<(), PollError<ConvergenceError>> {
    let tm = daemon_set_type_meta();
    poll_until(Schedule::Delayed, config, || {
        let Some(obj) = client.get_dynamic_object(&tm, name, namespace)? else {
            return Ok(false);
        };
        let daemon_set: DaemonSet = obj
            .try_parse()
            .map_err(|err| K8sError::ParseDynamic(err.to_string(), tm.kind.clone()))?;
        Ok(daemon_set_ready(&daemon_set))
    })
}

fn daemon_set_ready(daemon_set: &DaemonSet) -> bool {
    let Some(status) = &daemon_set.status else {
        return false;
    };
    status.desired_number_scheduled > 0
        && status.number_ready == status.desired_number_scheduled
        && status.number_unavailable.unwrap_or_default() == 0
}

/// Waits until every node matching `selector` carries `label_key`.
///
/// The nodes are re-listed on every probe and the wait only succeeds when the
/// labeled count equals the selected count. An empty selection keeps polling
/// rather than succeeding vacuously.
pub fn wait_for_node_label(
    client: &SyncK8sClient,
    selector: &str,
    label_key: &str,
    config: &WaitConfig,
) -> Result<(), PollError<ConvergenceError>> {
    poll_until(Schedule::Immediate, config, || {
        let nodes = client.list_nodes(selector)?;
        if nodes.is_empty() {
            return Ok(false);
        }
        let labeled = nodes
            .iter()
            .filter(|node| {
                node.metadata
                    .labels
                    .as_ref()
                    .is_some_and(|labels| labels.contains_key(label_key))
            })
            .count();
        debug!("{labeled}/{} selected nodes carry `{label_key}`", nodes.len());
        Ok(labeled == nodes.len())
    })
}

/// Cross-probe bookkeeping for waits that first discover a resource and then
/// follow it by name. Threaded through the predicate explicitly instead of
/// being remembered in process-wide state.
#[derive(Debug, Default)]
struct PollState {
    pod_name: Option<String>,
}

/// Discovers the pod matching `selector` once, then follows that same pod by
/// name until it completes. Phase `Failed` aborts the wait; a pod that is not
/// there (yet, or anymore) counts as not finished.
pub fn wait_for_pod_completion(
    client: &SyncK8sClient,
    namespace: &str,
    selector: &str,
    config: &WaitConfig,
) -> Result<(), PollError<ConvergenceError>> {
    let tm = pod_type_meta();
    let mut state = PollState::default();

    poll_until(Schedule::Immediate, config, || {
        let name = match &state.pod_name {
            Some(name) => name.clone(),
            None => {
                let pods = client.list_dynamic_objects(&tm, namespace, selector)?;
                let Some(first) = pods.first() else {
                    return Ok(false);
                };
                let name = get_name(first).map_err(ConvergenceError::K8s)?;
                debug!("following pod `{namespace}/{name}`");
                state.pod_name = Some(name.clone());
                name
            }
        };

        let Some(pod) = client.get_dynamic_object(&tm, &name, namespace)? else {
            return Ok(false);
        };
        match get_phase(&pod).as_deref() {
            Some("Succeeded") => Ok(true),
            Some("Failed") => Err(ConvergenceError::PodFailed(
                namespace.to_string(),
                name.clone(),
            )),
            _ => Ok(false),
        }
    })
}
