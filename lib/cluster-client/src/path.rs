//! REST path construction for arbitrary group/version/kind combinations

/// Plural resource names of well-known kinds
const KNOWN_PLURALS: &[(&str, &str)] = &[
    ("Pod", "pods"),
    ("Service", "services"),
    ("Endpoints", "endpoints"),
    ("EndpointSlice", "endpointslices"),
    ("Namespace", "namespaces"),
    ("Node", "nodes"),
    ("ConfigMap", "configmaps"),
    ("Secret", "secrets"),
    ("ServiceAccount", "serviceaccounts"),
    ("PersistentVolume", "persistentvolumes"),
    ("PersistentVolumeClaim", "persistentvolumeclaims"),
    ("Event", "events"),
    ("LimitRange", "limitranges"),
    ("ResourceQuota", "resourcequotas"),
    ("Deployment", "deployments"),
    ("ReplicaSet", "replicasets"),
    ("StatefulSet", "statefulsets"),
    ("DaemonSet", "daemonsets"),
    ("Job", "jobs"),
    ("CronJob", "cronjobs"),
    ("Ingress", "ingresses"),
    ("IngressClass", "ingressclasses"),
    ("NetworkPolicy", "networkpolicies"),
    ("Role", "roles"),
    ("RoleBinding", "rolebindings"),
    ("ClusterRole", "clusterroles"),
    ("ClusterRoleBinding", "clusterrolebindings"),
    ("StorageClass", "storageclasses"),
    ("HorizontalPodAutoscaler", "horizontalpodautoscalers"),
    ("PodDisruptionBudget", "poddisruptionbudgets"),
    ("CustomResourceDefinition", "customresourcedefinitions"),
    ("Pipeline", "pipelines"),
    ("PipelineRun", "pipelineruns"),
    ("Task", "tasks"),
    ("TaskRun", "taskruns"),
];

/// Plural resource segment for a kind: table lookup, then English rules
pub fn pluralize(kind: &str) -> String {
    if let Some((_, plural)) = KNOWN_PLURALS
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(kind))
    {
        return (*plural).to_string();
    }

    let lower = kind.to_ascii_lowercase();
    if lower.ends_with('s')
        || lower.ends_with('x')
        || lower.ends_with('z')
        || lower.ends_with("ch")
        || lower.ends_with("sh")
    {
        return format!("{}es", lower);
    }

    if let Some(stem) = lower.strip_suffix('y') {
        let consonant_before = stem
            .chars()
            .last()
            .is_some_and(|c| c.is_ascii_alphabetic() && !"aeiou".contains(c));
        if consonant_before {
            return format!("{}ies", stem);
        }
    }

    format!("{}s", lower)
}

/// Split `group/version` (or a bare core-group `version`)
pub fn split_api_version(api_version: &str) -> (&str, &str) {
    match api_version.rsplit_once('/') {
        Some((group, version)) => (group, version),
        None => ("", api_version),
    }
}

/// Build the REST path of a resource or collection.
///
/// The core group lives under `/api/<version>`, named groups under
/// `/apis/<group>/<version>`. Empty `name` addresses the collection.
pub fn resource_path(api_version: &str, kind: &str, name: &str, namespace: Option<&str>) -> String {
    let (group, version) = split_api_version(api_version);

    let mut path = if group.is_empty() {
        format!("/api/{}", version)
    } else {
        format!("/apis/{}/{}", group, version)
    };

    if let Some(ns) = namespace.filter(|ns| !ns.is_empty()) {
        path.push_str("/namespaces/");
        path.push_str(ns);
    }

    path.push('/');
    path.push_str(&pluralize(kind));

    if !name.is_empty() {
        path.push('/');
        path.push_str(name);
    }

    path
}
