use kube::core::{ApiResource, GroupVersionKind};
use std::fmt;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum ResourceKind {
    Pods,
    CronJobs,
    DaemonSets,
    Deployments,
    ReplicaSets,
    ReplicationControllers,
    StatefulSets,
    Jobs,
    Services,
    Ingresses,
    IngressClasses,
    ConfigMaps,
    PersistentVolumeClaims,
    Secrets,
    StorageClasses,
    PersistentVolumes,
    ServiceAccounts,
    Roles,
    RoleBindings,
    ClusterRoles,
    ClusterRoleBindings,
    NetworkPolicies,
    Nodes,
    Events,
    Namespaces,
    CustomResourceDefinitions,
}

impl ResourceKind {
    pub const ALL: [Self; 26] = [
        Self::Pods,
        Self::CronJobs,
        Self::DaemonSets,
        Self::Deployments,
        Self::ReplicaSets,
        Self::ReplicationControllers,
        Self::StatefulSets,
        Self::Jobs,
        Self::Services,
        Self::Ingresses,
        Self::IngressClasses,
        Self::ConfigMaps,
        Self::PersistentVolumeClaims,
        Self::Secrets,
        Self::StorageClasses,
        Self::PersistentVolumes,
        Self::ServiceAccounts,
        Self::Roles,
        Self::RoleBindings,
        Self::ClusterRoles,
        Self::ClusterRoleBindings,
        Self::NetworkPolicies,
        Self::Nodes,
        Self::Events,
        Self::Namespaces,
        Self::CustomResourceDefinitions,
    ];

    pub fn from_token(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "po" | "pod" | "pods" => Some(Self::Pods),
            "cj" | "cronjob" | "cronjobs" | "cron-job" | "cron-jobs" => Some(Self::CronJobs),
            "ds" | "daemonset" | "daemonsets" | "daemon-set" | "daemon-sets" => {
                Some(Self::DaemonSets)
            }
            "deploy" | "deployment" | "deployments" | "dp" => Some(Self::Deployments),
            "rs" | "replicaset" | "replicasets" | "replica-set" | "replica-sets" => {
                Some(Self::ReplicaSets)
            }
            "rc"
            | "replicationcontroller"
            | "replicationcontrollers"
            | "replication-controller"
            | "replication-controllers" => Some(Self::ReplicationControllers),
            "sts" | "statefulset" | "statefulsets" => Some(Self::StatefulSets),
            "job" | "jobs" => Some(Self::Jobs),
            "svc" | "service" | "services" => Some(Self::Services),
            "ing" | "ingress" | "ingresses" => Some(Self::Ingresses),
            "ingclass" | "ingressclass" | "ingressclasses" | "ingress-class"
            | "ingress-classes" | "ic" => Some(Self::IngressClasses),
            "cm" | "configmap" | "configmaps" | "config-map" | "config-maps" => {
                Some(Self::ConfigMaps)
            }
            "pvc"
            | "persistentvolumeclaim"
            | "persistentvolumeclaims"
            | "persistent-volume-claim"
            | "persistent-volume-claims" => Some(Self::PersistentVolumeClaims),
            "secret" | "secrets" => Some(Self::Secrets),
            "sc" | "storageclass" | "storageclasses" | "storage-class" | "storage-classes" => {
                Some(Self::StorageClasses)
            }
            "pv" | "persistentvolume" | "persistentvolumes" | "persistent-volume"
            | "persistent-volumes" => Some(Self::PersistentVolumes),
            "sa" | "serviceaccount" | "serviceaccounts" | "service-account"
            | "service-accounts" => Some(Self::ServiceAccounts),
            "role" | "roles" => Some(Self::Roles),
            "rb" | "rolebinding" | "rolebindings" | "role-binding" | "role-bindings" => {
                Some(Self::RoleBindings)
            }
            "crole" | "clusterrole" | "clusterroles" | "cluster-role" | "cluster-roles" => {
                Some(Self::ClusterRoles)
            }
            "crb"
            | "clusterrolebinding"
            | "clusterrolebindings"
            | "cluster-role-binding"
            | "cluster-role-bindings" => Some(Self::ClusterRoleBindings),
            "np" | "networkpolicy" | "networkpolicies" | "network-policy" | "network-policies" => {
                Some(Self::NetworkPolicies)
            }
            "node" | "nodes" | "no" => Some(Self::Nodes),
            "event" | "events" | "ev" => Some(Self::Events),
            "ns" | "namespace" | "namespaces" => Some(Self::Namespaces),
            "crd" | "crds" | "customresourcedefinition" | "customresourcedefinitions" => {
                Some(Self::CustomResourceDefinitions)
            }
            _ => None,
        }
    }

    pub fn short_token(self) -> &'static str {
        match self {
            Self::Pods => "po",
            Self::CronJobs => "cj",
            Self::DaemonSets => "ds",
            Self::Deployments => "deploy",
            Self::ReplicaSets => "rs",
            Self::ReplicationControllers => "rc",
            Self::StatefulSets => "sts",
            Self::Jobs => "job",
            Self::Services => "svc",
            Self::Ingresses => "ing",
            Self::IngressClasses => "ingclass",
            Self::ConfigMaps => "cm",
            Self::PersistentVolumeClaims => "pvc",
            Self::Secrets => "secret",
            Self::StorageClasses => "sc",
            Self::PersistentVolumes => "pv",
            Self::ServiceAccounts => "sa",
            Self::Roles => "role",
            Self::RoleBindings => "rb",
            Self::ClusterRoles => "crole",
            Self::ClusterRoleBindings => "crb",
            Self::NetworkPolicies => "np",
            Self::Nodes => "node",
            Self::Events => "event",
            Self::Namespaces => "ns",
            Self::CustomResourceDefinitions => "crd",
        }
    }

    /// API coordinates as (group, version, kind, plural, namespaced).
    fn coordinates(self) -> (&'static str, &'static str, &'static str, &'static str, bool) {
        match self {
            Self::Pods => ("", "v1", "Pod", "pods", true),
            Self::CronJobs => ("batch", "v1", "CronJob", "cronjobs", true),
            Self::DaemonSets => ("apps", "v1", "DaemonSet", "daemonsets", true),
            Self::Deployments => ("apps", "v1", "Deployment", "deployments", true),
            Self::ReplicaSets => ("apps", "v1", "ReplicaSet", "replicasets", true),
            Self::ReplicationControllers => (
                "",
                "v1",
                "ReplicationController",
                "replicationcontrollers",
                true,
            ),
            Self::StatefulSets => ("apps", "v1", "StatefulSet", "statefulsets", true),
            Self::Jobs => ("batch", "v1", "Job", "jobs", true),
            Self::Services => ("", "v1", "Service", "services", true),
            Self::Ingresses => ("networking.k8s.io", "v1", "Ingress", "ingresses", true),
            Self::IngressClasses => (
                "networking.k8s.io",
                "v1",
                "IngressClass",
                "ingressclasses",
                false,
            ),
            Self::ConfigMaps => ("", "v1", "ConfigMap", "configmaps", true),
            Self::PersistentVolumeClaims => (
                "",
                "v1",
                "PersistentVolumeClaim",
                "persistentvolumeclaims",
                true,
            ),
            Self::Secrets => ("", "v1", "Secret", "secrets", true),
            Self::StorageClasses => (
                "storage.k8s.io",
                "v1",
                "StorageClass",
                "storageclasses",
                false,
            ),
            Self::PersistentVolumes => ("", "v1", "PersistentVolume", "persistentvolumes", false),
            Self::ServiceAccounts => ("", "v1", "ServiceAccount", "serviceaccounts", true),
            Self::Roles => ("rbac.authorization.k8s.io", "v1", "Role", "roles", true),
            Self::RoleBindings => (
                "rbac.authorization.k8s.io",
                "v1",
                "RoleBinding",
                "rolebindings",
                true,
            ),
            Self::ClusterRoles => (
                "rbac.authorization.k8s.io",
                "v1",
                "ClusterRole",
                "clusterroles",
                false,
            ),
            Self::ClusterRoleBindings => (
                "rbac.authorization.k8s.io",
                "v1",
                "ClusterRoleBinding",
                "clusterrolebindings",
                false,
            ),
            Self::NetworkPolicies => (
                "networking.k8s.io",
                "v1",
                "NetworkPolicy",
                "networkpolicies",
                true,
            ),
            Self::Nodes => ("", "v1", "Node", "nodes", false),
            Self::Events => ("", "v1", "Event", "events", true),
            Self::Namespaces => ("", "v1", "Namespace", "namespaces", false),
            Self::CustomResourceDefinitions => (
                "apiextensions.k8s.io",
                "v1",
                "CustomResourceDefinition",
                "customresourcedefinitions",
                false,
            ),
        }
    }

    pub fn def(self) -> KindDef {
        let (group, version, kind, plural, namespaced) = self.coordinates();
        KindDef {
            group: group.to_string(),
            version: version.to_string(),
            kind: kind.to_string(),
            plural: plural.to_string(),
            namespaced,
        }
    }
}

/// A listable resource: either a built-in kind or one named by its
/// `group/version/resource` coordinates.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct KindDef {
    pub group: String,
    pub version: String,
    /// Empty until resolved against the cluster for custom coordinates.
    pub kind: String,
    pub plural: String,
    pub namespaced: bool,
}

impl KindDef {
    /// Accepts an operator alias (`po`, `deploy`) or `[group/]version/resource`.
    pub fn parse(token: &str) -> Option<Self> {
        let token = token.trim();
        if let Some(kind) = ResourceKind::from_token(token) {
            return Some(kind.def());
        }

        let parts = token.split('/').collect::<Vec<_>>();
        let (group, version, plural) = match parts.as_slice() {
            [version, plural] => ("", *version, *plural),
            [group, version, plural] => (*group, *version, *plural),
            _ => return None,
        };
        if version.is_empty() || plural.is_empty() {
            return None;
        }

        let plural = plural.to_ascii_lowercase();
        let builtin = ResourceKind::ALL.into_iter().map(ResourceKind::def).find(|def| {
            def.group == group && def.version == version && def.plural == plural
        });
        Some(builtin.unwrap_or(Self {
            group: group.to_string(),
            version: version.to_string(),
            kind: String::new(),
            plural,
            namespaced: true,
        }))
    }

    /// Registry key: `v1/pods`, `apps/v1/deployments`.
    pub fn gvr(&self) -> String {
        if self.group.is_empty() {
            format!("{}/{}", self.version, self.plural)
        } else {
            format!("{}/{}/{}", self.group, self.version, self.plural)
        }
    }

    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    pub fn is_resolved(&self) -> bool {
        !self.kind.is_empty()
    }

    pub fn title(&self) -> &str {
        if self.kind.is_empty() {
            &self.plural
        } else {
            &self.kind
        }
    }

    pub fn api_resource(&self) -> ApiResource {
        let gvk = GroupVersionKind::gvk(&self.group, &self.version, &self.kind);
        ApiResource::from_gvk_with_plural(&gvk, &self.plural)
    }
}

impl fmt::Display for KindDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.gvr())
    }
}
