use crate::kind::KindDef;
use crate::model::NamespaceScope;
use anyhow::{Context, Result};
use futures::StreamExt;
use futures::stream::BoxStream;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::ListParams;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::core::{DynamicObject, TypeMeta};
use kube::runtime::WatchStreamExt;
use kube::runtime::watcher::{Config as WatchConfig, watcher};
use kube::{Api, Client, Config};
use serde_json::Value;
use tracing::{debug, warn};

/// Lists full snapshots of any resource kind as semi-structured objects.
#[derive(Clone)]
pub struct KubeGateway {
    client: Client,
    context: String,
    cluster: String,
    default_namespace: String,
}

impl KubeGateway {
    pub async fn new() -> Result<Self> {
        Self::from_kube_selection(None).await
    }

    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn default_namespace(&self) -> &str {
        &self.default_namespace
    }

    pub fn client(&self) -> Client {
        self.client.clone()
    }

    pub async fn from_kube_selection(context: Option<String>) -> Result<Self> {
        let kubeconfig = Kubeconfig::read().ok();

        let config = if let Some(kubeconfig_value) = kubeconfig.clone() {
            let options = KubeConfigOptions {
                context: context.clone(),
                cluster: None,
                user: None,
            };
            Config::from_custom_kubeconfig(kubeconfig_value, &options)
                .await
                .context("failed to infer Kubernetes configuration")?
        } else {
            if context.is_some() {
                anyhow::bail!("kubeconfig not found; context switching is unavailable");
            }
            Config::infer()
                .await
                .context("failed to infer Kubernetes configuration")?
        };

        let cluster = config.cluster_url.to_string();
        let default_namespace = config.default_namespace.clone();
        let client = Client::try_from(config).context("failed to initialize Kubernetes client")?;
        let context = context
            .or_else(|| kubeconfig.and_then(|cfg| cfg.current_context))
            .unwrap_or_else(|| "in-cluster".to_string());

        Ok(Self {
            client,
            context,
            cluster,
            default_namespace,
        })
    }

    /// Fills in kind and scope for coordinates typed by the operator,
    /// looking them up among the installed custom resource definitions.
    pub async fn resolve(&self, kind: KindDef) -> Result<KindDef> {
        if kind.is_resolved() {
            return Ok(kind);
        }

        let crd_api: Api<CustomResourceDefinition> = Api::all(self.client.clone());
        let list = crd_api
            .list(&list_params())
            .await
            .context("failed to list custom resource definitions")?;
        resolve_with_crds(kind, list)
    }

    fn dynamic_api(&self, kind: &KindDef, scope: &NamespaceScope) -> Api<DynamicObject> {
        let api_resource = kind.api_resource();
        match scope.namespace() {
            Some(namespace) if kind.namespaced => {
                Api::namespaced_with(self.client.clone(), namespace, &api_resource)
            }
            _ => Api::all_with(self.client.clone(), &api_resource),
        }
    }

    /// Every object of `kind` in `scope`, following continue tokens.
    pub async fn list(&self, kind: &KindDef, scope: &NamespaceScope) -> Result<Vec<Value>> {
        let api = self.dynamic_api(kind, scope);
        let types = TypeMeta {
            api_version: kind.api_version(),
            kind: kind.kind.clone(),
        };

        let mut params = list_params();
        let mut objects = Vec::new();
        loop {
            let page = api
                .list(&params)
                .await
                .with_context(|| format!("failed to list {} in {scope}", kind.gvr()))?;
            let next = page.metadata.continue_.clone().filter(|token| !token.is_empty());
            for mut object in page.items {
                object.types.get_or_insert_with(|| types.clone());
                let value = serde_json::to_value(&object)
                    .with_context(|| format!("failed to encode {}", kind.gvr()))?;
                objects.push(value);
            }
            let Some(token) = next else {
                break;
            };
            params = list_params().continue_token(&token);
        }

        debug!("listed {} {} in {scope}", objects.len(), kind.gvr());
        Ok(objects)
    }

    /// Emits once per watch event for `kind` in `scope`. Errors are logged
    /// and the watch backs off before retrying.
    pub fn changes(&self, kind: &KindDef, scope: &NamespaceScope) -> BoxStream<'static, ()> {
        let api = self.dynamic_api(kind, scope);
        let gvr = kind.gvr();
        watcher(api, WatchConfig::default())
            .default_backoff()
            .filter_map(move |event| {
                let gvr = gvr.clone();
                async move {
                    match event {
                        Ok(_) => Some(()),
                        Err(error) => {
                            warn!("watch stream error for {gvr}: {error}");
                            None
                        }
                    }
                }
            })
            .boxed()
    }
}

/// Unknown coordinates fail here rather than on the first list call.
fn resolve_with_crds(
    kind: KindDef,
    crds: impl IntoIterator<Item = CustomResourceDefinition>,
) -> Result<KindDef> {
    let found = crds.into_iter().find(|crd| {
        crd.spec.group == kind.group
            && crd.spec.names.plural == kind.plural
            && crd
                .spec
                .versions
                .iter()
                .any(|version| version.name == kind.version)
    });
    let Some(crd) = found else {
        anyhow::bail!("the server doesn't have a resource type {}", kind.gvr());
    };

    Ok(KindDef {
        kind: crd.spec.names.kind,
        namespaced: crd.spec.scope == "Namespaced",
        ..kind
    })
}

fn list_params() -> ListParams {
    ListParams::default().limit(500)
}

#[cfg(test)]
mod tests {
    use super::resolve_with_crds;
    use crate::kind::KindDef;
    use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
    use serde_json::json;

    fn crd(group: &str, plural: &str, kind: &str, scope: &str) -> CustomResourceDefinition {
        serde_json::from_value(json!({
            "apiVersion": "apiextensions.k8s.io/v1",
            "kind": "CustomResourceDefinition",
            "metadata": {"name": format!("{plural}.{group}")},
            "spec": {
                "group": group,
                "names": {"plural": plural, "kind": kind},
                "scope": scope,
                "versions": [{"name": "v1", "served": true, "storage": true}]
            }
        }))
        .unwrap()
    }

    #[test]
    fn custom_coordinates_resolve_through_crds() {
        let crds = vec![
            crd("example.com", "gadgets", "Gadget", "Namespaced"),
            crd("example.com", "widgets", "Widget", "Cluster"),
        ];
        let kind = KindDef::parse("example.com/v1/widgets").unwrap();
        let resolved = resolve_with_crds(kind, crds.clone()).unwrap();
        assert_eq!(resolved.kind, "Widget");
        assert!(!resolved.namespaced);
        assert_eq!(resolved.gvr(), "example.com/v1/widgets");

        let wrong_version = KindDef::parse("example.com/v2/widgets").unwrap();
        let error = resolve_with_crds(wrong_version, crds).unwrap_err();
        assert!(error.to_string().contains("example.com/v2/widgets"));
    }
}
