//! Kubernetes API access.
//!
//! The collector only ever lists and deletes. [`ClusterApi`] is the seam the
//! passes are written against; [`KubeClusterApi`] backs it with a real
//! `kube::Client`.

use std::fmt::Debug;
use std::path::Path;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::batch::v1::CronJob;
use k8s_openapi::api::core::v1::{Namespace, Pod};
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, DeleteParams, ListParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config, Resource};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{GcError, Result};

/// List and delete operations the collector needs from the cluster
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// List all namespaces in the cluster
    async fn list_namespaces(&self) -> Result<Vec<Namespace>>;

    /// Delete a namespace by name
    async fn delete_namespace(&self, name: &str) -> Result<()>;

    /// List pods in a namespace
    async fn list_pods(&self, namespace: &str) -> Result<Vec<Pod>>;

    /// Delete a pod in a namespace
    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<()>;

    async fn list_deployments(&self, namespace: &str) -> Result<Vec<Deployment>>;

    async fn list_stateful_sets(&self, namespace: &str) -> Result<Vec<StatefulSet>>;

    async fn list_daemon_sets(&self, namespace: &str) -> Result<Vec<DaemonSet>>;

    async fn list_cron_jobs(&self, namespace: &str) -> Result<Vec<CronJob>>;
}

/// Build a Kubernetes client.
///
/// With a kubeconfig path the client is built from that file; without one
/// the default inference applies (in-cluster service account, falling back
/// to the local kubeconfig).
pub async fn connect(kubeconfig: Option<&Path>) -> Result<Client> {
    let Some(path) = kubeconfig else {
        debug!("No kubeconfig given, inferring client configuration");
        return Client::try_default().await.map_err(GcError::Client);
    };

    debug!(path = %path.display(), "Loading kubeconfig");
    let kubeconfig = Kubeconfig::read_from(path).map_err(|source| GcError::Kubeconfig {
        path: path.display().to_string(),
        source,
    })?;

    let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .map_err(|source| GcError::Kubeconfig {
            path: path.display().to_string(),
            source,
        })?;

    Client::try_from(config).map_err(GcError::Client)
}

/// [`ClusterApi`] backed by the Kubernetes API server
#[derive(Clone)]
pub struct KubeClusterApi {
    client: Client,
}

impl KubeClusterApi {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn list_namespaced<K>(&self, kind: &'static str, namespace: &str) -> Result<Vec<K>>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
        <K as Resource>::DynamicType: Default,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        let list = api
            .list(&ListParams::default())
            .await
            .map_err(|source| GcError::Query {
                kind,
                scope: format!("namespace {namespace}"),
                source,
            })?;

        debug!(kind, namespace, count = list.items.len(), "Listed resources");
        Ok(list.items)
    }
}

#[async_trait]
impl ClusterApi for KubeClusterApi {
    async fn list_namespaces(&self) -> Result<Vec<Namespace>> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let list = api
            .list(&ListParams::default())
            .await
            .map_err(|source| GcError::Query {
                kind: "namespaces",
                scope: "cluster".to_string(),
                source,
            })?;

        Ok(list.items)
    }

    async fn delete_namespace(&self, name: &str) -> Result<()> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        api.delete(name, &DeleteParams::default())
            .await
            .map_err(|source| GcError::Delete {
                kind: "namespace",
                name: name.to_string(),
                source,
            })?;

        Ok(())
    }

    async fn list_pods(&self, namespace: &str) -> Result<Vec<Pod>> {
        self.list_namespaced("pods", namespace).await
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<()> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        api.delete(name, &DeleteParams::default())
            .await
            .map_err(|source| GcError::Delete {
                kind: "pod",
                name: format!("{namespace}/{name}"),
                source,
            })?;

        Ok(())
    }

    async fn list_deployments(&self, namespace: &str) -> Result<Vec<Deployment>> {
        self.list_namespaced("deployments", namespace).await
    }

    async fn list_stateful_sets(&self, namespace: &str) -> Result<Vec<StatefulSet>> {
        self.list_namespaced("statefulsets", namespace).await
    }

    async fn list_daemon_sets(&self, namespace: &str) -> Result<Vec<DaemonSet>> {
        self.list_namespaced("daemonsets", namespace).await
    }

    async fn list_cron_jobs(&self, namespace: &str) -> Result<Vec<CronJob>> {
        self.list_namespaced("cronjobs", namespace).await
    }
}
