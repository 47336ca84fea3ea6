use crate::{
    admission::Admission,
    core::{AdmissionMode, ClientConfiguration, ScanApiStore, SharedStore, TenantId},
    k8s::{self, watcher, K8sDuration},
    lease::DispatchLease,
    monitor::{
        tenants::TENANT_SELECTOR, DebounceMetrics, Debounce, Debouncer, DispatchMetrics,
        Dispatcher, TenantIndex,
    },
    monitors::{MonitoredKinds, DEFAULT_MONITORED_KINDS},
    scan_api::ClientBuilder,
};
use anyhow::{bail, Context, Result};
use clap::Parser;
use prometheus_client::registry::Registry;
use scan_controller_admission::{AdmissionEngine, AdmissionMetrics, Config};
use std::{path::PathBuf, sync::Arc, time::Duration};
use tracing::{info, info_span, warn, Instrument};

#[derive(Debug, Parser)]
#[clap(
    name = "scan-controller",
    about = "Schedules scans of changed workloads and validates admitted ones"
)]
pub struct Args {
    #[clap(
        long,
        default_value = "scan_controller=info,warn",
        env = "SCAN_CONTROLLER_LOG"
    )]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    server: kubert::ServerArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    /// Disables the admission controller server.
    #[clap(long)]
    admission_controller_disabled: bool,

    /// Whether failing scans deny admission (`enforcing`) or are only
    /// reported (`permissive`).
    #[clap(long, default_value = "permissive", env = "SCAN_CONTROLLER_ADMISSION_MODE")]
    admission_mode: AdmissionMode,

    /// Namespaces to scan. All namespaces are scanned when empty.
    #[clap(long, value_delimiter = ',')]
    include_namespaces: Vec<String>,

    /// Namespaces never to scan.
    #[clap(long, value_delimiter = ',')]
    exclude_namespaces: Vec<String>,

    #[clap(long, default_value = "", env = "SCAN_CONTROLLER_CLUSTER_ID")]
    cluster_id: String,

    #[clap(long, env = "SCAN_CONTROLLER_INTEGRATION_MRN")]
    integration_mrn: Option<String>,

    /// Also discovers the admission review itself when scanning.
    #[clap(long)]
    admission_review_discovery: bool,

    /// Upper bound on the scan performed for a single admission review.
    #[clap(long, default_value = "8s")]
    admission_timeout: K8sDuration,

    /// How long a resource must be quiet before its scan is scheduled.
    #[clap(long, default_value = "10s")]
    debounce_window: K8sDuration,

    /// Schedules a scan after this long even if the resource keeps changing.
    /// Defaults to five debounce windows.
    #[clap(long)]
    debounce_max_delay: Option<K8sDuration>,

    /// Timeout for each request made to a scan backend.
    #[clap(long, default_value = "30s")]
    scan_api_timeout: K8sDuration,

    /// A scan backend used for admission reviews and registered as a static
    /// tenant.
    #[clap(long, env = "SCAN_CONTROLLER_SCAN_API_URL")]
    scan_api_url: Option<String>,

    #[clap(long, env = "SCAN_CONTROLLER_SCAN_API_TOKEN_FILE")]
    scan_api_token_file: Option<PathBuf>,

    #[clap(long, default_value = DEFAULT_MONITORED_KINDS)]
    monitored_kinds: MonitoredKinds,

    #[clap(long, default_value = "mondoo-operator")]
    controller_namespace: String,

    #[clap(long, default_value = "mondoo-scan-controller")]
    controller_deployment_name: String,

    #[clap(long, default_value = TENANT_SELECTOR)]
    tenant_secret_selector: String,

    /// How long the dispatch Lease is held without being renewed.
    #[clap(long, default_value = "30s")]
    lease_duration: K8sDuration,

    /// How long before the dispatch Lease expires its holder renews it.
    #[clap(long, default_value = "1s")]
    lease_renew_grace_period: K8sDuration,
}

/// Everything the controllers need once the runtime is built.
struct Controllers {
    store: SharedStore,
    clients: ClientBuilder,
    scan_api_timeout: Duration,
    debounce_window: Duration,
    debounce_max_delay: Duration,
    debounce_metrics: DebounceMetrics,
    dispatch_metrics: DispatchMetrics,
    monitored_kinds: MonitoredKinds,
    controller_namespace: String,
    controller_deployment_name: String,
    tenant_secret_selector: String,
    lease_params: kubert::lease::ClaimParams,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            admin,
            client,
            log_level,
            log_format,
            server,
            admission_controller_disabled,
            admission_mode,
            include_namespaces,
            exclude_namespaces,
            cluster_id,
            integration_mrn,
            admission_review_discovery,
            admission_timeout,
            debounce_window,
            debounce_max_delay,
            scan_api_timeout,
            scan_api_url,
            scan_api_token_file,
            monitored_kinds,
            controller_namespace,
            controller_deployment_name,
            tenant_secret_selector,
            lease_duration,
            lease_renew_grace_period,
        } = self;

        let mut prom = <Registry>::default();
        let debounce_metrics = DebounceMetrics::register(prom.sub_registry_with_prefix("debounce"));
        let dispatch_metrics = DispatchMetrics::register(prom.sub_registry_with_prefix("dispatch"));
        let admission_metrics =
            AdmissionMetrics::register(prom.sub_registry_with_prefix("admission"));
        let rt_metrics = kubert::RuntimeMetrics::register(prom.sub_registry_with_prefix("kube"));

        let clients = ClientBuilder::new(scan_api_timeout.into())?;
        let store = ScanApiStore::shared();
        let static_tenant = static_tenant(
            scan_api_url.as_deref(),
            scan_api_token_file.as_ref(),
            integration_mrn.as_deref(),
            &include_namespaces,
            &exclude_namespaces,
        )?;

        let engine = match &static_tenant {
            Some(tenant) if !admission_controller_disabled => {
                let scanner = clients.build(&tenant.endpoint, &tenant.token)?;
                Some(AdmissionEngine::new(
                    Config {
                        mode: admission_mode,
                        include_namespaces,
                        exclude_namespaces,
                        cluster_id,
                        integration_mrn,
                        review_discovery: admission_review_discovery,
                        scan_timeout: admission_timeout.into(),
                    },
                    Arc::new(scanner),
                    admission_metrics,
                ))
            }
            None if !admission_controller_disabled => {
                bail!("--scan-api-url must be set unless the admission controller is disabled")
            }
            _ => None,
        };

        if let Some(tenant) = static_tenant {
            info!(endpoint = %tenant.endpoint, "Registering static scan API tenant");
            store.set(tenant.tenant_id.clone(), tenant);
        }

        let debounce_window: Duration = debounce_window.into();
        let controllers = Controllers {
            store,
            clients,
            scan_api_timeout: scan_api_timeout.into(),
            debounce_window,
            debounce_max_delay: debounce_max_delay.map_or(debounce_window * 5, Into::into),
            debounce_metrics,
            dispatch_metrics,
            monitored_kinds,
            controller_namespace,
            controller_deployment_name,
            tenant_secret_selector,
            lease_params: kubert::lease::ClaimParams {
                lease_duration: lease_duration.into(),
                renew_grace_period: lease_renew_grace_period.into(),
            },
        };

        let builder = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_metrics(rt_metrics)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client);

        // Block the main thread on the shutdown signal. Once it fires, wait for
        // the background tasks to complete before exiting.
        match engine {
            None => {
                let mut runtime = builder.build().await?;
                controllers.spawn(&mut runtime).await?;
                if runtime.run().await.is_err() {
                    bail!("Aborted");
                }
            }
            Some(engine) => {
                let mut runtime = builder.with_server(server).build().await?;
                controllers.spawn(&mut runtime).await?;
                let admission = Admission::new(engine, runtime.shutdown_handle());
                let runtime = runtime.spawn_server(admission);
                if runtime.run().await.is_err() {
                    bail!("Aborted");
                }
            }
        }

        Ok(())
    }
}

// === impl Controllers ===

impl Controllers {
    async fn spawn<S: 'static>(self, runtime: &mut kubert::Runtime<S>) -> Result<()> {
        let Self {
            store,
            clients,
            scan_api_timeout,
            debounce_window,
            debounce_max_delay,
            debounce_metrics,
            dispatch_metrics,
            monitored_kinds: MonitoredKinds(kinds),
            controller_namespace,
            controller_deployment_name,
            tenant_secret_selector,
            lease_params,
        } = self;

        let hostname =
            std::env::var("HOSTNAME").context("failed to read the HOSTNAME environment variable")?;
        let claims = DispatchLease {
            namespace: controller_namespace.clone(),
            deployment_name: controller_deployment_name,
            claimant: hostname.clone(),
            params: lease_params,
        }
        .spawn(runtime)
        .await?;

        let dispatcher = Dispatcher::new(store.clone(), clients, scan_api_timeout, dispatch_metrics)
            .with_leader(hostname, claims);
        let debouncer = Debouncer::with_max_delay(
            debounce_window,
            debounce_max_delay,
            dispatcher,
            debounce_metrics,
        );
        debouncer.close_on(runtime.shutdown_handle());
        let debouncer: Arc<dyn Debounce> = Arc::new(debouncer);

        spawn_tenants(
            runtime,
            &controller_namespace,
            &tenant_secret_selector,
            store.clone(),
        );

        if kinds.is_empty() {
            warn!("No resource kinds are monitored");
        }
        for kind in kinds {
            info!(%kind, "Monitoring resources");
            kind.spawn(runtime, &store, &debouncer);
        }

        Ok(())
    }
}

/// Indexes the tenant Secrets in the controller's namespace.
fn spawn_tenants<S: 'static>(
    runtime: &mut kubert::Runtime<S>,
    ns: &str,
    selector: &str,
    store: SharedStore,
) {
    let secrets = runtime
        .watch_namespaced::<k8s::Secret>(ns.to_string(), watcher::Config::default().labels(selector));
    tokio::spawn(
        kubert::index::namespaced(TenantIndex::shared(store), secrets)
            .instrument(info_span!("tenants", %ns)),
    );
}

/// Builds the tenant described by `--scan-api-url`, if one is configured.
fn static_tenant(
    url: Option<&str>,
    token_file: Option<&PathBuf>,
    integration_mrn: Option<&str>,
    include_namespaces: &[String],
    exclude_namespaces: &[String],
) -> Result<Option<ClientConfiguration>> {
    let Some(endpoint) = url.map(str::trim).filter(|url| !url.is_empty()) else {
        return Ok(None);
    };

    let token = match token_file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read scan API token from {}", path.display()))?
            .trim()
            .to_string(),
        None => String::new(),
    };

    Ok(Some(ClientConfiguration {
        tenant_id: TenantId::default(),
        endpoint: endpoint.to_string(),
        token,
        integration_mrn: integration_mrn
            .filter(|mrn| !mrn.is_empty())
            .map(ToString::to_string),
        managed_by: None,
        include_namespaces: include_namespaces.to_vec(),
        exclude_namespaces: exclude_namespaces.to_vec(),
    }))
}
