//! Service lifecycle and queue dispatch
//!
//! `open` subscribes to the request queue, sets up the provisioner, runs the
//! status bootstrap pipeline and only then starts the receive loop. Every
//! decoded message is handed to its own handler task; at most
//! `max_concurrent_deploys` handlers deploy at once.

use crate::bootstrap::{self, BootstrapArgs};
use crate::config::AgentConfig;
use crate::error::{Result, ServiceError};
use crate::filelog::FileLogNotifier;
use crate::handler::Handler;
use berth_common::{MessageTransport, Payload, StatusStore};
use berth_provision::{Provisioner, ProvisionerRegistry};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

/// How long to wait for a leader broker node before giving up
pub const LEADER_WAIT_TIMEOUT: Duration = Duration::from_secs(30);

const ERROR_CHANNEL_CAPACITY: usize = 8;

pub struct Service {
    config: AgentConfig,
    transport: Arc<dyn MessageTransport>,
    store: Arc<dyn StatusStore>,
    provisioners: Arc<ProvisionerRegistry>,
    notifier: Arc<FileLogNotifier>,
    shutdown_tx: watch::Sender<bool>,
    err_tx: mpsc::Sender<ServiceError>,
    err_rx: Option<mpsc::Receiver<ServiceError>>,
    dispatcher: Option<JoinHandle<()>>,
}

impl Service {
    pub fn new(
        config: AgentConfig,
        transport: Arc<dyn MessageTransport>,
        store: Arc<dyn StatusStore>,
        provisioners: Arc<ProvisionerRegistry>,
    ) -> Self {
        let notifier = Arc::new(FileLogNotifier::new(config.meta.log_dir()));
        let (shutdown_tx, _) = watch::channel(false);
        let (err_tx, err_rx) = mpsc::channel(ERROR_CHANNEL_CAPACITY);

        Self {
            config,
            transport,
            store,
            provisioners,
            notifier,
            shutdown_tx,
            err_tx,
            err_rx: Some(err_rx),
            dispatcher: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.dispatcher.is_some()
    }

    /// Start the service
    ///
    /// Returns once the receive loop is running. Any failure before that
    /// point is returned and no message is consumed.
    pub async fn open(&mut self) -> Result<()> {
        if self.is_open() {
            return Err(ServiceError::AlreadyOpen);
        }

        let queue = self.config.agent.queue.clone();
        info!(queue = %queue, "Starting agent service");

        let messages = self
            .transport
            .subscribe(&queue)
            .await
            .map_err(|source| ServiceError::Subscribe {
                queue: queue.clone(),
                source,
            })?;

        let provisioner = self.set_provisioner().await?;

        bootstrap::run(&self.bootstrap_args())
            .await
            .map_err(ServiceError::Bootstrap)?;

        let dispatcher = Dispatcher {
            queue,
            messages,
            handler: Handler::new(
                provisioner,
                self.notifier.clone(),
                self.config.agent.cookbook.clone(),
            ),
            semaphore: Arc::new(Semaphore::new(self.config.agent.max_concurrent_deploys)),
            shutdown: self.shutdown_tx.subscribe(),
            err_tx: self.err_tx.clone(),
        };
        self.dispatcher = Some(tokio::spawn(dispatcher.run()));
        Ok(())
    }

    /// Stop consuming and wait for in-flight deploys
    pub async fn close(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(dispatcher) = self.dispatcher.take() {
            if let Err(e) = dispatcher.await {
                error!(error = %e, "Dispatcher task failed");
            }
            info!("Agent service closed");
        }
    }

    /// Fatal errors raised after `open` returned
    ///
    /// The receiver can be taken once.
    pub fn err(&mut self) -> Option<mpsc::Receiver<ServiceError>> {
        self.err_rx.take()
    }

    async fn set_provisioner(&self) -> Result<Arc<dyn Provisioner>> {
        let provisioner = self
            .provisioners
            .get(&self.config.agent.provider)
            .map_err(berth_provision::ProvisionError::from)?;
        let capabilities = provisioner.capabilities();

        if capabilities.initialize {
            provisioner.initialize(&self.config.init_map()).await?;
        }

        if capabilities.startup_message {
            match provisioner.startup_message().await {
                Ok(message) => info!("{}", message),
                Err(e) => warn!(provisioner = %provisioner.name(), error = %e, "Startup message unavailable"),
            }
        }

        Ok(provisioner)
    }

    fn bootstrap_args(&self) -> BootstrapArgs {
        let agent = &self.config.agent;
        BootstrapArgs {
            cat_id: agent.cat_id.clone(),
            cats_id: agent.cats_id.clone(),
            host_ip: agent.host_ip.clone(),
            credential_path: agent.credential_path.clone(),
            store: self.store.clone(),
            transport: self.transport.clone(),
            topic: agent.status_topic.clone(),
        }
    }
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("queue", &self.config.agent.queue)
            .field("provider", &self.config.agent.provider)
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}

/// Receive loop: decode, convert, hand off
struct Dispatcher {
    queue: String,
    messages: mpsc::Receiver<Vec<u8>>,
    handler: Handler,
    semaphore: Arc<Semaphore>,
    shutdown: watch::Receiver<bool>,
    err_tx: mpsc::Sender<ServiceError>,
}

impl Dispatcher {
    async fn run(mut self) {
        let mut handlers = JoinSet::new();
        debug!(queue = %self.queue, "Receive loop started");

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    debug!(queue = %self.queue, "Receive loop stopping");
                    break;
                }
                Some(joined) = handlers.join_next(), if !handlers.is_empty() => {
                    log_join(joined);
                }
                message = self.messages.recv() => match message {
                    Some(raw) => self.dispatch(raw, &mut handlers),
                    None => {
                        warn!(queue = %self.queue, "Subscription closed");
                        let _ = self
                            .err_tx
                            .send(ServiceError::SubscriptionClosed(self.queue.clone()))
                            .await;
                        break;
                    }
                },
            }
        }

        while let Some(joined) = handlers.join_next().await {
            log_join(joined);
        }
    }

    fn dispatch(&self, raw: Vec<u8>, handlers: &mut JoinSet<()>) {
        let request = match Payload::decode(&raw).and_then(Payload::convert) {
            Ok(request) => request,
            Err(e) => {
                warn!(queue = %self.queue, error = %e, "Skipping undecodable message");
                return;
            }
        };

        debug!(cat_id = %request.cat_id, box_name = %request.deploy_box.full_name(), "Dispatching");
        let handler = self.handler.clone();
        let semaphore = self.semaphore.clone();

        handlers.spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    error!("Deploy semaphore closed, dropping request");
                    return;
                }
            };
            // Outcome is logged by the handler
            let _ = handler.handle(request).await;
        });
    }
}

fn log_join(joined: std::result::Result<(), JoinError>) {
    if let Err(e) = joined {
        error!(error = %e, "Handler task panicked");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use berth_common::{DeployBox, MemoryStatusStore, MemoryTransport, OutputSink, Status};
    use berth_provision::{Capabilities, DeploySettings, ProvisionError, Registry};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    const QUEUE: &str = "berth";
    const SAMPLE: &str = r#"{"CatID":"cat-1","CatsID":["c1"],"box":{"cookbook":"nginx","tosca":"compute.tosca.cloud","repo":null}}"#;

    struct FakeProvisioner {
        delay: Duration,
        started: mpsc::UnboundedSender<()>,
        deployed: mpsc::UnboundedSender<DeployBox>,
        current: AtomicUsize,
        peak: AtomicUsize,
        init_map: Mutex<Option<HashMap<String, String>>>,
        failing_banner: bool,
    }

    #[async_trait]
    impl Provisioner for FakeProvisioner {
        fn name(&self) -> &str {
            "fake"
        }

        fn capabilities(&self) -> Capabilities {
            Capabilities {
                initialize: true,
                startup_message: true,
            }
        }

        async fn initialize(&self, config: &HashMap<String, String>) -> berth_provision::Result<()> {
            *self.init_map.lock().unwrap() = Some(config.clone());
            Ok(())
        }

        async fn deploy(
            &self,
            deploy_box: &DeployBox,
            _sink: Arc<dyn OutputSink>,
        ) -> berth_provision::Result<()> {
            let _ = self.started.send(());
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            let _ = self.deployed.send(deploy_box.clone());
            Ok(())
        }

        fn command(&self, _settings: &DeploySettings) -> Vec<String> {
            vec!["fake".to_string()]
        }

        async fn startup_message(&self) -> berth_provision::Result<String> {
            if self.failing_banner {
                return Err(ProvisionError::Initialize("no banner".to_string()));
            }
            Ok("fake provisioner ready".to_string())
        }
    }

    struct Harness {
        _dir: TempDir,
        service: Service,
        transport: Arc<MemoryTransport>,
        store: Arc<MemoryStatusStore>,
        provisioner: Arc<FakeProvisioner>,
        started: mpsc::UnboundedReceiver<()>,
        deployed: mpsc::UnboundedReceiver<DeployBox>,
    }

    fn harness(delay: Duration, limit: usize) -> Harness {
        harness_with(delay, limit, false, |c| c)
    }

    fn harness_with(
        delay: Duration,
        limit: usize,
        failing_banner: bool,
        tweak: impl FnOnce(AgentConfig) -> AgentConfig,
    ) -> Harness {
        let dir = TempDir::new().unwrap();
        let (started_tx, started) = mpsc::unbounded_channel();
        let (deployed_tx, deployed) = mpsc::unbounded_channel();
        let provisioner = Arc::new(FakeProvisioner {
            delay,
            started: started_tx,
            deployed: deployed_tx,
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            init_map: Mutex::new(None),
            failing_banner,
        });

        let mut provisioners: ProvisionerRegistry = Registry::new("provisioner");
        provisioners.register("fake", provisioner.clone()).unwrap();

        let config = tweak(
            AgentConfig::default()
                .with_home_dir(dir.path())
                .with_provider("fake")
                .with_cat_id("cat-host")
                .with_host_ip("10.0.0.5")
                .with_queue(QUEUE)
                .with_max_concurrent_deploys(limit),
        );

        let transport = Arc::new(MemoryTransport::new());
        let store = Arc::new(MemoryStatusStore::new());
        let service = Service::new(
            config,
            transport.clone(),
            store.clone(),
            Arc::new(provisioners),
        );

        Harness {
            _dir: dir,
            service,
            transport,
            store,
            provisioner,
            started,
            deployed,
        }
    }

    async fn next<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out")
            .expect("channel closed")
    }

    #[tokio::test]
    async fn test_sample_payload_dispatches_one_deploy() {
        let mut h = harness(Duration::ZERO, 4);
        h.service.open().await.unwrap();

        h.transport.publish(QUEUE, SAMPLE.as_bytes().to_vec()).await.unwrap();

        let deployed = next(&mut h.deployed).await;
        assert_eq!(deployed.cookbook, "nginx");
        assert_eq!(deployed.tosca_type().unwrap(), "cloud");
        assert!(deployed.repo.is_none());

        h.service.close().await;
        assert!(h.deployed.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_open_configures_provisioner_and_bootstraps() {
        let mut h = harness_with(Duration::ZERO, 1, true, |c| c);
        h.service.open().await.unwrap();

        let init_map = h.provisioner.init_map.lock().unwrap().clone().unwrap();
        assert_eq!(init_map["repository"], "github");

        assert_eq!(
            h.store.get_status("cat-host").await.unwrap(),
            Some(Status::Bootstrapped)
        );
        assert_eq!(h.transport.published(crate::config::DEFAULT_STATUS_TOPIC).len(), 1);

        h.service.close().await;
    }

    #[tokio::test]
    async fn test_bad_message_is_skipped() {
        let mut h = harness(Duration::ZERO, 4);
        h.service.open().await.unwrap();

        h.transport.publish(QUEUE, b"not json".to_vec()).await.unwrap();
        h.transport.publish(QUEUE, br#"{"CatID":"cat-9"}"#.to_vec()).await.unwrap();
        h.transport.publish(QUEUE, SAMPLE.as_bytes().to_vec()).await.unwrap();

        let deployed = next(&mut h.deployed).await;
        assert_eq!(deployed.cat_id, "cat-1");

        h.service.close().await;
        assert!(h.deployed.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_concurrent_deploys_are_bounded() {
        let mut h = harness(Duration::from_millis(50), 2);
        h.service.open().await.unwrap();

        for _ in 0..6 {
            h.transport.publish(QUEUE, SAMPLE.as_bytes().to_vec()).await.unwrap();
        }
        for _ in 0..6 {
            next(&mut h.deployed).await;
        }

        let peak = h.provisioner.peak.load(Ordering::SeqCst);
        assert!(peak >= 1 && peak <= 2, "peak concurrency was {}", peak);
        h.service.close().await;
    }

    #[tokio::test]
    async fn test_close_waits_for_in_flight_deploys() {
        let mut h = harness(Duration::from_millis(100), 1);
        h.service.open().await.unwrap();

        h.transport.publish(QUEUE, SAMPLE.as_bytes().to_vec()).await.unwrap();
        next(&mut h.started).await;

        h.service.close().await;

        assert!(h.deployed.try_recv().is_ok());
        assert!(!h.service.is_open());
    }

    #[tokio::test]
    async fn test_subscription_loss_is_reported() {
        let mut h = harness(Duration::ZERO, 1);
        let mut errors = h.service.err().unwrap();
        h.service.open().await.unwrap();

        h.transport.close(QUEUE);

        let err = tokio::time::timeout(Duration::from_secs(5), errors.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(err, ServiceError::SubscriptionClosed(q) if q == QUEUE));
        h.service.close().await;
    }

    #[tokio::test]
    async fn test_unknown_provider_fails_open() {
        let mut h = harness_with(Duration::ZERO, 1, false, |c| c.with_provider("puppet"));

        let err = h.service.open().await.unwrap_err();

        assert!(err.to_string().contains("'puppet'"));
        assert!(!h.service.is_open());
    }

    #[tokio::test]
    async fn test_bootstrap_failure_fails_open() {
        struct DownStore;

        #[async_trait]
        impl StatusStore for DownStore {
            async fn update_ip(&self, _cat_id: &str, _ip: &str) -> berth_common::Result<()> {
                Err(berth_common::Error::StatusStore("api unreachable".to_string()))
            }

            async fn update_credential(&self, _cat_id: &str, _credential: &str) -> berth_common::Result<()> {
                Ok(())
            }

            async fn update_status(&self, _cat_id: &str, _status: Status) -> berth_common::Result<()> {
                Ok(())
            }

            async fn get_status(&self, _cat_id: &str) -> berth_common::Result<Option<Status>> {
                Ok(None)
            }
        }

        let h = harness(Duration::ZERO, 1);
        let mut service = Service::new(
            h.service.config.clone(),
            h.transport.clone(),
            Arc::new(DownStore),
            h.service.provisioners.clone(),
        );

        let err = service.open().await.unwrap_err();

        match err {
            ServiceError::Bootstrap(source) => {
                assert_eq!(source.failed_action(), Some("update_ip"));
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(!service.is_open());
    }

    #[tokio::test]
    async fn test_subscribe_failure_fails_open() {
        struct NoBroker;

        #[async_trait]
        impl MessageTransport for NoBroker {
            async fn subscribe(&self, _queue: &str) -> berth_common::Result<mpsc::Receiver<Vec<u8>>> {
                Err(berth_common::Error::Transport("no broker".to_string()))
            }

            async fn publish(&self, _topic: &str, _body: Vec<u8>) -> berth_common::Result<()> {
                Ok(())
            }
        }

        let h = harness(Duration::ZERO, 1);
        let mut service = Service::new(
            h.service.config.clone(),
            Arc::new(NoBroker),
            h.store.clone(),
            h.service.provisioners.clone(),
        );

        let err = service.open().await.unwrap_err();

        match err {
            ServiceError::Subscribe { queue, source } => {
                assert_eq!(queue, QUEUE);
                assert!(source.to_string().contains("no broker"));
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(!service.is_open());
        assert!(h.provisioner.init_map.lock().unwrap().is_none());
        assert!(h.store.history().is_empty());
    }

    #[tokio::test]
    async fn test_open_twice_rejected() {
        let mut h = harness(Duration::ZERO, 1);
        h.service.open().await.unwrap();

        assert!(matches!(h.service.open().await, Err(ServiceError::AlreadyOpen)));
        h.service.close().await;
    }
}
