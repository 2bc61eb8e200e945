//! Snapshot builder: wires the steps into a pipeline and runs one build.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn, Span};
use uuid::Uuid;

use super::cancel::CancelToken;
use super::error::{BuildError, BuildFailure};
use super::poller::{PollSettings, Poller};
use super::runner::{PipelineRunner, RunOutcome, RunReport, StepContext};
use super::state::BuildState;
use crate::adapters::ResourceClient;
use crate::config::BuildConfig;
use crate::domain::{
    Artifact, DATA_DATACENTER_ID, DATA_INSTANCE_ID, DATA_SERVER_IP, DATA_VOLUME_ID,
};
use crate::steps::{
    teardown_datacenter, ConnectStep, Connector, CreateServerStep, ProvisionStep, SnapshotStep,
    SshConnector, SshKeyStep,
};

/// Runs the snapshot pipeline for one configuration
pub struct Builder {
    config: BuildConfig,
    client: Arc<dyn ResourceClient>,
    connector: Arc<dyn Connector>,
    poll: PollSettings,
}

impl Builder {
    pub fn new(config: BuildConfig, client: Arc<dyn ResourceClient>) -> Self {
        let poll = PollSettings::from(&config.poll);
        Self {
            config,
            client,
            connector: Arc::new(SshConnector),
            poll,
        }
    }

    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = connector;
        self
    }

    pub fn with_poll_settings(mut self, poll: PollSettings) -> Self {
        self.poll = poll;
        self
    }

    /// Steps in execution order
    pub fn pipeline(&self) -> PipelineRunner {
        PipelineRunner::new(vec![
            Box::new(SshKeyStep::new()),
            Box::new(CreateServerStep::new(self.client.clone())),
            Box::new(ConnectStep::new(self.connector.clone())),
            Box::new(ProvisionStep::new()),
            Box::new(SnapshotStep::new(self.client.clone())),
        ])
    }

    /// Run the build. Cancelling `cancel` halts it; cleanup still runs.
    pub async fn run(&self, cancel: CancelToken) -> Result<Artifact, BuildFailure> {
        let (result, _) = self.run_with_report(cancel).await;
        result
    }

    /// Same as [`run`](Self::run), also returning the step journal
    #[instrument(skip(self, cancel), fields(snapshot = %self.config.snapshot_name, run_id = tracing::field::Empty))]
    pub async fn run_with_report(
        &self,
        cancel: CancelToken,
    ) -> (Result<Artifact, BuildFailure>, RunReport) {
        let run_id = Uuid::new_v4();
        Span::current().record("run_id", tracing::field::display(run_id));
        info!("Starting snapshot build");

        let ctx = StepContext::new(run_id, Poller::new(self.poll.clone(), cancel));
        let mut state = BuildState::new(self.config.clone());
        let runner = self.pipeline();

        let report = runner.run(&mut state, &ctx).await;
        debug!(events = report.events.len(), outcome = ?report.outcome, "Pipeline finished");

        if report.outcome == RunOutcome::Halted {
            let error = state
                .error
                .take()
                .unwrap_or_else(|| BuildError::cancelled("build"));
            return (Err(BuildFailure::new(error, state.cleanup_warnings)), report);
        }

        let artifact = Artifact::new(&self.config.snapshot_name)
            .with_snapshot_id(state.snapshot_id.clone())
            .with_data(DATA_INSTANCE_ID, state.instance_id.as_deref())
            .with_data(DATA_DATACENTER_ID, state.datacenter_id.as_deref())
            .with_data(DATA_VOLUME_ID, state.volume_id.as_deref())
            .with_data(DATA_SERVER_IP, state.server_ip.as_deref());
        info!(%artifact, "Build finished");

        if self.config.dispose_on_success {
            self.dispose(&mut state, &ctx).await;
        } else {
            info!(
                datacenter = state.datacenter_id.as_deref().unwrap_or_default(),
                "Keeping build datacenter"
            );
        }

        (Ok(artifact), report)
    }

    /// Release the build datacenter after a successful capture
    async fn dispose(&self, state: &mut BuildState, ctx: &StepContext) {
        // the session points into the datacenter being deleted
        state.session = None;

        let poller = ctx.poller.detached();
        if let Err(e) = teardown_datacenter(self.client.as_ref(), &poller, state).await {
            warn!(error = %e, "Failed to release build datacenter");
        }
    }
}
