//! [`JobRunner`] — drains the job outbox.
//!
//! Provisioning never fails "upward": every error inside a provisioning run
//! is converted into workflow state (failure comment, create-failure history,
//! request reopened) and the job still completes against the queue. Retry is
//! a human decision, surfaced by the reopened status.

use std::sync::Arc;

use acre_core::{
  event::{EventSink, LifecycleEvent},
  store::{FarmStore, JobPayload, Provisioner},
  wiki::NewWiki,
};

use crate::{cache::WikiCache, workflow::RequestWorkflow, Error, Result};

pub struct JobRunner<S, P> {
  store:       Arc<S>,
  provisioner: Arc<P>,
  workflow:    RequestWorkflow<S>,
  cache:       Arc<WikiCache>,
  sink:        Arc<dyn EventSink>,
}

/// Everything a provisioning run needs, unpacked from the payload.
struct ProvisionSpec {
  request_id: i64,
  dbname:     String,
  sitename:   String,
  language:   String,
  category:   String,
  private:    bool,
  requester:  String,
}

impl<S: FarmStore, P: Provisioner> JobRunner<S, P> {
  pub fn new(
    store: Arc<S>,
    provisioner: Arc<P>,
    workflow: RequestWorkflow<S>,
    cache: Arc<WikiCache>,
    sink: Arc<dyn EventSink>,
  ) -> Self {
    Self { store, provisioner, workflow, cache, sink }
  }

  /// Claim and handle one job. Returns `false` when the outbox is empty.
  pub async fn run_next(&self) -> Result<bool> {
    let job = match self.store.claim_job().await.map_err(Error::store)? {
      Some(job) => job,
      None => return Ok(false),
    };

    tracing::debug!(id = %job.id, attempts = job.attempts, "running job");
    self.handle(job.payload).await?;
    self.store.finish_job(job.id).await.map_err(Error::store)?;
    Ok(true)
  }

  /// Drain the outbox; returns the number of jobs handled. Used by tests and
  /// maintenance paths.
  pub async fn run_pending(&self) -> Result<usize> {
    let mut handled = 0;
    while self.run_next().await? {
      handled += 1;
    }
    Ok(handled)
  }

  /// Poll the outbox forever. Spawned by the server binary.
  pub async fn run_loop(self, interval: std::time::Duration) {
    loop {
      match self.run_pending().await {
        Ok(0) => {}
        Ok(n) => tracing::debug!(jobs = n, "outbox drained"),
        Err(err) => tracing::error!(%err, "job runner pass failed"),
      }
      tokio::time::sleep(interval).await;
    }
  }

  async fn handle(&self, payload: JobPayload) -> Result<()> {
    match payload {
      JobPayload::ProvisionWiki {
        request_id,
        dbname,
        sitename,
        language,
        category,
        private,
        requester,
        approver: _,
        reason: _,
      } => {
        let spec = ProvisionSpec {
          request_id,
          dbname,
          sitename,
          language,
          category,
          private,
          requester,
        };
        self.provision(spec).await
      }
      JobPayload::SetContainerAccess { dbname, private } => {
        // Not worth reopening anything over: a later commit re-drives the
        // toggle, and the canonical private flag is already persisted.
        if let Err(err) =
          self.provisioner.set_container_access(&dbname, private).await
        {
          tracing::warn!(dbname, private, %err, "container access toggle failed");
        }
        Ok(())
      }
    }
  }

  /// One provisioning run. Every failure lands in
  /// [`RequestWorkflow::reopen_with_failure`]; the `Err` type here is the
  /// failure text, not an escaping error.
  async fn provision(&self, spec: ProvisionSpec) -> Result<()> {
    match self.try_provision(&spec).await {
      Ok(()) => self.workflow.record_provisioned(spec.request_id).await,
      Err(failure) => {
        self
          .workflow
          .reopen_with_failure(spec.request_id, &failure)
          .await
      }
    }
  }

  async fn try_provision(
    &self,
    spec: &ProvisionSpec,
  ) -> std::result::Result<(), String> {
    // The approval may be stale: someone could have created the wiki (or a
    // redelivered job already has). A taken name is the same soft failure
    // as any provisioning exception.
    let existing = self
      .store
      .get_wiki(&spec.dbname)
      .await
      .map_err(|e| e.to_string())?;
    if existing.is_some() {
      return Err(format!("dbname {:?} is no longer available", spec.dbname));
    }

    let input = NewWiki {
      dbname:     spec.dbname.clone(),
      sitename:   spec.sitename.clone(),
      language:   spec.language.clone(),
      category:   spec.category.clone(),
      db_cluster: acre_core::wiki::DEFAULT_CLUSTER.to_owned(),
      private:    spec.private,
    };

    self
      .provisioner
      .create_database(&spec.dbname, &input.db_cluster)
      .await
      .map_err(|e| format!("database creation failed: {e}"))?;

    self
      .provisioner
      .populate_schema(&spec.dbname)
      .await
      .map_err(|e| format!("schema population failed: {e}"))?;

    let record = self
      .store
      .insert_wiki(input)
      .await
      .map_err(|e| format!("wiki record insert failed: {e}"))?;

    self.sink.publish(LifecycleEvent::Created {
      dbname:  record.dbname.clone(),
      private: record.private,
    });
    if let Err(err) = self.cache.write(&record) {
      // The cache self-heals on next read; creation has already succeeded.
      tracing::warn!(dbname = %record.dbname, %err, "cache rebuild failed");
    }

    self
      .provisioner
      .grant_founder(&spec.dbname, &spec.requester)
      .await
      .map_err(|e| format!("founder account creation failed: {e}"))?;

    tracing::info!(
      dbname = %spec.dbname,
      request = spec.request_id,
      "wiki provisioned"
    );
    Ok(())
  }
}
