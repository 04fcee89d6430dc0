//! Set or delete properties on every item of a result set, one request per item.

use anyhow::{Context, Result};
use log::{debug, info};
use std::sync::Arc;

use crate::content::ContentReader;
use crate::pipeline::{DispatchOpts, DispatchOutcome, dispatch_records};
use crate::props::encode::{Properties, encode_delete_keys};
use crate::props::item::ResultItem;

/// Transport for property requests. Implementations must be shareable across pool workers.
pub trait PropsClient: Send + Sync + 'static {
    /// Set `encoded` (already query-escaped `k=v1,v2;k2=v3`) on the item at `relative_path`.
    fn set_properties(&self, worker_id: usize, relative_path: &str, encoded: &str) -> Result<()>;

    /// Delete the properties named in `encoded` (query-escaped keys joined by `,`).
    fn delete_properties(&self, worker_id: usize, relative_path: &str, encoded: &str)
    -> Result<()>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PropsAction {
    Set,
    Delete,
}

/// Items to update and the properties to apply.
pub struct PropsParams<'a> {
    pub items_reader: &'a mut ContentReader,
    /// `k=v1,v2;k2=v3` for set; `k1,k2` for delete.
    pub props: String,
}

pub struct PropsService<C: PropsClient> {
    client: Arc<C>,
    dispatch: DispatchOpts,
}

impl<C: PropsClient> PropsService<C> {
    pub fn new(client: C) -> Self {
        Self {
            client: Arc::new(client),
            dispatch: DispatchOpts::default(),
        }
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        let cancel = self.dispatch.cancel_check.take();
        self.dispatch = DispatchOpts {
            cancel_check: cancel,
            ..DispatchOpts::with_threads(threads)
        };
        self
    }

    pub fn with_dispatch_opts(mut self, opts: DispatchOpts) -> Self {
        self.dispatch = opts;
        self
    }

    pub fn threads(&self) -> usize {
        self.dispatch.threads
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn set_props(&self, params: PropsParams<'_>) -> Result<DispatchOutcome> {
        info!("Setting properties...");
        let outcome = self.perform_request(params, PropsAction::Set)?;
        info!(
            "Done setting properties: {} succeeded, {} failed",
            outcome.success, outcome.failure
        );
        Ok(outcome)
    }

    pub fn delete_props(&self, params: PropsParams<'_>) -> Result<DispatchOutcome> {
        info!("Deleting properties...");
        let outcome = self.perform_request(params, PropsAction::Delete)?;
        info!(
            "Done deleting properties: {} succeeded, {} failed",
            outcome.success, outcome.failure
        );
        Ok(outcome)
    }

    fn perform_request(
        &self,
        params: PropsParams<'_>,
        action: PropsAction,
    ) -> Result<DispatchOutcome> {
        let encoded: Arc<str> = match action {
            PropsAction::Set => Properties::parse(&params.props)
                .context("parse properties")?
                .to_encoded_string()
                .into(),
            PropsAction::Delete => encode_delete_keys(&params.props).into(),
        };
        let client = Arc::clone(&self.client);
        dispatch_records(
            params.items_reader,
            &self.dispatch,
            move |worker_id, item: ResultItem| {
                let relative_path = item.relative_path();
                debug!("[Thread {}] {:?} properties on {}", worker_id, action, relative_path);
                let sent = match action {
                    PropsAction::Set => client.set_properties(worker_id, &relative_path, &encoded),
                    PropsAction::Delete => {
                        client.delete_properties(worker_id, &relative_path, &encoded)
                    }
                };
                sent.with_context(|| format!("{:?} properties on {}", action, relative_path))
            },
        )
    }
}
