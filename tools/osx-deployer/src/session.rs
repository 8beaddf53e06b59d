use std::{collections::BTreeMap, path::Path};

use alloy_primitives::{Address, Bytes, B256, U256};
use serde::Serialize;
use serde_json::json;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::{addresses::write_json_atomic, errors::ResolveError};

/// A call the management DAO has to execute because the deployer may not.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Action {
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
}

/// State threaded through every step of one run.
#[derive(Debug)]
pub struct DeploymentSession {
    pub network: String,
    pub deployer: Address,
    /// Queue permission changes as management DAO actions instead of sending them.
    pub propose: bool,
    deployments: BTreeMap<String, Address>,
    actions: Vec<Action>,
    transactions: Vec<B256>,
}

impl DeploymentSession {
    pub fn new(network: impl Into<String>, deployer: Address, propose: bool) -> Self {
        Self {
            network: network.into(),
            deployer,
            propose,
            deployments: BTreeMap::new(),
            actions: Vec::new(),
            transactions: Vec::new(),
        }
    }

    /// Address known to this run, before any registry lookup.
    pub fn get(&self, name: &str) -> Option<Address> {
        self.deployments.get(name).copied()
    }

    pub fn record(&mut self, name: impl Into<String>, address: Address) {
        self.deployments.insert(name.into(), address);
    }

    pub fn deployments(&self) -> &BTreeMap<String, Address> {
        &self.deployments
    }

    pub fn queue_action(&mut self, action: Action) {
        self.actions.push(action);
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn record_tx(&mut self, tx: B256) {
        self.transactions.push(tx);
    }

    pub fn transactions(&self) -> &[B256] {
        &self.transactions
    }

    /// Write the queued actions for a management DAO proposal.
    pub fn write_actions(&self, path: &Path) -> Result<(), ResolveError> {
        let generated_at = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_else(|_| "unknown".to_string());
        let doc = json!({
            "network": self.network,
            "generated_at": generated_at,
            "actions": self.actions,
        });
        write_json_atomic(path, &doc)
    }
}
