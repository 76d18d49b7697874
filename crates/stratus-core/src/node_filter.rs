// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Target node selection for multi-node operations.
//!
//! A [`NodeFilter`] narrows a cluster's node set to the nodes an operation
//! should touch. An explicit override set takes precedence over everything
//! else; otherwise exclusions are applied first, then host inclusion, then
//! host-group inclusion. Empty criteria let every node through.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// One machine of a managed cluster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Node {
    pub hostname: String,
    pub private_ip: String,
    pub public_ip: Option<String>,
    pub host_group: String,
}

impl Node {
    pub fn new(
        hostname: impl Into<String>,
        private_ip: impl Into<String>,
        host_group: impl Into<String>,
    ) -> Self {
        Self {
            hostname: hostname.into(),
            private_ip: private_ip.into(),
            public_ip: None,
            host_group: host_group.into(),
        }
    }

    pub fn with_public_ip(self, public_ip: impl Into<String>) -> Self {
        Self {
            public_ip: Some(public_ip.into()),
            ..self
        }
    }

    /// Whether `hosts` names this node by hostname, private or public IP.
    fn is_named_in(&self, hosts: &HashSet<String>) -> bool {
        hosts.contains(&self.hostname)
            || hosts.contains(&self.private_ip)
            || self
                .public_ip
                .as_ref()
                .is_some_and(|ip| hosts.contains(ip))
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {})", self.hostname, self.private_ip, self.host_group)
    }
}

/// Include / exclude criteria for target nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeFilter {
    /// Hostnames or IPs to keep; empty keeps all.
    pub include_hosts: HashSet<String>,
    /// Hostnames or IPs to drop.
    pub exclude_hosts: HashSet<String>,
    /// Host groups to keep; empty keeps all.
    pub include_host_groups: HashSet<String>,
    /// Explicit target set. When non-empty it is returned as-is.
    pub override_nodes: Option<HashSet<Node>>,
}

impl NodeFilter {
    /// Filter that lets every node through.
    pub fn all() -> Self {
        Self::default()
    }

    /// Whether the filter has no criteria at all.
    pub fn is_empty(&self) -> bool {
        self.include_hosts.is_empty()
            && self.exclude_hosts.is_empty()
            && self.include_host_groups.is_empty()
            && self.override_set().is_none()
    }

    fn override_set(&self) -> Option<&HashSet<Node>> {
        self.override_nodes.as_ref().filter(|nodes| !nodes.is_empty())
    }

    /// Evaluate the criteria for a single node, ignoring the override set.
    pub fn matches(&self, node: &Node) -> bool {
        if node.is_named_in(&self.exclude_hosts) {
            return false;
        }
        if !self.include_hosts.is_empty() && !node.is_named_in(&self.include_hosts) {
            return false;
        }
        self.include_host_groups.is_empty() || self.include_host_groups.contains(&node.host_group)
    }

    /// Compute the target subset of `candidates`.
    pub fn apply(&self, candidates: &HashSet<Node>) -> HashSet<Node> {
        if let Some(nodes) = self.override_set() {
            return nodes.clone();
        }
        candidates
            .iter()
            .filter(|node| self.matches(node))
            .cloned()
            .collect()
    }
}

impl fmt::Display for NodeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn sorted(set: &HashSet<String>) -> Vec<&str> {
            let mut items: Vec<&str> = set.iter().map(String::as_str).collect();
            items.sort_unstable();
            items
        }

        if let Some(nodes) = self.override_set() {
            let mut hosts: Vec<&str> = nodes.iter().map(|n| n.hostname.as_str()).collect();
            hosts.sort_unstable();
            return write!(f, "override={:?}", hosts);
        }
        write!(
            f,
            "hosts={:?} host_groups={:?} exclude_hosts={:?}",
            sorted(&self.include_hosts),
            sorted(&self.include_host_groups),
            sorted(&self.exclude_hosts)
        )
    }
}
