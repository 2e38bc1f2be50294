//! Capacity ledger: local view of node budgets during one placement pass.
//!
//! Built from a directory snapshot before each pass and thrown away after.
//! Every successful reservation is journaled so a failed pass can put all
//! of them back with [`CapacityLedger::rollback`].

use std::collections::BTreeMap;

use shardgrid_core::{CandidateNode, NodeId};

#[derive(Debug, Clone, Default)]
pub struct CapacityLedger {
    remaining: BTreeMap<NodeId, u64>,
    /// Reservations made since the last checkpoint, oldest first.
    journal: Vec<(NodeId, u64)>,
}

impl CapacityLedger {
    pub fn new(nodes: &[CandidateNode]) -> Self {
        Self {
            remaining: nodes
                .iter()
                .map(|n| (n.id.clone(), n.remaining_capacity))
                .collect(),
            journal: Vec::new(),
        }
    }

    /// Take `amount` from the node's budget.
    ///
    /// Returns false and leaves the budget unchanged when the node is
    /// unknown or has less than `amount` left.
    pub fn reserve(&mut self, node: &str, amount: u64) -> bool {
        let Some(remaining) = self.remaining.get_mut(node) else {
            return false;
        };
        if amount > *remaining {
            return false;
        }
        *remaining -= amount;
        self.journal.push((node.to_string(), amount));
        true
    }

    /// Give back a reservation made with [`reserve`](Self::reserve).
    pub fn release(&mut self, node: &str, amount: u64) {
        if let Some(remaining) = self.remaining.get_mut(node) {
            *remaining = remaining.saturating_add(amount);
        }
        if let Some(pos) = self
            .journal
            .iter()
            .rposition(|(id, reserved)| id == node && *reserved == amount)
        {
            self.journal.remove(pos);
        }
    }

    /// Forget the journal; reservations made so far become permanent.
    pub fn checkpoint(&mut self) {
        self.journal.clear();
    }

    /// Release every reservation made since the last checkpoint.
    pub fn rollback(&mut self) {
        while let Some((node, amount)) = self.journal.pop() {
            if let Some(remaining) = self.remaining.get_mut(&node) {
                *remaining = remaining.saturating_add(amount);
            }
        }
    }

    pub fn remaining(&self, node: &str) -> Option<u64> {
        self.remaining.get(node).copied()
    }

    /// Remaining budget of every node, keyed by id.
    pub fn snapshot(&self) -> BTreeMap<NodeId, u64> {
        self.remaining.clone()
    }

    pub fn pending(&self) -> usize {
        self.journal.len()
    }
}
