use std::collections::HashMap;

use crate::types::{GatewayError, Organization, Result, Task};

/// Maps a task's `Source` to the organization that owns it
#[derive(Debug, Clone)]
pub struct SourceRouter {
    organizations: Vec<Organization>,
    by_source: HashMap<String, usize>,
    own: usize,
}

/// Tasks of one batch split by destination
#[derive(Debug, Default)]
pub struct Partition {
    /// Organization index -> tasks, in order of first appearance
    pub groups: Vec<(usize, Vec<Task>)>,
    /// Tasks whose source no organization claims
    pub unrouted: Vec<Task>,
}

impl SourceRouter {
    /// Build the routing table
    ///
    /// Every source must belong to exactly one organization and
    /// `own_organization` must be one of them.
    pub fn new(organizations: Vec<Organization>, own_organization: &str) -> Result<Self> {
        let own = organizations
            .iter()
            .position(|org| org.name == own_organization)
            .ok_or_else(|| {
                GatewayError::Config(format!("Own organization {own_organization} was not found"))
            })?;

        let mut by_source = HashMap::new();
        for (index, org) in organizations.iter().enumerate() {
            for source in &org.sources {
                if let Some(previous) = by_source.insert(source.clone(), index) {
                    return Err(GatewayError::Config(format!(
                        "Source {} is declared by both {} and {}",
                        source, organizations[previous].name, org.name
                    )));
                }
            }
        }

        Ok(Self {
            organizations,
            by_source,
            own,
        })
    }

    pub fn route(&self, task: &Task) -> Option<&Organization> {
        self.by_source
            .get(&task.source)
            .map(|&index| &self.organizations[index])
    }

    /// The gateway's own organization, target of automatic tasks
    pub fn own(&self) -> &Organization {
        &self.organizations[self.own]
    }

    pub fn organization(&self, index: usize) -> Option<&Organization> {
        self.organizations.get(index)
    }

    pub fn organizations(&self) -> &[Organization] {
        &self.organizations
    }

    /// Split a batch into per-organization groups and unrouted tasks
    ///
    /// Each task lands in exactly one of the two, and task order is kept
    /// within each group.
    pub fn partition(&self, tasks: Vec<Task>) -> Partition {
        let mut partition = Partition::default();
        let mut slot_of: HashMap<usize, usize> = HashMap::new();

        for task in tasks {
            match self.by_source.get(&task.source) {
                Some(&org) => {
                    let slot = *slot_of.entry(org).or_insert_with(|| {
                        partition.groups.push((org, Vec::new()));
                        partition.groups.len() - 1
                    });
                    partition.groups[slot].1.push(task);
                }
                None => partition.unrouted.push(task),
            }
        }

        partition
    }
}
