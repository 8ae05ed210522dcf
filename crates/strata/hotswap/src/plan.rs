//! Hotswap plan: operations and their partition
//!
//! The plan builder owns construction of each [`HotswapOperation`]; the
//! executor exclusively owns invocation. Operations are consumed by value
//! when applied, so no operation can run twice, and each closes over its
//! own control-plane handle and constant data only.

use crate::error::Result;
use futures::future::BoxFuture;
use std::fmt;
use strata_types::{AffectedResource, RejectedChange};

/// One live update ready to be applied
pub struct HotswapOperation {
    service: String,
    affected_resources: Vec<AffectedResource>,
    apply: BoxFuture<'static, Result<()>>,
}

impl HotswapOperation {
    /// `service` is the diagnostic tag identifying the service being
    /// hotswapped, e.g. `lambda-function`
    pub fn new(
        service: impl Into<String>,
        affected_resources: Vec<AffectedResource>,
        apply: BoxFuture<'static, Result<()>>,
    ) -> Self {
        Self {
            service: service.into(),
            affected_resources,
            apply,
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn affected_resources(&self) -> &[AffectedResource] {
        &self.affected_resources
    }

    /// Perform the live update. Consumes the operation.
    pub async fn apply(self) -> Result<()> {
        self.apply.await
    }
}

impl fmt::Debug for HotswapOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HotswapOperation")
            .field("service", &self.service)
            .field("affected_resources", &self.affected_resources)
            .finish_non_exhaustive()
    }
}

/// The classification verdict for one resource change
#[derive(Debug)]
pub enum ClassifiedChange {
    Hotswappable(HotswapOperation),
    Rejected(RejectedChange),
}

/// Total partition of all classified changes
#[derive(Debug, Default)]
pub struct HotswapPlan {
    pub hotswappable: Vec<HotswapOperation>,
    pub rejected: Vec<RejectedChange>,
}

impl HotswapPlan {
    /// Fold a detector's output into the plan
    pub fn absorb(&mut self, changes: Vec<ClassifiedChange>) {
        for change in changes {
            match change {
                ClassifiedChange::Hotswappable(operation) => self.hotswappable.push(operation),
                ClassifiedChange::Rejected(rejected) => self.rejected.push(rejected),
            }
        }
    }

    /// Merge a nested scope's plan into this one
    pub fn merge(&mut self, other: HotswapPlan) {
        self.hotswappable.extend(other.hotswappable);
        self.rejected.extend(other.rejected);
    }
}

/// Summary of an operation the executor ran, for caller-side reporting
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedOperation {
    pub service: String,
    pub resources: Vec<AffectedResource>,
}
