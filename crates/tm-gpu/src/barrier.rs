//! Access tracking and the barriers it produces.
//!
//! Each image remembers the last stage and access kind that touched it.
//! Binding an image for a new access compares against that record and
//! appends the barrier the hazard requires to the job's `PipelineBarrier`.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Transfer,
    Compute,
    Host,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryAccess {
    Read,
    Write,
}

/// Last recorded access to a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessState {
    pub stage: PipelineStage,
    pub access: MemoryAccess,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hazard {
    ReadAfterWrite,
    WriteAfterRead,
    WriteAfterWrite,
}

impl Hazard {
    /// Hazard introduced by `next` following `prev`, if any.
    pub fn between(prev: Option<AccessState>, next: MemoryAccess) -> Option<Hazard> {
        match (prev.map(|p| p.access), next) {
            (Some(MemoryAccess::Write), MemoryAccess::Read) => Some(Hazard::ReadAfterWrite),
            (Some(MemoryAccess::Read), MemoryAccess::Write) => Some(Hazard::WriteAfterRead),
            (Some(MemoryAccess::Write), MemoryAccess::Write) => Some(Hazard::WriteAfterWrite),
            (Some(MemoryAccess::Read), MemoryAccess::Read) | (None, _) => None,
        }
    }
}

/// Identity of a device resource within its context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub u64);

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "image#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageBarrier {
    pub resource: ResourceId,
    pub hazard: Hazard,
    pub src_stage: PipelineStage,
    pub dst_stage: PipelineStage,
}

/// Barriers accumulated while binding the resources of one job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineBarrier {
    pub images: Vec<ImageBarrier>,
}

impl PipelineBarrier {
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Record the barrier needed before `next` may access `resource`, and
    /// return the new access state for it.
    pub(crate) fn track(
        &mut self,
        resource: ResourceId,
        prev: Option<AccessState>,
        stage: PipelineStage,
        next: MemoryAccess,
    ) -> AccessState {
        if let (Some(p), Some(hazard)) = (prev, Hazard::between(prev, next)) {
            tracing::trace!(%resource, ?hazard, src = ?p.stage, dst = ?stage, "image barrier");
            self.images.push(ImageBarrier {
                resource,
                hazard,
                src_stage: p.stage,
                dst_stage: stage,
            });
        }
        AccessState {
            stage,
            access: next,
        }
    }
}
