//! Bookkeeping for tracked import jobs.
//!
//! [`JobRegistry`] maps import ids to their last known state and the
//! handle of their poll loop, if one is running. It does no I/O and is
//! owned by the tracker behind a lock; the handle type is generic so the
//! bookkeeping can be exercised without a runtime.
//!
//! Removed ids are remembered in a bounded list so that a late push
//! notification cannot bring a retired job back.

use std::collections::{HashMap, VecDeque};

use hb_core::import::{ImportProgress, ImportStatus};
use hb_core::types::ImportId;
use serde::Serialize;

/// How many removed ids are remembered.
pub const RETIRED_CAPACITY: usize = 256;

/// Tracking state of one job.
#[derive(Debug)]
pub struct TrackedJob<H> {
    pub file_name: String,
    pub status: ImportStatus,
    pub last_known: Option<ImportProgress>,
    pub poll: Option<H>,
    /// A grace-period removal has been scheduled.
    pub retiring: bool,
}

impl<H> TrackedJob<H> {
    fn new(file_name: String) -> Self {
        Self {
            file_name,
            status: ImportStatus::Pending,
            last_known: None,
            poll: None,
            retiring: false,
        }
    }
}

/// Read-only copy of a job's tracking state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobSnapshot {
    pub import_id: ImportId,
    pub file_name: String,
    pub status: ImportStatus,
    pub last_known: Option<ImportProgress>,
    pub polling: bool,
}

/// Result of [`JobRegistry::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Registered,
    AlreadyTracked,
    /// The id was tracked before and has been removed since.
    Retired,
}

#[derive(Debug)]
pub struct JobRegistry<H> {
    jobs: HashMap<ImportId, TrackedJob<H>>,
    retired: VecDeque<ImportId>,
}

impl<H> Default for JobRegistry<H> {
    fn default() -> Self {
        Self {
            jobs: HashMap::new(),
            retired: VecDeque::new(),
        }
    }
}

impl<H> JobRegistry<H> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking `import_id`. Idempotent, and refuses retired ids.
    pub fn register(&mut self, import_id: ImportId, file_name: String) -> Registration {
        if self.jobs.contains_key(&import_id) {
            return Registration::AlreadyTracked;
        }
        if self.is_retired(&import_id) {
            return Registration::Retired;
        }
        self.jobs.insert(import_id, TrackedJob::new(file_name));
        Registration::Registered
    }

    pub fn contains(&self, import_id: &ImportId) -> bool {
        self.jobs.contains_key(import_id)
    }

    pub fn is_retired(&self, import_id: &ImportId) -> bool {
        self.retired.contains(import_id)
    }

    pub fn get(&self, import_id: &ImportId) -> Option<&TrackedJob<H>> {
        self.jobs.get(import_id)
    }

    pub fn get_mut(&mut self, import_id: &ImportId) -> Option<&mut TrackedJob<H>> {
        self.jobs.get_mut(import_id)
    }

    pub fn is_polling(&self, import_id: &ImportId) -> bool {
        self.jobs
            .get(import_id)
            .is_some_and(|job| job.poll.is_some())
    }

    /// Detach the poll handle of a job, if it has one.
    pub fn take_poll(&mut self, import_id: &ImportId) -> Option<H> {
        self.jobs.get_mut(import_id).and_then(|job| job.poll.take())
    }

    /// Stop tracking `import_id` and remember it as retired.
    pub fn remove(&mut self, import_id: &ImportId) -> Option<TrackedJob<H>> {
        let job = self.jobs.remove(import_id)?;
        if self.retired.len() >= RETIRED_CAPACITY {
            self.retired.pop_front();
        }
        self.retired.push_back(import_id.clone());
        Some(job)
    }

    /// Detach every poll handle, leaving the jobs tracked.
    pub fn drain_polls(&mut self) -> Vec<(ImportId, H)> {
        self.jobs
            .iter_mut()
            .filter_map(|(id, job)| job.poll.take().map(|h| (id.clone(), h)))
            .collect()
    }

    pub fn snapshot(&self, import_id: &ImportId) -> Option<JobSnapshot> {
        self.jobs.get(import_id).map(|job| JobSnapshot {
            import_id: import_id.clone(),
            file_name: job.file_name.clone(),
            status: job.status,
            last_known: job.last_known.clone(),
            polling: job.poll.is_some(),
        })
    }

    pub fn ids(&self) -> Vec<ImportId> {
        let mut ids: Vec<_> = self.jobs.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}
