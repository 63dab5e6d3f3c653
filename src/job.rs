use std::sync::{Arc, Mutex};
use std::thread;

use nix::sys::wait::waitpid;
use nix::unistd::Pid;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState { Running, Completed }

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
	pub pid: Pid,
	pub name: String,
	pub state: JobState,
}

impl Job {
	pub fn running(pid: Pid, name: String) -> Job {
		Job { pid, name, state: JobState::Running }
	}
}

#[derive(Debug, Error)]
#[error("job {0} already tracked")]
pub struct DuplicateJob(pub Pid);

/// Registry of background jobs, shared between the dispatcher (inserts) and
/// the reaper threads (each removes its own entry, and nothing else does).
/// Cloning yields another handle to the same table.
#[derive(Debug, Clone, Default)]
pub struct JobTable {
	jobs: Arc<Mutex<Vec<Job>>>,
}

impl JobTable {
	pub fn new() -> JobTable {
		JobTable::default()
	}

	pub fn insert(&self, job: Job) -> Result<(), DuplicateJob> {
		let mut jobs = self.jobs.lock().unwrap();
		if jobs.iter().any(|j| j.pid == job.pid) {
			return Err(DuplicateJob(job.pid));
		}
		jobs.push(job);
		Ok(())
	}

	/// Idempotent; the second removal of a pid is a no-op.
	pub fn remove(&self, pid: Pid) -> Option<Job> {
		let mut jobs = self.jobs.lock().unwrap();
		let i = jobs.iter().position(|j| j.pid == pid)?;
		let mut job = jobs.remove(i);
		job.state = JobState::Completed;
		Some(job)
	}

	/// Snapshot in insertion order, copied under the lock so rendering never
	/// holds up inserts or removals.
	pub fn list(&self) -> Vec<Job> {
		self.jobs.lock().unwrap().clone()
	}
}

/// One reaper per background job. Blocks on each stage of the job's pipeline
/// in order, then drops the tracked (last) pid from the table. Fire and
/// forget: its only output is the table mutation and a log line.
pub fn spawn_reaper(table: JobTable, pids: Vec<Pid>) -> thread::JoinHandle<()> {
	thread::spawn(move || {
		let mut status = None;
		for &pid in &pids {
			status = match waitpid(pid, None) {
				Ok(status) => Some(status),
				Err(errno) => {
					warn!(pid = pid.as_raw(), %errno, "wait failed");
					None
				},
			};
		}
		let Some(&tracked) = pids.last() else { return };
		if let Some(job) = table.remove(tracked) {
			debug!(pid = tracked.as_raw(), name = %job.name, ?status, "background job finished");
		}
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	fn job(pid: i32, name: &str) -> Job {
		Job::running(Pid::from_raw(pid), name.to_owned())
	}

	#[test]
	fn list_preserves_insertion_order() {
		let table = JobTable::new();
		table.insert(job(10, "a")).unwrap();
		table.insert(job(11, "b")).unwrap();
		table.insert(job(12, "c")).unwrap();
		let names: Vec<String> = table.list().into_iter().map(|j| j.name).collect();
		assert_eq!(names, vec!["a", "b", "c"]);
	}

	#[test]
	fn insert_rejects_a_duplicate_pid() {
		let table = JobTable::new();
		table.insert(job(42, "a")).unwrap();
		assert!(table.insert(job(42, "b")).is_err());
		assert_eq!(table.list().len(), 1);
	}

	#[test]
	fn remove_is_idempotent() {
		let table = JobTable::new();
		table.insert(job(7, "a")).unwrap();
		assert!(table.remove(Pid::from_raw(7)).is_some());
		assert!(table.remove(Pid::from_raw(7)).is_none());
		assert!(table.list().is_empty());
	}

	#[test]
	fn removed_job_comes_back_completed() {
		let table = JobTable::new();
		table.insert(job(8, "a")).unwrap();
		let removed = table.remove(Pid::from_raw(8)).unwrap();
		assert_eq!(removed.state, JobState::Completed);
	}

	#[test]
	fn handles_are_views_of_one_table() {
		let table = JobTable::new();
		let other = table.clone();
		table.insert(job(9, "a")).unwrap();
		assert_eq!(other.list().len(), 1);
	}

	#[test]
	fn concurrent_insert_and_remove_leave_the_table_empty() {
		let table = JobTable::new();
		let workers: Vec<_> = (0..8)
			.map(|n| {
				let table = table.clone();
				thread::spawn(move || {
					let pid = Pid::from_raw(100 + n);
					table.insert(Job::running(pid, format!("w{}", n))).unwrap();
					table.remove(pid).unwrap();
				})
			})
			.collect();
		for w in workers {
			w.join().unwrap();
		}
		assert!(table.list().is_empty());
	}
}
