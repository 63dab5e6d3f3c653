use std::thread;

use tracing::{debug, error};

use crate::exec;
use crate::job::{self, Job, JobTable};
use crate::types::Command;

const KEYWORD_BACKGROUND: &str = "bg";
const KEYWORD_JOBS: &str = "xjobs";

/// Decides, once per submitted line, whether the line is a background
/// request, a job listing, or a foreground launch that blocks the loop.
pub struct Dispatcher {
	jobs: JobTable,
	reapers: Vec<thread::JoinHandle<()>>,
}

impl Dispatcher {
	pub fn new() -> Dispatcher {
		Dispatcher::with_table(JobTable::new())
	}

	pub fn with_table(jobs: JobTable) -> Dispatcher {
		Dispatcher { jobs, reapers: vec![] }
	}

	pub fn jobs(&self) -> &JobTable {
		&self.jobs
	}

	pub fn dispatch(&mut self, cmds: &[Command]) {
		let Some(first) = cmds.first() else { return };
		match first.name() {
			KEYWORD_BACKGROUND => self.dispatch_background(cmds),
			KEYWORD_JOBS => self.list_jobs(),
			_ => self.dispatch_foreground(cmds),
		}
	}

	fn dispatch_background(&mut self, cmds: &[Command]) {
		let Some(head) = cmds[0].strip_keyword() else {
			eprintln!("{}: missing command", KEYWORD_BACKGROUND);
			return;
		};
		let name = head.name().to_owned();
		let mut derived = Vec::with_capacity(cmds.len());
		derived.push(head);
		derived.extend_from_slice(&cmds[1..]);

		let pids = match exec::run_pipeline(&derived) {
			Ok(pids) => pids,
			Err(e) => {
				eprintln!("{}", e);
				return;
			},
		};
		let Some(&tracked) = pids.last() else { return };
		// insert strictly before the reaper starts waiting, so the job is
		// listed for its whole lifetime; a duplicate pid here means the old
		// entry is stale and the reaper below will clear it
		if let Err(e) = self.jobs.insert(Job::running(tracked, name)) {
			error!(%e, "job table out of sync");
		}
		self.reapers.push(job::spawn_reaper(self.jobs.clone(), pids));
		debug!(pid = tracked.as_raw(), "backgrounded");
	}

	fn list_jobs(&self) {
		for job in self.jobs.list() {
			println!("pid: {} name: {}", job.pid, job.name);
		}
	}

	fn dispatch_foreground(&self, cmds: &[Command]) {
		match exec::run_pipeline(cmds) {
			Ok(pids) => {
				let status = exec::wait_all(&pids);
				debug!(?status, "foreground pipeline finished");
			},
			Err(e) => eprintln!("{}", e),
		}
	}

	/// Joins every reaper spawned so far; background processes run to their
	/// natural termination first.
	pub fn shutdown(self) {
		for reaper in self.reapers {
			let _ = reaper.join();
		}
	}
}

impl Default for Dispatcher {
	fn default() -> Dispatcher {
		Dispatcher::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::job::JobState;
	use std::time::{Duration, Instant};

	fn cmd(args: &[&str]) -> Command {
		Command::new(args.iter().map(|s| s.to_string()).collect(), vec![])
	}

	fn wait_until_unlisted(d: &Dispatcher) {
		let deadline = Instant::now() + Duration::from_secs(10);
		while !d.jobs().list().is_empty() {
			assert!(Instant::now() < deadline, "job never reaped");
			thread::sleep(Duration::from_millis(20));
		}
	}

	#[test]
	fn empty_line_is_a_no_op() {
		let mut d = Dispatcher::new();
		d.dispatch(&[]);
		assert!(d.jobs().list().is_empty());
	}

	#[test]
	fn foreground_blocks_until_the_process_exits() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("made");
		let mut d = Dispatcher::new();
		d.dispatch(&[cmd(&["touch", path.to_str().unwrap()])]);
		assert!(path.exists());
		assert!(d.jobs().list().is_empty());
	}

	#[test]
	fn foreground_failure_leaves_the_table_alone() {
		let mut d = Dispatcher::new();
		d.dispatch(&[cmd(&["xeu-no-such-program"])]);
		assert!(d.jobs().list().is_empty());
	}

	#[test]
	fn background_job_is_listed_then_reaped() {
		let mut d = Dispatcher::new();
		d.dispatch(&[cmd(&["bg", "sleep", "0.5"])]);
		let jobs = d.jobs().list();
		assert_eq!(jobs.len(), 1);
		assert_eq!(jobs[0].name, "sleep");
		assert_eq!(jobs[0].state, JobState::Running);
		wait_until_unlisted(&d);
		d.shutdown();
	}

	#[test]
	fn bg_without_a_command_launches_nothing() {
		let mut d = Dispatcher::new();
		d.dispatch(&[cmd(&["bg"])]);
		assert!(d.jobs().list().is_empty());
	}

	#[test]
	fn xjobs_does_not_touch_the_table() {
		let mut d = Dispatcher::new();
		d.dispatch(&[cmd(&["bg", "sleep", "0.5"])]);
		let before = d.jobs().list();
		d.dispatch(&[cmd(&["xjobs"])]);
		assert_eq!(d.jobs().list(), before);
		wait_until_unlisted(&d);
		d.shutdown();
	}
}
