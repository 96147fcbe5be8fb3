//! Background jobs for long-running session work.
//!
//! A job runs on its own thread and reports through a channel. The owner polls
//! [`JobHandle::try_event`] from its own loop or blocks in [`JobHandle::wait`].
//! Every job ends with exactly one terminal event.

use crate::{
    error::{IdentityError, Result},
    loader::CancelFlag,
    session::{LoadSummary, Session},
};
use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use std::{
    io,
    path::PathBuf,
    sync::Arc,
    thread::{self, JoinHandle},
};
use tracing::{debug, warn};

/// Message from a job to its owner.
#[derive(Debug)]
pub enum JobEvent<T> {
    /// Units of work done so far (records, for loads)
    Progress(usize),
    Finished(T),
    Failed(IdentityError),
    Cancelled,
}

impl<T> JobEvent<T> {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobEvent::Progress(_))
    }
}

/// Owner side of a running job.
pub struct JobHandle<T> {
    events: Receiver<JobEvent<T>>,
    cancel: CancelFlag,
    thread: Option<JoinHandle<()>>,
}

impl<T> JobHandle<T> {
    /// Request cooperative cancellation.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    /// Next event, if one is ready.
    pub fn try_event(&self) -> Option<JobEvent<T>> {
        match self.events.try_recv() {
            Ok(ev) => Some(ev),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Block until the job ends, feeding progress to `on_progress`.
    pub fn wait_with(mut self, mut on_progress: impl FnMut(usize)) -> Result<T> {
        let mut outcome = None;
        for ev in self.events.iter() {
            match ev {
                JobEvent::Progress(n) => on_progress(n),
                JobEvent::Finished(v) => {
                    outcome = Some(Ok(v));
                    break;
                }
                JobEvent::Failed(e) => {
                    outcome = Some(Err(e));
                    break;
                }
                JobEvent::Cancelled => {
                    outcome = Some(Err(IdentityError::Cancelled));
                    break;
                }
            }
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("worker thread panicked");
            }
        }
        outcome.unwrap_or_else(|| {
            Err(IdentityError::Io(io::Error::other(
                "worker exited without a result",
            )))
        })
    }

    pub fn wait(self) -> Result<T> {
        self.wait_with(|_| {})
    }
}

fn finish<T>(tx: &Sender<JobEvent<T>>, result: Result<T>) {
    let ev = match result {
        Ok(v) => JobEvent::Finished(v),
        Err(IdentityError::Cancelled) => JobEvent::Cancelled,
        Err(e) => JobEvent::Failed(e),
    };
    // owner may have gone away
    let _ = tx.send(ev);
}

/// Run `job` on a worker thread against a shared session.
pub fn spawn_job<T, F>(session: Arc<Session>, name: &str, job: F) -> JobHandle<T>
where
    T: Send + 'static,
    F: FnOnce(&Session, &CancelFlag) -> Result<T> + Send + 'static,
{
    let (tx, rx) = unbounded();
    let cancel = CancelFlag::new();
    let flag = cancel.clone();
    let name = name.to_string();
    let thread = thread::spawn(move || {
        debug!(job = %name, "worker started");
        let result = if flag.is_cancelled() {
            Err(IdentityError::Cancelled)
        } else {
            job(&session, &flag)
        };
        finish(&tx, result);
        debug!(job = %name, "worker finished");
    });
    JobHandle {
        events: rx,
        cancel,
        thread: Some(thread),
    }
}

/// Load a detection stream in the background. Progress events carry the
/// number of frame records read.
pub fn spawn_load(session: Arc<Session>, path: PathBuf) -> JobHandle<LoadSummary> {
    let (tx, rx) = unbounded();
    let cancel = CancelFlag::new();
    let flag = cancel.clone();
    let thread = thread::spawn(move || {
        let progress_tx = tx.clone();
        let result = session.load_path(&path, Some(flag), move |n| {
            let _ = progress_tx.send(JobEvent::Progress(n));
        });
        finish(&tx, result);
    });
    JobHandle {
        events: rx,
        cancel,
        thread: Some(thread),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use flate2::{write::GzEncoder, Compression};
    use serde_json::json;
    use std::io::Write;

    fn write_stream(path: &std::path::Path, frames: u64) {
        let mut enc = GzEncoder::new(std::fs::File::create(path).unwrap(), Compression::fast());
        for f in 0..frames {
            let rec = json!({"f_idx": f, "det": [
                {"track_id": 1, "box": {"x1": 0.0, "y1": 0.0, "x2": 10.0, "y2": 10.0}}
            ]});
            writeln!(enc, "{rec}").unwrap();
        }
        enc.finish().unwrap();
    }

    #[test]
    fn load_reports_progress_then_finishes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("det.jsonl.gz");
        write_stream(&path, 25);

        let config = SessionConfig {
            progress_every: 10,
            ..SessionConfig::default()
        };
        let session = Arc::new(Session::new(config));
        let mut progress = Vec::new();
        let summary = spawn_load(session.clone(), path)
            .wait_with(|n| progress.push(n))
            .unwrap();

        assert_eq!(progress, vec![10, 20]);
        assert_eq!(summary.records, 25);
        assert_eq!(summary.tracks, 1);
        assert_eq!(session.read(|g| g.len()), 1);
    }

    #[test]
    fn failed_load_leaves_session_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let session = Arc::new(Session::new(SessionConfig::default()));
        let err = spawn_load(session.clone(), dir.path().join("missing.gz"))
            .wait()
            .unwrap_err();
        assert!(matches!(err, IdentityError::Io(_)));
        assert!(session.read(|g| g.is_empty()));
    }

    #[test]
    fn cancelled_job_ends_with_cancelled_event() {
        let session = Arc::new(Session::new(SessionConfig::default()));
        let (go_tx, go_rx) = unbounded::<()>();
        let handle = spawn_job(session, "wait-for-cancel", move |_, flag| {
            go_rx.recv().ok();
            if flag.is_cancelled() {
                return Err(IdentityError::Cancelled);
            }
            Ok(1usize)
        });
        handle.cancel();
        go_tx.send(()).unwrap();
        assert!(matches!(handle.wait(), Err(IdentityError::Cancelled)));
    }

    #[test]
    fn job_runs_session_operation() {
        let session = Arc::new(Session::new(SessionConfig::default()));
        let n = spawn_job(session, "stitch", |s, _| Ok(s.auto_stitch()))
            .wait()
            .unwrap();
        assert_eq!(n, 0);
    }
}
