//! Serialized job execution on named worker threads.
//!
//! A [`Job`] wraps a runnable; a [`Looper`] owns a worker thread that
//! executes dispatched jobs one at a time, in deadline order; a
//! [`DispatchQueue`] multiplexes an independent job context onto an
//! existing looper so several subsystems can share one thread without
//! seeing each other's jobs in `exists`/`remove`/`flush`.
//!
//! Timed dispatch keeps a deadline-ordered [`List`] guarded by a mutex and
//! condition variable; the worker sleeps exactly until the next deadline
//! or a new dispatch, whichever comes first.
//!
//! Cancellation is best-effort: a job that has not started is skipped, a
//! running job is never interrupted.

use crate::containers::List;
use crate::fourcc::FourCc;
use crate::object::{SharedObject, Sp, Wp};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Lifecycle of one dispatch of a job.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobState {
    /// Waiting in a scheduler, or never dispatched.
    Pending,
    /// Currently executing on a worker thread.
    Running,
    /// Finished executing.
    Done,
    /// Cancelled before it started.
    Cancelled,
}

enum Target {
    None,
    Looper(Wp<Looper>),
    Queue(Wp<DispatchQueue>),
}

/// A runnable unit of work.
///
/// Jobs are shared objects: the scheduler holds one strong reference while
/// the job is queued, the dispatcher keeps its own to observe state or
/// cancel. A job may be dispatched again; the state machine and completion
/// signaling follow the most recent dispatch, so a re-dispatch while a run
/// is still in flight leaves `state`/`sync` reporting on the newer run.
pub struct Job {
    runnable: Box<dyn Fn() + Send + Sync>,
    state: Mutex<JobState>,
    changed: Condvar,
    target: Target,
}

impl Job {
    /// Create a free-standing job. Without a scheduler, `dispatch` runs it
    /// inline and delays are ignored.
    pub fn new<F: Fn() + Send + Sync + 'static>(f: F) -> Sp<Job> {
        Sp::new(Job {
            runnable: Box::new(f),
            state: Mutex::new(JobState::Pending),
            changed: Condvar::new(),
            target: Target::None,
        })
    }

    /// Create a job bound to a looper; `dispatch` enqueues there.
    pub fn with_looper<F: Fn() + Send + Sync + 'static>(looper: &Sp<Looper>, f: F) -> Sp<Job> {
        Sp::new(Job {
            runnable: Box::new(f),
            state: Mutex::new(JobState::Pending),
            changed: Condvar::new(),
            target: Target::Looper(looper.downgrade()),
        })
    }

    /// Create a job bound to a dispatch queue.
    pub fn with_queue<F: Fn() + Send + Sync + 'static>(
        queue: &Sp<DispatchQueue>,
        f: F,
    ) -> Sp<Job> {
        Sp::new(Job {
            runnable: Box::new(f),
            state: Mutex::new(JobState::Pending),
            changed: Condvar::new(),
            target: Target::Queue(queue.downgrade()),
        })
    }

    /// Current state of the most recent dispatch.
    pub fn state(&self) -> JobState {
        *self.state.lock().expect("job state lock")
    }

    /// Prevent a not-yet-started run. Returns true if the job was still
    /// pending; a running job cannot be interrupted.
    pub fn cancel(&self) -> bool {
        let mut state = self.state.lock().expect("job state lock");
        if *state == JobState::Pending {
            *state = JobState::Cancelled;
            self.changed.notify_all();
            true
        } else {
            false
        }
    }

    fn rearm(&self) {
        *self.state.lock().expect("job state lock") = JobState::Pending;
    }

    /// Run the job on the current thread. Skips a cancelled dispatch.
    fn execute(&self) {
        {
            let mut state = self.state.lock().expect("job state lock");
            if *state == JobState::Cancelled {
                return;
            }
            *state = JobState::Running;
        }
        (self.runnable)();
        let mut state = self.state.lock().expect("job state lock");
        // A re-dispatch during the run rearmed the job back to Pending; in
        // that case this run stays silent and the newer dispatch reports
        // completion.
        if *state == JobState::Running {
            *state = JobState::Done;
            self.changed.notify_all();
        }
    }

    /// Block until this dispatch finishes or the deadline passes. `None`
    /// waits forever. True means the job ran to completion.
    fn wait_done(&self, deadline: Option<Duration>) -> bool {
        let until = deadline.map(|d| Instant::now() + d);
        let mut state = self.state.lock().expect("job state lock");
        loop {
            match *state {
                JobState::Done => return true,
                JobState::Cancelled => return false,
                _ => {}
            }
            state = match until {
                None => self.changed.wait(state).expect("job state lock"),
                Some(until) => {
                    let now = Instant::now();
                    if now >= until {
                        return false;
                    }
                    let (guard, _) = self
                        .changed
                        .wait_timeout(state, until - now)
                        .expect("job state lock");
                    guard
                }
            };
        }
    }
}

impl SharedObject for Job {
    fn object_id(&self) -> FourCc {
        FourCc::JOB
    }
}

impl Sp<Job> {
    /// Run asynchronously after a delay, on the job's scheduler. A job
    /// with no scheduler runs inline and ignores the delay.
    pub fn dispatch_after(&self, after: Duration) {
        match &self.target {
            Target::None => {
                self.rearm();
                self.execute();
            }
            Target::Looper(looper) => match looper.upgrade() {
                Some(looper) => looper.dispatch(self, after),
                None => tracing::debug!("job dropped: looper is gone"),
            },
            Target::Queue(queue) => match queue.upgrade() {
                Some(queue) => queue.dispatch(self, after),
                None => tracing::debug!("job dropped: dispatch queue is gone"),
            },
        }
    }

    /// Run asynchronously as soon as possible.
    pub fn dispatch(&self) {
        self.dispatch_after(Duration::ZERO);
    }

    /// Run and wait for completion. `None` waits forever; returns false on
    /// timeout or cancellation.
    pub fn sync(&self, deadline: Option<Duration>) -> bool {
        match &self.target {
            Target::None => {
                self.rearm();
                self.execute();
                true
            }
            Target::Looper(looper) => match looper.upgrade() {
                Some(looper) => looper.sync(self, deadline),
                None => false,
            },
            Target::Queue(queue) => match queue.upgrade() {
                Some(queue) => queue.sync(self, deadline),
                None => false,
            },
        }
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job").field("state", &self.state()).finish()
    }
}

/// One scheduled dispatch.
struct Entry {
    job: Sp<Job>,
    when: Instant,
    /// Owning dispatch queue, or 0 for direct looper dispatch.
    queue: u64,
}

struct SchedulerState {
    timed: List<Entry>,
    terminated: bool,
}

/// Shared between the looper handle and its worker thread.
struct Scheduler {
    state: Mutex<SchedulerState>,
    available: Condvar,
    worker: Mutex<Option<thread::ThreadId>>,
}

impl Scheduler {
    /// False if the looper is already terminated and the job was dropped.
    fn enqueue(&self, job: &Sp<Job>, after: Duration, queue: u64) -> bool {
        job.rearm();
        let entry = Entry {
            job: job.clone(),
            when: Instant::now() + after,
            queue,
        };
        let mut state = self.state.lock().expect("scheduler lock");
        if state.terminated {
            tracing::debug!("job dropped: looper terminated");
            return false;
        }
        state.timed.insert_sorted_by(entry, |a, b| a.when.cmp(&b.when));
        drop(state);
        self.available.notify_one();
        true
    }

    fn exists(&self, job: &Sp<Job>, queue: u64) -> bool {
        let state = self.state.lock().expect("scheduler lock");
        state
            .timed
            .iter()
            .any(|e| e.queue == queue && e.job.ptr_eq(job))
    }

    fn remove(&self, job: &Sp<Job>, queue: u64) -> bool {
        let mut state = self.state.lock().expect("scheduler lock");
        state
            .timed
            .retain(|e| {
                let matched = e.queue == queue && e.job.ptr_eq(job);
                if matched {
                    // Wake any sync waiter; a removed job will never run.
                    e.job.cancel();
                }
                !matched
            })
            > 0
    }

    fn flush(&self, queue: Option<u64>) {
        let mut state = self.state.lock().expect("scheduler lock");
        state.timed.retain(|e| {
            let discard = queue.is_none_or(|id| e.queue == id);
            if discard {
                e.job.cancel();
            }
            !discard
        });
    }

    fn on_worker_thread(&self) -> bool {
        *self.worker.lock().expect("worker id lock") == Some(thread::current().id())
    }

    /// Worker loop: pop due entries, sleep until the next deadline.
    fn run(&self) {
        *self.worker.lock().expect("worker id lock") = Some(thread::current().id());
        loop {
            let due = {
                let mut state = self.state.lock().expect("scheduler lock");
                loop {
                    if state.terminated {
                        let dropped = state.timed.len();
                        if dropped > 0 {
                            tracing::debug!(dropped, "dropping jobs on terminate");
                        }
                        // Cancel before dropping so sync waiters wake up.
                        for entry in state.timed.iter() {
                            entry.job.cancel();
                        }
                        state.timed.clear();
                        return;
                    }
                    match state.timed.front().map(|e| e.when) {
                        Some(when) => {
                            let now = Instant::now();
                            if when <= now {
                                break state.timed.pop_front().expect("non-empty deadline list");
                            }
                            let (guard, _) = self
                                .available
                                .wait_timeout(state, when - now)
                                .expect("scheduler lock");
                            state = guard;
                        }
                        None => {
                            state = self.available.wait(state).expect("scheduler lock");
                        }
                    }
                }
            };
            // Lock released while the job runs.
            due.job.execute();
        }
    }
}

static QUEUE_IDS: AtomicU64 = AtomicU64::new(1);

/// A named worker thread serializing job execution.
///
/// Dropping the last reference terminates the worker; pending jobs are
/// dropped, the running one finishes first.
pub struct Looper {
    name: String,
    scheduler: Arc<Scheduler>,
    thread: Mutex<Option<thread::JoinHandle<()>>>,
}

impl Looper {
    /// Spawn a looper with a named worker thread.
    pub fn new(name: &str) -> crate::error::Result<Sp<Looper>> {
        let scheduler = Arc::new(Scheduler {
            state: Mutex::new(SchedulerState {
                timed: List::new(),
                terminated: false,
            }),
            available: Condvar::new(),
            worker: Mutex::new(None),
        });
        let for_worker = Arc::clone(&scheduler);
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || for_worker.run())?;
        tracing::debug!(name, "looper started");
        Ok(Sp::new(Looper {
            name: name.to_string(),
            scheduler,
            thread: Mutex::new(Some(handle)),
        }))
    }

    /// The looper's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Enqueue a job to run after a delay.
    pub fn dispatch(&self, job: &Sp<Job>, after: Duration) {
        self.scheduler.enqueue(job, after, 0);
    }

    /// Run a job and wait for it. `None` waits forever; false means
    /// timeout or cancellation. Called from the worker thread itself, the
    /// job runs inline to avoid self-deadlock.
    pub fn sync(&self, job: &Sp<Job>, deadline: Option<Duration>) -> bool {
        if self.scheduler.on_worker_thread() {
            job.rearm();
            job.execute();
            return true;
        }
        self.scheduler.enqueue(job, Duration::ZERO, 0) && job.wait_done(deadline)
    }

    /// Remove a directly dispatched job that has not started. True if
    /// anything was removed.
    pub fn remove(&self, job: &Sp<Job>) -> bool {
        self.scheduler.remove(job, 0)
    }

    /// Is the job still waiting in this looper?
    pub fn exists(&self, job: &Sp<Job>) -> bool {
        self.scheduler.exists(job, 0)
    }

    /// Drop every pending job, including those of attached dispatch
    /// queues.
    pub fn flush(&self) {
        self.scheduler.flush(None);
    }

    /// Stop the worker. Pending jobs are dropped; a running job finishes.
    /// Idempotent.
    pub fn terminate(&self) {
        {
            let mut state = self.scheduler.state.lock().expect("scheduler lock");
            if state.terminated {
                return;
            }
            state.terminated = true;
        }
        self.scheduler.available.notify_all();
        let handle = self.thread.lock().expect("looper thread lock").take();
        if let Some(handle) = handle {
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
        tracing::debug!(name = %self.name, "looper terminated");
    }
}

impl SharedObject for Looper {
    fn object_id(&self) -> FourCc {
        FourCc::LOOPER
    }

    fn on_last_retain(&self) {
        self.terminate();
    }
}

impl std::fmt::Debug for Looper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Looper").field("name", &self.name).finish()
    }
}

/// A serial job context multiplexed onto a shared looper.
///
/// Queues on the same looper execute on the same thread but keep separate
/// job books: `exists`, `remove` and `flush` only see this queue's jobs.
pub struct DispatchQueue {
    looper: Sp<Looper>,
    id: u64,
}

impl DispatchQueue {
    /// Attach a new queue to a looper.
    pub fn new(looper: &Sp<Looper>) -> Sp<DispatchQueue> {
        Sp::new(DispatchQueue {
            looper: looper.clone(),
            id: QUEUE_IDS.fetch_add(1, Ordering::SeqCst),
        })
    }

    /// The looper this queue executes on.
    pub fn looper(&self) -> &Sp<Looper> {
        &self.looper
    }

    /// Enqueue a job to run after a delay.
    pub fn dispatch(&self, job: &Sp<Job>, after: Duration) {
        self.looper.scheduler.enqueue(job, after, self.id);
    }

    /// Run a job and wait for it; see [`Looper::sync`].
    pub fn sync(&self, job: &Sp<Job>, deadline: Option<Duration>) -> bool {
        if self.looper.scheduler.on_worker_thread() {
            job.rearm();
            job.execute();
            return true;
        }
        self.looper.scheduler.enqueue(job, Duration::ZERO, self.id) && job.wait_done(deadline)
    }

    /// Remove a pending job from this queue only.
    pub fn remove(&self, job: &Sp<Job>) -> bool {
        self.looper.scheduler.remove(job, self.id)
    }

    /// Is the job waiting in this queue?
    pub fn exists(&self, job: &Sp<Job>) -> bool {
        self.looper.scheduler.exists(job, self.id)
    }

    /// Drop this queue's pending jobs; other queues and direct dispatches
    /// are untouched.
    pub fn flush(&self) {
        self.looper.scheduler.flush(Some(self.id));
    }
}

impl SharedObject for DispatchQueue {
    fn object_id(&self) -> FourCc {
        FourCc::DISPATCH_QUEUE
    }

    fn on_last_retain(&self) {
        self.flush();
    }
}

impl std::fmt::Debug for DispatchQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchQueue")
            .field("looper", &self.looper.name())
            .field("id", &self.id)
            .finish()
    }
}
