//! Timer service for node-owned timers
//!
//! Fixed-period and one-shot timers run as tokio tasks; cron timers are jobs on
//! a shared tokio-cron-scheduler instance. No timer ever touches node state:
//! firing enqueues an `EngineRequest::TimerFired` for the owning instance and
//! the evaluation loop does the rest.
//!
//! Every timer is owned by a [`TimerHandle`]. Dropping or cancelling the
//! handle stops the timer synchronously (the cancellation flag is checked
//! before each send) and the engine ignores requests for instances it has
//! already destroyed.

use crate::{node::InstanceId, runtime::driver::EngineRequest};
use anyhow::Result;
use parking_lot::Mutex;
use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{sync::mpsc::UnboundedSender, task::JoinHandle};
use tokio_cron_scheduler::{Job, JobScheduler};
use uuid::Uuid;

/// Name a node gives one of its timers
pub type TimerTag = &'static str;

/// Spawns timers that report back to the evaluation loop
#[derive(Clone)]
pub struct TimerService {
    requests: UnboundedSender<EngineRequest>,
    cron: Option<JobScheduler>,
}

impl fmt::Debug for TimerService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerService")
            .field("cron", &self.cron.is_some())
            .finish()
    }
}

enum TimerTask {
    Task(JoinHandle<()>),
    Cron {
        scheduler: JobScheduler,
        job: Arc<Mutex<Option<Uuid>>>,
    },
}

/// Owner of one running timer; cancels it on drop
pub struct TimerHandle {
    cancelled: Arc<AtomicBool>,
    task: Option<TimerTask>,
}

impl fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerHandle")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl TimerService {
    pub fn new(requests: UnboundedSender<EngineRequest>) -> Self {
        Self {
            requests,
            cron: None,
        }
    }

    /// Serve cron timers from an already started scheduler
    pub fn with_cron(mut self, scheduler: JobScheduler) -> Self {
        self.cron = Some(scheduler);
        self
    }

    /// Fire every `period`, first after one full period
    pub fn every(&self, instance: InstanceId, tag: TimerTag, period: Duration) -> TimerHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);
        let requests = self.requests.clone();

        let task = tokio::spawn(async move {
            let mut interval =
                tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if !fire(&flag, &requests, instance, tag) {
                    break;
                }
            }
        });

        TimerHandle {
            cancelled,
            task: Some(TimerTask::Task(task)),
        }
    }

    /// Fire once after `delay`
    pub fn after(&self, instance: InstanceId, tag: TimerTag, delay: Duration) -> TimerHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);
        let requests = self.requests.clone();

        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            fire(&flag, &requests, instance, tag);
        });

        TimerHandle {
            cancelled,
            task: Some(TimerTask::Task(task)),
        }
    }

    /// Fire on a 6-field cron schedule
    ///
    /// The expression is validated immediately; registration with the
    /// scheduler completes in the background.
    pub fn cron(
        &self,
        instance: InstanceId,
        tag: TimerTag,
        expression: &str,
    ) -> Result<TimerHandle> {
        let scheduler = self
            .cron
            .clone()
            .ok_or_else(|| anyhow::anyhow!("Cron scheduler not available in this runtime"))?;

        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);
        let requests = self.requests.clone();

        let job = Job::new_async(expression, move |_uuid, _l| {
            let flag = Arc::clone(&flag);
            let requests = requests.clone();
            Box::pin(async move {
                tracing::debug!("🔔 Cron timer '{}' fired for instance {:?}", tag, instance);
                fire(&flag, &requests, instance, tag);
            })
        })
        .map_err(|e| anyhow::anyhow!("Invalid cron expression '{}': {}", expression, e))?;

        let slot = Arc::new(Mutex::new(None));
        let registered = Arc::clone(&slot);
        let registering = scheduler.clone();
        let flag = Arc::clone(&cancelled);
        tokio::spawn(async move {
            match registering.add(job).await {
                Ok(uuid) => {
                    *registered.lock() = Some(uuid);
                    // Cancelled while registering: take the job straight back out
                    if flag.load(Ordering::SeqCst) {
                        remove_cron_job(&registering, &registered).await;
                    }
                }
                Err(e) => tracing::error!("❌ Failed to register cron timer '{}': {}", tag, e),
            }
        });

        Ok(TimerHandle {
            cancelled,
            task: Some(TimerTask::Cron {
                scheduler,
                job: slot,
            }),
        })
    }

    /// Stop the cron scheduler, if any
    pub async fn shutdown(&self) -> Result<()> {
        if let Some(scheduler) = &self.cron {
            let mut scheduler = scheduler.clone();
            scheduler.shutdown().await?;
        }
        Ok(())
    }
}

impl TimerHandle {
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Stop the timer. No request is sent for it afterwards.
    pub fn cancel(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
        match self.task.take() {
            Some(TimerTask::Task(task)) => task.abort(),
            Some(TimerTask::Cron { scheduler, job }) => {
                if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                    runtime.spawn(async move {
                        remove_cron_job(&scheduler, &job).await;
                    });
                }
            }
            None => {}
        }
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Send one firing unless cancelled; false once the loop is gone
fn fire(
    cancelled: &AtomicBool,
    requests: &UnboundedSender<EngineRequest>,
    instance: InstanceId,
    tag: TimerTag,
) -> bool {
    if cancelled.load(Ordering::SeqCst) {
        return false;
    }
    requests
        .send(EngineRequest::TimerFired { instance, tag })
        .is_ok()
}

async fn remove_cron_job(scheduler: &JobScheduler, job: &Mutex<Option<Uuid>>) {
    let uuid = job.lock().take();
    if let Some(uuid) = uuid {
        if let Err(e) = scheduler.remove(&uuid).await {
            tracing::warn!("⚠️ Failed to remove cron job {}: {}", uuid, e);
        } else {
            tracing::debug!("🛑 Removed cron job {}", uuid);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test(start_paused = true)]
    async fn every_fires_periodically_until_dropped() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let timers = TimerService::new(tx);

        let handle = timers.every(InstanceId(7), "cycle", Duration::from_secs(10));
        tokio::time::sleep(Duration::from_secs(25)).await;

        let mut fired = 0;
        while let Ok(request) = rx.try_recv() {
            assert!(matches!(
                request,
                EngineRequest::TimerFired { instance: InstanceId(7), tag: "cycle" }
            ));
            fired += 1;
        }
        assert_eq!(fired, 2);

        drop(handle);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_one_shot_never_fires() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let timers = TimerService::new(tx);

        let mut handle = timers.after(InstanceId(1), "delay", Duration::from_secs(5));
        handle.cancel();
        assert!(handle.is_cancelled());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn cron_requires_scheduler() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let timers = TimerService::new(tx);
        assert!(timers.cron(InstanceId(1), "cycle", "0 * * * * *").is_err());
    }
}
