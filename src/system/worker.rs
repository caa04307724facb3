//! 发射器更新线程池
//!
//! 固定数量的常驻线程通过 crossbeam 通道接收任务。任务按值携带一组发射器，
//! 工作线程更新完后连同这些发射器的空间索引条目一起送回；
//! 因此同一个发射器任意时刻只属于一个线程，空间索引也只在调用线程上写入。
//!
//! 等待结果有单任务超时；超时任务的发射器会在之后的帧（或关闭时）收回。

use crate::core::{ParticleError, ParticleResult};
use crate::emitter::ParticleEmitter;
use crate::spatial::SpatialEntry;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use glam::Vec2;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread;
use std::time::{Duration, Instant};

/// 一个发射器的更新请求
pub(crate) struct EmitterWork {
    pub emitter: ParticleEmitter,
    /// `None` 表示本帧被 LOD 跳过，只重新登记空间索引
    pub dt: Option<f32>,
    /// 挂载实体本帧的位置
    pub anchor: Option<Vec2>,
}

/// 一组发射器的更新任务
pub(crate) struct UpdateJob {
    pub frame: u64,
    pub work: Vec<EmitterWork>,
}

/// 任务结果
pub(crate) struct UpdateOutcome {
    pub frame: u64,
    pub emitters: Vec<ParticleEmitter>,
    pub entries: Vec<SpatialEntry>,
    pub faulted: usize,
}

/// 更新一组发射器（单线程路径和工作线程共用）
///
/// 单个发射器出错或 panic 只影响它自己本帧的更新。
pub(crate) fn run_job(job: UpdateJob) -> UpdateOutcome {
    let mut emitters = Vec::with_capacity(job.work.len());
    let mut entries = Vec::new();
    let mut faulted = 0;

    for EmitterWork {
        mut emitter,
        dt,
        anchor,
    } in job.work
    {
        if let Some(dt) = dt {
            let result = catch_unwind(AssertUnwindSafe(|| emitter.update_anchored(dt, anchor)))
                .unwrap_or_else(|payload| Err(ParticleError::from_panic(payload)));
            if let Err(e) = result {
                tracing::warn!(
                    target: "particles::worker",
                    "Emitter {} update failed, skipped this frame: {}",
                    emitter.id(),
                    e
                );
                faulted += 1;
            }
        }
        emitter.collect_spatial_entries(&mut entries);
        emitters.push(emitter);
    }

    UpdateOutcome {
        frame: job.frame,
        emitters,
        entries,
        faulted,
    }
}

/// 常驻更新线程池
pub(crate) struct UpdateWorkerPool {
    job_tx: Option<Sender<UpdateJob>>,
    result_rx: Receiver<UpdateOutcome>,
    workers: Vec<thread::JoinHandle<()>>,
    /// 已提交、尚未收到结果的任务数
    in_flight: usize,
    /// 仍在工作线程上的发射器数
    emitters_in_flight: usize,
}

impl UpdateWorkerPool {
    pub fn new(threads: usize) -> ParticleResult<Self> {
        let threads = threads.max(1);
        let (job_tx, job_rx) = unbounded::<UpdateJob>();
        let (result_tx, result_rx) = unbounded::<UpdateOutcome>();

        let mut workers = Vec::with_capacity(threads);
        for index in 0..threads {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            let handle = thread::Builder::new()
                .name(format!("particle-worker-{}", index))
                .spawn(move || Self::worker_loop(job_rx, result_tx))
                .map_err(|e| ParticleError::Worker(format!("failed to spawn worker: {}", e)))?;
            workers.push(handle);
        }
        tracing::debug!(target: "particles::worker", "Started {} particle update workers", threads);

        Ok(Self {
            job_tx: Some(job_tx),
            result_rx,
            workers,
            in_flight: 0,
            emitters_in_flight: 0,
        })
    }

    fn worker_loop(job_rx: Receiver<UpdateJob>, result_tx: Sender<UpdateOutcome>) {
        // 发送端关闭后 recv 返回错误，线程退出
        while let Ok(job) = job_rx.recv() {
            let outcome = run_job(job);
            if result_tx.send(outcome).is_err() {
                break;
            }
        }
    }

    pub fn thread_count(&self) -> usize {
        self.workers.len()
    }

    pub fn emitters_in_flight(&self) -> usize {
        self.emitters_in_flight
    }

    /// 提交任务；线程池已关闭时把任务原样退回
    pub fn submit(&mut self, job: UpdateJob) -> Result<(), UpdateJob> {
        let Some(tx) = &self.job_tx else {
            return Err(job);
        };
        let count = job.work.len();
        match tx.send(job) {
            Ok(()) => {
                self.in_flight += 1;
                self.emitters_in_flight += count;
                Ok(())
            }
            Err(e) => Err(e.into_inner()),
        }
    }

    /// 等待一个结果，最多 `timeout`
    pub fn recv_timeout(&mut self, timeout: Duration) -> Result<UpdateOutcome, RecvTimeoutError> {
        let outcome = self.result_rx.recv_timeout(timeout)?;
        self.mark_received(&outcome);
        Ok(outcome)
    }

    /// 取出已经完成的迟到结果（不阻塞）
    pub fn drain_ready(&mut self) -> Vec<UpdateOutcome> {
        let mut outcomes = Vec::new();
        while self.in_flight > 0 {
            match self.result_rx.try_recv() {
                Ok(outcome) => {
                    self.mark_received(&outcome);
                    outcomes.push(outcome);
                }
                Err(_) => break,
            }
        }
        outcomes
    }

    fn mark_received(&mut self, outcome: &UpdateOutcome) {
        self.in_flight = self.in_flight.saturating_sub(1);
        self.emitters_in_flight = self.emitters_in_flight.saturating_sub(outcome.emitters.len());
    }

    /// 关闭线程池
    ///
    /// 在 `grace` 内收集未完成任务的结果并等待线程退出；超时的线程被分离，
    /// 它们手上的发射器随线程结束一起丢弃。
    pub fn shutdown(&mut self, grace: Duration) -> Vec<UpdateOutcome> {
        self.job_tx = None;
        let deadline = Instant::now() + grace;
        let mut outcomes = Vec::new();

        while self.in_flight > 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match self.recv_timeout(remaining) {
                Ok(outcome) => outcomes.push(outcome),
                Err(_) => break,
            }
        }

        let mut pending = std::mem::take(&mut self.workers);
        while !pending.is_empty() && Instant::now() < deadline {
            let (finished, running): (Vec<_>, Vec<_>) =
                pending.into_iter().partition(|h| h.is_finished());
            for handle in finished {
                let _ = handle.join();
            }
            pending = running;
            if !pending.is_empty() {
                thread::sleep(Duration::from_millis(1));
            }
        }
        if !pending.is_empty() {
            tracing::warn!(
                target: "particles::worker",
                "{} particle worker(s) did not stop within {:?}, detaching ({} emitter(s) dropped)",
                pending.len(),
                grace,
                self.emitters_in_flight
            );
        }
        self.in_flight = 0;
        self.emitters_in_flight = 0;
        outcomes
    }
}

impl Drop for UpdateWorkerPool {
    fn drop(&mut self) {
        if self.job_tx.is_some() {
            let _ = self.shutdown(Duration::from_millis(100));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emitter::{fixed_preset, EmitterKind};

    fn work(id: u64, dt: Option<f32>) -> EmitterWork {
        EmitterWork {
            emitter: ParticleEmitter::from_preset(id, EmitterKind::Color, &fixed_preset(8.0, 100, true))
                .unwrap(),
            dt,
            anchor: None,
        }
    }

    #[test]
    fn test_run_job_updates_and_collects_entries() {
        let outcome = run_job(UpdateJob {
            frame: 1,
            work: vec![work(1, Some(0.25)), work(2, None)],
        });
        assert_eq!(outcome.emitters.len(), 2);
        assert_eq!(outcome.emitters[0].particle_count(), 2);
        assert_eq!(outcome.emitters[1].particle_count(), 0);
        assert_eq!(outcome.entries.len(), 2);
        assert_eq!(outcome.faulted, 0);
    }

    #[test]
    fn test_run_job_counts_faults() {
        let outcome = run_job(UpdateJob {
            frame: 1,
            work: vec![work(1, Some(f32::NAN)), work(2, Some(0.25))],
        });
        assert_eq!(outcome.faulted, 1);
        assert_eq!(outcome.emitters.len(), 2);
        assert_eq!(outcome.emitters[1].particle_count(), 2);
    }

    #[test]
    fn test_pool_roundtrip_and_shutdown() {
        let mut pool = UpdateWorkerPool::new(2).unwrap();
        assert_eq!(pool.thread_count(), 2);
        for id in 0..4 {
            assert!(pool
                .submit(UpdateJob {
                    frame: 7,
                    work: vec![work(id, Some(0.25))],
                })
                .is_ok());
        }
        assert_eq!(pool.emitters_in_flight(), 4);

        let mut received = 0;
        while received < 4 {
            let outcome = pool.recv_timeout(Duration::from_secs(5)).unwrap();
            assert_eq!(outcome.frame, 7);
            received += outcome.emitters.len();
        }
        assert_eq!(pool.emitters_in_flight(), 0);

        assert!(pool.shutdown(Duration::from_secs(1)).is_empty());
        assert!(pool
            .submit(UpdateJob {
                frame: 8,
                work: vec![work(9, Some(0.25))],
            })
            .is_err());
    }
}
