use crate::particles::PoolStats;
use serde::Serialize;

/// 粒子系统统计（每帧刷新）
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ParticleSystemStats {
    /// 当前注册的发射器数
    pub emitters: usize,
    /// 存活粒子数
    pub live_particles: usize,
    /// 存活粒子数峰值
    pub peak_particles: usize,
    /// 上一帧绘制的粒子数
    pub rendered_particles: usize,
    /// 上一帧被剔除的发射器数
    pub culled_emitters: usize,
    /// 上一帧刷新的批次分组数
    pub batches_flushed: usize,
    /// 上一帧直接绘制的发射器数
    pub direct_draws: usize,
    /// 上一帧超时的更新任务数
    pub timed_out_tasks: usize,
    /// 上一帧更新出错的发射器数
    pub faulted_emitters: usize,
    /// 上一帧因 LOD 跳过更新的发射器数
    pub lod_skipped: usize,
    /// 上一帧分发到工作线程的任务数
    pub parallel_tasks: usize,
    /// 仍在工作线程上、尚未收回的发射器数
    pub emitters_in_flight: usize,
    pub update_time_ms: f64,
    pub render_time_ms: f64,
    /// 所有对象池（含系统储备池）的汇总
    #[serde(skip)]
    pub pool: PoolStats,
}

impl ParticleSystemStats {
    /// 单行摘要，用于日志
    pub fn summary(&self) -> String {
        format!(
            "emitters={} particles={} rendered={} culled={} batches={} update={:.2}ms render={:.2}ms",
            self.emitters,
            self.live_particles,
            self.rendered_particles,
            self.culled_emitters,
            self.batches_flushed,
            self.update_time_ms,
            self.render_time_ms
        )
    }
}
