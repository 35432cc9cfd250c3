use chrono::Utc;

/// Wall clock seam; read once per countdown tick so clock changes are picked up.
pub trait Clock: Send + Sync {
    fn now_epoch_millis(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_epoch_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}
