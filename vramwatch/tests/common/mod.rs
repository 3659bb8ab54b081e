//! Test doubles shared by the integration tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use vramwatch::cleaner::CacheReleaser;
use vramwatch::{CleanupError, DeviceInfo, GpuError, GpuInfoProvider};

pub fn device(name: &str, total: f64, used: f64) -> DeviceInfo {
    DeviceInfo {
        name: name.to_string(),
        memory_total_mb: total,
        memory_used_mb: used,
        memory_util: used / total,
    }
}

pub fn device_at(percent: f64) -> DeviceInfo {
    DeviceInfo {
        name: "GPU0".into(),
        memory_total_mb: 1000.0,
        memory_used_mb: percent * 10.0,
        memory_util: percent / 100.0,
    }
}

pub enum Step {
    Device(DeviceInfo),
    Empty,
    Fail(&'static str),
}

/// Plays back a script of responses; repeats the last one once exhausted.
pub struct ScriptedProvider {
    steps: Mutex<VecDeque<Step>>,
    fallback: Mutex<Option<DeviceInfo>>,
    pub calls: AtomicUsize,
    delay: Option<Duration>,
}

impl ScriptedProvider {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            fallback: Mutex::new(None),
            calls: AtomicUsize::new(0),
            delay: None,
        }
    }

    pub fn always(info: DeviceInfo) -> Self {
        let p = Self::new(Vec::new());
        *p.fallback.lock().unwrap() = Some(info);
        p
    }

    pub fn slow(info: DeviceInfo, delay: Duration) -> Self {
        let mut p = Self::always(info);
        p.delay = Some(delay);
        p
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl GpuInfoProvider for ScriptedProvider {
    fn query(&self) -> Result<Option<DeviceInfo>, GpuError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(d) = self.delay {
            std::thread::sleep(d);
        }
        match self.steps.lock().unwrap().pop_front() {
            Some(Step::Device(info)) => Ok(Some(info)),
            Some(Step::Empty) => Ok(None),
            Some(Step::Fail(msg)) => Err(GpuError::Other(msg.to_string())),
            None => Ok(self.fallback.lock().unwrap().clone()),
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Always fails, counting how often it was asked.
#[derive(Default)]
pub struct FailingProvider {
    pub calls: AtomicUsize,
}

impl GpuInfoProvider for FailingProvider {
    fn query(&self) -> Result<Option<DeviceInfo>, GpuError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(GpuError::Other("driver went away".into()))
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}

/// Release primitive double: hands out allocated sizes from a list and records calls.
pub struct FakeReleaser {
    allocated: Mutex<VecDeque<f64>>,
    pub log: Mutex<Vec<&'static str>>,
    fail_release: bool,
}

impl FakeReleaser {
    pub fn new(allocated: Vec<f64>) -> Self {
        Self {
            allocated: Mutex::new(allocated.into()),
            log: Mutex::new(Vec::new()),
            fail_release: false,
        }
    }

    pub fn failing() -> Self {
        let mut r = Self::new(vec![100.0]);
        r.fail_release = true;
        r
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.log.lock().unwrap().clone()
    }
}

impl CacheReleaser for FakeReleaser {
    fn is_available(&self) -> bool {
        true
    }

    fn allocated_mb(&self) -> Result<f64, CleanupError> {
        self.log.lock().unwrap().push("allocated");
        let mut q = self.allocated.lock().unwrap();
        let v = if q.len() > 1 { q.pop_front() } else { q.front().copied() };
        Ok(v.unwrap_or(0.0))
    }

    fn release_cached(&self) -> Result<(), CleanupError> {
        self.log.lock().unwrap().push("release");
        if self.fail_release {
            return Err(CleanupError::Runtime("out of memory".into()));
        }
        Ok(())
    }

    fn reclaim(&self) -> Result<(), CleanupError> {
        self.log.lock().unwrap().push("reclaim");
        Ok(())
    }

    fn synchronize(&self) -> Result<(), CleanupError> {
        self.log.lock().unwrap().push("synchronize");
        Ok(())
    }
}

/// Poll `cond` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}
