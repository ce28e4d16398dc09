//! Speaking detection on a local audio stream.
//!
//! A frame-paced task samples the stream's analyser, computes the
//! normalized RMS level and reports only transitions across the
//! threshold.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::media::LevelMeter;

/// Root-mean-square of byte magnitudes, scaled to `0.0..=1.0`.
pub fn normalized_rms(bins: &[u8]) -> f32 {
    if bins.is_empty() {
        return 0.0;
    }
    let sum: f64 = bins.iter().map(|&v| f64::from(v) * f64::from(v)).sum();
    ((sum / bins.len() as f64).sqrt() / 255.0) as f32
}

#[derive(Debug, Clone, Copy)]
pub struct DetectorSettings {
    pub threshold: f32,
    pub frame_interval: Duration,
    pub bins: usize,
}

pub struct SpeakingDetector {
    cancel: CancellationToken,
    stopped: AtomicBool,
    speaking: Arc<AtomicBool>,
    meter: Arc<Mutex<Box<dyn LevelMeter>>>,
}

impl SpeakingDetector {
    /// Start sampling `meter`. `on_change` runs on the detector task each
    /// time the speaking state flips.
    pub fn start<F>(meter: Box<dyn LevelMeter>, settings: DetectorSettings, on_change: F) -> Self
    where
        F: FnMut(bool) + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let speaking = Arc::new(AtomicBool::new(false));
        let meter = Arc::new(Mutex::new(meter));

        tokio::spawn(sample_loop(
            Arc::clone(&meter),
            settings,
            Arc::clone(&speaking),
            cancel.clone(),
            on_change,
        ));

        Self {
            cancel,
            stopped: AtomicBool::new(false),
            speaking,
            meter,
        }
    }

    /// Last reported state.
    pub fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::Acquire)
    }

    /// Forget the last reported state so the next frame above threshold
    /// is reported again.
    pub fn reset(&self) {
        self.speaking.store(false, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        !self.stopped.load(Ordering::Acquire)
    }

    /// Halt the loop and disconnect the analyser. Safe to call repeatedly.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        self.cancel.cancel();
        self.meter.lock().disconnect();
        debug!("speaking detector stopped");
    }
}

impl Drop for SpeakingDetector {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn sample_loop<F>(
    meter: Arc<Mutex<Box<dyn LevelMeter>>>,
    settings: DetectorSettings,
    speaking: Arc<AtomicBool>,
    cancel: CancellationToken,
    mut on_change: F,
) where
    F: FnMut(bool) + Send + 'static,
{
    let mut ticker = tokio::time::interval(settings.frame_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut bins = vec![0u8; settings.bins.max(1)];

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        meter.lock().sample(&mut bins);
        let now = normalized_rms(&bins) > settings.threshold;

        if cancel.is_cancelled() {
            break;
        }
        if speaking.swap(now, Ordering::AcqRel) != now {
            on_change(now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{settle, FakeMeter};

    fn settings() -> DetectorSettings {
        DetectorSettings {
            threshold: 0.02,
            frame_interval: Duration::from_millis(16),
            bins: 128,
        }
    }

    #[test]
    fn rms_of_silence_is_zero() {
        assert_eq!(normalized_rms(&[0; 64]), 0.0);
        assert_eq!(normalized_rms(&[]), 0.0);
    }

    #[test]
    fn rms_of_full_scale_is_one() {
        assert!((normalized_rms(&[255; 32]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn rms_mixed_bins() {
        // sqrt((0 + 255^2) / 2) / 255 = 1/sqrt(2)
        let level = normalized_rms(&[0, 255]);
        assert!((level - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-6);
    }

    #[tokio::test(start_paused = true)]
    async fn reports_only_transitions() {
        let meter = FakeMeter::new();
        let level = meter.level_handle();
        let changes = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&changes);
        let detector = SpeakingDetector::start(Box::new(meter), settings(), move |s| sink.lock().push(s));

        level.set(0.5);
        tokio::time::sleep(Duration::from_millis(100)).await;
        level.set(0.0);
        tokio::time::sleep(Duration::from_millis(100)).await;
        level.set(0.4);
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(*changes.lock(), vec![true, false, true]);
        assert!(detector.is_speaking());
        detector.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn below_threshold_never_reports() {
        let meter = FakeMeter::new();
        meter.level_handle().set(0.01);
        let changes = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&changes);
        let _detector = SpeakingDetector::start(Box::new(meter), settings(), move |s| sink.lock().push(s));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(changes.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_idempotent_and_disconnects() {
        let meter = FakeMeter::new();
        let level = meter.level_handle();
        let disconnects = meter.disconnect_count();
        let changes = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&changes);
        let detector = SpeakingDetector::start(Box::new(meter), settings(), move |s| sink.lock().push(s));

        detector.stop();
        detector.stop();
        assert!(!detector.is_running());
        assert_eq!(disconnects.get(), 1);

        level.set(0.9);
        tokio::time::sleep(Duration::from_millis(100)).await;
        settle().await;
        assert!(changes.lock().is_empty());

        drop(detector);
        assert_eq!(disconnects.get(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_rearms_reporting() {
        let meter = FakeMeter::new();
        let level = meter.level_handle();
        let changes = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&changes);
        let detector = SpeakingDetector::start(Box::new(meter), settings(), move |s| sink.lock().push(s));

        level.set(0.5);
        tokio::time::sleep(Duration::from_millis(50)).await;
        detector.reset();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(*changes.lock(), vec![true, true]);
    }
}
