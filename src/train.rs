use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tracing::info;

use crate::config::TrainingHyperparameters;
use crate::dataset::{BatchGenerator, epoch_size};
use crate::error::{CharRnnError, Result};
use crate::model::SequenceModel;

/// Mean of the losses seen since the last reset.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RunningAverage {
    sum: f64,
    count: usize,
}

impl RunningAverage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.sum = 0.0;
        self.count = 0;
    }

    /// Fold in one loss and return the updated average.
    pub fn update(&mut self, loss: f32) -> f32 {
        self.sum += loss as f64;
        self.count += 1;
        self.average()
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Zero before the first update.
    pub fn average(&self) -> f32 {
        if self.count == 0 {
            return 0.0;
        }
        (self.sum / self.count as f64) as f32
    }

    pub fn perplexity(&self) -> f32 {
        self.average().exp()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EpochMode {
    Train,
    Eval,
}

impl EpochMode {
    fn label(self) -> &'static str {
        match self {
            EpochMode::Train => "train",
            EpochMode::Eval => "eval",
        }
    }
}

/// Outcome of one pass over the data.
#[derive(Clone, Debug, PartialEq)]
pub struct EpochReport {
    /// Steps actually run; below `epoch_size` only when stopped early.
    pub steps: usize,
    pub epoch_size: usize,
    pub average_loss: f32,
    pub perplexity: f32,
    pub chars_per_second: f64,
    pub elapsed: Duration,
    pub stopped_early: bool,
}

/// Runs epochs of truncated-BPTT training or evaluation.
#[derive(Clone, Debug, Default)]
pub struct EpochRunner {
    log_frequency: usize,
    stop_flag: Option<Arc<AtomicBool>>,
}

impl EpochRunner {
    /// Log progress every `log_frequency` steps; zero disables progress lines.
    pub fn new(log_frequency: usize) -> Self {
        Self {
            log_frequency,
            stop_flag: None,
        }
    }

    pub fn from_config(training: &TrainingHyperparameters) -> Self {
        Self::new(training.log_frequency)
    }

    /// Stop between steps once `flag` is set.
    pub fn with_stop_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.stop_flag = Some(flag);
        self
    }

    fn should_stop(&self) -> bool {
        self.stop_flag
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    /// Pull `epoch_size(data_size, ..)` batches from `generator`, threading the
    /// recurrent state from each step into the next, and report the running
    /// perplexity.
    pub fn run_epoch<M: SequenceModel>(
        &self,
        model: &mut M,
        generator: &mut BatchGenerator,
        data_size: usize,
        mode: EpochMode,
    ) -> Result<EpochReport> {
        let batch_size = generator.batch_size();
        let unroll_count = generator.unroll_count();
        let epoch_size = epoch_size(data_size, batch_size, unroll_count);
        if epoch_size == 0 {
            return Err(CharRnnError::EmptyEpoch {
                data_size,
                batch_size,
                unroll_count,
            });
        }

        info!(
            mode = mode.label(),
            epoch_size, data_size, unroll_count, batch_size, "starting epoch"
        );

        let chars_per_step = (batch_size * unroll_count) as f64;
        let mut state = model.zero_state(batch_size);
        let mut monitor = RunningAverage::new();
        let mut steps = 0;
        let mut stopped_early = false;
        let start = Instant::now();

        for step in 0..epoch_size {
            if self.should_stop() {
                stopped_early = true;
                break;
            }

            let batch = generator.next_batch();
            let (inputs, targets) = batch.split();
            let (loss, next_state) = match mode {
                EpochMode::Train => model.train_step(&inputs, &targets, state)?,
                EpochMode::Eval => model.eval_step(&inputs, &targets, state)?,
            };
            state = next_state;
            monitor.update(loss);
            steps = step + 1;

            if self.log_frequency > 0 && steps % self.log_frequency == 0 {
                let speed = throughput(steps, chars_per_step, start.elapsed());
                info!(
                    "[{}] {:.1}%, step: {}, perplexity: {:.3}, speed: {:.0} cps",
                    mode.label(),
                    steps as f64 / epoch_size as f64 * 100.0,
                    step,
                    monitor.perplexity(),
                    speed,
                );
            }
        }

        let elapsed = start.elapsed();
        let report = EpochReport {
            steps,
            epoch_size,
            average_loss: monitor.average(),
            perplexity: monitor.perplexity(),
            chars_per_second: throughput(steps, chars_per_step, elapsed),
            elapsed,
            stopped_early,
        };

        info!(
            "[{}] final perplexity: {:.3}, speed: {:.0} cps{}",
            mode.label(),
            report.perplexity,
            report.chars_per_second,
            if stopped_early { " (stopped early)" } else { "" },
        );

        Ok(report)
    }
}

fn throughput(steps: usize, chars_per_step: f64, elapsed: Duration) -> f64 {
    let seconds = elapsed.as_secs_f64();
    if seconds <= 0.0 {
        return 0.0;
    }
    steps as f64 * chars_per_step / seconds
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_average_tracks_mean_and_perplexity() {
        let mut monitor = RunningAverage::new();
        assert_eq!(monitor.average(), 0.0);
        assert_eq!(monitor.update(1.0), 1.0);
        assert_eq!(monitor.update(3.0), 2.0);
        assert_eq!(monitor.count(), 2);
        assert!((monitor.perplexity() - 2.0f32.exp()).abs() < 1e-5);

        monitor.reset();
        assert_eq!(monitor.count(), 0);
        assert_eq!(monitor.perplexity(), 1.0);
    }

    #[test]
    fn throughput_handles_zero_elapsed() {
        assert_eq!(throughput(10, 50.0, Duration::ZERO), 0.0);
        assert_eq!(throughput(10, 50.0, Duration::from_secs(2)), 250.0);
    }
}
