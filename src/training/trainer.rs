//! Training loop for the clock models
//!
//! Every step runs, in order:
//! 1. learning rate from the staircase schedule at the current global step
//! 2. moving averages of every loss term and the total loss
//! 3. gradients of the total loss (every parameter must receive one)
//! 4. plain gradient descent update, then `global_step += 1`
//! 5. moving averages of every trainable parameter

use std::path::Path;
use std::time::Instant;

use burn::{
    module::{AutodiffModule, Module, ModuleVisitor, ParamId},
    optim::{adaptor::OptimizerAdaptor, GradientsParams, Optimizer, Sgd, SgdConfig},
    record::CompactRecorder,
    tensor::{backend::AutodiffBackend, ElementConversion, Tensor},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::averages::{LossAverages, ParameterAverages, TOTAL_LOSS_KEY};
use super::scheduler::ExponentialDecay;
use crate::dataset::{BatchSource, ClockBatch};
use crate::evaluation::StopSignal;
use crate::model::config::TrainingConfig;
use crate::model::TimeModel;
use crate::utils::error::{ClockError, Result};

const MODEL_FILE: &str = "model";
const AVERAGED_MODEL_FILE: &str = "model_averaged";
const STATE_FILE: &str = "state.json";

/// One loss term as seen by a training step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermReport {
    pub name: String,
    pub value: f64,
    /// Moving average including this step
    pub average: f64,
}

/// Outcome of a single training step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    /// Global step after the update
    pub step: usize,
    pub learning_rate: f64,
    pub total_loss: f64,
    pub average_total_loss: f64,
    pub terms: Vec<TermReport>,
}

/// Outcome of [`Trainer::train`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSummary {
    pub steps_run: usize,
    pub global_step: usize,
    pub stopped_early: bool,
    pub elapsed_secs: f64,
    pub last: Option<StepReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CheckpointState {
    global_step: usize,
    config: TrainingConfig,
}

/// Counts parameters without a gradient
struct GradientAudit<'a> {
    grads: &'a GradientsParams,
    missing: usize,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for GradientAudit<'_> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, _tensor: &Tensor<B, D>) {
        if self.grads.get::<B::InnerBackend, D>(id).is_none() {
            self.missing += 1;
        }
    }
}

/// Gradient-descent trainer for any [`TimeModel`]
pub struct Trainer<B, M>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + TimeModel<B>,
{
    /// Model being trained
    pub model: M,
    optimizer: OptimizerAdaptor<Sgd<B::InnerBackend>, M, B>,
    schedule: ExponentialDecay,
    loss_averages: LossAverages,
    parameter_averages: ParameterAverages<B::InnerBackend>,
    /// Training configuration
    pub config: TrainingConfig,
    global_step: usize,
    device: B::Device,
}

impl<B, M> Trainer<B, M>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + TimeModel<B>,
{
    pub fn new(model: M, config: TrainingConfig, device: B::Device) -> Result<Self> {
        config.validate()?;

        let schedule = ExponentialDecay::from_config(&config)?;
        let parameter_averages = ParameterAverages::new(&model.valid(), config.moving_average_decay);
        let loss_averages = LossAverages::new(config.loss_average_decay);

        info!("Trainer ready: {}", schedule.description());

        Ok(Self {
            model,
            optimizer: SgdConfig::new().init(),
            schedule,
            loss_averages,
            parameter_averages,
            config,
            global_step: 0,
            device,
        })
    }

    /// Completed optimizer steps
    pub fn global_step(&self) -> usize {
        self.global_step
    }

    /// Learning rate the next step will use
    pub fn current_learning_rate(&self) -> f64 {
        self.schedule.get_lr(self.global_step)
    }

    pub fn loss_averages(&self) -> &LossAverages {
        &self.loss_averages
    }

    /// Inference copy of the model carrying the parameter moving averages
    pub fn averaged_model(&self) -> M::InnerModule {
        self.parameter_averages.averaged(self.model.valid())
    }

    /// Run one training step on `batch`
    pub fn step(&mut self, batch: &ClockBatch<B>) -> Result<StepReport> {
        let learning_rate = self.schedule.get_lr(self.global_step);
        let objective = self.model.objective(batch)?;

        let total_loss: f64 = objective.total.clone().into_scalar().elem();
        if !total_loss.is_finite() {
            return Err(ClockError::NumericOverflow(format!(
                "total loss is {} at step {}",
                total_loss, self.global_step
            )));
        }

        let mut terms = Vec::with_capacity(objective.terms.len());
        for term in objective.terms.terms() {
            let value: f64 = term.value.clone().into_scalar().elem();
            let average = self.loss_averages.update(&term.name, value);
            terms.push(TermReport {
                name: term.name.clone(),
                value,
                average,
            });
        }
        let average_total_loss = self.loss_averages.update(TOTAL_LOSS_KEY, total_loss);

        let grads = objective.total.backward();
        let grads = GradientsParams::from_grads(grads, &self.model);

        let mut audit = GradientAudit {
            grads: &grads,
            missing: 0,
        };
        self.model.visit(&mut audit);
        if audit.missing > 0 {
            return Err(ClockError::MissingGradient {
                count: audit.missing,
            });
        }

        self.model = self.optimizer.step(learning_rate, self.model.clone(), grads);
        self.global_step += 1;

        self.parameter_averages
            .update(&self.model.valid(), self.global_step);

        debug!(
            "step {}: loss = {:.4} (avg {:.4}), lr = {:.6}",
            self.global_step, total_loss, average_total_loss, learning_rate
        );

        Ok(StepReport {
            step: self.global_step,
            learning_rate,
            total_loss,
            average_total_loss,
            terms,
        })
    }

    /// Run up to `max_steps` steps, polling `signal` before each batch
    pub fn train<S: BatchSource<B>>(
        &mut self,
        source: &mut S,
        max_steps: usize,
        signal: &StopSignal,
    ) -> Result<TrainingSummary> {
        info!(
            "Training for {} steps from step {} (batch size {})",
            max_steps,
            self.global_step,
            source.batch_size()
        );

        let start = Instant::now();
        let mut steps_run = 0;
        let mut stopped_early = false;
        let mut last = None;

        for _ in 0..max_steps {
            if signal.should_stop() {
                warn!("Training stopped at step {}", self.global_step);
                stopped_early = true;
                break;
            }

            let batch = source.next_batch()?;
            let report = self.step(&batch)?;
            steps_run += 1;

            if self.config.log_every > 0 && report.step % self.config.log_every == 0 {
                let elapsed = start.elapsed().as_secs_f64().max(f64::EPSILON);
                let examples_per_sec = (steps_run * source.batch_size()) as f64 / elapsed;
                info!(
                    "step {}, loss = {:.2} (avg {:.2}), lr = {:.6} ({:.1} examples/sec)",
                    report.step,
                    report.total_loss,
                    report.average_total_loss,
                    report.learning_rate,
                    examples_per_sec
                );
            }

            last = Some(report);
        }

        Ok(TrainingSummary {
            steps_run,
            global_step: self.global_step,
            stopped_early,
            elapsed_secs: start.elapsed().as_secs_f64(),
            last,
        })
    }

    /// Write the model, its averaged copy and the step counter into `dir`
    pub fn save_checkpoint(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        let recorder = CompactRecorder::new();

        self.model
            .clone()
            .save_file(dir.join(MODEL_FILE), &recorder)
            .map_err(|e| ClockError::Checkpoint(format!("failed to save model: {:?}", e)))?;
        self.averaged_model()
            .save_file(dir.join(AVERAGED_MODEL_FILE), &recorder)
            .map_err(|e| ClockError::Checkpoint(format!("failed to save averaged model: {:?}", e)))?;

        let state = CheckpointState {
            global_step: self.global_step,
            config: self.config.clone(),
        };
        std::fs::write(dir.join(STATE_FILE), serde_json::to_string_pretty(&state)?)?;

        info!("Checkpoint saved to {:?} at step {}", dir, self.global_step);
        Ok(())
    }

    /// Restore a checkpoint written by [`Trainer::save_checkpoint`]
    pub fn load_checkpoint(&mut self, dir: &Path) -> Result<()> {
        let recorder = CompactRecorder::new();

        self.model = self
            .model
            .clone()
            .load_file(dir.join(MODEL_FILE), &recorder, &self.device)
            .map_err(|e| ClockError::Checkpoint(format!("failed to load model: {:?}", e)))?;

        let averaged = self
            .model
            .valid()
            .load_file(dir.join(AVERAGED_MODEL_FILE), &recorder, &self.device)
            .map_err(|e| ClockError::Checkpoint(format!("failed to load averaged model: {:?}", e)))?;
        self.parameter_averages =
            ParameterAverages::new(&averaged, self.config.moving_average_decay);

        let state: CheckpointState =
            serde_json::from_str(&std::fs::read_to_string(dir.join(STATE_FILE))?)?;
        self.global_step = state.global_step;

        info!("Checkpoint loaded from {:?} at step {}", dir, self.global_step);
        Ok(())
    }
}

/// Load averaged weights written by [`Trainer::save_checkpoint`] into `model`
pub fn load_averaged_model<B, M>(model: M, dir: &Path, device: &B::Device) -> Result<M>
where
    B: burn::tensor::backend::Backend,
    M: Module<B>,
{
    model
        .load_file(dir.join(AVERAGED_MODEL_FILE), &CompactRecorder::new(), device)
        .map_err(|e| ClockError::Checkpoint(format!("failed to load averaged model: {:?}", e)))
}
